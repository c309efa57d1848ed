extern crate std;

use core::convert::Infallible;
use std::collections::{BTreeMap, VecDeque};
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use crate::consts::*;
use crate::{BusOperation, Vl53l0x};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct MockError;

/// Paged register file with just enough firmware behavior for the driver:
/// the start bit clears itself, a started measurement raises the interrupt
/// until it is cleared, the NVM data registers follow the selector and the
/// soft reset drops the model id.
#[derive(Debug, Default)]
pub(crate) struct MockBus {
    page: u8,
    regs: BTreeMap<(u8, u8), u8>,
    stuck: BTreeMap<(u8, u8), u8>,
    read_masks: BTreeMap<(u8, u8), u8>,
    nvm: BTreeMap<u8, u32>,
    ref_signal_rates: VecDeque<u16>,
    measurements: VecDeque<[u8; 12]>,
    interrupt_pending: bool,
    writes: Vec<(u8, u8, u8)>,
    reads: usize,
    failing_read: Option<u8>,
}

impl MockBus {
    pub(crate) fn new() -> Self {
        let mut bus = MockBus::default();
        bus.set_register(0, VL53L0X_REG_IDENTIFICATION_MODEL_ID, VL53L0X_MODEL_ID);
        bus.stick(7, VL53L0X_REG_NVM_STROBE, 0x01);
        bus
    }

    pub(crate) fn set_register(&mut self, page: u8, reg: u8, value: u8) {
        self.regs.insert((page, reg), value);
    }

    pub(crate) fn set_word(&mut self, page: u8, reg: u8, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.set_register(page, reg, hi);
        self.set_register(page, reg.wrapping_add(1), lo);
    }

    pub(crate) fn register(&self, page: u8, reg: u8) -> u8 {
        self.regs.get(&(page, reg)).copied().unwrap_or(0)
    }

    pub(crate) fn registers(&self, page: u8, reg: u8, count: usize) -> Vec<u8> {
        (0..count).map(|i| self.register(page, reg.wrapping_add(i as u8))).collect()
    }

    pub(crate) fn word(&self, page: u8, reg: u8) -> u16 {
        u16::from_be_bytes([self.register(page, reg), self.register(page, reg.wrapping_add(1))])
    }

    /// Reads of this register always return `value`.
    pub(crate) fn stick(&mut self, page: u8, reg: u8, value: u8) {
        self.stuck.insert((page, reg), value);
    }

    pub(crate) fn set_read_mask(&mut self, page: u8, reg: u8, mask: u8) {
        self.read_masks.insert((page, reg), mask);
    }

    pub(crate) fn set_nvm(&mut self, selector: u8, value: u32) {
        self.nvm.insert(selector, value);
    }

    /// Reference rates (9.7) returned one per measurement, the last one
    /// repeats.
    pub(crate) fn queue_ref_signal_rates(&mut self, rates: &[u16]) {
        self.ref_signal_rates.extend(rates.iter().copied());
    }

    /// Result blocks returned one per measurement, the last one repeats.
    pub(crate) fn queue_measurements(&mut self, blocks: &[[u8; 12]]) {
        self.measurements.extend(blocks.iter().copied());
    }

    pub(crate) fn set_interrupt_pending(&mut self, pending: bool) {
        self.interrupt_pending = pending;
    }

    /// The next read starting at `reg` fails with `MockError`.
    pub(crate) fn fail_next_read_of(&mut self, reg: u8) {
        self.failing_read = Some(reg);
    }

    pub(crate) fn writes(&self) -> &[(u8, u8, u8)] {
        &self.writes
    }

    pub(crate) fn clear_log(&mut self) {
        self.writes.clear();
        self.reads = 0;
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads
    }

    /// Values written to one register, oldest first.
    pub(crate) fn writes_to(&self, page: u8, reg: u8) -> Vec<u8> {
        self.writes.iter().filter(|w| w.0 == page && w.1 == reg).map(|w| w.2).collect()
    }

    fn pop_keep_last<V: Copy>(queue: &mut VecDeque<V>) -> Option<V> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        let page = self.page;
        self.writes.push((page, reg, value));
        match (page, reg) {
            (_, VL53L0X_REG_PAGE_SELECT) => {
                self.page = value;
                return;
            }
            (0, VL53L0X_REG_SYSRANGE_START) => {
                if value & 0x07 != 0 {
                    self.interrupt_pending = true;
                }
                self.set_register(0, reg, value & !VL53L0X_REG_SYSRANGE_MODE_START_STOP);
                return;
            }
            (0, VL53L0X_REG_SYSTEM_INTERRUPT_CLEAR) => {
                if value & 0x01 != 0 {
                    self.interrupt_pending = false;
                }
            }
            (0, VL53L0X_REG_SOFT_RESET_GO2_SOFT_RESET_N) => {
                let model_id = if value == 0 { 0 } else { VL53L0X_MODEL_ID };
                self.set_register(0, VL53L0X_REG_IDENTIFICATION_MODEL_ID, model_id);
            }
            _ => {}
        }
        self.set_register(page, reg, value);
    }

    fn read_register(&self, reg: u8) -> u8 {
        let key = (self.page, reg);
        let value = if let Some(value) = self.stuck.get(&key) {
            *value
        } else {
            match key {
                (0, VL53L0X_REG_RESULT_INTERRUPT_STATUS) => {
                    (self.register(0, reg) & !0x07) | if self.interrupt_pending { 0x04 } else { 0x00 }
                }
                (7, r) if (VL53L0X_REG_NVM_DATA..VL53L0X_REG_NVM_DATA + 4).contains(&r) => {
                    let selector = self.register(7, VL53L0X_REG_NVM_SELECT);
                    let word = self.nvm.get(&selector).copied().unwrap_or(0);
                    word.to_be_bytes()[(r - VL53L0X_REG_NVM_DATA) as usize]
                }
                _ => self.register(self.page, reg),
            }
        };
        value & self.read_masks.get(&key).copied().unwrap_or(0xFF)
    }

    fn read_block(&mut self, reg: u8, rbuf: &mut [u8]) {
        match (self.page, reg, rbuf.len()) {
            (0, VL53L0X_REG_RESULT_RANGE_STATUS, 1) => {
                rbuf[0] = (self.register(0, reg) & !0x01) | self.interrupt_pending as u8;
                return;
            }
            (0, VL53L0X_REG_RESULT_RANGE_STATUS, 12) => {
                if let Some(block) = Self::pop_keep_last(&mut self.measurements) {
                    rbuf.copy_from_slice(&block);
                    return;
                }
            }
            (1, VL53L0X_REG_RESULT_PEAK_SIGNAL_RATE_REF, 2) => {
                if let Some(rate) = Self::pop_keep_last(&mut self.ref_signal_rates) {
                    rbuf.copy_from_slice(&rate.to_be_bytes());
                    return;
                }
            }
            _ => {}
        }
        for (i, slot) in rbuf.iter_mut().enumerate() {
            *slot = self.read_register(reg.wrapping_add(i as u8));
        }
    }
}

impl BusOperation for MockBus {
    type Error = MockError;

    fn read(&mut self, rbuf: &mut [u8]) -> Result<(), Self::Error> {
        self.reads += 1;
        self.read_block(0, rbuf);
        Ok(())
    }

    fn write(&mut self, wbuf: &[u8]) -> Result<(), Self::Error> {
        if let Some((&reg, data)) = wbuf.split_first() {
            for (i, &value) in data.iter().enumerate() {
                self.write_register(reg.wrapping_add(i as u8), value);
            }
        }
        Ok(())
    }

    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<(), Self::Error> {
        let reg = wbuf.first().copied().unwrap_or(0);
        if self.failing_read == Some(reg) {
            self.failing_read = None;
            return Err(MockError);
        }
        self.reads += 1;
        self.read_block(reg, rbuf);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockPin {
    pub(crate) high: bool,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockDelay {
    pub(crate) calls: u32,
    pub(crate) total_ms: u32,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ms += ns / 1_000_000;
    }

    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms;
    }
}

pub(crate) type MockDevice = Vl53l0x<MockBus, MockPin, MockDelay>;

/// Powered, identified part. Nothing is logged on the bus yet.
pub(crate) fn new_device() -> MockDevice {
    Vl53l0x::new(MockBus::new(), MockPin::default(), MockDelay::default())
}

/// RESULT_RANGE_STATUS block for one measurement.
///
/// * `device_status` : Raw status byte, the device code sits in bits 6..3.
/// * `signal_rate` / `ambient_rate` : 9.7 MCPS.
/// * `effective_spads` : 8.8.
pub(crate) fn measurement_block(
    device_status: u8,
    range_mm: u16,
    signal_rate: u16,
    ambient_rate: u16,
    effective_spads: u16,
) -> [u8; 12] {
    let mut block = [0u8; 12];
    block[0] = device_status;
    block[2..4].copy_from_slice(&effective_spads.to_be_bytes());
    block[6..8].copy_from_slice(&signal_rate.to_be_bytes());
    block[8..10].copy_from_slice(&ambient_rate.to_be_bytes());
    block[10..12].copy_from_slice(&range_mm.to_be_bytes());
    block
}

/// Raw status byte carrying device code 11, range complete.
pub(crate) const RANGE_COMPLETE: u8 = 11 << 3;
