#![no_std]

mod fmt;

pub mod accessors;
pub mod bus_operation;
pub mod calibration;
pub mod consts;
pub mod fixed_point;
pub mod interrupt;
pub mod measurement;
pub mod parameters;
pub mod sigma;
pub mod spad;
pub mod timing;
pub mod utils;
pub mod xtalk;

#[cfg(test)]
mod testing;

pub use accessors::{DeviceInfo, Version};
pub use bus_operation::{BusOperation, Vl53l0xI2C};
pub use fixed_point::FixPoint1616;
pub use parameters::*;
pub use spad::SpadMap;
pub use timing::VcselPeriodType;

use consts::*;
use fixed_point::*;
use utils::*;

use embedded_hal::{
    i2c::{I2c, SevenBitAddress},
    digital::OutputPin,
    delay::DelayNs
};

pub struct Vl53l0x<B: BusOperation, XSHUT: OutputPin, T: DelayNs> {
    pub temp_buffer: [u8; VL53L0X_TEMPORARY_BUFFER_SIZE],
    pub data: ParameterStore,
    /// Filled on the first `get_device_info` call.
    pub device_info: Option<DeviceInfo>,

    pub xshut_pin: XSHUT,
    pub bus: B,
    pub tim: T
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<B> {
    /// Transport failure, passed through untouched.
    Bus(B),
    /// The part did not identify as a VL53L0X.
    Other,
    Timeout,
    InvalidParam,
    /// No valid measurement was collected by a calibration.
    Range,
    RefSpadInit,
    DivisionByZero,
    ModeNotSupported,
    NotImplemented,
    InterruptNotCleared,
    GpioNotSupported,
    Pin
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// Wraps an already configured bus. The device is not touched.
    pub fn new(bus: B, xshut_pin: XSHUT, tim: T) -> Self {
        Vl53l0x {
            temp_buffer: [0; VL53L0X_TEMPORARY_BUFFER_SIZE],
            data: ParameterStore::new(),
            device_info: None,
            xshut_pin,
            bus,
            tim
        }
    }

    pub fn read_from_register(&mut self, reg: u8, size: usize) -> Result<(), Error<B::Error>> {
        if size > VL53L0X_TEMPORARY_BUFFER_SIZE {
            return Err(Error::InvalidParam);
        }
        self.bus.write_read(&[reg], &mut self.temp_buffer[..size]).map_err(Error::Bus)?;
        Ok(())
    }

    pub fn write_multi_to_register(&mut self, reg: u8, wbuf: &[u8]) -> Result<(), Error<B::Error>> {
        let size = wbuf.len();
        if size > VL53L0X_TEMPORARY_BUFFER_SIZE {
            return Err(Error::InvalidParam);
        }
        let mut tmp: [u8; VL53L0X_TEMPORARY_BUFFER_SIZE + 1] = [0; VL53L0X_TEMPORARY_BUFFER_SIZE + 1];
        tmp[0] = reg;
        tmp[1..1 + size].copy_from_slice(wbuf);
        self.bus.write(&tmp[..1 + size]).map_err(Error::Bus)?;
        Ok(())
    }

    pub fn read_byte(&mut self, reg: u8) -> Result<u8, Error<B::Error>> {
        self.read_from_register(reg, 1)?;
        Ok(self.temp_buffer[0])
    }

    pub fn read_word(&mut self, reg: u8) -> Result<u16, Error<B::Error>> {
        let mut word: [u16; 1] = [0];
        self.read_from_register(reg, 2)?;
        from_u8_to_u16(&self.temp_buffer[..2], &mut word);
        Ok(word[0])
    }

    pub fn read_dword(&mut self, reg: u8) -> Result<u32, Error<B::Error>> {
        let mut dword: [u32; 1] = [0];
        self.read_from_register(reg, 4)?;
        from_u8_to_u32(&self.temp_buffer[..4], &mut dword);
        Ok(dword[0])
    }

    pub fn write_byte(&mut self, reg: u8, val: u8) -> Result<(), Error<B::Error>> {
        self.bus.write(&[reg, val]).map_err(Error::Bus)?;
        Ok(())
    }

    pub fn write_word(&mut self, reg: u8, val: u16) -> Result<(), Error<B::Error>> {
        let mut buf: [u8; 2] = [0; 2];
        from_u16_to_u8(&[val], &mut buf);
        self.write_multi_to_register(reg, &buf)
    }

    pub fn write_dword(&mut self, reg: u8, val: u32) -> Result<(), Error<B::Error>> {
        let mut buf: [u8; 4] = [0; 4];
        from_u32_to_u8(&[val], &mut buf);
        self.write_multi_to_register(reg, &buf)
    }

    /// Read-modify-write: `(reg & and_mask) | or_mask`.
    pub fn update_byte(&mut self, reg: u8, and_mask: u8, or_mask: u8) -> Result<(), Error<B::Error>> {
        let val = self.read_byte(reg)?;
        self.write_byte(reg, (val & and_mask) | or_mask)
    }

    pub fn delay(&mut self, ms: u32) {
        self.tim.delay_ms(ms);
    }

    pub fn polling_delay(&mut self) {
        self.delay(VL53L0X_POLLING_DELAY_MS);
    }

    /// Re-evaluates `condition` until it holds, at most `max_loops` times.
    /// With `with_delay` the polling delay runs between two evaluations.
    pub fn poll_until<F>(&mut self, mut condition: F, with_delay: bool, max_loops: u32) -> Result<(), Error<B::Error>>
    where
        F: FnMut(&mut Self) -> Result<bool, Error<B::Error>>
    {
        for _ in 0..max_loops {
            if condition(self)? {
                return Ok(());
            }
            if with_delay {
                self.polling_delay();
            }
        }
        warn!("poll gave up after {} loops", max_loops);
        Err(Error::Timeout)
    }

    /// Same as `poll_until`, waiting for the condition to become false.
    pub fn poll_until_clear<F>(&mut self, mut condition: F, with_delay: bool, max_loops: u32) -> Result<(), Error<B::Error>>
    where
        F: FnMut(&mut Self) -> Result<bool, Error<B::Error>>
    {
        self.poll_until(|dev| condition(dev).map(|set| !set), with_delay, max_loops)
    }

    pub fn on(&mut self) -> Result<(), Error<B::Error>> {
        self.xshut_pin.set_high().map_err(|_| Error::Pin)?;
        self.delay(VL53L0X_BOOT_DELAY_MS);
        Ok(())
    }

    pub fn off(&mut self) -> Result<(), Error<B::Error>> {
        self.xshut_pin.set_low().map_err(|_| Error::Pin)?;
        self.delay(10);
        self.data.pal_state = PalState::PoweredDown;
        Ok(())
    }

    pub fn is_alive(&mut self) -> Result<(), Error<B::Error>> {
        let model_id = self.read_byte(VL53L0X_REG_IDENTIFICATION_MODEL_ID)?;
        if model_id != VL53L0X_MODEL_ID {
            error!("unexpected model id {}", model_id);
            return Err(Error::Other);
        }
        Ok(())
    }

    /// Waits for the firmware to answer with its model id after power up.
    pub fn wait_device_booted(&mut self) -> Result<(), Error<B::Error>> {
        self.poll_until(
            |dev| Ok(dev.read_byte(VL53L0X_REG_IDENTIFICATION_MODEL_ID)? == VL53L0X_MODEL_ID),
            true,
            VL53L0X_DEFAULT_MAX_LOOP,
        )
    }

    /// Soft reset. The device leaves reset with its default configuration,
    /// `data_init` has to run again.
    pub fn reset_device(&mut self) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SOFT_RESET_GO2_SOFT_RESET_N, 0x00)?;
        self.poll_until(
            |dev| Ok(dev.read_byte(VL53L0X_REG_IDENTIFICATION_MODEL_ID)? == 0),
            true,
            VL53L0X_DEFAULT_MAX_LOOP,
        )?;

        self.write_byte(VL53L0X_REG_SOFT_RESET_GO2_SOFT_RESET_N, 0x01)?;
        self.poll_until(
            |dev| Ok(dev.read_byte(VL53L0X_REG_IDENTIFICATION_MODEL_ID)? != 0),
            true,
            VL53L0X_DEFAULT_MAX_LOOP,
        )?;

        self.data.pal_state = PalState::PoweredDown;
        info!("device reset");
        Ok(())
    }

    /// Opens the NVM window, runs `f` and closes it again even when `f`
    /// fails.
    fn with_nvm<R, F>(&mut self, f: F) -> Result<R, Error<B::Error>>
    where
        F: FnOnce(&mut Self) -> Result<R, Error<B::Error>>
    {
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x00)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x06)?;
        self.update_byte(VL53L0X_REG_NVM_STROBE, 0xFF, 0x04)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x07)?;
        self.write_byte(0x81, 0x01)?;
        self.polling_delay();
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01)?;

        let res = f(self);

        self.write_byte(0x81, 0x00)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x06)?;
        self.update_byte(VL53L0X_REG_NVM_STROBE, 0xFB, 0x00)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
        res
    }

    /// Selects an NVM word and strobes it into the data registers.
    fn read_nvm_dword(&mut self, selector: u8) -> Result<u32, Error<B::Error>> {
        self.write_byte(VL53L0X_REG_NVM_SELECT, selector)?;
        self.write_byte(VL53L0X_REG_NVM_STROBE, 0x00)?;
        self.poll_until(
            |dev| Ok(dev.read_byte(VL53L0X_REG_NVM_STROBE)? != 0x00),
            false,
            VL53L0X_DEFAULT_MAX_LOOP,
        )?;
        self.write_byte(VL53L0X_REG_NVM_STROBE, 0x01)?;
        self.read_dword(VL53L0X_REG_NVM_DATA)
    }

    /// Reads the reference SPAD count, type and good SPAD map from NVM, once.
    pub fn read_nvm_spad_info(&mut self) -> Result<(), Error<B::Error>> {
        if self.data.specific.nvm_spad_info_read {
            return Ok(());
        }
        let (info, map_lo, map_hi) = self.with_nvm(|dev| {
            let info = dev.read_nvm_dword(VL53L0X_NVM_SPAD_INFO)?;
            let map_lo = dev.read_nvm_dword(VL53L0X_NVM_GOOD_SPAD_MAP_0)?;
            let map_hi = dev.read_nvm_dword(VL53L0X_NVM_GOOD_SPAD_MAP_1)?;
            Ok((info, map_lo, map_hi))
        })?;

        let info = spad::NvmSpadInfo(info);
        let mut good = [0u8; 8];
        from_u32_to_u8(&[map_lo, map_hi], &mut good);

        let specific = &mut self.data.specific;
        specific.nvm_reference_spad_count = info.reference_spad_count();
        specific.nvm_reference_spad_type_aperture = info.reference_spad_type_aperture();
        specific.ref_good_spad_map.0.copy_from_slice(&good[..VL53L0X_REF_SPAD_BUFFER_SIZE]);
        specific.nvm_spad_info_read = true;
        debug!(
            "nvm: {} reference spads, aperture {}",
            specific.nvm_reference_spad_count,
            specific.nvm_reference_spad_type_aperture
        );
        Ok(())
    }

    /// Reads the module id and the NVM revision.
    pub fn read_nvm_module_info(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        self.with_nvm(|dev| {
            let module_id = (dev.read_nvm_dword(VL53L0X_NVM_MODULE_ID)? >> 24) as u8;
            let revision = (dev.read_nvm_dword(VL53L0X_NVM_REVISION)? >> 24) as u8;
            Ok((module_id, revision))
        })
    }

    /// Writes the stop variable back to the internal tuning register, the
    /// firmware needs it before every start and every stop.
    fn write_stop_variable(&mut self, stop_variable: u8) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x00)?;
        self.write_byte(VL53L0X_REG_INTERNAL_TUNING, stop_variable)?;
        self.write_byte(0x00, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        Ok(())
    }

    /// Resets the parameter store to its defaults and programs the limit
    /// checks. Leaves the handle in `WaitStaticInit`.
    pub fn data_init(&mut self) -> Result<(), Error<B::Error>> {
        if self.data.use_io_2v8 {
            self.update_byte(VL53L0X_REG_VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV, 0xFE, 0x01)?;
        }
        /* I2C standard mode */
        self.write_byte(0x88, 0x00)?;

        let use_io_2v8 = self.data.use_io_2v8;
        self.data = ParameterStore::new();
        self.data.use_io_2v8 = use_io_2v8;

        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x00)?;
        self.data.stop_variable = self.read_byte(VL53L0X_REG_INTERNAL_TUNING)?;
        self.write_byte(0x00, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;

        let defaults: [(LimitCheckId, bool, FixPoint1616); VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS] = [
            (LimitCheckId::SigmaFinalRange, true, VL53L0X_DEFAULT_SIGMA_LIMIT_MM),
            (LimitCheckId::SignalRateFinalRange, true, VL53L0X_DEFAULT_SIGNAL_RATE_LIMIT_MCPS),
            (LimitCheckId::SignalRefClip, false, VL53L0X_DEFAULT_SIGNAL_REF_CLIP_MCPS),
            (LimitCheckId::RangeIgnoreThreshold, false, VL53L0X_DEFAULT_RANGE_IGNORE_THRESHOLD),
            (LimitCheckId::SignalRateMsrc, false, 0),
            (LimitCheckId::SignalRatePreRange, false, 0),
        ];
        for (id, enable, value) in defaults {
            self.set_limit_check_value(id, value)?;
            self.set_limit_check_enable(id, enable)?;
        }

        self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, 0xFF)?;
        self.data.sequence_config = 0xFF;
        self.data.pal_state = PalState::WaitStaticInit;
        debug!("data init done, stop variable {}", self.data.stop_variable);
        Ok(())
    }

    /// Uploads a tuning table of (register, value) pairs.
    pub fn load_tuning_settings(&mut self, settings: &[(u8, u8)]) -> Result<(), Error<B::Error>> {
        for &(reg, val) in settings {
            self.write_byte(reg, val)?;
        }
        Ok(())
    }

    /// Applies the reference SPADs, tuning, GPIO and sequence defaults and
    /// loads the timing state into the store. Leaves the handle in `Idle`.
    pub fn static_init(&mut self) -> Result<(), Error<B::Error>> {
        self.read_nvm_spad_info()?;

        let specific = self.data.specific;
        if specific.ref_spads_initialised {
            self.set_reference_spads(specific.reference_spad_count, specific.reference_spad_type_aperture)?;
        } else {
            let count = specific.nvm_reference_spad_count;
            let aperture = specific.nvm_reference_spad_type_aperture;
            if (aperture && count > 32) || (!aperture && count > 12) {
                warn!("nvm reference spads invalid, running spad management");
                self.perform_ref_spad_management()?;
            } else {
                self.set_reference_spads(count, aperture)?;
            }
        }

        self.load_tuning_settings(VL53L0X_DEFAULT_TUNING_SETTINGS)?;
        self.set_gpio_config(
            0,
            DeviceMode::SingleRanging,
            GpioFunctionality::NewMeasureReady,
            InterruptPolarity::Low,
        )?;

        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        let osc = self.read_word(VL53L0X_REG_OSC_FREQUENCY)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        if osc != 0 {
            self.data.specific.osc_frequency_mhz = fixpoint412_to_fixpoint1616(osc);
        }

        self.get_fraction_enable()?;
        self.get_vcsel_pulse_period(VcselPeriodType::PreRange)?;
        self.get_vcsel_pulse_period(VcselPeriodType::FinalRange)?;
        self.get_pre_range_timeout_us()?;
        self.get_measurement_timing_budget()?;

        self.data.sequence_config = self.read_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG)?;
        self.set_sequence_step_enable(SequenceStepId::Tcc, false)?;
        self.set_sequence_step_enable(SequenceStepId::Msrc, false)?;

        self.data.pal_state = PalState::Idle;
        info!("static init done");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::new_device;

    #[test]
    fn reset_waits_for_the_model_id_both_ways() {
        let mut dev = new_device();
        dev.data.pal_state = PalState::Idle;

        dev.reset_device().unwrap();

        assert_eq!(dev.bus.writes_to(0, VL53L0X_REG_SOFT_RESET_GO2_SOFT_RESET_N), [0x00u8, 0x01]);
        assert_eq!(dev.get_pal_state(), PalState::PoweredDown);
        assert_eq!(dev.is_alive(), Ok(()));
    }

    #[test]
    fn xshut_powers_the_part() {
        let mut dev = new_device();
        dev.data.pal_state = PalState::Idle;

        dev.on().unwrap();
        assert!(dev.xshut_pin.high);
        assert_eq!(dev.tim.total_ms, VL53L0X_BOOT_DELAY_MS);

        dev.off().unwrap();
        assert!(!dev.xshut_pin.high);
        assert_eq!(dev.tim.total_ms, VL53L0X_BOOT_DELAY_MS + 10);
        assert_eq!(dev.get_pal_state(), PalState::PoweredDown);
    }

    #[test]
    fn boot_wait_is_bounded() {
        let mut dev = new_device();
        dev.bus.stick(0, VL53L0X_REG_IDENTIFICATION_MODEL_ID, 0x00);

        assert_eq!(dev.wait_device_booted(), Err(Error::Timeout));
        assert_eq!(dev.tim.calls, VL53L0X_DEFAULT_MAX_LOOP);
        assert_eq!(dev.tim.total_ms, VL53L0X_DEFAULT_MAX_LOOP * VL53L0X_POLLING_DELAY_MS);
        assert_eq!(dev.is_alive(), Err(Error::Other));
    }

    #[test]
    fn data_init_programs_the_defaults() {
        let mut dev = new_device();
        dev.bus.set_register(1, VL53L0X_REG_INTERNAL_TUNING, 0x3C);

        dev.data_init().unwrap();

        assert_eq!(dev.data.stop_variable, 0x3C);
        assert_eq!(dev.get_pal_state(), PalState::WaitStaticInit);
        assert_eq!(dev.bus.register(0, VL53L0X_REG_VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV) & 0x01, 0x01);
        assert_eq!(dev.bus.register(0, VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG), 0xFF);
        assert_eq!(dev.bus.word(0, VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT), 0x0020);

        let sigma = dev.data.current_parameters.limit_check(LimitCheckId::SigmaFinalRange);
        assert_eq!(sigma, LimitCheck { enable: true, value: VL53L0X_DEFAULT_SIGMA_LIMIT_MM });
        let ref_clip = dev.data.current_parameters.limit_check(LimitCheckId::SignalRefClip);
        assert_eq!(ref_clip, LimitCheck { enable: false, value: VL53L0X_DEFAULT_SIGNAL_REF_CLIP_MCPS });
    }

    #[test]
    fn static_init_uses_the_nvm_reference_spads() {
        let mut dev = new_device();
        /* 5 aperture spads */
        dev.bus.set_nvm(VL53L0X_NVM_SPAD_INFO, 0x0000_8500);
        dev.bus.set_nvm(VL53L0X_NVM_GOOD_SPAD_MAP_0, 0xFFFF_FFFF);
        dev.bus.set_nvm(VL53L0X_NVM_GOOD_SPAD_MAP_1, 0xFFFF_0000);
        dev.data_init().unwrap();

        dev.static_init().unwrap();

        assert_eq!(dev.get_pal_state(), PalState::Idle);
        assert_eq!(dev.get_reference_spads(), Ok((5, true)));
        assert_eq!(
            dev.bus.registers(0, VL53L0X_REG_GLOBAL_CONFIG_SPAD_ENABLES_REF_0, 6),
            [0x00u8, 0xF0, 0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(dev.data.pin0_gpio_functionality, GpioFunctionality::NewMeasureReady);
        assert_eq!(dev.data.specific.pre_range_vcsel_pulse_period, 14);
        assert_eq!(dev.data.specific.final_range_vcsel_pulse_period, 10);
        /* TCC and MSRC off */
        assert_eq!(dev.bus.register(0, VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG), 0xE8);
        assert_eq!(dev.data.sequence_config, 0xE8);
    }
}
