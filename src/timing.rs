use bitfield::bitfield;

use crate::consts::*;
use crate::fixed_point::FixPoint1616;
use crate::{BusOperation, DelayNs, Error, OutputPin, Vl53l0x};

bitfield! {
    /// Sequence step timeout register, `(ls_byte << ms_byte) + 1` macro clocks.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct EncodedTimeout(u16);
    impl Debug;
    pub u8, ms_byte, set_ms_byte: 15, 8;
    pub u8, ls_byte, set_ls_byte: 7, 0;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VcselPeriodType {
    PreRange,
    FinalRange,
}

/// Macro period in picoseconds for a VCSEL period (PCLKs) and an oscillator
/// frequency in 16.16 MHz. A zero frequency falls back to the part default.
pub fn calc_macro_period_ps(vcsel_period_pclks: u8, osc_frequency_mhz: FixPoint1616) -> u32 {
    let osc = if osc_frequency_mhz == 0 { VL53L0X_DEFAULT_OSC_FREQUENCY_MHZ } else { osc_frequency_mhz };
    let macro_period_ps = VL53L0X_MACRO_PERIOD_VCLKS * vcsel_period_pclks as u64 * VL53L0X_PLL_PERIOD_SCALE
        / osc as u64;

    macro_period_ps as u32
}

/// PLL period in picoseconds, the same scale the macro period is built on.
pub fn calc_pll_period_ps(osc_frequency_mhz: FixPoint1616) -> u32 {
    let osc = if osc_frequency_mhz == 0 { VL53L0X_DEFAULT_OSC_FREQUENCY_MHZ } else { osc_frequency_mhz };
    (VL53L0X_PLL_PERIOD_SCALE / osc as u64) as u32
}

fn calc_macro_period_ns(vcsel_period_pclks: u8, osc_frequency_mhz: FixPoint1616) -> u64 {
    (calc_macro_period_ps(vcsel_period_pclks, osc_frequency_mhz) as u64 + 500) / 1000
}

pub fn timeout_us_to_mclks(timeout_us: u32, vcsel_period_pclks: u8, osc_frequency_mhz: FixPoint1616) -> u32 {
    let macro_period_ns = calc_macro_period_ns(vcsel_period_pclks, osc_frequency_mhz);
    if macro_period_ns == 0 {
        return 0;
    }
    ((timeout_us as u64 * 1000 + macro_period_ns / 2) / macro_period_ns) as u32
}

pub fn timeout_mclks_to_us(timeout_mclks: u32, vcsel_period_pclks: u8, osc_frequency_mhz: FixPoint1616) -> u32 {
    let macro_period_ns = calc_macro_period_ns(vcsel_period_pclks, osc_frequency_mhz);
    ((timeout_mclks as u64 * macro_period_ns + 500) / 1000) as u32
}

/// Packs a macro clock count into the timeout register format. The mantissa
/// is `count - 1` shifted down until it fits a byte, so the encoding rounds
/// towards zero.
pub fn encode_timeout(timeout_macro_clks: u32) -> u16 {
    if timeout_macro_clks == 0 {
        return 0;
    }
    let mut ls_byte = timeout_macro_clks - 1;
    let mut ms_byte: u8 = 0;
    while ls_byte & 0xFFFF_FF00 != 0 {
        ls_byte >>= 1;
        ms_byte += 1;
    }

    let mut encoded = EncodedTimeout(0);
    encoded.set_ms_byte(ms_byte);
    encoded.set_ls_byte(ls_byte as u8);
    encoded.0
}

pub fn decode_timeout(encoded_timeout: u16) -> u32 {
    let encoded = EncodedTimeout(encoded_timeout);
    (encoded.ls_byte() as u32)
        .checked_shl(encoded.ms_byte() as u32)
        .unwrap_or(0)
        .saturating_add(1)
}

pub const fn encode_vcsel_period(vcsel_period_pclks: u8) -> u8 {
    (vcsel_period_pclks >> 1).wrapping_sub(1)
}

pub const fn decode_vcsel_period(vcsel_period_reg: u8) -> u8 {
    vcsel_period_reg.wrapping_add(1) << 1
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// Programs the final range timeout so a whole measurement fits in
    /// `budget_us`.
    ///
    /// # Arguments
    ///
    /// * `budget_us` : Measurement timing budget in microseconds, at least 26000.
    pub fn set_measurement_timing_budget(&mut self, budget_us: u32) -> Result<(), Error<B::Error>> {
        if budget_us < VL53L0X_MIN_TIMING_BUDGET_US {
            return Err(Error::InvalidParam);
        }
        let final_range_us =
            budget_us - (VL53L0X_PRE_RANGE_TIMEOUT_US + VL53L0X_TCC_DCC_TIMEOUT_US + VL53L0X_ADDITIONAL_OVERHEAD_US);

        let vcsel = self.get_vcsel_pulse_period(VcselPeriodType::FinalRange)?;
        let osc = self.data.specific.osc_frequency_mhz;
        let final_range_mclks = timeout_us_to_mclks(final_range_us, vcsel, osc);
        let encoded = encode_timeout(final_range_mclks);
        self.write_word(VL53L0X_REG_FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI, encoded)?;

        self.data.specific.final_range_timeout_us = final_range_us;
        self.data.current_parameters.measurement_timing_budget_us = budget_us;
        debug!("timing budget {} us, final range {} mclks", budget_us, final_range_mclks);

        Ok(())
    }

    /// Reads back the measurement timing budget from the final range timeout.
    ///
    /// # Return
    ///
    /// `budget_us` : Measurement timing budget in microseconds.
    pub fn get_measurement_timing_budget(&mut self) -> Result<u32, Error<B::Error>> {
        let final_range_us = self.get_final_range_timeout_us()?;
        let budget_us =
            final_range_us + VL53L0X_PRE_RANGE_TIMEOUT_US + VL53L0X_TCC_DCC_TIMEOUT_US + VL53L0X_ADDITIONAL_OVERHEAD_US;

        self.data.current_parameters.measurement_timing_budget_us = budget_us;
        Ok(budget_us)
    }

    pub fn get_final_range_timeout_us(&mut self) -> Result<u32, Error<B::Error>> {
        let encoded = self.read_word(VL53L0X_REG_FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI)?;
        let vcsel = self.get_vcsel_pulse_period(VcselPeriodType::FinalRange)?;
        let final_range_us = timeout_mclks_to_us(decode_timeout(encoded), vcsel, self.data.specific.osc_frequency_mhz);

        self.data.specific.final_range_timeout_us = final_range_us;
        Ok(final_range_us)
    }

    pub fn get_pre_range_timeout_us(&mut self) -> Result<u32, Error<B::Error>> {
        let encoded = self.read_word(VL53L0X_REG_PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI)?;
        let vcsel = self.get_vcsel_pulse_period(VcselPeriodType::PreRange)?;
        let pre_range_us = timeout_mclks_to_us(decode_timeout(encoded), vcsel, self.data.specific.osc_frequency_mhz);

        self.data.specific.pre_range_timeout_us = pre_range_us;
        Ok(pre_range_us)
    }

    /// Returns the VCSEL pulse period in PCLKs.
    pub fn get_vcsel_pulse_period(&mut self, period_type: VcselPeriodType) -> Result<u8, Error<B::Error>> {
        let reg = match period_type {
            VcselPeriodType::PreRange => VL53L0X_REG_PRE_RANGE_CONFIG_VCSEL_PERIOD,
            VcselPeriodType::FinalRange => VL53L0X_REG_FINAL_RANGE_CONFIG_VCSEL_PERIOD,
        };
        let pclks = decode_vcsel_period(self.read_byte(reg)?);

        match period_type {
            VcselPeriodType::PreRange => self.data.specific.pre_range_vcsel_pulse_period = pclks,
            VcselPeriodType::FinalRange => self.data.specific.final_range_vcsel_pulse_period = pclks,
        }
        Ok(pclks)
    }

    /// Changes a VCSEL pulse period. The phase check window follows the new
    /// period, the step timeout keeps its duration, then the timing budget is
    /// re-applied and the phase calibration re-run.
    ///
    /// # Arguments
    ///
    /// * `period_type` : Pre-range (12, 14, 16, 18) or final range (8, 10, 12, 14).
    /// * `vcsel_period_pclks` : New period in PCLKs.
    pub fn set_vcsel_pulse_period(&mut self, period_type: VcselPeriodType, vcsel_period_pclks: u8) -> Result<(), Error<B::Error>> {
        match (period_type, vcsel_period_pclks) {
            (VcselPeriodType::PreRange, 12 | 14 | 16 | 18) | (VcselPeriodType::FinalRange, 8 | 10 | 12 | 14) => {}
            _ => return Err(Error::InvalidParam),
        }
        let osc = self.data.specific.osc_frequency_mhz;
        let vcsel_period_reg = encode_vcsel_period(vcsel_period_pclks);

        match period_type {
            VcselPeriodType::PreRange => {
                let phase_high = match vcsel_period_pclks {
                    12 => 0x18,
                    14 => 0x30,
                    16 => 0x40,
                    _ => 0x50,
                };
                self.write_byte(VL53L0X_REG_PRE_RANGE_CONFIG_VALID_PHASE_HIGH, phase_high)?;
                self.write_byte(VL53L0X_REG_PRE_RANGE_CONFIG_VALID_PHASE_LOW, 0x08)?;

                let pre_range_us = self.get_pre_range_timeout_us()?;
                self.write_byte(VL53L0X_REG_PRE_RANGE_CONFIG_VCSEL_PERIOD, vcsel_period_reg)?;
                let pre_range_mclks = timeout_us_to_mclks(pre_range_us, vcsel_period_pclks, osc);
                self.write_word(VL53L0X_REG_PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI, encode_timeout(pre_range_mclks))?;

                let msrc_mclks = pre_range_mclks.min(256).saturating_sub(1) as u8;
                self.write_byte(VL53L0X_REG_MSRC_CONFIG_TIMEOUT_MACROP, msrc_mclks)?;
                self.data.specific.pre_range_vcsel_pulse_period = vcsel_period_pclks;
            }
            VcselPeriodType::FinalRange => {
                let (phase_high, vcsel_width, phasecal_timeout, phasecal_lim) = match vcsel_period_pclks {
                    8 => (0x10, 0x02, 0x0C, 0x30),
                    10 => (0x28, 0x03, 0x09, 0x20),
                    12 => (0x38, 0x03, 0x08, 0x20),
                    _ => (0x48, 0x03, 0x07, 0x20),
                };
                self.write_byte(VL53L0X_REG_FINAL_RANGE_CONFIG_VALID_PHASE_HIGH, phase_high)?;
                self.write_byte(VL53L0X_REG_FINAL_RANGE_CONFIG_VALID_PHASE_LOW, 0x08)?;
                self.write_byte(VL53L0X_REG_GLOBAL_CONFIG_VCSEL_WIDTH, vcsel_width)?;
                self.write_byte(VL53L0X_REG_ALGO_PHASECAL_CONFIG_TIMEOUT, phasecal_timeout)?;
                self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
                self.write_byte(VL53L0X_REG_ALGO_PHASECAL_LIM, phasecal_lim)?;
                self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;

                let final_range_us = self.get_final_range_timeout_us()?;
                self.write_byte(VL53L0X_REG_FINAL_RANGE_CONFIG_VCSEL_PERIOD, vcsel_period_reg)?;
                let final_range_mclks = timeout_us_to_mclks(final_range_us, vcsel_period_pclks, osc);
                self.write_word(VL53L0X_REG_FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI, encode_timeout(final_range_mclks))?;
                self.data.specific.final_range_vcsel_pulse_period = vcsel_period_pclks;
            }
        }

        let budget_us = self.data.current_parameters.measurement_timing_budget_us;
        self.set_measurement_timing_budget(budget_us)?;
        self.perform_phase_calibration(true)?;

        Ok(())
    }
}
