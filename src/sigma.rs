use bitfield::bitfield;

use crate::consts::*;
use crate::fixed_point::*;
use crate::timing::{calc_pll_period_ps, timeout_us_to_mclks};
use crate::utils::{isqrt, quadrature_sum};
use crate::{BusOperation, DelayNs, Error, LimitCheckId, OutputPin, RangingMeasurement, Vl53l0x};

bitfield! {
    /// First byte of the result block.
    #[derive(Copy, Clone)]
    pub struct RangeStatusRegister(u8);
    impl Debug;
    pub u8, device_range_status, _: 6, 3;
    pub data_ready, _: 0;
}

/// Everything the sigma estimate depends on, taken from one measurement and
/// the timing state of the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SigmaInputs {
    pub range_mm: u16,
    /// Return signal rate with the cross-talk added back, 16.16 MCPS.
    pub total_signal_rate_mcps: FixPoint1616,
    pub ambient_rate_mcps: FixPoint1616,
    /// Cross-talk for the whole return array, 16.16 MCPS.
    pub total_xtalk_rate_mcps: FixPoint1616,
    pub range_valid: bool,
    pub final_range_timeout_us: u32,
    pub final_range_vcsel_pclks: u8,
    pub pre_range_timeout_us: u32,
    pub pre_range_vcsel_pclks: u8,
    pub osc_frequency_mhz: FixPoint1616,
    pub eff_pulse_width: u16,
    pub eff_amb_width: u16,
    pub ref_array: u16,
}

/// Statistical range uncertainty of one measurement, 16.16 mm.
///
/// Pulse width and ambient terms are in centi-ns. The return sigma is built
/// in quadrature from both, scaled by the shot noise of the detected events,
/// then combined with the reference sigma of a 25 ms integration.
///
/// # Return
///
/// `sigma_estimate` : Clamped to `VL53L0X_SIGMA_EST_MAX`. No signal gives the maximum.
pub fn calc_sigma_estimate<E>(inputs: &SigmaInputs) -> Result<FixPoint1616, Error<E>> {
    if inputs.eff_amb_width == 0 {
        return Err(Error::DivisionByZero);
    }
    let integration_time_ms = (inputs.final_range_timeout_us + inputs.pre_range_timeout_us + 500) / 1000;
    if integration_time_ms == 0 {
        return Err(Error::DivisionByZero);
    }

    /* kcps keeps the ratios inside 16.16 */
    let ambient_rate_kcps = ((inputs.ambient_rate_mcps as u64 * 1000) >> 16) as u32;
    let peak_signal_rate_kcps = ((inputs.total_signal_rate_mcps as u64 * 1000 + 0x8000) >> 16) as u32;
    let xtalk_rate_kcps = inputs.total_xtalk_rate_mcps.saturating_mul(1000).min(VL53L0X_MAX_XTALK_KCPS);

    let final_range_mclks = timeout_us_to_mclks(
        inputs.final_range_timeout_us,
        inputs.final_range_vcsel_pclks,
        inputs.osc_frequency_mhz,
    );
    let pre_range_mclks =
        timeout_us_to_mclks(inputs.pre_range_timeout_us, inputs.pre_range_vcsel_pclks, inputs.osc_frequency_mhz);
    let vcsel_width: u64 = if inputs.final_range_vcsel_pclks == 8 { 2 } else { 3 };

    let mut peak_vcsel_duration_us = vcsel_width * 2048 * (pre_range_mclks as u64 + final_range_mclks as u64);
    peak_vcsel_duration_us = (peak_vcsel_duration_us + 500) / 1000;
    peak_vcsel_duration_us *= calc_pll_period_ps(inputs.osc_frequency_mhz) as u64;
    peak_vcsel_duration_us = (peak_vcsel_duration_us + 500) / 1000;

    /* 24.8 rate times microseconds, back to an event count */
    let total_signal_rate_2408 = (inputs.total_signal_rate_mcps as u64 + 0x80) >> 8;
    let total_events = (total_signal_rate_2408 * peak_vcsel_duration_us + 0x80) >> 8;

    if peak_signal_rate_kcps == 0 || total_events == 0 {
        return Ok(VL53L0X_SIGMA_EST_MAX);
    }
    let total_events = total_events.min(u32::MAX as u64) as u32;

    let amb_to_signal_ratio_max = VL53L0X_AMB_TO_SIGNAL_RATIO_MAX / inputs.eff_amb_width as u32;
    let ambient_term = (((ambient_rate_kcps as u64) << 16) / peak_signal_rate_kcps as u64)
        .min(amb_to_signal_ratio_max as u64)
        * inputs.eff_amb_width as u64;
    let shot_noise = 2 * isqrt(total_events.saturating_mul(12)) as u64;

    let pw_mult: u64 = if inputs.range_valid {
        let delta_t_ps = inputs.range_mm as u64 * VL53L0X_TOF_PER_MM_PS as u64;
        let signal_1616 = (peak_signal_rate_kcps as u64) << 16;
        let diff1_mcps = ((signal_1616.saturating_sub(xtalk_rate_kcps as u64) + 500) / 1000) << 8;
        let diff2_mcps = (signal_1616 + xtalk_rate_kcps as u64 + 500) / 1000;
        if diff2_mcps == 0 {
            return Err(Error::DivisionByZero);
        }
        let xtalk_correction = ((diff1_mcps / diff2_mcps) << 8).min(1 << 16);

        let mut pw_mult = delta_t_ps / VL53L0X_VCSEL_PULSE_WIDTH_PS as u64;
        pw_mult *= (1 << 16) - xtalk_correction;
        pw_mult = (pw_mult + 0x8000) >> 16;
        pw_mult += 1 << 16;
        /* 17.15 squared, back to 16.16 */
        pw_mult >>= 1;
        (pw_mult * pw_mult) >> 14
    } else {
        1 << 16
    };

    let pulse_term_centi_ns = ((pw_mult * inputs.eff_pulse_width as u64 + 0x8000) >> 16) as u32;
    let ambient_term_centi_ns = ((ambient_term + 0x8000) >> 16).min(u32::MAX as u64) as u32;
    let sqrt_result_centi_ns = (quadrature_sum(pulse_term_centi_ns, ambient_term_centi_ns) as u64) << 16;

    /* Speed of light in um per 0.1 ns, hence the final division */
    let mut sigma_est_rtn = ((sqrt_result_centi_ns + 50) / 100) / shot_noise;
    sigma_est_rtn *= VL53L0X_SPEED_OF_LIGHT_IN_AIR as u64;
    sigma_est_rtn = (sigma_est_rtn + 5000) / 10000;
    let sigma_est_rtn = sigma_est_rtn.min(VL53L0X_SIGMA_EST_RTN_MAX as u64) as u32;

    let mut sigma_est_ref = isqrt(
        (VL53L0X_DFLT_FINAL_RANGE_INTEGRATION_TIME_MS + integration_time_ms / 2) / integration_time_ms,
    ) << 8;
    sigma_est_ref = (sigma_est_ref * inputs.ref_array as u32 / 100 + 500) / 1000;

    let sigma_estimate = 1000 * quadrature_sum(sigma_est_rtn, sigma_est_ref) as u64;
    Ok(sigma_estimate.min(VL53L0X_SIGMA_EST_MAX as u64) as FixPoint1616)
}

/// Normalized range status. Device code 0 reads as 11, range complete.
/// A failed sigma check adds 16, a clipped reference signal adds 32.
pub fn classify_range_status(device_range_status: u8, sigma_failed: bool, ref_clip_failed: bool) -> u8 {
    let code = RangeStatusRegister(device_range_status).device_range_status();
    let mut status = if code == 0 { VL53L0X_RANGE_STATUS_VALID } else { code };
    if sigma_failed {
        status += 16;
    }
    if ref_clip_failed {
        status += 32;
    }
    status
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// Cross-talk of the whole return array for this measurement, 16.16 MCPS.
    /// Zero while compensation is disabled.
    pub fn get_total_xtalk_rate(&self, measurement: &RangingMeasurement) -> FixPoint1616 {
        let params = &self.data.current_parameters;
        if !params.xtalk_compensation_enable {
            return 0;
        }
        let total = measurement.effective_spad_rtn_count as u64 * params.xtalk_compensation_rate_mcps as u64;
        ((total + 0x80) >> 8) as FixPoint1616
    }

    pub fn get_total_signal_rate(&self, measurement: &RangingMeasurement) -> FixPoint1616 {
        measurement.signal_rate_rtn_mcps.saturating_add(self.get_total_xtalk_rate(measurement))
    }

    fn sigma_inputs(&self, measurement: &RangingMeasurement) -> SigmaInputs {
        let specific = &self.data.specific;
        SigmaInputs {
            range_mm: measurement.range_mm,
            total_signal_rate_mcps: self.get_total_signal_rate(measurement),
            ambient_rate_mcps: measurement.ambient_rate_rtn_mcps,
            total_xtalk_rate_mcps: self.get_total_xtalk_rate(measurement),
            range_valid: classify_range_status(measurement.device_range_status, false, false)
                == VL53L0X_RANGE_STATUS_VALID,
            final_range_timeout_us: specific.final_range_timeout_us,
            final_range_vcsel_pclks: specific.final_range_vcsel_pulse_period,
            pre_range_timeout_us: specific.pre_range_timeout_us,
            pre_range_vcsel_pclks: specific.pre_range_vcsel_pulse_period,
            osc_frequency_mhz: specific.osc_frequency_mhz,
            eff_pulse_width: specific.sigma_est_eff_pulse_width,
            eff_amb_width: specific.sigma_est_eff_amb_width,
            ref_array: specific.sigma_est_ref_array,
        }
    }

    /// Runs the enabled limit checks on a measurement, fills its sigma
    /// estimate and range status and records which checks failed.
    ///
    /// # Return
    ///
    /// `range_status` : Normalized status, also stored in `measurement`.
    pub fn get_pal_range_status(&mut self, measurement: &mut RangingMeasurement) -> Result<u8, Error<B::Error>> {
        let device_code = RangeStatusRegister(measurement.device_range_status).device_range_status();

        let sigma_check = self.data.current_parameters.limit_check(LimitCheckId::SigmaFinalRange);
        let mut sigma_failed = false;
        if sigma_check.enable {
            let sigma = calc_sigma_estimate(&self.sigma_inputs(measurement))?;
            measurement.sigma_estimate = sigma;
            sigma_failed = sigma_check.value > 0 && sigma > sigma_check.value;
        }

        let ref_clip_check = self.data.current_parameters.limit_check(LimitCheckId::SignalRefClip);
        let mut ref_clip_failed = false;
        if ref_clip_check.enable {
            self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
            let signal_ref = self.read_word(VL53L0X_REG_RESULT_PEAK_SIGNAL_RATE_REF)?;
            self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
            let signal_ref_mcps = fixpoint97_to_fixpoint1616(signal_ref);
            self.data.last_signal_ref_mcps = signal_ref_mcps;
            ref_clip_failed = ref_clip_check.value > 0 && signal_ref_mcps > ref_clip_check.value;
        }

        let ignore_check = self.data.current_parameters.limit_check(LimitCheckId::RangeIgnoreThreshold);
        let mut range_ignored = false;
        if ignore_check.enable {
            let signal_rate_per_spad = match measurement.effective_spad_rtn_count {
                0 => 0,
                spads => (256 * measurement.signal_rate_rtn_mcps as u64 / spads as u64) as u32,
            };
            range_ignored = ignore_check.value > 0 && signal_rate_per_spad < ignore_check.value;
        }

        let signal_rate_check = self.data.current_parameters.limit_check(LimitCheckId::SignalRateFinalRange);
        let status = classify_range_status(measurement.device_range_status, sigma_failed, ref_clip_failed);
        measurement.range_status = status;

        self.data.limit_checks_status = [
            sigma_failed,
            signal_rate_check.enable && device_code == 4,
            ref_clip_failed,
            range_ignored,
            false,
            false,
        ];
        if status != VL53L0X_RANGE_STATUS_VALID {
            trace!("range status {} (device {})", status, device_code);
        }
        Ok(status)
    }
}
