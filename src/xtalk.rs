use crate::consts::*;
use crate::fixed_point::*;
use crate::{BusOperation, DelayNs, Error, LimitCheckId, OutputPin, Vl53l0x};

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// The firmware compensates only at unity gain. Otherwise the driver
    /// corrects the range itself and the device register stays 0.
    fn write_xtalk_compensation_register(&mut self, enable: bool, rate_mcps: FixPoint1616) -> Result<(), Error<B::Error>> {
        let rate = if enable && self.data.linearity_corrective_gain == VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN {
            rate_mcps
        } else {
            0
        };
        self.write_word(VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS, fixpoint1616_to_fixpoint313(rate))
    }

    /// This function enables or disables the cross-talk compensation. The
    /// device register holds the stored rate while enabled at unity gain and
    /// 0 otherwise.
    pub fn set_xtalk_compensation_enable(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        self.write_xtalk_compensation_register(enable, self.data.current_parameters.xtalk_compensation_rate_mcps)?;
        self.data.current_parameters.xtalk_compensation_enable = enable;
        Ok(())
    }

    pub fn get_xtalk_compensation_enable(&self) -> bool {
        self.data.current_parameters.xtalk_compensation_enable
    }

    /// This function sets the cross-talk rate per SPAD. The device register
    /// is only written while compensation is enabled.
    ///
    /// # Arguments
    ///
    /// * `rate_mcps` : Cross-talk per SPAD, 16.16 MCPS.
    pub fn set_xtalk_compensation_rate_mcps(&mut self, rate_mcps: FixPoint1616) -> Result<(), Error<B::Error>> {
        if self.data.current_parameters.xtalk_compensation_enable {
            self.write_xtalk_compensation_register(true, rate_mcps)?;
        }
        self.data.current_parameters.xtalk_compensation_rate_mcps = rate_mcps;
        Ok(())
    }

    /// This function gets the cross-talk rate per SPAD. A non zero device
    /// register wins over the stored value and marks compensation enabled.
    pub fn get_xtalk_compensation_rate_mcps(&mut self) -> Result<FixPoint1616, Error<B::Error>> {
        let reg = self.read_word(VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS)?;
        let params = &mut self.data.current_parameters;
        if reg == 0 {
            return Ok(params.xtalk_compensation_rate_mcps);
        }
        params.xtalk_compensation_rate_mcps = fixpoint313_to_fixpoint1616(reg);
        params.xtalk_compensation_enable = true;
        Ok(params.xtalk_compensation_rate_mcps)
    }

    /// Range gain applied by the driver, 1000 is unity. Any other value
    /// moves the cross-talk correction from the firmware to the driver,
    /// back at unity the firmware gets the stored rate again.
    pub fn set_linearity_corrective_gain(&mut self, gain: u16) -> Result<(), Error<B::Error>> {
        if gain > VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN {
            return Err(Error::InvalidParam);
        }
        self.data.linearity_corrective_gain = gain;
        let params = &self.data.current_parameters;
        let (enable, rate) = (params.xtalk_compensation_enable, params.xtalk_compensation_rate_mcps);
        if gain != VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN || enable {
            self.write_xtalk_compensation_register(enable, rate)?;
        }
        Ok(())
    }

    pub fn get_linearity_corrective_gain(&self) -> u16 {
        self.data.linearity_corrective_gain
    }

    /// This function measures a target without cross-talk compensation and
    /// derives the cross-talk rate per SPAD from the range error.
    ///
    /// The rate is zero when the mean SPAD count or the distance round to
    /// zero, or when the target reads at or beyond its real distance.
    ///
    /// # Arguments
    ///
    /// * `distance_mm` : Target distance, 16.16 mm.
    ///
    /// # Return
    ///
    /// `rate_mcps` : New compensation rate, 16.16 MCPS, now enabled.
    pub fn perform_xtalk_calibration(&mut self, distance_mm: FixPoint1616) -> Result<FixPoint1616, Error<B::Error>> {
        if distance_mm == 0 {
            return Err(Error::InvalidParam);
        }
        let previous_enable = self.data.current_parameters.xtalk_compensation_enable;
        let previous_rate = self.data.current_parameters.xtalk_compensation_rate_mcps;
        let ignore_enable = self.get_limit_check_enable(LimitCheckId::RangeIgnoreThreshold)?;

        self.set_xtalk_compensation_enable(false)?;
        self.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, false)?;

        let sums = match self.collect_calibration_measurements() {
            Ok(sums) => sums,
            Err(e) => {
                self.set_xtalk_compensation_rate_mcps(previous_rate)?;
                self.set_xtalk_compensation_enable(previous_enable)?;
                self.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, ignore_enable)?;
                return Err(e);
            }
        };

        let count = sums.count as u64;
        let mean_signal_rate = sums.signal_rate_mcps / count;
        let mean_range = (sums.range_mm << 16) / count;
        /* effective_spads already dropped the 8 fractional bits of the 8.8 count */
        let mean_spads = (sums.effective_spads << 16) / count;
        let mean_spads_as_int = (mean_spads + 0x8000) >> 16;
        let distance_as_int_mm = (distance_mm as u64 + 0x8000) >> 16;

        let rate_mcps = if mean_spads_as_int == 0 || distance_as_int_mm == 0 || mean_range >= distance_mm as u64 {
            0
        } else {
            let per_spad = mean_signal_rate / mean_spads_as_int;
            let per_spad = per_spad * ((1 << 16) - mean_range / distance_as_int_mm);
            ((per_spad + 0x8000) >> 16) as FixPoint1616
        };

        self.set_xtalk_compensation_enable(true)?;
        self.set_xtalk_compensation_rate_mcps(rate_mcps)?;
        self.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, ignore_enable)?;
        info!("xtalk calibration: {} mcps per spad (16.16)", rate_mcps);

        Ok(rate_mcps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::{measurement_block, new_device, MockDevice, RANGE_COMPLETE};

    extern crate std;
    use std::vec::Vec;

    fn queue_run(dev: &mut MockDevice, valid: usize, range_mm: u16) {
        let mut blocks = Vec::new();
        for _ in 0..valid {
            // 1 MCPS over 20 SPADs
            blocks.push(measurement_block(RANGE_COMPLETE, range_mm, 0x0080, 0x0010, 0x1400));
        }
        blocks.push(measurement_block(1 << 3, 0, 0, 0, 0));
        dev.bus.queue_measurements(&blocks);
    }

    #[test]
    fn xtalk_rate_from_the_range_error() {
        let mut dev = new_device();
        queue_run(&mut dev, 10, 300);

        assert_eq!(dev.perform_xtalk_calibration(600 << 16), Ok(1638));

        assert!(dev.get_xtalk_compensation_enable());
        assert_eq!(dev.data.current_parameters.xtalk_compensation_rate_mcps, 1638);
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 204);
        assert_eq!(dev.get_xtalk_compensation_rate_mcps(), Ok(204 << 3));
    }

    #[test]
    fn xtalk_is_zero_when_the_target_reads_too_far() {
        let mut dev = new_device();
        queue_run(&mut dev, 5, 650);

        assert_eq!(dev.perform_xtalk_calibration(600 << 16), Ok(0));
        assert!(dev.get_xtalk_compensation_enable());
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 0);
    }

    #[test]
    fn failed_xtalk_calibration_restores_the_previous_rate() {
        let mut dev = new_device();
        dev.set_xtalk_compensation_rate_mcps(800).unwrap();
        dev.set_xtalk_compensation_enable(true).unwrap();
        dev.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, true).unwrap();
        queue_run(&mut dev, 0, 0);

        assert_eq!(dev.perform_xtalk_calibration(600 << 16), Err(Error::Range));

        assert!(dev.get_xtalk_compensation_enable());
        assert_eq!(dev.data.current_parameters.xtalk_compensation_rate_mcps, 800);
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 100);
        assert_eq!(dev.get_limit_check_enable(LimitCheckId::RangeIgnoreThreshold), Ok(true));
    }

    #[test]
    fn disabled_compensation_only_stores_the_rate() {
        let mut dev = new_device();

        dev.set_xtalk_compensation_rate_mcps(1638).unwrap();
        assert!(dev.bus.writes().is_empty());
        assert_eq!(dev.get_xtalk_compensation_rate_mcps(), Ok(1638));
        assert!(!dev.get_xtalk_compensation_enable());
    }

    #[test]
    fn linearity_gain_is_at_most_unity() {
        let mut dev = new_device();
        dev.bus.set_word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS, 204);

        assert_eq!(dev.set_linearity_corrective_gain(1001), Err(Error::InvalidParam));
        dev.set_linearity_corrective_gain(980).unwrap();
        assert_eq!(dev.get_linearity_corrective_gain(), 980);
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 0);
    }

    #[test]
    fn compensation_enabled_below_unity_gain_keeps_the_firmware_off() {
        let mut dev = new_device();
        dev.set_linearity_corrective_gain(980).unwrap();
        dev.set_xtalk_compensation_rate_mcps(1638).unwrap();
        dev.set_xtalk_compensation_enable(true).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 0);

        dev.set_xtalk_compensation_rate_mcps(3276).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 0);
        assert_eq!(dev.data.current_parameters.xtalk_compensation_rate_mcps, 3276);

        dev.set_linearity_corrective_gain(1000).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 409);
    }

    #[test]
    fn xtalk_calibration_below_unity_gain_keeps_the_firmware_off() {
        let mut dev = new_device();
        dev.set_linearity_corrective_gain(980).unwrap();
        queue_run(&mut dev, 10, 300);

        // 300 mm reads as 294 mm once the gain is applied
        assert_eq!(dev.perform_xtalk_calibration(600 << 16), Ok(1671));

        assert!(dev.get_xtalk_compensation_enable());
        assert_eq!(dev.data.current_parameters.xtalk_compensation_rate_mcps, 1671);
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 0);
    }
}
