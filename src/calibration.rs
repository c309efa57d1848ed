use crate::consts::*;
use crate::fixed_point::FixPoint1616;
use crate::{BusOperation, DelayNs, Error, LimitCheckId, OutputPin, SequenceStepId, Vl53l0x};

/// Sums over the valid measurements of one calibration run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct CalibrationSums {
    pub count: u32,
    pub range_mm: u64,
    pub signal_rate_mcps: u64,
    /// Whole SPADs, the 8.8 count divided by 256.
    pub effective_spads: u64,
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// Starts one internal calibration measurement and waits for it.
    fn perform_single_ref_calibration(&mut self, vhv_init_byte: u8) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SYSRANGE_START, VL53L0X_REG_SYSRANGE_MODE_START_STOP | vhv_init_byte)?;
        self.measurement_poll_for_completion()?;
        self.clear_interrupt_mask()?;
        self.write_byte(VL53L0X_REG_SYSRANGE_START, 0x00)?;
        Ok(())
    }

    /// Reads (`None`) or writes the VHV and phase calibration bytes.
    fn ref_calibration_io(&mut self, vhv: bool, phase: bool, write: Option<(u8, u8)>) -> Result<(u8, u8), Error<B::Error>> {
        let (mut vhv_settings, mut phase_cal) = write.unwrap_or((0, 0));

        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x00)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;

        match write {
            None => {
                if vhv {
                    vhv_settings = self.read_byte(VL53L0X_REG_VHV_CALIBRATION_RESULT)?;
                }
                if phase {
                    phase_cal = self.read_byte(VL53L0X_REG_PHASE_CALIBRATION_RESULT)?;
                }
            }
            Some(_) => {
                if vhv {
                    self.write_byte(VL53L0X_REG_VHV_CALIBRATION_RESULT, vhv_settings)?;
                }
                if phase {
                    self.update_byte(VL53L0X_REG_PHASE_CALIBRATION_RESULT, 0x80, phase_cal)?;
                }
            }
        }

        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(0x00, 0x01)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        Ok((vhv_settings, phase_cal))
    }

    fn restore_sequence_config(&mut self, restore: bool) -> Result<(), Error<B::Error>> {
        if restore {
            let sequence_config = self.data.sequence_config;
            self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, sequence_config)?;
        }
        Ok(())
    }

    /// VHV calibration with only the VHV step enabled.
    ///
    /// # Arguments
    ///
    /// * `restore` : Write the stored sequence config back afterwards.
    pub fn perform_vhv_calibration(&mut self, restore: bool) -> Result<u8, Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, 0x01)?;
        self.perform_single_ref_calibration(0x40)?;
        let (vhv_settings, _) = self.ref_calibration_io(true, false, None)?;
        self.restore_sequence_config(restore)?;

        self.data.specific.vhv_settings = vhv_settings;
        Ok(vhv_settings)
    }

    /// Phase calibration with only the phase step enabled.
    pub fn perform_phase_calibration(&mut self, restore: bool) -> Result<u8, Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, 0x02)?;
        self.perform_single_ref_calibration(0x00)?;
        let (_, phase_cal) = self.ref_calibration_io(false, true, None)?;
        self.restore_sequence_config(restore)?;

        self.data.specific.phase_cal = phase_cal;
        Ok(phase_cal)
    }

    /// Temperature dependent reference calibration, VHV then phase.
    ///
    /// # Return
    ///
    /// `(vhv_settings, phase_cal)` : Calibration bytes found by the device.
    pub fn perform_ref_calibration(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        let vhv_settings = self.perform_vhv_calibration(false)?;
        let phase_cal = self.perform_phase_calibration(false)?;
        self.restore_sequence_config(true)?;
        debug!("ref calibration: vhv {}, phase {}", vhv_settings, phase_cal);
        Ok((vhv_settings, phase_cal))
    }

    pub fn set_ref_calibration(&mut self, vhv_settings: u8, phase_cal: u8) -> Result<(), Error<B::Error>> {
        self.ref_calibration_io(true, true, Some((vhv_settings, phase_cal)))?;
        self.data.specific.vhv_settings = vhv_settings;
        self.data.specific.phase_cal = phase_cal;
        Ok(())
    }

    pub fn get_ref_calibration(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        self.ref_calibration_io(true, true, None)
    }

    /// Writes the part to part offset. The register holds 12 bits two's
    /// complement in 250 um steps, values outside of it are clamped.
    pub fn set_offset_calibration_data_um(&mut self, offset_um: i32) -> Result<(), Error<B::Error>> {
        let offset_um = offset_um.clamp(VL53L0X_OFFSET_MIN_UM, VL53L0X_OFFSET_MAX_UM);
        let encoded = ((offset_um / VL53L0X_OFFSET_UNIT_UM) as u16) & 0x0FFF;
        self.write_word(VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM, encoded)?;
        self.data.current_parameters.range_offset_um = offset_um;
        Ok(())
    }

    pub fn get_offset_calibration_data_um(&mut self) -> Result<i32, Error<B::Error>> {
        let encoded = self.read_word(VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM)? & 0x0FFF;
        /* sign extend the 12 bit field */
        let steps = ((encoded << 4) as i16 >> 4) as i32;
        Ok(steps * VL53L0X_OFFSET_UNIT_UM)
    }

    /// Runs the calibration measurement loop and sums the ranges, signal
    /// rates and SPAD counts of the measurements reported valid.
    pub(crate) fn collect_calibration_measurements(&mut self) -> Result<CalibrationSums, Error<B::Error>> {
        let mut sums = CalibrationSums::default();
        for _ in 0..VL53L0X_CALIBRATION_MEASUREMENTS {
            let measurement = self.perform_single_ranging_measurement()?;
            if measurement.range_status == VL53L0X_RANGE_STATUS_VALID {
                sums.count += 1;
                sums.range_mm += measurement.range_mm as u64;
                sums.signal_rate_mcps += measurement.signal_rate_rtn_mcps as u64;
                /* 8.8 count, integer part only */
                sums.effective_spads += (measurement.effective_spad_rtn_count / 256) as u64;
            }
        }
        if sums.count == 0 {
            warn!("no valid measurement in {} tries", VL53L0X_CALIBRATION_MEASUREMENTS);
            return Err(Error::Range);
        }
        Ok(sums)
    }

    /// Measures a target at a known distance and programs the offset that
    /// maps the mean measured range onto it.
    ///
    /// Cross-talk compensation, the TCC step and the range ignore check are
    /// off during the run and get their previous state back afterwards. On
    /// failure the previous offset is written back too.
    ///
    /// # Arguments
    ///
    /// * `distance_mm` : Target distance, 16.16 mm.
    ///
    /// # Return
    ///
    /// `offset_um` : Offset now in use.
    pub fn perform_offset_calibration(&mut self, distance_mm: FixPoint1616) -> Result<i32, Error<B::Error>> {
        if distance_mm == 0 {
            return Err(Error::InvalidParam);
        }
        let previous_offset_um = self.data.current_parameters.range_offset_um;
        let xtalk_enable = self.data.current_parameters.xtalk_compensation_enable;
        let tcc_enable = self.get_sequence_step_enable(SequenceStepId::Tcc)?;
        let ignore_enable = self.get_limit_check_enable(LimitCheckId::RangeIgnoreThreshold)?;

        self.set_offset_calibration_data_um(0)?;
        self.set_xtalk_compensation_enable(false)?;
        self.set_sequence_step_enable(SequenceStepId::Tcc, false)?;
        self.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, false)?;

        let res = self.collect_calibration_measurements().and_then(|sums| {
            let mean_range = (sums.range_mm << 16) / sums.count as u64;
            let mean_range_mm = ((mean_range + 0x8000) >> 16) as i32;
            let distance_as_int_mm = ((distance_mm as u64 + 0x8000) >> 16) as i32;
            let offset_um = (distance_as_int_mm - mean_range_mm) * 1000;
            self.set_offset_calibration_data_um(offset_um)?;
            Ok(self.data.current_parameters.range_offset_um)
        });

        if res.is_err() {
            self.set_offset_calibration_data_um(previous_offset_um)?;
        }
        self.set_xtalk_compensation_enable(xtalk_enable)?;
        self.set_sequence_step_enable(SequenceStepId::Tcc, tcc_enable)?;
        self.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, ignore_enable)?;

        if let Ok(offset_um) = res {
            info!("offset calibration: {} um", offset_um);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::{measurement_block, new_device, MockDevice, MockError, RANGE_COMPLETE};

    extern crate std;
    use std::vec::Vec;

    const PHASE_FAIL: u8 = 6 << 3;

    fn queue_run(dev: &mut MockDevice, valid: usize, range_mm: u16) {
        let mut blocks = Vec::new();
        for _ in 0..valid {
            blocks.push(measurement_block(RANGE_COMPLETE, range_mm, 0x0080, 0x0010, 0x1400));
        }
        blocks.push(measurement_block(PHASE_FAIL, 20, 0x0001, 0x0010, 0x0100));
        dev.bus.queue_measurements(&blocks);
    }

    #[test]
    fn offset_register_is_twelve_bit_twos_complement() {
        let mut dev = new_device();

        dev.set_offset_calibration_data_um(10_000).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM), 40);
        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), 10_000);

        dev.set_offset_calibration_data_um(-1_000).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM), 0x0FFC);
        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), -1_000);

        dev.set_offset_calibration_data_um(2_000_000).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM), 2044);
        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), 511_000);
        dev.set_offset_calibration_data_um(-2_000_000).unwrap();
        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), VL53L0X_OFFSET_MIN_UM);
        assert_eq!(dev.data.current_parameters.range_offset_um, VL53L0X_OFFSET_MIN_UM);
    }

    #[test]
    fn offset_from_valid_measurements_only() {
        let mut dev = new_device();
        dev.set_sequence_step_enable(SequenceStepId::Tcc, true).unwrap();
        queue_run(&mut dev, 12, 90);

        assert_eq!(dev.perform_offset_calibration(100 << 16), Ok(10_000));

        assert_eq!(dev.bus.word(0, VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM), 40);
        assert_eq!(dev.data.current_parameters.range_offset_um, 10_000);
        assert!(dev.get_sequence_step_enable(SequenceStepId::Tcc).unwrap());
    }

    #[test]
    fn offset_calibration_rounds_the_distances() {
        let mut dev = new_device();
        queue_run(&mut dev, 3, 121);

        // 99.6 mm rounds to 100 mm.
        let distance = (100 << 16) - 26_214;
        assert_eq!(dev.perform_offset_calibration(distance), Ok(-21_000));
        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), -21_000);
    }

    #[test]
    fn offset_calibration_without_valid_measurement_keeps_the_old_offset() {
        let mut dev = new_device();
        dev.set_offset_calibration_data_um(-5_000).unwrap();
        dev.set_xtalk_compensation_rate_mcps(1638).unwrap();
        dev.set_xtalk_compensation_enable(true).unwrap();
        queue_run(&mut dev, 0, 0);

        assert_eq!(dev.perform_offset_calibration(100 << 16), Err(Error::Range));

        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), -5_000);
        assert_eq!(dev.data.current_parameters.range_offset_um, -5_000);
        assert!(dev.get_xtalk_compensation_enable());
        assert_eq!(dev.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 204);
    }

    #[test]
    fn bus_error_during_offset_calibration_restores_the_sequence() {
        let mut dev = new_device();
        dev.set_offset_calibration_data_um(-5_000).unwrap();
        dev.set_sequence_step_enable(SequenceStepId::Tcc, true).unwrap();
        dev.set_limit_check_enable(LimitCheckId::RangeIgnoreThreshold, true).unwrap();
        queue_run(&mut dev, 12, 90);
        dev.bus.fail_next_read_of(VL53L0X_REG_RESULT_RANGE_STATUS);

        assert_eq!(dev.perform_offset_calibration(100 << 16), Err(Error::Bus(MockError)));

        assert_eq!(dev.get_offset_calibration_data_um().unwrap(), -5_000);
        assert!(dev.get_sequence_step_enable(SequenceStepId::Tcc).unwrap());
        assert_eq!(dev.get_limit_check_enable(LimitCheckId::RangeIgnoreThreshold), Ok(true));
    }

    #[test]
    fn offset_calibration_rejects_a_zero_distance() {
        let mut dev = new_device();
        assert_eq!(dev.perform_offset_calibration(0), Err(Error::InvalidParam));
        assert!(dev.bus.writes().is_empty());
    }

    #[test]
    fn ref_calibration_reads_back_the_results() {
        let mut dev = new_device();
        dev.bus.set_register(0, VL53L0X_REG_VHV_CALIBRATION_RESULT, 0x1D);
        dev.bus.set_register(0, VL53L0X_REG_PHASE_CALIBRATION_RESULT, 0x03);
        dev.data.sequence_config = 0xE8;

        assert_eq!(dev.perform_ref_calibration(), Ok((0x1D, 0x03)));

        assert_eq!(dev.bus.writes_to(0, VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG), [0x01u8, 0x02, 0xE8]);
        assert_eq!(dev.bus.writes_to(0, VL53L0X_REG_SYSRANGE_START), [0x41u8, 0x00, 0x01, 0x00]);
        assert_eq!((dev.data.specific.vhv_settings, dev.data.specific.phase_cal), (0x1D, 0x03));
    }

    #[test]
    fn ref_calibration_write_keeps_the_phase_high_bit() {
        let mut dev = new_device();
        dev.bus.set_register(0, VL53L0X_REG_PHASE_CALIBRATION_RESULT, 0x85);

        dev.set_ref_calibration(0x20, 0x02).unwrap();

        assert_eq!(dev.bus.register(0, VL53L0X_REG_VHV_CALIBRATION_RESULT), 0x20);
        assert_eq!(dev.bus.register(0, VL53L0X_REG_PHASE_CALIBRATION_RESULT), 0x82);
        assert_eq!(dev.get_ref_calibration(), Ok((0x20, 0x82)));
    }
}
