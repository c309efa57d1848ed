use crate::consts::*;
use crate::fixed_point::*;
use crate::parameters::SequenceConfig;
use crate::{
    BusOperation, DelayNs, DeviceMode, DeviceParameters, Error, LimitCheck, LimitCheckId, OutputPin, PalState,
    PersistedState, PowerMode, SequenceStepEnables, SequenceStepId, Vl53l0x,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub build: u8,
    pub revision: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceInfo {
    pub name: &'static str,
    pub device_type: &'static str,
    pub product_type: u8,
    pub product_revision_major: u8,
    pub product_revision_minor: u8,
    pub module_id: u8,
    pub nvm_revision: u8,
}

/// This function returns the version of the driver.
pub fn get_version() -> Version {
    Version {
        major: VL53L0X_IMPLEMENTATION_VER_MAJOR,
        minor: VL53L0X_IMPLEMENTATION_VER_MINOR,
        build: VL53L0X_IMPLEMENTATION_VER_SUB,
        revision: VL53L0X_IMPLEMENTATION_VER_REVISION,
    }
}

fn device_name(nvm_revision: u8) -> &'static str {
    match nvm_revision {
        0 => VL53L0X_STRING_DEVICE_INFO_NAME_TS0,
        1..=34 => VL53L0X_STRING_DEVICE_INFO_NAME_TS1,
        35..=38 => VL53L0X_STRING_DEVICE_INFO_NAME_TS2,
        _ => VL53L0X_STRING_DEVICE_INFO_NAME_ES1,
    }
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// This function gets the product revision from the identification
    /// register.
    ///
    /// # Return
    ///
    /// `(major, minor)` : Major is always 1.
    pub fn get_product_revision(&mut self) -> Result<(u8, u8), Error<B::Error>> {
        let revision_id = self.read_byte(VL53L0X_REG_IDENTIFICATION_REVISION_ID)?;
        Ok((1, (revision_id & 0xF0) >> 4))
    }

    /// This function returns the device info. The NVM is only read on the
    /// first call, the result is kept in the handle.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo, Error<B::Error>> {
        if let Some(info) = self.device_info {
            return Ok(info);
        }
        let (module_id, nvm_revision) = self.read_nvm_module_info()?;
        let product_type = self.read_byte(VL53L0X_REG_IDENTIFICATION_MODEL_ID)?;
        let (product_revision_major, product_revision_minor) = self.get_product_revision()?;

        let info = DeviceInfo {
            name: device_name(nvm_revision),
            device_type: VL53L0X_STRING_DEVICE_INFO_TYPE,
            product_type,
            product_revision_major,
            product_revision_minor,
            module_id,
            nvm_revision,
        };
        self.device_info = Some(info);
        Ok(info)
    }

    pub fn get_pal_state(&self) -> PalState {
        self.data.pal_state
    }

    /// This function sets the device mode used by the next measurement start.
    /// Histogram modes are not available on this part.
    pub fn set_device_mode(&mut self, device_mode: DeviceMode) -> Result<(), Error<B::Error>> {
        match device_mode {
            DeviceMode::SingleHistogram => Err(Error::ModeNotSupported),
            _ => {
                self.data.current_parameters.device_mode = device_mode;
                Ok(())
            }
        }
    }

    pub fn get_device_mode(&self) -> DeviceMode {
        self.data.current_parameters.device_mode
    }

    /// This function sets the period between two timed measurements. The
    /// register counts oscillator periods when the calibration value is known.
    ///
    /// # Arguments
    ///
    /// * `period_ms` : Inter measurement period in milliseconds.
    pub fn set_inter_measurement_period_ms(&mut self, period_ms: u32) -> Result<(), Error<B::Error>> {
        let osc_calibrate_val = self.read_word(VL53L0X_REG_OSC_CALIBRATE_VAL)?;
        let period = if osc_calibrate_val != 0 {
            period_ms.wrapping_mul(osc_calibrate_val as u32)
        } else {
            period_ms
        };
        self.write_dword(VL53L0X_REG_SYSTEM_INTERMEASUREMENT_PERIOD, period)?;
        self.data.current_parameters.inter_measurement_period_ms = period_ms;
        Ok(())
    }

    pub fn get_inter_measurement_period_ms(&mut self) -> Result<u32, Error<B::Error>> {
        let osc_calibrate_val = self.read_word(VL53L0X_REG_OSC_CALIBRATE_VAL)?;
        let period = self.read_dword(VL53L0X_REG_SYSTEM_INTERMEASUREMENT_PERIOD)?;
        let period_ms = if osc_calibrate_val != 0 { period / osc_calibrate_val as u32 } else { period };
        self.data.current_parameters.inter_measurement_period_ms = period_ms;
        Ok(period_ms)
    }

    /// This function enables or disables one limit check. Only the signal
    /// rate checks live in the device, the others are evaluated by the
    /// driver on every measurement.
    pub fn set_limit_check_enable(&mut self, id: LimitCheckId, enable: bool) -> Result<(), Error<B::Error>> {
        let value = if enable { self.data.current_parameters.limit_check(id).value } else { 0 };
        match id {
            LimitCheckId::SignalRateFinalRange => {
                self.write_word(
                    VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT,
                    fixpoint1616_to_fixpoint97(value),
                )?;
            }
            LimitCheckId::SignalRateMsrc => {
                self.update_byte(VL53L0X_REG_MSRC_CONFIG_CONTROL, 0xFD, (!enable as u8) << 1)?;
            }
            LimitCheckId::SignalRatePreRange => {
                self.update_byte(VL53L0X_REG_MSRC_CONFIG_CONTROL, 0xEF, (!enable as u8) << 4)?;
            }
            LimitCheckId::SigmaFinalRange | LimitCheckId::SignalRefClip | LimitCheckId::RangeIgnoreThreshold => {}
        }
        self.data.current_parameters.limit_checks[id as usize].enable = enable;
        Ok(())
    }

    pub fn get_limit_check_enable(&self, id: LimitCheckId) -> Result<bool, Error<B::Error>> {
        Ok(self.data.current_parameters.limit_check(id).enable)
    }

    /// This function sets the limit of one check. A disabled check only
    /// remembers the value, it reaches the device when the check is enabled.
    ///
    /// # Arguments
    ///
    /// * `value` : Limit in 16.16, mm for sigma and MCPS for the rate checks.
    pub fn set_limit_check_value(&mut self, id: LimitCheckId, value: FixPoint1616) -> Result<(), Error<B::Error>> {
        if self.data.current_parameters.limit_check(id).enable {
            match id {
                LimitCheckId::SignalRateFinalRange => {
                    self.write_word(
                        VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT,
                        fixpoint1616_to_fixpoint97(value),
                    )?;
                }
                LimitCheckId::SignalRateMsrc | LimitCheckId::SignalRatePreRange => {
                    self.write_word(VL53L0X_REG_PRE_RANGE_MIN_COUNT_RATE_RTN_LIMIT, fixpoint1616_to_fixpoint97(value))?;
                }
                LimitCheckId::SigmaFinalRange | LimitCheckId::SignalRefClip | LimitCheckId::RangeIgnoreThreshold => {}
            }
        }
        self.data.current_parameters.limit_checks[id as usize].value = value;
        Ok(())
    }

    /// This function gets the limit of one check. For the final range signal
    /// rate a zero register means the check is off, the stored value is
    /// returned then.
    pub fn get_limit_check_value(&mut self, id: LimitCheckId) -> Result<FixPoint1616, Error<B::Error>> {
        match id {
            LimitCheckId::SignalRateFinalRange => {
                let reg = self.read_word(VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT)?;
                let check = &mut self.data.current_parameters.limit_checks[id as usize];
                if reg == 0 {
                    check.enable = false;
                } else {
                    check.value = fixpoint97_to_fixpoint1616(reg);
                    check.enable = true;
                }
                Ok(check.value)
            }
            LimitCheckId::SignalRateMsrc | LimitCheckId::SignalRatePreRange => {
                let reg = self.read_word(VL53L0X_REG_PRE_RANGE_MIN_COUNT_RATE_RTN_LIMIT)?;
                Ok(fixpoint97_to_fixpoint1616(reg))
            }
            _ => Ok(self.data.current_parameters.limit_check(id).value),
        }
    }

    /// This function tells whether a check failed on the last measurement.
    /// Always false for a disabled check.
    pub fn get_limit_check_status(&self, id: LimitCheckId) -> bool {
        self.data.limit_checks_status[id as usize]
    }

    /// This function returns the value the check compared on the last
    /// measurement.
    pub fn get_limit_check_current(&self, id: LimitCheckId) -> FixPoint1616 {
        let last = &self.data.last_range_measurement;
        match id {
            LimitCheckId::SigmaFinalRange => last.sigma_estimate,
            LimitCheckId::SignalRefClip => self.data.last_signal_ref_mcps,
            LimitCheckId::SignalRateFinalRange
            | LimitCheckId::RangeIgnoreThreshold
            | LimitCheckId::SignalRateMsrc
            | LimitCheckId::SignalRatePreRange => last.signal_rate_rtn_mcps,
        }
    }

    /// This function enables or disables one step of the ranging sequence.
    /// The register is only written when it changes.
    pub fn set_sequence_step_enable(&mut self, step: SequenceStepId, enable: bool) -> Result<(), Error<B::Error>> {
        let current = self.read_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG)?;
        let mut config = SequenceConfig(current);
        match step {
            SequenceStepId::Tcc => config.set_tcc(enable),
            SequenceStepId::Dss => config.set_dss(enable),
            SequenceStepId::Msrc => config.set_msrc(enable),
            SequenceStepId::PreRange => config.set_pre_range(enable),
            SequenceStepId::FinalRange => config.set_final_range(enable),
        }
        if config.0 != current {
            self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, config.0)?;
        }
        self.data.sequence_config = config.0;
        Ok(())
    }

    pub fn get_sequence_step_enable(&mut self, step: SequenceStepId) -> Result<bool, Error<B::Error>> {
        let enables = self.get_sequence_step_enables()?;
        Ok(match step {
            SequenceStepId::Tcc => enables.tcc,
            SequenceStepId::Dss => enables.dss,
            SequenceStepId::Msrc => enables.msrc,
            SequenceStepId::PreRange => enables.pre_range,
            SequenceStepId::FinalRange => enables.final_range,
        })
    }

    pub fn get_sequence_step_enables(&mut self) -> Result<SequenceStepEnables, Error<B::Error>> {
        let config = SequenceConfig(self.read_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG)?);
        self.data.sequence_config = config.0;
        Ok(SequenceStepEnables {
            tcc: config.tcc(),
            msrc: config.msrc(),
            dss: config.dss(),
            pre_range: config.pre_range(),
            final_range: config.final_range(),
        })
    }

    /// This function enables the 2 bit fractional part of the range.
    pub fn set_range_fraction_enable(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SYSTEM_RANGE_CONFIG, enable as u8)?;
        self.data.range_fractional_enable = enable;
        Ok(())
    }

    pub fn get_fraction_enable(&mut self) -> Result<bool, Error<B::Error>> {
        let enable = self.read_byte(VL53L0X_REG_SYSTEM_RANGE_CONFIG)? & 0x01 != 0;
        self.data.range_fractional_enable = enable;
        Ok(enable)
    }

    /// This function sets the power mode. Only the level 1 modes exist on
    /// this part. Going back to idle runs the static initialization again.
    pub fn set_power_mode(&mut self, power_mode: PowerMode) -> Result<(), Error<B::Error>> {
        match power_mode {
            PowerMode::StandbyLevel1 => {
                self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
                self.data.pal_state = PalState::Standby;
            }
            PowerMode::IdleLevel1 => {
                self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
                self.static_init()?;
            }
            PowerMode::StandbyLevel2 | PowerMode::IdleLevel2 => return Err(Error::ModeNotSupported),
        }
        self.data.power_mode = power_mode;
        Ok(())
    }

    pub fn get_power_mode(&mut self) -> Result<PowerMode, Error<B::Error>> {
        let power_mode = match self.read_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE)? {
            1 => PowerMode::IdleLevel1,
            _ => PowerMode::StandbyLevel1,
        };
        self.data.power_mode = power_mode;
        Ok(power_mode)
    }

    /// This function applies a whole parameter record.
    pub fn set_device_parameters(&mut self, params: &DeviceParameters) -> Result<(), Error<B::Error>> {
        self.set_device_mode(params.device_mode)?;
        self.set_inter_measurement_period_ms(params.inter_measurement_period_ms)?;
        self.set_xtalk_compensation_rate_mcps(params.xtalk_compensation_rate_mcps)?;
        self.set_xtalk_compensation_enable(params.xtalk_compensation_enable)?;
        self.set_offset_calibration_data_um(params.range_offset_um)?;
        for (id, check) in LimitCheckId::ALL.into_iter().zip(params.limit_checks) {
            self.set_limit_check_value(id, check.value)?;
            self.set_limit_check_enable(id, check.enable)?;
        }
        self.set_measurement_timing_budget(params.measurement_timing_budget_us)?;
        Ok(())
    }

    /// This function reads the parameter record back, from the device where
    /// the value lives there.
    pub fn get_device_parameters(&mut self) -> Result<DeviceParameters, Error<B::Error>> {
        self.get_inter_measurement_period_ms()?;
        self.get_xtalk_compensation_rate_mcps()?;
        self.data.current_parameters.range_offset_um = self.get_offset_calibration_data_um()?;
        for id in LimitCheckId::ALL {
            let value = self.get_limit_check_value(id)?;
            let enable = self.get_limit_check_enable(id)?;
            self.data.current_parameters.limit_checks[id as usize] = LimitCheck { enable, value };
        }
        self.get_measurement_timing_budget()?;
        Ok(self.data.current_parameters)
    }

    /// This function builds the record to persist for this part.
    pub fn checkpoint(&self) -> PersistedState {
        let specific = &self.data.specific;
        PersistedState {
            parameters: self.data.current_parameters,
            ref_spads_initialised: specific.ref_spads_initialised,
            reference_spad_count: specific.reference_spad_count,
            reference_spad_type_aperture: specific.reference_spad_type_aperture,
            ref_spad_enables: specific.ref_spad_enables,
            ref_good_spad_map: specific.ref_good_spad_map,
            last_measurement: self.data.last_range_measurement,
            vhv_settings: specific.vhv_settings,
            phase_cal: specific.phase_cal,
        }
    }

    /// This function re-applies a persisted record without calibrating
    /// again. The handle has to be past `static_init`.
    pub fn restore(&mut self, state: &PersistedState) -> Result<(), Error<B::Error>> {
        if matches!(self.data.pal_state, PalState::PoweredDown | PalState::WaitStaticInit) {
            return Err(Error::InvalidParam);
        }
        self.set_device_parameters(&state.parameters)?;

        self.data.specific.ref_good_spad_map = state.ref_good_spad_map;
        if state.ref_spads_initialised {
            self.restore_ref_spad_map(&state.ref_spad_enables)?;
            let specific = &mut self.data.specific;
            specific.reference_spad_count = state.reference_spad_count;
            specific.reference_spad_type_aperture = state.reference_spad_type_aperture;
            specific.ref_spads_initialised = true;
        }
        self.set_ref_calibration(state.vhv_settings, state.phase_cal)?;
        self.data.last_range_measurement = state.last_measurement;
        debug!("state restored, offset {} um", state.parameters.range_offset_um);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock::new_device;
    use crate::SpadMap;

    #[test]
    fn disabled_limit_check_value_stays_in_the_store() {
        let mut dev = new_device();
        let id = LimitCheckId::SignalRateFinalRange;
        dev.set_limit_check_enable(id, false).unwrap();
        dev.bus.clear_log();

        dev.set_limit_check_value(id, 1 << 15).unwrap();
        assert!(dev.bus.writes().is_empty());
        assert_eq!(dev.data.current_parameters.limit_check(id).value, 1 << 15);

        dev.set_limit_check_enable(id, true).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT), 0x0040);
        assert_eq!(dev.get_limit_check_value(id), Ok(1 << 15));
    }

    #[test]
    fn final_range_signal_check_reads_zero_as_disabled() {
        let mut dev = new_device();
        let id = LimitCheckId::SignalRateFinalRange;
        dev.set_limit_check_value(id, VL53L0X_DEFAULT_SIGNAL_RATE_LIMIT_MCPS).unwrap();

        assert_eq!(dev.get_limit_check_value(id), Ok(VL53L0X_DEFAULT_SIGNAL_RATE_LIMIT_MCPS));
        assert_eq!(dev.get_limit_check_enable(id), Ok(false));

        dev.bus.set_word(0, VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT, 0x0100);
        assert_eq!(dev.get_limit_check_value(id), Ok(2 << 16));
        assert_eq!(dev.get_limit_check_enable(id), Ok(true));
    }

    #[test]
    fn msrc_and_pre_range_checks_share_the_control_register() {
        let mut dev = new_device();
        dev.bus.set_register(0, VL53L0X_REG_MSRC_CONFIG_CONTROL, 0x00);

        dev.set_limit_check_enable(LimitCheckId::SignalRateMsrc, false).unwrap();
        dev.set_limit_check_enable(LimitCheckId::SignalRatePreRange, false).unwrap();
        assert_eq!(dev.bus.register(0, VL53L0X_REG_MSRC_CONFIG_CONTROL), 0x12);

        dev.set_limit_check_enable(LimitCheckId::SignalRateMsrc, true).unwrap();
        assert_eq!(dev.bus.register(0, VL53L0X_REG_MSRC_CONFIG_CONTROL), 0x10);

        dev.set_limit_check_value(LimitCheckId::SignalRateMsrc, 3 << 16).unwrap();
        assert_eq!(dev.bus.word(0, VL53L0X_REG_PRE_RANGE_MIN_COUNT_RATE_RTN_LIMIT), 3 << 7);
    }

    #[test]
    fn device_parameters_are_read_from_the_device() {
        let mut dev = new_device();
        dev.bus.set_word(0, VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT, 0x0020);
        dev.bus.set_word(0, VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM, 0x0FD8);
        dev.bus.set_word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS, 204);

        let params = dev.get_device_parameters().unwrap();

        assert_eq!(params.range_offset_um, -10_000);
        assert_eq!(params.xtalk_compensation_rate_mcps, 204 << 3);
        assert!(params.xtalk_compensation_enable);
        assert_eq!(
            params.limit_check(LimitCheckId::SignalRateFinalRange),
            LimitCheck { enable: true, value: VL53L0X_DEFAULT_SIGNAL_RATE_LIMIT_MCPS }
        );
        assert_eq!(params, dev.data.current_parameters);
    }

    #[test]
    fn histogram_mode_is_refused() {
        let mut dev = new_device();
        assert_eq!(dev.set_device_mode(DeviceMode::SingleHistogram), Err(Error::ModeNotSupported));
        dev.set_device_mode(DeviceMode::ContinuousTimedRanging).unwrap();
        assert_eq!(dev.get_device_mode(), DeviceMode::ContinuousTimedRanging);
        assert!(dev.bus.writes().is_empty());
    }

    #[test]
    fn inter_measurement_period_counts_oscillator_periods() {
        let mut dev = new_device();
        dev.bus.set_word(0, VL53L0X_REG_OSC_CALIBRATE_VAL, 0x0BD5);

        dev.set_inter_measurement_period_ms(100).unwrap();

        let raw = dev.bus.registers(0, VL53L0X_REG_SYSTEM_INTERMEASUREMENT_PERIOD, 4);
        assert_eq!(raw, (100u32 * 0x0BD5).to_be_bytes());
        assert_eq!(dev.get_inter_measurement_period_ms(), Ok(100));
    }

    #[test]
    fn sequence_steps_follow_the_config_register() {
        let mut dev = new_device();
        dev.bus.set_register(0, VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, 0xFF);

        dev.set_sequence_step_enable(SequenceStepId::Tcc, false).unwrap();
        dev.set_sequence_step_enable(SequenceStepId::Msrc, false).unwrap();
        dev.set_sequence_step_enable(SequenceStepId::Msrc, false).unwrap();

        assert_eq!(dev.bus.writes_to(0, VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG), [0xEFu8, 0xEB]);
        let enables = dev.get_sequence_step_enables().unwrap();
        assert_eq!(
            enables,
            SequenceStepEnables { tcc: false, msrc: false, dss: true, pre_range: true, final_range: true }
        );
        assert_eq!(dev.data.sequence_config, 0xEB);
    }

    #[test]
    fn level_two_power_modes_are_refused() {
        let mut dev = new_device();
        assert_eq!(dev.set_power_mode(PowerMode::StandbyLevel2), Err(Error::ModeNotSupported));
        assert_eq!(dev.set_power_mode(PowerMode::IdleLevel2), Err(Error::ModeNotSupported));

        dev.set_power_mode(PowerMode::StandbyLevel1).unwrap();
        assert_eq!(dev.get_pal_state(), PalState::Standby);
        assert_eq!(dev.get_power_mode(), Ok(PowerMode::StandbyLevel1));
    }

    #[test]
    fn device_info_is_read_once() {
        let mut dev = new_device();
        dev.bus.set_nvm(VL53L0X_NVM_MODULE_ID, 0x0200_0000);
        dev.bus.set_nvm(VL53L0X_NVM_REVISION, 0x2A00_0000);
        dev.bus.set_register(0, VL53L0X_REG_IDENTIFICATION_REVISION_ID, 0x10);

        let info = dev.get_device_info().unwrap();
        assert_eq!(info.name, VL53L0X_STRING_DEVICE_INFO_NAME_ES1);
        assert_eq!((info.module_id, info.nvm_revision), (2, 0x2A));
        assert_eq!((info.product_revision_major, info.product_revision_minor), (1, 1));
        assert_eq!(info.product_type, VL53L0X_MODEL_ID);

        let reads = dev.bus.reads();
        assert_eq!(dev.get_device_info(), Ok(info));
        assert_eq!(dev.bus.reads(), reads);
    }

    #[test]
    fn checkpoint_restores_on_a_fresh_handle() {
        let mut dev = new_device();
        dev.data.pal_state = PalState::Idle;
        dev.set_offset_calibration_data_um(-12_000).unwrap();
        dev.set_xtalk_compensation_rate_mcps(1638).unwrap();
        dev.set_xtalk_compensation_enable(true).unwrap();
        dev.set_reference_spads(6, false).unwrap();
        dev.data.specific.vhv_settings = 0x1D;
        dev.data.specific.phase_cal = 0x03;
        let state = dev.checkpoint();
        let bytes = state.to_bytes();

        let mut fresh = new_device();
        assert_eq!(fresh.restore(&state), Err(Error::InvalidParam));
        fresh.data.pal_state = PalState::Idle;
        fresh.restore(&PersistedState::from_bytes(&bytes).unwrap()).unwrap();

        assert_eq!(fresh.get_offset_calibration_data_um(), Ok(-12_000));
        assert_eq!(fresh.bus.word(0, VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS), 204);
        assert_eq!(fresh.get_reference_spads(), Ok((6, false)));
        assert_eq!(fresh.data.specific.ref_spad_enables, SpadMap([0x3F, 0, 0, 0, 0, 0]));
        assert_eq!(
            fresh.bus.registers(0, VL53L0X_REG_GLOBAL_CONFIG_SPAD_ENABLES_REF_0, 6),
            [0x3Fu8, 0, 0, 0, 0, 0]
        );
        assert_eq!(fresh.get_ref_calibration(), Ok((0x1D, 0x03)));
        assert_eq!(fresh.checkpoint(), state);
    }

    #[test]
    fn version_is_the_api_release() {
        let version = get_version();
        assert_eq!((version.major, version.minor, version.build), (1, 0, 2));
    }
}
