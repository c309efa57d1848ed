use crate::consts::*;
use crate::fixed_point::*;
use crate::utils::from_u8_to_u16;
use crate::{
    BusOperation, DelayNs, DeviceMode, Error, GpioFunctionality, OutputPin, PalState, RangingMeasurement, Vl53l0x,
};

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// This function starts a measurement in the current device mode.
    /// A single ranging start returns once the device took the start bit.
    pub fn start_measurement(&mut self) -> Result<(), Error<B::Error>> {
        let start = match self.data.current_parameters.device_mode {
            DeviceMode::SingleRanging => VL53L0X_REG_SYSRANGE_MODE_START_STOP,
            DeviceMode::ContinuousRanging => VL53L0X_REG_SYSRANGE_MODE_BACKTOBACK,
            DeviceMode::ContinuousTimedRanging => VL53L0X_REG_SYSRANGE_MODE_TIMED,
            _ => return Err(Error::ModeNotSupported),
        };

        let stop_variable = self.data.stop_variable;
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01)?;
        self.write_stop_variable(stop_variable)?;
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
        self.write_byte(VL53L0X_REG_SYSRANGE_START, start)?;

        if start == VL53L0X_REG_SYSRANGE_MODE_START_STOP {
            self.poll_until_clear(
                |dev| Ok(dev.read_byte(VL53L0X_REG_SYSRANGE_START)? & VL53L0X_REG_SYSRANGE_MODE_START_STOP != 0),
                false,
                VL53L0X_DEFAULT_MAX_LOOP,
            )?;
        }
        self.data.pal_state = PalState::Running;
        Ok(())
    }

    /// This function stops a continuous measurement. The handle goes back
    /// to `Idle`.
    pub fn stop_measurement(&mut self) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_SYSRANGE_START, VL53L0X_REG_SYSRANGE_MODE_SINGLESHOT)?;
        self.write_stop_variable(0x00)?;
        self.data.pal_state = PalState::Idle;
        Ok(())
    }

    /// This function checks whether the device finished stopping. The stop
    /// variable is written again once it did.
    ///
    /// # Return
    ///
    /// `stopped` : True when the device is stopped.
    pub fn get_stop_completed_status(&mut self) -> Result<bool, Error<B::Error>> {
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        let status = self.read_byte(VL53L0X_REG_STOP_STATUS)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;

        if status == 0 {
            let stop_variable = self.data.stop_variable;
            self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x01)?;
            self.write_stop_variable(stop_variable)?;
            self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
        }
        Ok(status == 0)
    }

    /// This function checks if a new measurement is available. The GPIO
    /// interrupt status is used when the pin reports new samples, the range
    /// status register otherwise.
    pub fn get_measurement_data_ready(&mut self) -> Result<bool, Error<B::Error>> {
        if self.data.pin0_gpio_functionality == GpioFunctionality::NewMeasureReady {
            let status = self.get_interrupt_mask_status()?;
            Ok(status == GpioFunctionality::NewMeasureReady as u8)
        } else {
            Ok(self.read_byte(VL53L0X_REG_RESULT_RANGE_STATUS)? & 0x01 != 0)
        }
    }

    /// Waits for the running measurement with the polling delay between
    /// two checks.
    pub fn measurement_poll_for_completion(&mut self) -> Result<(), Error<B::Error>> {
        self.poll_until(|dev| dev.get_measurement_data_ready(), true, VL53L0X_DEFAULT_MAX_LOOP)
    }

    /// This function runs one measurement and waits for its completion.
    /// Only available in single ranging mode.
    pub fn perform_single_measurement(&mut self) -> Result<(), Error<B::Error>> {
        if self.data.current_parameters.device_mode != DeviceMode::SingleRanging {
            return Err(Error::ModeNotSupported);
        }
        self.start_measurement()?;
        self.measurement_poll_for_completion()?;
        self.data.pal_state = PalState::Idle;
        Ok(())
    }

    /// This function switches to single ranging, measures once, reads the
    /// result and clears the interrupt.
    pub fn perform_single_ranging_measurement(&mut self) -> Result<RangingMeasurement, Error<B::Error>> {
        self.set_device_mode(DeviceMode::SingleRanging)?;
        self.perform_single_measurement()?;
        let measurement = self.get_ranging_measurement_data()?;
        self.clear_interrupt_mask()?;
        Ok(measurement)
    }

    /// Histograms are not available on this part.
    pub fn perform_single_histogram_measurement(&mut self) -> Result<(), Error<B::Error>> {
        Err(Error::NotImplemented)
    }

    /// This function reads the result block of the last measurement.
    ///
    /// The range gets the linearity gain and, with a gain other than unity,
    /// the cross-talk correction of the driver. A cross-talk at least as
    /// strong as the signal gives the 8888 sentinel. The status comes from
    /// the enabled limit checks.
    ///
    /// # Return
    ///
    /// `measurement` : Also kept as the last measurement of the handle.
    pub fn get_ranging_measurement_data(&mut self) -> Result<RangingMeasurement, Error<B::Error>> {
        self.read_from_register(VL53L0X_REG_RESULT_RANGE_STATUS, 12)?;
        let mut words = [0u16; 6];
        from_u8_to_u16(&self.temp_buffer[..12], &mut words);

        let device_range_status = self.temp_buffer[0];
        let effective_spad_rtn_count = words[1];
        let signal_rate = fixpoint97_to_fixpoint1616(words[3]);
        let ambient_rate = fixpoint97_to_fixpoint1616(words[4]);
        let mut range = words[5];

        let gain = self.data.linearity_corrective_gain;
        let fractional = self.data.range_fractional_enable;
        if gain != VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN {
            range = ((gain as u32 * range as u32 + 500) / 1000) as u16;

            let params = &self.data.current_parameters;
            if params.xtalk_compensation_enable {
                let xtalk = (params.xtalk_compensation_rate_mcps as u64 * effective_spad_rtn_count as u64) >> 8;
                range = if xtalk >= signal_rate as u64 {
                    if fractional {
                        VL53L0X_XTALK_SENTINEL_RANGE_MM
                    } else {
                        VL53L0X_XTALK_SENTINEL_RANGE_MM << 2
                    }
                } else {
                    (range as u64 * signal_rate as u64 / (signal_rate as u64 - xtalk)) as u16
                };
            }
        }

        let mut measurement = RangingMeasurement {
            range_mm: range,
            range_fractional_part: 0,
            signal_rate_rtn_mcps: signal_rate,
            ambient_rate_rtn_mcps: ambient_rate,
            effective_spad_rtn_count,
            device_range_status,
            range_status: 0,
            sigma_estimate: 0,
        };
        if fractional {
            measurement.range_mm = range >> 2;
            measurement.range_fractional_part = ((range & 0x03) << 6) as u8;
        }

        self.get_pal_range_status(&mut measurement)?;
        self.data.last_range_measurement = measurement;
        Ok(measurement)
    }
}
