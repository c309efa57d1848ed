use crate::consts::*;
use crate::fixed_point::FixPoint1616;
use crate::{
    BusOperation, DelayNs, DeviceMode, Error, GpioFunctionality, InterruptPolarity, OutputPin, Vl53l0x,
};

/// Register writes that route the oscillator to GPIO1.
const GPIO_OSC_SETTINGS: &[(u8, u8)] = &[
    (0xFF, 0x01), (0x00, 0x00), (0xFF, 0x00), (0x80, 0x01), (0x85, 0x02),
    (0xFF, 0x04), (0xCD, 0x00), (0xCC, 0x11),
    (0xFF, 0x07), (0xBE, 0x00),
    (0xFF, 0x06), (0xCC, 0x09),
    (0xFF, 0x00), (0xFF, 0x01), (0x00, 0x00),
];

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    /// This function configures the GPIO1 pin of the sensor.
    ///
    /// # Arguments
    ///
    /// * `pin` : Only pin 0 exists.
    /// * `device_mode` : `GpioDrive` drives the pin to the polarity level,
    /// `GpioOsc` outputs the oscillator, any other mode uses the pin as
    /// interrupt.
    /// * `functionality` : Interrupt source.
    /// * `polarity` : Active level of the interrupt.
    pub fn set_gpio_config(
        &mut self,
        pin: u8,
        device_mode: DeviceMode,
        functionality: GpioFunctionality,
        polarity: InterruptPolarity,
    ) -> Result<(), Error<B::Error>> {
        if pin != 0 {
            return Err(Error::GpioNotSupported);
        }
        match device_mode {
            DeviceMode::GpioDrive => {
                let level = match polarity {
                    InterruptPolarity::Low => 0x10,
                    InterruptPolarity::High => 0x01,
                };
                self.write_byte(VL53L0X_REG_GPIO_HV_MUX_ACTIVE_HIGH, level)?;
            }
            DeviceMode::GpioOsc => {
                self.load_tuning_settings(GPIO_OSC_SETTINGS)?;
            }
            _ => {
                self.write_byte(VL53L0X_REG_SYSTEM_INTERRUPT_CONFIG_GPIO, functionality as u8)?;
                let active_high = match polarity {
                    InterruptPolarity::Low => 0x00,
                    InterruptPolarity::High => 0x10,
                };
                self.update_byte(VL53L0X_REG_GPIO_HV_MUX_ACTIVE_HIGH, 0xEF, active_high)?;
                self.data.pin0_gpio_functionality = functionality;
                self.clear_interrupt_mask()?;
            }
        }
        Ok(())
    }

    /// This function reads the interrupt configuration of GPIO1 back.
    ///
    /// # Return
    ///
    /// `(functionality, polarity)`
    pub fn get_gpio_config(&mut self, pin: u8) -> Result<(GpioFunctionality, InterruptPolarity), Error<B::Error>> {
        if pin != 0 {
            return Err(Error::GpioNotSupported);
        }
        let polarity = if self.read_byte(VL53L0X_REG_GPIO_HV_MUX_ACTIVE_HIGH)? & 0x10 == 0 {
            InterruptPolarity::Low
        } else {
            InterruptPolarity::High
        };
        let config = self.read_byte(VL53L0X_REG_SYSTEM_INTERRUPT_CONFIG_GPIO)? & 0x07;
        let functionality = GpioFunctionality::try_from(config).map_err(|_| Error::GpioNotSupported)?;
        self.data.pin0_gpio_functionality = functionality;
        Ok((functionality, polarity))
    }

    /// This function sets the window used by the threshold interrupts.
    /// The device keeps 12 bits in 2 mm steps.
    ///
    /// # Arguments
    ///
    /// * `low_mm` / `high_mm` : Thresholds, 16.16 mm.
    pub fn set_interrupt_thresholds(&mut self, low_mm: FixPoint1616, high_mm: FixPoint1616) -> Result<(), Error<B::Error>> {
        self.write_word(VL53L0X_REG_SYSTEM_THRESH_LOW, ((low_mm >> 17) & 0x0FFF) as u16)?;
        self.write_word(VL53L0X_REG_SYSTEM_THRESH_HIGH, ((high_mm >> 17) & 0x0FFF) as u16)?;
        Ok(())
    }

    pub fn get_interrupt_thresholds(&mut self) -> Result<(FixPoint1616, FixPoint1616), Error<B::Error>> {
        let low = self.read_word(VL53L0X_REG_SYSTEM_THRESH_LOW)? as u32;
        let high = self.read_word(VL53L0X_REG_SYSTEM_THRESH_HIGH)? as u32;
        Ok(((low & 0x0FFF) << 17, (high & 0x0FFF) << 17))
    }

    /// This function returns the pending interrupt sources, bits 2..0 of the
    /// interrupt status. A device error flag in bits 4..3 is reported as
    /// `Range`.
    pub fn get_interrupt_mask_status(&mut self) -> Result<u8, Error<B::Error>> {
        let status = self.read_byte(VL53L0X_REG_RESULT_INTERRUPT_STATUS)?;
        if status & 0x18 != 0 {
            warn!("interrupt status error flag {}", status);
            return Err(Error::Range);
        }
        Ok(status & 0x07)
    }

    /// This function acknowledges the pending interrupt. The clear is
    /// retried a few times before giving up.
    pub fn clear_interrupt_mask(&mut self) -> Result<(), Error<B::Error>> {
        self.poll_until(
            |dev| {
                dev.write_byte(VL53L0X_REG_SYSTEM_INTERRUPT_CLEAR, 0x01)?;
                dev.write_byte(VL53L0X_REG_SYSTEM_INTERRUPT_CLEAR, 0x00)?;
                Ok(dev.read_byte(VL53L0X_REG_RESULT_INTERRUPT_STATUS)? & 0x07 == 0)
            },
            false,
            VL53L0X_INTERRUPT_CLEAR_LOOPS as u32,
        )
        .map_err(|e| match e {
            Error::Timeout => Error::InterruptNotCleared,
            e => e,
        })
    }
}
