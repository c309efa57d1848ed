use consts::*;
use crate::{consts, Vl53l0x, Error, SevenBitAddress, I2c, OutputPin, DelayNs};

pub trait BusOperation {
    type Error;

    fn read(&mut self, rbuf: &mut [u8]) -> Result<(), Self::Error>;
    fn write(&mut self, wbuf: &[u8]) -> Result<(), Self::Error>;
    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<(), Self::Error>;
}

pub struct Vl53l0xI2C<P> {
    i2c: P,
    address: SevenBitAddress,
}

impl<P: I2c> Vl53l0xI2C<P> {
    pub(crate) fn new(i2c: P) -> Self {
        Vl53l0xI2C { i2c, address: VL53L0X_DEFAULT_I2C_ADDRESS }
    }

    pub fn address(&self) -> SevenBitAddress {
        self.address
    }
}

impl<P: I2c> BusOperation for Vl53l0xI2C<P> {
    type Error = P::Error;
    #[inline]
    fn read(&mut self, rbuf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.read(self.address, rbuf)?;

        Ok(())
    }

    #[inline]
    fn write(&mut self, wbuf: &[u8]) -> Result<(), Self::Error> {
        self.i2c.write(self.address, wbuf)?;

        Ok(())
    }

    #[inline]
    fn write_read(&mut self, wbuf: &[u8], rbuf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(self.address, wbuf, rbuf)?;

        Ok(())
    }
}

impl<P, XSHUT, T> Vl53l0x<Vl53l0xI2C<P>, XSHUT, T>
    where
    P: I2c,
    XSHUT: OutputPin,
    T: DelayNs
{
    pub fn new_i2c(i2c: P, xshut_pin: XSHUT, tim: T) -> Result<Self, Error<P::Error>> {
        Ok(Vl53l0x::new(Vl53l0xI2C::new(i2c), xshut_pin, tim))
    }

    /// Moves the device to a new 7-bit address. Only kept until the next
    /// power cycle.
    pub fn set_i2c_address(&mut self, i2c_address: SevenBitAddress) -> Result<(), Error<P::Error>> {
        self.write_byte(VL53L0X_REG_I2C_SLAVE_DEVICE_ADDRESS, i2c_address & 0x7F)?;
        self.bus.address = i2c_address;

        Ok(())
    }

    /// Power cycles the device through XSHUT, moves it to `address` and runs
    /// the data and static initialization.
    pub fn init_sensor(&mut self, address: SevenBitAddress) -> Result<(), Error<P::Error>> {
        self.off()?;
        self.on()?;
        self.wait_device_booted()?;
        if address != self.bus.address {
            self.set_i2c_address(address)?;
        }
        self.is_alive()?;
        self.data_init()?;
        self.static_init()?;
        debug!("sensor ready at {}", self.bus.address);
        Ok(())
    }
}
