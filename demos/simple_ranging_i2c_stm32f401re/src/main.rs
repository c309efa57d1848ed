#![no_std]
#![no_main]

use vl53l0x::{
    consts::VL53L0X_DEFAULT_I2C_ADDRESS,
    DeviceMode,
    RangingMeasurement,
    Vl53l0x
};

use panic_halt as _;
use cortex_m_rt::entry;

use core::{fmt::Write, cell::RefCell};

use embedded_hal::i2c::SevenBitAddress;

use stm32f4xx_hal::{
    gpio::{
        Output,
        Pin,
        PinState::High,
        gpioa,
        gpiob,
        Alternate},
    pac::{USART2, Peripherals, TIM1},
    prelude::*,
    serial::{Config, Tx},
    timer::Delay,
    rcc::{Rcc, Clocks}
};

// I2C related imports
use stm32f4xx_hal::{
    pac::I2C1,
    i2c::{I2c as StmI2c, I2c1, Mode}};
use embedded_hal_bus::i2c::RefCellDevice;

fn write_results(tx: &mut Tx<USART2>, m: &RangingMeasurement) {
    writeln!(tx, "\x1B[2H").unwrap();
    writeln!(tx, "VL53L0X Simple Ranging demo application\n").unwrap();

    writeln!(
        tx,
        "\x1b[96m{dis:>16}\x1b[0m \x1b[92m{sta:<8}\x1b[0m",
        dis="Distance [mm]",
        sta="Status"
    ).unwrap();
    writeln!(
        tx,
        "\x1b[96m{dis:>16}\x1b[0m \x1b[92m{sta:<8}\x1b[0m",
        dis=m.range_mm,
        sta=m.range_status
    ).unwrap();
    writeln!(
        tx,
        "\x1b[93m{sig:>16}\x1b[0m \x1b[91m{amb:<16}\x1b[0m",
        sig="Signal [kcps]",
        amb="Ambient [kcps]"
    ).unwrap();
    writeln!(
        tx,
        "\x1b[93m{sig:>16}\x1b[0m \x1b[91m{amb:<16}\x1b[0m",
        sig=(m.signal_rate_rtn_mcps as u64 * 1000) >> 16,
        amb=(m.ambient_rate_rtn_mcps as u64 * 1000) >> 16
    ).unwrap();
}

#[entry]
fn main() -> ! {
    let dp: Peripherals = Peripherals::take().unwrap();
    let rcc: Rcc = dp.RCC.constrain();
    let clocks: Clocks = rcc.cfgr.use_hse(8.MHz()).sysclk(48.MHz()).freeze();
    let tim_top: Delay<TIM1, 1000> = dp.TIM1.delay_ms(&clocks);

    let gpioa: gpioa::Parts = dp.GPIOA.split();
    let gpiob: gpiob::Parts = dp.GPIOB.split();

    let xshut_pin: Pin<'B', 0, Output> = gpiob.pb0.into_push_pull_output_in_state(High);
    let tx_pin: Pin<'A', 2, Alternate<7>> = gpioa.pa2.into_alternate();

    let mut tx: Tx<USART2> = dp.USART2.tx(
        tx_pin,
        Config::default()
        .baudrate(460800.bps())
        .wordlength_8()
        .parity_none(),
        &clocks).unwrap();

    let scl: Pin<'B', 8> = gpiob.pb8;
    let sda: Pin<'B', 9> = gpiob.pb9;

    let i2c: StmI2c<I2C1> = I2c1::new(
        dp.I2C1,
        (scl, sda),
        Mode::Standard{frequency:400.kHz()},
        &clocks);

    let i2c_bus: RefCell<StmI2c<I2C1>> = RefCell::new(i2c);
    let address: SevenBitAddress = VL53L0X_DEFAULT_I2C_ADDRESS;

    let i2c = RefCellDevice::new(&i2c_bus);

    let mut sensor_top = Vl53l0x::new_i2c(
        i2c,
        xshut_pin,
        tim_top).unwrap();

    sensor_top.init_sensor(address).unwrap();
    sensor_top.perform_ref_calibration().unwrap();
    sensor_top.set_measurement_timing_budget(33000).unwrap();
    sensor_top.set_device_mode(DeviceMode::ContinuousRanging).unwrap();
    sensor_top.start_measurement().unwrap();

    loop {
        while !sensor_top.get_measurement_data_ready().unwrap() {} // Wait for data to be ready
        let measurement = sensor_top.get_ranging_measurement_data().unwrap(); // Get and parse the result data
        sensor_top.clear_interrupt_mask().unwrap();
        write_results(&mut tx, &measurement); // Print the result to the output
    }
}
