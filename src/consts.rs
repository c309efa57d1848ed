use embedded_hal::i2c::SevenBitAddress;

use crate::fixed_point::FixPoint1616;

pub const VL53L0X_DEFAULT_I2C_ADDRESS: SevenBitAddress = 0x52 >> 1;

/* Driver version */
pub const VL53L0X_IMPLEMENTATION_VER_MAJOR: u8 = 1;
pub const VL53L0X_IMPLEMENTATION_VER_MINOR: u8 = 0;
pub const VL53L0X_IMPLEMENTATION_VER_SUB: u8 = 2;
pub const VL53L0X_IMPLEMENTATION_VER_REVISION: u32 = 4823;

pub const VL53L0X_TEMPORARY_BUFFER_SIZE: usize = 16;

pub const VL53L0X_MODEL_ID: u8 = 0xEE;

/* Register map */
pub const VL53L0X_REG_SYSRANGE_START: u8 = 0x00;
pub const VL53L0X_REG_SYSRANGE_MODE_START_STOP: u8 = 0x01;
pub const VL53L0X_REG_SYSRANGE_MODE_SINGLESHOT: u8 = 0x00;
pub const VL53L0X_REG_SYSRANGE_MODE_BACKTOBACK: u8 = 0x02;
pub const VL53L0X_REG_SYSRANGE_MODE_TIMED: u8 = 0x04;

pub const VL53L0X_REG_SYSTEM_THRESH_HIGH: u8 = 0x0C;
pub const VL53L0X_REG_SYSTEM_THRESH_LOW: u8 = 0x0E;
pub const VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG: u8 = 0x01;
pub const VL53L0X_REG_SYSTEM_RANGE_CONFIG: u8 = 0x09;
pub const VL53L0X_REG_SYSTEM_INTERMEASUREMENT_PERIOD: u8 = 0x04;

pub const VL53L0X_REG_SYSTEM_INTERRUPT_CONFIG_GPIO: u8 = 0x0A;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_DISABLED: u8 = 0x00;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_LOW: u8 = 0x01;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_HIGH: u8 = 0x02;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_OUT_OF_WINDOW: u8 = 0x03;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_NEW_SAMPLE_READY: u8 = 0x04;

pub const VL53L0X_REG_GPIO_HV_MUX_ACTIVE_HIGH: u8 = 0x84;
pub const VL53L0X_REG_SYSTEM_INTERRUPT_CLEAR: u8 = 0x0B;

pub const VL53L0X_REG_RESULT_INTERRUPT_STATUS: u8 = 0x13;
pub const VL53L0X_REG_RESULT_RANGE_STATUS: u8 = 0x14;
pub const VL53L0X_REG_RESULT_PEAK_SIGNAL_RATE_REF: u8 = 0xB6;

pub const VL53L0X_REG_ALGO_PART_TO_PART_RANGE_OFFSET_MM: u8 = 0x28;
pub const VL53L0X_REG_I2C_SLAVE_DEVICE_ADDRESS: u8 = 0x8A;

pub const VL53L0X_REG_MSRC_CONFIG_CONTROL: u8 = 0x60;
pub const VL53L0X_REG_PRE_RANGE_CONFIG_VALID_PHASE_LOW: u8 = 0x56;
pub const VL53L0X_REG_PRE_RANGE_CONFIG_VALID_PHASE_HIGH: u8 = 0x57;
pub const VL53L0X_REG_PRE_RANGE_MIN_COUNT_RATE_RTN_LIMIT: u8 = 0x64;
pub const VL53L0X_REG_FINAL_RANGE_CONFIG_VALID_PHASE_LOW: u8 = 0x47;
pub const VL53L0X_REG_FINAL_RANGE_CONFIG_VALID_PHASE_HIGH: u8 = 0x48;
pub const VL53L0X_REG_FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT: u8 = 0x44;
pub const VL53L0X_REG_PRE_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x50;
pub const VL53L0X_REG_PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x51;
pub const VL53L0X_REG_FINAL_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x70;
pub const VL53L0X_REG_FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x71;
pub const VL53L0X_REG_CROSSTALK_COMPENSATION_PEAK_RATE_MCPS: u8 = 0x20;
pub const VL53L0X_REG_MSRC_CONFIG_TIMEOUT_MACROP: u8 = 0x46;

pub const VL53L0X_REG_SOFT_RESET_GO2_SOFT_RESET_N: u8 = 0xBF;
pub const VL53L0X_REG_IDENTIFICATION_MODEL_ID: u8 = 0xC0;
pub const VL53L0X_REG_IDENTIFICATION_REVISION_ID: u8 = 0xC2;
pub const VL53L0X_REG_OSC_CALIBRATE_VAL: u8 = 0xF8;

pub const VL53L0X_REG_GLOBAL_CONFIG_VCSEL_WIDTH: u8 = 0x32;
pub const VL53L0X_REG_GLOBAL_CONFIG_SPAD_ENABLES_REF_0: u8 = 0xB0;
pub const VL53L0X_REG_GLOBAL_CONFIG_REF_EN_START_SELECT: u8 = 0xB6;
pub const VL53L0X_REG_DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD: u8 = 0x4E;
pub const VL53L0X_REG_DYNAMIC_SPAD_REF_EN_START_OFFSET: u8 = 0x4F;
pub const VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE: u8 = 0x80;
pub const VL53L0X_REG_VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV: u8 = 0x89;
pub const VL53L0X_REG_ALGO_PHASECAL_LIM: u8 = 0x30;
pub const VL53L0X_REG_ALGO_PHASECAL_CONFIG_TIMEOUT: u8 = 0x30;
pub const VL53L0X_REG_VHV_CALIBRATION_RESULT: u8 = 0xCB;
pub const VL53L0X_REG_PHASE_CALIBRATION_RESULT: u8 = 0xEE;

/* Page select and the NVM strobe interface */
pub const VL53L0X_REG_PAGE_SELECT: u8 = 0xFF;
pub const VL53L0X_REG_INTERNAL_TUNING: u8 = 0x91;
pub const VL53L0X_REG_STOP_STATUS: u8 = 0x04;
pub const VL53L0X_REG_NVM_STROBE: u8 = 0x83;
pub const VL53L0X_REG_NVM_SELECT: u8 = 0x94;
pub const VL53L0X_REG_NVM_DATA: u8 = 0x90;
pub const VL53L0X_REG_OSC_FREQUENCY: u8 = 0x84;

pub const VL53L0X_NVM_SPAD_INFO: u8 = 0x6B;
pub const VL53L0X_NVM_GOOD_SPAD_MAP_0: u8 = 0x24;
pub const VL53L0X_NVM_GOOD_SPAD_MAP_1: u8 = 0x25;
pub const VL53L0X_NVM_MODULE_ID: u8 = 0x02;
pub const VL53L0X_NVM_REVISION: u8 = 0x7B;

/* Polling */
pub const VL53L0X_DEFAULT_MAX_LOOP: u32 = 2000;
pub const VL53L0X_POLLING_DELAY_MS: u32 = 1;
pub const VL53L0X_BOOT_DELAY_MS: u32 = 2;
pub const VL53L0X_INTERRUPT_CLEAR_LOOPS: u8 = 3;

/* Timing */
pub const VL53L0X_MACRO_PERIOD_VCLKS: u64 = 2304;
pub const VL53L0X_PLL_PERIOD_SCALE: u64 = 1_000_000 * 65536 / 64;
pub const VL53L0X_DEFAULT_OSC_FREQUENCY_MHZ: FixPoint1616 = 618_660;
pub const VL53L0X_PRE_RANGE_TIMEOUT_US: u32 = 8000;
pub const VL53L0X_TCC_DCC_TIMEOUT_US: u32 = 6000;
pub const VL53L0X_ADDITIONAL_OVERHEAD_US: u32 = 5360;
pub const VL53L0X_MIN_TIMING_BUDGET_US: u32 = 26000;
pub const VL53L0X_DEFAULT_TIMING_BUDGET_US: u32 = 33000;

/* SPAD management */
pub const VL53L0X_REF_SPAD_BUFFER_SIZE: usize = 6;
pub const VL53L0X_REF_SPAD_START_SELECT: u8 = 0xB4;
pub const VL53L0X_REF_SPAD_MAX_COUNT: u32 = 44;
pub const VL53L0X_REF_SPAD_MIN_COUNT: u32 = 5;
pub const VL53L0X_REF_SPAD_NUM_REQUESTED: u8 = 0x2C;
pub const VL53L0X_REF_SPAD_TARGET_RATE: u16 = 0x0A00;
pub const VL53L0X_REF_SPAD_QUADRANT_APERTURE: [u8; 4] = [10, 5, 0, 5];

/* Calibration */
pub const VL53L0X_CALIBRATION_MEASUREMENTS: u32 = 50;
pub const VL53L0X_RANGE_STATUS_VALID: u8 = 11;
pub const VL53L0X_XTALK_SENTINEL_RANGE_MM: u16 = 8888;
pub const VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN: u16 = 1000;
pub const VL53L0X_OFFSET_UNIT_UM: i32 = 250;
pub const VL53L0X_OFFSET_MIN_UM: i32 = -512_000;
pub const VL53L0X_OFFSET_MAX_UM: i32 = 511_000;

/* Limit check defaults */
pub const VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS: usize = 6;
pub const VL53L0X_DEFAULT_SIGMA_LIMIT_MM: FixPoint1616 = 18 << 16;
pub const VL53L0X_DEFAULT_SIGNAL_RATE_LIMIT_MCPS: FixPoint1616 = 25 * 65536 / 100;
pub const VL53L0X_DEFAULT_SIGNAL_REF_CLIP_MCPS: FixPoint1616 = 35 << 16;
pub const VL53L0X_DEFAULT_RANGE_IGNORE_THRESHOLD: FixPoint1616 = 0;

/* Sigma estimator */
pub const VL53L0X_SIGMA_EST_REF_ARRAY: u16 = 100;
pub const VL53L0X_SIGMA_EST_EFF_PULSE_WIDTH: u16 = 900;
pub const VL53L0X_SIGMA_EST_EFF_AMB_WIDTH: u16 = 500;
pub const VL53L0X_SIGMA_EST_MAX: FixPoint1616 = 0x028F_87AE;
pub const VL53L0X_SIGMA_EST_RTN_MAX: u32 = 0xF000;
pub const VL53L0X_TOF_PER_MM_PS: u32 = 0x0006_999A;
pub const VL53L0X_MAX_XTALK_KCPS: u32 = 0x0032_0000;
pub const VL53L0X_VCSEL_PULSE_WIDTH_PS: u32 = 4700;
pub const VL53L0X_DFLT_FINAL_RANGE_INTEGRATION_TIME_MS: u32 = 0x0019_0000;
pub const VL53L0X_SPEED_OF_LIGHT_IN_AIR: u32 = 2997;
pub const VL53L0X_AMB_TO_SIGNAL_RATIO_MAX: u32 = 0xF000_0000;

/* Persisted state record */
pub const VL53L0X_PERSISTED_STATE_VERSION: u8 = 1;
pub const VL53L0X_PERSISTED_STATE_SIZE: usize = 85;

/* Device info strings */
pub const VL53L0X_STRING_DEVICE_INFO_NAME_TS0: &str = "VL53L0X TS0";
pub const VL53L0X_STRING_DEVICE_INFO_NAME_TS1: &str = "VL53L0X TS1";
pub const VL53L0X_STRING_DEVICE_INFO_NAME_TS2: &str = "VL53L0X TS2";
pub const VL53L0X_STRING_DEVICE_INFO_NAME_ES1: &str = "VL53L0X ES1 or later";
pub const VL53L0X_STRING_DEVICE_INFO_TYPE: &str = "VL53L0X";

/// Default tuning settings uploaded by `static_init`, as (register, value)
/// pairs. Writes to 0xFF switch the register page.
pub const VL53L0X_DEFAULT_TUNING_SETTINGS: &[(u8, u8)] = &[
    (0xFF, 0x01), (0x00, 0x00),
    (0xFF, 0x00), (0x09, 0x00), (0x10, 0x00), (0x11, 0x00),
    (0x24, 0x01), (0x25, 0xFF), (0x75, 0x00),
    (0xFF, 0x01), (0x4E, 0x2C), (0x48, 0x00), (0x30, 0x20),
    (0xFF, 0x00), (0x30, 0x09), (0x54, 0x00), (0x31, 0x04),
    (0x32, 0x03), (0x40, 0x83), (0x46, 0x25), (0x60, 0x00),
    (0x27, 0x00), (0x50, 0x06), (0x51, 0x00), (0x52, 0x96),
    (0x56, 0x08), (0x57, 0x30), (0x61, 0x00), (0x62, 0x00),
    (0x64, 0x00), (0x65, 0x00), (0x66, 0xA0),
    (0xFF, 0x01), (0x22, 0x32), (0x47, 0x14), (0x49, 0xFF), (0x4A, 0x00),
    (0xFF, 0x00), (0x7A, 0x0A), (0x7B, 0x00), (0x78, 0x21),
    (0xFF, 0x01), (0x23, 0x34), (0x42, 0x00), (0x44, 0xFF),
    (0x45, 0x26), (0x46, 0x05), (0x40, 0x40), (0x0E, 0x06),
    (0x20, 0x1A), (0x43, 0x40),
    (0xFF, 0x00), (0x34, 0x03), (0x35, 0x44),
    (0xFF, 0x01), (0x31, 0x04), (0x4B, 0x09), (0x4C, 0x05), (0x4D, 0x04),
    (0xFF, 0x00), (0x44, 0x00), (0x45, 0x20), (0x47, 0x08),
    (0x48, 0x28), (0x67, 0x00), (0x70, 0x04), (0x71, 0x01),
    (0x72, 0xFE), (0x76, 0x00), (0x77, 0x00),
    (0xFF, 0x01), (0x0D, 0x01),
    (0xFF, 0x00), (0x80, 0x01), (0x01, 0xF8),
    (0xFF, 0x01), (0x8E, 0x01), (0x00, 0x01),
    (0xFF, 0x00), (0x80, 0x00),
];
