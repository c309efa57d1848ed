use bitfield::bitfield;

use crate::consts::*;
use crate::fixed_point::FixPoint1616;
use crate::spad::SpadMap;
use crate::utils::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum DeviceMode {
    SingleRanging = 0,
    ContinuousRanging = 1,
    SingleHistogram = 2,
    ContinuousTimedRanging = 3,
    GpioDrive = 20,
    GpioOsc = 21,
}

impl TryFrom<u8> for DeviceMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceMode::SingleRanging),
            1 => Ok(DeviceMode::ContinuousRanging),
            2 => Ok(DeviceMode::SingleHistogram),
            3 => Ok(DeviceMode::ContinuousTimedRanging),
            20 => Ok(DeviceMode::GpioDrive),
            21 => Ok(DeviceMode::GpioOsc),
            _ => Err(()),
        }
    }
}

/// Operating state of the handle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PalState {
    PoweredDown,
    WaitStaticInit,
    Standby,
    Idle,
    Running,
    Unknown,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    StandbyLevel1,
    StandbyLevel2,
    IdleLevel1,
    IdleLevel2,
}

/// The six limit checks, in register order. The discriminant indexes the
/// limit check arrays of the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LimitCheckId {
    SigmaFinalRange = 0,
    SignalRateFinalRange = 1,
    SignalRefClip = 2,
    RangeIgnoreThreshold = 3,
    SignalRateMsrc = 4,
    SignalRatePreRange = 5,
}

impl LimitCheckId {
    pub const ALL: [LimitCheckId; VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS] = [
        LimitCheckId::SigmaFinalRange,
        LimitCheckId::SignalRateFinalRange,
        LimitCheckId::SignalRefClip,
        LimitCheckId::RangeIgnoreThreshold,
        LimitCheckId::SignalRateMsrc,
        LimitCheckId::SignalRatePreRange,
    ];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum GpioFunctionality {
    Off = VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_DISABLED,
    ThresholdCrossedLow = VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_LOW,
    ThresholdCrossedHigh = VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_HIGH,
    ThresholdCrossedOut = VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_OUT_OF_WINDOW,
    NewMeasureReady = VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_NEW_SAMPLE_READY,
}

impl TryFrom<u8> for GpioFunctionality {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_DISABLED => Ok(GpioFunctionality::Off),
            VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_LOW => Ok(GpioFunctionality::ThresholdCrossedLow),
            VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_LEVEL_HIGH => Ok(GpioFunctionality::ThresholdCrossedHigh),
            VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_OUT_OF_WINDOW => Ok(GpioFunctionality::ThresholdCrossedOut),
            VL53L0X_REG_SYSTEM_INTERRUPT_GPIO_NEW_SAMPLE_READY => Ok(GpioFunctionality::NewMeasureReady),
            _ => Err(()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptPolarity {
    Low,
    High,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequenceStepId {
    Tcc,
    Dss,
    Msrc,
    PreRange,
    FinalRange,
}

bitfield! {
    /// SYSTEM_SEQUENCE_CONFIG. DSS owns bits 5 and 3, only bit 3 is read back.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct SequenceConfig(u8);
    impl Debug;
    pub final_range, set_final_range: 7;
    pub pre_range, set_pre_range: 6;
    pub dss, _: 3;
    pub tcc, set_tcc: 4;
    pub msrc, set_msrc: 2;
}

impl SequenceConfig {
    pub fn set_dss(&mut self, enabled: bool) {
        if enabled {
            self.0 |= 0x28;
        } else {
            self.0 &= !0x28;
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SequenceStepEnables {
    pub tcc: bool,
    pub msrc: bool,
    pub dss: bool,
    pub pre_range: bool,
    pub final_range: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LimitCheck {
    pub enable: bool,
    pub value: FixPoint1616,
}

/// User facing configuration, applied as a whole by `set_device_parameters`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceParameters {
    pub device_mode: DeviceMode,
    pub measurement_timing_budget_us: u32,
    pub inter_measurement_period_ms: u32,
    pub xtalk_compensation_enable: bool,
    pub xtalk_compensation_rate_mcps: FixPoint1616,
    pub range_offset_um: i32,
    pub limit_checks: [LimitCheck; VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS],
}

impl DeviceParameters {
    pub fn new() -> Self {
        DeviceParameters {
            device_mode: DeviceMode::SingleRanging,
            measurement_timing_budget_us: VL53L0X_DEFAULT_TIMING_BUDGET_US,
            inter_measurement_period_ms: 0,
            xtalk_compensation_enable: false,
            xtalk_compensation_rate_mcps: 0,
            range_offset_um: 0,
            limit_checks: [LimitCheck::default(); VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS],
        }
    }

    pub fn limit_check(&self, id: LimitCheckId) -> LimitCheck {
        self.limit_checks[id as usize]
    }
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Part specific values: read from the device or produced by calibration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceSpecificParameters {
    pub osc_frequency_mhz: FixPoint1616,
    pub pre_range_timeout_us: u32,
    pub final_range_timeout_us: u32,
    pub pre_range_vcsel_pulse_period: u8,
    pub final_range_vcsel_pulse_period: u8,
    pub sigma_est_ref_array: u16,
    pub sigma_est_eff_pulse_width: u16,
    pub sigma_est_eff_amb_width: u16,
    /// Reference SPAD target rate, 9.7 MCPS.
    pub target_ref_rate: u16,
    pub nvm_spad_info_read: bool,
    pub nvm_reference_spad_count: u8,
    pub nvm_reference_spad_type_aperture: bool,
    pub ref_spads_initialised: bool,
    pub reference_spad_count: u8,
    pub reference_spad_type_aperture: bool,
    pub ref_spad_enables: SpadMap,
    pub ref_good_spad_map: SpadMap,
    pub vhv_settings: u8,
    pub phase_cal: u8,
}

impl DeviceSpecificParameters {
    pub fn new() -> Self {
        DeviceSpecificParameters {
            osc_frequency_mhz: VL53L0X_DEFAULT_OSC_FREQUENCY_MHZ,
            pre_range_timeout_us: VL53L0X_PRE_RANGE_TIMEOUT_US,
            final_range_timeout_us: VL53L0X_DEFAULT_TIMING_BUDGET_US
                - VL53L0X_PRE_RANGE_TIMEOUT_US
                - VL53L0X_TCC_DCC_TIMEOUT_US
                - VL53L0X_ADDITIONAL_OVERHEAD_US,
            pre_range_vcsel_pulse_period: 14,
            final_range_vcsel_pulse_period: 10,
            sigma_est_ref_array: VL53L0X_SIGMA_EST_REF_ARRAY,
            sigma_est_eff_pulse_width: VL53L0X_SIGMA_EST_EFF_PULSE_WIDTH,
            sigma_est_eff_amb_width: VL53L0X_SIGMA_EST_EFF_AMB_WIDTH,
            target_ref_rate: VL53L0X_REF_SPAD_TARGET_RATE,
            nvm_spad_info_read: false,
            nvm_reference_spad_count: 0,
            nvm_reference_spad_type_aperture: false,
            ref_spads_initialised: false,
            reference_spad_count: 0,
            reference_spad_type_aperture: false,
            ref_spad_enables: SpadMap::new(),
            ref_good_spad_map: SpadMap::all_good(),
            vhv_settings: 0,
            phase_cal: 0,
        }
    }
}

impl Default for DeviceSpecificParameters {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one ranging measurement. Rates are 16.16 MCPS, the effective
/// SPAD count is 8.8 and the sigma estimate 16.16 mm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangingMeasurement {
    pub range_mm: u16,
    pub range_fractional_part: u8,
    pub signal_rate_rtn_mcps: FixPoint1616,
    pub ambient_rate_rtn_mcps: FixPoint1616,
    /// 8.8 fixed point, whole SPADs are the count divided by 256.
    pub effective_spad_rtn_count: u16,
    pub device_range_status: u8,
    pub range_status: u8,
    pub sigma_estimate: FixPoint1616,
}

impl RangingMeasurement {
    pub fn is_valid(&self) -> bool {
        self.range_status == VL53L0X_RANGE_STATUS_VALID
    }
}

/// Everything the driver keeps about one part.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParameterStore {
    pub current_parameters: DeviceParameters,
    pub specific: DeviceSpecificParameters,
    pub pal_state: PalState,
    pub power_mode: PowerMode,
    pub stop_variable: u8,
    pub sequence_config: u8,
    pub range_fractional_enable: bool,
    pub linearity_corrective_gain: u16,
    pub pin0_gpio_functionality: GpioFunctionality,
    pub limit_checks_status: [bool; VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS],
    pub last_signal_ref_mcps: FixPoint1616,
    pub last_range_measurement: RangingMeasurement,
    pub use_io_2v8: bool,
}

impl ParameterStore {
    pub fn new() -> Self {
        ParameterStore {
            current_parameters: DeviceParameters::new(),
            specific: DeviceSpecificParameters::new(),
            pal_state: PalState::PoweredDown,
            power_mode: PowerMode::IdleLevel1,
            stop_variable: 0,
            sequence_config: 0,
            range_fractional_enable: false,
            linearity_corrective_gain: VL53L0X_DEFAULT_LINEARITY_CORRECTIVE_GAIN,
            pin0_gpio_functionality: GpioFunctionality::Off,
            limit_checks_status: [false; VL53L0X_CHECKENABLE_NUMBER_OF_CHECKS],
            last_signal_ref_mcps: 0,
            last_range_measurement: RangingMeasurement::default(),
            use_io_2v8: true,
        }
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Flat record of the configuration and calibration state of one part. It
/// can be stored by the application and re-applied with `restore` after a
/// restart, as long as the physical part is the same.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PersistedState {
    pub parameters: DeviceParameters,
    pub ref_spads_initialised: bool,
    pub reference_spad_count: u8,
    pub reference_spad_type_aperture: bool,
    pub ref_spad_enables: SpadMap,
    pub ref_good_spad_map: SpadMap,
    pub last_measurement: RangingMeasurement,
    pub vhv_settings: u8,
    pub phase_cal: u8,
}

/// Big endian cursor over a persisted record. Each field starts where the
/// previous one ended.
struct RecordWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> RecordWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        RecordWriter { buf, pos: 0 }
    }

    fn next(&mut self, len: usize) -> &mut [u8] {
        let start = self.pos;
        self.pos += len;
        &mut self.buf[start..start + len]
    }

    fn u8(&mut self, value: u8) {
        self.next(1)[0] = value;
    }

    fn bool(&mut self, value: bool) {
        self.u8(value as u8);
    }

    fn u16(&mut self, value: u16) {
        from_u16_to_u8(&[value], self.next(2));
    }

    fn u32(&mut self, value: u32) {
        from_u32_to_u8(&[value], self.next(4));
    }

    fn i32(&mut self, value: i32) {
        from_i32_to_u8(&[value], self.next(4));
    }

    fn bytes(&mut self, value: &[u8]) {
        self.next(value.len()).copy_from_slice(value);
    }
}

struct RecordReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        RecordReader { buf, pos: 0 }
    }

    fn next(&mut self, len: usize) -> Option<&'a [u8]> {
        let buf: &'a [u8] = self.buf;
        let field = buf.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(field)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.next(1)?[0])
    }

    fn bool(&mut self) -> Option<bool> {
        Some(self.u8()? != 0)
    }

    fn u16(&mut self) -> Option<u16> {
        let mut value = [0u16; 1];
        from_u8_to_u16(self.next(2)?, &mut value);
        Some(value[0])
    }

    fn u32(&mut self) -> Option<u32> {
        let mut value = [0u32; 1];
        from_u8_to_u32(self.next(4)?, &mut value);
        Some(value[0])
    }

    fn i32(&mut self) -> Option<i32> {
        let mut value = [0i32; 1];
        from_u8_to_i32(self.next(4)?, &mut value);
        Some(value[0])
    }

    fn spad_map(&mut self) -> Option<SpadMap> {
        let mut map = SpadMap::new();
        map.0.copy_from_slice(self.next(VL53L0X_REF_SPAD_BUFFER_SIZE)?);
        Some(map)
    }
}

impl PersistedState {
    /// Serializes the record, big endian, version byte first.
    pub fn to_bytes(&self) -> [u8; VL53L0X_PERSISTED_STATE_SIZE] {
        let mut buf = [0u8; VL53L0X_PERSISTED_STATE_SIZE];
        let mut w = RecordWriter::new(&mut buf);
        let params = &self.parameters;

        w.u8(VL53L0X_PERSISTED_STATE_VERSION);
        w.u8(params.device_mode as u8);
        w.u32(params.measurement_timing_budget_us);
        w.u32(params.inter_measurement_period_ms);
        w.bool(params.xtalk_compensation_enable);
        w.u32(params.xtalk_compensation_rate_mcps);
        w.i32(params.range_offset_um);
        for check in params.limit_checks.iter() {
            w.bool(check.enable);
            w.u32(check.value);
        }

        w.bool(self.ref_spads_initialised);
        w.u8(self.reference_spad_count);
        w.bool(self.reference_spad_type_aperture);
        w.bytes(&self.ref_spad_enables.0);
        w.bytes(&self.ref_good_spad_map.0);

        let m = &self.last_measurement;
        w.u16(m.range_mm);
        w.u8(m.range_fractional_part);
        w.u32(m.signal_rate_rtn_mcps);
        w.u32(m.ambient_rate_rtn_mcps);
        w.u16(m.effective_spad_rtn_count);
        w.u8(m.device_range_status);
        w.u8(m.range_status);
        w.u32(m.sigma_estimate);

        w.u8(self.vhv_settings);
        w.u8(self.phase_cal);
        debug_assert_eq!(w.pos, VL53L0X_PERSISTED_STATE_SIZE);
        buf
    }

    /// Parses a record written by `to_bytes`. `None` on a short buffer, an
    /// unknown version or an unknown device mode.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        let mut r = RecordReader::new(buf);
        if r.u8()? != VL53L0X_PERSISTED_STATE_VERSION {
            return None;
        }

        let mut params = DeviceParameters::new();
        params.device_mode = DeviceMode::try_from(r.u8()?).ok()?;
        params.measurement_timing_budget_us = r.u32()?;
        params.inter_measurement_period_ms = r.u32()?;
        params.xtalk_compensation_enable = r.bool()?;
        params.xtalk_compensation_rate_mcps = r.u32()?;
        params.range_offset_um = r.i32()?;
        for check in params.limit_checks.iter_mut() {
            check.enable = r.bool()?;
            check.value = r.u32()?;
        }

        let ref_spads_initialised = r.bool()?;
        let reference_spad_count = r.u8()?;
        let reference_spad_type_aperture = r.bool()?;
        let ref_spad_enables = r.spad_map()?;
        let ref_good_spad_map = r.spad_map()?;

        let last_measurement = RangingMeasurement {
            range_mm: r.u16()?,
            range_fractional_part: r.u8()?,
            signal_rate_rtn_mcps: r.u32()?,
            ambient_rate_rtn_mcps: r.u32()?,
            effective_spad_rtn_count: r.u16()?,
            device_range_status: r.u8()?,
            range_status: r.u8()?,
            sigma_estimate: r.u32()?,
        };

        Some(PersistedState {
            parameters: params,
            ref_spads_initialised,
            reference_spad_count,
            reference_spad_type_aperture,
            ref_spad_enables,
            ref_good_spad_map,
            last_measurement,
            vhv_settings: r.u8()?,
            phase_cal: r.u8()?,
        })
    }
}
