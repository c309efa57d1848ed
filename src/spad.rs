use bitfield::bitfield;

use crate::consts::*;
use crate::fixed_point::*;
use crate::{BusOperation, DelayNs, Error, OutputPin, Vl53l0x};

bitfield! {
    /// NVM word 0x6B: reference SPAD count and type.
    #[derive(Copy, Clone)]
    pub struct NvmSpadInfo(u32);
    impl Debug;
    pub u8, reference_spad_count, _: 14, 8;
    pub reference_spad_type_aperture, _: 15;
}

/// Reference SPAD bitmap, bit `i` of the map is SPAD `start_select + i`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpadMap(pub [u8; VL53L0X_REF_SPAD_BUFFER_SIZE]);

impl SpadMap {
    pub const BITS: u32 = (VL53L0X_REF_SPAD_BUFFER_SIZE * 8) as u32;

    pub const fn new() -> Self {
        SpadMap([0; VL53L0X_REF_SPAD_BUFFER_SIZE])
    }

    pub const fn all_good() -> Self {
        SpadMap([0xFF; VL53L0X_REF_SPAD_BUFFER_SIZE])
    }

    pub fn is_set(&self, index: u32) -> bool {
        index < Self::BITS && self.0[(index / 8) as usize] & (1 << (index % 8)) != 0
    }

    /// Sets one bit. Fails outside of the map.
    pub fn enable(&mut self, index: u32) -> Result<(), ()> {
        if index >= Self::BITS {
            return Err(());
        }
        self.0[(index / 8) as usize] |= 1 << (index % 8);
        Ok(())
    }

    /// First set bit at or after `from`.
    pub fn next_set(&self, from: u32) -> Option<u32> {
        (from..Self::BITS).find(|&index| self.is_set(index))
    }

    pub fn count(&self) -> u32 {
        self.0.iter().map(|byte| byte.count_ones()).sum()
    }
}

/// Aperture SPADs sit in the quadrants with a non zero aperture code. The
/// index is the absolute SPAD number, `start_select` included.
pub fn is_aperture(spad_index: u32) -> bool {
    let quadrant = (spad_index >> 6) as usize;
    VL53L0X_REF_SPAD_QUADRANT_APERTURE[quadrant % VL53L0X_REF_SPAD_QUADRANT_APERTURE.len()] != 0
}

impl<B: BusOperation, XSHUT: OutputPin, T: DelayNs> Vl53l0x<B, XSHUT, T> {
    fn set_ref_spad_map(&mut self, map: &SpadMap) -> Result<(), Error<B::Error>> {
        self.write_multi_to_register(VL53L0X_REG_GLOBAL_CONFIG_SPAD_ENABLES_REF_0, &map.0)
    }

    fn get_ref_spad_map(&mut self) -> Result<SpadMap, Error<B::Error>> {
        self.read_from_register(VL53L0X_REG_GLOBAL_CONFIG_SPAD_ENABLES_REF_0, VL53L0X_REF_SPAD_BUFFER_SIZE)?;
        let mut map = SpadMap::new();
        map.0.copy_from_slice(&self.temp_buffer[..VL53L0X_REF_SPAD_BUFFER_SIZE]);
        Ok(map)
    }

    /// Adds `count` good SPADs of one type to `enables`, starting at
    /// `offset`, then writes the map and checks it reads back identical.
    ///
    /// # Return
    ///
    /// `last_spad_index` : Window index of the last SPAD enabled.
    fn enable_ref_spads(&mut self, aperture: bool, enables: &mut SpadMap, offset: u32, count: u32) -> Result<u32, Error<B::Error>> {
        let good = self.data.specific.ref_good_spad_map;
        let start_select = VL53L0X_REF_SPAD_START_SELECT as u32;
        let mut current = offset;
        let mut last_spad_index = offset;

        for _ in 0..count {
            let next = good
                .next_set(current)
                .filter(|&index| index < VL53L0X_REF_SPAD_MAX_COUNT)
                .ok_or(Error::RefSpadInit)?;
            if is_aperture(start_select + next) != aperture {
                return Err(Error::RefSpadInit);
            }
            enables.enable(next).map_err(|_| Error::RefSpadInit)?;
            last_spad_index = next;
            current = next + 1;
        }

        self.set_ref_spad_map(enables)?;
        if self.get_ref_spad_map()? != *enables {
            warn!("reference spad map read back does not match");
            return Err(Error::RefSpadInit);
        }
        Ok(last_spad_index)
    }

    /// Single ranging with only the reference steps enabled.
    ///
    /// # Return
    ///
    /// `ref_signal_rate` : Peak reference signal rate, 9.7 MCPS.
    fn perform_ref_signal_measurement(&mut self) -> Result<u16, Error<B::Error>> {
        let sequence_config = self.data.sequence_config;

        self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, 0xC0)?;
        self.perform_single_ranging_measurement()?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        let ref_signal_rate = self.read_word(VL53L0X_REG_RESULT_PEAK_SIGNAL_RATE_REF)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;

        self.write_byte(VL53L0X_REG_SYSTEM_SEQUENCE_CONFIG, sequence_config)?;
        self.data.sequence_config = sequence_config;
        Ok(ref_signal_rate)
    }

    fn program_ref_spad_window(&mut self) -> Result<(), Error<B::Error>> {
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x01)?;
        self.write_byte(VL53L0X_REG_DYNAMIC_SPAD_REF_EN_START_OFFSET, 0x00)?;
        self.write_byte(VL53L0X_REG_DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD, VL53L0X_REF_SPAD_NUM_REQUESTED)?;
        self.write_byte(VL53L0X_REG_PAGE_SELECT, 0x00)?;
        self.write_byte(VL53L0X_REG_GLOBAL_CONFIG_REF_EN_START_SELECT, VL53L0X_REF_SPAD_START_SELECT)?;
        Ok(())
    }

    /// Finds the smallest set of reference SPADs, all of one type, that
    /// brings the reference signal rate to the target rate.
    ///
    /// # Return
    ///
    /// `(count, aperture)` : Number of SPADs enabled and their type.
    pub fn perform_ref_spad_management(&mut self) -> Result<(u8, bool), Error<B::Error>> {
        let target_ref_rate = self.data.specific.target_ref_rate;
        let start_select = VL53L0X_REF_SPAD_START_SELECT as u32;
        let mut enables = SpadMap::new();

        self.program_ref_spad_window()?;
        self.write_byte(VL53L0X_REG_POWER_MANAGEMENT_GO1_POWER_FORCE, 0x00)?;
        self.perform_ref_calibration()?;

        /* Minimum set of non aperture SPADs first */
        let mut aperture = false;
        let mut last_spad_index =
            self.enable_ref_spads(aperture, &mut enables, 0, VL53L0X_REF_SPAD_MIN_COUNT)?;
        let mut count = VL53L0X_REF_SPAD_MIN_COUNT;
        let mut peak_signal_rate = self.perform_ref_signal_measurement()?;

        if peak_signal_rate > target_ref_rate {
            /* Too much signal already, retry with the smaller aperture SPADs */
            let first_aperture = (0..VL53L0X_REF_SPAD_MAX_COUNT)
                .find(|&index| is_aperture(start_select + index))
                .ok_or(Error::RefSpadInit)?;
            aperture = true;
            enables = SpadMap::new();
            last_spad_index =
                self.enable_ref_spads(aperture, &mut enables, first_aperture, VL53L0X_REF_SPAD_MIN_COUNT)?;
            peak_signal_rate = self.perform_ref_signal_measurement()?;
            if peak_signal_rate > target_ref_rate {
                warn!("aperture spad minimum still above target: {}", peak_signal_rate);
                return Err(Error::RefSpadInit);
            }
        }

        let mut last_diff = target_ref_rate.abs_diff(peak_signal_rate);
        while peak_signal_rate < target_ref_rate {
            let next = self
                .data
                .specific
                .ref_good_spad_map
                .next_set(last_spad_index + 1)
                .filter(|&index| index < VL53L0X_REF_SPAD_MAX_COUNT)
                .ok_or(Error::RefSpadInit)?;
            if is_aperture(start_select + next) != aperture {
                /* Only SPADs of the other type left, keep what we have */
                break;
            }

            let previous = enables;
            enables.enable(next).map_err(|_| Error::RefSpadInit)?;
            self.set_ref_spad_map(&enables)?;
            if self.get_ref_spad_map()? != enables {
                return Err(Error::RefSpadInit);
            }
            last_spad_index = next;
            count += 1;

            peak_signal_rate = self.perform_ref_signal_measurement()?;
            let diff = target_ref_rate.abs_diff(peak_signal_rate);
            if peak_signal_rate >= target_ref_rate && diff > last_diff {
                /* Overshot further than we were short, step back */
                enables = previous;
                self.set_ref_spad_map(&enables)?;
                if self.get_ref_spad_map()? != enables {
                    return Err(Error::RefSpadInit);
                }
                count -= 1;
            }
            last_diff = diff;
        }

        let specific = &mut self.data.specific;
        specific.ref_spad_enables = enables;
        specific.reference_spad_count = count as u8;
        specific.reference_spad_type_aperture = aperture;
        specific.ref_spads_initialised = true;
        debug!("reference spads: {}, aperture {}, map {:?}", count, aperture, enables.0);

        Ok((count as u8, aperture))
    }

    /// Enables `count` reference SPADs of the given type without measuring,
    /// from values found by an earlier calibration or in NVM.
    pub fn set_reference_spads(&mut self, count: u8, aperture: bool) -> Result<(), Error<B::Error>> {
        let start_select = VL53L0X_REF_SPAD_START_SELECT as u32;
        let mut enables = SpadMap::new();

        self.program_ref_spad_window()?;

        let mut offset = 0;
        if aperture {
            while offset < VL53L0X_REF_SPAD_MAX_COUNT && !is_aperture(start_select + offset) {
                offset += 1;
            }
        }
        self.enable_ref_spads(aperture, &mut enables, offset, count as u32)?;

        let specific = &mut self.data.specific;
        specific.ref_spad_enables = enables;
        specific.reference_spad_count = count;
        specific.reference_spad_type_aperture = aperture;
        specific.ref_spads_initialised = true;
        Ok(())
    }

    /// Current reference SPAD count and type. Counted from the device map
    /// when no calibration ran on this handle.
    pub fn get_reference_spads(&mut self) -> Result<(u8, bool), Error<B::Error>> {
        let specific = self.data.specific;
        if specific.ref_spads_initialised {
            return Ok((specific.reference_spad_count, specific.reference_spad_type_aperture));
        }

        let map = self.get_ref_spad_map()?;
        let start_select = VL53L0X_REF_SPAD_START_SELECT as u32;
        let count = map.count();
        let aperture = map.next_set(0).map_or(false, |index| is_aperture(start_select + index));

        self.data.specific.ref_spad_enables = map;
        Ok((count as u8, aperture))
    }

    /// Reference signal rate target in 16.16 MCPS.
    pub fn set_ref_spad_target_rate(&mut self, rate_mcps: FixPoint1616) {
        self.data.specific.target_ref_rate = fixpoint1616_to_fixpoint97(rate_mcps);
    }

    pub fn get_ref_spad_target_rate(&self) -> FixPoint1616 {
        fixpoint97_to_fixpoint1616(self.data.specific.target_ref_rate)
    }

    /// Writes back an enable map taken from a saved state.
    pub(crate) fn restore_ref_spad_map(&mut self, map: &SpadMap) -> Result<(), Error<B::Error>> {
        self.program_ref_spad_window()?;
        self.set_ref_spad_map(map)?;
        if self.get_ref_spad_map()? != *map {
            return Err(Error::RefSpadInit);
        }
        self.data.specific.ref_spad_enables = *map;
        Ok(())
    }
}
