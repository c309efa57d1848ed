//! Conversions between the 16.16 application format and the register formats.
//!
//! Narrowing truncates the extra fraction bits and masks to the register
//! width, widening zero-extends. Values that do not fit are silently cut,
//! the device firmware does the same.

/// Unsigned 16.16 fixed point, used for every rate, sigma and distance the
/// driver exposes.
pub type FixPoint1616 = u32;

pub const fn fixpoint1616_to_fixpoint97(value: FixPoint1616) -> u16 {
    (value >> 9) as u16
}

pub const fn fixpoint97_to_fixpoint1616(value: u16) -> FixPoint1616 {
    (value as u32) << 9
}

pub const fn fixpoint1616_to_fixpoint88(value: FixPoint1616) -> u16 {
    (value >> 8) as u16
}

pub const fn fixpoint88_to_fixpoint1616(value: u16) -> FixPoint1616 {
    (value as u32) << 8
}

pub const fn fixpoint1616_to_fixpoint412(value: FixPoint1616) -> u16 {
    (value >> 4) as u16
}

pub const fn fixpoint412_to_fixpoint1616(value: u16) -> FixPoint1616 {
    (value as u32) << 4
}

pub const fn fixpoint1616_to_fixpoint313(value: FixPoint1616) -> u16 {
    (value >> 3) as u16
}

pub const fn fixpoint313_to_fixpoint1616(value: u16) -> FixPoint1616 {
    (value as u32) << 3
}

pub const fn fixpoint1616_to_fixpoint08(value: FixPoint1616) -> u8 {
    ((value >> 8) & 0xFF) as u8
}

pub const fn fixpoint08_to_fixpoint1616(value: u8) -> FixPoint1616 {
    (value as u32) << 8
}

pub const fn fixpoint1616_to_fixpoint53(value: FixPoint1616) -> u8 {
    ((value >> 13) & 0xFF) as u8
}

pub const fn fixpoint53_to_fixpoint1616(value: u8) -> FixPoint1616 {
    (value as u32) << 13
}

/// 10.2 keeps two fraction bits of the integer millimeters, so it sits at
/// bit 14 of a 16.16 value.
pub const fn fixpoint1616_to_fixpoint102(value: FixPoint1616) -> u16 {
    ((value >> 14) & 0x0FFF) as u16
}

pub const fn fixpoint102_to_fixpoint1616(value: u16) -> FixPoint1616 {
    ((value & 0x0FFF) as u32) << 14
}
