/* The device is big endian on the wire, so is the persisted record. */

pub fn from_u8_to_u16(src: &[u8], dst: &mut [u16]) {
    for (i, chunk) in src.chunks_exact(2).enumerate() {
        dst[i] = (chunk[0] as u16) << 8 | chunk[1] as u16;
    }
}

pub fn from_u8_to_u32(src: &[u8], dst: &mut [u32]) {
    for (i, chunk) in src.chunks_exact(4).enumerate() {
        dst[i] = (chunk[0] as u32) << 24 | (chunk[1] as u32) << 16 | (chunk[2] as u32) << 8 | chunk[3] as u32;
    }
}

pub fn from_u8_to_i32(src: &[u8], dst: &mut [i32]) {
    for (i, chunk) in src.chunks_exact(4).enumerate() {
        dst[i] = i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

pub fn from_u16_to_u8(src: &[u16], dst: &mut [u8]) {
    for (i, &num) in src.iter().enumerate() {
        dst[i * 2..(i + 1) * 2].copy_from_slice(&num.to_be_bytes());
    }
}

pub fn from_u32_to_u8(src: &[u32], dst: &mut [u8]) {
    for (i, &num) in src.iter().enumerate() {
        dst[i * 4..(i + 1) * 4].copy_from_slice(&num.to_be_bytes());
    }
}

pub fn from_i32_to_u8(src: &[i32], dst: &mut [u8]) {
    for (i, &num) in src.iter().enumerate() {
        dst[i * 4..(i + 1) * 4].copy_from_slice(&num.to_be_bytes());
    }
}

/// Integer square root, digit by digit. Largest `r` with `r * r <= num`.
pub fn isqrt(num: u32) -> u32 {
    let mut num = num;
    let mut res: u32 = 0;
    let mut bit: u32 = 1 << 30;

    while bit > num {
        bit >>= 2;
    }
    while bit != 0 {
        if num >= res + bit {
            num -= res + bit;
            res = (res >> 1) + bit;
        } else {
            res >>= 1;
        }
        bit >>= 2;
    }
    res
}

/// `sqrt(a^2 + b^2)`, saturated to 65535 once either input exceeds it.
pub fn quadrature_sum(a: u32, b: u32) -> u32 {
    if a > 65535 || b > 65535 {
        return 65535;
    }
    let sum = (a as u64) * (a as u64) + (b as u64) * (b as u64);
    isqrt(sum.min(u32::MAX as u64) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_brackets_the_root() {
        let samples = [
            0u32, 1, 2, 3, 4, 15, 16, 17, 255, 256, 65535, 65536, 1_000_000,
            0x7FFF_FFFF, 0x8000_0000, 0xFFFF_FFFE, u32::MAX,
        ];
        for n in samples {
            let r = isqrt(n) as u64;
            assert!(r * r <= n as u64, "{} -> {}", n, r);
            assert!((r + 1) * (r + 1) > n as u64, "{} -> {}", n, r);
        }
        for i in 0u32..4096 {
            let n = i.wrapping_mul(0x9E37_79B9);
            let r = isqrt(n) as u64;
            assert!(r * r <= n as u64 && (r + 1) * (r + 1) > n as u64);
        }
    }

    #[test]
    fn quadrature_sum_saturates() {
        assert_eq!(quadrature_sum(3, 4), 5);
        assert_eq!(quadrature_sum(0, 65535), 65535);
        assert_eq!(quadrature_sum(65536, 0), 65535);
        assert_eq!(quadrature_sum(1, 70000), 65535);
        assert_eq!(quadrature_sum(65535, 65535), 65535);
    }

    #[test]
    fn big_endian_helpers() {
        let mut words = [0u16; 2];
        from_u8_to_u16(&[0x12, 0x34, 0xAB, 0xCD], &mut words);
        assert_eq!(words, [0x1234, 0xABCD]);

        let mut bytes = [0u8; 8];
        from_u32_to_u8(&[0x0102_0304], &mut bytes[..4]);
        from_i32_to_u8(&[-2], &mut bytes[4..]);
        assert_eq!(bytes, [1, 2, 3, 4, 0xFF, 0xFF, 0xFF, 0xFE]);

        let mut dword = [0u32; 1];
        let mut signed = [0i32; 1];
        from_u8_to_u32(&bytes[..4], &mut dword);
        from_u8_to_i32(&bytes[4..], &mut signed);
        assert_eq!(dword[0], 0x0102_0304);
        assert_eq!(signed[0], -2);
    }
}
