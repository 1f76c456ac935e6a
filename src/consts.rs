/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

#[derive(PartialEq, Debug)]
pub enum JPegDecodeStatus {
    DecodeInProgress,
    RestartIntervalExpired,
    ScanCompleted,
}

/// natural (row-major) position of the n-th coefficient in the zigzag scan
pub const ZIGZAG_TO_RASTER: [u8; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

pub const RASTER_TO_ZIGZAG: [u8; 64] = [
    0, 1, 5, 6, 14, 15, 27, 28, 2, 4, 7, 13, 16, 26, 29, 42, 3, 8, 12, 17, 25, 30, 41, 43, 9, 11,
    18, 24, 31, 40, 44, 53, 10, 19, 23, 32, 39, 45, 52, 54, 20, 22, 33, 38, 46, 51, 55, 60, 21, 34,
    37, 47, 50, 56, 59, 61, 35, 36, 48, 49, 57, 58, 62, 63,
];

/// AAN scale factors in natural order, 1.0 == 16384.
/// scale[u][v] = 16384 * cos_scale(u) * cos_scale(v) with cos_scale(0) = 1 and
/// cos_scale(k) = sqrt(2) * cos(k*pi/16)
pub const AAN_SCALES: [u16; 64] = [
    16384, 22725, 21407, 19266, 16384, 12873, 8867, 4520, //
    22725, 31521, 29692, 26722, 22725, 17855, 12299, 6270, //
    21407, 29692, 27969, 25172, 21407, 16819, 11585, 5906, //
    19266, 26722, 25172, 22654, 19266, 15137, 10426, 5315, //
    16384, 22725, 21407, 19266, 16384, 12873, 8867, 4520, //
    12873, 17855, 16819, 15137, 12873, 10114, 6967, 3552, //
    8867, 12299, 11585, 10426, 8867, 6967, 4799, 2446, //
    4520, 6270, 5906, 5315, 4520, 3552, 2446, 1247,
];

/// fixed point (8 fractional bits) multipliers of the AAN butterfly
pub const FIX_1_082392200: i32 = 277;
pub const FIX_1_414213562: i32 = 362;
pub const FIX_1_847759065: i32 = 473;
pub const FIX_2_613125930: i32 = 669;

/// number of fractional bits left in the IDCT output (2 from the quantization prescale
/// plus 3 for the 1/8 normalization of the two 1-D passes)
pub const IDCT_OUTPUT_SHIFT: i32 = 5;

const fn build_range_limit() -> [u8; 1024] {
    let mut t = [0u8; 1024];
    let mut i = 0;
    while i < 1024 {
        t[i] = if i < 128 {
            (i + 128) as u8
        } else if i < 512 {
            255
        } else if i < 896 {
            0
        } else {
            (i - 896) as u8
        };
        i += 1;
    }
    t
}

/// Saturating lookup for level shifted samples. Indexed by the signed sample (centered
/// on zero) masked to 10 bits, which yields clamp(v + 128, 0, 255) for v in -512..=511.
pub static RANGE_LIMIT: [u8; 1024] = build_range_limit();

const fn build_gray_to_rgb565() -> [u16; 256] {
    let mut t = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let g = i as u16;
        t[i] = ((g >> 3) << 11) | ((g >> 2) << 5) | (g >> 3);
        i += 1;
    }
    t
}

pub static GRAY_TO_RGB565: [u16; 256] = build_gray_to_rgb565();

/// fixed point YCbCr->RGB coefficients with 7 fractional bits
pub const CR_TO_R: i32 = 179;
pub const CB_TO_G: i32 = 44;
pub const CR_TO_G: i32 = 91;
pub const CB_TO_B: i32 = 227;

/// binary output treats luma at or above this value as a set bit
pub const BINARY_THRESHOLD: u8 = 128;

/// Huffman lookup geometry. DC codes are resolved from a 12 bit window, AC codes
/// from a 16 bit window. The "long" regions hold codes whose leading bits are all 1s.
pub const DC_WINDOW_BITS: u32 = 12;
pub const DC_SHORT_BITS: u32 = 6;
pub const DC_LONG_PREFIX_BITS: u32 = 5;
pub const AC_WINDOW_BITS: u32 = 16;
pub const AC_SHORT_BITS: u32 = 10;
pub const AC_LONG_PREFIX_BITS: u32 = 6;

pub const SOI: [u8; 2] = [0xFF, crate::jpeg_code::SOI]; // SOI segment

/// signature at the start of an APP1 segment holding EXIF data
pub const EXIF_SIGNATURE: [u8; 6] = *b"Exif\0\0";

#[test]
fn zigzag_permutations_are_inverse() {
    for i in 0..64 {
        assert_eq!(usize::from(ZIGZAG_TO_RASTER[usize::from(RASTER_TO_ZIGZAG[i])]), i);
        assert_eq!(usize::from(RASTER_TO_ZIGZAG[usize::from(ZIGZAG_TO_RASTER[i])]), i);
    }
}

#[test]
fn range_limit_is_level_shifted_clamp() {
    for v in -512i32..=511 {
        let expected = (v + 128).clamp(0, 255) as u8;
        assert_eq!(RANGE_LIMIT[(v & 0x3ff) as usize], expected, "v={0}", v);
    }
}

#[test]
fn gray_to_rgb565_extremes() {
    assert_eq!(GRAY_TO_RGB565[0], 0);
    assert_eq!(GRAY_TO_RGB565[255], 0xffff);
    assert_eq!(GRAY_TO_RGB565[128], (16 << 11) | (32 << 5) | 16);
}
