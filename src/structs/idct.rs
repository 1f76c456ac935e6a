/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Inverse DCT in the style of the AAN (Arai, Agui, Nakajima) fast algorithm, operating on
//! coefficients dequantized with the prescaled tables from `QuantizationTables::get_idct_table`.
//! All intermediate arithmetic wraps so that hostile coefficients can't panic.

#[cfg(feature = "simd")]
use wide::i32x8;

use crate::consts::*;

use super::jpeg_read::DecodedBlock;

/// arithmetic used by the butterfly, implemented for scalars and for 8 lanes at once
pub trait IdctLane: Copy {
    fn add(self, o: Self) -> Self;
    fn sub(self, o: Self) -> Self;

    /// multiply by a constant with 8 fractional bits
    fn mul_fix(self, c: i32) -> Self;
}

impl IdctLane for i32 {
    #[inline(always)]
    fn add(self, o: Self) -> Self {
        self.wrapping_add(o)
    }

    #[inline(always)]
    fn sub(self, o: Self) -> Self {
        self.wrapping_sub(o)
    }

    #[inline(always)]
    fn mul_fix(self, c: i32) -> Self {
        self.wrapping_mul(c) >> 8
    }
}

#[cfg(feature = "simd")]
impl IdctLane for i32x8 {
    #[inline(always)]
    fn add(self, o: Self) -> Self {
        self + o
    }

    #[inline(always)]
    fn sub(self, o: Self) -> Self {
        self - o
    }

    #[inline(always)]
    fn mul_fix(self, c: i32) -> Self {
        (c * self) >> 8
    }
}

/// 8 point 1-D inverse transform
#[inline(always)]
fn idct_1d<T: IdctLane>(v: [T; 8]) -> [T; 8] {
    // even part
    let tmp10 = v[0].add(v[4]);
    let tmp11 = v[0].sub(v[4]);

    let tmp13 = v[2].add(v[6]);
    let tmp12 = v[2].sub(v[6]).mul_fix(FIX_1_414213562).sub(tmp13);

    let tmp0 = tmp10.add(tmp13);
    let tmp3 = tmp10.sub(tmp13);
    let tmp1 = tmp11.add(tmp12);
    let tmp2 = tmp11.sub(tmp12);

    // odd part
    let z13 = v[5].add(v[3]);
    let z10 = v[5].sub(v[3]);
    let z11 = v[1].add(v[7]);
    let z12 = v[1].sub(v[7]);

    let tmp7 = z11.add(z13);
    let tmp11 = z11.sub(z13).mul_fix(FIX_1_414213562);

    let z5 = z10.add(z12).mul_fix(FIX_1_847759065);
    let tmp10 = z12.mul_fix(FIX_1_082392200).sub(z5);
    let tmp12 = z10.mul_fix(-FIX_2_613125930).add(z5);

    let tmp6 = tmp12.sub(tmp7);
    let tmp5 = tmp11.sub(tmp6);
    let tmp4 = tmp10.add(tmp5);

    [
        tmp0.add(tmp7),
        tmp1.add(tmp6),
        tmp2.add(tmp5),
        tmp3.sub(tmp4),
        tmp3.add(tmp4),
        tmp2.sub(tmp5),
        tmp1.sub(tmp6),
        tmp0.sub(tmp7),
    ]
}

/// removes the fractional bits, level shifts and saturates
#[inline(always)]
fn descale(v: i32) -> u8 {
    let v = v.wrapping_add(1 << (IDCT_OUTPUT_SHIFT - 1)) >> IDCT_OUTPUT_SHIFT;
    RANGE_LIMIT[(v.clamp(-512, 511) & 0x3ff) as usize]
}

/// Sample value of a block whose AC coefficients are all zero.
#[inline(always)]
pub fn dc_value(dc: i16, q0: i32) -> u8 {
    descale(i32::from(dc).wrapping_mul(q0))
}

/// Full 8x8 inverse DCT into row-major samples. Returns true if the block took the all-DC path.
pub fn idct_block(block: &DecodedBlock, q: &[i32; 64], out: &mut [u8; 64]) -> bool {
    if block.is_dc_only() {
        out.fill(dc_value(block.coef[0], q[0]));
        return true;
    }

    #[cfg(feature = "simd")]
    idct_simd(&block.coef, q, out);

    #[cfg(not(feature = "simd"))]
    idct_scalar(&block.coef, q, block.cols, block.rows, out);

    false
}

/// Scalar two pass transform. `cols` and `rows` mark where the nonzero AC coefficients are,
/// columns and rows without any are shortcut.
#[allow(dead_code)]
fn idct_scalar(coef: &[i16; 64], q: &[i32; 64], cols: u8, rows: u8, out: &mut [u8; 64]) {
    let mut ws = [0i32; 64];

    // columns
    for c in 0..8 {
        let has_ac = cols & (1 << c) != 0;
        if c != 0 && !has_ac {
            continue;
        }

        if !has_ac || rows & 0xfe == 0 {
            // only the top entry of this column can be nonzero
            let top = i32::from(coef[c]).wrapping_mul(q[c]);
            for r in 0..8 {
                ws[r * 8 + c] = top;
            }
            continue;
        }

        let mut v = [0i32; 8];
        for r in 0..8 {
            v[r] = i32::from(coef[r * 8 + c]).wrapping_mul(q[r * 8 + c]);
        }

        let o = idct_1d(v);
        for r in 0..8 {
            ws[r * 8 + c] = o[r];
        }
    }

    // rows
    for r in 0..8 {
        let row = &ws[r * 8..r * 8 + 8];
        let dst = &mut out[r * 8..r * 8 + 8];

        if cols & 0xfe == 0 {
            // only column 0 was nonzero
            dst.fill(descale(row[0]));
            continue;
        }

        let mut v = [0i32; 8];
        v.copy_from_slice(row);

        let o = idct_1d(v);
        for c in 0..8 {
            dst[c] = descale(o[c]);
        }
    }
}

/// Same transform with 8 lanes, columns first, then the rows after a transpose.
#[cfg(feature = "simd")]
fn idct_simd(coef: &[i16; 64], q: &[i32; 64], out: &mut [u8; 64]) {
    let mut v = [i32x8::splat(0); 8];
    for r in 0..8 {
        let mut row = [0i32; 8];
        for c in 0..8 {
            row[c] = i32::from(coef[r * 8 + c]).wrapping_mul(q[r * 8 + c]);
        }
        v[r] = i32x8::from(row);
    }

    // each lane is a column, so this runs the column pass
    let ws = idct_1d(v);

    // lanes become rows
    let o = idct_1d(i32x8::transpose(ws));

    for c in 0..8 {
        let lanes = o[c].to_array();
        for r in 0..8 {
            out[r * 8 + c] = descale(lanes[r]);
        }
    }
}

#[inline(always)]
fn descale_13(v: i32) -> u8 {
    let v = v.wrapping_add(1 << 12) >> 13;
    RANGE_LIMIT[(v.clamp(-512, 511) & 0x3ff) as usize]
}

/// Reduced transform producing the mean of each 4x4 quadrant from the four lowest frequency
/// coefficients. `q` is the plain quantization table in natural order. Writes 2x2 samples
/// row-major into `out`.
pub fn idct_2x2(block: &DecodedBlock, q: &[u16; 64], out: &mut [u8]) {
    let d = |i: usize| i32::from(block.coef[i]).wrapping_mul(i32::from(q[i]));

    // 8192 * (1/8, 0.11327, 0.10263), the basis functions averaged over half a block
    let base = d(0).wrapping_mul(1024);
    let h = d(1).wrapping_mul(928);
    let v = d(8).wrapping_mul(928);
    let hv = d(9).wrapping_mul(841);

    out[0] = descale_13(base.wrapping_add(h).wrapping_add(v).wrapping_add(hv));
    out[1] = descale_13(base.wrapping_sub(h).wrapping_add(v).wrapping_sub(hv));
    out[2] = descale_13(base.wrapping_add(h).wrapping_sub(v).wrapping_sub(hv));
    out[3] = descale_13(base.wrapping_sub(h).wrapping_sub(v).wrapping_add(hv));
}

/// mean of the block from its DC coefficient
pub fn idct_1x1(block: &DecodedBlock, q: &[u16; 64]) -> u8 {
    let d = i32::from(block.coef[0]).wrapping_mul(i32::from(q[0]));
    RANGE_LIMIT[((d.wrapping_add(4) >> 3).clamp(-512, 511) & 0x3ff) as usize]
}
