/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Turns the decoded blocks of an MCU into destination pixels. This is split in two parts,
//! a sampler that reconstructs the luma and chroma planes of the MCU at the output scale, and a
//! writer that converts samples to the destination pixel format and places them according to
//! the orientation. Every combination of subsampling, scale and pixel type goes through the
//! same loop.

use crate::consts::*;
use crate::decode_options::{DecodeOptions, OutputScale, PixelType};

use super::exif::Orientation;
use super::idct::{idct_1x1, idct_2x2, idct_block};
use super::jpeg_header::{JpegHeader, SubsamplingLayout};
use super::jpeg_read::{BlockDetail, DecodedBlock};
use super::quantization_tables::QuantizationTables;

/// Reconstructed samples of one MCU at the output scale
pub struct McuSamples {
    /// luma plane, row stride is `McuCompositor::luma_stride`
    pub luma: [u8; 256],

    /// chroma planes, row stride is `McuCompositor::block_size`
    pub cb: [u8; 64],
    pub cr: [u8; 64],
}

impl Default for McuSamples {
    fn default() -> Self {
        McuSamples {
            luma: [0; 256],
            cb: [128; 64],
            cr: [128; 64],
        }
    }
}

/// Reconstructs a block at `scale` into `out`, whose row stride is `stride`.
/// Returns true if the block had no AC coefficients.
pub fn reconstruct_block(
    block: &DecodedBlock,
    q: &QuantizationTables,
    scale: OutputScale,
    out: &mut [u8],
    stride: usize,
) -> bool {
    match scale {
        OutputScale::Full => {
            let mut tmp = [0u8; 64];
            let dc_only = idct_block(block, q.get_idct_table(), &mut tmp);
            for r in 0..8 {
                out[r * stride..r * stride + 8].copy_from_slice(&tmp[r * 8..r * 8 + 8]);
            }
            dc_only
        }
        OutputScale::Half => {
            let mut tmp = [0u8; 64];
            let dc_only = idct_block(block, q.get_idct_table(), &mut tmp);
            for r in 0..4 {
                for c in 0..4 {
                    let s = (r * 2) * 8 + c * 2;
                    let sum = u32::from(tmp[s])
                        + u32::from(tmp[s + 1])
                        + u32::from(tmp[s + 8])
                        + u32::from(tmp[s + 9]);
                    out[r * stride + c] = ((sum + 2) >> 2) as u8;
                }
            }
            dc_only
        }
        OutputScale::Quarter => {
            let mut tmp = [0u8; 4];
            idct_2x2(block, q.get_quantization_table(), &mut tmp);
            out[0..2].copy_from_slice(&tmp[0..2]);
            out[stride..stride + 2].copy_from_slice(&tmp[2..4]);
            block.is_dc_only()
        }
        OutputScale::Eighth => {
            out[0] = idct_1x1(block, q.get_quantization_table());
            true
        }
    }
}

/// Converts one YCbCr sample to RGB565.
#[inline(always)]
pub fn ycc_to_rgb565(y: u8, cb: u8, cr: u8) -> u16 {
    let y = i32::from(y);
    let cb = i32::from(cb) - 128;
    let cr = i32::from(cr) - 128;

    // RANGE_LIMIT clamps samples centered on zero
    let clamp = |v: i32| u16::from(RANGE_LIMIT[((v - 128) & 0x3ff) as usize]);

    // >> 7 floors negative products where a division by 128 would truncate toward zero
    let r = clamp(y + ((CR_TO_R * cr) >> 7));
    let g = clamp(y - ((CB_TO_G * cb + CR_TO_G * cr) >> 7));
    let b = clamp(y + ((CB_TO_B * cb) >> 7));

    ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3)
}

/// Places the reconstructed MCUs into the destination buffer.
pub struct McuCompositor {
    pixel_type: PixelType,
    little_endian: bool,

    /// render luma only, either because there is no chroma or because the caller asked for it
    gray: bool,

    orientation: Orientation,
    scale: OutputScale,

    /// scaled size before the orientation is applied
    width: u32,
    height: u32,

    /// row stride of the destination
    stride: usize,

    /// output samples per block side
    block_size: u32,
    sfh: u32,
    sfv: u32,
}

impl McuCompositor {
    pub fn new(
        jf: &JpegHeader,
        options: &DecodeOptions,
        scale: OutputScale,
        orientation: Orientation,
    ) -> Self {
        let (sfh, sfv) = jf.layout.luma_blocks();
        let width = scale.scaled(jf.img_width);
        let height = scale.scaled(jf.img_height);

        let dest_width = if orientation.swaps_dimensions() {
            height
        } else {
            width
        };

        McuCompositor {
            pixel_type: options.pixel_type,
            little_endian: options.little_endian(),
            gray: jf.layout == SubsamplingLayout::Grayscale || options.luma_only(),
            orientation,
            scale,
            width,
            height,
            stride: options.pixel_type.row_stride(dest_width),
            block_size: 8 >> scale.shift(),
            sfh,
            sfv,
        }
    }

    /// width and height of the destination image
    pub fn output_size(&self) -> (u32, u32) {
        if self.orientation.swaps_dimensions() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    pub fn required_size(&self) -> usize {
        self.stride * self.output_size().1 as usize
    }

    pub fn luma_stride(&self) -> usize {
        (self.sfh * self.block_size) as usize
    }

    /// how much of each block the sampler will look at
    pub fn block_detail(&self) -> BlockDetail {
        match self.scale {
            OutputScale::Full | OutputScale::Half => BlockDetail::Full,
            OutputScale::Quarter => BlockDetail::Low2x2,
            OutputScale::Eighth => BlockDetail::DcOnly,
        }
    }

    /// Reconstructs the planes of an MCU from its blocks, stored in scan order.
    /// `q` holds the quantization tables of the components. Returns the number of blocks
    /// that had no AC coefficients.
    pub fn reconstruct_mcu(
        &self,
        blocks: &[DecodedBlock],
        q: &[QuantizationTables],
        samples: &mut McuSamples,
    ) -> u32 {
        let n = self.block_size as usize;
        let luma_stride = self.luma_stride();
        let luma_blocks = (self.sfh * self.sfv) as usize;

        let mut dc_only = 0;
        for b in 0..luma_blocks {
            let bx = b % self.sfh as usize;
            let by = b / self.sfh as usize;
            let offset = by * n * luma_stride + bx * n;

            if reconstruct_block(
                &blocks[b],
                &q[0],
                self.scale,
                &mut samples.luma[offset..],
                luma_stride,
            ) {
                dc_only += 1;
            }
        }

        if !self.gray {
            if reconstruct_block(&blocks[luma_blocks], &q[1], self.scale, &mut samples.cb, n) {
                dc_only += 1;
            }
            if reconstruct_block(&blocks[luma_blocks + 1], &q[2], self.scale, &mut samples.cr, n)
            {
                dc_only += 1;
            }
        }

        dc_only
    }

    /// Writes the part of MCU (`mcu_x`, `mcu_y`) that lies inside the image.
    pub fn write_mcu(&self, samples: &McuSamples, mcu_x: u32, mcu_y: u32, dest: &mut [u8]) {
        let mcu_w = self.sfh * self.block_size;
        let mcu_h = self.sfv * self.block_size;

        let x0 = mcu_x * mcu_w;
        let y0 = mcu_y * mcu_h;
        let w = mcu_w.min(self.width.saturating_sub(x0));
        let h = mcu_h.min(self.height.saturating_sub(y0));

        let luma_stride = self.luma_stride();
        let n = self.block_size as usize;

        for j in 0..h {
            for i in 0..w {
                let y = samples.luma[j as usize * luma_stride + i as usize];

                let (cb, cr) = if self.gray {
                    (128, 128)
                } else {
                    // nearest chroma sample
                    let c = (j / self.sfv) as usize * n + (i / self.sfh) as usize;
                    (samples.cb[c], samples.cr[c])
                };

                let (dx, dy) = self
                    .orientation
                    .map(x0 + i, y0 + j, self.width, self.height);
                self.put_pixel(dest, dx, dy, y, cb, cr);
            }
        }
    }

    #[inline(always)]
    fn put_pixel(&self, dest: &mut [u8], x: u32, y: u32, luma: u8, cb: u8, cr: u8) {
        let row = y as usize * self.stride;

        match self.pixel_type {
            PixelType::Grayscale => dest[row + x as usize] = luma,
            PixelType::Binary => {
                let i = row + (x / 8) as usize;
                let bit = 1u8 << (x % 8);
                if luma >= BINARY_THRESHOLD {
                    dest[i] |= bit;
                } else {
                    dest[i] &= !bit;
                }
            }
            PixelType::Rgb565 => {
                let p = if self.gray {
                    GRAY_TO_RGB565[usize::from(luma)]
                } else {
                    ycc_to_rgb565(luma, cb, cr)
                };

                let i = row + x as usize * 2;
                let bytes = if self.little_endian {
                    p.to_le_bytes()
                } else {
                    p.to_be_bytes()
                };
                dest[i..i + 2].copy_from_slice(&bytes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode_options::DecodeFlags;
    use rand::Rng;

    fn header(width: u32, height: u32, layout: SubsamplingLayout) -> JpegHeader {
        let mut jf = JpegHeader::default();
        let (sfh, sfv) = layout.luma_blocks();
        jf.img_width = width;
        jf.img_height = height;
        jf.layout = layout;
        jf.cmpc = if layout == SubsamplingLayout::Grayscale {
            1
        } else {
            3
        };
        jf.mcuh = (width + sfh * 8 - 1) / (sfh * 8);
        jf.mcuv = (height + sfv * 8 - 1) / (sfv * 8);
        jf
    }

    fn write_all(c: &McuCompositor, jf: &JpegHeader, samples: &McuSamples, dest: &mut [u8]) {
        for my in 0..jf.mcuv {
            for mx in 0..jf.mcuh {
                c.write_mcu(samples, mx, my, dest);
            }
        }
    }

    #[test]
    fn half_scale_is_the_mean_of_full_scale() {
        let mut rng = crate::helpers::get_rand_from_seed([11; 32]);
        let q = QuantizationTables::new_from_table(&[2; 64]);

        for _ in 0..200 {
            let mut block = DecodedBlock::default();
            block.coef[0] = rng.gen_range(-400..400);
            for pos in 1..64 {
                if rng.gen_range(0..6) == 0 {
                    block.coef[pos] = rng.gen_range(-40..40);
                    if block.coef[pos] != 0 {
                        block.cols |= 1 << (pos & 7);
                        block.rows |= 1 << (pos >> 3);
                    }
                }
            }

            let mut full = [0u8; 64];
            reconstruct_block(&block, &q, OutputScale::Full, &mut full, 8);

            let mut half = [0u8; 16];
            reconstruct_block(&block, &q, OutputScale::Half, &mut half, 4);

            for y in 0..4 {
                for x in 0..4 {
                    let s = y * 16 + x * 2;
                    let sum = u32::from(full[s])
                        + u32::from(full[s + 1])
                        + u32::from(full[s + 8])
                        + u32::from(full[s + 9]);
                    let mean = (sum as f64 / 4.0).round() as i32;
                    assert!((i32::from(half[y * 4 + x]) - mean).abs() <= 1);
                }
            }
        }
    }

    #[test]
    fn color_conversion() {
        // neutral chroma is plain gray
        assert_eq!(ycc_to_rgb565(255, 128, 128), 0xffff);
        assert_eq!(ycc_to_rgb565(0, 128, 128), 0);
        assert_eq!(ycc_to_rgb565(100, 128, 128), GRAY_TO_RGB565[100]);

        // saturated red: Y=76 Cb=85 Cr=255
        let p = ycc_to_rgb565(76, 85, 255);
        assert_eq!(p >> 11, 31);
        assert!((p >> 5) & 0x3f < 4);
        assert!(p & 0x1f < 4);
    }

    #[rstest::rstest]
    #[case(PixelType::Rgb565, DecodeFlags::empty())]
    #[case(PixelType::Rgb565, DecodeFlags::LITTLE_ENDIAN_PIXELS)]
    #[case(PixelType::Grayscale, DecodeFlags::empty())]
    #[case(PixelType::Binary, DecodeFlags::empty())]
    fn odd_sizes_stay_in_bounds(#[case] pixel_type: PixelType, #[case] flags: DecodeFlags) {
        for layout in [
            SubsamplingLayout::Grayscale,
            SubsamplingLayout::Yuv444,
            SubsamplingLayout::Yuv422,
            SubsamplingLayout::Yuv440,
            SubsamplingLayout::Yuv420,
        ] {
            for scale in [
                OutputScale::Full,
                OutputScale::Half,
                OutputScale::Quarter,
                OutputScale::Eighth,
            ] {
                let jf = header(37, 19, layout);
                let options = DecodeOptions::new(flags, pixel_type);
                let c = McuCompositor::new(&jf, &options, scale, Orientation::TopLeft);

                let (w, h) = c.output_size();
                assert_eq!(c.required_size(), pixel_type.row_stride(w) * h as usize);

                let guard = 64;
                let mut dest = vec![0xa5u8; c.required_size() + guard];
                let mut samples = McuSamples::default();
                samples.luma.fill(200);
                write_all(&c, &jf, &samples, &mut dest);

                assert!(dest[c.required_size()..].iter().all(|&b| b == 0xa5));

                // binary rows keep their padding bytes
                if pixel_type != PixelType::Binary {
                    assert!(dest[..c.required_size()].iter().all(|&b| b != 0xa5));
                }
            }
        }
    }

    #[test]
    fn chroma_terms_round_down() {
        // Cr - 128 = -127: red is 185 + floor(179 * -127 / 128) = 7, truncation would give 8
        let p = ycc_to_rgb565(185, 128, 1);
        assert_eq!(p >> 11, 0);

        let p = ycc_to_rgb565(186, 128, 1);
        assert_eq!(p >> 11, 1);
    }

    #[test]
    fn chroma_is_replicated_over_the_mcu() {
        let jf = header(16, 16, SubsamplingLayout::Yuv420);
        let options = DecodeOptions::new(DecodeFlags::empty(), PixelType::Rgb565);
        let c = McuCompositor::new(&jf, &options, OutputScale::Full, Orientation::TopLeft);

        let mut samples = McuSamples::default();
        samples.luma.fill(128);
        for i in 0..64 {
            samples.cr[i] = (i * 2) as u8;
        }

        let mut dest = vec![0u8; c.required_size()];
        c.write_mcu(&samples, 0, 0, &mut dest);

        for y in 0..16usize {
            for x in 0..16usize {
                let p = u16::from_be_bytes([dest[(y * 16 + x) * 2], dest[(y * 16 + x) * 2 + 1]]);
                let cr = samples.cr[(y / 2) * 8 + x / 2];
                assert_eq!(p, ycc_to_rgb565(128, 128, cr));
            }
        }
    }

    #[test]
    fn rotation_places_pixels() {
        let jf = header(16, 8, SubsamplingLayout::Grayscale);
        let options = DecodeOptions::new(DecodeFlags::empty(), PixelType::Grayscale);
        let c = McuCompositor::new(&jf, &options, OutputScale::Full, Orientation::RightTop);
        assert_eq!(c.output_size(), (8, 16));

        // each MCU is one 8x8 block, give every stored pixel a distinct value
        let mut dest = vec![0u8; c.required_size()];
        for mx in 0..2u32 {
            let mut samples = McuSamples::default();
            for y in 0..8 {
                for x in 0..8 {
                    samples.luma[y * 8 + x] = (y * 16 + x) as u8 + (mx * 8) as u8;
                }
            }
            c.write_mcu(&samples, mx, 0, &mut dest);
        }

        // rotated 90 degrees clockwise, the stored top left ends up top right
        assert_eq!(dest[7], 0);
        // stored top right goes to the bottom right
        assert_eq!(dest[15 * 8 + 7], 15);
        // stored bottom left goes to the top left
        assert_eq!(dest[0], 7 * 16);
    }

    #[test]
    fn binary_packs_bits() {
        let jf = header(40, 8, SubsamplingLayout::Grayscale);
        let options = DecodeOptions::new(DecodeFlags::empty(), PixelType::Binary);
        let c = McuCompositor::new(&jf, &options, OutputScale::Full, Orientation::TopLeft);
        assert_eq!(c.required_size(), 8 * 8);

        let mut dest = vec![0x55u8; c.required_size()];
        for mx in 0..5 {
            let mut samples = McuSamples::default();
            for x in 0..8 {
                // only pixel 3 of the first block and everything in the last block are light
                let light = (mx == 0 && x == 3) || mx == 4;
                samples.luma[x] = if light { 200 } else { 10 };
            }
            c.write_mcu(&samples, mx, 0, &mut dest);
        }

        assert_eq!(&dest[0..8], &[0x08, 0, 0, 0, 0xff, 0x55, 0x55, 0x55]);
    }

    #[test]
    fn luma_only_ignores_chroma() {
        let mut jf = header(8, 8, SubsamplingLayout::Yuv444);
        jf.cmpc = 3;
        let options = DecodeOptions::new(DecodeFlags::LUMA_ONLY, PixelType::Rgb565);
        let c = McuCompositor::new(&jf, &options, OutputScale::Full, Orientation::TopLeft);

        let mut samples = McuSamples::default();
        samples.luma.fill(77);
        samples.cb.fill(0);
        samples.cr.fill(255);

        let mut dest = vec![0u8; c.required_size()];
        c.write_mcu(&samples, 0, 0, &mut dest);
        assert_eq!(&dest[0..2], &GRAY_TO_RGB565[77].to_be_bytes());
    }
}
