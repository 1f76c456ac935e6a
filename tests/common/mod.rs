/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Minimal baseline JPEG encoder used to produce test streams: floating point forward DCT,
//! a single flat quantization table and the Annex K Huffman tables.

#![allow(dead_code)]

const ZIGZAG_TO_RASTER: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

const DC_LUMINANCE_COUNTS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const DC_CHROMINANCE_COUNTS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const AC_LUMINANCE_COUNTS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
const AC_LUMINANCE_SYMBOLS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08, 0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const AC_CHROMINANCE_COUNTS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
const AC_CHROMINANCE_SYMBOLS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21, 0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91, 0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34, 0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

pub const SOF0: u8 = 0xc0;
pub const SOF2: u8 = 0xc2;
const DHT: u8 = 0xc4;
const RST0: u8 = 0xd0;
const EOI: u8 = 0xd9;
const DQT: u8 = 0xdb;
const DRI: u8 = 0xdd;
const SOS: u8 = 0xda;
pub const APP1: u8 = 0xe1;

/// canonical (code, length) of every symbol of a table
fn code_map(counts: &[u8; 16], symbols: &[u8]) -> [(u32, u32); 256] {
    let mut map = [(0, 0); 256];
    let mut code = 0u32;
    let mut k = 0;
    for len in 1..=16u32 {
        for _ in 0..counts[len as usize - 1] {
            map[usize::from(symbols[k])] = (code, len);
            code += 1;
            k += 1;
        }
        code <<= 1;
    }
    map
}

/// Writes bits MSB first with 0xff stuffing
struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    bits: u32,
}

impl BitWriter {
    fn new() -> Self {
        BitWriter {
            out: Vec::new(),
            acc: 0,
            bits: 0,
        }
    }

    fn write(&mut self, value: u32, len: u32) {
        self.acc = (self.acc << len) | u64::from(value);
        self.bits += len;
        while self.bits >= 8 {
            let b = (self.acc >> (self.bits - 8)) as u8;
            self.out.push(b);
            if b == 0xff {
                self.out.push(0);
            }
            self.bits -= 8;
        }
        self.acc &= (1 << self.bits) - 1;
    }

    fn pad(&mut self) {
        while self.bits % 8 != 0 {
            self.write(1, 1);
        }
    }

    fn marker(&mut self, code: u8) {
        self.pad();
        self.out.extend_from_slice(&[0xff, code]);
    }
}

fn magnitude(v: i32) -> (u32, u32) {
    let size = 32 - v.unsigned_abs().leading_zeros();
    let bits = if v < 0 { v + (1 << size) - 1 } else { v };
    (size, bits as u32)
}

pub fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![0xff, marker];
    v.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    v.extend_from_slice(payload);
    v
}

/// Description of a synthetic stream
#[derive(Clone)]
pub struct TestStream {
    pub width: u16,
    pub height: u16,
    /// 1 or 3
    pub components: u8,
    /// luma sampling factors
    pub sampling: (u8, u8),
    pub restart_interval: u16,
    /// every entry of the quantization table
    pub quant: u8,
    /// segments inserted right after SOI
    pub app: Vec<u8>,
    pub sof_marker: u8,
}

impl Default for TestStream {
    fn default() -> Self {
        TestStream {
            width: 16,
            height: 16,
            components: 3,
            sampling: (2, 2),
            restart_interval: 0,
            quant: 1,
            app: Vec::new(),
            sof_marker: SOF0,
        }
    }
}

impl TestStream {
    fn luma_sampling(&self) -> (u32, u32) {
        if self.components == 1 {
            (1, 1)
        } else {
            (u32::from(self.sampling.0), u32::from(self.sampling.1))
        }
    }

    /// size of the plane of a component
    pub fn plane_size(&self, cmp: usize) -> (u32, u32) {
        let (w, h) = (u32::from(self.width), u32::from(self.height));
        if cmp == 0 {
            (w, h)
        } else {
            let (sfh, sfv) = self.luma_sampling();
            ((w + sfh - 1) / sfh, (h + sfv - 1) / sfv)
        }
    }

    /// everything up to and including SOS
    pub fn header(&self) -> Vec<u8> {
        let mut v = vec![0xff, 0xd8];
        v.extend_from_slice(&self.app);

        let mut dqt = vec![0u8];
        dqt.extend_from_slice(&[self.quant; 64]);
        v.extend(segment(DQT, &dqt));

        let mut sof = vec![8];
        sof.extend_from_slice(&self.height.to_be_bytes());
        sof.extend_from_slice(&self.width.to_be_bytes());
        sof.push(self.components);
        for c in 0..self.components {
            let s = if c == 0 {
                (self.sampling.0 << 4) | self.sampling.1
            } else {
                0x11
            };
            sof.extend_from_slice(&[c + 1, s, 0]);
        }
        v.extend(segment(self.sof_marker, &sof));

        let tables: [(u8, &[u8; 16], &[u8]); 4] = [
            (0x00, &DC_LUMINANCE_COUNTS, &DC_SYMBOLS),
            (0x10, &AC_LUMINANCE_COUNTS, &AC_LUMINANCE_SYMBOLS),
            (0x01, &DC_CHROMINANCE_COUNTS, &DC_SYMBOLS),
            (0x11, &AC_CHROMINANCE_COUNTS, &AC_CHROMINANCE_SYMBOLS),
        ];
        for (id, counts, symbols) in tables {
            let mut p = vec![id];
            p.extend_from_slice(counts);
            p.extend_from_slice(symbols);
            v.extend(segment(DHT, &p));
        }

        if self.restart_interval != 0 {
            v.extend(segment(DRI, &self.restart_interval.to_be_bytes()));
        }

        let mut sos = vec![self.components];
        for c in 0..self.components {
            sos.extend_from_slice(&[c + 1, if c == 0 { 0x00 } else { 0x11 }]);
        }
        sos.extend_from_slice(&[0, 63, 0]);
        v.extend(segment(SOS, &sos));

        v
    }

    /// Encodes the image whose samples are given by `sample(component, x, y)`, with x and y
    /// inside the plane of the component. Blocks past the edge replicate the last sample.
    pub fn encode(&self, sample: impl Fn(usize, u32, u32) -> u8) -> Vec<u8> {
        let mut v = self.header();

        let dc_lum = code_map(&DC_LUMINANCE_COUNTS, &DC_SYMBOLS);
        let ac_lum = code_map(&AC_LUMINANCE_COUNTS, &AC_LUMINANCE_SYMBOLS);
        let dc_chr = code_map(&DC_CHROMINANCE_COUNTS, &DC_SYMBOLS);
        let ac_chr = code_map(&AC_CHROMINANCE_COUNTS, &AC_CHROMINANCE_SYMBOLS);

        let (sfh, sfv) = self.luma_sampling();
        let mcuh = (u32::from(self.width) + 8 * sfh - 1) / (8 * sfh);
        let mcuv = (u32::from(self.height) + 8 * sfv - 1) / (8 * sfv);

        let mut w = BitWriter::new();
        let mut preds = [0i32; 3];
        let mut restarts = 0u8;

        for mcu in 0..mcuh * mcuv {
            let rsti = u32::from(self.restart_interval);
            if rsti > 0 && mcu > 0 && mcu % rsti == 0 {
                w.marker(RST0 + (restarts & 7));
                restarts += 1;
                preds = [0; 3];
            }

            let (mx, my) = (mcu % mcuh, mcu / mcuh);
            for cmp in 0..usize::from(self.components) {
                let (plane_w, plane_h) = self.plane_size(cmp);
                let (bw, bh, dc_map, ac_map) = if cmp == 0 {
                    (sfh, sfv, &dc_lum, &ac_lum)
                } else {
                    (1, 1, &dc_chr, &ac_chr)
                };

                for by in 0..bh {
                    for bx in 0..bw {
                        let x0 = (mx * bw + bx) * 8;
                        let y0 = (my * bh + by) * 8;

                        let mut block = [0f64; 64];
                        for y in 0..8 {
                            for x in 0..8 {
                                let sx = (x0 + x).min(plane_w - 1);
                                let sy = (y0 + y).min(plane_h - 1);
                                block[(y * 8 + x) as usize] =
                                    f64::from(sample(cmp, sx, sy)) - 128.0;
                            }
                        }

                        let coef = forward_dct(&block, self.quant);
                        encode_block(&mut w, dc_map, ac_map, &coef, &mut preds[cmp]);
                    }
                }
            }
        }

        w.pad();
        v.extend(w.out);
        v.extend_from_slice(&[0xff, EOI]);
        v
    }
}

/// quantized coefficients in zigzag order
fn forward_dct(block: &[f64; 64], quant: u8) -> [i32; 64] {
    let mut out = [0i32; 64];
    for k in 0..64 {
        let pos = ZIGZAG_TO_RASTER[k];
        let (v, u) = (pos / 8, pos % 8);

        let mut sum = 0.0;
        for y in 0..8 {
            for x in 0..8 {
                sum += block[y * 8 + x]
                    * ((2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0).cos()
                    * ((2 * y + 1) as f64 * v as f64 * std::f64::consts::PI / 16.0).cos();
            }
        }

        let cu = if u == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        let cv = if v == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        out[k] = (sum * cu * cv / 4.0 / f64::from(quant)).round() as i32;
    }
    out
}

fn encode_block(
    w: &mut BitWriter,
    dc_map: &[(u32, u32); 256],
    ac_map: &[(u32, u32); 256],
    zigzag: &[i32; 64],
    pred: &mut i32,
) {
    let (size, bits) = magnitude(zigzag[0] - *pred);
    *pred = zigzag[0];
    let (code, len) = dc_map[size as usize];
    w.write(code, len);
    w.write(bits, size);

    let mut run = 0;
    for &v in zigzag[1..].iter() {
        if v == 0 {
            run += 1;
            continue;
        }

        while run > 15 {
            let (code, len) = ac_map[0xf0];
            w.write(code, len);
            run -= 16;
        }

        let (size, bits) = magnitude(v);
        let (code, len) = ac_map[(run << 4) | size as usize];
        w.write(code, len);
        w.write(bits, size);
        run = 0;
    }

    if run > 0 {
        let (code, len) = ac_map[0x00];
        w.write(code, len);
    }
}

/// big endian EXIF APP1 segment with an orientation and optionally a thumbnail stream
pub fn exif_segment(orientation: u16, thumbnail: Option<&[u8]>) -> Vec<u8> {
    let entry = |tag: u16, field_type: u16, value: u32| {
        let mut e = Vec::new();
        e.extend_from_slice(&tag.to_be_bytes());
        e.extend_from_slice(&field_type.to_be_bytes());
        e.extend_from_slice(&1u32.to_be_bytes());
        if field_type == 3 {
            e.extend_from_slice(&(value as u16).to_be_bytes());
            e.extend_from_slice(&[0, 0]);
        } else {
            e.extend_from_slice(&value.to_be_bytes());
        }
        e
    };

    let mut tiff = b"MM\0\x2a".to_vec();
    tiff.extend_from_slice(&8u32.to_be_bytes());

    // IFD0: one entry, then the offset of IFD1
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend(entry(274, 3, u32::from(orientation)));
    let ifd1 = tiff.len() as u32 + 4;
    tiff.extend_from_slice(&(if thumbnail.is_some() { ifd1 } else { 0 }).to_be_bytes());

    if let Some(thumbnail) = thumbnail {
        // IFD1 has 2 entries and is followed by the thumbnail
        let data_offset = tiff.len() as u32 + 2 + 2 * 12 + 4;
        tiff.extend_from_slice(&2u16.to_be_bytes());
        tiff.extend(entry(513, 4, data_offset));
        tiff.extend(entry(514, 4, thumbnail.len() as u32));
        tiff.extend_from_slice(&0u32.to_be_bytes());
        tiff.extend_from_slice(thumbnail);
    }

    let mut payload = b"Exif\0\0".to_vec();
    payload.extend(tiff);
    segment(APP1, &payload)
}
