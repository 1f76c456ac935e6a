/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Read;

use default_boxed::DefaultBoxed;

use crate::consts::*;
use crate::helpers::devli;
use crate::jpeg_error::{err_exit_code, ExitCode, Result};

use super::bit_reader::BitReader;
use super::jpeg_header::JpegHeader;

/// Contents of a DHT table as stored in the file: the number of codes of each
/// length 1..=16, followed by the symbols in canonical order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HuffmanSpec {
    pub counts: [u8; 16],
    pub symbols: Vec<u8>,
}

impl HuffmanSpec {
    pub fn new(counts: [u8; 16], symbols: &[u8]) -> Self {
        HuffmanSpec {
            counts,
            symbols: symbols.to_vec(),
        }
    }

    /// Walks the canonical codes, calling `f(code, length, symbol)` for each of them.
    pub fn for_each_code(&self, mut f: impl FnMut(u32, u32, u8) -> Result<()>) -> Result<()> {
        let mut code = 0u32;
        let mut k = 0;

        for len in 1..=16u32 {
            for _ in 0..self.counts[len as usize - 1] {
                if code >= (1 << len) {
                    return err_exit_code(
                        ExitCode::DecodeError,
                        format!("huffman table is overfull at code length {0}", len),
                    );
                }

                let Some(&symbol) = self.symbols.get(k) else {
                    return err_exit_code(ExitCode::DecodeError, "huffman table is missing symbols");
                };

                f(code, len, symbol)?;

                k += 1;
                code += 1;
            }

            code <<= 1;
        }

        Ok(())
    }
}

const DC_SHORT_SHIFT: u32 = DC_WINDOW_BITS - DC_SHORT_BITS;
const DC_LONG_BITS: u32 = DC_WINDOW_BITS - DC_LONG_PREFIX_BITS;
const DC_LONG_START: u32 = ((1 << DC_LONG_PREFIX_BITS) - 1) << DC_LONG_BITS;

const AC_SHORT_SHIFT: u32 = AC_WINDOW_BITS - AC_SHORT_BITS;
const AC_LONG_BITS: u32 = AC_WINDOW_BITS - AC_LONG_PREFIX_BITS;
const AC_LONG_START: u32 = ((1 << AC_LONG_PREFIX_BITS) - 1) << AC_LONG_BITS;

/// set when `value` already holds the sign extended DC difference and
/// the code length includes the extra bits
const DC_VALUE_READY: u16 = 0x100;

/// Entry of the DC lookup. `packed` holds `(code_len << 4) | size`, zero means no code maps
/// to this window.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DcEntry {
    pub packed: u16,
    pub value: i16,
}

impl DcEntry {
    /// Builds the entry for a window that starts with a code of `len` bits whose symbol
    /// is `size`. If the extra bits also fit in the window, the difference is resolved now.
    fn new(len: u32, size: u8, window: u32, window_bits: u32) -> Self {
        let total = len + u32::from(size);
        if total <= window_bits {
            let extra = (window >> (window_bits - total)) & ((1 << size) - 1);
            DcEntry {
                packed: DC_VALUE_READY | ((total as u16) << 4) | u16::from(size),
                value: if size == 0 {
                    0
                } else {
                    devli(size, extra as u16)
                },
            }
        } else {
            DcEntry {
                packed: ((len as u16) << 4) | u16::from(size),
                value: 0,
            }
        }
    }

    #[inline(always)]
    fn code_len(self) -> u32 {
        u32::from((self.packed >> 4) & 0xf)
    }

    #[inline(always)]
    fn size(self) -> u8 {
        (self.packed & 0xf) as u8
    }
}

/// Lookup for DC differences. A 12 bit window is split into codes of up to 6 bits, resolved
/// by the top 6 bits, and codes starting with five 1 bits, resolved by the low 7 bits.
#[derive(DefaultBoxed)]
pub struct DcTable {
    short: [DcEntry; 1 << DC_SHORT_BITS],
    long: [DcEntry; 1 << DC_LONG_BITS],
}

impl DcTable {
    pub fn build(&mut self, spec: &HuffmanSpec) -> Result<()> {
        self.short.fill(DcEntry::default());
        self.long.fill(DcEntry::default());

        spec.for_each_code(|code, len, size| {
            if size > 15 {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("invalid DC difference size {0}", size),
                );
            }

            if len > DC_WINDOW_BITS {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!("DC huffman code of {0} bits is too long", len),
                );
            }

            let start = code << (DC_WINDOW_BITS - len);
            let end = (code + 1) << (DC_WINDOW_BITS - len);

            if start < DC_LONG_START {
                if len > DC_SHORT_BITS {
                    return err_exit_code(
                        ExitCode::UnsupportedFeature,
                        format!("DC huffman code {0:b} doesn't fit the lookup", code),
                    );
                }

                for i in (start >> DC_SHORT_SHIFT)..(end.min(DC_LONG_START) >> DC_SHORT_SHIFT) {
                    self.short[i as usize] = DcEntry::new(len, size, i, DC_SHORT_BITS);
                }
            }

            for w in start.max(DC_LONG_START)..end {
                self.long[(w - DC_LONG_START) as usize] = DcEntry::new(len, size, w, DC_WINDOW_BITS);
            }

            Ok(())
        })
    }

    #[inline(always)]
    fn lookup(&self, window: u32) -> DcEntry {
        if window >= DC_LONG_START {
            self.long[(window - DC_LONG_START) as usize]
        } else {
            self.short[(window >> DC_SHORT_SHIFT) as usize]
        }
    }

    /// decodes one DC difference
    #[inline(always)]
    pub fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<i16> {
        reader.ensure_bits(32)?;

        let e = self.lookup(reader.peek(DC_WINDOW_BITS));
        if e.packed == 0 {
            return err_exit_code(ExitCode::DecodeError, "invalid DC huffman code");
        }

        reader.consume(e.code_len());
        if e.packed & DC_VALUE_READY != 0 {
            return Ok(e.value);
        }

        let size = e.size();
        if size == 0 {
            return Ok(0);
        }

        let extra = reader.peek(u32::from(size));
        reader.consume(u32::from(size));
        Ok(devli(size, extra as u16))
    }
}

/// Lookup for AC symbols. Entries are `(code_len << 8) | (run << 4) | size`, zero means
/// no code maps to the window. Codes of up to 10 bits are resolved by the top 10 bits of a
/// 16 bit window, longer codes must start with six 1 bits and are resolved by the low 10 bits.
#[derive(DefaultBoxed)]
pub struct AcTable {
    short: [u16; 1 << AC_SHORT_BITS],
    long: [u16; 1 << AC_LONG_BITS],
}

impl AcTable {
    pub fn build(&mut self, spec: &HuffmanSpec) -> Result<()> {
        self.short.fill(0);
        self.long.fill(0);

        spec.for_each_code(|code, len, symbol| {
            let entry = ((len as u16) << 8) | u16::from(symbol);

            let start = code << (AC_WINDOW_BITS - len);
            let end = (code + 1) << (AC_WINDOW_BITS - len);

            if start < AC_LONG_START {
                if len > AC_SHORT_BITS {
                    return err_exit_code(
                        ExitCode::UnsupportedFeature,
                        format!("AC huffman code {0:b} doesn't fit the lookup", code),
                    );
                }

                for i in (start >> AC_SHORT_SHIFT)..(end.min(AC_LONG_START) >> AC_SHORT_SHIFT) {
                    self.short[i as usize] = entry;
                }
            }

            for w in start.max(AC_LONG_START)..end {
                self.long[(w - AC_LONG_START) as usize] = entry;
            }

            Ok(())
        })
    }

    /// Decodes the next AC symbol and returns `(run, size)`. The caller must have made sure
    /// there are 16 bits available in the reader.
    #[inline(always)]
    pub fn decode_symbol<R: Read>(&self, reader: &mut BitReader<R>) -> Result<(u8, u8)> {
        let window = reader.peek(AC_WINDOW_BITS);
        let e = if window >= AC_LONG_START {
            self.long[(window - AC_LONG_START) as usize]
        } else {
            self.short[(window >> AC_SHORT_SHIFT) as usize]
        };

        if e == 0 {
            return err_exit_code(ExitCode::DecodeError, "invalid AC huffman code");
        }

        reader.consume(u32::from(e >> 8));
        Ok((((e >> 4) & 0xf) as u8, (e & 0xf) as u8))
    }
}

/// All the lookups the scan refers to, indexed by table slot
#[derive(DefaultBoxed)]
pub struct HuffmanTables {
    pub dc: [DcTable; 4],
    pub ac: [AcTable; 4],
}

impl HuffmanTables {
    /// Builds the lookups for every table referenced by the scan of the header.
    pub fn build(header: &JpegHeader) -> Result<Box<HuffmanTables>> {
        let mut tables = HuffmanTables::default_boxed();

        for &cmp in header.cs_cmp[..header.cs_cmpc].iter() {
            let ci = &header.cmp_info[cmp];

            let dc = usize::from(ci.huff_dc);
            let Some(dc_spec) = header.huff_specs[0][dc].as_ref() else {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("scan references undefined DC huffman table {0}", dc),
                );
            };
            tables.dc[dc].build(dc_spec)?;

            let ac = usize::from(ci.huff_ac);
            let Some(ac_spec) = header.huff_specs[1][ac].as_ref() else {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("scan references undefined AC huffman table {0}", ac),
                );
            };
            tables.ac[ac].build(ac_spec)?;
        }

        Ok(tables)
    }
}


#[cfg(test)]
use super::bit_writer::BitWriter;

#[test]
fn standard_tables_build() {
    let mut dc = DcTable::default_boxed();
    dc.build(&std_tables::dc_luminance()).unwrap();
    dc.build(&std_tables::dc_chrominance()).unwrap();

    let mut ac = AcTable::default_boxed();
    ac.build(&std_tables::ac_luminance()).unwrap();
    ac.build(&std_tables::ac_chrominance()).unwrap();
}

#[test]
fn dc_roundtrip() {
    use rand::Rng;

    for spec in [std_tables::dc_luminance(), std_tables::dc_chrominance()] {
        let mut table = DcTable::default_boxed();
        table.build(&spec).unwrap();
        let map = std_tables::code_map(&spec);

        let mut rng = crate::helpers::get_rand_from_seed([1; 32]);
        let values: Vec<i32> = (0..5000)
            .map(|_| {
                let size = rng.gen_range(0..=11);
                let v = rng.gen_range(0..(1 << size));
                if rng.gen_bool(0.5) {
                    v
                } else {
                    -v
                }
            })
            .collect();

        let mut w = BitWriter::new();
        for &v in values.iter() {
            let (size, bits) = std_tables::magnitude(v);
            let (code, len) = map[size as usize];
            w.write(code, len);
            w.write(bits, size);
        }
        let data = w.finish();

        let mut r = BitReader::new(&data[..], 256);
        for &v in values.iter() {
            assert_eq!(table.decode(&mut r).unwrap(), v as i16);
        }
        assert!(!r.is_overrun());
    }
}

#[test]
fn ac_roundtrip() {
    use rand::Rng;

    let spec = std_tables::ac_luminance();
    let mut table = AcTable::default_boxed();
    table.build(&spec).unwrap();
    let map = std_tables::code_map(&spec);

    let mut rng = crate::helpers::get_rand_from_seed([2; 32]);
    let symbols: Vec<u8> = (0..5000)
        .map(|_| spec.symbols[rng.gen_range(0..spec.symbols.len())])
        .collect();

    let mut w = BitWriter::new();
    for &s in symbols.iter() {
        let (code, len) = map[usize::from(s)];
        w.write(code, len);
    }
    let data = w.finish();

    let mut r = BitReader::new(&data[..], 256);
    for &s in symbols.iter() {
        r.ensure_bits(32).unwrap();
        assert_eq!(table.decode_symbol(&mut r).unwrap(), (s >> 4, s & 0xf));
    }
}

#[test]
fn invalid_tables_are_rejected() {
    let mut dc = DcTable::default_boxed();

    // three codes of length 1
    let e = dc
        .build(&HuffmanSpec::new(
            [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0, 1, 2],
        ))
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::DecodeError);

    // a 7 bit code starting with 0 can't be looked up
    let e = dc
        .build(&HuffmanSpec::new(
            [0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            &[0],
        ))
        .unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::UnsupportedFeature);

    // 13 bit DC codes don't fit the window
    let mut counts = [0u8; 16];
    counts[0] = 1;
    counts[12] = 1;
    let e = dc.build(&HuffmanSpec::new(counts, &[0, 1])).unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::UnsupportedFeature);

    // same for an 11 bit AC code that starts with 0
    let mut ac = AcTable::default_boxed();
    let mut counts = [0u8; 16];
    counts[10] = 1;
    let e = ac.build(&HuffmanSpec::new(counts, &[0x01])).unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::UnsupportedFeature);
}

#[test]
fn unassigned_code_is_decode_error() {
    // single code "0" of length 1, reading a 1 bit is invalid
    let mut dc = DcTable::default_boxed();
    dc.build(&HuffmanSpec::new(
        [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        &[0],
    ))
    .unwrap();

    let data = [0x80u8];
    let mut r = BitReader::new(&data[..], 16);
    assert_eq!(
        dc.decode(&mut r).unwrap_err().exit_code(),
        ExitCode::DecodeError
    );

    let data = [0x00u8];
    let mut r = BitReader::new(&data[..], 16);
    assert_eq!(dc.decode(&mut r).unwrap(), 0);
}
