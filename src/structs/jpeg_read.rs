/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Read;

use crate::consts::*;
use crate::helpers::*;
use crate::jpeg_error::{err_exit_code, AddContext, ExitCode, Result};

use super::bit_reader::BitReader;
use super::huffman_table::{AcTable, DcTable, HuffmanTables};
use super::jpeg_header::JpegHeader;

/// Coefficients of one block in natural order, together with a record of
/// which rows and columns hold nonzero AC coefficients.
#[derive(Clone)]
#[repr(C, align(32))]
pub struct DecodedBlock {
    pub coef: [i16; 64],

    /// bit c is set if column c has a nonzero AC coefficient
    pub cols: u8,

    /// bit r is set if row r has a nonzero AC coefficient
    pub rows: u8,
}

impl Default for DecodedBlock {
    fn default() -> Self {
        DecodedBlock {
            coef: [0; 64],
            cols: 0,
            rows: 0,
        }
    }
}

impl DecodedBlock {
    #[inline(always)]
    pub fn is_dc_only(&self) -> bool {
        self.cols == 0
    }

    #[inline(always)]
    fn clear(&mut self) {
        self.coef = [0; 64];
        self.cols = 0;
        self.rows = 0;
    }
}

/// How many coefficients of a block the reconstruction needs. The rest are still
/// parsed to stay in sync with the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDetail {
    /// everything, for the full 8x8 inverse DCT
    Full,
    /// the top left 2x2 coefficients
    Low2x2,
    /// only DC
    DcOnly,
}

impl BlockDetail {
    #[inline(always)]
    fn keeps(self, pos: usize) -> bool {
        match self {
            BlockDetail::Full => true,
            BlockDetail::Low2x2 => pos & 0b110_110 == 0,
            BlockDetail::DcOnly => false,
        }
    }
}

/// Decodes one block into `block`. `dc_pred` is the running DC value of the component.
pub fn decode_block<R: Read>(
    reader: &mut BitReader<R>,
    dc_table: &DcTable,
    ac_table: &AcTable,
    dc_pred: &mut i16,
    block: &mut DecodedBlock,
    detail: BlockDetail,
) -> Result<()> {
    block.clear();

    let diff = dc_table.decode(reader).context()?;
    *dc_pred = dc_pred.wrapping_add(diff);
    block.coef[0] = *dc_pred;

    let mut k = 1;
    while k < 64 {
        reader.ensure_bits(32)?;

        let (run, size) = ac_table.decode_symbol(reader).context()?;
        if size == 0 {
            if run != 15 {
                // EOB
                break;
            }

            // ZRL
            k += 16;
            if k > 64 {
                return err_exit_code(ExitCode::DecodeError, "zero run past the end of the block");
            }
            continue;
        }

        k += usize::from(run);
        if k > 63 {
            return err_exit_code(
                ExitCode::DecodeError,
                format!("coefficient run reaches position {0}", k),
            );
        }

        let extra = reader.peek(u32::from(size));
        reader.consume(u32::from(size));

        let pos = usize::from(ZIGZAG_TO_RASTER[k]);
        if detail.keeps(pos) {
            block.coef[pos] = devli(size, extra as u16);
            block.cols |= 1 << (pos & 7);
            block.rows |= 1 << (pos >> 3);
        }

        k += 1;
    }

    Ok(())
}

/// Walks the MCUs of a scan and tracks where the restart intervals end.
pub struct ScanPosition {
    mcu: u32,
    mcu_count: u32,
    rsti: u32,
    rstw: u32,
}

impl ScanPosition {
    pub fn new(jf: &JpegHeader) -> Self {
        ScanPosition {
            mcu: 0,
            mcu_count: jf.mcuh * jf.mcuv,
            rsti: jf.rsti,
            rstw: jf.rsti,
        }
    }

    pub fn get_mcu(&self) -> u32 {
        self.mcu
    }

    /// restart wait counter
    pub fn reset_rstw(&mut self) {
        self.rstw = self.rsti;
    }

    pub fn next_mcu_pos(&mut self) -> JPegDecodeStatus {
        self.mcu += 1;

        if self.mcu >= self.mcu_count {
            return JPegDecodeStatus::ScanCompleted;
        }

        if self.rsti > 0 {
            self.rstw -= 1;
            if self.rstw == 0 {
                return JPegDecodeStatus::RestartIntervalExpired;
            }
        }

        JPegDecodeStatus::DecodeInProgress
    }
}

/// Decodes all blocks of one MCU. Whatever the component order of the scan, blocks are
/// stored as the luma blocks row by row followed by Cb and Cr. `luma_only` skips storing
/// chroma coefficients.
pub fn decode_mcu<R: Read>(
    reader: &mut BitReader<R>,
    jf: &JpegHeader,
    tables: &HuffmanTables,
    dc_preds: &mut [i16; 4],
    blocks: &mut [DecodedBlock],
    detail: BlockDetail,
    luma_only: bool,
) -> Result<()> {
    let (h, v) = jf.layout.luma_blocks();
    let luma_count = (h * v) as usize;

    for &cmp in jf.cs_cmp[..jf.cs_cmpc].iter() {
        let ci = &jf.cmp_info[cmp];
        let (mut b, count) = if cmp == 0 {
            (0, luma_count)
        } else {
            (luma_count + cmp - 1, 1)
        };

        let cmp_detail = if luma_only && cmp != 0 {
            BlockDetail::DcOnly
        } else {
            detail
        };

        for _ in 0..count {
            decode_block(
                reader,
                &tables.dc[usize::from(ci.huff_dc)],
                &tables.ac[usize::from(ci.huff_ac)],
                &mut dc_preds[cmp],
                &mut blocks[b],
                cmp_detail,
            )?;
            b += 1;
        }
    }

    if reader.is_overrun() {
        return err_exit_code(ExitCode::DecodeError, "entropy coded data ended inside an MCU");
    }

    Ok(())
}

/// Writes a block of zigzag ordered coefficients the way an encoder would.
#[cfg(test)]
pub fn encode_block(
    w: &mut super::bit_writer::BitWriter,
    dc_map: &[(u32, u32); 256],
    ac_map: &[(u32, u32); 256],
    zigzag: &[i16; 64],
    dc_pred: &mut i16,
) {
    use super::huffman_table::std_tables::magnitude;

    let diff = i32::from(zigzag[0]) - i32::from(*dc_pred);
    *dc_pred = zigzag[0];

    let (size, bits) = magnitude(diff);
    let (code, len) = dc_map[size as usize];
    w.write(code, len);
    w.write(bits, size);

    let mut run = 0;
    for k in 1..64 {
        let v = i32::from(zigzag[k]);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::bit_writer::BitWriter;
    use crate::structs::huffman_table::std_tables;
    use default_boxed::DefaultBoxed;

    fn tables() -> (Box<DcTable>, Box<AcTable>) {
        let mut dc = DcTable::default_boxed();
        dc.build(&std_tables::dc_luminance()).unwrap();
        let mut ac = AcTable::default_boxed();
        ac.build(&std_tables::ac_luminance()).unwrap();
        (dc, ac)
    }

    fn maps() -> ([(u32, u32); 256], [(u32, u32); 256]) {
        (
            std_tables::code_map(&std_tables::dc_luminance()),
            std_tables::code_map(&std_tables::ac_luminance()),
        )
    }

    #[test]
    fn roundtrip_random_blocks() {
        use rand::Rng;

        let (dc, ac) = tables();
        let (dc_map, ac_map) = maps();
        let mut rng = crate::helpers::get_rand_from_seed([5; 32]);

        let mut blocks = Vec::new();
        let mut w = BitWriter::new();
        let mut pred = 0;
        for _ in 0..200 {
            let mut zigzag = [0i16; 64];
            zigzag[0] = rng.gen_range(-1000..1000);
            for k in 1..64 {
                if rng.gen_range(0..4) == 0 {
                    zigzag[k] = rng.gen_range(-300..300);
                }
            }
            encode_block(&mut w, &dc_map, &ac_map, &zigzag, &mut pred);
            blocks.push(zigzag);
        }
        let data = w.finish();

        let mut r = BitReader::new(&data[..], 128);
        let mut pred = 0;
        let mut block = DecodedBlock::default();
        for zigzag in blocks.iter() {
            decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Full).unwrap();

            let mut cols = 0u8;
            let mut rows = 0u8;
            for k in 0..64 {
                let pos = usize::from(ZIGZAG_TO_RASTER[k]);
                assert_eq!(block.coef[pos], zigzag[k]);
                if k > 0 && zigzag[k] != 0 {
                    cols |= 1 << (pos & 7);
                    rows |= 1 << (pos >> 3);
                }
            }
            assert_eq!(block.cols, cols);
            assert_eq!(block.rows, rows);
        }
        assert!(!r.is_overrun());
    }

    #[test]
    fn reduced_detail_keeps_low_coefficients() {
        let (dc, ac) = tables();
        let (dc_map, ac_map) = maps();

        let mut zigzag = [0i16; 64];
        zigzag[0] = 50;
        zigzag[1] = 3; // (0,1)
        zigzag[2] = -4; // (1,0)
        zigzag[4] = 7; // (1,1)
        zigzag[3] = 9; // (2,0)
        zigzag[63] = 1;

        let mut w = BitWriter::new();
        let mut pred = 0;
        encode_block(&mut w, &dc_map, &ac_map, &zigzag, &mut pred);
        encode_block(&mut w, &dc_map, &ac_map, &zigzag, &mut pred);
        encode_block(&mut w, &dc_map, &ac_map, &zigzag, &mut pred);
        let data = w.finish();

        let mut r = BitReader::new(&data[..], 128);
        let mut pred = 0;
        let mut block = DecodedBlock::default();

        decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Low2x2).unwrap();
        assert_eq!(block.coef[0], 50);
        assert_eq!(block.coef[1], 3);
        assert_eq!(block.coef[8], -4);
        assert_eq!(block.coef[9], 7);
        assert_eq!(block.coef[16], 0);
        assert_eq!(block.coef[63], 0);
        assert_eq!(block.cols, 0b11);

        decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::DcOnly).unwrap();
        assert_eq!(block.coef[0], 50);
        assert!(block.is_dc_only());

        decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Full).unwrap();
        assert_eq!(block.coef[16], 9);
        assert_eq!(block.coef[63], 1);
        assert_eq!(block.rows, 0b1000_0111);
    }

    #[test]
    fn run_past_end_is_decode_error() {
        let (dc, ac) = tables();
        let (dc_map, ac_map) = maps();

        let mut w = BitWriter::new();

        // DC 0
        let (code, len) = dc_map[0];
        w.write(code, len);

        // three ZRLs reach position 49, then a run of 15 lands on 64
        for _ in 0..3 {
            let (code, len) = ac_map[0xf0];
            w.write(code, len);
        }
        let (code, len) = ac_map[0xf1];
        w.write(code, len);
        w.write(1, 1);
        let data = w.finish();

        let mut r = BitReader::new(&data[..], 128);
        let mut pred = 0;
        let mut block = DecodedBlock::default();
        let e = decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Full)
            .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::DecodeError);
    }

    #[test]
    fn zero_run_can_fill_the_block() {
        let (dc, ac) = tables();
        let (dc_map, ac_map) = maps();

        let mut w = BitWriter::new();
        let (code, len) = dc_map[0];
        w.write(code, len);

        // position 15, then 3 ZRLs take k from 16 to 64
        let (code, len) = ac_map[0xe1];
        w.write(code, len);
        w.write(1, 1);
        for _ in 0..3 {
            let (code, len) = ac_map[0xf0];
            w.write(code, len);
        }

        // next block
        let (code, len) = dc_map[0];
        w.write(code, len);
        let (code, len) = ac_map[0x00];
        w.write(code, len);
        let data = w.finish();

        let mut r = BitReader::new(&data[..], 128);
        let mut pred = 0;
        let mut block = DecodedBlock::default();
        decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Full).unwrap();
        assert_eq!(block.coef[usize::from(ZIGZAG_TO_RASTER[15])], 1);
        decode_block(&mut r, &dc, &ac, &mut pred, &mut block, BlockDetail::Full).unwrap();
        assert!(block.is_dc_only());
        assert!(!r.is_overrun());
    }

    #[test]
    fn scan_position_restarts() {
        let mut jf = JpegHeader::default();
        jf.mcuh = 3;
        jf.mcuv = 2;
        jf.rsti = 4;

        let mut p = ScanPosition::new(&jf);
        let mut statuses = Vec::new();
        loop {
            let s = p.next_mcu_pos();
            if s == JPegDecodeStatus::RestartIntervalExpired {
                p.reset_rstw();
            }
            let done = s == JPegDecodeStatus::ScanCompleted;
            statuses.push(s);
            if done {
                break;
            }
        }

        assert_eq!(statuses.len(), 6);
        assert_eq!(statuses[3], JPegDecodeStatus::RestartIntervalExpired);
        assert_eq!(p.get_mcu(), 6);
    }
}
