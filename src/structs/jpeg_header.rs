/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Read;

use log::{debug, warn};

use crate::consts::SOI;
use crate::enabled_features::EnabledFeatures;
use crate::helpers::*;
use crate::jpeg_code;
use crate::jpeg_error::{err_exit_code, AddContext, ExitCode, Result};

use super::component_info::ComponentInfo;
use super::exif::ExifInfo;
use super::huffman_table::HuffmanSpec;

/// Arrangement of the chroma samples relative to the luma samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsamplingLayout {
    /// single component, one block per MCU
    Grayscale,
    /// no subsampling, Y Cb Cr per MCU
    Yuv444,
    /// chroma halved horizontally, Y0 Y1 Cb Cr per MCU
    Yuv422,
    /// chroma halved vertically, Y0 (top) Y1 (bottom) Cb Cr per MCU
    Yuv440,
    /// chroma halved in both directions, Y0 Y1 Y2 Y3 Cb Cr per MCU
    Yuv420,
}

impl SubsamplingLayout {
    /// number of luma blocks in the MCU horizontally and vertically
    pub fn luma_blocks(self) -> (u32, u32) {
        match self {
            SubsamplingLayout::Grayscale | SubsamplingLayout::Yuv444 => (1, 1),
            SubsamplingLayout::Yuv422 => (2, 1),
            SubsamplingLayout::Yuv440 => (1, 2),
            SubsamplingLayout::Yuv420 => (2, 2),
        }
    }

    /// total number of 8x8 blocks in an MCU
    pub fn blocks_per_mcu(self) -> usize {
        let (h, v) = self.luma_blocks();
        let chroma = if self == SubsamplingLayout::Grayscale {
            0
        } else {
            2
        };
        (h * v) as usize + chroma
    }
}

#[derive(Debug, PartialEq)]
enum ParseSegmentResult {
    Continue,
    SOS,
}

/// Everything the marker segments in front of the scan describe
#[derive(Debug, Clone)]
pub struct JpegHeader {
    /// quantization tables in zigzag order, as stored in the file
    pub q_tables: [[u16; 64]; 4],

    /// which quantization table slots were defined
    pub q_set: [bool; 4],

    /// huffman table definitions, [0] = DC, [1] = AC
    pub huff_specs: [[Option<HuffmanSpec>; 4]; 2],

    /// components in the order of the frame header
    pub cmp_info: [ComponentInfo; 4],

    /// component count
    pub cmpc: usize,

    pub img_width: u32,
    pub img_height: u32,

    /// luma sampling factors, which determine the MCU size
    pub sfhm: u32,
    pub sfvm: u32,

    /// MCUs per row
    pub mcuh: u32,

    /// MCU rows
    pub mcuv: u32,

    /// restart interval in MCUs, 0 if there are none
    pub rsti: u32,

    /// component count in current scan
    pub cs_cmpc: usize,

    /// component numbers in current scan
    pub cs_cmp: [usize; 4],

    pub layout: SubsamplingLayout,

    pub exif: ExifInfo,

    /// number of bytes from the SOI up to and including the SOS segment
    pub header_length: u64,

    sof_seen: bool,
    exif_seen: bool,
}

impl Default for JpegHeader {
    fn default() -> Self {
        JpegHeader {
            q_tables: [[0; 64]; 4],
            q_set: [false; 4],
            huff_specs: Default::default(),
            cmp_info: Default::default(),
            cmpc: 0,
            img_width: 0,
            img_height: 0,
            sfhm: 0,
            sfvm: 0,
            mcuh: 0,
            mcuv: 0,
            rsti: 0,
            cs_cmpc: 0,
            cs_cmp: [0; 4],
            layout: SubsamplingLayout::Grayscale,
            exif: ExifInfo::default(),
            header_length: 0,
            sof_seen: false,
            exif_seen: false,
        }
    }
}

impl JpegHeader {
    /// Parses everything from the SOI up to and including the SOS segment. The reader is
    /// left at the first byte of the entropy coded data.
    pub fn parse<R: Read>(
        &mut self,
        reader: &mut R,
        enabled_features: &EnabledFeatures,
    ) -> Result<()> {
        let mut soi = [0u8; 2];
        if reader.read_exact(&mut soi).is_err() || soi != SOI {
            return err_exit_code(ExitCode::InvalidFile, "jpeg must start with 0xff 0xd8");
        }
        self.header_length = 2;

        // header parser loop
        while self
            .parse_next_segment(reader, enabled_features)
            .context()?
            == ParseSegmentResult::Continue
        {}

        for cmp in 0..self.cmpc {
            let q = usize::from(self.cmp_info[cmp].q_table_index);
            if !self.q_set[q] {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("component {0} uses undefined quantization table {1}", cmp, q),
                );
            }
        }

        let (mcu_w, mcu_h) = (8 * self.sfhm, 8 * self.sfvm);
        self.mcuh = div_ceil(self.img_width, mcu_w);
        self.mcuv = div_ceil(self.img_height, mcu_h);

        debug!(
            "{0}x{1} {2:?}, {3}x{4} MCUs, restart interval {5}",
            self.img_width, self.img_height, self.layout, self.mcuh, self.mcuv, self.rsti
        );

        Ok(())
    }

    fn read_bytes<R: Read>(&mut self, reader: &mut R, buf: &mut [u8]) -> Result<()> {
        reader.read_exact(buf).context()?;
        self.header_length += buf.len() as u64;
        Ok(())
    }

    fn read_marker<R: Read>(&mut self, reader: &mut R) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        self.read_bytes(reader, &mut b)?;
        if b[0] != 0xff {
            warn!("skipping byte {0:02X} outside of a marker segment", b[0]);
            return Ok(None);
        }

        // any number of fill bytes may precede the marker code
        while b[0] == 0xff {
            self.read_bytes(reader, &mut b)?;
        }

        Ok(Some(b[0]))
    }

    fn parse_next_segment<R: Read>(
        &mut self,
        reader: &mut R,
        enabled_features: &EnabledFeatures,
    ) -> Result<ParseSegmentResult> {
        let Some(btype) = self.read_marker(reader)? else {
            return Ok(ParseSegmentResult::Continue);
        };

        match btype {
            jpeg_code::EOI => {
                return err_exit_code(ExitCode::InvalidFile, "end of image before start of scan");
            }
            jpeg_code::SOI | jpeg_code::RST0..=jpeg_code::RST7 | 0x00..=0xBF => {
                // markers without a length that don't belong here
                warn!("unexpected marker FF {0:02X} in header, skipped", btype);
                return Ok(ParseSegmentResult::Continue);
            }
            _ => {}
        }

        let mut header = [0u8; 2];
        self.read_bytes(reader, &mut header)?;

        let segment_size = b_short(header[0], header[1]);
        if segment_size < 2 {
            return err_exit_code(ExitCode::InvalidFile, "segment is too short");
        }

        let payload_offset = self.header_length;
        let mut segment_data = vec![0u8; usize::from(segment_size) - 2];
        self.read_bytes(reader, &mut segment_data)?;

        let segment = &segment_data[..];
        let len = segment.len();
        let mut hpos = 0;

        debug!("segment FF {0:02X}, {1} bytes", btype, len);

        match btype
        {
            jpeg_code::DHT => // DHT segment
            {
                while hpos < len
                {
                    let lval = usize::from(lbits(segment[hpos], 4));
                    let rval = usize::from(rbits(segment[hpos], 4));
                    if (lval >= 2) || (rval >= 4)
                    {
                        return err_exit_code(ExitCode::DecodeError, format!("DHT has invalid table class/index {0}/{1}", lval, rval));
                    }

                    hpos += 1;
                    ensure_space(segment, hpos, 16, ExitCode::DecodeError)?;

                    let mut counts = [0u8; 16];
                    counts.copy_from_slice(&segment[hpos..hpos + 16]);
                    hpos += 16;

                    let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
                    if total > 256 || total > len - hpos
                    {
                        return err_exit_code(ExitCode::DecodeError, format!("DHT declares {0} symbols, only {1} bytes left", total, len - hpos));
                    }

                    self.huff_specs[lval][rval] = Some(HuffmanSpec::new(counts, &segment[hpos..hpos + total]));
                    hpos += total;
                }
            }

            jpeg_code::DQT => // DQT segment
            {
                while hpos < len
                {
                    let lval = usize::from(lbits(segment[hpos], 4));
                    let rval = usize::from(rbits(segment[hpos], 4));
                    if lval >= 2 || rval >= 4
                    {
                        return err_exit_code(ExitCode::DecodeError, format!("DQT has invalid precision/index {0}/{1}", lval, rval));
                    }

                    hpos += 1;
                    if lval == 0
                    {
                        ensure_space(segment, hpos, 64, ExitCode::DecodeError)?;

                        // 8 bit precision
                        for i in 0..64
                        {
                            self.q_tables[rval][i] = u16::from(segment[hpos + i]);
                        }

                        hpos += 64;
                    }
                    else
                    {
                        ensure_space(segment, hpos, 128, ExitCode::DecodeError)?;

                        // 16 bit precision
                        for i in 0..64
                        {
                            self.q_tables[rval][i] = b_short(segment[hpos + (2 * i)], segment[hpos + (2 * i) + 1]);
                        }

                        hpos += 128;
                    }

                    self.q_set[rval] = true;
                }
            }

            jpeg_code::DRI =>
            {
                ensure_space(segment, hpos, 2, ExitCode::InvalidFile)?;
                self.rsti = u32::from(b_short(segment[hpos], segment[hpos + 1]));
            }

            jpeg_code::SOS =>
            {
                self.parse_sos(segment)?;
                return Ok(ParseSegmentResult::SOS);
            }

            jpeg_code::SOF0 =>
            {
                self.parse_sof(segment, enabled_features)?;
            }

            jpeg_code::SOF1 => // extended sequential DCT
            {
                return err_exit_code(ExitCode::UnsupportedFeature, "sof1 marker found, image is coded extended sequential");
            }

            jpeg_code::SOF2 => // progressive DCT
            {
                return err_exit_code(ExitCode::UnsupportedFeature, "sof2 marker found, image is coded progressive");
            }

            jpeg_code::SOF3 => // lossless sequential
            {
                return err_exit_code(ExitCode::UnsupportedFeature, "sof3 marker found, image is coded lossless");
            }

            0xC5..=0xC7 => // differential
            {
                return err_exit_code(ExitCode::UnsupportedFeature, format!("sof{0} marker found, image is coded differential", btype - jpeg_code::SOF0));
            }

            0xC9..=0xCB | 0xCD..=0xCF | jpeg_code::DAC => // arithmetic coding
            {
                return err_exit_code(ExitCode::UnsupportedFeature, format!("marker FF {0:02X} found, image is arithmetic coded", btype));
            }

            jpeg_code::APP1 =>
            {
                if !self.exif_seen
                {
                    if let Some(exif) = ExifInfo::parse(segment, payload_offset)
                    {
                        self.exif = exif;
                        self.exif_seen = true;
                    }
                }
            }

            _ => // APPn, COM and everything else with a length we don't need
            {
            }
        }

        return Ok(ParseSegmentResult::Continue);
    }

    fn parse_sof(&mut self, segment: &[u8], enabled_features: &EnabledFeatures) -> Result<()> {
        if self.sof_seen {
            return err_exit_code(ExitCode::InvalidFile, "image cannot have multiple SOF blocks");
        }
        self.sof_seen = true;

        ensure_space(segment, 0, 6, ExitCode::InvalidFile)?;

        // check data precision, only 8 bit is allowed
        if segment[0] != 8 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!("{0} bit data precision is not supported", segment[0]),
            );
        }

        self.img_height = u32::from(b_short(segment[1], segment[2]));
        self.img_width = u32::from(b_short(segment[3], segment[4]));

        if self.img_width == 0 {
            return err_exit_code(ExitCode::InvalidFile, "image width can't be zero");
        }

        if self.img_height == 0 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                "image height defined by DNL marker is not supported",
            );
        }

        if self.img_height > enabled_features.max_jpeg_height
            || self.img_width > enabled_features.max_jpeg_width
        {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!(
                    "image dimensions larger than {0}x{1}",
                    enabled_features.max_jpeg_width, enabled_features.max_jpeg_height
                ),
            );
        }

        self.cmpc = usize::from(segment[5]);
        if self.cmpc != 1 && self.cmpc != 3 {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                format!("image has {0} components, only 1 or 3 are supported", self.cmpc),
            );
        }

        let mut hpos = 6;
        for cmp in 0..self.cmpc {
            ensure_space(segment, hpos, 3, ExitCode::InvalidFile)?;

            let ci = &mut self.cmp_info[cmp];
            ci.jid = segment[hpos];
            ci.sfh = u32::from(lbits(segment[hpos + 1], 4));
            ci.sfv = u32::from(rbits(segment[hpos + 1], 4));

            if ci.sfh == 0 || ci.sfv == 0 {
                return err_exit_code(ExitCode::InvalidFile, "sampling factor can't be zero");
            }

            let quantization_table_value = segment[hpos + 2];
            if quantization_table_value >= 4 {
                return err_exit_code(ExitCode::InvalidFile, "quantization table index too big");
            }

            ci.q_table_index = quantization_table_value;
            hpos += 3;
        }

        if self.cmpc == 1 {
            // a single component is never interleaved, its sampling factors don't matter
            self.layout = SubsamplingLayout::Grayscale;
            self.sfhm = 1;
            self.sfvm = 1;
            return Ok(());
        }

        for cmp in 1..self.cmpc {
            if self.cmp_info[cmp].sfh != 1 || self.cmp_info[cmp].sfv != 1 {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!(
                        "chroma sampling {0}x{1} is not supported",
                        self.cmp_info[cmp].sfh, self.cmp_info[cmp].sfv
                    ),
                );
            }
        }

        self.sfhm = self.cmp_info[0].sfh;
        self.sfvm = self.cmp_info[0].sfv;
        self.layout = match (self.sfhm, self.sfvm) {
            (1, 1) => SubsamplingLayout::Yuv444,
            (2, 1) => SubsamplingLayout::Yuv422,
            (1, 2) => SubsamplingLayout::Yuv440,
            (2, 2) => SubsamplingLayout::Yuv420,
            (h, v) => {
                return err_exit_code(
                    ExitCode::UnsupportedFeature,
                    format!("luma sampling {0}x{1} is not supported", h, v),
                );
            }
        };

        Ok(())
    }

    fn parse_sos(&mut self, segment: &[u8]) -> Result<()> {
        if !self.sof_seen {
            return err_exit_code(ExitCode::InvalidFile, "start of scan before start of frame");
        }

        ensure_space(segment, 0, 1, ExitCode::InvalidFile)?;

        self.cs_cmpc = usize::from(segment[0]);
        if self.cs_cmpc == 0 || self.cs_cmpc > self.cmpc {
            return err_exit_code(
                ExitCode::InvalidFile,
                format!(
                    "{0} components in scan, only {1} are allowed",
                    self.cs_cmpc, self.cmpc
                ),
            );
        }

        if self.cs_cmpc != self.cmpc {
            return err_exit_code(
                ExitCode::UnsupportedFeature,
                "images split over multiple scans are not supported",
            );
        }

        let mut hpos = 1;
        let mut seen = [false; 4];
        for i in 0..self.cs_cmpc {
            ensure_space(segment, hpos, 2, ExitCode::InvalidFile)?;

            let Some(cmp) = self.cmp_info[..self.cmpc]
                .iter()
                .position(|c| c.jid == segment[hpos])
            else {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("unknown component id {0} in start-of-scan", segment[hpos]),
                );
            };

            if seen[cmp] {
                return err_exit_code(
                    ExitCode::DecodeError,
                    format!("duplicate component id {0} in start-of-scan", segment[hpos]),
                );
            }
            seen[cmp] = true;

            self.cs_cmp[i] = cmp;
            self.cmp_info[cmp].huff_dc = lbits(segment[hpos + 1], 4);
            self.cmp_info[cmp].huff_ac = rbits(segment[hpos + 1], 4);

            if self.cmp_info[cmp].huff_dc >= 4 || self.cmp_info[cmp].huff_ac >= 4 {
                return err_exit_code(ExitCode::DecodeError, "huffman table number out of range");
            }

            hpos += 2;
        }

        ensure_space(segment, hpos, 3, ExitCode::InvalidFile)?;

        let (from, to, approx) = (segment[hpos], segment[hpos + 1], segment[hpos + 2]);
        if from != 0 || to != 63 || approx != 0 {
            warn!(
                "unexpected spectral selection {0}..{1} / approximation {2:02X} in baseline scan, ignored",
                from, to, approx
            );
        }

        Ok(())
    }
}

fn ensure_space(segment: &[u8], hpos: usize, amount: usize, exit_code: ExitCode) -> Result<()> {
    if hpos + amount > segment.len() {
        return err_exit_code(exit_code, "segment too small");
    }

    Ok(())
}


#[cfg(test)]
fn parse_bytes(data: &[u8]) -> Result<JpegHeader> {
    let mut h = JpegHeader::default();
    let mut reader = data;
    h.parse(&mut reader, &EnabledFeatures::default())?;
    Ok(h)
}

#[test]
fn parse_420_header() {
    let data = test_streams::header(33, 17, 3, (2, 2), 4);
    let h = parse_bytes(&data).unwrap();

    assert_eq!(h.layout, SubsamplingLayout::Yuv420);
    assert_eq!((h.img_width, h.img_height), (33, 17));
    assert_eq!((h.mcuh, h.mcuv), (3, 2));
    assert_eq!(h.rsti, 4);
    assert_eq!(h.cs_cmpc, 3);
    assert_eq!(h.cmp_info[1].huff_dc, 1);
    assert_eq!(h.header_length, data.len() as u64);
    assert_eq!(h.layout.blocks_per_mcu(), 6);
}

#[test]
fn parse_grayscale_ignores_sampling() {
    let h = parse_bytes(&test_streams::header(16, 8, 1, (2, 2), 0)).unwrap();
    assert_eq!(h.layout, SubsamplingLayout::Grayscale);
    assert_eq!((h.mcuh, h.mcuv), (2, 1));
}

#[test]
fn parse_exif_orientation() {
    use super::exif::{build_exif_payload, Orientation};

    let app1 = test_streams::segment(
        jpeg_code::APP1,
        &build_exif_payload::<byteorder::LittleEndian>(6, Some((40, 100))),
    );
    let h = parse_bytes(&test_streams::header_with_app(8, 8, 3, (1, 1), 0, &app1)).unwrap();

    assert_eq!(h.exif.orientation, Orientation::RightTop);

    // SOI + marker + length, then the 6 byte signature
    assert_eq!(h.exif.thumbnail.unwrap().offset, 2 + 4 + 6 + 40);
}

#[test]
fn bad_soi_is_invalid_file() {
    let mut data = test_streams::header(8, 8, 1, (1, 1), 0);
    data[1] = 0xd9;
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::InvalidFile
    );
    assert_eq!(
        parse_bytes(&[0xff]).unwrap_err().exit_code(),
        ExitCode::InvalidFile
    );
}

#[test]
fn unsupported_frames() {
    // progressive
    let mut data = test_streams::header(8, 8, 3, (2, 1), 0);
    let sof = data
        .windows(2)
        .position(|w| w == [0xff, jpeg_code::SOF0])
        .unwrap();
    data[sof + 1] = jpeg_code::SOF2;
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::UnsupportedFeature
    );

    // 12 bit
    data[sof + 1] = jpeg_code::SOF0;
    data[sof + 4] = 12;
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::UnsupportedFeature
    );

    // 4x1 luma sampling
    assert_eq!(
        parse_bytes(&test_streams::header(8, 8, 3, (4, 1), 0))
            .unwrap_err()
            .exit_code(),
        ExitCode::UnsupportedFeature
    );
}

#[test]
fn invalid_tables_are_decode_errors() {
    // DQT with index 5
    let mut data = vec![0xff, jpeg_code::SOI];
    let mut dqt = vec![0x05];
    dqt.extend_from_slice(&[1; 64]);
    data.extend(test_streams::segment(jpeg_code::DQT, &dqt));
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::DecodeError
    );

    // DHT with more symbols than bytes
    let mut data = vec![0xff, jpeg_code::SOI];
    let mut dht = vec![0x00];
    dht.extend_from_slice(&[0, 0, 20, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    dht.extend_from_slice(&[0; 10]);
    data.extend(test_streams::segment(jpeg_code::DHT, &dht));
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::DecodeError
    );
}

#[test]
fn unknown_component_in_scan() {
    let mut data = test_streams::header(8, 8, 1, (1, 1), 0);

    // the component id is the 5th byte from the end (id, tables, Ss, Se, Ah/Al)
    let n = data.len();
    data[n - 5] = 9;
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::DecodeError
    );
}

#[test]
fn duplicate_component_in_scan() {
    let mut data = test_streams::header(16, 16, 3, (2, 2), 0);

    // scan lists ids 1, 3, 3: the second id sits 7 bytes from the end
    let n = data.len();
    assert_eq!(data[n - 7], 2);
    data[n - 7] = 3;
    assert_eq!(
        parse_bytes(&data).unwrap_err().exit_code(),
        ExitCode::DecodeError
    );
}

#[test]
fn garbage_between_segments_is_skipped() {
    let mut data = vec![0xff, jpeg_code::SOI, 0x12, 0x34, 0xff, 0x01, 0xff];
    let header = test_streams::header(8, 8, 1, (1, 1), 0);
    data.extend_from_slice(&header[2..]);

    let h = parse_bytes(&data).unwrap();
    assert_eq!(h.img_width, 8);
    assert_eq!(h.header_length, data.len() as u64);
}

#[test]
fn truncated_header_is_short_read() {
    let data = test_streams::header(8, 8, 3, (1, 1), 0);
    assert_eq!(
        parse_bytes(&data[..data.len() - 3]).unwrap_err().exit_code(),
        ExitCode::ShortRead
    );
}

#[test]
fn eoi_before_scan() {
    assert_eq!(
        parse_bytes(&[0xff, 0xd8, 0xff, 0xd9]).unwrap_err().exit_code(),
        ExitCode::InvalidFile
    );
}
