/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::{Read, Seek, SeekFrom};

use log::{debug, warn};

use crate::consts::JPegDecodeStatus;
use crate::decode_options::{required_buffer_size, DecodeFlags, DecodeOptions};
use crate::enabled_features::EnabledFeatures;
use crate::jpeg_error::{err_exit_code, AddContext, ExitCode, Result};
use crate::metrics::{CpuTimeMeasure, Metrics};

use super::bit_reader::BitReader;
use super::exif::{ExifThumbnail, Orientation};
use super::huffman_table::HuffmanTables;
use super::jpeg_header::{JpegHeader, SubsamplingLayout};
use super::jpeg_read::{decode_mcu, DecodedBlock, ScanPosition};
use super::mcu_compositor::{McuCompositor, McuSamples};
use super::quantization_tables::QuantizationTables;

/// Progress of a `JpegDecoder`. Each step moves it forward by one state, any failure
/// moves it to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Init,
    HeaderParsed,
    TablesBuilt,
    Decoding,
    Done,
    Failed,
}

/// What the headers say about an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub components: u32,
    pub layout: SubsamplingLayout,
    pub restart_interval: u32,
    pub orientation: Orientation,
    pub thumbnail: Option<ExifThumbnail>,
}

impl ImageInfo {
    fn new(jf: &JpegHeader, orientation: Orientation) -> Self {
        ImageInfo {
            width: jf.img_width,
            height: jf.img_height,
            components: jf.cmpc as u32,
            layout: jf.layout,
            restart_interval: jf.rsti,
            orientation,
            thumbnail: jf.exif.thumbnail,
        }
    }

    /// Width and height of the pixels a decode with `options` produces.
    pub fn output_size(&self, options: &DecodeOptions) -> Result<(u32, u32)> {
        let scale = options.output_scale()?;
        let width = scale.scaled(self.width);
        let height = scale.scaled(self.height);

        if options.flags.contains(DecodeFlags::AUTO_ROTATE) && self.orientation.swaps_dimensions()
        {
            Ok((height, width))
        } else {
            Ok((width, height))
        }
    }

    /// size of the destination buffer needed for a decode with `options`
    pub fn required_buffer_size(&self, options: &DecodeOptions) -> Result<usize> {
        let (w, h) = self.output_size(options)?;
        Ok(required_buffer_size(w, h, options.pixel_type))
    }
}

/// Parses only the headers of the stream and describes the main image.
pub fn read_image_info<R: Read>(
    reader: &mut R,
    enabled_features: &EnabledFeatures,
) -> Result<ImageInfo> {
    let mut jf = JpegHeader::default();
    jf.parse(reader, enabled_features).context()?;
    Ok(ImageInfo::new(&jf, jf.exif.orientation))
}

/// Decodes a baseline JPEG stream into a caller provided buffer, one explicit step at a time:
/// `read_header`, `build_tables` and then `decode_into`.
pub struct JpegDecoder<R> {
    source: R,
    options: DecodeOptions,
    enabled_features: EnabledFeatures,
    state: DecoderState,

    header: JpegHeader,

    /// orientation of the main image, also used for its thumbnail
    orientation: Orientation,

    tables: Option<Box<HuffmanTables>>,
    q_tables: Vec<QuantizationTables>,

    metrics: Metrics,
}

impl<R: Read + Seek> JpegDecoder<R> {
    pub fn new(source: R, options: DecodeOptions, enabled_features: EnabledFeatures) -> Self {
        JpegDecoder {
            source,
            options,
            enabled_features,
            state: DecoderState::Init,
            header: JpegHeader::default(),
            orientation: Orientation::TopLeft,
            tables: None,
            q_tables: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Describes the image that will be decoded, the thumbnail if one was requested.
    pub fn image_info(&self) -> Result<ImageInfo> {
        match self.state {
            DecoderState::Init | DecoderState::Failed => err_exit_code(
                ExitCode::InvalidParameter,
                format!("no image information in state {0:?}", self.state),
            ),
            _ => Ok(ImageInfo::new(&self.header, self.orientation)),
        }
    }

    /// Parses the headers up to the start of the scan.
    pub fn read_header(&mut self) -> Result<ImageInfo> {
        self.check_state(DecoderState::Init, "read_header")?;

        let r = self.parse_headers();
        self.advance(r, DecoderState::HeaderParsed)
    }

    /// Builds the Huffman lookup and dequantization tables the scan refers to.
    pub fn build_tables(&mut self) -> Result<()> {
        self.check_state(DecoderState::HeaderParsed, "build_tables")?;

        let r = self.build_tables_internal();
        self.advance(r, DecoderState::TablesBuilt)
    }

    /// Decodes the scan into `dest`, which must hold at least `required_buffer_size` bytes.
    /// If decoding fails part way, the MCUs written so far stay in `dest`.
    pub fn decode_into(&mut self, dest: &mut [u8]) -> Result<()> {
        self.check_state(DecoderState::TablesBuilt, "decode_into")?;

        let required = self.image_info()?.required_buffer_size(&self.options)?;
        if dest.len() < required {
            return err_exit_code(
                ExitCode::InvalidParameter,
                format!(
                    "destination holds {0} bytes, {1} are needed",
                    dest.len(),
                    required
                ),
            );
        }

        self.state = DecoderState::Decoding;

        let cpu = CpuTimeMeasure::new();
        let r = self.decode_scan(dest);
        self.metrics.record_cpu_time(cpu.elapsed());

        self.advance(r, DecoderState::Done)
    }

    fn check_state(&self, expected: DecoderState, step: &str) -> Result<()> {
        if self.state != expected {
            return err_exit_code(
                ExitCode::InvalidParameter,
                format!(
                    "{0} requires state {1:?} but the decoder is {2:?}",
                    step, expected, self.state
                ),
            );
        }
        Ok(())
    }

    fn advance<T>(&mut self, r: Result<T>, next: DecoderState) -> Result<T> {
        match r {
            Ok(v) => {
                self.state = next;
                Ok(v)
            }
            Err(e) => {
                self.state = DecoderState::Failed;
                Err(e)
            }
        }
    }

    fn parse_headers(&mut self) -> Result<ImageInfo> {
        // reject contradicting flags before touching the stream
        self.options.output_scale()?;

        let start = self.source.stream_position()?;

        let mut header = JpegHeader::default();
        header
            .parse(&mut self.source, &self.enabled_features)
            .context()?;
        self.orientation = header.exif.orientation;

        if self.options.flags.contains(DecodeFlags::EXIF_THUMBNAIL) {
            let Some(thumbnail) = header.exif.thumbnail else {
                return err_exit_code(
                    ExitCode::InvalidParameter,
                    "image has no EXIF thumbnail",
                );
            };

            debug!(
                "decoding thumbnail at offset {0}, {1} bytes",
                thumbnail.offset, thumbnail.length
            );

            self.source
                .seek(SeekFrom::Start(start + thumbnail.offset))
                .context()?;

            header = JpegHeader::default();
            header
                .parse(&mut self.source, &self.enabled_features)
                .context()?;
        }

        self.metrics.record_bytes_consumed(header.header_length);
        self.header = header;

        Ok(ImageInfo::new(&self.header, self.orientation))
    }

    fn build_tables_internal(&mut self) -> Result<()> {
        self.tables = Some(HuffmanTables::build(&self.header).context()?);

        self.q_tables = (0..self.header.cmpc)
            .map(|cmp| QuantizationTables::new(&self.header, cmp))
            .collect();

        Ok(())
    }

    fn decode_scan(&mut self, dest: &mut [u8]) -> Result<()> {
        let scale = self.options.output_scale()?;
        let orientation = if self.options.flags.contains(DecodeFlags::AUTO_ROTATE) {
            self.orientation
        } else {
            Orientation::TopLeft
        };

        let jf = &self.header;
        let compositor = McuCompositor::new(jf, &self.options, scale, orientation);

        let Some(tables) = self.tables.as_deref() else {
            return err_exit_code(ExitCode::AssertionFailure, "huffman tables were not built");
        };

        let mut reader = BitReader::new(&mut self.source, self.enabled_features.source_chunk_size);

        let blocks_per_mcu = jf.layout.blocks_per_mcu();
        let mut blocks = vec![DecodedBlock::default(); blocks_per_mcu];
        let mut samples = McuSamples::default();
        let mut dc_preds = [0i16; 4];

        let detail = compositor.block_detail();
        let luma_only = self.options.luma_only();

        let mut pos = ScanPosition::new(jf);
        loop {
            let mcu = pos.get_mcu();

            decode_mcu(
                &mut reader,
                jf,
                tables,
                &mut dc_preds,
                &mut blocks,
                detail,
                luma_only,
            )
            .context()?;

            let dc_only = compositor.reconstruct_mcu(&blocks, &self.q_tables, &mut samples);
            compositor.write_mcu(&samples, mcu % jf.mcuh, mcu / jf.mcuh, dest);
            self.metrics.record_mcu(blocks_per_mcu, dc_only);

            match pos.next_mcu_pos() {
                JPegDecodeStatus::ScanCompleted => break,
                JPegDecodeStatus::RestartIntervalExpired => {
                    // the marker itself was removed by the filter
                    reader.align_to_byte();
                    dc_preds = [0; 4];
                    pos.reset_rstw();
                    self.metrics.record_restart();
                }
                JPegDecodeStatus::DecodeInProgress => {}
            }
        }

        reader.align_to_byte();
        reader.ensure_bits(16)?;
        let tail = reader.peek(16);
        reader.consume(16);
        if reader.is_overrun() || tail != 0xffd9 {
            warn!("scan is not followed by EOI");
        }

        self.metrics
            .record_bytes_consumed(reader.source_bytes_read());

        Ok(())
    }
}
