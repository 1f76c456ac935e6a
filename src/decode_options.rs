/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use bitflags::bitflags;

use crate::jpeg_error::{err_exit_code, ExitCode, Result};

bitflags! {
    /// Flags that change how an image is decoded. They combine freely except the
    /// scale flags, of which at most one may be set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DecodeFlags: u32 {
        /// rotate/mirror the output according to the EXIF orientation tag
        const AUTO_ROTATE = 0x01;
        /// decode at 1/2 of the original width and height
        const SCALE_HALF = 0x02;
        /// decode at 1/4 of the original width and height
        const SCALE_QUARTER = 0x04;
        /// decode at 1/8 of the original width and height
        const SCALE_EIGHTH = 0x08;
        /// write RGB565 pixels low byte first
        const LITTLE_ENDIAN_PIXELS = 0x10;
        /// decode the JPEG thumbnail embedded in the EXIF data instead of the main image
        const EXIF_THUMBNAIL = 0x20;
        /// ignore the chroma components and produce a grayscale rendition
        const LUMA_ONLY = 0x40;
    }
}

impl Default for DecodeFlags {
    fn default() -> Self {
        DecodeFlags::empty()
    }
}

/// Format of the pixels written into the destination buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelType {
    /// 16 bits per pixel, 5-6-5 RGB. Byte order follows `DecodeFlags::LITTLE_ENDIAN_PIXELS`.
    #[default]
    Rgb565,

    /// 8 bits per pixel luma
    Grayscale,

    /// 1 bit per pixel, set where luma is at or above mid gray. Every row is
    /// padded to a multiple of 32 pixels, pixel x lives in bit x % 8 of byte x / 8.
    Binary,
}

impl PixelType {
    /// number of bytes occupied by one row of `width` pixels
    pub fn row_stride(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            PixelType::Rgb565 => width * 2,
            PixelType::Grayscale => width,
            PixelType::Binary => ((width + 31) / 32) * 4,
        }
    }
}

/// Returns the number of bytes a destination buffer needs to hold an image of the given
/// (already scaled and rotated) geometry.
pub fn required_buffer_size(width: u32, height: u32, pixel_type: PixelType) -> usize {
    pixel_type.row_stride(width) * height as usize
}

/// Output scale selected by the scale flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputScale {
    Full,
    Half,
    Quarter,
    Eighth,
}

impl OutputScale {
    /// log2 of the scale denominator
    pub fn shift(self) -> u32 {
        match self {
            OutputScale::Full => 0,
            OutputScale::Half => 1,
            OutputScale::Quarter => 2,
            OutputScale::Eighth => 3,
        }
    }

    /// dimension of the scaled output for a source dimension
    pub fn scaled(self, v: u32) -> u32 {
        let d = 1 << self.shift();
        (v + d - 1) / d
    }
}

/// Everything the caller can choose about a decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeOptions {
    pub flags: DecodeFlags,
    pub pixel_type: PixelType,
}

impl DecodeOptions {
    pub fn new(flags: DecodeFlags, pixel_type: PixelType) -> Self {
        DecodeOptions { flags, pixel_type }
    }

    /// verifies the flags are consistent and returns the selected scale
    pub fn output_scale(&self) -> Result<OutputScale> {
        let scale_flags = self.flags
            & (DecodeFlags::SCALE_HALF | DecodeFlags::SCALE_QUARTER | DecodeFlags::SCALE_EIGHTH);

        if scale_flags.bits().count_ones() > 1 {
            return err_exit_code(
                ExitCode::InvalidParameter,
                format!("scale flags are mutually exclusive: {0:?}", scale_flags),
            );
        }

        Ok(if scale_flags.contains(DecodeFlags::SCALE_HALF) {
            OutputScale::Half
        } else if scale_flags.contains(DecodeFlags::SCALE_QUARTER) {
            OutputScale::Quarter
        } else if scale_flags.contains(DecodeFlags::SCALE_EIGHTH) {
            OutputScale::Eighth
        } else {
            OutputScale::Full
        })
    }

    pub fn little_endian(&self) -> bool {
        self.flags.contains(DecodeFlags::LITTLE_ENDIAN_PIXELS)
    }

    pub fn luma_only(&self) -> bool {
        self.flags.contains(DecodeFlags::LUMA_ONLY)
    }
}

#[test]
fn scale_flags_are_exclusive() {
    let o = DecodeOptions::new(
        DecodeFlags::SCALE_HALF | DecodeFlags::SCALE_EIGHTH,
        PixelType::Grayscale,
    );
    assert_eq!(
        o.output_scale().unwrap_err().exit_code(),
        ExitCode::InvalidParameter
    );

    let o = DecodeOptions::new(
        DecodeFlags::SCALE_QUARTER | DecodeFlags::AUTO_ROTATE | DecodeFlags::LUMA_ONLY,
        PixelType::Rgb565,
    );
    assert_eq!(o.output_scale().unwrap(), OutputScale::Quarter);
    assert_eq!(OutputScale::Quarter.scaled(17), 5);
    assert_eq!(OutputScale::Eighth.scaled(16), 2);
}

#[test]
fn buffer_sizes() {
    assert_eq!(required_buffer_size(10, 3, PixelType::Rgb565), 60);
    assert_eq!(required_buffer_size(10, 3, PixelType::Grayscale), 30);
    assert_eq!(required_buffer_size(33, 2, PixelType::Binary), 16);
}
