/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

// Don't allow any unsafe code by default. Since this code has to potentially deal with
// badly/maliciously formatted images, we want this extra level of safety.
#![forbid(unsafe_code)]
#![forbid(non_ascii_idents)]

mod consts;
mod decode_options;
mod enabled_features;
mod helpers;
mod jpeg_code;
mod jpeg_error;
mod metrics;
mod structs;

use std::io::{Read, Seek};

pub use decode_options::{required_buffer_size, DecodeFlags, DecodeOptions, OutputScale, PixelType};
pub use enabled_features::EnabledFeatures;
pub use helpers::catch_unwind_result;
pub use jpeg_error::{ExitCode, JpegError};
pub use metrics::{CpuTimeMeasure, Metrics};
pub use structs::exif::{ExifThumbnail, Orientation};
pub use structs::jpeg_decoder::{read_image_info, DecoderState, ImageInfo, JpegDecoder};
pub use structs::jpeg_header::SubsamplingLayout;

use crate::jpeg_error::Result;

static PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

static GIT_VERSION: &str = git_version::git_version!(
    args = ["--abbrev=40", "--always", "--dirty=M"],
    fallback = "0"
);

/// Returns the git version used to build this libary as a static string.
pub fn get_git_version() -> &'static str {
    GIT_VERSION
}

/// Returns the version string of the library, which includes the package version and the git version.
pub fn get_version_string() -> String {
    format!("{}-{}", PACKAGE_VERSION, get_git_version())
}

/// Decodes the JPEG read from `reader` into `dest` and returns the description of the decoded
/// image. `dest` must be large enough for the output geometry, see `ImageInfo::output_size`
/// and `read_image_info`.
pub fn decode_jpeg<R: Read + Seek>(
    reader: &mut R,
    dest: &mut [u8],
    options: DecodeOptions,
    enabled_features: &EnabledFeatures,
) -> Result<ImageInfo> {
    decode_jpeg_with_metrics(reader, dest, options, enabled_features).map(|(info, _)| info)
}

/// Same as `decode_jpeg`, but also returns the counters collected during the decode.
pub fn decode_jpeg_with_metrics<R: Read + Seek>(
    reader: &mut R,
    dest: &mut [u8],
    options: DecodeOptions,
    enabled_features: &EnabledFeatures,
) -> Result<(ImageInfo, Metrics)> {
    let mut decoder = JpegDecoder::new(reader, options, enabled_features.clone());

    let info = decoder.read_header()?;
    decoder.build_tables()?;
    decoder.decode_into(dest)?;

    Ok((info, decoder.metrics().clone()))
}
