/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fs::{File, OpenOptions};
use std::io::{stdout, Cursor, IsTerminal, Read, Write};
use std::time::Duration;

use baseline_jpeg::{
    catch_unwind_result, get_version_string, read_image_info, CpuTimeMeasure, DecodeFlags,
    DecodeOptions, EnabledFeatures, ExitCode, ImageInfo, JpegDecoder, JpegError, Metrics,
    PixelType,
};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

type Result<T> = std::result::Result<T, JpegError>;

fn err_exit_code<T>(exit_code: ExitCode, message: impl AsRef<str>) -> Result<T> {
    Err(JpegError::new(exit_code, message))
}

fn parse_numeric_parameter(arg: &str, name: &str) -> Result<Option<u32>> {
    match arg.strip_prefix(name) {
        Some(v) => match v.parse::<u32>() {
            Ok(n) => Ok(Some(n)),
            Err(_) => err_exit_code(
                ExitCode::SyntaxError,
                format!("{0} expects a number, got {1}", name, v),
            ),
        },
        None => Ok(None),
    }
}

const USAGE: &str = "usage: baseline_jpeg_util [options] input.jpg output.{pgm,ppm,raw}
  -scale:N                    decode at 1/N size, N is 1, 2, 4 or 8
  -rotate                     apply the EXIF orientation
  -thumbnail                  decode the EXIF thumbnail instead of the image
  -luma                       ignore the chroma components
  -format:rgb565|gray|binary  pixel format of the decoded buffer
  -le                         little endian RGB565 pixels
  -info                       only print what the headers say
  -iter:N                     decode N times, for timing
  -overwrite                  replace an existing output file
  -v                          verbose logging";

// wrap main so that errors get printed nicely without a panic
fn main_with_result() -> Result<()> {
    let mut pargs = pico_args::Arguments::from_env();

    let mut flags = DecodeFlags::empty();
    if pargs.contains("-rotate") {
        flags |= DecodeFlags::AUTO_ROTATE;
    }
    if pargs.contains("-thumbnail") {
        flags |= DecodeFlags::EXIF_THUMBNAIL;
    }
    if pargs.contains("-luma") {
        flags |= DecodeFlags::LUMA_ONLY;
    }
    if pargs.contains("-le") {
        flags |= DecodeFlags::LITTLE_ENDIAN_PIXELS;
    }

    let info_only = pargs.contains("-info");
    let overwrite = pargs.contains("-overwrite");
    let verbose = pargs.contains("-v");

    // only output the log if we are connected to a console (otherwise if there is redirection we would corrupt the file)
    if stdout().is_terminal() {
        let level = if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };

        if let Err(e) = SimpleLogger::new().with_level(level).init() {
            eprintln!("logging unavailable: {0}", e);
        }
    }

    let mut pixel_type = PixelType::Rgb565;
    let mut iterations = 1;
    let mut filenames = Vec::new();

    for arg in pargs.finish() {
        let arg = arg.to_string_lossy().into_owned();

        if !arg.starts_with('-') {
            filenames.push(arg);
        } else if let Some(scale) = parse_numeric_parameter(&arg, "-scale:")? {
            flags |= match scale {
                1 => DecodeFlags::empty(),
                2 => DecodeFlags::SCALE_HALF,
                4 => DecodeFlags::SCALE_QUARTER,
                8 => DecodeFlags::SCALE_EIGHTH,
                _ => {
                    return err_exit_code(
                        ExitCode::SyntaxError,
                        format!("unsupported scale 1/{0}", scale),
                    )
                }
            };
        } else if let Some(n) = parse_numeric_parameter(&arg, "-iter:")? {
            iterations = n.max(1);
        } else if let Some(format) = arg.strip_prefix("-format:") {
            pixel_type = match format {
                "rgb565" => PixelType::Rgb565,
                "gray" => PixelType::Grayscale,
                "binary" => PixelType::Binary,
                _ => {
                    return err_exit_code(
                        ExitCode::SyntaxError,
                        format!("unknown pixel format {0}", format),
                    )
                }
            };
        } else {
            return err_exit_code(
                ExitCode::SyntaxError,
                format!("unknown switch {0}\n{1}", arg, USAGE),
            );
        }
    }

    let expected_files = if info_only { 1 } else { 2 };
    if filenames.len() != expected_files {
        return err_exit_code(ExitCode::SyntaxError, USAGE);
    }

    info!("baseline_jpeg {0}", get_version_string());

    let mut input_data = Vec::new();
    File::open(&filenames[0])
        .map_err(|e| JpegError::new(ExitCode::FileNotFound, e.to_string()))?
        .read_to_end(&mut input_data)?;

    let enabled_features = EnabledFeatures::default();

    if info_only {
        let image_info = read_image_info(&mut &input_data[..], &enabled_features)?;
        print_image_info(&image_info);
        return Ok(());
    }

    let options = DecodeOptions::new(flags, pixel_type);

    // the decoded image may be the thumbnail, which has its own geometry
    let mut output_data = Vec::new();
    let mut image_info = None;
    let mut overall_cpu = Duration::ZERO;
    let mut overall_metrics = Metrics::default();

    for _ in 0..iterations {
        let thread_cpu = CpuTimeMeasure::new();

        let (decoded_info, metrics) = catch_unwind_result(|| {
            let mut decoder = JpegDecoder::new(
                Cursor::new(&input_data[..]),
                options,
                enabled_features.clone(),
            );

            let decoded_info = decoder.read_header()?;
            decoder.build_tables()?;

            let mut dest = vec![0u8; decoded_info.required_buffer_size(&options)?];
            decoder.decode_into(&mut dest)?;

            output_data = dest;
            Ok((decoded_info, decoder.metrics().clone()))
        })?;

        let iter_duration = thread_cpu.elapsed();
        info!(
            "decoded {0} MCUs, {1} blocks ({2} DC only), {3} restarts, {4} bytes in {5}ms",
            metrics.mcus(),
            metrics.blocks(),
            metrics.dc_only_blocks(),
            metrics.restart_intervals(),
            metrics.bytes_consumed(),
            iter_duration.as_millis()
        );

        overall_cpu += iter_duration;
        overall_metrics.merge_from(&metrics);
        image_info = Some(decoded_info);
    }

    let Some(image_info) = image_info else {
        return err_exit_code(ExitCode::AssertionFailure, "nothing was decoded");
    };

    let (width, height) = image_info.output_size(&options)?;

    let output_file = &filenames[1];
    let file_data = if output_file.to_lowercase().ends_with(".raw") {
        output_data
    } else {
        to_netpbm(&output_data, width, height, pixel_type, options.little_endian())
    };

    let mut fileout = OpenOptions::new()
        .write(true)
        .create(overwrite)
        .truncate(overwrite)
        .create_new(!overwrite)
        .open(output_file.as_str())?;

    fileout.write_all(&file_data)?;

    if verbose {
        overall_metrics.print_metrics();
    }

    if iterations > 1 {
        info!(
            "Overall average CPU consumed per iteration {0}ms ",
            overall_cpu.as_millis() / u128::from(iterations)
        );
    }

    Ok(())
}

fn print_image_info(image_info: &ImageInfo) {
    println!(
        "{0}x{1}, {2} components, {3:?}",
        image_info.width, image_info.height, image_info.components, image_info.layout
    );
    println!("restart interval: {0}", image_info.restart_interval);
    println!("orientation: {0:?}", image_info.orientation);

    match image_info.thumbnail {
        Some(t) => println!(
            "thumbnail: {0} bytes at offset {1} ({2}x{3})",
            t.length, t.offset, t.width, t.height
        ),
        None => println!("thumbnail: none"),
    }
}

/// Expands the decoded buffer into a PGM (gray and binary) or PPM (RGB565) image.
fn to_netpbm(
    data: &[u8],
    width: u32,
    height: u32,
    pixel_type: PixelType,
    little_endian: bool,
) -> Vec<u8> {
    let stride = pixel_type.row_stride(width);
    let magic = if pixel_type == PixelType::Rgb565 {
        "P6"
    } else {
        "P5"
    };

    let mut out = format!("{0}\n{1} {2}\n255\n", magic, width, height).into_bytes();

    for y in 0..height as usize {
        let row = &data[y * stride..(y + 1) * stride];
        for x in 0..width as usize {
            match pixel_type {
                PixelType::Grayscale => out.push(row[x]),
                PixelType::Binary => {
                    let set = row[x / 8] & (1 << (x % 8)) != 0;
                    out.push(if set { 255 } else { 0 });
                }
                PixelType::Rgb565 => {
                    let bytes = [row[x * 2], row[x * 2 + 1]];
                    let p = if little_endian {
                        u16::from_le_bytes(bytes)
                    } else {
                        u16::from_be_bytes(bytes)
                    };

                    let r = ((p >> 11) & 0x1f) as u8;
                    let g = ((p >> 5) & 0x3f) as u8;
                    let b = (p & 0x1f) as u8;
                    out.extend_from_slice(&[
                        (r << 3) | (r >> 2),
                        (g << 2) | (g >> 4),
                        (b << 3) | (b >> 2),
                    ]);
                }
            }
        }
    }

    out
}

fn main() {
    match main_with_result() {
        Ok(_) => {}
        Err(e) => {
            eprintln!(
                "error code: {0} {1} {2}",
                e.exit_code(),
                e.exit_code().as_integer_error_code(),
                e.message()
            );
            std::process::exit(e.exit_code().as_integer_error_code());
        }
    }
}
