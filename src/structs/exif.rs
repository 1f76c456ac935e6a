/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::consts::EXIF_SIGNATURE;

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_HEIGHT: u16 = 257;
const TAG_ORIENTATION: u16 = 274;
const TAG_THUMBNAIL_OFFSET: u16 = 513;
const TAG_THUMBNAIL_LENGTH: u16 = 514;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

/// EXIF orientation tag. The name describes where the first row and column of the stored
/// image end up when it is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    TopLeft = 1,
    TopRight = 2,
    BottomRight = 3,
    BottomLeft = 4,
    LeftTop = 5,
    RightTop = 6,
    RightBottom = 7,
    LeftBottom = 8,
}

impl Orientation {
    pub fn from_tag(v: u16) -> Option<Self> {
        Some(match v {
            1 => Orientation::TopLeft,
            2 => Orientation::TopRight,
            3 => Orientation::BottomRight,
            4 => Orientation::BottomLeft,
            5 => Orientation::LeftTop,
            6 => Orientation::RightTop,
            7 => Orientation::RightBottom,
            8 => Orientation::LeftBottom,
            _ => return None,
        })
    }

    /// true for the orientations that exchange width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::LeftTop
                | Orientation::RightTop
                | Orientation::RightBottom
                | Orientation::LeftBottom
        )
    }

    /// Maps a pixel of the `width` x `height` stored image to its displayed position.
    #[inline(always)]
    pub fn map(self, x: u32, y: u32, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::TopLeft => (x, y),
            Orientation::TopRight => (width - 1 - x, y),
            Orientation::BottomRight => (width - 1 - x, height - 1 - y),
            Orientation::BottomLeft => (x, height - 1 - y),
            Orientation::LeftTop => (y, x),
            Orientation::RightTop => (height - 1 - y, x),
            Orientation::RightBottom => (height - 1 - y, width - 1 - x),
            Orientation::LeftBottom => (y, width - 1 - x),
        }
    }
}

/// Embedded JPEG thumbnail found in IFD1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExifThumbnail {
    /// offset of the thumbnail SOI from the start of the JPEG stream
    pub offset: u64,
    pub length: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifInfo {
    pub orientation: Orientation,
    pub thumbnail: Option<ExifThumbnail>,
}

impl ExifInfo {
    /// Parses the payload of an APP1 segment. `segment_offset` is the position of the payload
    /// in the JPEG stream, used to turn the thumbnail offset into a stream position.
    ///
    /// Returns None if the segment isn't EXIF. Broken EXIF data is logged and whatever was
    /// read before the problem is kept.
    pub fn parse(payload: &[u8], segment_offset: u64) -> Option<ExifInfo> {
        if !payload.starts_with(&EXIF_SIGNATURE) {
            return None;
        }

        let tiff = &payload[EXIF_SIGNATURE.len()..];
        let tiff_offset = segment_offset + EXIF_SIGNATURE.len() as u64;

        let info = match tiff.get(0..2) {
            Some(b"II") => parse_tiff::<LittleEndian>(tiff, tiff_offset),
            Some(b"MM") => parse_tiff::<BigEndian>(tiff, tiff_offset),
            _ => {
                warn!("EXIF data has an unknown byte order, ignored");
                ExifInfo::default()
            }
        };

        debug!("exif: {0:?}", info);
        Some(info)
    }
}

struct IfdEntry {
    tag: u16,
    field_type: u16,
    value: u32,
}

/// Reads the entries of the IFD at `offset`, returns them and the offset of the next IFD.
fn read_ifd<B: ByteOrder>(tiff: &[u8], offset: usize) -> Option<(Vec<IfdEntry>, usize)> {
    let count = usize::from(B::read_u16(tiff.get(offset..offset + 2)?));

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let e = offset + 2 + i * 12;
        let raw = tiff.get(e..e + 12)?;

        let field_type = B::read_u16(&raw[2..4]);
        let value = match field_type {
            TYPE_SHORT => u32::from(B::read_u16(&raw[8..10])),
            _ => B::read_u32(&raw[8..12]),
        };

        entries.push(IfdEntry {
            tag: B::read_u16(&raw[0..2]),
            field_type,
            value,
        });
    }

    let next = offset + 2 + count * 12;
    let next_ifd = tiff.get(next..next + 4).map_or(0, B::read_u32) as usize;

    Some((entries, next_ifd))
}

fn parse_tiff<B: ByteOrder>(tiff: &[u8], tiff_offset: u64) -> ExifInfo {
    let mut info = ExifInfo::default();

    if tiff.len() < 8 || B::read_u16(&tiff[2..4]) != 42 {
        warn!("EXIF TIFF header is invalid, ignored");
        return info;
    }

    let ifd0 = B::read_u32(&tiff[4..8]) as usize;
    let Some((entries, ifd1)) = read_ifd::<B>(tiff, ifd0) else {
        warn!("EXIF IFD0 is truncated, ignored");
        return info;
    };

    for e in entries.iter() {
        if e.tag == TAG_ORIENTATION && e.field_type == TYPE_SHORT {
            match Orientation::from_tag(e.value as u16) {
                Some(o) => info.orientation = o,
                None => warn!("invalid EXIF orientation {0}, ignored", e.value),
            }
        }
    }

    if ifd1 == 0 {
        return info;
    }

    let Some((entries, _)) = read_ifd::<B>(tiff, ifd1) else {
        warn!("EXIF IFD1 is truncated, ignored");
        return info;
    };

    let mut offset = None;
    let mut length = 0;
    let mut width = 0;
    let mut height = 0;

    for e in entries.iter() {
        let is_int = e.field_type == TYPE_SHORT || e.field_type == TYPE_LONG;
        match e.tag {
            TAG_THUMBNAIL_OFFSET if is_int => offset = Some(e.value),
            TAG_THUMBNAIL_LENGTH if is_int => length = e.value,
            TAG_IMAGE_WIDTH if is_int => width = e.value,
            TAG_IMAGE_HEIGHT if is_int => height = e.value,
            _ => {}
        }
    }

    if let Some(offset) = offset {
        info.thumbnail = Some(ExifThumbnail {
            offset: tiff_offset + u64::from(offset),
            length,
            width,
            height,
        });
    }

    info
}

/// builds a big or little endian EXIF payload with the given IFD0 orientation and
/// an optional IFD1 pointing at a thumbnail
#[cfg(test)]
pub fn build_exif_payload<B: ByteOrder>(orientation: u16, thumbnail: Option<(u32, u32)>) -> Vec<u8> {
    let mut v = EXIF_SIGNATURE.to_vec();

    let mut tiff = vec![0u8; 8];
    tiff[0..2].copy_from_slice(if B::read_u16(&[1, 0]) == 1 { b"II" } else { b"MM" });
    B::write_u16(&mut tiff[2..4], 42);
    B::write_u32(&mut tiff[4..8], 8);

    let push_entry = |tiff: &mut Vec<u8>, tag: u16, field_type: u16, value: u32| {
        let mut e = [0u8; 12];
        B::write_u16(&mut e[0..2], tag);
        B::write_u16(&mut e[2..4], field_type);
        B::write_u32(&mut e[4..8], 1);
        if field_type == TYPE_SHORT {
            B::write_u16(&mut e[8..10], value as u16);
        } else {
            B::write_u32(&mut e[8..12], value);
        }
        tiff.extend_from_slice(&e);
    };

    // IFD0 with one entry
    let mut count = [0u8; 2];
    B::write_u16(&mut count, 1);
    tiff.extend_from_slice(&count);
    push_entry(&mut tiff, TAG_ORIENTATION, TYPE_SHORT, u32::from(orientation));

    let ifd1 = tiff.len() as u32 + 4;
    let mut next = [0u8; 4];
    B::write_u32(&mut next, if thumbnail.is_some() { ifd1 } else { 0 });
    tiff.extend_from_slice(&next);

    if let Some((offset, length)) = thumbnail {
        B::write_u16(&mut count, 2);
        tiff.extend_from_slice(&count);
        push_entry(&mut tiff, TAG_THUMBNAIL_OFFSET, TYPE_LONG, offset);
        push_entry(&mut tiff, TAG_THUMBNAIL_LENGTH, TYPE_LONG, length);
        tiff.extend_from_slice(&[0; 4]);
    }

    v.extend_from_slice(&tiff);
    v
}

#[test]
fn parse_orientation_both_byte_orders() {
    let le = build_exif_payload::<LittleEndian>(6, None);
    assert_eq!(&le[6..8], b"II");
    let info = ExifInfo::parse(&le, 20).unwrap();
    assert_eq!(info.orientation, Orientation::RightTop);
    assert_eq!(info.thumbnail, None);

    let be = build_exif_payload::<BigEndian>(3, None);
    assert_eq!(&be[6..8], b"MM");
    let info = ExifInfo::parse(&be, 20).unwrap();
    assert_eq!(info.orientation, Orientation::BottomRight);
}

#[test]
fn parse_thumbnail_offset() {
    let p = build_exif_payload::<BigEndian>(1, Some((100, 2000)));
    let info = ExifInfo::parse(&p, 20).unwrap();
    let t = info.thumbnail.unwrap();

    // relative to the TIFF header which starts after the 6 byte signature
    assert_eq!(t.offset, 20 + 6 + 100);
    assert_eq!(t.length, 2000);
}

#[test]
fn broken_exif_is_tolerated() {
    assert_eq!(ExifInfo::parse(b"JFIF\0", 0), None);

    let mut p = build_exif_payload::<LittleEndian>(8, None);
    p.truncate(20);
    assert_eq!(ExifInfo::parse(&p, 0), Some(ExifInfo::default()));

    // out of range orientation keeps the default
    let p = build_exif_payload::<LittleEndian>(9, None);
    assert_eq!(ExifInfo::parse(&p, 0).unwrap().orientation, Orientation::TopLeft);
}

#[test]
fn orientation_mapping_is_a_permutation() {
    let (w, h) = (5u32, 3u32);
    for tag in 1..=8 {
        let o = Orientation::from_tag(tag).unwrap();
        let (ow, oh) = if o.swaps_dimensions() { (h, w) } else { (w, h) };

        let mut seen = vec![false; (ow * oh) as usize];
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = o.map(x, y, w, h);
                assert!(dx < ow && dy < oh, "tag {0}", tag);
                assert!(!seen[(dy * ow + dx) as usize]);
                seen[(dy * ow + dx) as usize] = true;
            }
        }
    }

    assert_eq!(Orientation::RightTop.map(0, 0, 5, 3), (2, 0));
}
