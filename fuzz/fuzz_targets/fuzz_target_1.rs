#![no_main]

use std::io::Cursor;

use baseline_jpeg::{
    decode_jpeg, read_image_info, DecodeFlags, DecodeOptions, EnabledFeatures, PixelType,
};

use libfuzzer_sys::fuzz_target;

const GUARD: u8 = 0xa5;

fuzz_target!(|data: &[u8]| {
    // first byte picks the options, the rest is the stream
    let Some((&selector, data)) = data.split_first() else {
        return;
    };

    let flags = DecodeFlags::from_bits_truncate(u32::from(selector & 0x7f));
    let pixel_type = match selector >> 7 {
        0 => PixelType::Rgb565,
        _ => PixelType::Grayscale,
    };
    let options = DecodeOptions::new(flags - DecodeFlags::EXIF_THUMBNAIL, pixel_type);

    let features = EnabledFeatures::default();

    let Ok(info) = read_image_info(&mut &data[..], &features) else {
        return;
    };
    let Ok(size) = info.required_buffer_size(&options) else {
        return;
    };
    if size > 1 << 24 {
        return;
    }

    let mut dest = vec![GUARD; size + 16];
    let _ = decode_jpeg(&mut Cursor::new(data), &mut dest, options, &features);

    assert!(dest[size..].iter().all(|&b| b == GUARD));
});
