/// Limits and tunables of the decoder that are independent of the requested output.
#[derive(Debug, Clone)]
pub struct EnabledFeatures {
    /// maximum jpeg width
    pub max_jpeg_width: u32,

    /// maximum jpeg height
    pub max_jpeg_height: u32,

    /// size of the chunk read from the byte source on every refill of the
    /// entropy coded data
    pub source_chunk_size: usize,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            max_jpeg_width: 16384,
            max_jpeg_height: 16384,
            source_chunk_size: 2048,
        }
    }
}
