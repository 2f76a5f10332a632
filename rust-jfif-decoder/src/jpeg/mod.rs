mod color;
mod header;
mod huffman;
mod idct;
mod jpeg_core;
mod jpeg_reader;
mod quantization;

pub use header::{Component, ComponentId, Frame, HeaderInfo};

use crate::{
    error::Result,
    image::{Bitmap, ImageDecoder},
};

/// Contains JPEG image data
pub struct JPEGDecoder<'data> {
    image_data: &'data [u8],
}

impl<'data> JPEGDecoder<'data> {
    /// Parses everything up to and including the start of scan header without decoding any
    /// pixels.
    pub fn read_header(&self) -> Result<HeaderInfo<'data>> {
        HeaderInfo::read_header_info(self.image_data)
    }
}

impl<'data> ImageDecoder<'data> for JPEGDecoder<'data> {
    /// Initializes the JPEG decoder from a byte slice
    fn new(image_data: &'data [u8]) -> Self {
        Self { image_data }
    }

    fn decode(&self) -> Result<Bitmap> {
        let header = self.read_header()?;
        jpeg_core::JPEGDecoder::new(header)?.decode()
    }
}
