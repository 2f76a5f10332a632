#![warn(missing_docs)]

//! Decodes baseline JFIF images into floating point sample planes and writes them out as BMP or
//! PPM.
mod bitstream;
/// Encoder for BMP images
pub mod bmp;
mod error;
/// Defines types for decoding images
pub mod image;
/// Decoder for JPEG images
pub mod jpeg;
/// Encoder for PPM images
pub mod ppm;

pub use error::{Error, ErrorKind, Result};
