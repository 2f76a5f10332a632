use std::io::Write;

use std::path::Path;

use crate::error::{Error, Result};

/// Number of sample planes held by a [`Bitmap`]
pub const PLANE_COUNT: usize = 3;

/// How the planes of a [`Bitmap`] are to be interpreted
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ColorModel {
    /// Plane 0 holds luminance, planes 1 and 2 are unused and stay zero
    Grayscale,
    /// Planes hold red, green and blue in that order
    #[default]
    Rgb,
}

impl ColorModel {
    /// The number of planes carrying data
    pub fn channels(&self) -> usize {
        match self {
            ColorModel::Grayscale => 1,
            ColorModel::Rgb => 3,
        }
    }
}

/// Stores a single frame of image data as three floating point planes, row-major, top row first.
/// Samples are not clipped.
#[derive(Debug, Default)]
pub struct Bitmap {
    /// How to interpret the planes
    pub color_model: ColorModel,
    /// Number of rows
    pub rows: usize,
    /// Number of samples per row
    pub cols: usize,
    /// The sample planes, each `rows * cols` long
    pub planes: [Vec<f32>; PLANE_COUNT],
}

impl Bitmap {
    /// Creates a zero-filled bitmap.
    pub fn new(rows: usize, cols: usize, color_model: ColorModel) -> Self {
        Self {
            color_model,
            rows,
            cols,
            planes: std::array::from_fn(|_| vec![0f32; rows * cols]),
        }
    }

    /// Creates a zero-filled bitmap, failing instead of aborting if the planes can't be
    /// allocated.
    pub fn try_new(rows: usize, cols: usize, color_model: ColorModel) -> Result<Self> {
        let too_large = || Error::UnsupportedFeature("Image too large to allocate");
        let samples = rows.checked_mul(cols).ok_or_else(too_large)?;

        let mut planes: [Vec<f32>; PLANE_COUNT] = Default::default();
        for plane in planes.iter_mut() {
            plane
                .try_reserve_exact(samples)
                .map_err(|_| too_large())?;
            plane.resize(samples, 0.0);
        }

        Ok(Self {
            color_model,
            rows,
            cols,
            planes,
        })
    }

    /// Returns the raw sample of a plane at a position.
    pub fn sample(&self, plane: usize, row: usize, col: usize) -> f32 {
        self.planes[plane][row * self.cols + col]
    }

    /// Returns the sample clipped and truncated to 8 bits.
    pub fn sample_u8(&self, plane: usize, row: usize, col: usize) -> u8 {
        clip(self.sample(plane, row, col))
    }

    /// Returns the pixel at a position as 8-bit RGB. Grayscale bitmaps repeat luminance.
    pub fn rgb8(&self, row: usize, col: usize) -> [u8; 3] {
        match self.color_model {
            ColorModel::Grayscale => [self.sample_u8(0, row, col); 3],
            ColorModel::Rgb => [
                self.sample_u8(0, row, col),
                self.sample_u8(1, row, col),
                self.sample_u8(2, row, col),
            ],
        }
    }
}

fn clip(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Used to decode an image. This trait can be implemented for any image format I want to decode.
pub trait ImageDecoder<'data> {
    /// Supplies the decode with the image data
    fn new(image_data: &'data [u8]) -> Self;
    /// Decodes the image
    fn decode(&self) -> Result<Bitmap>;
}

/// Used to encode an image. This trait can be implemented for any image format I want to encode.
pub trait ImageEncoder<'bitmap> {
    /// Supplies the encoder with a raw bitmap to encode.
    fn new(bitmap: &'bitmap Bitmap) -> Self;

    /// Encodes the bitmap into a writer.
    fn encode<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// Encodes the bitmap and saves the result to a file at the given path.
    fn encode_to_file(&self, path: &Path) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.encode(&mut file)?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_are_clipped() {
        let mut bitmap = Bitmap::new(1, 2, ColorModel::Rgb);
        bitmap.planes[0] = vec![-12.5, 300.0];
        bitmap.planes[1] = vec![127.9, 0.0];
        bitmap.planes[2] = vec![255.0, 1.0];
        assert_eq!(bitmap.rgb8(0, 0), [0, 127, 255]);
        assert_eq!(bitmap.rgb8(0, 1), [255, 0, 1]);
    }

    #[test]
    fn fallible_allocation() {
        let bitmap = Bitmap::try_new(2, 3, ColorModel::Rgb).unwrap();
        assert!(bitmap.planes.iter().all(|p| p.len() == 6 && p.iter().all(|s| *s == 0.0)));

        assert!(matches!(
            Bitmap::try_new(usize::MAX, 2, ColorModel::Rgb),
            Err(Error::UnsupportedFeature(_))
        ));
        assert!(Bitmap::try_new(usize::MAX / 2, 1, ColorModel::Rgb).is_err());
    }

    #[test]
    fn grayscale_repeats_luminance() {
        let mut bitmap = Bitmap::new(1, 1, ColorModel::Grayscale);
        bitmap.planes[0][0] = 42.0;
        assert_eq!(bitmap.rgb8(0, 0), [42, 42, 42]);
        assert_eq!(bitmap.color_model.channels(), 1);
    }
}
