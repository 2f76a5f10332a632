use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::{
    error::{Error, Result},
    image::{Bitmap, ImageEncoder},
};

const FILE_HEADER_SIZE: u32 = 14;
const DIB_HEADER_SIZE: u32 = 40;
const BYTES_PER_PIXEL: u32 = 3;
/// 72 DPI
const PIXELS_PER_METER: i32 = 2835;

/// Header fields that depend on the bitmap size
struct Layout {
    width: i32,
    height: i32,
    row_padding: u32,
    pixel_array_size: u32,
}

impl Layout {
    fn of(bitmap: &Bitmap) -> Result<Self> {
        let width = i32::try_from(bitmap.cols)
            .map_err(|_| Error::UnsupportedFeature("Image too wide for a BMP file"))?;
        let height = i32::try_from(bitmap.rows)
            .map_err(|_| Error::UnsupportedFeature("Image too tall for a BMP file"))?;

        let too_large = Error::UnsupportedFeature("Image too large for a BMP file");
        let row_size = (width as u32)
            .checked_mul(BYTES_PER_PIXEL)
            .ok_or(Error::UnsupportedFeature("Image too wide for a BMP file"))?;
        let row_padding = (4 - row_size % 4) % 4;
        let pixel_array_size = row_size
            .checked_add(row_padding)
            .and_then(|padded| padded.checked_mul(height as u32))
            .filter(|size| size.checked_add(FILE_HEADER_SIZE + DIB_HEADER_SIZE).is_some())
            .ok_or(too_large)?;

        Ok(Self {
            width,
            height,
            row_padding,
            pixel_array_size,
        })
    }
}

/// Encoder for 24-bit uncompressed BMP files. Rows are written bottom-up in BGR order.
pub struct BMPEncoder<'bitmap> {
    bitmap: &'bitmap Bitmap,
}

impl<'bitmap> ImageEncoder<'bitmap> for BMPEncoder<'bitmap> {
    fn new(bitmap: &'bitmap Bitmap) -> Self {
        Self { bitmap }
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let layout = Layout::of(self.bitmap)?;
        let pixel_offset = FILE_HEADER_SIZE + DIB_HEADER_SIZE;

        // File header
        writer.write_all(b"BM")?;
        writer.write_u32::<LittleEndian>(pixel_offset + layout.pixel_array_size)?;
        writer.write_u32::<LittleEndian>(0)?; // Reserved
        writer.write_u32::<LittleEndian>(pixel_offset)?;

        // BITMAPINFOHEADER
        writer.write_u32::<LittleEndian>(DIB_HEADER_SIZE)?;
        writer.write_i32::<LittleEndian>(layout.width)?;
        writer.write_i32::<LittleEndian>(layout.height)?;
        writer.write_u16::<LittleEndian>(1)?; // Color planes
        writer.write_u16::<LittleEndian>(8 * BYTES_PER_PIXEL as u16)?;
        writer.write_u32::<LittleEndian>(0)?; // BI_RGB
        writer.write_u32::<LittleEndian>(layout.pixel_array_size)?;
        writer.write_i32::<LittleEndian>(PIXELS_PER_METER)?;
        writer.write_i32::<LittleEndian>(PIXELS_PER_METER)?;
        writer.write_u32::<LittleEndian>(0)?; // Palette size
        writer.write_u32::<LittleEndian>(0)?; // Important colors

        let padding = [0u8; 3];
        let mut row_data = Vec::with_capacity(self.bitmap.cols * BYTES_PER_PIXEL as usize);
        for y in (0..self.bitmap.rows).rev() {
            row_data.clear();
            for x in 0..self.bitmap.cols {
                let [red, green, blue] = self.bitmap.rgb8(y, x);
                row_data.extend_from_slice(&[blue, green, red]);
            }
            writer.write_all(&row_data)?;
            writer.write_all(&padding[..layout.row_padding as usize])?;
        }
        Ok(())
    }
}
