use std::io::Write;

use crate::{
    error::Result,
    image::{Bitmap, ColorModel, ImageEncoder},
};

/// PPM encoder. Writes binary `P6` for color bitmaps and `P5` (PGM) for grayscale ones.
pub struct PPMEncoder<'bitmap> {
    bitmap: &'bitmap Bitmap,
}

impl<'bitmap> ImageEncoder<'bitmap> for PPMEncoder<'bitmap> {
    fn new(bitmap: &'bitmap Bitmap) -> Self {
        Self { bitmap }
    }

    fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let magic = match self.bitmap.color_model {
            ColorModel::Grayscale => "P5",
            ColorModel::Rgb => "P6",
        };
        write!(
            writer,
            "{}\n{} {}\n255\n",
            magic, self.bitmap.cols, self.bitmap.rows
        )?;

        let channels = self.bitmap.color_model.channels();
        let mut row_data = Vec::with_capacity(self.bitmap.cols * channels);
        for y in 0..self.bitmap.rows {
            row_data.clear();
            for x in 0..self.bitmap.cols {
                for channel in 0..channels {
                    row_data.push(self.bitmap.sample_u8(channel, y, x));
                }
            }
            writer.write_all(&row_data)?;
        }
        Ok(())
    }
}
