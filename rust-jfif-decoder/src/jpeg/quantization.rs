use crate::error::{Error, Result};

use super::jpeg_reader::JPEGParser;

pub const BLOCK_SIDE: usize = 8;
pub const BLOCK_SIZE: usize = BLOCK_SIDE * BLOCK_SIDE;

/// Highest quantization table id a DQT segment may define
pub const MAX_TABLE_ID: u8 = 3;

/// Raster (row-major) index of each position in zigzag order.
pub const ZIGZAG: [usize; BLOCK_SIZE] = build_zigzag();

const fn build_zigzag() -> [usize; BLOCK_SIZE] {
    let mut table = [0usize; BLOCK_SIZE];
    let (mut row, mut col) = (0usize, 0usize);
    let mut i = 0;
    while i < BLOCK_SIZE {
        table[i] = row * BLOCK_SIDE + col;
        if (row + col) % 2 == 0 {
            // Up and to the right
            if col == BLOCK_SIDE - 1 {
                row += 1;
            } else if row == 0 {
                col += 1;
            } else {
                row -= 1;
                col += 1;
            }
        } else {
            // Down and to the left
            if row == BLOCK_SIDE - 1 {
                col += 1;
            } else if col == 0 {
                row += 1;
            } else {
                row += 1;
                col -= 1;
            }
        }
        i += 1;
    }
    table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Bits8,
    Bits16,
}

/// Defines a JPEG quantization table. Values are kept in zigzag order, the order they are
/// stored in and the order coefficients are decoded in.
#[derive(Debug, Clone)]
pub struct QuantizationTable {
    pub precision: Precision,
    pub destination_id: u8,
    pub values: [u16; BLOCK_SIZE],
}

impl QuantizationTable {
    /// Reads a single table definition from a DQT segment.
    pub fn read(reader: &mut JPEGParser) -> Result<Self> {
        let (precision, destination_id) = reader.read_nibbles()?;
        if destination_id > MAX_TABLE_ID {
            return Err(Error::Malformed("Quantization table id out of range"));
        }
        let precision = match precision {
            0 => Precision::Bits8,
            1 => Precision::Bits16,
            _ => return Err(Error::Malformed("Invalid precision value")),
        };

        let mut values = [0u16; BLOCK_SIZE];
        for value in values.iter_mut() {
            *value = match precision {
                Precision::Bits8 => reader.read_next_byte()? as u16,
                Precision::Bits16 => reader.read_next_word()?,
            }
        }

        Ok(Self {
            precision,
            destination_id,
            values,
        })
    }

    /// Multiplies a block of coefficients in zigzag order by the table and returns it in
    /// natural row-major order.
    pub fn dequantize_and_descan(&self, block: &[i32; BLOCK_SIZE]) -> [i32; BLOCK_SIZE] {
        let mut dequantized = [0i32; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            dequantized[i] = block[i].saturating_mul(self.values[i] as i32);
        }

        let mut raster = [0i32; BLOCK_SIZE];
        for i in 0..BLOCK_SIZE {
            raster[ZIGZAG[i]] = dequantized[i];
        }
        raster
    }
}
