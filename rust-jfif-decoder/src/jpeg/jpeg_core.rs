use log::{debug, info};

use crate::{
    bitstream::{BitReader, StreamState},
    error::{Error, Result},
    image::{Bitmap, ColorModel},
};

use super::{
    color::contribution,
    header::{Component, Frame, HeaderInfo, TableSet},
    huffman::{HuffmanTable, HuffmanTableType, END_OF_BLOCK},
    idct::inverse_dct,
    quantization::{BLOCK_SIDE, BLOCK_SIZE},
};

/// Largest DC difference category a baseline Huffman table may produce
const MAX_DC_LENGTH: u8 = 11;

/// Fewest bits a block can be coded in: a DC code and an end of block code
const MIN_BLOCK_BITS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Decoding,
    /// The next MCU starts a new restart interval
    RestartPending,
    Done,
}

/// Running DC coefficient of each frame component, in frame order.
#[derive(Debug)]
struct DcPredictors(Vec<i32>);

impl DcPredictors {
    fn new(component_count: usize) -> Self {
        Self(vec![0; component_count])
    }

    fn get_mut(&mut self, component_index: usize) -> &mut i32 {
        &mut self.0[component_index]
    }

    /// Happens at the start of every restart interval
    fn reset(&mut self) {
        self.0.iter_mut().for_each(|prediction| *prediction = 0);
    }
}

pub struct JPEGDecoder<'data> {
    frame: Frame,
    tables: TableSet,
    restart_interval: u16,
    reader: BitReader<'data>,
    dc_predictions: DcPredictors,
    bitmap: Bitmap,
}

impl<'data> JPEGDecoder<'data> {
    /// Sets up the pixel planes for the frame. Fails before allocating if the scan is too short
    /// to hold every block of the frame.
    pub fn new(header: HeaderInfo<'data>) -> Result<Self> {
        let HeaderInfo {
            frame,
            scan_info,
            tables,
            restart_interval,
        } = header;

        let min_bytes = minimum_scan_bits(&frame).div_ceil(8);
        if (scan_info.reader.byte_len() as u64) < min_bytes {
            debug!(
                "Scan holds {} bytes, the frame needs at least {}",
                scan_info.reader.byte_len(),
                min_bytes
            );
            return Err(Error::StreamExhausted);
        }

        let color_model = if frame.components.len() == 1 {
            ColorModel::Grayscale
        } else {
            ColorModel::Rgb
        };
        let bitmap = Bitmap::try_new(
            frame.lines as usize,
            frame.samples_per_line as usize,
            color_model,
        )?;

        Ok(Self {
            dc_predictions: DcPredictors::new(frame.components.len()),
            frame,
            tables,
            restart_interval,
            reader: scan_info.reader,
            bitmap,
        })
    }

    /// Decodes MCUs until the end of image marker.
    pub fn decode(mut self) -> Result<Bitmap> {
        let (mcu_width, mcu_height) = self.frame.mcu_size();
        let (mut row, mut col) = (0usize, 0usize);
        let mut mcus_read = 0usize;
        let mut state = DecodeState::Decoding;

        loop {
            state = match state {
                DecodeState::Decoding => {
                    self.decode_mcu(row, col)?;

                    col += mcu_width;
                    if col >= self.bitmap.cols {
                        col = 0;
                        row += mcu_height;
                    }
                    mcus_read += 1;

                    match self.reader.state() {
                        StreamState::OutOfData => return Err(Error::StreamExhausted),
                        StreamState::EndOfImage => DecodeState::Done,
                        StreamState::MoreData
                            if self.restart_interval != 0
                                && mcus_read % self.restart_interval as usize == 0 =>
                        {
                            DecodeState::RestartPending
                        }
                        StreamState::MoreData => DecodeState::Decoding,
                    }
                }
                DecodeState::RestartPending => {
                    debug!("Restart marker after {} MCUs", mcus_read);
                    self.dc_predictions.reset();
                    self.reader.restart()?;
                    DecodeState::Decoding
                }
                DecodeState::Done => break,
            };
        }

        info!(
            "Decoded {}x{} image from {} MCUs",
            self.bitmap.cols, self.bitmap.rows, mcus_read
        );
        Ok(self.bitmap)
    }

    /// Decodes one MCU whose top left pixel is at `row`, `col` and adds it to the bitmap.
    fn decode_mcu(&mut self, row: usize, col: usize) -> Result<()> {
        let Self {
            frame,
            tables,
            reader,
            dc_predictions,
            bitmap,
            ..
        } = self;
        let max_sampling_factor = frame.max_sampling_factor();

        for (index, component) in frame.components.iter().enumerate() {
            let dc_table = tables.huffman_table(HuffmanTableType::Dc, component.dc_table)?;
            let ac_table = tables.huffman_table(HuffmanTableType::Ac, component.ac_table)?;
            let qtable = tables.quantization_table(component.qtable_id)?;

            for v in 0..component.xy_sampling_factor.1 {
                for h in 0..component.xy_sampling_factor.0 {
                    let coefficients =
                        decode_block(reader, dc_table, ac_table, dc_predictions.get_mut(index))?;
                    let pixels = inverse_dct(&qtable.dequantize_and_descan(&coefficients));

                    let placement =
                        BlockPlacement::new(component, max_sampling_factor, row, col, h, v);
                    placement.accumulate(&pixels, component, bitmap);
                }
            }
        }
        Ok(())
    }
}

/// Lower bound on the size of the entropy-coded data of a frame.
fn minimum_scan_bits(frame: &Frame) -> u64 {
    let (mcu_width, mcu_height) = frame.mcu_size();
    let mcu_columns = (frame.samples_per_line as u64).div_ceil(mcu_width as u64);
    let mcu_rows = (frame.lines as u64).div_ceil(mcu_height as u64);
    let blocks_per_mcu: u64 = frame
        .components
        .iter()
        .map(|c| c.xy_sampling_factor.0 as u64 * c.xy_sampling_factor.1 as u64)
        .sum();
    mcu_columns * mcu_rows * blocks_per_mcu * MIN_BLOCK_BITS
}

/// Reads one block of coefficients in zigzag order.
///
/// <https://www.w3.org/Graphics/JPEG/itu-t81.pdf> F.2.2
fn decode_block(
    reader: &mut BitReader,
    dc_table: &HuffmanTable,
    ac_table: &HuffmanTable,
    dc_prediction: &mut i32,
) -> Result<[i32; BLOCK_SIZE]> {
    let mut coefficients = [0i32; BLOCK_SIZE];

    let dc_length = dc_table.decode(reader)?;
    if dc_length > MAX_DC_LENGTH {
        return Err(Error::Decode("DC difference category out of range"));
    }
    let diff = receive_extend(reader, dc_length)?;
    *dc_prediction = dc_prediction.saturating_add(diff);
    coefficients[0] = *dc_prediction;

    let mut k = 1;
    while k < BLOCK_SIZE {
        let symbol = ac_table.decode(reader)?;
        if symbol == END_OF_BLOCK {
            // The rest of the block stays zero
            break;
        }

        let run_length = (symbol >> 4) as usize;
        let code_length = symbol & 0x0F;
        k += run_length;
        if k >= BLOCK_SIZE {
            return Err(Error::Decode("Run length exceeds the end of the block"));
        }

        coefficients[k] = receive_extend(reader, code_length)?;
        k += 1;
    }

    Ok(coefficients)
}

/// RECEIVE and EXTEND: reads `length` bits and maps them onto a signed value. A leading 0 bit
/// means the value is negative.
fn receive_extend(reader: &mut BitReader, length: u8) -> Result<i32> {
    if length == 0 {
        return Ok(0);
    }

    let value = reader.read_bits(length)? as i32;
    if value < (1 << (length - 1)) {
        Ok(value - (1 << length) + 1)
    } else {
        Ok(value)
    }
}

/// Where a decoded block lands in the bitmap once stretched to the MCU's resolution.
struct BlockPlacement {
    origin: (usize, usize),
    /// Size of the stretched block, rows then columns
    extent: (usize, usize),
    sampling_factor: (usize, usize),
    max_sampling_factor: (usize, usize),
}

impl BlockPlacement {
    fn new(
        component: &Component,
        max_sampling_factor: (u8, u8),
        row: usize,
        col: usize,
        h: u8,
        v: u8,
    ) -> Self {
        let sampling_factor = (
            component.xy_sampling_factor.0 as usize,
            component.xy_sampling_factor.1 as usize,
        );
        let max_sampling_factor = (max_sampling_factor.0 as usize, max_sampling_factor.1 as usize);
        let extent = (
            BLOCK_SIDE * max_sampling_factor.1 / sampling_factor.1,
            BLOCK_SIDE * max_sampling_factor.0 / sampling_factor.0,
        );

        Self {
            origin: (row + v as usize * extent.0, col + h as usize * extent.1),
            extent,
            sampling_factor,
            max_sampling_factor,
        }
    }

    /// Adds the contribution of every covered pixel to the bitmap, dropping whatever falls
    /// outside the image.
    fn accumulate(&self, pixels: &[f32; BLOCK_SIZE], component: &Component, bitmap: &mut Bitmap) {
        let color_model = bitmap.color_model;
        for n in 0..self.extent.0 {
            let out_row = self.origin.0 + n;
            if out_row >= bitmap.rows {
                break;
            }
            let source_row = n * self.sampling_factor.1 / self.max_sampling_factor.1;

            for m in 0..self.extent.1 {
                let out_col = self.origin.1 + m;
                if out_col >= bitmap.cols {
                    break;
                }
                let source_col = m * self.sampling_factor.0 / self.max_sampling_factor.0;

                let sample = pixels[source_row * BLOCK_SIDE + source_col];
                let index = out_row * bitmap.cols + out_col;
                for channel in 0..color_model.channels() {
                    bitmap.planes[channel][index] +=
                        contribution(color_model, channel, component.kind, sample);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::{header::ComponentId, huffman::MAX_CODE_LENGTH, jpeg_reader::JPEGParser};

    fn table(class: u8, lengths: &[(usize, u8)], symbols: &[u8]) -> HuffmanTable {
        let mut counts = [0u8; MAX_CODE_LENGTH];
        for (length, count) in lengths {
            counts[length - 1] = *count;
        }
        let mut data = vec![class << 4];
        data.extend(counts);
        data.extend_from_slice(symbols);
        HuffmanTable::read(&mut JPEGParser::new(&data)).unwrap()
    }

    #[test]
    fn extend_sign() {
        // 0 | 1 | 10 | 010 | 11
        let data = [0b0110_0101, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        assert_eq!(receive_extend(&mut reader, 1).unwrap(), -1);
        assert_eq!(receive_extend(&mut reader, 1).unwrap(), 1);
        assert_eq!(receive_extend(&mut reader, 2).unwrap(), 2);
        assert_eq!(receive_extend(&mut reader, 3).unwrap(), -5);
        assert_eq!(receive_extend(&mut reader, 0).unwrap(), 0);
        assert_eq!(receive_extend(&mut reader, 2).unwrap(), 3);
    }

    #[test]
    fn decodes_block_with_runs() {
        // DC: 0 -> 0, 10 -> 2. AC: 0 -> EOB, 10 -> 0x01, 110 -> 0x12
        let dc = table(0, &[(1, 1), (2, 1)], &[0x00, 0x02]);
        let ac = table(1, &[(1, 1), (2, 1), (3, 1)], &[0x00, 0x01, 0x12]);

        // DC 10+11, AC 10+0, AC 110+01, EOB 0, padding
        let data = [0b1011_1001, 0b1001_0111];
        let mut reader = BitReader::new(&data);
        let mut prediction = 5;
        let block = decode_block(&mut reader, &dc, &ac, &mut prediction).unwrap();

        assert_eq!(prediction, 8);
        assert_eq!(block[0], 8);
        assert_eq!(block[1], -1);
        assert_eq!(block[2], 0);
        assert_eq!(block[3], -2);
        assert!(block[4..].iter().all(|c| *c == 0));
    }

    #[test]
    fn rejects_run_past_block_end() {
        let dc = table(0, &[(1, 1)], &[0x00]);
        let ac = table(1, &[(1, 1), (2, 1)], &[0xF0, 0x00]);
        let data = [0x00, 0x00];
        let mut prediction = 0;
        assert!(matches!(
            decode_block(&mut BitReader::new(&data), &dc, &ac, &mut prediction),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn rejects_oversized_dc_category() {
        let dc = table(0, &[(1, 1)], &[12]);
        let ac = table(1, &[(1, 1)], &[0x00]);
        let data = [0x00, 0x00, 0x00];
        let mut prediction = 0;
        assert!(decode_block(&mut BitReader::new(&data), &dc, &ac, &mut prediction).is_err());
    }

    #[test]
    fn full_block_needs_no_end_of_block() {
        let dc = table(0, &[(1, 1)], &[0x00]);
        let ac = table(1, &[(1, 1)], &[0x01]);
        // DC 0, then 63 times AC 0 + value bit 1
        let mut bits = vec![0u8];
        for _ in 0..63 {
            bits.extend([0, 1]);
        }
        let mut data = vec![];
        for chunk in bits.chunks(8) {
            let mut byte = 0xFFu8;
            for (i, bit) in chunk.iter().enumerate() {
                if *bit == 0 {
                    byte &= !(0x80 >> i);
                }
            }
            data.push(byte);
        }

        let mut prediction = 0;
        let block = decode_block(&mut BitReader::new(&data), &dc, &ac, &mut prediction).unwrap();
        assert_eq!(block[0], 0);
        assert!(block[1..].iter().all(|c| *c == 1));
    }

    #[test]
    fn predictors_reset_together() {
        let mut predictors = DcPredictors::new(3);
        *predictors.get_mut(0) = 4;
        *predictors.get_mut(2) = -7;
        predictors.reset();
        assert_eq!(predictors.0, vec![0, 0, 0]);
    }

    #[test]
    fn chroma_is_stretched_over_the_mcu() {
        let component = Component {
            identifier: 2,
            kind: ComponentId::Cb,
            xy_sampling_factor: (1, 1),
            qtable_id: 0,
            dc_table: 0,
            ac_table: 0,
        };
        let mut pixels = [0f32; BLOCK_SIZE];
        pixels[0] = 10.0;
        pixels[1] = 20.0;
        pixels[BLOCK_SIDE] = 30.0;

        let mut bitmap = Bitmap::new(16, 16, ColorModel::Rgb);
        let placement = BlockPlacement::new(&component, (2, 2), 0, 0, 0, 0);
        assert_eq!(placement.extent, (16, 16));
        placement.accumulate(&pixels, &component, &mut bitmap);

        let blue = |row: usize, col: usize| bitmap.sample(2, row, col);
        let expected = |v: f32| (v - 128.0) * 1.772;
        assert_eq!(blue(0, 0), expected(10.0));
        assert_eq!(blue(1, 1), expected(10.0));
        assert_eq!(blue(0, 2), expected(20.0));
        assert_eq!(blue(1, 3), expected(20.0));
        assert_eq!(blue(2, 0), expected(30.0));
        assert_eq!(blue(15, 15), expected(0.0));
    }

    #[test]
    fn horizontal_subsampling_stretches_columns_only() {
        let component = Component {
            identifier: 2,
            kind: ComponentId::Cb,
            xy_sampling_factor: (1, 1),
            qtable_id: 0,
            dc_table: 0,
            ac_table: 0,
        };
        let mut pixels = [0f32; BLOCK_SIZE];
        pixels[0] = 10.0;
        pixels[1] = 20.0;
        pixels[BLOCK_SIDE] = 30.0;

        let mut bitmap = Bitmap::new(16, 16, ColorModel::Rgb);
        // 4:2:2, luma is (2, 1)
        let placement = BlockPlacement::new(&component, (2, 1), 0, 0, 0, 0);
        assert_eq!(placement.extent, (8, 16));
        placement.accumulate(&pixels, &component, &mut bitmap);

        let blue = |row: usize, col: usize| bitmap.sample(2, row, col);
        let expected = |v: f32| (v - 128.0) * 1.772;
        assert_eq!(blue(0, 0), expected(10.0));
        assert_eq!(blue(0, 1), expected(10.0));
        assert_eq!(blue(0, 2), expected(20.0));
        assert_eq!(blue(1, 0), expected(30.0));
        assert_eq!(blue(7, 15), expected(0.0));
        assert_eq!(blue(8, 0), 0.0);
    }

    #[test]
    fn minimum_scan_size_counts_every_block() {
        let component = |identifier, kind, xy_sampling_factor| Component {
            identifier,
            kind,
            xy_sampling_factor,
            qtable_id: 0,
            dc_table: 0,
            ac_table: 0,
        };
        let frame = Frame {
            precision: 8,
            lines: 16,
            samples_per_line: 32,
            components: vec![
                component(1, ComponentId::Y, (2, 1)),
                component(2, ComponentId::Cb, (1, 1)),
                component(3, ComponentId::Cr, (1, 1)),
            ],
        };
        // 2 x 2 MCUs of 4 blocks
        assert_eq!(minimum_scan_bits(&frame), 2 * 2 * 4 * MIN_BLOCK_BITS);
    }

    #[test]
    fn blocks_are_clipped_at_the_image_edge() {
        let component = Component {
            identifier: 1,
            kind: ComponentId::Y,
            xy_sampling_factor: (2, 2),
            qtable_id: 0,
            dc_table: 0,
            ac_table: 0,
        };
        let pixels = [50f32; BLOCK_SIZE];
        let mut bitmap = Bitmap::new(10, 12, ColorModel::Grayscale);
        let placement = BlockPlacement::new(&component, (2, 2), 0, 0, 1, 1);
        assert_eq!(placement.origin, (8, 8));
        placement.accumulate(&pixels, &component, &mut bitmap);

        assert_eq!(bitmap.sample(0, 9, 11), 50.0);
        assert_eq!(bitmap.sample(0, 7, 11), 0.0);
        assert!(bitmap.planes[1].iter().all(|s| *s == 0.0));
    }
}
