use log::{debug, warn};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{
    bitstream::BitReader,
    error::{Error, Result},
    jpeg::jpeg_reader::*,
};

use super::{
    huffman::{self, HuffmanTable, HuffmanTableType},
    quantization::QuantizationTable,
};

/// Most quantization tables a file may define
pub const MAX_QUANTIZATION_TABLES: usize = 4;
/// Most Huffman tables a file may define, DC and AC combined
pub const MAX_HUFFMAN_TABLES: usize = 4;

const SUPPORTED_PRECISION: u8 = 8;
const MAX_SAMPLING_FACTOR: u8 = 4;

/// Role of a frame component
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ComponentId {
    /// Luminance
    Y = 1,
    /// Blue difference chroma
    Cb = 2,
    /// Red difference chroma
    Cr = 3,
}

/// A component of the frame as declared by the start of frame segment
#[derive(Debug, Clone)]
pub struct Component {
    /// Id used by the scan header to refer to this component
    pub identifier: u8,
    /// What the component's samples mean
    pub kind: ComponentId,
    /// Horizontal and vertical sampling factors
    pub xy_sampling_factor: (u8, u8),
    /// Quantization table used by the component's blocks
    pub qtable_id: u8,
    /// Assigned by the scan header
    pub dc_table: u8,
    /// Assigned by the scan header
    pub ac_table: u8,
}

/// Baseline start of frame header
#[derive(Debug, Clone)]
pub struct Frame {
    /// Bits per sample, always 8
    pub precision: u8,
    /// Image height
    pub lines: u16,
    /// Image width
    pub samples_per_line: u16,
    /// Components in the order they are interleaved in an MCU
    pub components: Vec<Component>,
}

impl Frame {
    fn read(segment: &Segment) -> Result<Self> {
        let mut reader = segment.reader();

        let precision = reader.read_next_byte()?;
        if precision != SUPPORTED_PRECISION {
            return Err(Error::UnsupportedFeature("Only 8 bit sample precision is supported"));
        }

        let lines = reader.read_next_word()?;
        let samples_per_line = reader.read_next_word()?;
        if lines == 0 {
            return Err(Error::UnsupportedFeature(
                "Line count defined by a DNL segment is not supported",
            ));
        }
        if samples_per_line == 0 {
            return Err(Error::Malformed("Frame has zero samples per line"));
        }

        let component_count = reader.read_next_byte()?;
        if component_count == 0 {
            return Err(Error::Malformed("Frame has no components"));
        }
        if segment.data.len() != 6 + 3 * component_count as usize {
            return Err(Error::Malformed(
                "Frame header length doesn't match its component count",
            ));
        }
        if component_count != 1 && component_count != 3 {
            return Err(Error::UnsupportedFeature(
                "Only grayscale and YCbCr images are supported",
            ));
        }

        let mut components: Vec<Component> = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
            let identifier = reader.read_next_byte()?;
            if components.iter().any(|c| c.identifier == identifier) {
                return Err(Error::Malformed("Duplicate component identifier"));
            }

            let mut xy_sampling_factor = reader.read_nibbles()?;
            let valid_factor = 1..=MAX_SAMPLING_FACTOR;
            if !valid_factor.contains(&xy_sampling_factor.0)
                || !valid_factor.contains(&xy_sampling_factor.1)
            {
                return Err(Error::Malformed("Sampling factor out of range"));
            }
            // A single component scan is not interleaved, its MCU is always one block
            if component_count == 1 && xy_sampling_factor != (1, 1) {
                debug!(
                    "Ignoring sampling factor {:?} of lone component",
                    xy_sampling_factor
                );
                xy_sampling_factor = (1, 1);
            }

            let qtable_id = reader.read_next_byte()?;

            // A lone component is luminance whatever it is called
            let kind = if component_count == 1 {
                ComponentId::Y
            } else {
                ComponentId::from_u8(identifier).ok_or(Error::UnsupportedFeature(
                    "Only Y, Cb and Cr components (ids 1 to 3) are supported",
                ))?
            };

            components.push(Component {
                identifier,
                kind,
                xy_sampling_factor,
                qtable_id,
                dc_table: 0,
                ac_table: 0,
            })
        }

        Ok(Self {
            precision,
            lines,
            samples_per_line,
            components,
        })
    }

    /// The highest horizontal and vertical sampling factors of all components.
    pub fn max_sampling_factor(&self) -> (u8, u8) {
        self.components
            .iter()
            .fold((1, 1), |(max_h, max_v), component| {
                (
                    max_h.max(component.xy_sampling_factor.0),
                    max_v.max(component.xy_sampling_factor.1),
                )
            })
    }

    /// Size of one MCU in pixels
    pub fn mcu_size(&self) -> (usize, usize) {
        let (max_h, max_v) = self.max_sampling_factor();
        (8 * max_h as usize, 8 * max_v as usize)
    }

    /// Looks up a component by its identifier.
    pub fn component_mut(&mut self, identifier: u8) -> Option<&mut Component> {
        self.components
            .iter_mut()
            .find(|c| c.identifier == identifier)
    }
}

/// Start of scan header
#[derive(Debug)]
pub struct ScanInfo<'data> {
    /// First and last zigzag index coded by the scan
    pub spectral_selection: (u8, u8),
    /// High and low successive approximation bit positions
    pub successive_approximation: (u8, u8),
    pub reader: BitReader<'data>,
}

impl<'data> ScanInfo<'data> {
    /// Reads the scan header and binds the Huffman tables it names to the frame's components.
    /// The entropy-coded data starts right after the segment.
    fn read(segment: &Segment, frame: &mut Frame, entropy_data: &'data [u8]) -> Result<Self> {
        let mut reader = segment.reader();

        let component_count = reader.read_next_byte()?;
        if component_count as usize != frame.components.len() {
            return Err(Error::Malformed(
                "Different number of components specified in scan header than frame header",
            ));
        }
        if segment.data.len() != 4 + 2 * component_count as usize {
            return Err(Error::Malformed(
                "Scan header length doesn't match its component count",
            ));
        }

        let mut selectors: Vec<u8> = Vec::with_capacity(component_count as usize);
        for _ in 0..component_count {
            let selector = reader.read_next_byte()?;
            if selectors.contains(&selector) {
                return Err(Error::Malformed("Component appears twice in scan header"));
            }
            selectors.push(selector);

            let (dc_table, ac_table) = reader.read_nibbles()?;
            if dc_table > huffman::MAX_TABLE_ID || ac_table > huffman::MAX_TABLE_ID {
                return Err(Error::Malformed("Scan refers to a Huffman table id out of range"));
            }

            let component = frame
                .component_mut(selector)
                .ok_or(Error::Malformed("Scan refers to a component not in the frame"))?;
            component.dc_table = dc_table;
            component.ac_table = ac_table;
        }

        let spectral_selection_start = reader.read_next_byte()?;
        let spectral_selection_end = reader.read_next_byte()?;
        let successive_approximation = reader.read_nibbles()?;
        if (spectral_selection_start, spectral_selection_end) != (0, 63)
            || successive_approximation != (0, 0)
        {
            warn!("Scan is not sequential, decoding it as if it were");
        }

        Ok(Self {
            spectral_selection: (spectral_selection_start, spectral_selection_end),
            successive_approximation,
            reader: BitReader::new(entropy_data),
        })
    }
}

/// The quantization and Huffman tables defined before the scan. A redefined id shadows the
/// earlier table.
#[derive(Debug, Default)]
pub struct TableSet {
    pub quant_tables: Vec<QuantizationTable>,
    pub huff_tables: Vec<HuffmanTable>,
}

impl TableSet {
    fn add_quantization_table(&mut self, table: QuantizationTable) -> Result<()> {
        if self.quant_tables.len() == MAX_QUANTIZATION_TABLES {
            return Err(Error::CapacityExceeded {
                table: "quantization",
                max: MAX_QUANTIZATION_TABLES,
            });
        }
        debug!("Defined quantization table {}", table.destination_id);
        self.quant_tables.push(table);
        Ok(())
    }

    fn add_huffman_table(&mut self, table: HuffmanTable) -> Result<()> {
        if self.huff_tables.len() == MAX_HUFFMAN_TABLES {
            return Err(Error::CapacityExceeded {
                table: "Huffman",
                max: MAX_HUFFMAN_TABLES,
            });
        }
        debug!(
            "Defined {} table {}",
            table.table_type.name(),
            table.destination_id
        );
        self.huff_tables.push(table);
        Ok(())
    }

    pub fn quantization_table(&self, id: u8) -> Result<&QuantizationTable> {
        self.quant_tables
            .iter()
            .rev()
            .find(|table| table.destination_id == id)
            .ok_or(Error::MissingTable {
                kind: "quantization",
                id,
            })
    }

    pub fn huffman_table(&self, table_type: HuffmanTableType, id: u8) -> Result<&HuffmanTable> {
        self.huff_tables
            .iter()
            .rev()
            .find(|table| table.table_type == table_type && table.destination_id == id)
            .ok_or(Error::MissingTable {
                kind: table_type.name(),
                id,
            })
    }

    fn read_quantization_tables(&mut self, segment: &Segment) -> Result<()> {
        let mut reader = segment.reader();
        while !reader.is_empty() {
            self.add_quantization_table(QuantizationTable::read(&mut reader)?)?;
        }
        Ok(())
    }

    fn read_huffman_tables(&mut self, segment: &Segment) -> Result<()> {
        let mut reader = segment.reader();
        while !reader.is_empty() {
            self.add_huffman_table(HuffmanTable::read(&mut reader)?)?;
        }
        Ok(())
    }
}

/// Everything needed to decode the scan: the frame, its tables, the restart interval and the
/// scan with its bit reader.
#[derive(Debug)]
pub struct HeaderInfo<'data> {
    /// The frame header
    pub frame: Frame,
    /// The scan header, its reader is positioned at the first entropy-coded byte
    pub scan_info: ScanInfo<'data>,
    /// Tables defined before the scan
    pub tables: TableSet,
    /// Number of MCUs between restart markers, 0 if restarts are disabled
    pub restart_interval: u16,
}

impl<'data> HeaderInfo<'data> {
    fn read_restart_interval(segment: &Segment) -> Result<u16> {
        if segment.data.len() != 2 {
            return Err(Error::Malformed("Restart interval segment must hold 2 bytes"));
        }
        segment.reader().read_next_word()
    }

    /// Reads header info from a whole JPEG file. Returns when it finds the start of scan marker,
    /// handing the data after the scan header to the scan's bit reader.
    pub fn read_header_info(data: &'data [u8]) -> Result<Self> {
        let mut reader = JPEGParser::new(data);
        reader.read_file_header()?;

        let mut frame: Option<Frame> = None;
        let mut tables = TableSet::default();
        let mut restart_interval = 0;

        loop {
            if reader.is_empty() {
                return Err(Error::Malformed("No start of scan marker found"));
            }
            let segment = reader.read_next_segment()?;

            match segment.kind() {
                Some(JPEGMarker::EOI) => {
                    return Err(Error::Malformed("Unexpected EOI marker encountered."));
                }
                Some(JPEGMarker::SOF0) => {
                    if frame.is_some() {
                        warn!("Extra start of frame segment, keeping the first one");
                    } else {
                        frame = Some(Frame::read(&segment)?);
                    }
                }
                Some(JPEGMarker::DHT) => tables.read_huffman_tables(&segment)?,
                Some(JPEGMarker::DQT) => tables.read_quantization_tables(&segment)?,
                Some(JPEGMarker::DRI) => {
                    restart_interval = Self::read_restart_interval(&segment)?;
                    debug!("Restart interval set to {}", restart_interval);
                }
                Some(JPEGMarker::SOS) => {
                    let mut frame = frame.ok_or(Error::Malformed(
                        "Start of scan encountered before start of frame",
                    ))?;
                    let scan_info = ScanInfo::read(&segment, &mut frame, reader.remaining())?;

                    let header = Self {
                        frame,
                        scan_info,
                        tables,
                        restart_interval,
                    };
                    header.check_table_bindings()?;
                    return Ok(header);
                }
                Some(marker) if marker.is_auxiliary() => {
                    debug!("Skipping {:?} segment", marker);
                }
                Some(marker) if marker.is_unsupported_frame() => {
                    warn!(
                        "Skipping {:?} frame header, only baseline frames are decoded",
                        marker
                    );
                }
                _ => {
                    warn!("Unknown marker {:02X}, ignoring", segment.marker);
                }
            }
        }
    }

    /// Every component needs its quantization table and both Huffman tables before decoding.
    fn check_table_bindings(&self) -> Result<()> {
        for component in &self.frame.components {
            self.tables.quantization_table(component.qtable_id)?;
            self.tables
                .huffman_table(HuffmanTableType::Dc, component.dc_table)?;
            self.tables
                .huffman_table(HuffmanTableType::Ac, component.ac_table)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(marker: JPEGMarker, data: &[u8]) -> Segment {
        Segment {
            marker: marker as u8,
            data,
        }
    }

    #[rustfmt::skip]
    static COLOR_FRAME: [u8; 15] = [
        8,              // Precision
        0, 20,          // Height
        0, 30,          // Width
        3,              // Component count
        1, 0x22, 0,     // Y
        2, 0x11, 1,     // Cb
        3, 0x11, 1,     // Cr
    ];

    #[test]
    fn reads_frame() {
        let frame = Frame::read(&segment(JPEGMarker::SOF0, &COLOR_FRAME)).unwrap();
        assert_eq!(frame.lines, 20);
        assert_eq!(frame.samples_per_line, 30);
        assert_eq!(frame.components.len(), 3);
        assert_eq!(frame.components[0].xy_sampling_factor, (2, 2));
        assert_eq!(frame.components[2].kind, ComponentId::Cr);
        assert_eq!(frame.components[2].qtable_id, 1);
        assert_eq!(frame.max_sampling_factor(), (2, 2));
        assert_eq!(frame.mcu_size(), (16, 16));
    }

    #[test]
    fn rejects_invalid_frames() {
        let mut data = COLOR_FRAME;
        data[0] = 12;
        assert!(matches!(
            Frame::read(&segment(JPEGMarker::SOF0, &data)),
            Err(Error::UnsupportedFeature(_))
        ));

        let mut data = COLOR_FRAME;
        data[9] = 1;
        assert!(Frame::read(&segment(JPEGMarker::SOF0, &data)).is_err());

        let mut data = COLOR_FRAME;
        data[7] = 0x50;
        assert!(Frame::read(&segment(JPEGMarker::SOF0, &data)).is_err());

        let mut data = COLOR_FRAME;
        data[12] = 4;
        assert!(matches!(
            Frame::read(&segment(JPEGMarker::SOF0, &data)),
            Err(Error::UnsupportedFeature(_))
        ));

        assert!(Frame::read(&segment(JPEGMarker::SOF0, &COLOR_FRAME[..12])).is_err());

        let mut data = COLOR_FRAME;
        data[1..3].copy_from_slice(&[0, 0]);
        assert!(matches!(
            Frame::read(&segment(JPEGMarker::SOF0, &data)),
            Err(Error::UnsupportedFeature(_))
        ));

        let mut data = COLOR_FRAME;
        data[3..5].copy_from_slice(&[0, 0]);
        assert!(matches!(
            Frame::read(&segment(JPEGMarker::SOF0, &data)),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn lone_component_is_luminance() {
        let data = [8, 0, 8, 0, 8, 1, 0, 0x22, 0];
        let frame = Frame::read(&segment(JPEGMarker::SOF0, &data)).unwrap();
        assert_eq!(frame.components[0].kind, ComponentId::Y);
        assert_eq!(frame.components[0].xy_sampling_factor, (1, 1));
        assert_eq!(frame.mcu_size(), (8, 8));
    }

    #[test]
    fn scan_binds_tables() {
        let mut frame = Frame::read(&segment(JPEGMarker::SOF0, &COLOR_FRAME)).unwrap();
        let scan = [3, 3, 0x00, 1, 0x10, 2, 0x11, 0, 63, 0];
        let entropy = [0xAB, 0xFF, 0xD9];
        let info = ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &entropy).unwrap();

        assert_eq!(info.spectral_selection, (0, 63));
        assert_eq!((frame.components[0].dc_table, frame.components[0].ac_table), (1, 0));
        assert_eq!((frame.components[1].dc_table, frame.components[1].ac_table), (1, 1));
        assert_eq!((frame.components[2].dc_table, frame.components[2].ac_table), (0, 0));
    }

    #[test]
    fn scan_must_match_frame() {
        let mut frame = Frame::read(&segment(JPEGMarker::SOF0, &COLOR_FRAME)).unwrap();

        let scan = [1, 1, 0x00, 0, 63, 0];
        assert!(ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &[]).is_err());

        let scan = [3, 1, 0x00, 2, 0x11, 9, 0x11, 0, 63, 0];
        assert!(ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &[]).is_err());

        let scan = [3, 1, 0x40, 2, 0x11, 3, 0x11, 0, 63, 0];
        assert!(ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &[]).is_err());

        // Cb and Cr would silently keep table 0
        let scan = [3, 1, 0x11, 1, 0x11, 1, 0x11, 0, 63, 0];
        assert!(matches!(
            ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &[]),
            Err(Error::Malformed("Component appears twice in scan header"))
        ));
    }

    #[test]
    fn non_sequential_scan_is_read_as_sequential() {
        let mut frame = Frame::read(&segment(JPEGMarker::SOF0, &COLOR_FRAME)).unwrap();
        let scan = [3, 1, 0x00, 2, 0x11, 3, 0x11, 1, 5, 0x10];
        let info = ScanInfo::read(&segment(JPEGMarker::SOS, &scan), &mut frame, &[]).unwrap();
        assert_eq!(info.spectral_selection, (1, 5));
        assert_eq!(info.successive_approximation, (1, 0));
        assert_eq!((frame.components[1].dc_table, frame.components[1].ac_table), (1, 1));
    }

    #[test]
    fn table_set_capacity() {
        let mut tables = TableSet::default();
        let mut data = vec![];
        for id in 0..4u8 {
            data.push(id);
            data.extend([1u8; 64]);
        }
        tables
            .read_quantization_tables(&segment(JPEGMarker::DQT, &data))
            .unwrap();
        assert!(tables.quantization_table(3).is_ok());

        let extra = [[0u8].as_slice(), &[2u8; 64]].concat();
        assert!(matches!(
            tables.read_quantization_tables(&segment(JPEGMarker::DQT, &extra)),
            Err(Error::CapacityExceeded { max: 4, .. })
        ));
    }

    #[test]
    fn redefined_table_shadows() {
        let mut tables = TableSet::default();
        let first = [[0u8].as_slice(), &[1u8; 64]].concat();
        let second = [[0u8].as_slice(), &[5u8; 64]].concat();
        tables
            .read_quantization_tables(&segment(JPEGMarker::DQT, &first))
            .unwrap();
        tables
            .read_quantization_tables(&segment(JPEGMarker::DQT, &second))
            .unwrap();
        assert_eq!(tables.quantization_table(0).unwrap().values[0], 5);
        assert!(matches!(
            tables.quantization_table(1),
            Err(Error::MissingTable { id: 1, .. })
        ));
    }

    #[test]
    fn restart_interval_segment() {
        assert_eq!(
            HeaderInfo::read_restart_interval(&segment(JPEGMarker::DRI, &[1, 2])).unwrap(),
            0x0102
        );
        assert!(HeaderInfo::read_restart_interval(&segment(JPEGMarker::DRI, &[1, 2, 3])).is_err());
    }
}
