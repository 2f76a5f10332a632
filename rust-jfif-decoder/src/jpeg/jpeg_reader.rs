use byteorder::{BigEndian, ReadBytesExt};
use log::{debug, warn};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::io::Cursor;

use crate::error::{Error, Result};

/// Every segment marker starts with this byte
pub const MARKER_PREFIX: u8 = 0xFF;

#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(PartialEq, Eq, PartialOrd, FromPrimitive, Debug, Clone, Copy)]
pub enum JPEGMarker {
    TEM = 0x01,

    SOF0 = 0xC0, // Only baseline DCT is decoded
    SOF1 = 0xC1,
    SOF2 = 0xC2,
    SOF3 = 0xC3,
    DHT = 0xC4,
    SOF5 = 0xC5,
    SOF6 = 0xC6,
    SOF7 = 0xC7,
    JPG = 0xC8,
    SOF9 = 0xC9,
    SOF10 = 0xCA,
    SOF11 = 0xCB,
    DAC = 0xCC,
    SOF13 = 0xCD,
    SOF14 = 0xCE,
    SOF15 = 0xCF,

    RST0 = 0xD0,
    RST1 = 0xD1,
    RST2 = 0xD2,
    RST3 = 0xD3,
    RST4 = 0xD4,
    RST5 = 0xD5,
    RST6 = 0xD6,
    RST7 = 0xD7,

    SOI = 0xD8,
    EOI = 0xD9,
    SOS = 0xDA,
    DQT = 0xDB,
    DNL = 0xDC,
    DRI = 0xDD,
    DHP = 0xDE,
    EXP = 0xDF,

    APP0 = 0xE0,
    APP1 = 0xE1,
    APP2 = 0xE2,
    APP3 = 0xE3,
    APP4 = 0xE4,
    APP5 = 0xE5,
    APP6 = 0xE6,
    APP7 = 0xE7,
    APP8 = 0xE8,
    APP9 = 0xE9,
    APP10 = 0xEA,
    APP11 = 0xEB,
    APP12 = 0xEC,
    APP13 = 0xED,
    APP14 = 0xEE,
    APP15 = 0xEF,

    COM = 0xFE,
}

impl JPEGMarker {
    pub fn from_byte(byte: u8) -> Option<Self> {
        FromPrimitive::from_u8(byte)
    }

    /// Markers that stand alone, without a length field or payload.
    pub fn is_standalone(&self) -> bool {
        matches!(self, JPEGMarker::TEM | JPEGMarker::SOI | JPEGMarker::EOI) || self.is_restart()
    }

    pub fn is_restart(&self) -> bool {
        *self >= JPEGMarker::RST0 && *self <= JPEGMarker::RST7
    }

    /// Application and comment segments, which are expected and skipped quietly.
    pub fn is_auxiliary(&self) -> bool {
        (*self >= JPEGMarker::APP0 && *self <= JPEGMarker::APP15) || *self == JPEGMarker::COM
    }

    /// Frame headers for coding processes other than baseline.
    pub fn is_unsupported_frame(&self) -> bool {
        matches!(
            self,
            JPEGMarker::SOF1
                | JPEGMarker::SOF2
                | JPEGMarker::SOF3
                | JPEGMarker::SOF5
                | JPEGMarker::SOF6
                | JPEGMarker::SOF7
                | JPEGMarker::SOF9
                | JPEGMarker::SOF10
                | JPEGMarker::SOF11
                | JPEGMarker::SOF13
                | JPEGMarker::SOF14
                | JPEGMarker::SOF15
        )
    }
}

/// A marker and the payload following its length field. Borrows from the file buffer.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'data> {
    pub marker: u8,
    pub data: &'data [u8],
}

impl<'data> Segment<'data> {
    pub fn kind(&self) -> Option<JPEGMarker> {
        JPEGMarker::from_byte(self.marker)
    }

    pub fn reader(&self) -> JPEGParser<'data> {
        JPEGParser::new(self.data)
    }
}

/// Byte-level reader over the marker-delimited part of a JPEG file.
pub struct JPEGParser<'data> {
    cursor: Cursor<&'data [u8]>,
}

impl<'data> JPEGParser<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    pub fn read_next_word(&mut self) -> Result<u16> {
        match self.cursor.read_u16::<BigEndian>() {
            Ok(val) => Ok(val),
            Err(_) => Err(Error::Malformed("Unexpected end of input")),
        }
    }

    pub fn read_next_byte(&mut self) -> Result<u8> {
        match self.cursor.read_u8() {
            Ok(val) => Ok(val),
            Err(_) => Err(Error::Malformed("Unexpected end of input")),
        }
    }

    /// Reads a byte and splits it into its high and low nibble.
    pub fn read_nibbles(&mut self) -> Result<(u8, u8)> {
        let byte = self.read_next_byte()?;
        Ok((byte >> 4, byte & 0x0F))
    }

    /// Checks for the start of image marker directly followed by the APP0 marker, and skips
    /// the APP0 segment.
    pub fn read_file_header(&mut self) -> Result<()> {
        let data = self.data();
        if data.len() < 6 || data[0..4] != [MARKER_PREFIX, 0xD8, MARKER_PREFIX, 0xE0] {
            return Err(Error::Malformed("Not a recognized JPEG container"));
        }
        self.cursor.set_position(4);
        self.read_payload()?;
        Ok(())
    }

    /// Scans forward to the next marker and returns its segment. Standalone markers are
    /// returned with an empty payload.
    pub fn read_next_segment(&mut self) -> Result<Segment<'data>> {
        let mut skipped = 0usize;
        let marker = loop {
            let byte = self.read_next_byte()?;
            if byte != MARKER_PREFIX {
                skipped += 1;
                continue;
            }

            let mut next = self.read_next_byte()?;
            // Any number of fill bytes may precede a marker
            while next == MARKER_PREFIX {
                next = self.read_next_byte()?;
            }
            if next == 0x00 {
                skipped += 2;
                continue;
            }
            break next;
        };

        if skipped > 0 {
            warn!(
                "Skipped {} bytes of garbage before marker {:02X}",
                skipped, marker
            );
        }

        if JPEGMarker::from_byte(marker).map_or(false, |m| m.is_standalone()) {
            return Ok(Segment { marker, data: &[] });
        }

        let data = self.read_payload()?;
        debug!("Read segment {:02X} with {} bytes", marker, data.len());
        Ok(Segment { marker, data })
    }

    /// Reads a length field and returns the payload it covers.
    fn read_payload(&mut self) -> Result<&'data [u8]> {
        let length = self.read_next_word()? as usize;
        if length < 2 {
            return Err(Error::Malformed(
                "JPEG segment length is shorter than its own length field",
            ));
        }

        let data = self.data();
        let start = self.position();
        let end = start + length - 2;
        if end > data.len() {
            return Err(Error::Malformed(
                "JPEG marker with length contained a length longer than the remaining size of the JPEG file",
            ));
        }
        self.cursor.set_position(end as u64);
        Ok(&data[start..end])
    }

    /// Everything after the cursor.
    pub fn remaining(&self) -> &'data [u8] {
        &self.data()[self.position().min(self.data().len())..]
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.position() >= self.data().len()
    }

    fn data(&self) -> &'data [u8] {
        *self.cursor.get_ref()
    }
}

#[rustfmt::skip]
#[allow(dead_code)]
static TEST_HEADER: [u8; 36] = [
    0xFF, 0xD8, // Start of image
    0xFF, 0xE0, // APP0
    0, 4,           // Length
    b'J', b'F',     // Truncated identifier
    0xFF, 0xC0, // Start of frame
    0, 11,          // Length
    8,              // Precision
    0, 16,          // Height
    0, 16,          // Width
    1,              // Component count
    1, 0x11, 0,     // Component data
    0x12, 0x00,     // Garbage
    0xFF, 0xFF, // Fill byte
    0xFF, 0xFE, // Commment
    0, 3,           // Length
    65,             // Content
    0xFF, 0xD0, // Restart marker
    0xFF, 0xDA, // Start of scan
    0, 60,          // Length past end of data
];

#[test]
fn read_words() {
    let mut reader = JPEGParser::new(&TEST_HEADER);
    assert_eq!(reader.read_next_byte().unwrap(), 0xFF);
    assert_eq!(reader.read_next_byte().unwrap(), 0xD8);

    assert_eq!(reader.read_next_word().unwrap(), 0xFFE0);
    assert_eq!(reader.read_nibbles().unwrap(), (0, 4));
}

#[test]
fn read_segments() {
    let mut reader = JPEGParser::new(&TEST_HEADER);
    reader.read_file_header().unwrap();
    assert_eq!(reader.position(), 8);

    let frame = reader.read_next_segment().unwrap();
    assert_eq!(frame.kind(), Some(JPEGMarker::SOF0));
    assert_eq!(frame.data.len(), 9);
    assert_eq!(frame.data[0], 8);

    let comment = reader.read_next_segment().unwrap();
    assert_eq!(comment.kind(), Some(JPEGMarker::COM));
    assert_eq!(comment.data, &[65]);

    let restart = reader.read_next_segment().unwrap();
    assert_eq!(restart.kind(), Some(JPEGMarker::RST0));
    assert!(restart.data.is_empty());

    assert!(matches!(
        reader.read_next_segment(),
        Err(Error::Malformed(_))
    ));
}

#[test]
fn rejects_unknown_container() {
    let mut reader = JPEGParser::new(&[0xFF, 0xD8, 0xFF, 0xE1, 0, 2]);
    assert!(reader.read_file_header().is_err());

    let mut reader = JPEGParser::new(&[0xFF, 0xD8]);
    assert!(reader.read_file_header().is_err());
}

#[test]
fn rejects_short_length_field() {
    let mut reader = JPEGParser::new(&[0xFF, 0xDB, 0, 1, 0]);
    assert!(matches!(
        reader.read_next_segment(),
        Err(Error::Malformed(_))
    ));
}
