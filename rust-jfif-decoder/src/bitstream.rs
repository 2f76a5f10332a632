use crate::error::{Error, Result};

/// What lies ahead of the cursor of a [`BitReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// There is more entropy-coded data to read
    MoreData,
    /// The next two bytes are the end of image marker
    EndOfImage,
    /// The whole entropy-coded region has been consumed
    OutOfData,
}

/// Bitstream reader over the entropy-coded segment of a JPEG scan. Bits are read MSB first,
/// stuffed `0xFF 0x00` sequences are read as a single `0xFF` data byte.
#[derive(Debug)]
pub struct BitReader<'data> {
    data: &'data [u8],
    byte_cursor: usize,
    bit_cursor: u8,
}

impl<'data> BitReader<'data> {
    /// Creates a new reader positioned at the first bit of `data`.
    pub fn new(data: &'data [u8]) -> Self {
        Self {
            data,
            byte_cursor: 0,
            bit_cursor: 0,
        }
    }

    /// Size of the entropy-coded region in bytes, markers included.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Reads a single bit.
    pub fn next_bit(&mut self) -> Result<u8> {
        let current_byte = match self.data.get(self.byte_cursor) {
            Some(byte) => *byte,
            None => return Err(Error::StreamExhausted),
        };
        let bit = 1u8 & (current_byte >> (7 - self.bit_cursor));

        self.bit_cursor += 1;
        if self.bit_cursor == 8 {
            self.advance_byte()?;
        }
        Ok(bit)
    }

    /// Reads up to 16 bits out of the bitstream, first bit read ends up most significant.
    pub fn read_bits(&mut self, bits: u8) -> Result<u16> {
        if bits > 16 {
            return Err(Error::Decode("Can't read more than 16 bits at a time"));
        }

        let mut value: u16 = 0;
        for _ in 0..bits {
            value = (value << 1) | self.next_bit()? as u16;
        }
        Ok(value)
    }

    /// Inspects the upcoming bytes without consuming anything.
    pub fn state(&self) -> StreamState {
        if self.byte_cursor >= self.data.len() {
            return StreamState::OutOfData;
        }

        // A partially read byte still belongs to the entropy-coded data. It only ends the scan
        // if the rest of it is 1 bit padding.
        let mut next = self.byte_cursor;
        if self.bit_cursor != 0 {
            let current_byte = self.data[next];
            let unread_mask = 0xFF >> self.bit_cursor;
            if current_byte & unread_mask != unread_mask {
                return StreamState::MoreData;
            }
            if current_byte == 0xFF {
                next += 1;
            }
            next += 1;
        }

        match (self.data.get(next), self.data.get(next + 1)) {
            (Some(0xFF), Some(0xD9)) => StreamState::EndOfImage,
            _ => StreamState::MoreData,
        }
    }

    /// Crosses a restart interval boundary: drops the rest of the current byte and consumes the
    /// restart marker that must follow.
    pub fn restart(&mut self) -> Result<()> {
        if self.bit_cursor != 0 {
            self.advance_byte()?;
        }

        match (
            self.data.get(self.byte_cursor),
            self.data.get(self.byte_cursor + 1),
        ) {
            (Some(0xFF), Some(0xD0..=0xD7)) => {
                self.byte_cursor += 2;
                Ok(())
            }
            (Some(_), Some(_)) => Err(Error::Malformed(
                "Expected a restart marker at the end of a restart interval",
            )),
            _ => Err(Error::StreamExhausted),
        }
    }

    fn advance_byte(&mut self) -> Result<()> {
        if self.data[self.byte_cursor] == 0xFF {
            match self.data.get(self.byte_cursor + 1) {
                Some(0x00) | None => self.byte_cursor += 1,
                Some(_) => {
                    return Err(Error::Decode(
                        "Marker found where a stuffed zero byte was expected",
                    ))
                }
            }
        }
        self.byte_cursor += 1;
        self.bit_cursor = 0;
        Ok(())
    }
}
