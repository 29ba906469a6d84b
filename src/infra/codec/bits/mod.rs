//! Bit-level cursors over BAP payloads.
//!
//! BAP packs several fields into nibbles (plug/supply state, charge
//! mode/status, array header flags) and stores multi-byte values
//! little-endian. Both cursors are LSB-first, so a 16-bit read or write on an
//! aligned cursor is a little-endian `u16`.
use crate::error::{BitReaderError, BitWriterError};

/// Reader extracting bit segments from a borrowed payload.
pub struct BitReader<'a> {
    buffer: &'a [u8],
    /// Bits consumed since the start of `buffer`.
    bit_cursor: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the start of the provided buffer.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    fn available_bits(&self) -> usize {
        self.buffer.len() * 8 - self.bit_cursor
    }

    fn check_read(&self, num_bits: u8, max: u8) -> Result<(), BitReaderError> {
        if num_bits == 0 || num_bits > max {
            return Err(BitReaderError::TooLongForType {
                max,
                asked: num_bits,
            });
        }
        if num_bits as usize > self.available_bits() {
            return Err(BitReaderError::OutOfBounds {
                asked: num_bits as usize,
                available: self.available_bits(),
            });
        }
        Ok(())
    }

    /// LSB-first gather of `num_bits` already checked bits.
    fn take(&mut self, num_bits: u8) -> u32 {
        let mut result: u32 = 0;
        let mut done: usize = 0;
        let wanted = num_bits as usize;

        while done < wanted {
            let position = self.bit_cursor + done;
            let offset = position % 8;
            let chunk = (8 - offset).min(wanted - done);
            let mask = ((1u16 << chunk) - 1) as u8;
            let bits = (self.buffer[position / 8] >> offset) & mask;
            result |= (bits as u32) << done;
            done += chunk;
        }

        self.bit_cursor += wanted;
        result
    }

    /// Read up to 8 bits.
    pub fn read_u8(&mut self, num_bits: u8) -> Result<u8, BitReaderError> {
        self.check_read(num_bits, 8)?;
        Ok(self.take(num_bits) as u8)
    }

    /// Read up to 16 bits. Sixteen bits on an aligned cursor are a
    /// little-endian `u16`.
    pub fn read_u16(&mut self, num_bits: u8) -> Result<u16, BitReaderError> {
        self.check_read(num_bits, 16)?;
        Ok(self.take(num_bits) as u16)
    }

    /// Read a single flag bit.
    pub fn read_bool(&mut self) -> Result<bool, BitReaderError> {
        self.read_u8(1).map(|bit| bit != 0)
    }

    /// Skip reserved bits.
    pub fn advance(&mut self, length: u8) -> Result<(), BitReaderError> {
        self.check_read(length, 16)?;
        self.bit_cursor += length as usize;
        Ok(())
    }

    /// Borrow `len` bytes from the cursor. The cursor must be byte aligned.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], BitReaderError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitReaderError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }
        let start = self.bit_cursor / 8;
        let end = start + len;
        if end > self.buffer.len() {
            return Err(BitReaderError::OutOfBounds {
                asked: len,
                available: self.buffer.len() - start,
            });
        }
        self.bit_cursor += len * 8;
        Ok(&self.buffer[start..end])
    }

    /// Whole bytes left after the cursor.
    pub fn remaining_bytes(&self) -> usize {
        self.available_bits() / 8
    }

    /// Cursor position rounded down to the current byte.
    pub fn byte_position(&self) -> usize {
        self.bit_cursor / 8
    }
}

//==================================================================================BITWRITER

/// Writer laying bit segments into a borrowed buffer. Used to build request
/// payloads and to serialize profile records.
pub struct BitWriter<'a> {
    buffer: &'a mut [u8],
    /// Bits written since the start of `buffer`.
    bit_cursor: usize,
}

impl<'a> BitWriter<'a> {
    /// Create a writer positioned at the start of the buffer.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Bytes touched so far, rounding a partial byte up.
    pub fn byte_len(&self) -> usize {
        self.bit_cursor.div_ceil(8)
    }

    fn available_bits(&self) -> usize {
        self.buffer.len() * 8 - self.bit_cursor
    }

    fn check_write(&self, num_bits: u8, max: u8) -> Result<(), BitWriterError> {
        if num_bits == 0 || num_bits > max {
            return Err(BitWriterError::TooLongForType {
                max,
                asked: num_bits,
            });
        }
        if num_bits as usize > self.available_bits() {
            return Err(BitWriterError::OutOfBounds {
                asked: num_bits as usize,
                available: self.available_bits(),
            });
        }
        Ok(())
    }

    /// LSB-first scatter of the low `num_bits` of `value`, already checked.
    fn put(&mut self, value: u32, num_bits: u8) {
        let mut remaining = value;
        let mut done: usize = 0;
        let wanted = num_bits as usize;

        while done < wanted {
            let position = self.bit_cursor + done;
            let offset = position % 8;
            let chunk = (8 - offset).min(wanted - done);
            let mask = ((1u16 << chunk) - 1) as u8;
            let byte = &mut self.buffer[position / 8];
            *byte &= !(mask << offset);
            *byte |= (remaining as u8 & mask) << offset;
            remaining >>= chunk;
            done += chunk;
        }

        self.bit_cursor += wanted;
    }

    /// Write up to 8 bits.
    pub fn write_u8(&mut self, value: u8, num_bits: u8) -> Result<(), BitWriterError> {
        self.check_write(num_bits, 8)?;
        self.put(value as u32, num_bits);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16, num_bits: u8) -> Result<(), BitWriterError> {
        self.check_write(num_bits, 16)?;
        self.put(value as u32, num_bits);
        Ok(())
    }

    /// Write a single flag bit.
    pub fn write_bool(&mut self, flag: bool) -> Result<(), BitWriterError> {
        self.write_u8(flag as u8, 1)
    }

    /// Copy an aligned byte slice at the cursor.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), BitWriterError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitWriterError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }
        let start = self.bit_cursor / 8;
        let end = start + slice.len();
        if end > self.buffer.len() {
            return Err(BitWriterError::OutOfBounds {
                asked: slice.len(),
                available: self.buffer.len() - start,
            });
        }
        self.buffer[start..end].copy_from_slice(slice);
        self.bit_cursor += slice.len() * 8;
        Ok(())
    }
}
