use super::*;

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum CodecError {
    #[snafu(display("unexpected end of payload: wanted {wanted} bytes, {remaining} remain"))]
    UnexpectedEnd { wanted: usize, remaining: usize },

    #[snafu(display("{message}"))]
    Invalid { message: String },
}

/// Cursor over a borrowed payload slice. Every read is bounds-checked
/// against the declared payload; nothing ever reads past it.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEnd {
                wanted: len,
                remaining: self.remaining(),
            });
        }

        let bytes = &self.buf[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CodecError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, CodecError> {
        Ok(LittleEndian::read_i64(self.read_bytes(8)?))
    }

    /// Canonical Bitcoin varint: a first byte below 0xfd is the value;
    /// 0xfd, 0xfe, 0xff announce a little-endian u16, u32, u64.
    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        match self.read_u8()? {
            tag @ 0..=0xfc => Ok(tag as u64),
            0xfd => Ok(self.read_u16_le()? as u64),
            0xfe => Ok(self.read_u32_le()? as u64),
            0xff => self.read_u64_le(),
        }
    }
}

/// Writes the minimal varint encoding of `value`.
pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}
