use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Not enough bytes left to read")]
    InvalidSize,

    #[error("Invalid value for type {0}")]
    InvalidValue(&'static str),
}

pub struct Reader<'a> {
    bytes: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, total: 0 }
    }

    fn read_exact(&mut self, n: usize) -> Result<&'a [u8], ReaderError> {
        if self.bytes.len() < self.total + n {
            return Err(ReaderError::InvalidSize);
        }
        let slice = &self.bytes[self.total..self.total + n];
        self.total += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let bytes = self.read_exact(2)?;
        Ok(u16::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let bytes = self.read_exact(4)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let bytes = self.read_exact(8)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64, ReaderError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue("bool")),
        }
    }

    // bytes read so far
    pub fn total_read(&self) -> usize {
        self.total
    }

    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    // bytes left to read
    pub fn size(&self) -> usize {
        self.bytes.len() - self.total
    }
}
