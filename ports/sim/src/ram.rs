//! Simulated RAM.
//!
//! The bottom of RAM is a data area filled by the host before boot (strings,
//! mutex words, shared counters); the rest is handed to the kernel heap.

use amt_kernel::memory::checked_offset;
use amt_kernel::{AddressSpace, KResult, Word};

use crate::error::SimError;

pub struct Ram {
    base: Word,
    bytes: Vec<u8>,
    data_top: Word,
    data_end: Word,
}

impl Ram {
    pub fn new(base: Word, size: usize, data_size: usize) -> Self {
        Self {
            base,
            bytes: vec![0; size],
            data_top: base,
            data_end: base + data_size as Word,
        }
    }

    pub fn base(&self) -> Word {
        self.base
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// First address past the data area.
    pub fn data_end(&self) -> Word {
        self.data_end
    }

    /// Copies `bytes` into the data area and returns their address.
    pub fn place(&mut self, bytes: &[u8]) -> Result<Word, SimError> {
        let len = (bytes.len() as Word + 7) & !7;
        let end = self.data_top + len;
        if end > self.data_end {
            return Err(SimError::DataFull {
                requested: bytes.len(),
            });
        }
        let addr = self.data_top;
        self.write(addr, bytes)?;
        self.data_top = end;
        Ok(addr)
    }

    /// Places a NUL-terminated copy of `text`.
    pub fn place_str(&mut self, text: &str) -> Result<Word, SimError> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        self.place(&bytes)
    }

    pub fn place_word(&mut self, value: Word) -> Result<Word, SimError> {
        self.place(&value.to_le_bytes())
    }
}

impl AddressSpace for Ram {
    fn read(&self, addr: Word, buf: &mut [u8]) -> KResult<()> {
        let offset = checked_offset(self.base, self.bytes.len(), addr, buf.len())?;
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: Word, data: &[u8]) -> KResult<()> {
        let offset = checked_offset(self.base, self.bytes.len(), addr, data.len())?;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}
