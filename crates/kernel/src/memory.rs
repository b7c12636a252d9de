//! Access to the flat address space shared by the kernel and all threads.
//!
//! Syscall arguments are plain addresses. The kernel never dereferences them
//! directly; it goes through an [`AddressSpace`], which rejects ranges outside
//! addressable memory with [`Error::BadAddress`].

use crate::abi::Word;
use crate::error::{Error, KResult};

/// Bounds-checked byte access to memory.
pub trait AddressSpace {
    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    fn read(&self, addr: Word, buf: &mut [u8]) -> KResult<()>;

    /// Copies `data` to memory starting at `addr`.
    fn write(&mut self, addr: Word, data: &[u8]) -> KResult<()>;

    fn read_word(&self, addr: Word) -> KResult<Word> {
        let mut bytes = [0u8; 4];
        self.read(addr, &mut bytes)?;
        Ok(Word::from_le_bytes(bytes))
    }

    fn write_word(&mut self, addr: Word, value: Word) -> KResult<()> {
        self.write(addr, &value.to_le_bytes())
    }

    /// Reads a NUL-terminated string of at most `buf.len()` bytes.
    ///
    /// Returns the number of bytes before the terminator; a string that fills
    /// the buffer without a terminator is truncated.
    fn read_cstr(&self, addr: Word, buf: &mut [u8]) -> KResult<usize> {
        for (i, slot) in buf.iter_mut().enumerate() {
            let at = addr.checked_add(i as Word).ok_or(Error::BadAddress)?;
            let mut byte = [0u8; 1];
            self.read(at, &mut byte)?;
            if byte[0] == 0 {
                return Ok(i);
            }
            *slot = byte[0];
        }
        Ok(buf.len())
    }

    /// Copies `len` bytes from `src` to `dst`; the ranges may overlap.
    fn copy_within(&mut self, src: Word, dst: Word, len: usize) -> KResult<()> {
        const CHUNK: usize = 64;
        let mut tmp = [0u8; CHUNK];
        if dst <= src {
            let mut done = 0;
            while done < len {
                let n = CHUNK.min(len - done);
                self.read(offset_by(src, done)?, &mut tmp[..n])?;
                self.write(offset_by(dst, done)?, &tmp[..n])?;
                done += n;
            }
        } else {
            let mut left = len;
            while left > 0 {
                let n = CHUNK.min(left);
                left -= n;
                self.read(offset_by(src, left)?, &mut tmp[..n])?;
                self.write(offset_by(dst, left)?, &tmp[..n])?;
            }
        }
        Ok(())
    }
}

/// `addr + delta`, failing instead of wrapping past the top of the address space.
pub fn offset_by(addr: Word, delta: usize) -> KResult<Word> {
    Word::try_from(delta)
        .ok()
        .and_then(|delta| addr.checked_add(delta))
        .ok_or(Error::BadAddress)
}

/// Checks that `[addr, addr + len)` lies inside `[base, base + size)` and
/// returns the offset of `addr` from `base`.
pub fn checked_offset(base: Word, size: usize, addr: Word, len: usize) -> KResult<usize> {
    let offset = addr.checked_sub(base).ok_or(Error::BadAddress)? as usize;
    let end = offset.checked_add(len).ok_or(Error::BadAddress)?;
    if end > size {
        return Err(Error::BadAddress);
    }
    Ok(offset)
}

/// The physical RAM of the target, addressed directly.
///
/// Only meaningful on the target itself, where kernel and threads share one
/// flat address space.
pub struct RawMemory {
    base: Word,
    size: usize,
}

impl RawMemory {
    /// # Safety
    ///
    /// `[base, base + size)` must be valid, writable RAM for the lifetime of
    /// the value and must not overlap kernel-private data.
    pub const unsafe fn new(base: Word, size: usize) -> Self {
        Self { base, size }
    }
}

impl AddressSpace for RawMemory {
    fn read(&self, addr: Word, buf: &mut [u8]) -> KResult<()> {
        checked_offset(self.base, self.size, addr, buf.len())?;
        // SAFETY: the range was bounds-checked against RAM handed to `new`.
        unsafe {
            core::ptr::copy_nonoverlapping(addr as usize as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    fn write(&mut self, addr: Word, data: &[u8]) -> KResult<()> {
        checked_offset(self.base, self.size, addr, data.len())?;
        // SAFETY: as above.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), addr as usize as *mut u8, data.len());
        }
        Ok(())
    }
}
