//! Per-thread memory allocator.
//!
//! A bump pointer carves fresh blocks from the top of the heap region; freed
//! blocks go back on a first-fit free list and are coalesced with free
//! neighbours. Every live block records the thread that owns it so that the
//! whole set can be released at once when that thread ends.

use alloc::vec::Vec;

use crate::abi::Word;
use crate::error::{Error, KResult};
use crate::memory::AddressSpace;
use crate::thread::ThreadId;

/// Allocation granule and alignment in bytes.
pub const ALIGN: Word = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    addr: Word,
    size: Word,
    owner: Option<ThreadId>,
}

impl Block {
    fn end(&self) -> Word {
        self.addr + self.size
    }

    fn is_free(&self) -> bool {
        self.owner.is_none()
    }
}

/// Heap usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the heap region in bytes.
    pub capacity: usize,
    /// Bytes currently held by live blocks.
    pub used: usize,
    /// Largest value `used` has reached.
    pub peak: usize,
    /// Number of live blocks.
    pub live_blocks: usize,
}

impl HeapStats {
    fn on_alloc(&mut self, size: Word) {
        self.used += size as usize;
        self.live_blocks += 1;
        if self.used > self.peak {
            self.peak = self.used;
        }
    }

    fn on_free(&mut self, size: Word) {
        self.used -= size as usize;
        self.live_blocks -= 1;
    }
}

/// Heap whose blocks are attributed to threads.
#[derive(Debug)]
pub struct ThreadHeap {
    base: Word,
    limit: Word,
    top: Word,
    /// Blocks covering `[base, top)`, sorted by address.
    blocks: Vec<Block>,
    stats: HeapStats,
}

fn round_up(size: Word) -> KResult<Word> {
    let size = size.max(1);
    size.checked_add(ALIGN - 1)
        .map(|s| s & !(ALIGN - 1))
        .ok_or(Error::OutOfMemory)
}

impl ThreadHeap {
    /// Creates a heap over `[base, base + size)`; `base` is rounded up to
    /// [`ALIGN`]. Address 0 is the null block of the ABI and is never handed
    /// out, so a region starting there loses its first granule.
    pub fn new(base: Word, size: usize) -> Self {
        let limit = base.saturating_add(Word::try_from(size).unwrap_or(Word::MAX));
        let aligned = base
            .max(ALIGN)
            .checked_add(ALIGN - 1)
            .map_or(limit, |b| (b & !(ALIGN - 1)).min(limit));
        Self {
            base: aligned,
            limit,
            top: aligned,
            blocks: Vec::new(),
            stats: HeapStats {
                capacity: (limit - aligned) as usize,
                ..HeapStats::default()
            },
        }
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// Bytes currently owned by `owner`.
    pub fn owned_by(&self, owner: ThreadId) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.owner == Some(owner))
            .map(|b| b.size as usize)
            .sum()
    }

    /// Owner of the live block starting at `addr`, if any.
    pub fn owner_of(&self, addr: Word) -> Option<ThreadId> {
        self.find(addr).and_then(|i| self.blocks[i].owner)
    }

    /// Allocates at least `size` bytes for `owner`.
    pub fn alloc(&mut self, owner: ThreadId, size: Word) -> KResult<Word> {
        let need = round_up(size)?;

        if let Some(index) = self.blocks.iter().position(|b| b.is_free() && b.size >= need) {
            self.split(index, need);
            let block = &mut self.blocks[index];
            block.owner = Some(owner);
            let (addr, size) = (block.addr, block.size);
            self.stats.on_alloc(size);
            return Ok(addr);
        }

        let end = self.top.checked_add(need).ok_or(Error::OutOfMemory)?;
        if end > self.limit {
            return Err(Error::OutOfMemory);
        }
        let addr = self.top;
        self.blocks.push(Block {
            addr,
            size: need,
            owner: Some(owner),
        });
        self.top = end;
        self.stats.on_alloc(need);
        Ok(addr)
    }

    /// Releases the block at `addr`, which `owner` must own.
    ///
    /// Freeing address 0 is a no-op.
    pub fn free(&mut self, owner: ThreadId, addr: Word) -> KResult<()> {
        if addr == 0 {
            return Ok(());
        }
        let index = self.owned_index(owner, addr)?;
        self.release(index);
        self.compact();
        Ok(())
    }

    /// Resizes the block at `addr`, moving it (and its contents) if it cannot
    /// grow in place. `addr == 0` allocates; `size == 0` frees and returns 0.
    pub fn realloc(
        &mut self,
        mem: &mut dyn AddressSpace,
        owner: ThreadId,
        addr: Word,
        size: Word,
    ) -> KResult<Word> {
        if addr == 0 {
            return self.alloc(owner, size);
        }
        if size == 0 {
            self.free(owner, addr)?;
            return Ok(0);
        }

        let index = self.owned_index(owner, addr)?;
        let need = round_up(size)?;
        let current = self.blocks[index].size;

        if need <= current {
            self.stats.on_free(current);
            self.split(index, need);
            self.stats.on_alloc(need);
            self.compact();
            return Ok(addr);
        }

        // Absorb a free successor.
        if let Some(next) = self.blocks.get(index + 1).copied() {
            if next.is_free() && current + next.size >= need {
                self.blocks.remove(index + 1);
                self.stats.on_free(current);
                self.blocks[index].size = current + next.size;
                self.split(index, need);
                self.stats.on_alloc(need);
                return Ok(addr);
            }
        }

        // Grow the last block into untouched space.
        if index + 1 == self.blocks.len() {
            let end = addr.checked_add(need).ok_or(Error::OutOfMemory)?;
            if end <= self.limit {
                self.stats.on_free(current);
                self.blocks[index].size = need;
                self.top = end;
                self.stats.on_alloc(need);
                return Ok(addr);
            }
        }

        let moved = self.alloc(owner, size)?;
        if let Err(err) = mem.copy_within(addr, moved, current as usize) {
            self.free(owner, moved)?;
            return Err(err);
        }
        self.free(owner, addr)?;
        Ok(moved)
    }

    /// Releases every block owned by `owner`; returns how many were freed.
    pub fn free_all(&mut self, owner: ThreadId) -> usize {
        let mut freed = 0;
        for index in 0..self.blocks.len() {
            if self.blocks[index].owner == Some(owner) {
                self.release(index);
                freed += 1;
            }
        }
        self.compact();
        freed
    }

    fn find(&self, addr: Word) -> Option<usize> {
        self.blocks.binary_search_by_key(&addr, |b| b.addr).ok()
    }

    fn owned_index(&self, owner: ThreadId, addr: Word) -> KResult<usize> {
        let index = self.find(addr).ok_or(Error::BadAddress)?;
        match self.blocks[index].owner {
            None => Err(Error::BadAddress),
            Some(holder) if holder != owner => Err(Error::NotOwner),
            Some(_) => Ok(index),
        }
    }

    fn release(&mut self, index: usize) {
        let block = &mut self.blocks[index];
        block.owner = None;
        let size = block.size;
        self.stats.on_free(size);
    }

    /// Shrinks block `index` to `size` bytes, inserting the remainder as a
    /// free block when it is at least one granule.
    fn split(&mut self, index: usize, size: Word) {
        let block = self.blocks[index];
        if block.size - size >= ALIGN {
            self.blocks[index].size = size;
            self.blocks.insert(
                index + 1,
                Block {
                    addr: block.addr + size,
                    size: block.size - size,
                    owner: None,
                },
            );
        }
    }

    /// Merges adjacent free blocks and returns trailing free space to the
    /// bump region.
    fn compact(&mut self) {
        let mut merged: Vec<Block> = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.is_free() && block.is_free() && prev.end() == block.addr => {
                    prev.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        while let Some(last) = merged.last() {
            if !last.is_free() {
                break;
            }
            self.top = last.addr;
            merged.pop();
        }
        if merged.is_empty() {
            self.top = self.base;
        }
        self.blocks = merged;
    }
}
