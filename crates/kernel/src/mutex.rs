//! Blocking mutexes living in user memory.
//!
//! A mutex is two words, `[locked, owner]`. `lock` either takes it or parks
//! the caller in `Waiting(Mutex(addr))`; a parked thread retries the lock
//! every time it is selected, so being woken only means "try again".
//! `unlock` is reserved to the owner and wakes one waiter, picked in
//! rotation order after the unlocking thread.

use crate::abi::{MutexOp, Word, INVALID_THREAD};
use crate::error::{Error, KResult};
use crate::kernel::Kernel;
use crate::memory::AddressSpace;
use crate::scheduler::rotation;
use crate::syscall::Outcome;
use crate::thread::{ThreadId, ThreadState, WaitReason};

const UNLOCKED: Word = 0;
const LOCKED: Word = 1;
const OWNER_OFFSET: Word = 4;

impl Kernel {
    pub(crate) fn mutex(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        op: Word,
        addr: Word,
    ) -> Outcome {
        let op = match MutexOp::try_from(op) {
            Ok(op) => op,
            Err(err) => return Outcome::Return(Err(err)),
        };
        match op {
            MutexOp::Init => Outcome::Return(init(mem, addr).map(|()| 1)),
            MutexOp::Lock => match try_lock(mem, caller, addr) {
                Ok(true) => Outcome::Return(Ok(1)),
                Ok(false) => Outcome::Block {
                    reason: WaitReason::Mutex(addr),
                    retry: true,
                },
                Err(err) => Outcome::Return(Err(err)),
            },
            MutexOp::Unlock => Outcome::Return(self.unlock(mem, caller, addr)),
        }
    }

    fn unlock(&mut self, mem: &mut dyn AddressSpace, caller: ThreadId, addr: Word) -> KResult<Word> {
        let locked = mem.read_word(addr)?;
        let owner = mem.read_word(owner_word(addr)?)?;
        if locked == UNLOCKED || owner != caller.raw() {
            return Err(Error::NotOwner);
        }
        init(mem, addr)?;

        let waiting = ThreadState::Waiting(WaitReason::Mutex(addr));
        let next = rotation(&self.table, Some(caller))
            .into_iter()
            .find(|id| self.table.lookup(*id).map(|t| t.state == waiting).unwrap_or(false));
        if let Some(id) = next {
            self.make_ready(id);
        }
        Ok(1)
    }
}

fn owner_word(addr: Word) -> KResult<Word> {
    addr.checked_add(OWNER_OFFSET).ok_or(Error::BadAddress)
}

fn init(mem: &mut dyn AddressSpace, addr: Word) -> KResult<()> {
    let owner = owner_word(addr)?;
    mem.write_word(addr, UNLOCKED)?;
    mem.write_word(owner, INVALID_THREAD)
}

/// Takes the mutex if it is free; `Ok(false)` means it is held.
fn try_lock(mem: &mut dyn AddressSpace, caller: ThreadId, addr: Word) -> KResult<bool> {
    // Validate the owner word before changing anything.
    let owner = owner_word(addr)?;
    mem.read_word(owner)?;
    if mem.read_word(addr)? != UNLOCKED {
        return Ok(false);
    }
    mem.write_word(addr, LOCKED)?;
    mem.write_word(owner, caller.raw())?;
    Ok(true)
}
