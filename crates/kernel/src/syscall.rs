//! Syscall decoding and the thread lifecycle calls.
//!
//! The caller's frame has already been saved into its TCB when
//! [`Kernel::execute`] runs, so a call may rewrite the caller's own saved
//! registers; the result word is written into the saved `r0` afterwards.

use crate::abi::{Syscall, Word, YieldMode, TFLAG_FILE, TFLAG_PERM_SHIFT};
use crate::error::{Error, KResult};
use crate::kernel::{Kernel, KernelFlags};
use crate::memory::{offset_by, AddressSpace};
use crate::thread::{
    file_name_from_bytes, name_from_bytes, Permissions, ThreadEntry, ThreadId, ThreadName,
    ThreadState, WaitReason, FILE_NAME_CAPACITY, NAME_CAPACITY,
};

/// What happens to the caller once a call has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Write the result and resume the caller.
    Return(KResult<Word>),
    /// Resume the caller without touching its result register.
    Resume,
    /// Park the caller. With `retry` the call is executed again when the
    /// thread is next selected.
    Block { reason: WaitReason, retry: bool },
    /// Give up the CPU, optionally directly to a ready thread.
    Yield(Option<ThreadId>),
    /// The caller reached a terminal state.
    Retired,
}

impl Kernel {
    /// Executes the call trapped in `caller`'s saved frame.
    pub(crate) fn execute(&mut self, mem: &mut dyn AddressSpace, caller: ThreadId) -> Outcome {
        let frame = match self.table.lookup(caller) {
            Ok(tcb) => tcb.context,
            Err(err) => return Outcome::Return(Err(err)),
        };
        let call = match Syscall::try_from(frame.syscall_number()) {
            Ok(call) => call,
            Err(err) => return Outcome::Return(Err(err)),
        };
        // Registers past the call's arity are not part of the request.
        let mut args = [0 as Word; 4];
        args[..call.arity()].copy_from_slice(&frame.args()[..call.arity()]);
        let [a0, a1, a2, a3] = args;

        match call {
            Syscall::AddThread => Outcome::Return(self.add_thread(mem, caller, a0, a1, a2, a3)),
            Syscall::Yield => self.yield_now(caller, a0, a1),
            Syscall::GetMsg => Outcome::Return(self.get_msg(mem, caller, a0, a1)),
            Syscall::SendMsg => Outcome::Return(self.send_msg(mem, caller, a0, a1)),
            Syscall::GetThreadProperty => {
                Outcome::Return(self.get_property(mem, caller, a0, a1, a2))
            }
            Syscall::SetThreadProperty => {
                Outcome::Return(self.set_property(mem, caller, a0, a1, a2))
            }
            Syscall::ThreadWait => {
                self.set_result(caller, Ok(0));
                Outcome::Block {
                    reason: WaitReason::Wake,
                    retry: false,
                }
            }
            Syscall::ThreadWake => Outcome::Return(self.wake(caller, a0)),
            Syscall::ThreadCancel => self.cancel(mem, caller, a0),
            Syscall::SetKernelConfig => Outcome::Return(self.set_kernel_config(caller, a0, a1)),
            Syscall::GetKernelConfig => Outcome::Return(Ok(self.flags().bits())),
            Syscall::Mutex => self.mutex(mem, caller, a0, a1),
            Syscall::ThreadJoin => self.join(mem, caller, a0, a1),
            Syscall::ThreadExit => {
                self.retire(mem, caller, ThreadState::Finished, a0);
                Outcome::Retired
            }
            Syscall::WaitMsg => self.wait_msg(mem, caller, a0, a1),
            Syscall::Alloc => Outcome::Return(self.heap.alloc(caller, a0)),
            Syscall::Realloc => Outcome::Return(self.heap.realloc(mem, caller, a0, a1)),
            Syscall::Free => Outcome::Return(self.heap.free(caller, a0).map(|()| 1)),
            Syscall::SignalReturn => self.signal_return(caller),
        }
    }

    fn add_thread(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        name_ptr: Word,
        args_ptr: Word,
        entry: Word,
        flags: Word,
    ) -> KResult<Word> {
        let granted = self.table.lookup(caller)?.permissions;

        let mut name = ThreadName::new();
        if name_ptr != 0 {
            let mut buf = [0u8; NAME_CAPACITY];
            let len = mem.read_cstr(name_ptr, &mut buf)?;
            name = name_from_bytes(&buf[..len]);
        }

        let mut args = [0 as Word; 4];
        if args_ptr != 0 {
            for (i, arg) in args.iter_mut().enumerate() {
                *arg = mem.read_word(offset_by(args_ptr, 4 * i)?)?;
            }
        }

        let (entry, entry_addr) = if flags & TFLAG_FILE != 0 {
            if !granted.contains(Permissions::RUN_PROGRAMS) {
                return Err(Error::PermissionDenied);
            }
            let mut buf = [0u8; FILE_NAME_CAPACITY];
            let len = mem.read_cstr(entry, &mut buf)?;
            let file = file_name_from_bytes(&buf[..len]).ok_or(Error::LoadFailed)?;
            let addr = self
                .loader
                .as_ref()
                .and_then(|loader| loader.load(&file))
                .ok_or(Error::LoadFailed)?;
            if name.is_empty() {
                name = name_from_bytes(file.as_bytes());
            }
            (ThreadEntry::File(file), addr)
        } else {
            (ThreadEntry::Function(entry), entry)
        };

        let withheld = Permissions::from_bits_truncate(flags >> TFLAG_PERM_SHIFT);
        let id = self.spawn(name, entry, entry_addr, args, granted - withheld, Some(caller))?;
        Ok(id.raw())
    }

    fn yield_now(&mut self, caller: ThreadId, target: Word, mode: Word) -> Outcome {
        match YieldMode::try_from(mode) {
            Err(err) => Outcome::Return(Err(err)),
            Ok(YieldMode::Any) => Outcome::Yield(None),
            Ok(YieldMode::To) => match self.resolve(caller, target) {
                Err(err) => Outcome::Return(Err(err)),
                Ok(target) => match self.table.lookup(target) {
                    Ok(tcb) if tcb.is_ready() => Outcome::Yield(Some(target)),
                    _ => Outcome::Return(Err(Error::NotRunnable)),
                },
            },
        }
    }

    /// Makes a waiting thread ready. A thread woken out of a blocking call
    /// re-checks its condition before resuming.
    fn wake(&mut self, caller: ThreadId, target: Word) -> KResult<Word> {
        let target = self.resolve(caller, target)?;
        if !self.table.lookup(target)?.state.is_waiting() {
            return Err(Error::NotRunnable);
        }
        self.make_ready(target);
        Ok(1)
    }

    fn cancel(&mut self, mem: &mut dyn AddressSpace, caller: ThreadId, target: Word) -> Outcome {
        let target = match self.resolve(caller, target) {
            Ok(target) => target,
            Err(err) => return Outcome::Return(Err(err)),
        };
        match self.table.lookup(target) {
            Ok(tcb) if !tcb.is_terminal() => {}
            Ok(_) => return Outcome::Return(Err(Error::NotRunnable)),
            Err(err) => return Outcome::Return(Err(err)),
        }
        self.retire(mem, target, ThreadState::Cancelled, caller.raw());
        if target == caller {
            Outcome::Retired
        } else {
            Outcome::Return(Ok(1))
        }
    }

    /// Waits for `target` to finish or be cancelled.
    fn join(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        target: Word,
        state_ptr: Word,
    ) -> Outcome {
        let target = match self.resolve(caller, target) {
            Ok(target) if target == caller => return Outcome::Return(Err(Error::NotRunnable)),
            Ok(target) => target,
            Err(err) => return Outcome::Return(Err(err)),
        };
        let state = match self.table.lookup(target) {
            Ok(tcb) => tcb.state,
            Err(err) => return Outcome::Return(Err(err)),
        };
        if state.is_terminal() {
            return Outcome::Return(Self::report_state(mem, state_ptr, state).map(|()| 1));
        }
        Outcome::Block {
            reason: WaitReason::Join(target),
            retry: true,
        }
    }

    fn set_kernel_config(&mut self, caller: ThreadId, enable: Word, disable: Word) -> KResult<Word> {
        let granted = self.table.lookup(caller)?.permissions;
        if !granted.contains(Permissions::KERNEL_CONFIG) {
            return Err(Error::PermissionDenied);
        }
        let flags = (self.flags() | KernelFlags::from_bits_truncate(enable))
            - KernelFlags::from_bits_truncate(disable);
        self.set_flags(flags);
        Ok(0)
    }
}
