//! Single-slot messaging and signal return.
//!
//! Each thread has a mailbox holding at most one `(sender, message)` pair.
//! Sending to an occupied mailbox fails and leaves it untouched. Signals are
//! raised through the `PendingSignal` property; a newer signal replaces one
//! that has not been delivered yet. Delivery happens in the dispatcher when
//! the thread is resumed with a handler installed and none already running.

use crate::abi::Word;
use crate::error::{Error, KResult};
use crate::kernel::Kernel;
use crate::memory::AddressSpace;
use crate::syscall::Outcome;
use crate::thread::{ThreadId, ThreadState, WaitReason};

impl Kernel {
    pub(crate) fn send_msg(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        dest: Word,
        message: Word,
    ) -> KResult<Word> {
        let dest = self.resolve(caller, dest)?;
        let tcb = self.table.lookup_mut(dest)?;
        if tcb.is_terminal() {
            return Err(Error::NotRunnable);
        }
        if tcb.mailbox.is_some() {
            return Err(Error::MailboxFull);
        }
        tcb.mailbox = Some((caller, message));

        if tcb.state == ThreadState::Waiting(WaitReason::Message) {
            let (sender_ptr, msg_ptr) = (tcb.context.arg(0), tcb.context.arg(1));
            let result = self.take_message(mem, dest, sender_ptr, msg_ptr);
            self.set_result(dest, result);
            if let Ok(tcb) = self.table.lookup_mut(dest) {
                tcb.retry = false;
            }
            self.make_ready(dest);
        }
        Ok(1)
    }

    pub(crate) fn get_msg(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        sender_ptr: Word,
        msg_ptr: Word,
    ) -> KResult<Word> {
        self.take_message(mem, caller, sender_ptr, msg_ptr)
    }

    /// Like `get_msg`, but parks the caller until a message arrives.
    pub(crate) fn wait_msg(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        sender_ptr: Word,
        msg_ptr: Word,
    ) -> Outcome {
        match self.take_message(mem, caller, sender_ptr, msg_ptr) {
            Err(Error::MailboxEmpty) => Outcome::Block {
                reason: WaitReason::Message,
                retry: true,
            },
            result => Outcome::Return(result),
        }
    }

    /// Drains `id`'s mailbox into the given out pointers (0 = discard).
    ///
    /// The mailbox is only emptied once both writes succeeded.
    fn take_message(
        &mut self,
        mem: &mut dyn AddressSpace,
        id: ThreadId,
        sender_ptr: Word,
        msg_ptr: Word,
    ) -> KResult<Word> {
        let tcb = self.table.lookup_mut(id)?;
        let (sender, message) = tcb.mailbox.ok_or(Error::MailboxEmpty)?;
        if sender_ptr != 0 {
            mem.write_word(sender_ptr, sender.raw())?;
        }
        if msg_ptr != 0 {
            mem.write_word(msg_ptr, message)?;
        }
        tcb.mailbox = None;
        Ok(1)
    }

    /// Leaves a signal handler, restoring the interrupted frame.
    pub(crate) fn signal_return(&mut self, caller: ThreadId) -> Outcome {
        match self.table.lookup_mut(caller) {
            Ok(tcb) => match tcb.signal.interrupted.take() {
                Some(frame) => {
                    tcb.context = frame;
                    Outcome::Resume
                }
                None => Outcome::Return(Err(Error::NotRunnable)),
            },
            Err(err) => Outcome::Return(Err(err)),
        }
    }
}
