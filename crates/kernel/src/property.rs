//! Thread property access (`get_thread_property` / `set_thread_property`).
//!
//! Writes that touch a thread other than the caller need
//! [`Permissions::ALTER_REGISTERS`], except for raising a signal which any
//! thread may do. Permissions can only be dropped, and only by the thread
//! itself.

use crate::abi::{Property, Word, INVALID_THREAD, THREAD_NAME_SIZE};
use crate::context::RegisterContext;
use crate::error::{Error, KResult};
use crate::kernel::Kernel;
use crate::memory::AddressSpace;
use crate::thread::{id_word, name_from_bytes, Permissions, ThreadId, NAME_CAPACITY};

impl Kernel {
    pub(crate) fn get_property(
        &self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        target: Word,
        property: Word,
        out: Word,
    ) -> KResult<Word> {
        let property = Property::try_from(property)?;
        let target = self.resolve(caller, target)?;
        let tcb = self.table.lookup(target)?;

        match property {
            Property::Id => mem.write_word(out, tcb.id.raw())?,
            Property::Name => {
                let mut buf = [0u8; THREAD_NAME_SIZE];
                let name = tcb.name.as_bytes();
                buf[..name.len()].copy_from_slice(name);
                mem.write(out, &buf)?;
            }
            Property::State => mem.write_word(out, tcb.state.code())?,
            Property::Child => mem.write_word(out, id_word(tcb.child))?,
            Property::Parent => mem.write_word(out, id_word(tcb.parent))?,
            Property::Permissions => mem.write_word(out, tcb.permissions.bits())?,
            Property::Registers => mem.write(out, &tcb.context.to_bytes())?,
            Property::PendingSignal => mem.write_word(out, tcb.signal.pending)?,
            Property::SignalHandler => mem.write_word(out, tcb.signal.handler)?,
        }
        Ok(1)
    }

    pub(crate) fn set_property(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        target: Word,
        property: Word,
        value: Word,
    ) -> KResult<Word> {
        let property = Property::try_from(property)?;
        let target = self.resolve(caller, target)?;
        let granted = self.table.lookup(caller)?.permissions;
        let foreign = target != caller;

        match property {
            Property::Id | Property::State | Property::Parent => {
                return Err(Error::InvalidProperty)
            }
            Property::Permissions if foreign => return Err(Error::PermissionDenied),
            Property::Name | Property::Child | Property::Registers | Property::SignalHandler
                if foreign && !granted.contains(Permissions::ALTER_REGISTERS) =>
            {
                return Err(Error::PermissionDenied)
            }
            _ => {}
        }
        if self.table.lookup(target)?.is_terminal() {
            return Err(Error::NotRunnable);
        }

        match property {
            Property::Name => {
                let mut buf = [0u8; NAME_CAPACITY];
                let len = mem.read_cstr(value, &mut buf)?;
                self.table.lookup_mut(target)?.name = name_from_bytes(&buf[..len]);
            }
            Property::Child => {
                let child = match mem.read_word(value)? {
                    INVALID_THREAD => None,
                    raw => Some(self.resolve(caller, raw)?),
                };
                self.table.lookup_mut(target)?.child = child;
            }
            Property::Permissions => {
                let remove = Permissions::from_bits_truncate(mem.read_word(value)?);
                let tcb = self.table.lookup_mut(target)?;
                tcb.drop_permissions(remove);
            }
            Property::Registers => {
                let mut image = [0u8; RegisterContext::BYTES];
                mem.read(value, &mut image)?;
                let tcb = self.table.lookup_mut(target)?;
                tcb.context = RegisterContext::from_bytes(&image);
                tcb.retry = false;
            }
            Property::PendingSignal => {
                let signal = mem.read_word(value)?;
                self.table.lookup_mut(target)?.signal.pending = signal;
            }
            Property::SignalHandler => {
                let handler = mem.read_word(value)?;
                self.table.lookup_mut(target)?.signal.handler = handler;
            }
            Property::Id | Property::State | Property::Parent => {
                return Err(Error::InvalidProperty)
            }
        }
        Ok(1)
    }
}
