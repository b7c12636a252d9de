//! The view a routine step has of its thread.

use amt_kernel::abi::decode_result;
use amt_kernel::{AddressSpace, KResult, RegisterContext, Syscall, ThreadId, Word};

use crate::code::{CodeSpace, Step};
use crate::console::Console;
use crate::ram::Ram;

pub struct Cpu<'a> {
    thread: ThreadId,
    base: Word,
    regs: &'a mut RegisterContext,
    ram: &'a mut Ram,
    console: &'a mut Console,
    code: &'a CodeSpace,
}

impl<'a> Cpu<'a> {
    pub(crate) fn new(
        thread: ThreadId,
        base: Word,
        regs: &'a mut RegisterContext,
        ram: &'a mut Ram,
        console: &'a mut Console,
        code: &'a CodeSpace,
    ) -> Self {
        Self {
            thread,
            base,
            regs,
            ram,
            console,
            code,
        }
    }

    /// Thread executing this step.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Current label inside the routine.
    pub fn label(&self) -> Word {
        (self.regs.pc - self.base) / 4
    }

    /// Continues at `label` on the next step.
    pub fn goto(&mut self, label: Word) {
        self.regs.pc = self.base + label * 4;
    }

    /// Jumps to `label` and keeps running.
    pub fn jump(&mut self, label: Word) -> Step {
        self.goto(label);
        Step::Continue
    }

    pub fn reg(&self, index: usize) -> Word {
        self.regs.r[index]
    }

    pub fn set_reg(&mut self, index: usize, value: Word) {
        self.regs.r[index] = value;
    }

    pub fn sp(&self) -> Word {
        self.regs.sp
    }

    /// Result of the last syscall, decoded from `r0`.
    pub fn result(&self) -> KResult<Word> {
        decode_result(self.regs.r[0])
    }

    /// Traps with `call`, resuming at `next` once the kernel returns.
    pub fn syscall(&mut self, next: Word, call: Syscall, args: [Word; 4]) -> Step {
        self.goto(next);
        Step::Syscall(call, args)
    }

    /// Returns `value` to the caller in `lr`.
    pub fn ret(&mut self, value: Word) -> Step {
        self.regs.r[0] = value;
        Step::Return
    }

    /// Reserves `size` bytes on the thread's stack.
    pub fn alloca(&mut self, size: Word) -> Word {
        let size = (size + 7) & !7;
        self.regs.sp = self.regs.sp.saturating_sub(size);
        self.regs.sp
    }

    /// Copies a NUL-terminated string onto the stack. A stack that cannot
    /// hold it yields address 0, which syscalls reject.
    pub fn push_str(&mut self, text: &str) -> Word {
        let addr = self.alloca(text.len() as Word + 1);
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        match self.ram.write(addr, &bytes) {
            Ok(()) => addr,
            Err(_) => 0,
        }
    }

    pub fn ram(&mut self) -> &mut Ram {
        &mut *self.ram
    }

    pub fn read_word(&self, addr: Word) -> KResult<Word> {
        self.ram.read_word(addr)
    }

    pub fn write_word(&mut self, addr: Word, value: Word) -> KResult<()> {
        self.ram.write_word(addr, value)
    }

    /// Address of a placed routine, or 0.
    pub fn symbol(&self, name: &str) -> Word {
        self.code.address_of(name).unwrap_or(0)
    }

    /// Writes a line to the machine console.
    pub fn log(&mut self, text: impl Into<String>) {
        self.console.write(self.thread, text.into());
    }
}
