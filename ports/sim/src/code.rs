//! Simulated code memory.
//!
//! Programs are Rust routines placed at fixed addresses. A routine is a
//! small state machine: the program counter's offset inside the routine is
//! its *label*, and every invocation executes one step from that label.
//! Locals that must survive a syscall live in `r4..r12`.

use std::collections::HashMap;

use amt_kernel::{Syscall, Word};

use crate::cpu::Cpu;
use crate::error::SimError;

/// Start of the code region.
pub const CODE_BASE: Word = 0x0800_0000;
/// Bytes reserved per routine; labels are word offsets inside it.
pub const ROUTINE_SPAN: Word = 0x100;

const EXIT_TRAMPOLINE: &str = "__thread_exit";
const SIGNAL_TRAMPOLINE: &str = "__signal_return";

/// One simulated instruction step.
pub type Routine = fn(&mut Cpu<'_>) -> Step;

/// What a routine step asks the machine to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep running the current thread.
    Continue,
    /// Trap into the kernel.
    Syscall(Syscall, [Word; 4]),
    /// Jump to the address in `lr`.
    Return,
    /// Execute an invalid instruction.
    Fault,
}

pub struct CodeSpace {
    routines: Vec<(String, Routine)>,
    symbols: HashMap<String, Word>,
}

fn exit_trampoline(cpu: &mut Cpu<'_>) -> Step {
    Step::Syscall(Syscall::ThreadExit, [cpu.reg(0), 0, 0, 0])
}

fn signal_trampoline(_cpu: &mut Cpu<'_>) -> Step {
    Step::Syscall(Syscall::SignalReturn, [0; 4])
}

impl CodeSpace {
    /// Creates a code space holding only the kernel trampolines.
    pub fn new() -> Self {
        let mut code = Self {
            routines: Vec::new(),
            symbols: HashMap::new(),
        };
        code.insert(EXIT_TRAMPOLINE, exit_trampoline);
        code.insert(SIGNAL_TRAMPOLINE, signal_trampoline);
        code
    }

    fn insert(&mut self, name: &str, routine: Routine) -> Word {
        let addr = CODE_BASE + self.routines.len() as Word * ROUTINE_SPAN;
        self.routines.push((name.to_owned(), routine));
        self.symbols.insert(name.to_owned(), addr);
        addr
    }

    /// Places `routine` under `name` and returns its entry address.
    pub fn register(&mut self, name: &str, routine: Routine) -> Result<Word, SimError> {
        if self.symbols.contains_key(name) {
            return Err(SimError::DuplicateSymbol(name.to_owned()));
        }
        Ok(self.insert(name, routine))
    }

    pub fn address_of(&self, name: &str) -> Option<Word> {
        self.symbols.get(name).copied()
    }

    /// Name of the routine containing `addr`.
    pub fn symbol_at(&self, addr: Word) -> Option<&str> {
        let index = addr.checked_sub(CODE_BASE)? / ROUTINE_SPAN;
        self.routines.get(index as usize).map(|(name, _)| name.as_str())
    }

    pub fn exit_trampoline(&self) -> Word {
        CODE_BASE
    }

    pub fn signal_trampoline(&self) -> Word {
        CODE_BASE + ROUTINE_SPAN
    }

    /// Routine and routine base for a program counter, if `pc` points at a
    /// word inside a placed routine.
    pub fn resolve(&self, pc: Word) -> Option<(Routine, Word)> {
        if pc % 4 != 0 {
            return None;
        }
        let index = pc.checked_sub(CODE_BASE)? / ROUTINE_SPAN;
        let (_, routine) = self.routines.get(index as usize)?;
        Some((*routine, CODE_BASE + index * ROUTINE_SPAN))
    }

    /// Program resolver handed to the kernel for file-backed threads. Every
    /// placed routine except the trampolines is loadable by name.
    pub fn loader(&self) -> impl Fn(&str) -> Option<Word> + Send + 'static {
        let programs: HashMap<String, Word> = self
            .symbols
            .iter()
            .filter(|(name, _)| !name.starts_with("__"))
            .map(|(name, addr)| (name.clone(), *addr))
            .collect();
        move |name: &str| programs.get(name).copied()
    }
}

impl Default for CodeSpace {
    fn default() -> Self {
        Self::new()
    }
}
