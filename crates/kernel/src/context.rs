//! Saved execution context of a thread.

use crate::abi::{Word, SYSCALL_NUMBER_REG};

/// Number of general purpose registers in the saved frame.
pub const GENERAL_REGISTERS: usize = 13;

/// Opaque, fixed-size register snapshot.
///
/// The layout follows a 32-bit ARM-style core: thirteen general purpose
/// registers followed by the stack pointer, link register, program counter
/// and status word. The kernel only interprets the argument/result registers,
/// the syscall number register, `lr` and `pc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterContext {
    pub r: [Word; GENERAL_REGISTERS],
    pub sp: Word,
    pub lr: Word,
    pub pc: Word,
    pub xpsr: Word,
}

impl RegisterContext {
    /// Size of the context in words, as copied through the registers property.
    pub const WORDS: usize = GENERAL_REGISTERS + 4;
    /// Size of the context in bytes.
    pub const BYTES: usize = Self::WORDS * 4;

    /// Builds the initial context of a new thread: arguments in `r0..r3`,
    /// execution starting at `entry` and returning into `exit_trampoline`.
    pub fn for_entry(entry: Word, args: [Word; 4], stack_top: Word, exit_trampoline: Word) -> Self {
        let mut ctx = Self::default();
        ctx.r[..4].copy_from_slice(&args);
        ctx.sp = stack_top;
        ctx.lr = exit_trampoline;
        ctx.pc = entry;
        ctx
    }

    /// Syscall number carried by a trapping frame.
    pub fn syscall_number(&self) -> Word {
        self.r[SYSCALL_NUMBER_REG]
    }

    /// Syscall argument `index` (0..4).
    pub fn arg(&self, index: usize) -> Word {
        self.r[index]
    }

    /// All four argument registers.
    pub fn args(&self) -> [Word; 4] {
        [self.r[0], self.r[1], self.r[2], self.r[3]]
    }

    /// Writes the syscall result into the return-value slot.
    pub fn set_result(&mut self, value: Word) {
        self.r[0] = value;
    }

    pub fn result(&self) -> Word {
        self.r[0]
    }

    /// Serialises the context as little-endian words.
    pub fn to_bytes(&self) -> [u8; Self::BYTES] {
        let mut out = [0u8; Self::BYTES];
        for (chunk, word) in out.chunks_exact_mut(4).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Inverse of [`RegisterContext::to_bytes`].
    pub fn from_bytes(bytes: &[u8; Self::BYTES]) -> Self {
        let mut words = [0 as Word; Self::WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = Word::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let mut ctx = Self::default();
        ctx.r.copy_from_slice(&words[..GENERAL_REGISTERS]);
        ctx.sp = words[GENERAL_REGISTERS];
        ctx.lr = words[GENERAL_REGISTERS + 1];
        ctx.pc = words[GENERAL_REGISTERS + 2];
        ctx.xpsr = words[GENERAL_REGISTERS + 3];
        ctx
    }

    fn words(&self) -> impl Iterator<Item = Word> + '_ {
        self.r
            .iter()
            .copied()
            .chain([self.sp, self.lr, self.pc, self.xpsr])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_context_places_arguments() {
        let ctx = RegisterContext::for_entry(0x100, [1, 2, 3, 4], 0x2000, 0x40);
        assert_eq!(ctx.args(), [1, 2, 3, 4]);
        assert_eq!(ctx.pc, 0x100);
        assert_eq!(ctx.lr, 0x40);
        assert_eq!(ctx.sp, 0x2000);
    }

    #[test]
    fn byte_image_preserves_pc() {
        let mut ctx = RegisterContext::default();
        ctx.pc = 0xDEAD_BEEE;
        ctx.r[12] = 7;
        let image = ctx.to_bytes();
        assert_eq!(&image[15 * 4..16 * 4], &0xDEAD_BEEEu32.to_le_bytes());
        assert_eq!(RegisterContext::from_bytes(&image), ctx);
    }
}
