//! The fixed syscall ABI shared by the kernel and user code.
//!
//! A syscall traps with its number in `r7` and up to four argument words in
//! `r0..r3`. The single result word is written back into the saved `r0`.
//! Failures come back as negative words (high bit set) carrying an
//! [`Error`] code; see [`encode_result`] and [`decode_result`].

use crate::error::{Error, KResult};

/// Machine word of the 32-bit target.
pub type Word = u32;

/// Selects the calling thread wherever a thread id is expected.
pub const CURRENT_THREAD: Word = 0xFFFF_FFFF;
/// "No thread" id, used as the target of an untargeted yield.
pub const INVALID_THREAD: Word = 0xFFFF_FFFE;

/// Size in bytes of a thread name buffer, including the terminating NUL.
pub const THREAD_NAME_SIZE: usize = 12;

/// `add_thread` flag: the entry word is a pointer to a file name.
pub const TFLAG_FILE: Word = 1 << 0;
/// Bits at and above this shift in the `add_thread` flags are permissions
/// to withhold from the new thread.
pub const TFLAG_PERM_SHIFT: u32 = 16;

/// Register holding the syscall number.
pub const SYSCALL_NUMBER_REG: usize = 7;

/// Syscall numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    AddThread = 0,
    Yield = 1,
    GetMsg = 2,
    SendMsg = 3,
    GetThreadProperty = 4,
    SetThreadProperty = 5,
    ThreadWait = 6,
    ThreadWake = 7,
    ThreadCancel = 8,
    SetKernelConfig = 9,
    GetKernelConfig = 10,
    Mutex = 11,
    ThreadJoin = 12,
    ThreadExit = 13,
    WaitMsg = 14,
    Alloc = 15,
    Realloc = 16,
    Free = 17,
    SignalReturn = 18,
}

impl Syscall {
    /// Number of argument words the call consumes.
    pub const fn arity(self) -> usize {
        match self {
            Syscall::ThreadWait | Syscall::GetKernelConfig | Syscall::SignalReturn => 0,
            Syscall::ThreadWake
            | Syscall::ThreadCancel
            | Syscall::ThreadExit
            | Syscall::Alloc
            | Syscall::Free => 1,
            Syscall::Yield
            | Syscall::GetMsg
            | Syscall::SendMsg
            | Syscall::SetKernelConfig
            | Syscall::Mutex
            | Syscall::ThreadJoin
            | Syscall::WaitMsg
            | Syscall::Realloc => 2,
            Syscall::GetThreadProperty | Syscall::SetThreadProperty => 3,
            Syscall::AddThread => 4,
        }
    }
}

impl TryFrom<Word> for Syscall {
    type Error = Error;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Syscall::AddThread,
            1 => Syscall::Yield,
            2 => Syscall::GetMsg,
            3 => Syscall::SendMsg,
            4 => Syscall::GetThreadProperty,
            5 => Syscall::SetThreadProperty,
            6 => Syscall::ThreadWait,
            7 => Syscall::ThreadWake,
            8 => Syscall::ThreadCancel,
            9 => Syscall::SetKernelConfig,
            10 => Syscall::GetKernelConfig,
            11 => Syscall::Mutex,
            12 => Syscall::ThreadJoin,
            13 => Syscall::ThreadExit,
            14 => Syscall::WaitMsg,
            15 => Syscall::Alloc,
            16 => Syscall::Realloc,
            17 => Syscall::Free,
            18 => Syscall::SignalReturn,
            _ => return Err(Error::InvalidSyscall),
        })
    }
}

/// Thread properties addressable through get/set_thread_property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Property {
    /// Thread id (read-only, one word).
    Id = 0,
    /// NUL-terminated name, [`THREAD_NAME_SIZE`] bytes when read.
    Name = 1,
    /// State code (read-only, one word).
    State = 2,
    /// Child link (one word, [`INVALID_THREAD`] when unset).
    Child = 3,
    /// Permission bits. Writing removes the given bits from the caller.
    Permissions = 4,
    /// Full saved register context.
    Registers = 5,
    /// Pending signal (0 = none). Writing raises a signal on the target.
    PendingSignal = 6,
    /// Signal handler code address (0 = none).
    SignalHandler = 7,
    /// Creator of the thread (read-only, [`INVALID_THREAD`] for the first).
    Parent = 8,
}

impl TryFrom<Word> for Property {
    type Error = Error;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Property::Id,
            1 => Property::Name,
            2 => Property::State,
            3 => Property::Child,
            4 => Property::Permissions,
            5 => Property::Registers,
            6 => Property::PendingSignal,
            7 => Property::SignalHandler,
            8 => Property::Parent,
            _ => return Err(Error::InvalidProperty),
        })
    }
}

/// Second argument of the yield call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldMode {
    /// Give up the CPU to the next ready thread in rotation.
    Any,
    /// Hand the CPU directly to a specific ready thread.
    To,
}

impl YieldMode {
    pub const ANY: Word = 0;
    pub const TO: Word = 1;
}

impl TryFrom<Word> for YieldMode {
    type Error = Error;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        match value {
            Self::ANY => Ok(YieldMode::Any),
            Self::TO => Ok(YieldMode::To),
            _ => Err(Error::InvalidProperty),
        }
    }
}

/// First argument of the mutex call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexOp {
    Init,
    Lock,
    Unlock,
}

impl MutexOp {
    pub const INIT: Word = 0;
    pub const LOCK: Word = 1;
    pub const UNLOCK: Word = 2;
}

impl TryFrom<Word> for MutexOp {
    type Error = Error;

    fn try_from(value: Word) -> Result<Self, Self::Error> {
        match value {
            Self::INIT => Ok(MutexOp::Init),
            Self::LOCK => Ok(MutexOp::Lock),
            Self::UNLOCK => Ok(MutexOp::Unlock),
            _ => Err(Error::InvalidProperty),
        }
    }
}

/// Encodes a kernel result into the word returned to user code.
pub const fn encode_result(result: KResult<Word>) -> Word {
    match result {
        Ok(value) => value,
        Err(err) => (-(err.code() as i32) - 1) as Word,
    }
}

/// Decodes a syscall return word.
pub const fn decode_result(word: Word) -> KResult<Word> {
    if word & 0x8000_0000 == 0 {
        return Ok(word);
    }
    let code = (-(word as i32) - 1) as u32;
    match Error::from_code(code) {
        Some(err) => Err(err),
        None => Err(Error::InvalidSyscall),
    }
}
