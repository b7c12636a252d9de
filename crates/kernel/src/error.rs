//! Kernel error taxonomy.
//!
//! Every error here is recoverable: it is reported to the trapping thread as
//! a failure word in its saved `r0` and never affects any other thread.

use core::fmt;

/// Result type used throughout the kernel.
pub type KResult<T> = Result<T, Error>;

/// Failures reported by kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Stale, recycled or out-of-range thread reference.
    InvalidId,
    /// No free thread table slot.
    TableFull,
    /// The caller no longer holds the required capability bit.
    PermissionDenied,
    /// Unknown property selector, read-only property or malformed value.
    InvalidProperty,
    /// Mutex unlock or block free by a thread that does not own it.
    NotOwner,
    /// The destination mailbox already holds a message.
    MailboxFull,
    /// The caller's mailbox is empty.
    MailboxEmpty,
    /// The target thread is not in the state the operation requires.
    NotRunnable,
    /// Unknown syscall number.
    InvalidSyscall,
    /// An argument pointer lies outside addressable memory.
    BadAddress,
    /// The thread heap cannot satisfy the request.
    OutOfMemory,
    /// A file-backed program could not be resolved.
    LoadFailed,
}

impl Error {
    /// Stable numeric code used by the syscall ABI.
    pub const fn code(self) -> u32 {
        match self {
            Error::InvalidId => 0,
            Error::TableFull => 1,
            Error::PermissionDenied => 2,
            Error::InvalidProperty => 3,
            Error::NotOwner => 4,
            Error::MailboxFull => 5,
            Error::MailboxEmpty => 6,
            Error::NotRunnable => 7,
            Error::InvalidSyscall => 8,
            Error::BadAddress => 9,
            Error::OutOfMemory => 10,
            Error::LoadFailed => 11,
        }
    }

    /// Inverse of [`Error::code`].
    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Error::InvalidId,
            1 => Error::TableFull,
            2 => Error::PermissionDenied,
            3 => Error::InvalidProperty,
            4 => Error::NotOwner,
            5 => Error::MailboxFull,
            6 => Error::MailboxEmpty,
            7 => Error::NotRunnable,
            8 => Error::InvalidSyscall,
            9 => Error::BadAddress,
            10 => Error::OutOfMemory,
            11 => Error::LoadFailed,
            _ => return None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidId => write!(f, "invalid thread id"),
            Error::TableFull => write!(f, "thread table is full"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::InvalidProperty => write!(f, "invalid thread property"),
            Error::NotOwner => write!(f, "caller is not the owner"),
            Error::MailboxFull => write!(f, "mailbox is full"),
            Error::MailboxEmpty => write!(f, "mailbox is empty"),
            Error::NotRunnable => write!(f, "thread is not in the required state"),
            Error::InvalidSyscall => write!(f, "invalid syscall number"),
            Error::BadAddress => write!(f, "bad address"),
            Error::OutOfMemory => write!(f, "thread heap exhausted"),
            Error::LoadFailed => write!(f, "program could not be loaded"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::InvalidId => defmt::write!(fmt, "InvalidId"),
            Error::TableFull => defmt::write!(fmt, "TableFull"),
            Error::PermissionDenied => defmt::write!(fmt, "PermissionDenied"),
            Error::InvalidProperty => defmt::write!(fmt, "InvalidProperty"),
            Error::NotOwner => defmt::write!(fmt, "NotOwner"),
            Error::MailboxFull => defmt::write!(fmt, "MailboxFull"),
            Error::MailboxEmpty => defmt::write!(fmt, "MailboxEmpty"),
            Error::NotRunnable => defmt::write!(fmt, "NotRunnable"),
            Error::InvalidSyscall => defmt::write!(fmt, "InvalidSyscall"),
            Error::BadAddress => defmt::write!(fmt, "BadAddress"),
            Error::OutOfMemory => defmt::write!(fmt, "OutOfMemory"),
            Error::LoadFailed => defmt::write!(fmt, "LoadFailed"),
        }
    }
}
