//! Kernel event reporting.
//!
//! Scheduler and thread lifecycle events are reported only while the
//! matching [`KernelFlags`] bit is set. An enabled event goes to the `log`
//! facade and, when a [`TraceHook`] is installed, out as a binary record.

#[cfg(feature = "trace")]
pub use amt_trace::{TraceError, TraceHook};

#[cfg(not(feature = "trace"))]
use alloc::sync::Arc;

#[cfg(not(feature = "trace"))]
pub type TraceError = core::convert::Infallible;

#[cfg(not(feature = "trace"))]
pub type TraceHook = Arc<dyn Fn(u8, &[u8], bool) -> Result<(), TraceError> + Send + Sync>;

#[cfg(feature = "trace")]
pub(crate) use amt_trace::records::{dict, sched, thread};

#[cfg(not(feature = "trace"))]
pub(crate) mod sched {
    pub const NEXT: u8 = 50;
    pub const IDLE: u8 = 51;
    pub const YIELD: u8 = 52;
    pub const PREEMPT: u8 = 53;
    pub const HALT: u8 = 54;
}

#[cfg(not(feature = "trace"))]
pub(crate) mod thread {
    pub const CREATE: u8 = 70;
    pub const FINISH: u8 = 71;
    pub const CANCEL: u8 = 72;
    pub const BLOCK: u8 = 73;
    pub const WAKE: u8 = 74;
    pub const SIGNAL: u8 = 75;
    pub const RECLAIM: u8 = 76;
}

#[cfg(not(feature = "trace"))]
pub(crate) mod dict {
    pub const THREAD: u8 = 61;
}

use core::fmt;

use crate::abi::Word;
use crate::kernel::KernelFlags;
use crate::thread::ThreadId;

const MAX_PAYLOAD: usize = 32;

/// Routes kernel events to `log` and the optional trace hook.
#[derive(Clone, Default)]
pub(crate) struct Observer {
    pub(crate) flags: KernelFlags,
    pub(crate) hook: Option<TraceHook>,
}

impl Observer {
    pub(crate) fn new(flags: KernelFlags, hook: Option<TraceHook>) -> Self {
        Self { flags, hook }
    }

    /// Reports a scheduler event with a payload of little-endian words.
    pub(crate) fn sched(&self, record: u8, words: &[Word], args: fmt::Arguments<'_>) {
        if self.flags.contains(KernelFlags::LOG_SCHEDULER) {
            log::debug!(target: "amt::sched", "{}", args);
            self.emit_words(record, words);
        }
    }

    /// Reports a thread lifecycle event.
    pub(crate) fn thread(&self, record: u8, words: &[Word], args: fmt::Arguments<'_>) {
        if self.flags.contains(KernelFlags::LOG_THREADS) {
            log::info!(target: "amt::thread", "{}", args);
            self.emit_words(record, words);
        }
    }

    /// Binds a thread id to its name for host-side decoders.
    pub(crate) fn dictionary(&self, id: ThreadId, name: &str) {
        if !self.flags.contains(KernelFlags::LOG_THREADS) {
            return;
        }
        if let Some(hook) = &self.hook {
            let mut buf = [0u8; MAX_PAYLOAD];
            buf[..4].copy_from_slice(&id.raw().to_le_bytes());
            let len = name.len().min(MAX_PAYLOAD - 5);
            buf[4..4 + len].copy_from_slice(&name.as_bytes()[..len]);
            let _ = hook(dict::THREAD, &buf[..len + 5], false);
        }
    }

    fn emit_words(&self, record: u8, words: &[Word]) {
        if let Some(hook) = &self.hook {
            let mut buf = [0u8; MAX_PAYLOAD];
            let mut pos = 0;
            for word in words.iter().take(MAX_PAYLOAD / 4) {
                buf[pos..pos + 4].copy_from_slice(&word.to_le_bytes());
                pos += 4;
            }
            let _ = hook(record, &buf[..pos], true);
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("flags", &self.flags)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
