//! Thread control blocks and the thread state machine.
//!
//! A thread moves `Ready -> Running` when selected, back to `Ready` when it
//! yields or is preempted, into `Waiting(..)` when a call blocks and out again
//! when the awaited condition holds. `Finished` and `Cancelled` are terminal.

use core::fmt;

use bitflags::bitflags;

use crate::abi::{Word, INVALID_THREAD, THREAD_NAME_SIZE};
use crate::context::RegisterContext;

/// Longest thread name, excluding the NUL terminator of the ABI buffer.
pub const NAME_CAPACITY: usize = THREAD_NAME_SIZE - 1;
/// Longest program file name accepted for file-backed threads.
pub const FILE_NAME_CAPACITY: usize = 32;

pub type ThreadName = heapless::String<NAME_CAPACITY>;
pub type FileName = heapless::String<FILE_NAME_CAPACITY>;

/// Thread identifier. Assigned in strictly increasing order, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub const fn raw(self) -> Word {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Writes an optional id as an ABI word.
pub fn id_word(id: Option<ThreadId>) -> Word {
    id.map_or(INVALID_THREAD, ThreadId::raw)
}

/// What a waiting thread is blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Parked by `thread_wait` until `thread_wake`.
    Wake,
    /// Contending for the mutex at this address.
    Mutex(Word),
    /// Waiting for a message to arrive in its mailbox.
    Message,
    /// Waiting for the given thread to finish or be cancelled.
    Join(ThreadId),
}

/// Thread execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Waiting(WaitReason),
    Finished,
    Cancelled,
}

impl ThreadState {
    /// State code reported through the `State` property.
    pub const fn code(self) -> Word {
        match self {
            ThreadState::Ready => 0,
            ThreadState::Running => 1,
            ThreadState::Waiting(WaitReason::Wake) => 2,
            ThreadState::Waiting(WaitReason::Mutex(_)) => 3,
            ThreadState::Waiting(WaitReason::Message) => 4,
            ThreadState::Waiting(WaitReason::Join(_)) => 5,
            ThreadState::Finished => 6,
            ThreadState::Cancelled => 7,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ThreadState::Finished | ThreadState::Cancelled)
    }

    pub const fn is_waiting(self) -> bool {
        matches!(self, ThreadState::Waiting(_))
    }
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadState::Ready => write!(f, "ready"),
            ThreadState::Running => write!(f, "running"),
            ThreadState::Waiting(WaitReason::Wake) => write!(f, "waiting"),
            ThreadState::Waiting(WaitReason::Mutex(addr)) => {
                write!(f, "waiting on mutex {addr:#010x}")
            }
            ThreadState::Waiting(WaitReason::Message) => write!(f, "waiting on message"),
            ThreadState::Waiting(WaitReason::Join(id)) => write!(f, "waiting on {id}"),
            ThreadState::Finished => write!(f, "finished"),
            ThreadState::Cancelled => write!(f, "cancelled"),
        }
    }
}

bitflags! {
    /// Capabilities held by a thread. A thread can only ever lose bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Create threads from program files.
        const RUN_PROGRAMS = 1 << 0;
        /// Write another thread's registers, name, child link or handler.
        const ALTER_REGISTERS = 1 << 1;
        /// Change the kernel configuration flags.
        const KERNEL_CONFIG = 1 << 2;
    }
}

/// How a new thread starts executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEntry {
    /// Code address inside the image.
    Function(Word),
    /// Program file resolved through the program loader.
    File(FileName),
}

/// Signal bookkeeping of a thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalState {
    /// Pending signal value, 0 when none.
    pub pending: Word,
    /// Handler code address, 0 when none is installed.
    pub handler: Word,
    /// Interrupted frame while the handler runs.
    pub interrupted: Option<RegisterContext>,
}

impl SignalState {
    pub fn handler_active(&self) -> bool {
        self.interrupted.is_some()
    }

    /// True when a pending signal can be delivered right now.
    pub fn deliverable(&self) -> bool {
        self.pending != 0 && self.handler != 0 && !self.handler_active()
    }
}

/// Everything needed to create a thread.
#[derive(Debug, Clone)]
pub struct ThreadSpec {
    pub name: ThreadName,
    pub entry: ThreadEntry,
    pub args: [Word; 4],
    pub permissions: Permissions,
    pub parent: Option<ThreadId>,
    pub context: RegisterContext,
}

/// Thread control block.
#[derive(Debug, Clone)]
pub struct Tcb {
    pub(crate) id: ThreadId,
    pub(crate) name: ThreadName,
    pub(crate) state: ThreadState,
    pub(crate) context: RegisterContext,
    pub(crate) entry: ThreadEntry,
    pub(crate) args: [Word; 4],
    pub(crate) parent: Option<ThreadId>,
    pub(crate) child: Option<ThreadId>,
    pub(crate) permissions: Permissions,
    pub(crate) signal: SignalState,
    pub(crate) mailbox: Option<(ThreadId, Word)>,
    /// The trapped call is re-executed when the thread is next selected.
    pub(crate) retry: bool,
}

impl Tcb {
    pub(crate) fn new(id: ThreadId, spec: ThreadSpec) -> Self {
        Self {
            id,
            name: spec.name,
            state: ThreadState::Ready,
            context: spec.context,
            entry: spec.entry,
            args: spec.args,
            parent: spec.parent,
            child: None,
            permissions: spec.permissions,
            signal: SignalState::default(),
            mailbox: None,
            retry: false,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn context(&self) -> &RegisterContext {
        &self.context
    }

    pub fn entry(&self) -> &ThreadEntry {
        &self.entry
    }

    pub fn args(&self) -> [Word; 4] {
        self.args
    }

    pub fn parent(&self) -> Option<ThreadId> {
        self.parent
    }

    pub fn child(&self) -> Option<ThreadId> {
        self.child
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn signal(&self) -> &SignalState {
        &self.signal
    }

    pub fn mailbox(&self) -> Option<(ThreadId, Word)> {
        self.mailbox
    }

    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Removes capabilities; bits can never be added back.
    pub(crate) fn drop_permissions(&mut self, bits: Permissions) {
        self.permissions.remove(bits);
    }
}

/// Builds a thread name from raw bytes, truncating to [`NAME_CAPACITY`] and
/// at the first invalid UTF-8 sequence.
pub fn name_from_bytes(bytes: &[u8]) -> ThreadName {
    let valid = match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(err) => core::str::from_utf8(&bytes[..err.valid_up_to()]).unwrap_or_default(),
    };
    let mut name = ThreadName::new();
    for ch in valid.chars() {
        if name.push(ch).is_err() {
            break;
        }
    }
    name
}

/// Builds a program file name, failing if it does not fit.
pub fn file_name_from_bytes(bytes: &[u8]) -> Option<FileName> {
    let text = core::str::from_utf8(bytes).ok()?;
    let mut name = FileName::new();
    name.push_str(text).ok()?;
    Some(name)
}
