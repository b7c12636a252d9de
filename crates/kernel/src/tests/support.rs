use crate::abi::{decode_result, Syscall, Word};
use crate::context::RegisterContext;
use crate::error::KResult;
use crate::kernel::{Dispatch, Kernel, KernelConfig, KernelConfigBuilder};
use crate::memory::test_memory::VecMemory;
use crate::memory::AddressSpace;
use crate::thread::{ThreadId, ThreadState};

pub const RAM_BASE: Word = 0x2000_0000;
pub const RAM_SIZE: usize = 0x4000;
pub const HEAP_BASE: Word = RAM_BASE + 0x2000;
pub const EXIT_TRAMPOLINE: Word = 0x10;
pub const SIGNAL_TRAMPOLINE: Word = 0x20;

/// Drives a kernel by hand: every call is issued from the thread the last
/// dispatch selected.
pub struct Harness {
    pub kernel: Kernel,
    pub mem: VecMemory,
    pub running: Option<(ThreadId, RegisterContext)>,
    data_top: Word,
}

pub fn config() -> KernelConfigBuilder {
    KernelConfig::builder()
        .max_threads(8)
        .heap(HEAP_BASE, 0x2000)
        .stack_size(0x100)
        .trampolines(EXIT_TRAMPOLINE, SIGNAL_TRAMPOLINE)
}

impl Harness {
    pub fn new() -> Self {
        Self::with_kernel(Kernel::builder(config().build()).build())
    }

    pub fn with_kernel(kernel: Kernel) -> Self {
        Self {
            kernel,
            mem: VecMemory::new(RAM_BASE, RAM_SIZE),
            running: None,
            data_top: RAM_BASE,
        }
    }

    /// Boots a first thread at `entry` and starts it.
    pub fn boot(&mut self, entry: Word) -> ThreadId {
        let id = self.kernel.boot("init", entry, [0; 4]).unwrap();
        let dispatch = self.kernel.start(&mut self.mem);
        self.apply(dispatch);
        id
    }

    pub fn apply(&mut self, dispatch: Dispatch) -> Dispatch {
        self.running = match dispatch {
            Dispatch::Run { thread, context } => Some((thread, context)),
            Dispatch::Idle | Dispatch::Halted => None,
        };
        dispatch
    }

    pub fn running_id(&self) -> ThreadId {
        self.running.expect("no thread is running").0
    }

    pub fn context(&mut self) -> &mut RegisterContext {
        &mut self.running.as_mut().expect("no thread is running").1
    }

    /// Issues `call` from the running thread and returns its result.
    pub fn call(&mut self, call: Syscall, args: [Word; 4]) -> KResult<Word> {
        let caller = self.running_id();
        self.trap(call, args);
        self.result_of(caller)
    }

    /// Issues `call` and returns the resulting dispatch.
    pub fn trap(&mut self, call: Syscall, args: [Word; 4]) -> Dispatch {
        self.trap_raw(call as Word, args)
    }

    pub fn trap_raw(&mut self, number: Word, args: [Word; 4]) -> Dispatch {
        let (_, mut frame) = self.running.expect("no thread is running");
        frame.r[..4].copy_from_slice(&args);
        frame.r[7] = number;
        let dispatch = self.kernel.syscall(&mut self.mem, frame);
        self.apply(dispatch)
    }

    pub fn tick(&mut self) -> Dispatch {
        let frame = self.running.map(|(_, frame)| frame).unwrap_or_default();
        let dispatch = self.kernel.tick(&mut self.mem, frame);
        self.apply(dispatch)
    }

    /// Result word last written into `id`'s saved frame.
    pub fn result_of(&self, id: ThreadId) -> KResult<Word> {
        decode_result(self.kernel.thread(id).unwrap().context().result())
    }

    pub fn state(&self, id: ThreadId) -> ThreadState {
        self.kernel.thread(id).unwrap().state()
    }

    /// Places bytes in the data area below the heap.
    pub fn place(&mut self, bytes: &[u8]) -> Word {
        let addr = self.data_top;
        self.mem.write(addr, bytes).unwrap();
        self.data_top += (bytes.len() as Word + 7) & !7;
        addr
    }

    pub fn place_str(&mut self, text: &str) -> Word {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        self.place(&bytes)
    }

    pub fn place_word(&mut self, value: Word) -> Word {
        self.place(&value.to_le_bytes())
    }

    pub fn read_word(&self, addr: Word) -> Word {
        self.mem.read_word(addr).unwrap()
    }

    /// Spawns a function-entry thread from the running thread.
    pub fn spawn(&mut self, entry: Word, flags: Word) -> ThreadId {
        let id = self.call(Syscall::AddThread, [0, 0, entry, flags]).unwrap();
        ThreadId(id)
    }
}
