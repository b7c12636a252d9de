//! The kernel instance: thread table, scheduler, heap and configuration.
//!
//! Every entry point ([`Kernel::syscall`], [`Kernel::tick`],
//! [`Kernel::fault`]) takes the interrupted thread's register frame, saves it
//! into that thread's TCB, mutates kernel state and returns a [`Dispatch`]
//! telling the port which context to restore. The port must call the entry
//! points with interrupts masked; the kernel itself never blocks.

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitflags::bitflags;

use crate::abi::{encode_result, Word, CURRENT_THREAD, INVALID_THREAD};
use crate::context::RegisterContext;
use crate::error::{Error, KResult};
use crate::heap::ThreadHeap;
use crate::loader::ProgramLoader;
use crate::memory::AddressSpace;
use crate::scheduler::{Plan, Scheduler};
use crate::syscall::Outcome;
use crate::table::ThreadTable;
use crate::thread::{
    name_from_bytes, Permissions, SignalState, Tcb, ThreadEntry, ThreadId, ThreadName,
    ThreadSpec, ThreadState, WaitReason,
};
use crate::trace::{sched, thread, Observer, TraceHook};

bitflags! {
    /// Process-wide runtime switches. Observational only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KernelFlags: u32 {
        /// Report scheduler events (switches, yields, preemption).
        const LOG_SCHEDULER = 1 << 0;
        /// Report thread lifecycle events (create, block, wake, exit).
        const LOG_THREADS = 1 << 1;
    }
}

/// Configuration for a kernel instance.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Number of thread table slots.
    pub max_threads: usize,
    /// Start of the region managed by the thread heap.
    pub heap_base: Word,
    pub heap_size: usize,
    /// Stack carved from the heap for every new thread; 0 disables.
    pub stack_size: Word,
    /// Code address new threads return into; it must issue `thread_exit`.
    pub exit_trampoline: Word,
    /// Code address signal handlers return into; it must issue
    /// `signal_return`.
    pub signal_trampoline: Word,
    pub flags: KernelFlags,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "AMT",
            max_threads: 8,
            heap_base: 0,
            heap_size: 0,
            stack_size: 0,
            exit_trampoline: 0,
            signal_trampoline: 0,
            flags: KernelFlags::empty(),
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the number of thread table slots.
    pub fn max_threads(mut self, max: usize) -> Self {
        self.config.max_threads = max;
        self
    }

    /// Sets the region handed to the thread heap.
    pub fn heap(mut self, base: Word, size: usize) -> Self {
        self.config.heap_base = base;
        self.config.heap_size = size;
        self
    }

    /// Sets the per-thread stack size.
    pub fn stack_size(mut self, size: Word) -> Self {
        self.config.stack_size = size;
        self
    }

    /// Sets the exit and signal-return trampoline addresses.
    pub fn trampolines(mut self, exit: Word, signal: Word) -> Self {
        self.config.exit_trampoline = exit;
        self.config.signal_trampoline = signal;
        self
    }

    /// Sets the initial kernel flags.
    pub fn flags(mut self, flags: KernelFlags) -> Self {
        self.config.flags = flags;
        self
    }

    /// Builds the kernel configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}

/// Builder for a [`Kernel`] with its collaborators.
pub struct KernelBuilder {
    config: KernelConfig,
    trace: Option<TraceHook>,
    loader: Option<Box<dyn ProgramLoader + Send>>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            trace: None,
            loader: None,
        }
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Installs the resolver for file-backed threads.
    pub fn with_loader(mut self, loader: impl ProgramLoader + Send + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn build(self) -> Kernel {
        Kernel::new(self.config, self.trace, self.loader)
    }
}

/// What the port must do after a kernel entry point returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Restore `context` and run `thread`.
    Run {
        thread: ThreadId,
        context: RegisterContext,
    },
    /// Nothing is ready; wait for the next interrupt.
    Idle,
    /// Every thread has finished or been cancelled.
    Halted,
}

/// A kernel instance.
pub struct Kernel {
    config: KernelConfig,
    pub(crate) table: ThreadTable,
    pub(crate) heap: ThreadHeap,
    pub(crate) scheduler: Scheduler,
    pub(crate) current: Option<ThreadId>,
    pub(crate) observer: Observer,
    pub(crate) loader: Option<Box<dyn ProgramLoader + Send>>,
    ticks: u64,
}

impl Kernel {
    /// Creates a kernel builder.
    pub fn builder(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    fn new(
        config: KernelConfig,
        trace: Option<TraceHook>,
        loader: Option<Box<dyn ProgramLoader + Send>>,
    ) -> Self {
        Self {
            table: ThreadTable::with_capacity(config.max_threads),
            heap: ThreadHeap::new(config.heap_base, config.heap_size),
            scheduler: Scheduler::new(),
            current: None,
            observer: Observer::new(config.flags, trace),
            loader,
            ticks: 0,
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn flags(&self) -> KernelFlags {
        self.observer.flags
    }

    pub fn set_flags(&mut self, flags: KernelFlags) {
        self.observer.flags = flags;
    }

    pub fn set_trace_hook(&mut self, hook: Option<TraceHook>) {
        self.observer.hook = hook;
    }

    /// Thread currently switched in, if any.
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn thread(&self, id: ThreadId) -> KResult<&Tcb> {
        self.table.lookup(id)
    }

    pub fn threads(&self) -> impl Iterator<Item = &Tcb> {
        self.table.iter()
    }

    pub fn heap(&self) -> &ThreadHeap {
        &self.heap
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Timer ticks seen so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Creates the first thread with every permission.
    ///
    /// Fails with [`Error::TableFull`] when the table has no slots, which
    /// leaves the kernel unable to run anything.
    pub fn boot(&mut self, name: &str, entry: Word, args: [Word; 4]) -> KResult<ThreadId> {
        self.spawn(
            name_from_bytes(name.as_bytes()),
            ThreadEntry::Function(entry),
            entry,
            args,
            Permissions::all(),
            None,
        )
    }

    /// Selects the first thread to run.
    pub fn start(&mut self, mem: &mut dyn AddressSpace) -> Dispatch {
        self.schedule(mem)
    }

    /// Syscall trap entry. `frame` is the caller's context at the trap.
    pub fn syscall(&mut self, mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
        let Some(caller) = self.current else {
            return self.schedule(mem);
        };
        if let Ok(tcb) = self.table.lookup_mut(caller) {
            tcb.context = frame;
        }
        let outcome = self.execute(mem, caller);
        self.settle(mem, caller, outcome)
    }

    /// Timer interrupt entry: preempts the running thread.
    pub fn tick(&mut self, mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
        self.ticks += 1;
        if let Some(id) = self.current.take() {
            if let Ok(tcb) = self.table.lookup_mut(id) {
                tcb.context = frame;
                tcb.state = ThreadState::Ready;
            }
            self.observer
                .sched(sched::PREEMPT, &[id.raw()], format_args!("{id} preempted"));
        }
        self.schedule(mem)
    }

    /// Fault entry: the running thread executed something invalid and is
    /// cancelled.
    pub fn fault(&mut self, mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
        if let Some(id) = self.current {
            if let Ok(tcb) = self.table.lookup_mut(id) {
                tcb.context = frame;
            }
            log::warn!(target: "amt::thread", "{id} faulted at pc {:#010x}", frame.pc);
            self.retire(mem, id, ThreadState::Cancelled, id.raw());
        }
        self.schedule(mem)
    }

    /// Applies the outcome of a call made by `caller`.
    pub(crate) fn settle(
        &mut self,
        mem: &mut dyn AddressSpace,
        caller: ThreadId,
        outcome: Outcome,
    ) -> Dispatch {
        match outcome {
            Outcome::Return(result) => {
                self.set_result(caller, result);
                self.resume(mem, caller)
            }
            Outcome::Resume => self.resume(mem, caller),
            Outcome::Block { reason, retry } => {
                self.block(caller, reason, retry);
                self.schedule(mem)
            }
            Outcome::Yield(target) => {
                self.set_result(caller, Ok(1));
                if let Ok(tcb) = self.table.lookup_mut(caller) {
                    tcb.state = ThreadState::Ready;
                }
                self.current = None;
                let to = target.map_or(INVALID_THREAD, ThreadId::raw);
                self.observer
                    .sched(sched::YIELD, &[caller.raw(), to], format_args!("{caller} yields"));
                match target {
                    Some(target) => match self.launch(mem, target) {
                        Some(dispatch) => dispatch,
                        None => self.schedule(mem),
                    },
                    None => self.schedule(mem),
                }
            }
            Outcome::Retired => self.schedule(mem),
        }
    }

    /// Runs the selection step until a thread can be resumed.
    pub(crate) fn schedule(&mut self, mem: &mut dyn AddressSpace) -> Dispatch {
        loop {
            match self.scheduler.plan(&self.table) {
                Plan::Run(id) => {
                    if let Some(dispatch) = self.launch(mem, id) {
                        return dispatch;
                    }
                }
                Plan::Idle => {
                    let last = self.scheduler.cursor().map_or(INVALID_THREAD, ThreadId::raw);
                    self.observer
                        .sched(sched::IDLE, &[last], format_args!("no thread ready"));
                    return Dispatch::Idle;
                }
                Plan::Halted => {
                    self.observer
                        .sched(sched::HALT, &[], format_args!("all threads terminated"));
                    return Dispatch::Halted;
                }
            }
        }
    }

    /// Switches `id` in, retrying its blocked call first if needed.
    ///
    /// Returns `None` when the retried call blocked the thread again.
    fn launch(&mut self, mem: &mut dyn AddressSpace, id: ThreadId) -> Option<Dispatch> {
        let previous = self.scheduler.cursor();
        let retry = match self.table.lookup_mut(id) {
            Ok(tcb) if tcb.is_ready() => {
                tcb.state = ThreadState::Running;
                core::mem::take(&mut tcb.retry)
            }
            _ => return None,
        };
        self.scheduler.switched_to(id);
        self.current = Some(id);
        let prev = previous.map_or(INVALID_THREAD, ThreadId::raw);
        self.observer
            .sched(sched::NEXT, &[id.raw(), prev], format_args!("switch to {id}"));

        if !retry {
            return Some(self.resume(mem, id));
        }
        match self.execute(mem, id) {
            Outcome::Block { reason, retry } => {
                self.block(id, reason, retry);
                None
            }
            outcome => Some(self.settle(mem, id, outcome)),
        }
    }

    /// Returns control to `id`, entering its signal handler if a signal is
    /// deliverable.
    fn resume(&mut self, mem: &mut dyn AddressSpace, id: ThreadId) -> Dispatch {
        let trampoline = self.config.signal_trampoline;
        let context = match self.table.lookup_mut(id) {
            Ok(tcb) if tcb.state == ThreadState::Running => {
                if tcb.signal.deliverable() {
                    let signal = core::mem::take(&mut tcb.signal.pending);
                    tcb.signal.interrupted = Some(tcb.context);
                    tcb.context.pc = tcb.signal.handler;
                    tcb.context.lr = trampoline;
                    tcb.context.r[0] = signal;
                    self.observer.thread(
                        thread::SIGNAL,
                        &[id.raw(), signal],
                        format_args!("{id} handling signal {signal}"),
                    );
                }
                tcb.context
            }
            _ => {
                self.current = None;
                return self.schedule(mem);
            }
        };
        Dispatch::Run {
            thread: id,
            context,
        }
    }

    pub(crate) fn set_result(&mut self, id: ThreadId, result: KResult<Word>) {
        if let Ok(tcb) = self.table.lookup_mut(id) {
            tcb.context.set_result(encode_result(result));
        }
    }

    pub(crate) fn block(&mut self, id: ThreadId, reason: WaitReason, retry: bool) {
        if let Ok(tcb) = self.table.lookup_mut(id) {
            tcb.state = ThreadState::Waiting(reason);
            tcb.retry = retry;
            let code = tcb.state.code();
            let state = tcb.state;
            self.observer
                .thread(thread::BLOCK, &[id.raw(), code], format_args!("{id} {state}"));
        }
        if self.current == Some(id) {
            self.current = None;
        }
    }

    /// Moves a waiting thread back to `Ready`.
    pub(crate) fn make_ready(&mut self, id: ThreadId) {
        if let Ok(tcb) = self.table.lookup_mut(id) {
            if tcb.state.is_waiting() {
                tcb.state = ThreadState::Ready;
                self.observer
                    .thread(thread::WAKE, &[id.raw()], format_args!("{id} woken"));
            }
        }
    }

    /// Resolves a thread id argument, accepting [`CURRENT_THREAD`].
    pub(crate) fn resolve(&self, caller: ThreadId, raw: Word) -> KResult<ThreadId> {
        let id = match raw {
            CURRENT_THREAD => caller,
            INVALID_THREAD => return Err(Error::InvalidId),
            raw => ThreadId(raw),
        };
        self.table.lookup(id).map(Tcb::id)
    }

    /// Creates a thread, carving its stack from the heap.
    pub(crate) fn spawn(
        &mut self,
        name: ThreadName,
        entry: ThreadEntry,
        entry_addr: Word,
        args: [Word; 4],
        permissions: Permissions,
        parent: Option<ThreadId>,
    ) -> KResult<ThreadId> {
        let id = self.table.next_id();
        let stack_top = match self.config.stack_size {
            0 => 0,
            size => {
                let base = self.heap.alloc(id, size)?;
                base + (size & !7)
            }
        };
        let context =
            RegisterContext::for_entry(entry_addr, args, stack_top, self.config.exit_trampoline);
        let admission = match self.table.create(ThreadSpec {
            name,
            entry,
            args,
            permissions,
            parent,
            context,
        }) {
            Ok(admission) => admission,
            Err(err) => {
                self.heap.free_all(id);
                return Err(err);
            }
        };

        if let Some(old) = admission.reclaimed {
            self.observer.thread(
                thread::RECLAIM,
                &[old.raw()],
                format_args!("slot of {old} reused by {id}"),
            );
        }
        let parent_word = parent.map_or(INVALID_THREAD, ThreadId::raw);
        if let Ok(tcb) = self.table.lookup(id) {
            self.observer.dictionary(id, tcb.name());
            self.observer.thread(
                thread::CREATE,
                &[id.raw(), parent_word],
                format_args!("{id} ({}) created", tcb.name()),
            );
        }
        Ok(admission.id)
    }

    /// Moves a thread into a terminal state and releases what it owns.
    ///
    /// Frees every heap block the thread owns, drops its mailbox and pending
    /// signal, and completes the joins waiting on it. Calling this on a
    /// thread that is already terminal does nothing.
    pub(crate) fn retire(
        &mut self,
        mem: &mut dyn AddressSpace,
        id: ThreadId,
        state: ThreadState,
        detail: Word,
    ) {
        let Ok(tcb) = self.table.lookup_mut(id) else {
            return;
        };
        if tcb.is_terminal() {
            return;
        }
        tcb.state = state;
        tcb.retry = false;
        tcb.mailbox = None;
        tcb.signal = SignalState::default();

        let freed = self.heap.free_all(id);
        if self.current == Some(id) {
            self.current = None;
        }
        let record = match state {
            ThreadState::Finished => thread::FINISH,
            _ => thread::CANCEL,
        };
        self.observer.thread(
            record,
            &[id.raw(), detail],
            format_args!("{id} {state}, {freed} block(s) freed"),
        );

        let joiners: Vec<ThreadId> = self
            .table
            .iter()
            .filter(|t| t.state == ThreadState::Waiting(WaitReason::Join(id)))
            .map(Tcb::id)
            .collect();
        for joiner in joiners {
            let state_ptr = match self.table.lookup(joiner) {
                Ok(tcb) => tcb.context.arg(1),
                Err(_) => continue,
            };
            let result = Self::report_state(mem, state_ptr, state).map(|()| 1);
            self.set_result(joiner, result);
            if let Ok(tcb) = self.table.lookup_mut(joiner) {
                tcb.retry = false;
            }
            self.make_ready(joiner);
        }
    }

    /// Writes a state code through an optional out pointer.
    pub(crate) fn report_state(
        mem: &mut dyn AddressSpace,
        ptr: Word,
        state: ThreadState,
    ) -> KResult<()> {
        if ptr == 0 {
            return Ok(());
        }
        mem.write_word(ptr, state.code())
    }
}

impl core::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Kernel")
            .field("name", &self.config.name)
            .field("threads", &self.table.len())
            .field("current", &self.current)
            .field("flags", &self.observer.flags)
            .finish()
    }
}
