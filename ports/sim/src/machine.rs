//! The simulated machine: RAM, code, a tick source and one kernel instance.
//!
//! Each [`Machine::step`] executes one routine step of the running thread
//! and forwards traps, faults and timer expiry to the kernel exactly like an
//! exception handler on a target would.

use amt_kernel::abi::SYSCALL_NUMBER_REG;
use amt_kernel::{
    Dispatch, Kernel, KernelConfig, RegisterContext, ThreadId, Timer, TraceHook, Word,
};

use crate::code::{CodeSpace, Routine, Step};
use crate::console::Console;
use crate::cpu::Cpu;
use crate::error::SimError;
use crate::ram::Ram;
use crate::timer::SimTimer;

/// Memory layout and timing of a simulated machine.
#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub ram_base: Word,
    pub ram_size: usize,
    /// Host-filled data area at the bottom of RAM; the rest is heap.
    pub data_size: usize,
    /// Executed steps between timer interrupts; 0 disables preemption.
    pub tick_interval: Word,
    /// Kernel settings. Heap and trampolines are filled in by the builder.
    pub kernel: KernelConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_base: 0x2000_0000,
            ram_size: 0x1_0000,
            data_size: 0x2000,
            tick_interval: 32,
            kernel: KernelConfig::builder()
                .name("AMT-SIM")
                .max_threads(8)
                .stack_size(0x200)
                .build(),
        }
    }
}

/// How a call to [`Machine::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every thread finished or was cancelled.
    Halted,
    /// Threads remain but none can run.
    Idle,
    /// The step budget ran out first.
    StepLimit,
}

pub struct MachineBuilder {
    config: MachineConfig,
    code: CodeSpace,
    trace: Option<TraceHook>,
}

impl MachineBuilder {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            code: CodeSpace::new(),
            trace: None,
        }
    }

    /// Places a program routine under `name`.
    pub fn program(mut self, name: &str, routine: Routine) -> Result<Self, SimError> {
        self.code.register(name, routine)?;
        Ok(self)
    }

    pub fn tick_interval(mut self, steps: Word) -> Self {
        self.config.tick_interval = steps;
        self
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    pub fn build(self) -> Result<Machine, SimError> {
        let MachineConfig {
            ram_base,
            ram_size,
            data_size,
            tick_interval,
            kernel: mut kernel_config,
        } = self.config;
        if data_size >= ram_size {
            return Err(SimError::Layout("data area leaves no room for the heap"));
        }
        if ram_base.checked_add(ram_size as Word).is_none() {
            return Err(SimError::Layout("RAM wraps the address space"));
        }

        kernel_config.heap_base = ram_base + data_size as Word;
        kernel_config.heap_size = ram_size - data_size;
        kernel_config.exit_trampoline = self.code.exit_trampoline();
        kernel_config.signal_trampoline = self.code.signal_trampoline();

        let mut builder = Kernel::builder(kernel_config).with_loader(self.code.loader());
        if let Some(hook) = self.trace {
            builder = builder.with_trace_hook(hook);
        }

        Ok(Machine {
            kernel: builder.build(),
            ram: Ram::new(ram_base, ram_size, data_size),
            code: self.code,
            console: Console::new(),
            timer: SimTimer::new(tick_interval),
            dispatch: None,
            steps: 0,
        })
    }
}

pub struct Machine {
    kernel: Kernel,
    ram: Ram,
    code: CodeSpace,
    console: Console,
    timer: SimTimer,
    dispatch: Option<Dispatch>,
    steps: u64,
}

impl Machine {
    pub fn builder(config: MachineConfig) -> MachineBuilder {
        MachineBuilder::new(config)
    }

    /// Creates the first thread from a placed program and starts the kernel.
    pub fn boot(&mut self, program: &str, args: [Word; 4]) -> Result<ThreadId, SimError> {
        let entry = self
            .code
            .address_of(program)
            .ok_or_else(|| SimError::UnknownProgram(program.to_owned()))?;
        let id = self.kernel.boot(program, entry, args)?;
        self.timer.enable();
        self.dispatch = Some(self.kernel.start(&mut self.ram));
        log::debug!(target: "amt::sim", "booted {program} as {id}");
        Ok(id)
    }

    /// Executes one step of the running thread.
    pub fn step(&mut self) -> Result<Dispatch, SimError> {
        let dispatch = self.dispatch.ok_or(SimError::NotBooted)?;
        let Dispatch::Run {
            thread,
            mut context,
        } = dispatch
        else {
            return Ok(dispatch);
        };
        self.steps += 1;

        let mut next = match self.code.resolve(context.pc) {
            None => {
                log::warn!(target: "amt::sim", "{thread} jumped to {:#010x}", context.pc);
                self.kernel.fault(&mut self.ram, context)
            }
            Some((routine, base)) => {
                let step = {
                    let mut cpu = Cpu::new(
                        thread,
                        base,
                        &mut context,
                        &mut self.ram,
                        &mut self.console,
                        &self.code,
                    );
                    routine(&mut cpu)
                };
                match step {
                    Step::Continue => Dispatch::Run { thread, context },
                    Step::Return => {
                        context.pc = context.lr;
                        Dispatch::Run { thread, context }
                    }
                    Step::Syscall(call, args) => {
                        context.r[..4].copy_from_slice(&args);
                        context.r[SYSCALL_NUMBER_REG] = call as Word;
                        self.kernel.syscall(&mut self.ram, context)
                    }
                    Step::Fault => self.kernel.fault(&mut self.ram, context),
                }
            }
        };

        if next != Dispatch::Halted && self.timer.advance() {
            let frame = match next {
                Dispatch::Run { context, .. } => context,
                Dispatch::Idle | Dispatch::Halted => RegisterContext::default(),
            };
            next = self.kernel.tick(&mut self.ram, frame);
        }
        self.dispatch = Some(next);
        Ok(next)
    }

    /// Steps until the kernel halts or idles, or `max_steps` run out.
    pub fn run(&mut self, max_steps: u64) -> Result<RunOutcome, SimError> {
        for _ in 0..max_steps {
            match self.step()? {
                Dispatch::Halted => return Ok(RunOutcome::Halted),
                Dispatch::Idle => return Ok(RunOutcome::Idle),
                Dispatch::Run { .. } => {}
            }
        }
        Ok(RunOutcome::StepLimit)
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    pub fn ram(&self) -> &Ram {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut Ram {
        &mut self.ram
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn code(&self) -> &CodeSpace {
        &self.code
    }

    /// Steps executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Last dispatch decision; `None` before boot.
    pub fn dispatch(&self) -> Option<Dispatch> {
        self.dispatch
    }

    pub fn symbol(&self, name: &str) -> Option<Word> {
        self.code.address_of(name)
    }
}
