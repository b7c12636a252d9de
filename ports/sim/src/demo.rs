//! The exit/join demonstration.
//!
//! `setup` (the first thread) starts two counters and a joiner, then exits.
//! The counters yield a few times before finishing; the joiner waits for
//! every thread created before it, in id order, and reports how each ended.

use amt_kernel::abi::{Property, YieldMode};
use amt_kernel::{Syscall, ThreadState, Word, CURRENT_THREAD, INVALID_THREAD};

use crate::code::Step;
use crate::cpu::Cpu;
use crate::error::SimError;
use crate::machine::MachineBuilder;

/// Places the demo programs.
pub fn install(builder: MachineBuilder) -> Result<MachineBuilder, SimError> {
    builder
        .program("setup", setup)?
        .program("counter", counter)?
        .program("joiner", joiner)
}

/// Starts `counter` twice (2 and 4 yields) and `joiner`.
pub fn setup(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => spawn(cpu, 1, "count2", "counter", 2),
        1 => spawn(cpu, 2, "count4", "counter", 4),
        2 => spawn(cpu, 3, "joiner", "joiner", 0),
        _ => cpu.ret(0),
    }
}

fn spawn(cpu: &mut Cpu<'_>, next: Word, name: &str, program: &str, arg: Word) -> Step {
    let name = cpu.push_str(name);
    let args = cpu.alloca(16);
    for (i, value) in [arg, 0, 0, 0].into_iter().enumerate() {
        if cpu.write_word(args + 4 * i as Word, value).is_err() {
            return Step::Fault;
        }
    }
    let entry = cpu.symbol(program);
    cpu.syscall(next, Syscall::AddThread, [name, args, entry, 0])
}

/// Yields `r0` times, then finishes.
pub fn counter(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => {
            cpu.set_reg(4, cpu.reg(0));
            cpu.jump(1)
        }
        _ => match cpu.reg(4) {
            0 => cpu.ret(0),
            left => {
                cpu.set_reg(4, left - 1);
                cpu.syscall(1, Syscall::Yield, [INVALID_THREAD, YieldMode::ANY, 0, 0])
            }
        },
    }
}

/// Joins every thread with a smaller id than its own and checks that each
/// one finished normally.
pub fn joiner(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => {
            let out = cpu.alloca(4);
            cpu.set_reg(5, out);
            cpu.syscall(1, Syscall::GetThreadProperty, [CURRENT_THREAD, Property::Id as Word, out, 0])
        }
        1 => match cpu.read_word(cpu.reg(5)) {
            Ok(own) => {
                cpu.set_reg(6, own);
                cpu.set_reg(4, 0);
                cpu.jump(2)
            }
            Err(_) => Step::Fault,
        },
        2 if cpu.reg(4) >= cpu.reg(6) => cpu.ret(0),
        // r5 now receives the joined thread's final state.
        2 => cpu.syscall(3, Syscall::ThreadJoin, [cpu.reg(4), cpu.reg(5), 0, 0]),
        _ => {
            let joined = cpu.reg(4);
            match cpu.result() {
                Ok(_) => match cpu.read_word(cpu.reg(5)) {
                    Ok(state) if state == ThreadState::Finished.code() => {
                        cpu.log(format!("thread {joined} exited"))
                    }
                    Ok(state) => cpu.log(format!("thread {joined}: unexpected state {state}")),
                    Err(_) => return Step::Fault,
                },
                Err(err) => cpu.log(format!("join {joined} failed: {err}")),
            }
            cpu.set_reg(4, joined + 1);
            cpu.jump(2)
        }
    }
}
