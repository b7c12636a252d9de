//! Helpers shared by the scenario tests.

#![allow(dead_code)]

use amt_kernel::abi::{Property, YieldMode};
use amt_kernel::{Syscall, Word, INVALID_THREAD};
use amt_sim::{Cpu, Machine, MachineConfig, Routine, Step};

/// Builds a machine holding `programs` with the given tick interval.
pub fn machine(programs: &[(&str, Routine)], tick_interval: Word) -> Machine {
    let mut builder = Machine::builder(MachineConfig::default()).tick_interval(tick_interval);
    for (name, routine) in programs {
        builder = builder.program(name, *routine).expect("unique program names");
    }
    builder.build().expect("valid machine")
}

/// Starts `program` with `args`, resuming at `next`.
pub fn spawn(cpu: &mut Cpu<'_>, next: Word, program: &str, args: [Word; 4]) -> Step {
    spawn_with(cpu, next, program, args, 0)
}

pub fn spawn_with(
    cpu: &mut Cpu<'_>,
    next: Word,
    program: &str,
    args: [Word; 4],
    flags: Word,
) -> Step {
    let name = cpu.push_str(program);
    let block = cpu.alloca(16);
    for (i, value) in args.into_iter().enumerate() {
        if cpu.write_word(block + 4 * i as Word, value).is_err() {
            return Step::Fault;
        }
    }
    let entry = cpu.symbol(program);
    cpu.syscall(next, Syscall::AddThread, [name, block, entry, flags])
}

pub fn yield_any(cpu: &mut Cpu<'_>, next: Word) -> Step {
    cpu.syscall(next, Syscall::Yield, [INVALID_THREAD, YieldMode::ANY, 0, 0])
}

/// Writes `value` to a fresh stack word and sets `property` of `target`.
pub fn set_property(
    cpu: &mut Cpu<'_>,
    next: Word,
    target: Word,
    property: Property,
    value: Word,
) -> Step {
    let slot = cpu.alloca(4);
    if cpu.write_word(slot, value).is_err() {
        return Step::Fault;
    }
    cpu.syscall(
        next,
        Syscall::SetThreadProperty,
        [target, property as Word, slot, 0],
    )
}

/// Reads the register image of `target` into a stack buffer whose address
/// is kept in `r11`.
pub fn read_registers(cpu: &mut Cpu<'_>, next: Word, target: Word) -> Step {
    let image = cpu.alloca(17 * 4);
    cpu.set_reg(11, image);
    cpu.syscall(
        next,
        Syscall::GetThreadProperty,
        [target, Property::Registers as Word, image, 0],
    )
}

/// Patches the program counter in the image read by [`read_registers`] and
/// writes it back to `target`.
pub fn redirect(cpu: &mut Cpu<'_>, next: Word, target: Word, pc: Word) -> Step {
    let image = cpu.reg(11);
    if cpu.write_word(image + 15 * 4, pc).is_err() {
        return Step::Fault;
    }
    cpu.syscall(
        next,
        Syscall::SetThreadProperty,
        [target, Property::Registers as Word, image, 0],
    )
}

