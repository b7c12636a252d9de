//! Timer preemption: fairness and mutual exclusion under interleaving.

mod common;

use amt_kernel::abi::MutexOp;
use amt_kernel::{AddressSpace, Syscall, Word};
use amt_sim::{Cpu, RunOutcome, Step};

use common::{machine, spawn};

fn spinner(cpu: &mut Cpu<'_>) -> Step {
    let counter = cpu.reg(0);
    let value = cpu.read_word(counter).unwrap_or(0);
    match cpu.write_word(counter, value + 1) {
        Ok(()) => Step::Continue,
        Err(_) => Step::Fault,
    }
}

/// `r0..r2` = counters, one per spinner.
fn spin_parent(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => {
            for i in 0..3 {
                let counter = cpu.reg(i);
                cpu.set_reg(4 + i, counter);
            }
            cpu.jump(1)
        }
        label @ 1..=3 => {
            let counter = cpu.reg(3 + label as usize);
            spawn(cpu, label + 1, "spinner", [counter, 0, 0, 0])
        }
        _ => cpu.syscall(4, Syscall::ThreadWait, [0; 4]),
    }
}

#[test]
fn ready_threads_share_the_cpu_evenly() {
    let mut machine = machine(&[("spin_parent", spin_parent), ("spinner", spinner)], 10);
    let counters: Vec<Word> = (0..3)
        .map(|_| machine.ram_mut().place_word(0).unwrap())
        .collect();
    machine
        .boot("spin_parent", [counters[0], counters[1], counters[2], 0])
        .unwrap();
    assert_eq!(machine.run(3_000).unwrap(), RunOutcome::StepLimit);

    let counts: Vec<Word> = counters
        .iter()
        .map(|addr| machine.ram().read_word(*addr).unwrap())
        .collect();
    let min = *counts.iter().min().unwrap();
    let max = *counts.iter().max().unwrap();
    assert!(min >= 900, "starved spinner: {counts:?}");
    assert!(max - min <= 20, "unfair split: {counts:?}");
}

const ROUNDS: Word = 10;

/// `r0` = mutex, `r1` = shared counter.
fn worker(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => {
            cpu.set_reg(4, cpu.reg(0));
            cpu.set_reg(5, cpu.reg(1));
            cpu.set_reg(6, ROUNDS);
            cpu.jump(1)
        }
        1 if cpu.reg(6) == 0 => cpu.ret(0),
        1 => cpu.syscall(2, Syscall::Mutex, [MutexOp::LOCK, cpu.reg(4), 0, 0]),
        2 => match cpu.read_word(cpu.reg(5)) {
            Ok(value) => {
                cpu.set_reg(8, value);
                cpu.jump(3)
            }
            Err(_) => Step::Fault,
        },
        3 => cpu.jump(4),
        4 => {
            let (counter, value) = (cpu.reg(5), cpu.reg(8));
            if cpu.write_word(counter, value + 1).is_err() {
                return Step::Fault;
            }
            cpu.syscall(5, Syscall::Mutex, [MutexOp::UNLOCK, cpu.reg(4), 0, 0])
        }
        _ => {
            if cpu.result().is_err() {
                return Step::Fault;
            }
            cpu.set_reg(6, cpu.reg(6) - 1);
            cpu.jump(1)
        }
    }
}

fn coordinator(cpu: &mut Cpu<'_>) -> Step {
    match cpu.label() {
        0 => {
            cpu.set_reg(4, cpu.reg(0));
            cpu.set_reg(5, cpu.reg(1));
            cpu.syscall(1, Syscall::Mutex, [MutexOp::INIT, cpu.reg(4), 0, 0])
        }
        1 => {
            let args = [cpu.reg(4), cpu.reg(5), 0, 0];
            spawn(cpu, 2, "worker", args)
        }
        2 => {
            cpu.set_reg(6, cpu.reg(0));
            let args = [cpu.reg(4), cpu.reg(5), 0, 0];
            spawn(cpu, 3, "worker", args)
        }
        3 => {
            cpu.set_reg(8, cpu.reg(0));
            cpu.syscall(4, Syscall::ThreadJoin, [cpu.reg(6), 0, 0, 0])
        }
        4 => cpu.syscall(5, Syscall::ThreadJoin, [cpu.reg(8), 0, 0, 0]),
        _ => cpu.ret(0),
    }
}

#[test]
fn the_mutex_serialises_preempted_critical_sections() {
    for tick in [2, 3, 7] {
        let mut machine = machine(&[("coordinator", coordinator), ("worker", worker)], tick);
        let mutex = machine.ram_mut().place(&[0xFF; 8]).unwrap();
        let counter = machine.ram_mut().place_word(0).unwrap();
        machine.boot("coordinator", [mutex, counter, 0, 0]).unwrap();

        assert_eq!(machine.run(10_000).unwrap(), RunOutcome::Halted, "tick {tick}");
        assert_eq!(machine.ram().read_word(counter), Ok(2 * ROUNDS), "tick {tick}");
        assert_eq!(machine.ram().read_word(mutex), Ok(0));
    }
}
