use super::support::{config, Harness, EXIT_TRAMPOLINE};
use crate::abi::{Property, Syscall, Word, YieldMode, CURRENT_THREAD, INVALID_THREAD, TFLAG_PERM_SHIFT};
use crate::error::Error;
use crate::kernel::{Dispatch, Kernel};
use crate::thread::{Permissions, ThreadId, ThreadState, WaitReason};

fn yield_any(h: &mut Harness) -> Dispatch {
    h.trap(Syscall::Yield, [INVALID_THREAD, YieldMode::ANY, 0, 0])
}

#[test]
fn created_threads_inherit_reduced_permissions() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let withheld = Permissions::RUN_PROGRAMS.bits() << TFLAG_PERM_SHIFT;
    let child = h.spawn(0x200, withheld);

    assert_eq!(child, ThreadId(1));
    assert_eq!(h.running_id(), init);
    let tcb = h.kernel.thread(child).unwrap();
    assert_eq!(tcb.parent(), Some(init));
    assert_eq!(tcb.permissions(), Permissions::all() - Permissions::RUN_PROGRAMS);
    assert_eq!(tcb.state(), ThreadState::Ready);
    assert_eq!(tcb.context().pc, 0x200);
    assert_eq!(tcb.context().lr, EXIT_TRAMPOLINE);
}

#[test]
fn names_and_arguments_are_copied_at_creation() {
    let mut h = Harness::new();
    h.boot(0x100);
    let name = h.place_str("worker");
    let args = h.place(&[2, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    let id = h.call(Syscall::AddThread, [name, args, 0x300, 0]).unwrap();

    let tcb = h.kernel.thread(ThreadId(id)).unwrap();
    assert_eq!(tcb.name(), "worker");
    assert_eq!(tcb.args(), [2, 9, 0, 0]);
    assert_eq!(tcb.context().r[0], 2);
    assert_eq!(tcb.context().r[1], 9);
}

#[test]
fn yield_any_rotates_in_id_order() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let a = h.spawn(0x200, 0);
    let b = h.spawn(0x300, 0);

    yield_any(&mut h);
    assert_eq!(h.running_id(), a);
    assert_eq!(h.result_of(init), Ok(1));
    yield_any(&mut h);
    assert_eq!(h.running_id(), b);
    yield_any(&mut h);
    assert_eq!(h.running_id(), init);
    assert_eq!(h.state(a), ThreadState::Ready);
}

#[test]
fn directed_yield_hands_off_or_fails_without_switching() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let _a = h.spawn(0x200, 0);
    let b = h.spawn(0x300, 0);

    assert_eq!(
        h.call(Syscall::Yield, [CURRENT_THREAD, YieldMode::TO, 0, 0]),
        Err(Error::NotRunnable)
    );
    assert_eq!(h.running_id(), init);
    assert_eq!(h.call(Syscall::Yield, [99, YieldMode::TO, 0, 0]), Err(Error::InvalidId));
    assert_eq!(h.call(Syscall::Yield, [0, 7, 0, 0]), Err(Error::InvalidProperty));

    h.trap(Syscall::Yield, [b.raw(), YieldMode::TO, 0, 0]);
    assert_eq!(h.running_id(), b);
    assert_eq!(h.result_of(init), Ok(1));
    assert_eq!(h.state(init), ThreadState::Ready);
}

#[test]
fn wait_parks_until_woken() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let t = h.spawn(0x200, 0);
    yield_any(&mut h);
    assert_eq!(h.running_id(), t);

    h.trap(Syscall::ThreadWait, [0; 4]);
    assert_eq!(h.state(t), ThreadState::Waiting(WaitReason::Wake));
    assert_eq!(h.running_id(), init);

    assert_eq!(h.call(Syscall::ThreadWake, [t.raw(), 0, 0, 0]), Ok(1));
    assert_eq!(h.state(t), ThreadState::Ready);
    assert_eq!(h.call(Syscall::ThreadWake, [t.raw(), 0, 0, 0]), Err(Error::NotRunnable));

    yield_any(&mut h);
    assert_eq!(h.running_id(), t);
    assert_eq!(h.result_of(t), Ok(0));
}

#[test]
fn only_waiting_threads_leave_idle() {
    let mut h = Harness::new();
    h.boot(0x100);
    assert_eq!(h.trap(Syscall::ThreadWait, [0; 4]), Dispatch::Idle);
    assert_eq!(h.tick(), Dispatch::Idle);
}

#[test]
fn cancel_retires_other_threads_and_self() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let t = h.spawn(0x200, 0);
    assert!(h.kernel.heap().owned_by(t) > 0);

    assert_eq!(h.call(Syscall::ThreadCancel, [t.raw(), 0, 0, 0]), Ok(1));
    assert_eq!(h.state(t), ThreadState::Cancelled);
    assert_eq!(h.kernel.heap().owned_by(t), 0);
    assert_eq!(h.call(Syscall::ThreadCancel, [t.raw(), 0, 0, 0]), Err(Error::NotRunnable));

    let u = h.spawn(0x300, 0);
    h.trap(Syscall::ThreadCancel, [CURRENT_THREAD, 0, 0, 0]);
    assert_eq!(h.state(init), ThreadState::Cancelled);
    assert_eq!(h.running_id(), u);
}

#[test]
fn exit_frees_everything_the_thread_allocated() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let block = h.call(Syscall::Alloc, [64, 0, 0, 0]).unwrap();
    assert_eq!(h.kernel.heap().owner_of(block), Some(init));

    assert_eq!(h.trap(Syscall::ThreadExit, [0; 4]), Dispatch::Halted);
    assert_eq!(h.state(init), ThreadState::Finished);
    assert_eq!(h.kernel.heap().owned_by(init), 0);
    assert_eq!(h.kernel.heap().stats().live_blocks, 0);
}

#[test]
fn join_blocks_until_the_target_exits() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let worker = h.spawn(0x200, 0);
    let state_ptr = h.place_word(0xFFFF);

    h.trap(Syscall::ThreadJoin, [worker.raw(), state_ptr, 0, 0]);
    assert_eq!(h.state(init), ThreadState::Waiting(WaitReason::Join(worker)));
    assert_eq!(h.running_id(), worker);

    h.trap(Syscall::ThreadExit, [3, 0, 0, 0]);
    assert_eq!(h.running_id(), init);
    assert_eq!(h.result_of(init), Ok(1));
    assert_eq!(h.read_word(state_ptr), ThreadState::Finished.code());
}

#[test]
fn join_never_returns_while_the_target_lives() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let worker = h.spawn(0x200, 0);
    h.trap(Syscall::ThreadJoin, [worker.raw(), 0, 0, 0]);

    for _ in 0..5 {
        assert_eq!(h.running_id(), worker);
        yield_any(&mut h);
        h.tick();
    }
    // A spurious wake re-checks the target and parks the joiner again.
    assert_eq!(h.call(Syscall::ThreadWake, [init.raw(), 0, 0, 0]), Ok(1));
    yield_any(&mut h);
    assert_eq!(h.running_id(), worker);
    assert_eq!(h.state(init), ThreadState::Waiting(WaitReason::Join(worker)));
}

#[test]
fn join_fails_fast_or_succeeds_on_terminal_targets() {
    let mut h = Harness::new();
    h.boot(0x100);
    let t = h.spawn(0x200, 0);
    assert_eq!(h.call(Syscall::ThreadJoin, [42, 0, 0, 0]), Err(Error::InvalidId));
    assert_eq!(h.call(Syscall::ThreadJoin, [CURRENT_THREAD, 0, 0, 0]), Err(Error::NotRunnable));

    h.call(Syscall::ThreadCancel, [t.raw(), 0, 0, 0]).unwrap();
    let state_ptr = h.place_word(0);
    assert_eq!(h.call(Syscall::ThreadJoin, [t.raw(), state_ptr, 0, 0]), Ok(1));
    assert_eq!(h.read_word(state_ptr), ThreadState::Cancelled.code());
}

#[test]
fn full_table_reports_table_full_and_keeps_no_stack() {
    let mut h = Harness::with_kernel(Kernel::builder(config().max_threads(2).build()).build());
    h.boot(0x100);
    h.spawn(0x200, 0);
    assert_eq!(h.call(Syscall::AddThread, [0, 0, 0x300, 0]), Err(Error::TableFull));
    assert_eq!(h.kernel.heap().owned_by(ThreadId(2)), 0);
}

#[test]
fn stale_ids_are_rejected_after_slot_reuse() {
    let mut h = Harness::with_kernel(Kernel::builder(config().max_threads(2).build()).build());
    h.boot(0x100);
    let old = h.spawn(0x200, 0);
    h.call(Syscall::ThreadCancel, [old.raw(), 0, 0, 0]).unwrap();

    let new = h.spawn(0x300, 0);
    assert_eq!(new, ThreadId(2));
    let out = h.place_word(0);
    assert_eq!(
        h.call(Syscall::GetThreadProperty, [old.raw(), Property::State as Word, out, 0]),
        Err(Error::InvalidId)
    );
    assert_eq!(h.call(Syscall::ThreadJoin, [old.raw(), 0, 0, 0]), Err(Error::InvalidId));
}

#[test]
fn round_robin_is_fair_under_preemption() {
    let mut h = Harness::new();
    h.boot(0x100);
    for entry in [0x200, 0x300, 0x400] {
        h.spawn(entry, 0);
    }
    let mut window = Vec::new();
    for _ in 0..4 {
        h.tick();
        window.push(h.running_id());
    }
    window.sort_unstable();
    window.dedup();
    assert_eq!(window.len(), 4);
}

#[test]
fn unknown_calls_fail_without_side_effects() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    h.trap_raw(99, [0; 4]);
    assert_eq!(h.running_id(), init);
    assert_eq!(h.result_of(init), Err(Error::InvalidSyscall));
}

#[test]
fn faulting_threads_are_cancelled() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let t = h.spawn(0x200, 0);
    let frame = h.running.unwrap().1;
    let dispatch = h.kernel.fault(&mut h.mem, frame);
    h.apply(dispatch);
    assert_eq!(h.state(init), ThreadState::Cancelled);
    assert_eq!(h.running_id(), t);
}

#[test]
fn argument_blocks_at_the_top_of_memory_are_bad_addresses() {
    let mut h = Harness::new();
    h.boot(0x100);
    for args in [0xFFFF_FFF8, 0xFFFF_FFFC, 0xFFFF_FFFF] {
        assert_eq!(
            h.call(Syscall::AddThread, [0, args, 0x300, 0]),
            Err(Error::BadAddress)
        );
    }
    assert_eq!(h.kernel.threads().count(), 1);
}

#[test]
fn registers_past_a_calls_arity_are_ignored() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let junk = [0xDEAD_BEEF, 0xFFFF_FFFF, 0x8000_0000];

    let block = h.call(Syscall::Alloc, [16, junk[0], junk[1], junk[2]]).unwrap();
    assert_eq!(h.kernel.heap().owner_of(block), Some(init));
    assert_eq!(h.call(Syscall::Free, [block, junk[0], junk[1], junk[2]]), Ok(1));
    let flags = h.kernel.flags().bits();
    assert_eq!(
        h.call(Syscall::GetKernelConfig, [junk[0], junk[1], junk[2], junk[0]]),
        Ok(flags)
    );
}
