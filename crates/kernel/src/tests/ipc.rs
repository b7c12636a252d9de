use super::support::Harness;
use crate::abi::{Syscall, YieldMode, INVALID_THREAD};
use crate::error::Error;
use crate::thread::{ThreadState, WaitReason};

#[test]
fn full_mailbox_keeps_the_first_message() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let dest = h.spawn(0x200, 0);

    assert_eq!(h.call(Syscall::SendMsg, [dest.raw(), 11, 0, 0]), Ok(1));
    assert_eq!(h.call(Syscall::SendMsg, [dest.raw(), 22, 0, 0]), Err(Error::MailboxFull));
    assert_eq!(h.kernel.thread(dest).unwrap().mailbox(), Some((init, 11)));

    h.trap(Syscall::Yield, [INVALID_THREAD, YieldMode::ANY, 0, 0]);
    assert_eq!(h.running_id(), dest);
    let sender = h.place_word(0);
    let message = h.place_word(0);
    assert_eq!(h.call(Syscall::GetMsg, [sender, message, 0, 0]), Ok(1));
    assert_eq!(h.read_word(sender), init.raw());
    assert_eq!(h.read_word(message), 11);
    assert_eq!(h.call(Syscall::GetMsg, [sender, message, 0, 0]), Err(Error::MailboxEmpty));
}

#[test]
fn failed_delivery_leaves_the_mailbox_intact() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    h.call(Syscall::SendMsg, [init.raw(), 5, 0, 0]).unwrap();
    assert_eq!(h.call(Syscall::GetMsg, [0x10, 0, 0, 0]), Err(Error::BadAddress));
    assert_eq!(h.kernel.thread(init).unwrap().mailbox(), Some((init, 5)));
    assert_eq!(h.call(Syscall::GetMsg, [0, 0, 0, 0]), Ok(1));
    assert_eq!(h.kernel.thread(init).unwrap().mailbox(), None);
}

#[test]
fn wait_msg_parks_until_a_message_arrives() {
    let mut h = Harness::new();
    let init = h.boot(0x100);
    let receiver = h.spawn(0x200, 0);
    h.trap(Syscall::Yield, [INVALID_THREAD, YieldMode::ANY, 0, 0]);
    assert_eq!(h.running_id(), receiver);

    let message = h.place_word(0);
    h.trap(Syscall::WaitMsg, [0, message, 0, 0]);
    assert_eq!(h.state(receiver), ThreadState::Waiting(WaitReason::Message));
    assert_eq!(h.running_id(), init);

    assert_eq!(h.call(Syscall::SendMsg, [receiver.raw(), 77, 0, 0]), Ok(1));
    assert_eq!(h.state(receiver), ThreadState::Ready);
    assert_eq!(h.read_word(message), 77);
    assert_eq!(h.kernel.thread(receiver).unwrap().mailbox(), None);
    assert_eq!(h.result_of(receiver), Ok(1));
}

#[test]
fn messages_to_terminal_threads_are_refused() {
    let mut h = Harness::new();
    h.boot(0x100);
    let t = h.spawn(0x200, 0);
    h.call(Syscall::ThreadCancel, [t.raw(), 0, 0, 0]).unwrap();
    assert_eq!(h.call(Syscall::SendMsg, [t.raw(), 1, 0, 0]), Err(Error::NotRunnable));
}
