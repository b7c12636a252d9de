//! The process-wide kernel instance used on targets.
//!
//! Exception handlers reach the kernel through these entry points; each runs
//! inside `critical_section::with`, so kernel state is only ever touched with
//! interrupts masked.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::abi::Word;
use crate::context::RegisterContext;
use crate::kernel::{Dispatch, Kernel};
use crate::memory::AddressSpace;
use crate::thread::ThreadId;

static KERNEL: Mutex<RefCell<Option<Kernel>>> = Mutex::new(RefCell::new(None));

/// Installs `kernel` as the global instance, returning the previous one.
pub fn install(kernel: Kernel) -> Option<Kernel> {
    critical_section::with(|cs| KERNEL.borrow_ref_mut(cs).replace(kernel))
}

/// Removes the global instance.
pub fn uninstall() -> Option<Kernel> {
    critical_section::with(|cs| KERNEL.borrow_ref_mut(cs).take())
}

/// Creates the first thread and installs the kernel.
///
/// # Panics
///
/// Panics if the first thread cannot be created; the system has nothing to
/// run in that case.
pub fn boot(mut kernel: Kernel, name: &str, entry: Word, args: [Word; 4]) -> ThreadId {
    let id = match kernel.boot(name, entry, args) {
        Ok(id) => id,
        Err(err) => panic!("cannot create the first thread: {err}"),
    };
    install(kernel);
    id
}

/// Runs `f` against the global kernel, if one is installed.
pub fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
    critical_section::with(|cs| KERNEL.borrow_ref_mut(cs).as_mut().map(f))
}

/// Selects the first thread to run.
pub fn start(mem: &mut dyn AddressSpace) -> Dispatch {
    with(|kernel| kernel.start(mem)).unwrap_or(Dispatch::Halted)
}

/// Supervisor call handler.
pub fn svc_entry(mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
    with(|kernel| kernel.syscall(mem, frame)).unwrap_or(Dispatch::Halted)
}

/// Timer interrupt handler.
pub fn tick_entry(mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
    with(|kernel| kernel.tick(mem, frame)).unwrap_or(Dispatch::Halted)
}

/// Fault handler for the running thread.
pub fn fault_entry(mem: &mut dyn AddressSpace, frame: RegisterContext) -> Dispatch {
    with(|kernel| kernel.fault(mem, frame)).unwrap_or(Dispatch::Halted)
}

/// Waits for the next interrupt while no thread is ready.
pub fn idle() {
    #[cfg(target_arch = "arm")]
    {
        cortex_m::asm::wfi();
    }

    #[cfg(not(target_arch = "arm"))]
    {
        core::hint::spin_loop();
    }
}
