//! # amt-kernel - Single-Core Microkernel
//!
//! A preemptive, round-robin microkernel for a single flat address space.
//! User threads trap into the kernel through a fixed syscall ABI; a periodic
//! timer interrupt bounds how long any thread keeps the CPU.
//!
//! ## Architecture
//!
//! The kernel never runs user code itself. A port saves the interrupted
//! register frame, calls one of the kernel entry points and restores
//! whatever context the returned [`Dispatch`] names. Everything in between
//! is architecture independent.
//!
//! ## Module Overview
//!
//! - [`abi`] - Syscall numbers, properties and result encoding
//! - [`context`] - Saved register frames
//! - [`thread`] - Thread control blocks, states and permissions
//! - [`table`] - Fixed-capacity thread table with stale-id detection
//! - [`scheduler`] - Round-robin selection
//! - [`heap`] - Per-thread allocator with whole-thread teardown
//! - [`kernel`] - Kernel instance, configuration and entry points
//! - [`global`] - Interrupt-safe global instance for targets
//! - [`timer`] - Tick source interface
//! - [`loader`] - File-backed program resolution

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod abi;
pub mod context;
pub mod error;
pub mod global;
pub mod heap;
mod ipc;
pub mod kernel;
pub mod loader;
pub mod memory;
mod mutex;
mod property;
pub mod scheduler;
mod syscall;
pub mod table;
pub mod thread;
pub mod timer;
pub mod trace;

#[cfg(test)]
mod tests;

pub use abi::{Property, Syscall, Word, CURRENT_THREAD, INVALID_THREAD};
pub use context::RegisterContext;
pub use error::{Error, KResult};
pub use heap::{HeapStats, ThreadHeap};
pub use kernel::{Dispatch, Kernel, KernelBuilder, KernelConfig, KernelFlags};
pub use loader::ProgramLoader;
pub use memory::AddressSpace;
pub use thread::{Permissions, Tcb, ThreadEntry, ThreadId, ThreadState, WaitReason};
pub use timer::Timer;
pub use trace::{TraceError, TraceHook};
