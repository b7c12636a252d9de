//! Host simulator port for the AMT microkernel.
//!
//! A [`Machine`] stands in for a single-core target: programs are Rust
//! routines placed in a simulated code region, RAM is a byte vector, and a
//! step counter plays the timer interrupt. Every trap goes through the same
//! [`amt_kernel::Kernel`] entry points a hardware port would call.
//!
//! ```no_run
//! use amt_sim::{demo, Machine, MachineConfig, RunOutcome};
//!
//! let builder = demo::install(Machine::builder(MachineConfig::default())).unwrap();
//! let mut machine = builder.build().unwrap();
//! machine.boot("setup", [0; 4]).unwrap();
//! assert_eq!(machine.run(10_000).unwrap(), RunOutcome::Halted);
//! for line in machine.console().texts() {
//!     println!("{line}");
//! }
//! ```

// Host implementation of the critical-section hooks used by the kernel.
use critical_section as _;

pub mod code;
pub mod console;
pub mod cpu;
pub mod demo;
pub mod error;
pub mod machine;
pub mod ram;
pub mod timer;

pub use code::{CodeSpace, Routine, Step};
pub use console::{Console, Line};
pub use cpu::Cpu;
pub use error::SimError;
pub use machine::{Machine, MachineBuilder, MachineConfig, RunOutcome};
pub use ram::Ram;
pub use timer::SimTimer;
