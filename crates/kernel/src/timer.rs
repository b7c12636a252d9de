//! Timer collaborator driving preemption.
//!
//! The platform programs a periodic counter through [`Timer`] and routes its
//! interrupt to [`crate::Kernel::tick`] (or [`crate::global::tick_entry`] on a
//! target). Each tick preempts the running thread.

use crate::abi::Word;

/// Periodic tick source.
pub trait Timer {
    /// Starts the counter and unmasks its interrupt.
    fn enable(&mut self);

    /// Masks the interrupt and stops the counter.
    fn disable(&mut self);

    /// Current counter value.
    fn read(&self) -> Word;
}

/// SysTick driver for Cortex-M targets.
#[cfg(target_arch = "arm")]
pub struct SysTick {
    syst: cortex_m::peripheral::SYST,
    reload: u32,
}

#[cfg(target_arch = "arm")]
impl SysTick {
    /// Reload value giving a tick every 0x90000 core cycles.
    pub const DEFAULT_RELOAD: u32 = 0x08_FFFF;

    pub fn new(syst: cortex_m::peripheral::SYST, reload: u32) -> Self {
        Self {
            syst,
            reload: reload & 0x00FF_FFFF,
        }
    }
}

#[cfg(target_arch = "arm")]
impl Timer for SysTick {
    fn enable(&mut self) {
        use cortex_m::peripheral::syst::SystClkSource;

        self.syst.set_clock_source(SystClkSource::Core);
        self.syst.set_reload(self.reload);
        self.syst.clear_current();
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }

    fn disable(&mut self) {
        self.syst.disable_interrupt();
        self.syst.disable_counter();
    }

    fn read(&self) -> Word {
        cortex_m::peripheral::SYST::get_current()
    }
}
