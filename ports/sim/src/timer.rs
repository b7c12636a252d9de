//! Step-counting stand-in for a hardware tick source.

use amt_kernel::{Timer, Word};

/// Down-counter that expires every `reload` executed steps.
#[derive(Debug, Clone)]
pub struct SimTimer {
    reload: Word,
    current: Word,
    enabled: bool,
}

impl SimTimer {
    /// A `reload` of 0 never expires.
    pub fn new(reload: Word) -> Self {
        Self {
            reload,
            current: reload,
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Counts one step; true when the counter wrapped.
    pub fn advance(&mut self) -> bool {
        if !self.enabled || self.reload == 0 {
            return false;
        }
        self.current -= 1;
        if self.current == 0 {
            self.current = self.reload;
            return true;
        }
        false
    }
}

impl Timer for SimTimer {
    fn enable(&mut self) {
        self.current = self.reload;
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn read(&self) -> Word {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_every_reload_steps_while_enabled() {
        let mut timer = SimTimer::new(3);
        assert!(!timer.advance());
        timer.enable();
        let fired: Vec<bool> = (0..6).map(|_| timer.advance()).collect();
        assert_eq!(fired, [false, false, true, false, false, true]);
        assert_eq!(timer.read(), 3);
        timer.disable();
        assert!(!timer.advance());
    }

    #[test]
    fn zero_reload_never_fires() {
        let mut timer = SimTimer::new(0);
        timer.enable();
        assert!((0..10).all(|_| !timer.advance()));
    }
}
