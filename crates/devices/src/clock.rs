use std::cell::Cell;
use std::rc::Rc;

/// Monotonic virtual time source, in nanoseconds.
///
/// Devices own a clock handle and sample it inside their callbacks; the
/// embedder decides how virtual time advances.
pub trait Clock {
    fn now_ns(&self) -> u64;
}

/// Manually-advanced clock for tests and deterministic harnesses.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the device under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_ns(&self, ns: u64) {
        self.now_ns.set(self.now_ns.get() + ns);
    }

    pub fn set_ns(&self, ns: u64) {
        self.now_ns.set(ns);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance_ns(1_000);
        assert_eq!(other.now_ns(), 1_000);
    }
}
