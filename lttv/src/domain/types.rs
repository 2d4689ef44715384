//! Domain types providing compile-time safety and self-documentation
//!
//! Newtype wrappers prevent common bugs like passing a tsc where a cpu
//! index is expected, and make function signatures self-documenting.

use std::fmt;

/// Process ID. `Pid(0)` is the per-CPU idle process, keyed by `(Pid(0), Cpu)`
/// rather than by pid alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl Pid {
    pub const IDLE: Pid = Pid(0);

    #[must_use]
    pub fn is_idle(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

/// CPU index within a trace (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cpu(pub u32);

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu:{}", self.0)
    }
}

/// Time-stamp counter: a monotonically increasing 64-bit cycle count, scaled
/// to wall time only for display via the trace header's frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Tsc(pub u64);

impl Tsc {
    pub const ZERO: Tsc = Tsc(0);
    pub const MAX: Tsc = Tsc(u64::MAX);

    /// Convert to seconds given a cycle frequency in kHz.
    #[must_use]
    pub fn as_seconds(self, freq_khz: u64) -> f64 {
        if freq_khz == 0 {
            return 0.0;
        }
        self.0 as f64 / (freq_khz as f64 * 1000.0)
    }
}

impl fmt::Display for Tsc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric event id, scoped to one channel's marker registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u16);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Index of a Trace within a Traceset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceIndex(pub usize);

/// Index of a per-CPU stream (tracefile) within a Trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamIndex(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_idle() {
        assert!(Pid::IDLE.is_idle());
        assert!(Pid(0).is_idle());
        assert!(!Pid(42).is_idle());
    }

    #[test]
    fn tsc_to_seconds() {
        // 1 MHz counter, 2_000_000 cycles => 2 seconds
        let tsc = Tsc(2_000_000);
        assert!((tsc.as_seconds(1_000) - 2.0).abs() < 1e-9);
        assert_eq!(Tsc(100).as_seconds(0), 0.0);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Tsc(10) < Tsc(20));
        assert!(Cpu(0) < Cpu(1));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Pid(7).to_string(), "pid:7");
        assert_eq!(Cpu(3).to_string(), "cpu:3");
        assert_eq!(EventId(12).to_string(), "event#12");
    }
}
