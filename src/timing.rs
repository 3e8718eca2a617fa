//! Phase timing counters for the CLI tools.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulates wall-clock time per named phase and renders one summary line
/// per phase.
#[derive(Default)]
pub struct PhaseTimings {
    counts: HashMap<String, u64>,
    totals_us: HashMap<String, u64>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: &str, elapsed: Duration) {
        *self.counts.entry(phase.to_string()).or_insert(0) += 1;
        *self.totals_us.entry(phase.to_string()).or_insert(0) += elapsed.as_micros() as u64;
    }

    /// Runs `f`, charging its wall-clock time to `phase`.
    pub fn time<T>(&mut self, phase: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(phase, start.elapsed());
        out
    }

    pub fn summary_line(&self, phase: &str) -> String {
        let count = *self.counts.get(phase).unwrap_or(&0);
        let total = *self.totals_us.get(phase).unwrap_or(&0);
        let avg = if count == 0 { 0 } else { total / count };
        format!("timing phase={phase} count={count} total_us={total} avg_us={avg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let mut timings = PhaseTimings::new();
        timings.record("serialize", Duration::from_micros(1500));
        timings.record("serialize", Duration::from_micros(500));
        let line = timings.summary_line("serialize");
        assert!(line.contains("phase=serialize"));
        assert!(line.contains("count=2"));
        assert!(line.contains("total_us=2000"));
        assert!(line.contains("avg_us=1000"));
    }

    #[test]
    fn test_unknown_phase_is_zeroed() {
        let timings = PhaseTimings::new();
        assert!(timings.summary_line("construct").contains("count=0"));
    }

    #[test]
    fn test_time_returns_closure_output() {
        let mut timings = PhaseTimings::new();
        let out = timings.time("construct", || 41 + 1);
        assert_eq!(out, 42);
        assert!(timings.summary_line("construct").contains("count=1"));
    }
}
