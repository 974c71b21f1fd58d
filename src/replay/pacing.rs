//! Scaled inter-record scheduling

use crate::config::PACING_SLICE_MS;
use crate::error::{ReplayError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Cloneable stop signal for a running replay
///
/// Cancelling is one-way; once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct ReplayCancel(Arc<AtomicBool>);

impl ReplayCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ReplayError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Spaces dispatches by the original timestamp deltas divided by a ratio
///
/// Deadlines accumulate from a fixed start instant, so a slow execution or
/// oversleep on one record is absorbed by the next wait instead of drifting.
#[derive(Debug)]
pub struct Pacer {
    started: Instant,
    last_ts: u64,
    /// Scaled offset of the next deadline from `started`
    target: Duration,
    ratio: f64,
    strict: bool,
}

impl Pacer {
    /// `header_ts` is the baseline the first record's delay is measured from
    pub fn new(header_ts: u64, ratio: f64, strict: bool) -> Self {
        Self {
            started: Instant::now(),
            last_ts: header_ts,
            target: Duration::ZERO,
            ratio,
            strict,
        }
    }

    /// Scaled delay between the previous timestamp and `ts`
    fn advance(&mut self, ts: u64) -> Result<Duration> {
        if ts < self.last_ts {
            if self.strict {
                return Err(ReplayError::corruption(
                    "replay",
                    format!("timestamp {} precedes previous {}", ts, self.last_ts),
                ));
            }
            warn!(
                timestamp = ts,
                previous = self.last_ts,
                "Trace timestamp went backwards, dispatching without delay"
            );
            return Ok(Duration::ZERO);
        }

        let delta_us = (ts - self.last_ts) as f64 / self.ratio;
        self.last_ts = ts;
        Ok(Duration::try_from_secs_f64(delta_us / 1_000_000.0).unwrap_or(Duration::MAX))
    }

    /// Block until the record stamped `ts` is due, or the replay is cancelled
    pub fn wait(&mut self, ts: u64, cancel: &ReplayCancel) -> Result<()> {
        let delay = self.advance(ts)?;
        self.target = self.target.saturating_add(delay);
        // Unrepresentable deadlines only end through cancellation
        let deadline = self.started.checked_add(self.target);

        let slice = Duration::from_millis(PACING_SLICE_MS);
        loop {
            cancel.check()?;
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => slice,
            };
            if remaining.is_zero() {
                return Ok(());
            }
            std::thread::sleep(remaining.min(slice));
        }
    }

    /// Total scaled delay scheduled so far
    pub fn scheduled(&self) -> Duration {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_is_relative_to_header() {
        let mut pacer = Pacer::new(1_000, 1.0, false);
        assert_eq!(pacer.advance(6_000).unwrap(), Duration::from_millis(5));
        assert_eq!(pacer.advance(6_000).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_ratio_scales_delay() {
        let mut pacer = Pacer::new(0, 4.0, false);
        assert_eq!(pacer.advance(40_000).unwrap(), Duration::from_millis(10));
    }

    #[test]
    fn test_backwards_timestamp_lenient() {
        let mut pacer = Pacer::new(100, 1.0, false);
        assert_eq!(pacer.advance(50).unwrap(), Duration::ZERO);
        // The baseline stays at the larger timestamp.
        assert_eq!(pacer.advance(1_100).unwrap(), Duration::from_millis(1));
    }

    #[test]
    fn test_backwards_timestamp_strict() {
        let mut pacer = Pacer::new(100, 1.0, true);
        assert!(pacer.advance(50).unwrap_err().is_corruption());
    }

    #[test]
    fn test_wait_sleeps_for_scaled_delta() {
        let cancel = ReplayCancel::new();
        let mut pacer = Pacer::new(0, 1.0, false);
        let start = Instant::now();
        pacer.wait(20_000, &cancel).unwrap();
        pacer.wait(40_000, &cancel).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(pacer.scheduled(), Duration::from_millis(40));
    }

    #[test]
    fn test_wait_observes_cancel() {
        let cancel = ReplayCancel::new();
        let mut pacer = Pacer::new(0, 1.0, false);
        let remote = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let start = Instant::now();
        // Ten seconds of trace time.
        let err = pacer.wait(10_000_000, &cancel).unwrap_err();
        handle.join().unwrap();
        assert!(err.is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(cancel.is_cancelled());
    }
}
