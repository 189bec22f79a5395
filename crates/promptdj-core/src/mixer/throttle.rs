//! Push throttle for mix updates
//!
//! Leading edge: the first change after a quiet interval is pushed at once.
//! Changes inside the interval collapse into one trailing push at
//! `last_push + interval`. The trailing push carries no payload; the caller
//! computes the mix when it fires so the latest state always wins.

use std::time::{Duration, Instant};

/// Default minimum spacing between pushes
pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushDecision {
    /// Push now, then call [`PushThrottle::record_push`]
    PushNow,
    /// A trailing push is now due at this instant
    Deferred(Instant),
    /// Already covered by a pending trailing push
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct PushThrottle {
    interval: Duration,
    last_push: Option<Instant>,
    pending: Option<Instant>,
}

impl Default for PushThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_INTERVAL)
    }
}

impl PushThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_push: None,
            pending: None,
        }
    }

    /// Ask to push the current mix
    pub fn request(&mut self, now: Instant) -> PushDecision {
        if self.pending.is_some() {
            return PushDecision::Coalesced;
        }
        match self.last_push {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                let deadline = last + self.interval;
                self.pending = Some(deadline);
                PushDecision::Deferred(deadline)
            }
            _ => PushDecision::PushNow,
        }
    }

    /// Whether the trailing push is due; clears it when it is
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(deadline) if deadline <= now => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn record_push(&mut self, now: Instant) {
        self.last_push = Some(now);
    }

    /// Drop a pending trailing push
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_leading_edge_then_trailing() {
        let t0 = Instant::now();
        let mut throttle = PushThrottle::new(ms(250));

        assert_eq!(throttle.request(t0), PushDecision::PushNow);
        throttle.record_push(t0);

        assert_eq!(throttle.request(t0 + ms(10)), PushDecision::Deferred(t0 + ms(250)));
        assert_eq!(throttle.request(t0 + ms(20)), PushDecision::Coalesced);
        assert_eq!(throttle.request(t0 + ms(200)), PushDecision::Coalesced);

        assert!(!throttle.poll(t0 + ms(249)));
        assert!(throttle.poll(t0 + ms(250)));
        assert!(!throttle.poll(t0 + ms(251)));
        throttle.record_push(t0 + ms(250));

        // Quiet interval elapsed again
        assert_eq!(throttle.request(t0 + ms(600)), PushDecision::PushNow);
    }

    #[test]
    fn test_cancel_drops_trailing_push() {
        let t0 = Instant::now();
        let mut throttle = PushThrottle::new(ms(250));
        throttle.record_push(t0);
        assert!(matches!(throttle.request(t0 + ms(1)), PushDecision::Deferred(_)));
        assert!(throttle.deadline().is_some());

        throttle.cancel();
        assert_eq!(throttle.deadline(), None);
        assert!(!throttle.poll(t0 + ms(1000)));
    }
}
