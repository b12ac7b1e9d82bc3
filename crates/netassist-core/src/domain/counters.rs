//! Received/sent byte counters shared across a session's tasks.
//!
//! Every inbound pump adds to the received total and the outbound dispatcher
//! adds to the sent total, possibly at the same time, so both are atomics.
//! The counters belong to one session instance; there is no process-wide
//! copy.

use std::sync::atomic::{AtomicU64, Ordering};

/// Label prefix shown in front of the received total.
pub const RECV_COUNT_LABEL: &str = "Recv count:";
/// Label prefix shown in front of the sent total.
pub const SEND_COUNT_LABEL: &str = "Send count:";

/// Monotonic byte counters, reset only on request.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    received: AtomicU64,
    sent: AtomicU64,
}

/// A point-in-time copy of both counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub received: u64,
    pub sent: u64,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` received bytes and returns the new total.
    pub fn add_received(&self, n: u64) -> u64 {
        self.received.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Adds `n` sent bytes and returns the new total.
    pub fn add_sent(&self, n: u64) -> u64 {
        self.sent.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.received.store(0, Ordering::Relaxed);
        self.sent.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received(),
            sent: self.sent(),
        }
    }
}

impl CounterSnapshot {
    /// Formats the received total, e.g. `"Recv count:42"`.
    pub fn received_label(&self) -> String {
        format!("{RECV_COUNT_LABEL}{}", self.received)
    }

    /// Formats the sent total, e.g. `"Send count:7"`.
    pub fn sent_label(&self) -> String {
        format!("{SEND_COUNT_LABEL}{}", self.sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = TrafficCounters::new();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn test_add_returns_running_total() {
        let counters = TrafficCounters::new();
        assert_eq!(counters.add_received(4), 4);
        assert_eq!(counters.add_received(6), 10);
        assert_eq!(counters.add_sent(3), 3);
        assert_eq!(counters.snapshot(), CounterSnapshot { received: 10, sent: 3 });
    }

    #[test]
    fn test_reset_zeroes_both_counters() {
        let counters = TrafficCounters::new();
        counters.add_received(10);
        counters.add_sent(20);
        counters.reset();
        assert_eq!(counters.received(), 0);
        assert_eq!(counters.sent(), 0);
    }

    #[test]
    fn test_labels_match_ui_text() {
        let snapshot = CounterSnapshot { received: 42, sent: 0 };
        assert_eq!(snapshot.received_label(), "Recv count:42");
        assert_eq!(snapshot.sent_label(), "Send count:0");
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        // Arrange
        let counters = Arc::new(TrafficCounters::new());

        // Act
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.add_received(1);
                        c.add_sent(2);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Assert
        assert_eq!(counters.received(), 8000);
        assert_eq!(counters.sent(), 16000);
    }
}
