use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide event counters, logged periodically and on shutdown. This is
/// deliberately not a metrics-exporter integration (no Prometheus/StatsD
/// client) — the observability surface is structured logs, but a handful of
/// plain counters are cheap and useful for diagnosing firehose health.
#[derive(Default)]
pub struct Counters {
    pub events_received: AtomicU64,
    pub events_accepted: AtomicU64,
    pub events_rejected: AtomicU64,
    pub reconnects: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.events_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_accepted: self.events_accepted.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CountersSnapshot {
    pub events_received: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
    pub reconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = Counters::new();
        counters.record_received();
        counters.record_received();
        counters.record_accepted();
        counters.record_rejected();
        counters.record_reconnect();

        let snap = counters.snapshot();
        assert_eq!(snap.events_received, 2);
        assert_eq!(snap.events_accepted, 1);
        assert_eq!(snap.events_rejected, 1);
        assert_eq!(snap.reconnects, 1);
    }
}
