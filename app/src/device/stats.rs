use std::{
    fmt::{self, Display, Formatter, Write},
    sync::atomic::{fence, AtomicU64, Ordering},
};
use indenter::indented;

#[derive(Default)]
pub struct Statistics {
    pub fetcher: StatsFetcher,
    pub poller: StatsPoller,
}

#[derive(Default)]
pub struct StatsFetcher {
    bursts: AtomicU64,
    samples: AtomicU64,
    /// Bursts lost because the queue was full.
    lost_full: AtomicU64,
    /// Losses not yet reported to the data handler.
    lost_pending: AtomicU64,
    /// Board memory overflows.
    overflows: AtomicU64,
}

#[derive(Default)]
pub struct StatsPoller {
    deliveries: AtomicU64,
    samples: AtomicU64,
}

/// Plain copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub bursts_fetched: u64,
    pub samples_fetched: u64,
    pub bursts_lost: u64,
    pub overflows: u64,
    pub deliveries: u64,
    pub samples_delivered: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn reset(&self) {
        self.fetcher.reset();
        self.poller.reset();
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        fence(Ordering::Acquire);
        StatisticsSnapshot {
            bursts_fetched: self.fetcher.bursts.load(Ordering::Relaxed),
            samples_fetched: self.fetcher.samples.load(Ordering::Relaxed),
            bursts_lost: self.fetcher.lost_full.load(Ordering::Relaxed),
            overflows: self.fetcher.overflows.load(Ordering::Relaxed),
            deliveries: self.poller.deliveries.load(Ordering::Relaxed),
            samples_delivered: self.poller.samples.load(Ordering::Relaxed),
        }
    }
}

impl StatsFetcher {
    pub fn reset(&self) {
        fence(Ordering::Acquire);
        self.bursts.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        self.lost_full.store(0, Ordering::Relaxed);
        self.lost_pending.store(0, Ordering::Relaxed);
        self.overflows.store(0, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    pub fn report_burst(&self, samples: usize) {
        self.bursts.fetch_add(1, Ordering::AcqRel);
        self.samples.fetch_add(samples as u64, Ordering::AcqRel);
    }
    pub fn report_lost_full(&self, count: usize) {
        self.lost_full.fetch_add(count as u64, Ordering::AcqRel);
        self.lost_pending.fetch_add(count as u64, Ordering::AcqRel);
    }
    pub fn report_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::AcqRel);
    }

    /// Reads and resets the losses since the previous call.
    pub fn take_lost(&self) -> u64 {
        self.lost_pending.swap(0, Ordering::AcqRel)
    }
}

impl StatsPoller {
    pub fn reset(&self) {
        fence(Ordering::Acquire);
        self.deliveries.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
        fence(Ordering::Release);
    }

    pub fn report_delivery(&self, samples: usize) {
        self.deliveries.fetch_add(1, Ordering::AcqRel);
        self.samples.fetch_add(samples as u64, Ordering::AcqRel);
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f)?;

        writeln!(f, "fetcher:")?;
        write!(indented(f).with_str("    "), "{}", self.fetcher)?;

        writeln!(f, "poller:")?;
        write!(indented(f).with_str("    "), "{}", self.poller)?;

        Ok(())
    }
}

impl Display for StatsFetcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fence(Ordering::Acquire);
        writeln!(f, "bursts: {}", self.bursts.load(Ordering::Relaxed))?;
        writeln!(f, "samples: {}", self.samples.load(Ordering::Relaxed))?;
        writeln!(f, "lost_full: {}", self.lost_full.load(Ordering::Relaxed))?;
        writeln!(f, "overflows: {}", self.overflows.load(Ordering::Relaxed))?;
        Ok(())
    }
}

impl Display for StatsPoller {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fence(Ordering::Acquire);
        writeln!(f, "deliveries: {}", self.deliveries.load(Ordering::Relaxed))?;
        writeln!(f, "samples: {}", self.samples.load(Ordering::Relaxed))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_is_taken_once() {
        let stats = Statistics::new();
        stats.fetcher.report_lost_full(2);
        stats.fetcher.report_lost_full(1);
        assert_eq!(stats.fetcher.take_lost(), 3);
        assert_eq!(stats.fetcher.take_lost(), 0);
        assert_eq!(stats.snapshot().bursts_lost, 3);
    }

    #[test]
    fn snapshot_and_reset() {
        let stats = Statistics::new();
        stats.fetcher.report_burst(10);
        stats.fetcher.report_burst(5);
        stats.fetcher.report_overflow();
        stats.poller.report_delivery(15);
        assert_eq!(
            stats.snapshot(),
            StatisticsSnapshot {
                bursts_fetched: 2,
                samples_fetched: 15,
                bursts_lost: 0,
                overflows: 1,
                deliveries: 1,
                samples_delivered: 15,
            }
        );
        stats.reset();
        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());
    }

    #[test]
    fn display() {
        let stats = Statistics::new();
        stats.poller.report_delivery(7);
        let text = stats.to_string();
        assert!(text.contains("fetcher:\n    bursts: 0\n"), "{}", text);
        assert!(text.contains("poller:\n    deliveries: 1\n    samples: 7\n"), "{}", text);
    }
}
