use super::{reader::Reader, stats::Statistics, BurstCons, BurstProd};
use crate::{burst::SampleBurst, gpio::Gpio};
use common::config::{BURST_RESERVE, CHANNEL_COUNT};
use ringbuf::traits::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Reads bursts from the board and pushes them to the queue.
pub struct Fetcher<G: Gpio> {
    reader: Reader<G>,
    queue: BurstProd,
    /// Emptied bursts returned by the poller.
    recycled: BurstCons,
    stats: Arc<Statistics>,
}

impl<G: Gpio> Fetcher<G> {
    pub fn new(reader: Reader<G>, queue: BurstProd, recycled: BurstCons, stats: Arc<Statistics>) -> Self {
        Self {
            reader,
            queue,
            recycled,
            stats,
        }
    }

    fn take_buffer(&mut self) -> SampleBurst {
        self.recycled
            .try_pop()
            .unwrap_or_else(|| SampleBurst::with_capacity(CHANNEL_COUNT, BURST_RESERVE))
    }

    /// Fetches a single burst. Never blocks on a full queue.
    pub fn fetch(&mut self) {
        let mut burst = self.take_buffer();
        if self.reader.read_burst(&mut burst) {
            self.stats.fetcher.report_overflow();
        }
        self.stats.fetcher.report_burst(burst.size());
        if self.queue.try_push(burst).is_err() {
            self.stats.fetcher.report_lost_full(1);
        }
    }

    pub fn run(mut self, measuring: &AtomicBool) {
        log::debug!("Fetcher started");
        while measuring.load(Ordering::Acquire) {
            self.fetch();
        }
        log::debug!("Fetcher stopped");
    }
}
