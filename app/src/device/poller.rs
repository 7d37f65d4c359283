use super::{as_handler, stats::Statistics, BurstCons, BurstProd, DataHandler};
use crate::{burst::SampleBurst, error::Result, resampler::Resampler};
use common::config::{CHANNEL_COUNT, POLL_BATCH, POLL_IDLE};
use ringbuf::traits::*;
use std::{
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::sleep,
};

/// Processing applied by the poller during a measurement.
pub struct Pipeline {
    pub deltas: Option<Vec<f32>>,
    pub resampler: Option<Resampler>,
    pub burst_size: usize,
}

/// Drains the queue, processes bursts and delivers them to the handler.
pub struct Poller {
    queue: BurstCons,
    recycle: BurstProd,
    stats: Arc<Statistics>,
    pipeline: Pipeline,
    buffer: SampleBurst,
    /// Losses to be reported with the next delivery.
    lost: u64,
    handler: DataHandler,
}

impl Poller {
    pub fn new(
        queue: BurstCons,
        recycle: BurstProd,
        stats: Arc<Statistics>,
        pipeline: Pipeline,
        handler: DataHandler,
    ) -> Self {
        Self {
            queue,
            recycle,
            stats,
            pipeline,
            buffer: SampleBurst::new(CHANNEL_COUNT),
            lost: 0,
            handler,
        }
    }

    fn subtract_deltas(&self, burst: &mut SampleBurst) {
        if let Some(deltas) = &self.pipeline.deltas {
            for (samples, delta) in burst.channels_mut().iter_mut().zip(deltas) {
                samples.iter_mut().for_each(|x| *x -= delta);
            }
        }
    }

    /// Pops up to [`POLL_BATCH`] bursts, returns `false` if the queue was empty.
    pub fn poll(&mut self) -> Result<bool> {
        self.lost += self.stats.fetcher.take_lost();

        let mut records = SampleBurst::new(CHANNEL_COUNT);
        let mut count = 0;
        while count < POLL_BATCH {
            let mut burst = match self.queue.try_pop() {
                Some(burst) => burst,
                None => break,
            };
            count += 1;

            self.subtract_deltas(&mut burst);
            match &mut self.pipeline.resampler {
                Some(resampler) => records.append(resampler.apply(&burst))?,
                None => records.extend_from(&burst)?,
            }
            burst.clear();
            // Dropped if the fetcher has enough spare buffers.
            let _ = self.recycle.try_push(burst);
        }
        if count == 0 {
            return Ok(false);
        }

        if self.buffer.is_empty() && records.size() >= self.pipeline.burst_size {
            self.deliver(records);
        } else {
            self.buffer.append(records)?;
            if self.buffer.size() >= self.pipeline.burst_size {
                let burst = mem::replace(&mut self.buffer, SampleBurst::new(CHANNEL_COUNT));
                self.deliver(burst);
            }
        }
        Ok(true)
    }

    fn deliver(&mut self, burst: SampleBurst) {
        let lost = mem::take(&mut self.lost);
        self.stats.poller.report_delivery(burst.size());
        let handler = &mut self.handler;
        as_handler(|| handler(burst, lost));
    }

    /// Flushes the resampler and delivers the remainder.
    pub fn finish(&mut self) -> Result<()> {
        if let Some(resampler) = &mut self.pipeline.resampler {
            self.buffer.append(resampler.flush())?;
        }
        if !self.buffer.is_empty() {
            let burst = mem::replace(&mut self.buffer, SampleBurst::new(CHANNEL_COUNT));
            self.lost = 0;
            self.deliver(burst);
        }
        Ok(())
    }

    pub fn run(mut self, measuring: &AtomicBool) {
        log::debug!("Poller started");
        while measuring.load(Ordering::Acquire) {
            match self.poll() {
                Ok(true) => (),
                Ok(false) => sleep(POLL_IDLE),
                Err(err) => {
                    log::error!("Poller failed: {}", err);
                    break;
                }
            }
        }
        if let Err(err) = self.finish() {
            log::error!("Cannot flush the poller: {}", err);
        }
        log::debug!("Poller stopped");
    }
}
