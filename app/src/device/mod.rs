mod fetcher;
mod poller;
mod reader;
mod stats;

pub use fetcher::Fetcher;
pub use poller::{Pipeline, Poller};
pub use reader::{data_byte, decode_chunk, ChannelCorrection, Reader};
pub use stats::{Statistics, StatisticsSnapshot, StatsFetcher, StatsPoller};

use crate::{burst::SampleBurst, error::Result};
use ringbuf::{traits::*, HeapRb};
use std::{
    cell::Cell,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

pub type BurstQueue = HeapRb<SampleBurst>;
pub type BurstProd = <BurstQueue as Split>::Prod;
pub type BurstCons = <BurstQueue as Split>::Cons;

/// Receives delivered bursts and the number of bursts lost since the previous delivery.
pub type DataHandler = Box<dyn FnMut(SampleBurst, u64) + Send>;

thread_local! {
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is running a data handler.
///
/// Stopping or restarting the measurement from there would join the calling thread.
pub fn in_handler() -> bool {
    IN_HANDLER.with(Cell::get)
}

/// Runs `f` with the current thread marked as running a data handler.
pub(crate) fn as_handler<R>(f: impl FnOnce() -> R) -> R {
    struct Reset(bool);
    impl Drop for Reset {
        fn drop(&mut self) {
            IN_HANDLER.with(|flag| flag.set(self.0));
        }
    }
    let _reset = Reset(IN_HANDLER.with(|flag| flag.replace(true)));
    f()
}

/// Worker threads of a running measurement.
pub struct Measurement {
    measuring: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Measurement {
    pub fn new() -> Self {
        Self {
            measuring: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
        }
    }

    /// Spawns a named worker running while the measurement is active.
    ///
    /// On failure already spawned workers are stopped.
    pub fn spawn<F>(&mut self, name: &str, worker: F) -> Result<()>
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let measuring = self.measuring.clone();
        match thread::Builder::new()
            .name(name.into())
            .spawn(move || worker(&measuring))
        {
            Ok(handle) => {
                self.workers.push(handle);
                Ok(())
            }
            Err(err) => {
                self.stop();
                Err(err.into())
            }
        }
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring.load(Ordering::Acquire)
    }

    /// Stops and joins all workers.
    pub fn stop(&mut self) {
        self.measuring.store(false, Ordering::Release);
        for handle in self.workers.drain(..) {
            let name = handle.thread().name().unwrap_or_default().to_string();
            if handle.join().is_err() {
                log::error!("Worker {} panicked", name);
            }
        }
    }
}

impl Default for Measurement {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::atomic::AtomicUsize, time::Duration};

    #[test]
    fn workers_stop_on_flag() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut measurement = Measurement::new();
        for name in ["a", "b"] {
            let counter = counter.clone();
            measurement
                .spawn(name, move |measuring| {
                    while measuring.load(Ordering::Acquire) {
                        thread::sleep(Duration::from_millis(1));
                    }
                    counter.fetch_add(1, Ordering::AcqRel);
                })
                .unwrap();
        }
        assert!(measurement.is_measuring());
        measurement.stop();
        assert!(!measurement.is_measuring());
        assert_eq!(counter.load(Ordering::Acquire), 2);
        // Idempotent.
        measurement.stop();
    }
}
