use crate::{
    burst::SampleBurst,
    calibration::CalibrationStore,
    channel::Channel,
    control::Control,
    device::{
        in_handler, BurstQueue, ChannelCorrection, DataHandler, Fetcher, Measurement, Pipeline,
        Poller, Reader, Statistics,
    },
    error::{Error, Result},
    event::EventHandler,
    gpio::{self, Gpio},
    resampler::{Resampler, ResamplerOptions},
    settings::{BoardSettings, DriverSettings},
};
use common::config::{
    pins, CHANNEL_COUNT, CONTROL_TIMEOUT, CONTROL_TTY_PATH, DRIFT_REFERENCES_PATH, EVENTS_PERIOD,
    GPIO_MEM_PATH, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE, QUEUE_CAPACITY, RESET_DELAY, SKIP_BURST_COUNT,
    START_DELAY,
};
use ringbuf::traits::*;
use std::{
    io,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::sleep,
    time::Duration,
};

/// Run-time configuration of the driver.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub gpio_mem_path: PathBuf,
    pub control_path: PathBuf,
    pub control_timeout: Duration,
    pub drift_references_path: PathBuf,
    /// Upper bound of a blocking collection.
    pub collect_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            gpio_mem_path: GPIO_MEM_PATH.into(),
            control_path: CONTROL_TTY_PATH.into(),
            control_timeout: CONTROL_TIMEOUT,
            drift_references_path: DRIFT_REFERENCES_PATH.into(),
            collect_timeout: Duration::from_secs(10),
        }
    }
}

impl DriverConfig {
    pub fn gpio_mem_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.gpio_mem_path = path.into();
        self
    }
    pub fn control_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.control_path = path.into();
        self
    }
    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }
    pub fn drift_references_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.drift_references_path = path.into();
        self
    }
    pub fn collect_timeout(mut self, timeout: Duration) -> Self {
        self.collect_timeout = timeout;
        self
    }
}

/// Driver of the board.
///
/// Only one measurement runs at a time. Settings and drift compensation can be changed only
/// while there is no measurement.
pub struct Driver<C: Channel, G: Gpio> {
    pub(crate) config: DriverConfig,
    gpio: G,
    control: Arc<Mutex<Control<C>>>,
    pub(crate) settings: DriverSettings,
    pub(crate) resampler: Option<Resampler>,
    board_settings: Option<BoardSettings>,
    pub(crate) drift_references: Option<Vec<f32>>,
    pub(crate) drift_deltas: Option<Vec<f32>>,
    stats: Arc<Statistics>,
    measurement: Option<Measurement>,
}

#[cfg(feature = "real")]
impl Driver<crate::channel::Tty, crate::gpio::GpioMem> {
    /// Opens the board attached to this machine.
    pub fn open(config: DriverConfig) -> Result<Self> {
        let gpio = crate::gpio::GpioMem::open(&config.gpio_mem_path)?;
        let channel = crate::channel::Tty::open(&config.control_path, config.control_timeout)?;
        Self::new(config, channel, gpio)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

impl<C: Channel, G: Gpio> Driver<C, G> {
    pub fn new(config: DriverConfig, channel: C, gpio: G) -> Result<Self> {
        gpio::setup(&gpio);
        sleep(RESET_DELAY);
        log::debug!("GPIO initialized");
        Ok(Self {
            config,
            gpio,
            control: Arc::new(Mutex::new(Control::new(channel))),
            settings: DriverSettings::new(),
            resampler: None,
            board_settings: None,
            drift_references: None,
            drift_deltas: None,
            stats: Arc::new(Statistics::new()),
            measurement: None,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }
    pub fn min_sample_rate(&self) -> u32 {
        MIN_SAMPLE_RATE
    }
    pub fn max_sample_rate(&self) -> u32 {
        MAX_SAMPLE_RATE
    }
    pub fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }

    pub fn is_measuring(&self) -> bool {
        self.measurement.is_some()
    }

    fn control(&self) -> MutexGuard<'_, Control<C>> {
        lock(&self.control)
    }

    /// Applies the settings, the resampler for the sample rate is designed here.
    pub fn set_settings(&mut self, settings: DriverSettings) -> Result<()> {
        if self.is_measuring() || in_handler() {
            return Err(Error::Busy);
        }
        settings.validate()?;
        let resampler = match settings.sample_rate() {
            Some(rate) if rate != MAX_SAMPLE_RATE => {
                let g = gcd(rate, MAX_SAMPLE_RATE);
                let (up, down) = ((rate / g) as usize, (MAX_SAMPLE_RATE / g) as usize);
                Some(Resampler::new(ResamplerOptions::new(up, down))?)
            }
            _ => None,
        };
        self.resampler = resampler;
        self.settings = settings;
        Ok(())
    }
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn set_board_settings(&mut self, settings: &BoardSettings) -> Result<()> {
        self.board_settings = None;
        self.control().set_settings(settings.as_map())?;
        Ok(())
    }
    /// Board settings, requested from the board unless cached.
    pub fn board_settings(&mut self) -> Result<BoardSettings> {
        if let Some(settings) = &self.board_settings {
            return Ok(settings.clone());
        }
        let settings = BoardSettings::from_map(self.control().settings(&Default::default())?);
        self.board_settings = Some(settings.clone());
        Ok(settings)
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    fn corrections(&mut self) -> Result<[ChannelCorrection; CHANNEL_COUNT]> {
        let board = self.board_settings()?;
        let calibration = CalibrationStore::fetch(&mut self.control())?;
        let mut corrections = [ChannelCorrection::default(); CHANNEL_COUNT];
        for (index, corr) in corrections.iter_mut().enumerate() {
            let insufficient = |what: &str| {
                Error::BoardSettingsInsufficient(format!("{} of channel {} is unknown", what, index))
            };
            let mode = board.channel_mode(index).ok_or_else(|| insufficient("mode"))?;
            let gain = board.channel_gain(index).ok_or_else(|| insufficient("gain"))?;
            *corr = ChannelCorrection {
                calibration_slope: calibration.entry(mode, index, gain)?.slope,
                translation_offset: self.settings.translation_offset(index).unwrap_or(0),
                translation_slope: self.settings.translation_slope(index).unwrap_or(1.0),
            };
        }
        Ok(corrections)
    }

    fn start_session(
        &mut self,
        handler: DataHandler,
        event_handler: Option<EventHandler>,
        deltas: Option<Vec<f32>>,
    ) -> Result<()> {
        if self.is_measuring() || in_handler() {
            return Err(Error::Busy);
        }
        let burst_size = self.settings.effective_burst_size().ok_or_else(|| {
            Error::DriverSettingsInsufficient("sample rate is not set".into())
        })?;
        let corrections = self.corrections()?;

        sleep(START_DELAY);
        self.control().set_measurement_enabled(true)?;
        self.stats.reset();

        let (queue_prod, queue_cons) = BurstQueue::new(QUEUE_CAPACITY).split();
        let (recycle_prod, recycle_cons) = BurstQueue::new(QUEUE_CAPACITY).split();
        let reader = Reader::new(self.gpio.clone(), corrections, SKIP_BURST_COUNT);
        let fetcher = Fetcher::new(reader, queue_prod, recycle_cons, self.stats.clone());
        let pipeline = Pipeline {
            deltas,
            resampler: self.resampler.clone(),
            burst_size,
        };
        let poller = Poller::new(queue_cons, recycle_prod, self.stats.clone(), pipeline, handler);

        let mut measurement = Measurement::new();
        let control = self.control.clone();
        let events = event_handler.map(|handler| (control, handler));
        if let Err(err) = spawn_workers(&mut measurement, fetcher, poller, events) {
            self.reset_board();
            return Err(err);
        }
        self.measurement = Some(measurement);
        log::info!(
            "Measurement started at {} Hz, {} samples per burst",
            self.settings.sample_rate().unwrap_or(MAX_SAMPLE_RATE),
            burst_size
        );
        Ok(())
    }

    /// Starts a measurement, `handler` is called on a worker thread with each burst and the
    /// number of bursts lost since the previous call.
    pub fn start<F>(&mut self, handler: F) -> Result<()>
    where
        F: FnMut(SampleBurst, u64) + Send + 'static,
    {
        let deltas = self.drift_deltas.clone();
        self.start_session(Box::new(handler), None, deltas)
    }

    /// Starts a measurement also polling the board events.
    pub fn start_with_events<F, E>(&mut self, handler: F, event_handler: E) -> Result<()>
    where
        F: FnMut(SampleBurst, u64) + Send + 'static,
        E: FnMut(crate::event::Event) + Send + 'static,
    {
        let deltas = self.drift_deltas.clone();
        self.start_session(Box::new(handler), Some(Box::new(event_handler)), deltas)
    }

    fn reset_board(&mut self) {
        self.gpio.clear(pins::mask(pins::CLOCK));
        if let Err(err) = self.control().set_measurement_enabled(false) {
            log::warn!("Cannot disable measurement: {}", err);
        }
    }

    /// Stops the measurement, does nothing if there is none.
    ///
    /// Fails with [`Error::Busy`] if called from the data handler.
    pub fn stop(&mut self) -> Result<()> {
        if in_handler() {
            return Err(Error::Busy);
        }
        let mut measurement = match self.measurement.take() {
            Some(m) => m,
            None => return Ok(()),
        };
        measurement.stop();
        self.gpio.clear(pins::mask(pins::CLOCK));
        self.control().set_measurement_enabled(false)?;
        log::info!("Measurement stopped");
        log::debug!("Statistics: {}", self.stats);
        Ok(())
    }

    fn collect_with(&mut self, count: usize, deltas: Option<Vec<f32>>) -> Result<SampleBurst> {
        let shared = Arc::new((Mutex::new(SampleBurst::new(CHANNEL_COUNT)), Condvar::new()));
        let sink = shared.clone();
        self.start_session(
            Box::new(move |burst: SampleBurst, _lost: u64| {
                let (data, filled) = &*sink;
                let mut data = lock(data);
                let missing = count.saturating_sub(data.size());
                if missing == 0 {
                    return;
                }
                if let Err(err) = data.append_n(burst, missing) {
                    log::error!("Cannot collect samples: {}", err);
                }
                if data.size() >= count {
                    filled.notify_one();
                }
            }),
            None,
            deltas,
        )?;

        let (data, filled) = &*shared;
        let timed_out = {
            let (_guard, result) = filled
                .wait_timeout_while(lock(data), self.config.collect_timeout, |d| d.size() < count)
                .unwrap_or_else(PoisonError::into_inner);
            result.timed_out()
        };
        self.stop()?;
        if timed_out {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "samples collection timed out").into());
        }
        let mut data = lock(data);
        let extra = data.size().saturating_sub(count);
        data.erase_back(extra);
        Ok(std::mem::take(&mut *data))
    }

    /// Measures `count` samples at the current settings.
    pub fn collect(&mut self, count: usize) -> Result<SampleBurst> {
        let deltas = self.drift_deltas.clone();
        self.collect_with(count, deltas)
    }

    /// Measures `count` samples without drift compensation.
    pub(crate) fn collect_raw(&mut self, count: usize) -> Result<SampleBurst> {
        self.collect_with(count, None)
    }
}

impl<C: Channel, G: Gpio> Drop for Driver<C, G> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("Cannot stop measurement: {}", err);
        }
    }
}

fn spawn_workers<C: Channel, G: Gpio>(
    measurement: &mut Measurement,
    fetcher: Fetcher<G>,
    poller: Poller,
    events: Option<(Arc<Mutex<Control<C>>>, EventHandler)>,
) -> Result<()> {
    measurement.spawn("fetcher", move |measuring| fetcher.run(measuring))?;
    measurement.spawn("poller", move |measuring| poller.run(measuring))?;
    if let Some((control, handler)) = events {
        measurement.spawn("events", move |measuring| run_events(&control, handler, measuring))?;
    }
    Ok(())
}

fn run_events<C: Channel>(
    control: &Mutex<Control<C>>,
    mut handler: EventHandler,
    measuring: &AtomicBool,
) {
    log::debug!("Events worker started");
    while measuring.load(Ordering::Acquire) {
        let events = lock(control).events();
        match events {
            Ok(events) => events.into_iter().for_each(&mut handler),
            Err(err) => log::warn!("Cannot get events: {}", err),
        }
        sleep(EVENTS_PERIOD);
    }
    log::debug!("Events worker stopped");
}
