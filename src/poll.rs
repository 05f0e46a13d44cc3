use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::device::Device;
use crate::measurement::Reading;
use crate::proto::{command::Mode, ProtoError, Result};

/// Receiver of polled readings, e.g. a display or a log writer.
///
/// Called from the polling task, implementations must not block.
pub trait DisplaySink: Send + Sync + 'static {
    fn update(&self, reading: &Reading);

    fn error(&self, err: &ProtoError);
}

/// Writes readings to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DisplaySink for LogSink {
    fn update(&self, reading: &Reading) {
        match reading.mode {
            Some(mode) => info!("{}: {:#}", mode, reading),
            None => info!("{:#}", reading),
        }
    }

    fn error(&self, err: &ProtoError) {
        warn!("Measurement error: {}", err);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between two measurements
    pub interval: Duration,
    /// Stop polling after this many failed measurements in a row
    pub max_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_failures: None,
        }
    }
}

struct Task {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically reads the current measurement and hands it to a [`DisplaySink`].
///
/// The device is shared behind a lock that is held for one complete
/// transaction, callers can keep using it (e.g. for `ident`) while polling.
/// Do not hold the lock while calling [`Poller::stop`] or [`Poller::switch_mode`].
pub struct Poller {
    device: Arc<Mutex<Device>>,
    sink: Arc<dyn DisplaySink>,
    config: PollConfig,
    task: Option<Task>,
}

impl Poller {
    pub fn new(device: Arc<Mutex<Device>>, sink: Arc<dyn DisplaySink>, config: PollConfig) -> Self {
        let config = PollConfig {
            // tokio intervals must not be zero
            interval: config.interval.max(Duration::from_millis(1)),
            max_failures: config.max_failures.filter(|n| *n > 0),
        };
        Self {
            device,
            sink,
            config,
            task: None,
        }
    }

    pub fn device(&self) -> Arc<Mutex<Device>> {
        self.device.clone()
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Start polling. The first measurement is taken right away.
    ///
    /// Must be called from within a tokio runtime. Does nothing if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.device.clone(),
            self.sink.clone(),
            self.config,
            cancel.clone(),
        ));
        debug!("polling started, interval {} ms", self.config.interval.as_millis());
        self.task = Some(Task { cancel, handle });
    }

    /// Stop polling.
    ///
    /// Waits for a measurement in flight to finish, its result is discarded.
    /// No measurement is taken after this returns.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.cancel.cancel();
            if let Err(err) = task.handle.await {
                warn!("Polling task failed: {}", err);
            }
            debug!("polling stopped");
        }
    }

    /// Select another measurement function.
    ///
    /// A running poller is stopped before and restarted after the
    /// configuration, so no reading of the previous function shows up
    /// after this returns. Polling resumes even if the configuration
    /// fails, the error is returned after the restart.
    pub async fn switch_mode(&mut self, mode: Mode) -> Result<()> {
        let running = self.is_running();
        self.stop().await;
        let res = self.device.lock().await.configure(mode).await;
        if running {
            self.start();
        }
        res
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.cancel.cancel();
        }
    }
}

async fn run(
    device: Arc<Mutex<Device>>,
    sink: Arc<dyn DisplaySink>,
    config: PollConfig,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(config.interval);
    // Late ticks push the schedule back instead of bursting to catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let res = {
            let mut device = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                guard = device.lock() => guard,
            };
            device.reading().await
        };

        if cancel.is_cancelled() {
            debug!("discarding result of cancelled tick");
            break;
        }

        match res {
            Ok(reading) => {
                failures = 0;
                sink.update(&reading);
            }
            Err(err) => {
                failures += 1;
                warn!("Measurement failed ({} in a row): {}", failures, err);
                sink.error(&err);
                if config.max_failures.is_some_and(|max| failures >= max) {
                    sink.error(&ProtoError::DeviceLost(failures));
                    break;
                }
            }
        }
    }
}
