//! Schedule-driven connectors
//!
//! [`ScheduledConnector`] adapts a [`Producer`] into a [`BackingImplementation`]:
//! it runs the producer on a dedicated thread every `frequency`, forwards the
//! produced events to an [`EventSink`] and records telemetry. After more than
//! [`MAX_CONSECUTIVE_FAILURES`] failed runs in a row it stops itself and
//! reports failed until the lifecycle manager restarts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use eyre::eyre;
use log::{debug, error, info, warn};

use super::traits::{BackingImplementation, ConnectorContext, Telemetry};
use crate::domain::DEFAULT_FREQUENCY;

/// Failed runs in a row tolerated before the connector gives up
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// The work a scheduled connector performs on every run.
pub trait Producer: Send + 'static {
    /// Read configuration before the first run.
    fn configure(&mut self, _ctx: &ConnectorContext) -> eyre::Result<()> {
        Ok(())
    }

    /// Produce the next event, or `None` if there is nothing to publish.
    fn produce(&mut self) -> eyre::Result<Option<serde_json::Value>>;
}

/// Receives events produced by connectors.
pub trait EventSink: Send + Sync {
    fn publish(&self, instance_id: &str, event: serde_json::Value);
}

/// Sink that writes every event to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn publish(&self, instance_id: &str, event: serde_json::Value) {
        info!("Event from {}: {}", instance_id, event);
    }
}

struct ScheduleState {
    telemetry: Mutex<Telemetry>,
    stop_requested: Mutex<bool>,
    wake: Condvar,
    failed: AtomicBool,
}

impl ScheduleState {
    fn telemetry(&self) -> MutexGuard<'_, Telemetry> {
        self.telemetry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_requested(&self) -> MutexGuard<'_, bool> {
        self.stop_requested.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs a [`Producer`] on its own thread at a fixed interval.
pub struct ScheduledConnector<P: Producer> {
    producer: Arc<Mutex<P>>,
    sink: Arc<dyn EventSink>,
    instance_id: String,
    frequency: Duration,
    state: Arc<ScheduleState>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Producer> ScheduledConnector<P> {
    pub fn new(producer: P, sink: Arc<dyn EventSink>) -> Self {
        Self {
            producer: Arc::new(Mutex::new(producer)),
            sink,
            instance_id: String::new(),
            frequency: DEFAULT_FREQUENCY,
            state: Arc::new(ScheduleState {
                telemetry: Mutex::new(Telemetry::default()),
                stop_requested: Mutex::new(false),
                wake: Condvar::new(),
                failed: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    fn thread_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Producer> BackingImplementation for ScheduledConnector<P> {
    fn configure(&mut self, ctx: &ConnectorContext) -> eyre::Result<()> {
        self.instance_id = ctx.instance_id.clone();
        self.frequency = ctx.frequency.unwrap_or(DEFAULT_FREQUENCY);
        if self.frequency.is_zero() {
            return Err(eyre!("frequency of {} must be positive", ctx.instance_id));
        }
        self.producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .configure(ctx)
    }

    fn start(&self) -> eyre::Result<()> {
        let mut slot = self.thread_slot();
        if slot.is_some() {
            return Err(eyre!("{} is already scheduled", self.instance_id));
        }

        *self.state.stop_requested() = false;
        self.state.failed.store(false, Ordering::SeqCst);

        let run = ScheduleRun {
            producer: Arc::clone(&self.producer),
            sink: Arc::clone(&self.sink),
            state: Arc::clone(&self.state),
            instance_id: self.instance_id.clone(),
            frequency: self.frequency,
        };
        let handle = thread::Builder::new()
            .name(format!("connector-{}", self.instance_id))
            .spawn(move || run.run())?;
        *slot = Some(handle);
        debug!("Scheduled {} every {:?}", self.instance_id, self.frequency);
        Ok(())
    }

    fn stop(&self) -> eyre::Result<()> {
        let handle = self.thread_slot().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        *self.state.stop_requested() = true;
        self.state.wake.notify_all();
        handle
            .join()
            .map_err(|_| eyre!("schedule thread of {} panicked", self.instance_id))
    }

    fn telemetry(&self) -> Option<Telemetry> {
        Some(self.state.telemetry().clone())
    }

    fn has_failed(&self) -> bool {
        self.state.failed.load(Ordering::SeqCst)
    }
}

impl<P: Producer> Drop for ScheduledConnector<P> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("{:#}", e);
        }
    }
}

struct ScheduleRun<P: Producer> {
    producer: Arc<Mutex<P>>,
    sink: Arc<dyn EventSink>,
    state: Arc<ScheduleState>,
    instance_id: String,
    frequency: Duration,
}

impl<P: Producer> ScheduleRun<P> {
    fn run(self) {
        let mut consecutive_failures = 0u32;
        loop {
            if self.run_once() {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                if consecutive_failures > MAX_CONSECUTIVE_FAILURES {
                    error!(
                        "{} failed {} times in a row, stopping",
                        self.instance_id, consecutive_failures
                    );
                    self.state.failed.store(true, Ordering::SeqCst);
                    return;
                }
            }

            let stop = self.state.stop_requested();
            let (stop, _) = self
                .state
                .wake
                .wait_timeout_while(stop, self.frequency, |stop| !*stop)
                .unwrap_or_else(PoisonError::into_inner);
            if *stop {
                debug!("Schedule of {} stopped", self.instance_id);
                return;
            }
        }
    }

    /// One producer run; returns whether it succeeded.
    fn run_once(&self) -> bool {
        let now = Utc::now();
        self.state.telemetry().last_run = Some(now);

        let outcome = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .produce();

        match outcome {
            Ok(event) => {
                if let Some(event) = event {
                    self.sink.publish(&self.instance_id, event);
                }
                self.state.telemetry().last_success = Some(Utc::now());
                true
            }
            Err(e) => {
                warn!("Run of {} failed: {:#}", self.instance_id, e);
                let mut telemetry = self.state.telemetry();
                telemetry.last_failure = Some(Utc::now());
                telemetry.last_failure_description = Some(format!("{:#}", e));
                false
            }
        }
    }
}
