//! Fixed-interval scheduling of poll cycles
//!
//! The poller never runs two cycles at once: each tick tries to take the
//! session lock without waiting, and if a cycle (or a clock command) still
//! holds it the tick is skipped and counted. Results are published through
//! `watch` channels; a failed cycle updates the status but leaves the last
//! good snapshot in place.

use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::model::{DeviceInfo, SystemSnapshot};
use crate::session::{CommandSession, CycleFailure, CycleStage};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

pub type SnapshotReceiver = watch::Receiver<Option<Arc<SystemSnapshot>>>;
pub type DeviceInfoReceiver = watch::Receiver<Option<Arc<DeviceInfo>>>;

/// Health of the polling loop as seen by consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollerStatus {
    /// Whether the most recent cycle published a snapshot
    pub available: bool,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub last_stage: Option<CycleStage>,
    pub total_polls: u64,
    pub failed_polls: u64,
    /// Ticks dropped because the previous cycle was still running
    pub skipped_ticks: u64,
    /// RFC 3339 time of the last published snapshot
    pub last_success: Option<String>,
    pub poll_interval_ms: u64,
}

/// Read side of everything the poller publishes
#[derive(Clone)]
pub struct PollerHandles {
    pub snapshot: SnapshotReceiver,
    pub status: watch::Receiver<PollerStatus>,
    pub device_info: DeviceInfoReceiver,
}

struct Publisher {
    snapshot_tx: watch::Sender<Option<Arc<SystemSnapshot>>>,
    status_tx: watch::Sender<PollerStatus>,
    logger: StructuredLogger,
}

impl Publisher {
    fn record(&self, outcome: std::result::Result<Arc<SystemSnapshot>, CycleFailure>) {
        match outcome {
            Ok(snapshot) => {
                self.logger.debug(&format!(
                    "Published snapshot: {} module(s), {:.2} V, {:.2} A, {:.1} %",
                    snapshot.module_count, snapshot.voltage_v, snapshot.current_a, snapshot.soc_pct
                ));
                let stamp = snapshot.timestamp.clone();
                self.snapshot_tx.send_replace(Some(snapshot));
                self.status_tx.send_modify(|s| {
                    s.available = true;
                    s.last_error = None;
                    s.last_error_kind = None;
                    s.last_stage = Some(CycleStage::Published);
                    s.total_polls = s.total_polls.saturating_add(1);
                    s.last_success = Some(stamp);
                });
            }
            Err(failure) => {
                if failure.error.is_fatal_for_tick() {
                    self.logger.error(&failure.to_string());
                } else {
                    self.logger.warn(&failure.to_string());
                }
                self.status_tx.send_modify(|s| {
                    s.available = false;
                    s.last_error = Some(failure.to_string());
                    s.last_error_kind = Some(failure.error.kind().to_string());
                    s.last_stage = Some(failure.stage);
                    s.total_polls = s.total_polls.saturating_add(1);
                    s.failed_polls = s.failed_polls.saturating_add(1);
                });
            }
        }
    }

    fn skipped(&self) {
        self.status_tx
            .send_modify(|s| s.skipped_ticks = s.skipped_ticks.saturating_add(1));
    }
}

pub struct Poller {
    session: Arc<Mutex<CommandSession>>,
    interval: Duration,
    publisher: Arc<Publisher>,
    device_info_rx: DeviceInfoReceiver,
    shutdown: watch::Receiver<bool>,
    logger: StructuredLogger,
}

impl Poller {
    pub fn new(session: CommandSession, poll_interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let device_info_rx = session.subscribe_device_info();
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(PollerStatus {
            poll_interval_ms: poll_interval.as_millis() as u64,
            ..Default::default()
        });
        Self {
            session: Arc::new(Mutex::new(session)),
            interval: poll_interval,
            publisher: Arc::new(Publisher {
                snapshot_tx,
                status_tx,
                logger: get_logger("poller"),
            }),
            device_info_rx,
            shutdown,
            logger: get_logger("poller"),
        }
    }

    pub fn handles(&self) -> PollerHandles {
        PollerHandles {
            snapshot: self.publisher.snapshot_tx.subscribe(),
            status: self.publisher.status_tx.subscribe(),
            device_info: self.device_info_rx.clone(),
        }
    }

    pub fn session(&self) -> Arc<Mutex<CommandSession>> {
        self.session.clone()
    }

    /// Start a cycle on its own task unless one is already running.
    ///
    /// Returns `None` (and counts a skipped tick) when the session is busy.
    pub fn try_start_cycle(&self) -> Option<JoinHandle<()>> {
        match self.session.clone().try_lock_owned() {
            Ok(guard) => {
                let publisher = self.publisher.clone();
                Some(tokio::spawn(run_cycle(guard, publisher)))
            }
            Err(_) => {
                self.logger
                    .warn("Previous poll still running; skipping this tick");
                self.publisher.skipped();
                None
            }
        }
    }

    /// Read the BMS clock between polls
    pub async fn read_clock(&self) -> Result<NaiveDateTime> {
        self.session.lock().await.read_clock().await
    }

    /// Set the BMS clock between polls
    pub async fn sync_clock(&self, at: NaiveDateTime) -> Result<()> {
        self.session.lock().await.sync_clock(at).await
    }

    /// Tick until shutdown, then wait for the in-flight cycle and close the port
    pub async fn run(self) -> Result<()> {
        self.logger.info(&format!(
            "Starting poll loop every {} ms",
            self.interval.as_millis()
        ));

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = self.shutdown.clone();
        let mut in_flight: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(handle) = self.try_start_cycle() {
                        in_flight = Some(handle);
                    }
                }
                _ = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(handle) = in_flight
            && let Err(e) = handle.await
        {
            self.logger.error(&format!("Poll task ended abnormally: {}", e));
        }
        self.session.lock().await.close().await;
        self.logger.info("Poll loop stopped");
        Ok(())
    }
}

async fn run_cycle(mut session: OwnedMutexGuard<CommandSession>, publisher: Arc<Publisher>) {
    let outcome = session.poll_once(Utc::now()).await;
    publisher.record(outcome);
}
