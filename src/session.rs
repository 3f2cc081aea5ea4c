//! Poll cycle orchestration
//!
//! A [`CommandSession`] owns the transport, the cached [`DeviceInfo`] and the
//! energy counters for the lifetime of the process. One call to
//! [`CommandSession::poll_once`] walks the command sequence
//! `info` (until it succeeds once) → `pwr` → `stat` → optional `time`, merges
//! the results and returns a finalized snapshot or a single [`CycleFailure`].

use crate::aggregate::AggregationEngine;
use crate::config::{ClockConfig, Config, TimingConfig};
use crate::energy::{EnergyIntegrator, EnergyIntegratorState};
use crate::error::{PylonError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::model::{DeviceInfo, ModuleReading, StatEntry, SystemSnapshot};
use crate::parser;
use crate::persistence::EnergyStore;
use crate::transport::SerialTransport;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Where a poll cycle is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    FetchInfo,
    FetchPower,
    FetchStat,
    Merge,
    Published,
    Failed,
}

impl std::fmt::Display for CycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FetchInfo => "fetch_info",
            Self::FetchPower => "fetch_power",
            Self::FetchStat => "fetch_stat",
            Self::Merge => "merge",
            Self::Published => "published",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The one structured reason a poll cycle did not publish
#[derive(Debug, thiserror::Error)]
#[error("poll failed during {stage}: {error}")]
pub struct CycleFailure {
    /// Stage that was running when the cycle failed
    pub stage: CycleStage,
    #[source]
    pub error: PylonError,
}

impl CycleFailure {
    pub fn new(stage: CycleStage, error: PylonError) -> Self {
        Self { stage, error }
    }
}

pub struct CommandSession {
    transport: SerialTransport,
    timing: TimingConfig,
    clock: ClockConfig,
    device_info: DeviceInfo,
    device_info_tx: watch::Sender<Option<Arc<DeviceInfo>>>,
    energy: EnergyIntegrator,
    store: Option<EnergyStore>,
    stage: CycleStage,
    logger: StructuredLogger,
}

impl CommandSession {
    pub fn new(config: &Config, transport: SerialTransport) -> Self {
        let (device_info_tx, _) = watch::channel(None);
        Self {
            transport,
            timing: config.timing.clone(),
            clock: config.clock.clone(),
            device_info: DeviceInfo::default(),
            device_info_tx,
            energy: EnergyIntegrator::new(config.battery.module_capacity_kwh),
            store: None,
            stage: CycleStage::Idle,
            logger: get_logger("session"),
        }
    }

    /// Session over the configured serial device, with persisted counters
    /// restored when a state file is configured
    pub fn from_config(config: &Config, shutdown: watch::Receiver<bool>) -> Self {
        let transport = SerialTransport::serial(&config.serial, shutdown);
        let session = Self::new(config, transport);
        match config.persistence.energy_state_file.as_deref() {
            Some(path) => session.with_store(EnergyStore::new(path), config.battery.module_capacity_kwh),
            None => session,
        }
    }

    /// Attach a state file and resume from it. An unreadable file is logged
    /// and the counters start at zero.
    pub fn with_store(mut self, store: EnergyStore, module_capacity_kwh: f64) -> Self {
        match store.load() {
            Ok(Some(state)) => {
                self.energy = EnergyIntegrator::with_state(module_capacity_kwh, state);
            }
            Ok(None) => {}
            Err(e) => self.logger.warn(&format!(
                "Ignoring unreadable energy state {}: {}",
                store.path().display(),
                e
            )),
        }
        self.store = Some(store);
        self
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Receives the device identity once `info` has been parsed
    pub fn subscribe_device_info(&self) -> watch::Receiver<Option<Arc<DeviceInfo>>> {
        self.device_info_tx.subscribe()
    }

    pub fn energy_state(&self) -> &EnergyIntegratorState {
        self.energy.state()
    }

    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    /// Run one complete poll cycle.
    ///
    /// On failure the transport is closed so the next tick reopens it, and no
    /// state other than the cached device info has changed.
    pub async fn poll_once(
        &mut self,
        now: DateTime<Utc>,
    ) -> std::result::Result<Arc<SystemSnapshot>, CycleFailure> {
        self.stage = CycleStage::Idle;
        match self.run_cycle(now).await {
            Ok(snapshot) => {
                self.stage = CycleStage::Published;
                Ok(Arc::new(snapshot))
            }
            Err(error) => {
                let failure = CycleFailure::new(self.stage, error);
                self.stage = CycleStage::Failed;
                self.transport.close().await;
                Err(failure)
            }
        }
    }

    async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<SystemSnapshot> {
        if !self.device_info.is_populated() {
            self.stage = CycleStage::FetchInfo;
            self.fetch_info().await?;
        }

        self.stage = CycleStage::FetchPower;
        let (raw_text, mut modules) = self.fetch_power().await?;

        self.stage = CycleStage::FetchStat;
        let stats = self.fetch_stat().await?;
        let bms_time = if self.clock.read_each_poll {
            self.fetch_bms_time().await?
        } else {
            None
        };

        self.stage = CycleStage::Merge;
        let merged = AggregationEngine::merge_stats(&mut modules, &stats);
        if merged < stats.len() {
            self.logger.debug(&format!(
                "Dropped stat entries for {} unknown module id(s)",
                stats.len() - merged
            ));
        }
        let health = AggregationEngine::health(&modules);
        let agg = AggregationEngine::aggregate(&modules)?;

        self.energy.accrue(agg.power_w, now);
        let totals = self.energy.totals(modules.len(), agg.soc_pct);
        self.persist_energy().await;

        Ok(SystemSnapshot {
            voltage_v: agg.voltage_v,
            current_a: agg.current_a,
            soc_pct: agg.soc_pct,
            power_w: agg.power_w,
            energy_in_kwh: totals.energy_in_kwh,
            energy_out_kwh: totals.energy_out_kwh,
            energy_stored_kwh: totals.energy_stored_kwh,
            module_count: modules.len(),
            soh_pct: health.soh_pct,
            cycles: health.cycles,
            bms_time,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            modules,
            raw_text,
        })
    }

    /// Best-effort `info`; only shutdown aborts the cycle
    async fn fetch_info(&mut self) -> Result<()> {
        let response = self
            .transport
            .exchange("info", self.timing.flush_delay(), self.timing.info_settle_delay())
            .await;
        let text = match response {
            Ok(text) => text,
            Err(e) => return self.swallow("info", e),
        };

        let info = parser::parse_info(&text);
        if info.is_populated() {
            self.logger.info(&format!(
                "Device info: manufacturer={:?} model={:?} firmware={:?} barcode={:?}",
                info.manufacturer, info.model, info.firmware_version, info.barcode
            ));
            self.device_info = info.clone();
            self.device_info_tx.send_replace(Some(Arc::new(info)));
        } else {
            self.logger
                .warn("No device info recognised in 'info' response; will retry next poll");
        }
        Ok(())
    }

    async fn fetch_power(&mut self) -> Result<(String, Vec<ModuleReading>)> {
        let mut text = self
            .transport
            .exchange("pwr", self.timing.flush_delay(), self.timing.settle_delay())
            .await?;

        if !parser::has_power_header(&text) {
            self.logger
                .warn("'pwr' response has no table header; reading once more");
            let more = self.transport.read_more(self.timing.retry_delay()).await?;
            text.push_str(&more);
        }

        let outcome = parser::parse_power(&text)?;
        for issue in &outcome.issues {
            self.logger
                .warn(&format!("Skipped pwr row: {}", issue.to_error()));
        }
        if outcome.value.is_empty() {
            return Err(PylonError::empty_result("no module rows in 'pwr' response"));
        }
        self.logger
            .debug(&format!("Parsed {} module(s) from 'pwr'", outcome.value.len()));
        Ok((text.trim().to_string(), outcome.value))
    }

    /// Best-effort `stat`; only shutdown aborts the cycle
    async fn fetch_stat(&mut self) -> Result<BTreeMap<u32, StatEntry>> {
        let response = self
            .transport
            .exchange("stat", self.timing.flush_delay(), self.timing.stat_settle_delay())
            .await;
        match response {
            Ok(text) => {
                let stats = parser::parse_stat(&text);
                if stats.is_empty() {
                    self.logger.debug("No cycle/health values in 'stat' response");
                }
                Ok(stats)
            }
            Err(e) => self.swallow("stat", e).map(|_| BTreeMap::new()),
        }
    }

    async fn fetch_bms_time(&mut self) -> Result<Option<String>> {
        let response = self
            .transport
            .exchange("time", self.timing.flush_delay(), self.timing.clock_settle_delay())
            .await;
        match response {
            Ok(text) => Ok(parser::parse_time(&text)),
            Err(e) => self.swallow("time", e).map(|_| None),
        }
    }

    fn swallow(&self, command: &str, error: PylonError) -> Result<()> {
        if matches!(error, PylonError::Cancelled { .. }) {
            return Err(error);
        }
        self.logger
            .warn(&format!("'{}' failed, continuing without it: {}", command, error));
        Ok(())
    }

    async fn persist_energy(&self) {
        if let Some(ref store) = self.store
            && let Err(e) = store.save(self.energy.state()).await
        {
            self.logger
                .warn(&format!("Failed to persist energy counters: {}", e));
        }
    }

    /// Read the BMS real-time clock
    pub async fn read_clock(&mut self) -> Result<NaiveDateTime> {
        let text = self
            .transport
            .exchange("time", self.timing.flush_delay(), self.timing.clock_settle_delay())
            .await?;
        let stamp = parser::parse_time(&text)
            .ok_or_else(|| PylonError::protocol("no timestamp in 'time' response"))?;
        parser::parse_bms_datetime(&stamp)
    }

    /// Set the BMS real-time clock
    pub async fn sync_clock(&mut self, at: NaiveDateTime) -> Result<()> {
        let command = parser::format_set_time_command(&at);
        self.logger.info(&format!("Setting BMS clock: '{}'", command));
        self.transport
            .exchange(&command, self.timing.flush_delay(), self.timing.clock_settle_delay())
            .await?;
        Ok(())
    }
}
