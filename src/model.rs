//! Telemetry records produced by a poll
//!
//! `ModuleReading` is built fresh from every `pwr` table and enriched from
//! `stat`; `SystemSnapshot` is the finalized, immutable value handed to
//! consumers. Neither type is mutated after publication.

use serde::{Deserialize, Serialize};

mod records;

pub use records::RecordSet;

/// One battery module row of the `pwr` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReading {
    /// Address of the module in the chain (unique within a snapshot)
    pub id: u32,
    pub voltage_v: f64,
    pub current_a: f64,
    pub temperature_c: f64,
    /// State of charge, percent
    pub soc_pct: f64,
    /// Base state column as printed by the console (e.g. "Charge", "Idle")
    pub status: String,
    /// voltage × current, rounded to 2 decimals
    pub power_w: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soh_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<u32>,
    /// Trimmed source row
    pub raw_text: String,
}

/// Stack-level aggregate of one successful poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Mean module voltage
    pub voltage_v: f64,
    /// Sum of module currents (modules are wired in parallel)
    pub current_a: f64,
    /// Mean state of charge
    pub soc_pct: f64,
    /// voltage × current
    pub power_w: f64,
    pub energy_in_kwh: f64,
    pub energy_out_kwh: f64,
    /// Derived from capacity and SOC, not integrated
    pub energy_stored_kwh: f64,
    pub module_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soh_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<u32>,
    /// BMS real-time clock as printed by `time`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bms_time: Option<String>,
    /// When the snapshot was finalized (UTC, RFC 3339)
    pub timestamp: String,
    pub modules: Vec<ModuleReading>,
    /// Accepted `pwr` response
    pub raw_text: String,
}

impl SystemSnapshot {
    /// Look up a module by its chain address
    pub fn module(&self, id: u32) -> Option<&ModuleReading> {
        self.modules.iter().find(|m| m.id == id)
    }
}

/// Identity of the stack as reported by `info`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub barcode: Option<String>,
    pub spec: Option<String>,
    pub cell_count: Option<u32>,
}

impl DeviceInfo {
    /// True once at least one field has been recognised
    pub fn is_populated(&self) -> bool {
        self.manufacturer.is_some()
            || self.model.is_some()
            || self.firmware_version.is_some()
            || self.barcode.is_some()
            || self.spec.is_some()
            || self.cell_count.is_some()
    }
}

/// Per-module values extracted from `stat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub cycles: Option<u32>,
    pub soh_pct: Option<f64>,
}

impl StatEntry {
    pub fn is_empty(&self) -> bool {
        self.cycles.is_none() && self.soh_pct.is_none()
    }
}
