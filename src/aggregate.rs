//! System-level statistics over one poll's module readings

use crate::error::{PylonError, Result};
use crate::model::{ModuleReading, StatEntry};
use std::collections::BTreeMap;

/// Round half away from zero to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Stack-wide electrical values derived from the `pwr` table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemAggregate {
    pub voltage_v: f64,
    pub current_a: f64,
    pub soc_pct: f64,
    pub power_w: f64,
}

/// Mean health and cycle count over the modules that reported them
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthSummary {
    pub soh_pct: Option<f64>,
    pub cycles: Option<u32>,
}

/// Stateless aggregation over module readings.
///
/// Modules are wired in parallel: voltage and SOC are averaged, currents are
/// summed. Voltage and current are rounded to 2 decimals, SOC and power to 1,
/// and power is computed from the rounded voltage and current.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationEngine;

impl AggregationEngine {
    pub fn aggregate(modules: &[ModuleReading]) -> Result<SystemAggregate> {
        if modules.is_empty() {
            return Err(PylonError::empty_result("cannot aggregate zero modules"));
        }
        let n = modules.len() as f64;

        let voltage_v = round_to(modules.iter().map(|m| m.voltage_v).sum::<f64>() / n, 2);
        let current_a = round_to(modules.iter().map(|m| m.current_a).sum::<f64>(), 2);
        let soc_pct = round_to(modules.iter().map(|m| m.soc_pct).sum::<f64>() / n, 1);
        let power_w = round_to(voltage_v * current_a, 1);

        Ok(SystemAggregate {
            voltage_v,
            current_a,
            soc_pct,
            power_w,
        })
    }

    /// Copy `stat` values onto the modules with matching ids.
    ///
    /// Ids not present in `modules` are dropped. Returns how many modules
    /// received at least one value.
    pub fn merge_stats(modules: &mut [ModuleReading], stats: &BTreeMap<u32, StatEntry>) -> usize {
        let mut merged = 0;
        for module in modules.iter_mut() {
            let Some(entry) = stats.get(&module.id) else {
                continue;
            };
            if entry.soh_pct.is_some() {
                module.soh_pct = entry.soh_pct;
            }
            if entry.cycles.is_some() {
                module.cycles = entry.cycles;
            }
            if !entry.is_empty() {
                merged += 1;
            }
        }
        merged
    }

    /// Mean SOH (1 decimal) and floored mean cycle count; each omitted when
    /// no module reported it
    pub fn health(modules: &[ModuleReading]) -> HealthSummary {
        let soh: Vec<f64> = modules.iter().filter_map(|m| m.soh_pct).collect();
        let cycles: Vec<u32> = modules.iter().filter_map(|m| m.cycles).collect();

        let soh_pct = (!soh.is_empty())
            .then(|| round_to(soh.iter().sum::<f64>() / soh.len() as f64, 1));
        let cycles = (!cycles.is_empty()).then(|| {
            let total: u64 = cycles.iter().map(|&c| u64::from(c)).sum();
            (total / cycles.len() as u64) as u32
        });

        HealthSummary { soh_pct, cycles }
    }
}
