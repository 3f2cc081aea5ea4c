//! Charge/discharge energy accounting across polls
//!
//! Energy is integrated as a left Riemann sum: the power of the current
//! snapshot is applied to the whole interval since the previous one.
//! Non-negative aggregate power accrues to `in`, negative to `out`.

use crate::aggregate::round_to;
use crate::logging::get_logger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SECS_PER_HOUR: f64 = 3600.0;

/// Counters carried from one tick to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyIntegratorState {
    #[serde(default)]
    pub last_update_timestamp: Option<DateTime<Utc>>,
    pub cumulative_in_kwh: f64,
    pub cumulative_out_kwh: f64,
}

/// Published energy values for one snapshot, rounded to 3 decimals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyTotals {
    pub energy_in_kwh: f64,
    pub energy_out_kwh: f64,
    pub energy_stored_kwh: f64,
}

#[derive(Debug)]
pub struct EnergyIntegrator {
    state: EnergyIntegratorState,
    module_capacity_kwh: f64,
    logger: crate::logging::StructuredLogger,
}

impl EnergyIntegrator {
    pub fn new(module_capacity_kwh: f64) -> Self {
        Self::with_state(module_capacity_kwh, EnergyIntegratorState::default())
    }

    /// Resume from restored counters.
    ///
    /// The restored timestamp is dropped: the gap since the last save is
    /// unknown, so the first tick only re-seeds the baseline.
    pub fn with_state(module_capacity_kwh: f64, state: EnergyIntegratorState) -> Self {
        let sane = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        Self {
            state: EnergyIntegratorState {
                last_update_timestamp: None,
                cumulative_in_kwh: sane(state.cumulative_in_kwh),
                cumulative_out_kwh: sane(state.cumulative_out_kwh),
            },
            module_capacity_kwh,
            logger: get_logger("energy"),
        }
    }

    pub fn state(&self) -> &EnergyIntegratorState {
        &self.state
    }

    pub fn energy_in_kwh(&self) -> f64 {
        self.state.cumulative_in_kwh
    }

    pub fn energy_out_kwh(&self) -> f64 {
        self.state.cumulative_out_kwh
    }

    /// Integrate `power_w` over the time since the previous call.
    ///
    /// The first call only records `now`. A non-positive interval (clock
    /// stepped backwards) or non-finite power accrues nothing. The timestamp
    /// is always advanced.
    pub fn accrue(&mut self, power_w: f64, now: DateTime<Utc>) {
        if let Some(last) = self.state.last_update_timestamp {
            let elapsed_secs = (now - last).num_milliseconds() as f64 / 1000.0;
            if elapsed_secs > 0.0 && power_w.is_finite() {
                let delta_kwh = (power_w * (elapsed_secs / SECS_PER_HOUR) / 1000.0).abs();
                if power_w >= 0.0 {
                    self.state.cumulative_in_kwh += delta_kwh;
                } else {
                    self.state.cumulative_out_kwh += delta_kwh;
                }
            } else if elapsed_secs <= 0.0 {
                self.logger.warn(&format!(
                    "Non-positive interval since last update ({:.3}s); skipping accrual",
                    elapsed_secs
                ));
            }
        }
        self.state.last_update_timestamp = Some(now);
    }

    /// Capacity-derived stored energy for the given stack
    pub fn stored_kwh(&self, module_count: usize, avg_soc_pct: f64) -> f64 {
        module_count as f64 * self.module_capacity_kwh * (avg_soc_pct / 100.0)
    }

    pub fn totals(&self, module_count: usize, avg_soc_pct: f64) -> EnergyTotals {
        EnergyTotals {
            energy_in_kwh: round_to(self.state.cumulative_in_kwh, 3),
            energy_out_kwh: round_to(self.state.cumulative_out_kwh, 3),
            energy_stored_kwh: round_to(self.stored_kwh(module_count, avg_soc_pct), 3),
        }
    }
}
