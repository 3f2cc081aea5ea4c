use super::{ModuleReading, SystemSnapshot};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Flat key → value view of a snapshot, sorted by key
pub type RecordSet = BTreeMap<String, Value>;

impl SystemSnapshot {
    /// Flatten into `system.<field>` and `module.<id>.<field>` records.
    ///
    /// Optional fields are left out when absent so consumers can tell
    /// "not reported" from zero.
    pub fn to_records(&self) -> RecordSet {
        let mut out = RecordSet::new();
        let mut put = |key: String, value: Value| {
            out.insert(key, value);
        };

        put("system.voltage_v".into(), json!(self.voltage_v));
        put("system.current_a".into(), json!(self.current_a));
        put("system.soc_pct".into(), json!(self.soc_pct));
        put("system.power_w".into(), json!(self.power_w));
        put("system.energy_in_kwh".into(), json!(self.energy_in_kwh));
        put("system.energy_out_kwh".into(), json!(self.energy_out_kwh));
        put("system.energy_stored_kwh".into(), json!(self.energy_stored_kwh));
        put("system.module_count".into(), json!(self.module_count));
        put("system.timestamp".into(), json!(self.timestamp));
        if let Some(soh) = self.soh_pct {
            put("system.soh_pct".into(), json!(soh));
        }
        if let Some(cycles) = self.cycles {
            put("system.cycles".into(), json!(cycles));
        }
        if let Some(ref t) = self.bms_time {
            put("system.bms_time".into(), json!(t));
        }

        for m in &self.modules {
            for (field, value) in module_fields(m) {
                put(format!("module.{}.{}", m.id, field), value);
            }
        }
        out
    }
}

fn module_fields(m: &ModuleReading) -> Vec<(&'static str, Value)> {
    let mut fields = vec![
        ("voltage_v", json!(m.voltage_v)),
        ("current_a", json!(m.current_a)),
        ("temperature_c", json!(m.temperature_c)),
        ("soc_pct", json!(m.soc_pct)),
        ("status", json!(m.status)),
        ("power_w", json!(m.power_w)),
    ];
    if let Some(soh) = m.soh_pct {
        fields.push(("soh_pct", json!(soh)));
    }
    if let Some(cycles) = m.cycles {
        fields.push(("cycles", json!(cycles)));
    }
    fields
}
