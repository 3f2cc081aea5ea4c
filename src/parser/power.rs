use super::ParseOutcome;
use crate::aggregate::round_to;
use crate::error::{PylonError, Result};
use crate::model::ModuleReading;
use std::collections::HashSet;

/// Literal marking a complete `pwr` table
pub const POWER_HEADER: &str = "Power Volt";

const ABSENT_MARKER: &str = "Absent";

// Token positions in a `pwr` row
const IDX_ID: usize = 0;
const IDX_VOLTAGE_MV: usize = 1;
const IDX_CURRENT_MA: usize = 2;
const IDX_TEMP_MC: usize = 3;
const IDX_STATUS: usize = 8;
const IDX_SOC: usize = 12;
const MIN_TOKENS: usize = 11;

pub fn has_power_header(text: &str) -> bool {
    text.contains(POWER_HEADER)
}

/// Parse the `pwr` table into module readings.
///
/// Fails only when the header is missing. Candidate rows that do not convert
/// are skipped and reported in the outcome's issues. Rows are returned in
/// table order.
pub fn parse_power(text: &str) -> Result<ParseOutcome<Vec<ModuleReading>>> {
    if !has_power_header(text) {
        return Err(PylonError::protocol(format!(
            "'{}' header missing from pwr response",
            POWER_HEADER
        )));
    }

    let mut outcome = ParseOutcome::new(Vec::new());
    let mut seen = HashSet::new();

    for (idx, line) in text.lines().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if !is_module_row(line, &tokens) {
            continue;
        }
        match parse_row(line, &tokens) {
            Ok(reading) => {
                if seen.insert(reading.id) {
                    outcome.value.push(reading);
                } else {
                    outcome.push_issue(idx + 1, line, format!("duplicate module id {}", reading.id));
                }
            }
            Err(reason) => outcome.push_issue(idx + 1, line, reason),
        }
    }

    Ok(outcome)
}

fn is_module_row(line: &str, tokens: &[&str]) -> bool {
    tokens.len() >= MIN_TOKENS
        && tokens[IDX_ID].bytes().all(|b| b.is_ascii_digit())
        && !line.contains(ABSENT_MARKER)
}

fn parse_row(line: &str, tokens: &[&str]) -> std::result::Result<ModuleReading, String> {
    let id: u32 = field(tokens, IDX_ID, "id")?;
    let voltage_v = milli(tokens, IDX_VOLTAGE_MV, "voltage")?;
    let current_a = milli(tokens, IDX_CURRENT_MA, "current")?;
    let temperature_c = milli(tokens, IDX_TEMP_MC, "temperature")?;
    let status = tokens
        .get(IDX_STATUS)
        .ok_or_else(|| "missing status column".to_string())?
        .to_string();
    let soc_raw = tokens
        .get(IDX_SOC)
        .ok_or_else(|| "missing soc column".to_string())?;
    let soc_pct: f64 = soc_raw
        .trim_end_matches('%')
        .parse()
        .map_err(|_| format!("invalid soc '{}'", soc_raw))?;
    if !(0.0..=100.0).contains(&soc_pct) {
        return Err(format!("soc {} out of range", soc_pct));
    }

    Ok(ModuleReading {
        id,
        voltage_v,
        current_a,
        temperature_c,
        soc_pct,
        status,
        power_w: round_to(voltage_v * current_a, 2),
        soh_pct: None,
        cycles: None,
        raw_text: line.trim().to_string(),
    })
}

fn field<T: std::str::FromStr>(tokens: &[&str], idx: usize, name: &str) -> std::result::Result<T, String> {
    let raw = tokens
        .get(idx)
        .ok_or_else(|| format!("missing {} column", name))?;
    raw.parse()
        .map_err(|_| format!("invalid {} '{}'", name, raw))
}

/// Integer milli-unit column → base unit
fn milli(tokens: &[&str], idx: usize, name: &str) -> std::result::Result<f64, String> {
    let raw: i64 = field(tokens, idx, name)?;
    Ok(raw as f64 / 1000.0)
}
