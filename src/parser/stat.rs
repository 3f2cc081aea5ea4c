use crate::model::StatEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)device\s+address\s*:?\s*(\d+)").expect("valid address regex"));
static CYCLES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)cycle\s+times\s*:\s*(\d+)").expect("valid cycles regex"));
static SOH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsoh\s*:\s*(\d+(?:\.\d+)?)").expect("valid soh regex"));

/// Extract per-module cycle counts and health from a `stat` dump.
///
/// The dump is split at every "Device address N" marker and each block is
/// searched independently, so a value is only ever attributed to the address
/// that precedes it. Blocks with neither value are left out.
pub fn parse_stat(text: &str) -> BTreeMap<u32, StatEntry> {
    let mut out = BTreeMap::new();

    let markers: Vec<(u32, usize, usize)> = ADDRESS_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let id = caps.get(1)?.as_str().parse().ok()?;
            Some((id, whole.start(), whole.end()))
        })
        .collect();

    for (i, &(id, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |m| m.1);
        let block = &text[body_start..body_end];

        let cycles = CYCLES_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        let soh_pct = SOH_RE
            .captures(block)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok());

        let entry: &mut StatEntry = out.entry(id).or_default();
        if entry.cycles.is_none() {
            entry.cycles = cycles;
        }
        if entry.soh_pct.is_none() {
            entry.soh_pct = soh_pct;
        }
    }

    out.retain(|_, e| !e.is_empty());
    out
}
