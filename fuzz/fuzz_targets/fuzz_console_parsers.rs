#![no_main]
use libfuzzer_sys::fuzz_target;
use pylonlink::aggregate::AggregationEngine;
use pylonlink::parser;
use pylonlink::transport::decode_ascii;

fuzz_target!(|data: &[u8]| {
    // Same decoding the transport applies to console bytes
    let text = decode_ascii(data);

    if let Ok(outcome) = parser::parse_power(&text) {
        let mut ids: Vec<u32> = outcome.value.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), outcome.value.len(), "duplicate module ids");
        assert!(outcome.value.iter().all(|m| !m.raw_text.contains("Absent")));

        let mut modules = outcome.value;
        let stats = parser::parse_stat(&text);
        AggregationEngine::merge_stats(&mut modules, &stats);
        let _ = AggregationEngine::aggregate(&modules);
        let _ = AggregationEngine::health(&modules);
    }

    let _ = parser::parse_info(&text);
    if let Some(stamp) = parser::parse_time(&text) {
        let _ = parser::parse_bms_datetime(&stamp);
    }
});
