mod common;

use common::{PWR, STAT};
use pylonlink::aggregate::AggregationEngine;
use pylonlink::error::PylonError;
use pylonlink::parser::{parse_info, parse_power, parse_stat};

fn row(id: u32, mv: i64, ma: i64, soc: u32) -> String {
    format!(
        "{id}  {mv}  {ma}  21000  20000  22000  3300  3400  Charge  Normal  Normal  Normal  {soc}%  2025-01-01 00:00:00  Normal  Normal"
    )
}

fn table(rows: &[String]) -> String {
    format!(
        "pwr\n@\nPower Volt   Curr   Tempr  Tlow   Thigh  Vlow   Vhigh  Base.St  Volt.St  Curr.St  Temp.St  Coulomb\n{}\n$$\npylon>",
        rows.join("\n")
    )
}

#[test]
fn system_current_is_the_sum_of_module_currents() {
    let currents = [
        vec![3806, 3800],
        vec![-12_000, -11_950, -12_020],
        vec![0, 15, -15, 250, 1],
        vec![25_000],
    ];
    for set in currents {
        let rows: Vec<String> = set
            .iter()
            .enumerate()
            .map(|(i, &ma)| row(i as u32 + 1, 50_000 + i as i64, ma, 50))
            .collect();
        let modules = parse_power(&table(&rows)).unwrap().value;
        let agg = AggregationEngine::aggregate(&modules).unwrap();
        let expected: f64 = set.iter().map(|&ma| ma as f64 / 1000.0).sum();
        assert!(
            (agg.current_a - expected).abs() <= 0.005 + 1e-9,
            "{} vs {}",
            agg.current_a,
            expected
        );
    }
}

#[test]
fn parsing_is_idempotent() {
    let a = parse_power(PWR).unwrap();
    let b = parse_power(PWR).unwrap();
    assert_eq!(a, b);
    assert_eq!(parse_stat(STAT), parse_stat(STAT));
    assert_eq!(parse_info(PWR), parse_info(PWR));
}

#[test]
fn absent_rows_never_count() {
    let mut rows = vec![row(1, 50_000, 1000, 60)];
    rows.push(format!("{} Absent", row(2, 50_000, 1000, 60)));
    let modules = parse_power(&table(&rows)).unwrap().value;
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].id, 1);
}

#[test]
fn crlf_responses_parse_like_lf() {
    let lf = PWR.replace('\r', "");
    assert_eq!(
        parse_power(PWR).unwrap().value,
        parse_power(&lf).unwrap().value
    );
}

#[test]
fn header_gate_is_strict_but_rows_are_tolerant() {
    let err = parse_power(&row(1, 50_000, 1000, 60)).unwrap_err();
    assert!(matches!(err, PylonError::Protocol { .. }));

    let rows = vec![row(1, 50_000, 1000, 60), row(2, 50_000, 1000, 160)];
    let out = parse_power(&table(&rows)).unwrap();
    assert_eq!(out.value.len(), 1);
    assert_eq!(out.issues.len(), 1);
    assert_eq!(out.issues[0].line_no, 5);
    assert!(matches!(out.issues[0].to_error(), PylonError::Parse { .. }));
}
