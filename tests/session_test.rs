mod common;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use common::*;
use pylonlink::error::PylonError;
use pylonlink::session::{CommandSession, CycleStage};

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 12, 21, 12, 0, 0).unwrap()
}

fn session_with(port: ScriptedPort) -> (CommandSession, tokio::sync::watch::Sender<bool>) {
    let (transport, tx) = scripted_transport(port);
    (CommandSession::new(&fast_config(), transport), tx)
}

#[tokio::test]
async fn first_poll_fetches_info_power_and_stat() {
    let port = ScriptedPort::healthy();
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    let snap = session.poll_once(t0()).await.unwrap();

    assert_eq!(session.stage(), CycleStage::Published);
    assert_eq!(log.lock().unwrap().commands, vec!["info", "pwr", "stat"]);
    assert_eq!(snap.module_count, 2);
    assert!((snap.voltage_v - 50.69).abs() < 1e-9);
    assert!((snap.current_a - 7.61).abs() < 1e-9);
    assert!((snap.soc_pct - 84.5).abs() < 1e-9);
    assert!((snap.power_w - 385.8).abs() < 1e-9);
    assert!((snap.energy_stored_kwh - 4.056).abs() < 1e-9);
    assert_eq!(snap.timestamp, "2025-12-21T12:00:00Z");
    assert!(snap.bms_time.is_none());

    let info = session.device_info();
    assert_eq!(info.manufacturer.as_deref(), Some("Pylon"));
    assert_eq!(info.cell_count, Some(15));
}

#[tokio::test]
async fn info_is_fetched_only_until_populated() {
    let port = ScriptedPort::healthy();
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    session.poll_once(t0()).await.unwrap();
    session.poll_once(t0() + Duration::seconds(15)).await.unwrap();

    let commands = log.lock().unwrap().commands.clone();
    assert_eq!(commands.iter().filter(|c| *c == "info").count(), 1);
    assert_eq!(commands.iter().filter(|c| *c == "pwr").count(), 2);
}

#[tokio::test]
async fn info_failure_does_not_fail_the_cycle() {
    let port = ScriptedPort::new()
        .reply("info", &["garbage without colons"])
        .reply("pwr", &[PWR])
        .reply("stat", &[STAT]);
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    assert!(session.poll_once(t0()).await.is_ok());
    assert!(!session.device_info().is_populated());

    session.poll_once(t0() + Duration::seconds(15)).await.unwrap();
    let commands = log.lock().unwrap().commands.clone();
    assert_eq!(commands.iter().filter(|c| *c == "info").count(), 2);
}

#[tokio::test]
async fn stat_values_merge_into_matching_modules_only() {
    let (mut session, _tx) = session_with(ScriptedPort::healthy());
    let snap = session.poll_once(t0()).await.unwrap();

    assert_eq!(snap.module(1).unwrap().cycles, Some(430));
    assert_eq!(snap.module(2).unwrap().soh_pct, Some(96.0));
    assert!(snap.module(7).is_none());
    assert_eq!(snap.cycles, Some(431));
    assert_eq!(snap.soh_pct, Some(97.0));
}

#[tokio::test]
async fn stat_failure_is_recovered() {
    let port = ScriptedPort::healthy().fail_command("stat");
    let (mut session, _tx) = session_with(port);

    let snap = session.poll_once(t0()).await.unwrap();
    assert_eq!(snap.module_count, 2);
    assert_eq!(snap.soh_pct, None);
    assert_eq!(snap.cycles, None);
    assert!(snap.modules.iter().all(|m| m.cycles.is_none()));
}

#[tokio::test]
async fn missing_header_is_retried_once() {
    let port = ScriptedPort::new()
        .reply("info", &[INFO])
        .reply("pwr", &["pwr\r\n@\r\n", PWR])
        .reply("stat", &[STAT]);
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    let snap = session.poll_once(t0()).await.unwrap();
    assert_eq!(snap.module_count, 2);
    // The re-read is not a second command
    let commands = log.lock().unwrap().commands.clone();
    assert_eq!(commands.iter().filter(|c| *c == "pwr").count(), 1);
}

#[tokio::test]
async fn missing_header_twice_is_a_protocol_failure() {
    let port = ScriptedPort::new()
        .reply("info", &[INFO])
        .reply("pwr", &["pwr\r\n@\r\n", "still nothing\r\n"])
        .reply("stat", &[STAT]);
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    let failure = session.poll_once(t0()).await.unwrap_err();
    assert_eq!(failure.stage, CycleStage::FetchPower);
    assert!(matches!(failure.error, PylonError::Protocol { .. }));
    assert_eq!(session.stage(), CycleStage::Failed);

    let log = log.lock().unwrap();
    assert_eq!(log.closes, 1);
    // Nothing after pwr was attempted
    assert!(!log.commands.contains(&"stat".to_string()));
}

#[tokio::test]
async fn zero_modules_is_an_empty_result() {
    let port = ScriptedPort::new()
        .reply("info", &[INFO])
        .reply("pwr", &[PWR_ALL_ABSENT])
        .reply("stat", &[STAT]);
    let (mut session, _tx) = session_with(port);

    let failure = session.poll_once(t0()).await.unwrap_err();
    assert!(matches!(failure.error, PylonError::EmptyResult { .. }));
    assert_eq!(failure.stage, CycleStage::FetchPower);
    // A failed cycle never seeds the energy baseline
    assert!(session.energy_state().last_update_timestamp.is_none());
}

#[tokio::test]
async fn transport_failure_reopens_on_next_poll() {
    // info swallows the first failed open, pwr hits the second
    let port = ScriptedPort::healthy().fail_opens(2);
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    let failure = session.poll_once(t0()).await.unwrap_err();
    assert!(matches!(failure.error, PylonError::Transport { .. }));
    assert_eq!(failure.stage, CycleStage::FetchPower);

    let snap = session.poll_once(t0() + Duration::seconds(15)).await.unwrap();
    assert_eq!(snap.module_count, 2);
    assert_eq!(log.lock().unwrap().opens, 3);
}

#[tokio::test]
async fn energy_accrues_from_the_second_poll() {
    let (mut session, _tx) = session_with(ScriptedPort::healthy());

    let first = session.poll_once(t0()).await.unwrap();
    assert_eq!(first.energy_in_kwh, 0.0);
    assert_eq!(first.energy_out_kwh, 0.0);

    let second = session.poll_once(t0() + Duration::hours(1)).await.unwrap();
    assert!((second.energy_in_kwh - 0.386).abs() < 1e-9);
    assert_eq!(second.energy_out_kwh, 0.0);
    assert!(second.energy_in_kwh >= first.energy_in_kwh);
}

#[tokio::test]
async fn failed_poll_leaves_energy_untouched() {
    let port = ScriptedPort::new()
        .reply("info", &[INFO])
        .reply("pwr", &[PWR])
        .reply("pwr", &["no table"])
        .reply("stat", &[STAT]);
    let (mut session, _tx) = session_with(port);

    session.poll_once(t0()).await.unwrap();
    let before = session.energy_state().clone();
    assert!(session.poll_once(t0() + Duration::hours(1)).await.is_err());
    assert_eq!(session.energy_state(), &before);
}

#[tokio::test]
async fn bms_time_is_read_when_enabled() {
    let mut config = fast_config();
    config.clock.read_each_poll = true;
    let port = ScriptedPort::healthy();
    let log = port.log();
    let (transport, _tx) = scripted_transport(port);
    let mut session = CommandSession::new(&config, transport);

    let snap = session.poll_once(t0()).await.unwrap();
    assert_eq!(snap.bms_time.as_deref(), Some("2025-12-21 21:14:53"));
    assert_eq!(
        log.lock().unwrap().commands,
        vec!["info", "pwr", "stat", "time"]
    );
}

#[tokio::test]
async fn clock_commands() {
    let port = ScriptedPort::healthy();
    let log = port.log();
    let (mut session, _tx) = session_with(port);

    let at = session.read_clock().await.unwrap();
    assert_eq!(
        at,
        NaiveDate::from_ymd_opt(2025, 12, 21)
            .unwrap()
            .and_hms_opt(21, 14, 53)
            .unwrap()
    );

    let target = NaiveDate::from_ymd_opt(2026, 3, 4)
        .unwrap()
        .and_hms_opt(5, 6, 7)
        .unwrap();
    session.sync_clock(target).await.unwrap();
    assert_eq!(
        log.lock().unwrap().commands.last().map(String::as_str),
        Some("time 26 03 04 05 06 07")
    );
}

#[tokio::test]
async fn shutdown_cancels_a_poll() {
    let port = ScriptedPort::healthy();
    let (transport, tx) = scripted_transport(port);
    let mut config = fast_config();
    config.timing.settle_delay_ms = 60_000;
    config.timing.info_settle_delay_ms = 60_000;
    let mut session = CommandSession::new(&config, transport);

    tx.send_replace(true);
    let failure = tokio::time::timeout(std::time::Duration::from_secs(5), session.poll_once(t0()))
        .await
        .expect("poll should not sleep out its delays")
        .unwrap_err();
    assert!(matches!(failure.error, PylonError::Cancelled { .. }));
}

fn assert_send<T: Send>(_: &T) {}

#[test]
fn poll_cycle_can_run_on_a_spawned_task() {
    let (mut session, _tx) = session_with(ScriptedPort::healthy());
    let cycle = session.poll_once(t0());
    assert_send(&cycle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poll_cycle_completes_on_the_multi_thread_runtime() {
    let (mut session, _tx) = session_with(ScriptedPort::healthy());
    let snap = tokio::spawn(async move { session.poll_once(t0()).await })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snap.module_count, 2);
}
