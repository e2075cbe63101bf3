use opsbot::errors::OpsErrorKind;
use opsbot::services::logger::Logger;
use opsbot::services::monitor::MonitorService;
use opsbot::services::permissions::Permission;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{failed, harness, ok, FakeRemote, RecordingTransport};

const LOG: &str = "/var/log/app.log";

fn service() -> (MonitorService, FakeRemote, Arc<RecordingTransport>) {
    let remote = FakeRemote::new();
    let transport = Arc::new(RecordingTransport::new());
    let monitor = MonitorService::new(
        Logger::new("test"),
        Arc::new(remote.clone()),
        transport.clone(),
    );
    (monitor, remote, transport)
}

#[tokio::test(start_paused = true)]
async fn notifies_only_when_tail_changes() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable\n");
    remote.respond(
        "tail -n 10",
        vec![ok("A\nB\nC\n"), ok("A\nB\nC\n"), ok("A\nB\nC\nD\n")],
    );

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let texts = transport.texts_for(1001);
    assert_eq!(texts.len(), 2, "{:?}", texts);
    assert_eq!(texts[0], "New lines in /var/log/app.log:\nA\nB\nC");
    assert_eq!(texts[1], "New lines in /var/log/app.log:\nA\nB\nC\nD");

    monitor.stop(1001).expect("stop");
    assert!(!monitor.is_active(1001));
}

#[tokio::test(start_paused = true)]
async fn first_tick_waits_one_interval() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable");
    remote.respond_ok("tail -n 10", "line\n");

    monitor.start(1001, 1001, LOG, 5.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert!(transport.texts().is_empty());
    assert!(!remote.ran("tail -n 10"));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.texts().len(), 1);
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn second_start_is_rejected_and_keeps_first_job() {
    let (monitor, remote, _transport) = service();
    remote.respond_ok("echo readable", "readable");

    let first = monitor.start(1001, 1001, LOG, 2.0).await.expect("start");
    let err = monitor
        .start(1001, 1001, "/var/log/other.log", 1.0)
        .await
        .expect_err("second start");
    assert_eq!(err.kind, OpsErrorKind::Conflict);
    assert_eq!(err.message, "You already have an active log monitor.");

    let active = monitor.active_job(1001).expect("active job");
    assert_eq!(active, first);
    assert_eq!(active.path, LOG);
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn stop_prevents_further_notifications() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable");
    remote.respond("tail -n 10", vec![ok("one\n"), ok("one\ntwo\n"), ok("one\ntwo\nthree\n")]);

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(transport.texts().len(), 1);

    monitor.stop(1001).expect("stop");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.texts().len(), 1);

    let err = monitor.stop(1001).expect_err("nothing to stop");
    assert_eq!(err.kind, OpsErrorKind::NotFound);
    assert_eq!(err.message, "No active log monitoring.");
}

#[tokio::test(start_paused = true)]
async fn failing_tick_ends_the_job() {
    let (monitor, remote, transport) = service();
    remote.respond("echo readable", vec![ok("readable"), ok("")]);

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(!monitor.is_active(1001));
    assert_eq!(
        transport.texts_for(1001),
        vec![
            "Error: File /var/log/app.log does not exist or is not readable.\nMonitoring of /var/log/app.log stopped."
                .to_string()
        ]
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.texts().len(), 1);
    assert_eq!(remote.opened(), remote.closed());
}

#[tokio::test(start_paused = true)]
async fn lost_connection_ends_the_job() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable");

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    remote.refuse_connections();
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(!monitor.is_active(1001));
    assert_eq!(
        transport.texts_for(1001),
        vec!["Connection error: connection refused\nMonitoring of /var/log/app.log stopped.".to_string()]
    );
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.texts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_tail_ends_the_job() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable");
    remote.respond("tail -n 10", vec![failed("tail: read error: Input/output error\n", 1)]);

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(!monitor.is_active(1001));
    assert_eq!(
        transport.texts_for(1001),
        vec![
            "Error: Log monitoring failed: tail: read error: Input/output error\nMonitoring of /var/log/app.log stopped."
                .to_string()
        ]
    );
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.texts().len(), 1);
    assert_eq!(remote.opened(), remote.closed());
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_is_rejected_before_connecting() {
    let (monitor, remote, _transport) = service();
    remote.respond_ok("echo readable", "readable");

    let err = monitor
        .start(1001, 1001, LOG, 1e20)
        .await
        .expect_err("interval too large");
    assert_eq!(err.kind, OpsErrorKind::InvalidParams);
    assert!(!monitor.is_active(1001));
    assert_eq!(remote.opened(), 0);

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    assert!(monitor.is_active(1001));
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn slow_tick_does_not_overwrite_newer_output() {
    let (monitor, remote, transport) = service();
    remote.respond_ok("echo readable", "readable");
    remote.respond("tail -n 10", vec![ok("A\n"), ok("A\nB\n")]);
    remote.delay("tail -n 10", vec![Duration::from_millis(1_500)]);

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start");
    tokio::time::sleep(Duration::from_millis(3_700)).await;

    assert_eq!(
        transport.texts_for(1001),
        vec!["New lines in /var/log/app.log:\nA\nB".to_string()]
    );
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn unreadable_file_is_never_registered() {
    let (monitor, _remote, _transport) = service();
    let err = monitor
        .start(1001, 1001, "/var/log/missing.log", 1.0)
        .await
        .expect_err("unreadable");
    assert_eq!(err.kind, OpsErrorKind::NotFound);
    assert!(!monitor.is_active(1001));
}

#[tokio::test(start_paused = true)]
async fn jobs_are_independent_per_principal() {
    let (monitor, remote, _transport) = service();
    remote.respond_ok("echo readable", "readable");

    monitor.start(1001, 1001, LOG, 1.0).await.expect("start 1001");
    monitor.start(2002, 2002, LOG, 1.0).await.expect("start 2002");
    assert_eq!(monitor.active_count(), 2);

    monitor.stop(1001).expect("stop 1001");
    assert!(monitor.is_active(2002));

    monitor.stop_all().await;
    assert_eq!(monitor.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn monitor_commands_through_router() {
    let h = harness();
    h.grant(1001, &[Permission::LogsMonitor]);
    h.remote.respond_ok("echo readable", "readable");

    let reply = h.send(1001, "/monitor_logs /var/log/app.log 0.5").await;
    assert_eq!(reply, "Error: Interval must be at least 1 second.");
    assert_eq!(h.remote.opened(), 0);

    let reply = h.send(1001, "/monitor_logs /var/log/app.log 1e20").await;
    assert_eq!(reply, "Error: Interval must be at most 86400 seconds.");
    assert!(!h.app.monitor.is_active(1001));

    let reply = h.send(1001, "/stop_monitoring").await;
    assert_eq!(reply, "Error: No active log monitoring.");

    let reply = h.send(1001, "/monitor_logs /var/log/app.log").await;
    assert_eq!(
        reply,
        "Monitoring /var/log/app.log every 5 s. Stop it with /stop_monitoring."
    );
    let reply = h.send(1001, "/monitor_logs /var/log/app.log 2").await;
    assert_eq!(
        reply,
        "Error: You already have an active log monitor.\nStop it with /stop_monitoring."
    );

    let reply = h.send(1001, "/stop_monitoring").await;
    assert_eq!(reply, "Log monitoring stopped.");
    assert!(!h.app.monitor.is_active(1001));
}
