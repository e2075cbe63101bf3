use opsbot::services::permissions::Permission;

mod common;
use common::{failed, harness, Harness};

fn operator() -> Harness {
    let h = harness();
    h.grant(
        1001,
        &[
            Permission::ContainersList,
            Permission::ContainersStart,
            Permission::ContainersStop,
            Permission::ContainersRemove,
        ],
    );
    h
}

#[tokio::test]
async fn empty_listing_is_reported() {
    let h = operator();
    let reply = h.send(1001, "/containers").await;
    assert_eq!(reply, "No containers found.");
    h.assert_sessions_released();
}

#[tokio::test]
async fn remove_stops_running_container_first() {
    let h = operator();
    h.remote.respond_ok("docker inspect", "true\n");

    let reply = h.send(1001, "/remove web").await;
    assert_eq!(reply, "Container web removed.");
    assert_eq!(
        h.remote.executed(),
        vec![
            "docker inspect --format '{{.State.Running}}' 'web'".to_string(),
            "docker stop 'web'".to_string(),
            "docker rm 'web'".to_string(),
        ]
    );
}

#[tokio::test]
async fn remove_skips_stop_for_stopped_container() {
    let h = operator();
    h.remote.respond_ok("docker inspect", "false\n");

    let reply = h.send(1001, "/remove web").await;
    assert_eq!(reply, "Container web removed.");
    assert!(!h.remote.ran("docker stop"));
    assert!(h.remote.ran("docker rm 'web'"));
}

#[tokio::test]
async fn docker_failure_surfaces_stderr() {
    let h = operator();
    h.remote.respond(
        "docker stop",
        vec![failed("Error response from daemon: No such container: ghost\n", 1)],
    );

    let reply = h.send(1001, "/stop ghost").await;
    assert_eq!(
        reply,
        "Error: Failed to stop container ghost: Error response from daemon: No such container: ghost"
    );
    h.assert_sessions_released();
}

#[tokio::test]
async fn arguments_are_checked_before_connecting() {
    let h = operator();
    let reply = h.send(1001, "/stop").await;
    assert_eq!(reply, "Error: Usage: /stop <container_id>");
    let reply = h.send(1001, "/start_container a b").await;
    assert_eq!(reply, "Error: Usage: /start_container <container_id>");
    assert_eq!(h.remote.opened(), 0);
}

#[tokio::test]
async fn ids_are_quoted_for_the_shell() {
    let h = operator();
    let reply = h.send(1001, "/start_container web;reboot").await;
    assert_eq!(reply, "Container web;reboot started.");
    assert_eq!(h.remote.executed(), vec!["docker start 'web;reboot'".to_string()]);
}

#[tokio::test]
async fn logs_show_tail_of_container_output() {
    let h = operator();
    h.remote.respond_ok("docker logs --tail 50 'web'", "listening on :80\n");
    let reply = h.send(1001, "/logs web").await;
    assert_eq!(reply, "Logs of container web:\nlistening on :80");

    h.remote.respond_ok("docker logs --tail 50 'idle'", "");
    let reply = h.send(1001, "/logs idle").await;
    assert_eq!(reply, "Logs of container idle are empty.");
}

#[tokio::test]
async fn connection_failure_is_reported() {
    let h = operator();
    h.remote.refuse_connections();
    let reply = h.send(1001, "/containers").await;
    assert_eq!(reply, "Connection error: connection refused");
}
