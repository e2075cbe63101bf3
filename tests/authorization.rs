use opsbot::services::permissions::{Permission, PermissionSet};
use opsbot::stores::{PermissionStore, SqlitePermissionStore};
use opsbot::services::logger::Logger;
use std::sync::Arc;

mod common;
use common::{harness, harness_with_store, ADMIN_SECRET};

#[tokio::test]
async fn bootstrap_then_delegate_capabilities() {
    let h = harness();
    h.remote
        .respond_ok("docker ps -a", "abc123\tweb\t0.0.0.0:80->80/tcp\tUp 2 hours\n");

    let reply = h.send(1001, "/whoami").await;
    assert_eq!(reply, "Your chat_id: 1001. You are not authorized.");

    let reply = h.send(1001, "/containers").await;
    assert_eq!(reply, "You are not authorized. Contact an administrator.");

    let reply = h.send(1001, "/init wrong").await;
    assert_eq!(reply, "Invalid initialization password.");

    let reply = h.send(1001, &format!("/init {}", ADMIN_SECRET)).await;
    assert_eq!(reply, "User 1001 is now an administrator.");

    let reply = h.send(2002, &format!("/init {}", ADMIN_SECRET)).await;
    assert_eq!(reply, "Error: Initialization has already been completed.");

    let reply = h.send(1001, "/add_user 2002").await;
    assert_eq!(reply, "User 2002 added without permissions.");

    let reply = h.send(2002, "/containers").await;
    assert_eq!(reply, "You do not have permission to run this command.");
    assert_eq!(h.remote.opened(), 0);

    let reply = h
        .send(1001, "/update_permissions 2002 containers_list,logs_view")
        .await;
    assert_eq!(reply, "Permissions for 2002 updated: containers_list,logs_view");

    let reply = h.send(2002, "/containers").await;
    assert!(reply.starts_with("Containers:\nID\tName\tPorts\tStatus\n"));
    assert!(reply.contains("abc123\tweb"));

    let reply = h.send(2002, "/add_user 3003").await;
    assert_eq!(reply, "You do not have permission to run this command.");

    let reply = h.send(1001, "/list_users").await;
    assert_eq!(
        reply,
        "Users:\n- Chat ID: 1001, Permissions: admin\n- Chat ID: 2002, Permissions: containers_list,logs_view"
    );

    let reply = h.send(1001, "/remove_user 2002").await;
    assert_eq!(reply, "User 2002 removed.");
    let reply = h.send(2002, "/containers").await;
    assert_eq!(reply, "You are not authorized. Contact an administrator.");
    h.assert_sessions_released();
}

#[tokio::test]
async fn invalid_permission_tokens_reject_whole_update() {
    let h = harness();
    h.grant(1001, &[Permission::Admin]);
    h.grant(2002, &[Permission::LogsView]);

    let reply = h.send(1001, "/update_permissions 2002 deploy bogus").await;
    assert!(reply.starts_with("Error: Invalid permissions: bogus."));
    assert!(reply.contains("Available: deploy, containers_list"));
    assert_eq!(
        h.store.get(2002).expect("get"),
        [Permission::LogsView].into_iter().collect::<PermissionSet>()
    );

    let reply = h.send(1001, "/update_permissions 4004 deploy").await;
    assert_eq!(reply, "Error: User not found.");
}

#[tokio::test]
async fn admin_satisfies_every_gate() {
    let h = harness();
    h.grant(1001, &[Permission::Admin]);
    h.remote.respond_ok("docker stats", "web\t0.5%\t10MiB / 1GiB\t1kB / 2kB\n");

    let reply = h.send(1001, "/stats").await;
    assert!(reply.starts_with("Container stats:"));
    assert!(reply.contains("web\t0.5%"));
}

#[tokio::test]
async fn unknown_commands_depend_on_who_asks() {
    let h = harness();
    let reply = h.send(5005, "/stat").await;
    assert_eq!(reply, "You are not authorized. Contact an administrator.");

    h.grant(5005, &[]);
    let reply = h.send(5005, "/stat").await;
    assert_eq!(
        reply,
        "Error: Unknown command: /stat\nDid you mean: /start, /stats?"
    );
}

#[tokio::test]
async fn open_commands_need_no_registration() {
    let h = harness();
    let reply = h.send(7, "/start").await;
    assert!(reply.contains("/whoami"));
    let reply = h.send(7, "/add_user 8").await;
    assert_eq!(reply, "You are not authorized. Contact an administrator.");
}

#[tokio::test]
async fn bootstrap_survives_store_reopen() {
    let tmp_dir = std::env::temp_dir().join(format!("opsbot-test-{}", uuid::Uuid::new_v4()));
    let db_path = tmp_dir.join("bot.db");
    {
        let store = SqlitePermissionStore::open(Logger::new("test"), &db_path).expect("open store");
        let h = harness_with_store(Arc::new(store));
        let reply = h.send(1001, &format!("/init {}", ADMIN_SECRET)).await;
        assert_eq!(reply, "User 1001 is now an administrator.");
        let reply = h.send(1001, "/add_user 2002").await;
        assert_eq!(reply, "User 2002 added without permissions.");
    }

    let reopened = SqlitePermissionStore::open(Logger::new("test"), &db_path).expect("reopen");
    let users = reopened.list().expect("list");
    assert_eq!(
        users,
        vec![(1001, PermissionSet::admin()), (2002, PermissionSet::empty())]
    );
    let _ = std::fs::remove_dir_all(&tmp_dir);
}

#[tokio::test]
async fn every_command_has_a_gate() {
    use opsbot::bot::router::Gate;

    let h = harness();
    assert_eq!(h.app.router.commands().len(), 24);
    assert_eq!(h.app.router.gate_of("whoami"), Some(Gate::Open));
    assert_eq!(
        h.app.router.gate_of("list_backups"),
        Some(Gate::Capability(Permission::BackupsDownload))
    );
    assert_eq!(
        h.app.router.gate_of("logs"),
        Some(Gate::Capability(Permission::ContainersList))
    );
    assert_eq!(
        h.app.router.gate_of("deploy"),
        Some(Gate::Capability(Permission::Deploy))
    );
    assert_eq!(h.app.router.gate_of("exec"), None);
}

#[tokio::test]
async fn delegated_log_permissions_exclude_deploy() {
    let h = harness();
    h.send(1001, &format!("/init {}", ADMIN_SECRET)).await;
    assert_eq!(h.app.auth.permissions_of(1001).expect("perms"), PermissionSet::admin());

    h.send(1001, "/add_user 2002").await;
    assert!(h.app.auth.is_authorized(2002).expect("authorized"));
    assert!(!h.app.auth.has_capability(2002, Permission::Deploy).expect("cap"));

    let reply = h
        .send(1001, "/update_permissions 2002 logs_view,logs_monitor")
        .await;
    assert_eq!(reply, "Permissions for 2002 updated: logs_view,logs_monitor");
    assert!(h.app.auth.has_capability(2002, Permission::LogsView).expect("cap"));
    assert!(h.app.auth.has_capability(2002, Permission::LogsMonitor).expect("cap"));

    let reply = h.send(2002, "git@github.com:acme/site.git").await;
    assert_eq!(reply, "You do not have permission to run this command.");
    let reply = h.send(2002, "/whoami").await;
    assert_eq!(reply, "Your chat_id: 2002, Permissions: logs_view,logs_monitor");
}

#[tokio::test]
async fn re_adding_a_user_clears_their_permissions() {
    let h = harness();
    h.grant(1001, &[Permission::Admin]);
    h.grant(2002, &[Permission::Deploy, Permission::LogsView]);

    let reply = h.send(1001, "/add_user 2002").await;
    assert_eq!(reply, "User 2002 added without permissions.");
    assert_eq!(h.store.get(2002).expect("get"), PermissionSet::empty());
    let reply = h.send(2002, "/whoami").await;
    assert_eq!(reply, "Your chat_id: 2002, Permissions: none");
}
