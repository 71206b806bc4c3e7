//! Tests for the cloud manager and the manager registry.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::backend::{InstanceRequest, InstanceRequestBuilder};
use crate::binding::{ProxySettings, VclWriter};
use crate::config::BrokerConfig;
use crate::directory::{InstanceDirectory, MemoryDirectory};
use crate::remote::SshConfig;
use crate::test_support::{ScriptedBackend, StubExecutor};

type TestManager = CloudManager<ScriptedBackend, MemoryDirectory, StubExecutor>;

struct Harness {
    backend: ScriptedBackend,
    executor: StubExecutor,
    manager: TestManager,
}

fn defaults() -> InstanceRequestBuilder {
    InstanceRequest::builder()
        .image_label("varnish")
        .instance_type("DEV1-S")
        .zone("fr-par-1")
        .project_id("proj")
        .architecture("x86_64")
}

#[fixture]
fn harness() -> Harness {
    let backend = ScriptedBackend::new();
    let executor = StubExecutor::new();
    let manager = CloudManager::new(
        backend.clone(),
        MemoryDirectory::new(),
        VclWriter::new(executor.clone(), ProxySettings::default()),
        defaults(),
    );
    Harness {
        backend,
        executor,
        manager,
    }
}

async fn provisioned(harness: Harness) -> Harness {
    harness
        .manager
        .add_instance("cache")
        .await
        .expect("add_instance should succeed");
    harness
}

#[rstest]
#[tokio::test]
async fn add_instance_creates_and_stores(harness: Harness) {
    let Harness {
        backend, manager, ..
    } = provisioned(harness).await;

    let requests = backend.created_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests.first().map(|req| req.name.as_str()), Some("cache"));
    let stored = manager.directory().retrieve("cache").expect("stored");
    assert_eq!(stored.resource_id, "server-1");
    assert_eq!(stored.address, None);
}

#[rstest]
#[tokio::test]
async fn add_instance_rejects_duplicates(harness: Harness) {
    let ready = provisioned(harness).await;

    let err = ready
        .manager
        .add_instance("cache")
        .await
        .expect_err("duplicate should fail");

    assert_eq!(
        err,
        ManagerError::InstanceExists {
            name: String::from("cache")
        }
    );
    assert_eq!(ready.backend.created_requests().len(), 1);
}

#[rstest]
#[tokio::test]
async fn add_instance_rejects_blank_names(harness: Harness) {
    let err = harness
        .manager
        .add_instance("  ")
        .await
        .expect_err("blank should fail");
    assert_eq!(err, ManagerError::InvalidName);
    assert!(harness.backend.created_requests().is_empty());
}

#[rstest]
#[tokio::test]
async fn provisioning_failure_stores_nothing(harness: Harness) {
    harness.backend.fail_create("quota exceeded");

    let err = harness
        .manager
        .add_instance("cache")
        .await
        .expect_err("create should fail");

    let ManagerError::Provisioning { message } = err else {
        panic!("expected provisioning error, got {err:?}");
    };
    assert!(message.contains("quota exceeded"));
    assert_eq!(harness.manager.directory().list(), Ok(Vec::new()));
}

#[rstest]
#[tokio::test]
async fn remove_instance_destroys_and_forgets(harness: Harness) {
    let ready = provisioned(harness).await;

    ready
        .manager
        .remove_instance("cache")
        .await
        .expect("remove should succeed");

    assert_eq!(ready.backend.destroyed_ids(), vec![String::from("server-1")]);
    assert!(ready.manager.directory().list().expect("list").is_empty());
}

#[rstest]
#[tokio::test]
async fn remove_missing_instance_is_not_found(harness: Harness) {
    let err = harness
        .manager
        .remove_instance("ghost")
        .await
        .expect_err("missing instance");
    assert_eq!(
        err,
        ManagerError::InstanceNotFound {
            name: String::from("ghost")
        }
    );
}

#[rstest]
#[tokio::test]
async fn destroy_failure_keeps_entry(harness: Harness) {
    let ready = provisioned(harness).await;
    ready.backend.fail_destroy("api down");

    let err = ready
        .manager
        .remove_instance("cache")
        .await
        .expect_err("destroy should fail");

    assert!(matches!(err, ManagerError::Provisioning { .. }));
    assert!(ready.manager.directory().retrieve("cache").is_ok());
}

#[rstest]
#[tokio::test]
async fn bind_resolves_and_caches_address(harness: Harness) {
    let ready = provisioned(harness).await;

    ready
        .manager
        .bind("cache", "myapp.cloud.tsuru.io")
        .await
        .expect("bind should succeed");

    let invocations = ready.executor.invocations();
    assert_eq!(invocations.len(), 1);
    let call = invocations.first().expect("one command");
    assert_eq!(call.host, "10.0.0.1");
    assert!(call.command.contains(".host = \\\"myapp.cloud.tsuru.io\\\";"));
    assert!(call.command.ends_with("&& service varnish reload\""));

    let stored = ready.manager.directory().retrieve("cache").expect("stored");
    assert_eq!(stored.address.as_deref(), Some("10.0.0.1"));
}

#[rstest]
#[tokio::test]
async fn cached_address_survives_provider_changes(harness: Harness) {
    let ready = provisioned(harness).await;
    ready
        .manager
        .bind("cache", "first.example.com")
        .await
        .expect("first bind");
    ready.backend.set_status(
        "server-1",
        crate::backend::InstanceState::Running,
        Some("192.0.2.7"),
    );

    ready
        .manager
        .unbind("cache", "first.example.com")
        .await
        .expect("unbind");

    let hosts: Vec<String> = ready
        .executor
        .invocations()
        .into_iter()
        .map(|call| call.host)
        .collect();
    assert_eq!(hosts, vec![String::from("10.0.0.1"), String::from("10.0.0.1")]);
}

#[rstest]
#[tokio::test]
async fn bind_rejects_unsafe_app_host(harness: Harness) {
    let ready = provisioned(harness).await;

    let err = ready
        .manager
        .bind("cache", "x'; reboot; echo '")
        .await
        .expect_err("unsafe host");

    assert!(matches!(err, ManagerError::InvalidAddress(_)));
    assert!(ready.executor.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn bind_reports_remote_failure(harness: Harness) {
    let ready = provisioned(harness).await;
    ready.executor.push_result(1, "permission denied");

    let err = ready
        .manager
        .bind("cache", "myapp.cloud.tsuru.io")
        .await
        .expect_err("remote failure");

    assert!(matches!(err, ManagerError::RemoteConfiguration(_)));
    assert!(err.to_string().contains("permission denied"));
}

#[rstest]
#[tokio::test]
async fn bind_without_address_is_unresolved(harness: Harness) {
    let ready = provisioned(harness).await;
    ready
        .backend
        .set_status("server-1", crate::backend::InstanceState::Pending, None);

    let err = ready
        .manager
        .bind("cache", "myapp.cloud.tsuru.io")
        .await
        .expect_err("no address yet");

    assert_eq!(
        err,
        ManagerError::AddressUnresolved {
            name: String::from("cache")
        }
    );
    assert!(ready.executor.invocations().is_empty());
}

#[rstest]
#[tokio::test]
async fn bind_to_vanished_resource_is_not_found(harness: Harness) {
    let ready = provisioned(harness).await;
    ready.backend.forget("server-1");

    let err = ready
        .manager
        .bind("cache", "myapp.cloud.tsuru.io")
        .await
        .expect_err("resource gone");

    assert!(matches!(err, ManagerError::InstanceNotFound { .. }));
}

#[rstest]
#[tokio::test]
async fn unbind_clears_configuration(harness: Harness) {
    let ready = provisioned(harness).await;

    ready
        .manager
        .unbind("cache", "ignored.example.com")
        .await
        .expect("unbind should succeed");

    let commands: Vec<String> = ready
        .executor
        .invocations()
        .into_iter()
        .map(|call| call.command)
        .collect();
    assert_eq!(
        commands,
        vec![String::from(
            "sudo bash -c 'echo \"\" > /etc/varnish/default.vcl'"
        )]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_binds_on_one_instance_all_run(harness: Harness) {
    let ready = Arc::new(provisioned(harness).await);

    let tasks: Vec<_> = (0..8)
        .map(|index| {
            let shared = Arc::clone(&ready);
            tokio::spawn(async move {
                let host = format!("app{index}.example.com");
                shared.manager.bind("cache", &host).await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("bind should succeed");
    }

    assert_eq!(ready.executor.invocations().len(), 8);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_binds_leave_no_lock_entries(harness: Harness) {
    let ready = Arc::new(provisioned(harness).await);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&ready);
            tokio::spawn(async move { shared.manager.bind("cache", "app.example.com").await })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("bind should succeed");
    }

    assert_eq!(ready.manager.tracked_locks(), 0);
}

#[rstest]
#[tokio::test]
async fn unknown_names_leave_no_lock_entries(harness: Harness) {
    for index in 0..16 {
        let name = format!("ghost-{index}");
        let err = harness
            .manager
            .bind(&name, "app.example.com")
            .await
            .expect_err("unknown instance");
        assert!(matches!(err, ManagerError::InstanceNotFound { .. }));
    }

    assert_eq!(harness.manager.tracked_locks(), 0);
}

#[rstest]
#[tokio::test]
async fn removed_instances_leave_no_lock_entries(harness: Harness) {
    let ready = provisioned(harness).await;
    ready
        .manager
        .bind("cache", "app.example.com")
        .await
        .expect("bind should succeed");

    ready
        .manager
        .remove_instance("cache")
        .await
        .expect("remove should succeed");

    assert_eq!(ready.manager.tracked_locks(), 0);
}

#[rstest]
#[tokio::test]
async fn add_instance_trims_the_name(harness: Harness) {
    harness
        .manager
        .add_instance("  cache ")
        .await
        .expect("add_instance should succeed");

    let requests = harness.backend.created_requests();
    assert_eq!(requests.first().map(|req| req.name.as_str()), Some("cache"));
    assert!(harness.manager.directory().retrieve("cache").is_ok());
    assert_eq!(harness.manager.directory().list().expect("list").len(), 1);
    let err = harness
        .manager
        .add_instance("cache")
        .await
        .expect_err("trimmed name is taken");
    assert!(matches!(err, ManagerError::InstanceExists { .. }));
}

#[rstest]
#[case(crate::backend::InstanceState::Running, true, "")]
#[case(crate::backend::InstanceState::Pending, false, "Instance is pending")]
#[case(crate::backend::InstanceState::Stopped, false, "Instance is stopped")]
#[tokio::test]
async fn is_ok_reports_provider_state(
    harness: Harness,
    #[case] state: crate::backend::InstanceState,
    #[case] healthy: bool,
    #[case] message: &str,
) {
    let ready = provisioned(harness).await;
    ready.backend.set_status("server-1", state, None);

    let health = ready.manager.is_ok("cache").await.expect("health");

    assert_eq!(health.is_ok(), healthy);
    assert_eq!(health.message, message);
}

#[rstest]
#[tokio::test]
async fn info_describes_instance(harness: Harness) {
    let ready = provisioned(harness).await;

    let info = ready.manager.info("cache").await.expect("info");

    assert_eq!(
        serde_json::to_value(&info).expect("serialise"),
        serde_json::json!({"name": "cache"})
    );
}

fn context() -> ManagerContext {
    ManagerContext {
        broker: BrokerConfig {
            listen: String::from("127.0.0.1:0"),
            manager: String::from("fake"),
            directory_path: None,
            vcl_path: String::from("/etc/varnish/default.vcl"),
            proxy_service: String::from("varnish"),
            authorized_key_file: None,
            log_filter: String::from("info"),
        },
        ssh: SshConfig {
            bin: String::from("ssh"),
            user: String::from("ubuntu"),
            port: 22,
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: String::from("/dev/null"),
            identity_file: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 120,
        },
    }
}

fn fake_factory(context: &ManagerContext) -> Result<Arc<dyn Manager>, RegistryError> {
    let manager: Arc<dyn Manager> = Arc::new(CloudManager::new(
        ScriptedBackend::new(),
        MemoryDirectory::new(),
        VclWriter::new(StubExecutor::new(), context.broker.proxy_settings()),
        defaults(),
    ));
    Ok(manager)
}

#[test]
fn registry_defaults_to_scaleway() {
    assert_eq!(ManagerRegistry::with_defaults().names(), vec!["scaleway"]);
}

#[test]
fn registry_rejects_duplicate_registration() {
    let mut registry = ManagerRegistry::new();
    registry
        .register("fake", fake_factory, false)
        .expect("first registration");

    let err = registry
        .register("fake", fake_factory, false)
        .expect_err("duplicate registration");

    assert_eq!(err.to_string(), "Manager already registered");
}

#[test]
fn registry_override_replaces_factory() {
    let mut registry = ManagerRegistry::with_defaults();
    registry
        .register("scaleway", fake_factory, true)
        .expect("override should succeed");

    assert!(registry.build("scaleway", &context()).is_ok());
}

#[test]
fn registry_reports_unknown_manager() {
    let registry = ManagerRegistry::with_defaults();

    let Err(err) = registry.build("ec2", &context()) else {
        panic!("unknown manager should fail");
    };

    assert_eq!(err.to_string(), "ec2 is not a valid manager");
}

#[tokio::test]
async fn registry_builds_working_manager() {
    let mut registry = ManagerRegistry::new();
    registry
        .register("fake", fake_factory, false)
        .expect("registration");

    let manager = registry.build("fake", &context()).expect("build");
    manager.add_instance("cache").await.expect("add");

    assert_eq!(
        manager.info("cache").await.expect("info").name,
        String::from("cache")
    );
}
