//! Unit tests for the bind/unbind protocol.

use rstest::{fixture, rstest};

use super::*;
use crate::remote::UNKNOWN_EXIT_CODE;
use crate::test_support::{LogCapture, RemoteInvocation, StubExecutor};

const EXPECTED_BIND: &str = "sudo bash -c \"echo 'backend default {
    .host = \\\"myapp.cloud.tsuru.io\\\";
    .port = \\\"80\\\";
}
' > /etc/varnish/default.vcl && service varnish reload\"";

const EXPECTED_UNBIND: &str = "sudo bash -c 'echo \"\" > /etc/varnish/default.vcl'";

#[fixture]
fn executor() -> StubExecutor {
    StubExecutor::new()
}

fn writer(executor: &StubExecutor) -> VclWriter<StubExecutor> {
    VclWriter::new(executor.clone(), ProxySettings::default())
}

#[rstest]
fn bind_issues_single_write_and_reload(executor: StubExecutor) {
    writer(&executor)
        .bind("10.2.2.1", "myapp.cloud.tsuru.io")
        .expect("bind should succeed");

    assert_eq!(
        executor.invocations(),
        vec![RemoteInvocation {
            host: String::from("10.2.2.1"),
            command: String::from(EXPECTED_BIND),
        }]
    );
}

#[rstest]
fn unbind_clears_file_without_reload(executor: StubExecutor) {
    writer(&executor)
        .unbind("10.2.2.1")
        .expect("unbind should succeed");

    let invocations = executor.invocations();
    assert_eq!(invocations.len(), 1);
    let command = invocations.first().map(|call| call.command.as_str());
    assert_eq!(command, Some(EXPECTED_UNBIND));
}

#[rstest]
fn unbind_twice_issues_identical_commands(executor: StubExecutor) {
    let proxy = writer(&executor);
    proxy.unbind("10.2.2.1").expect("first unbind");
    proxy.unbind("10.2.2.1").expect("second unbind");

    let invocations = executor.invocations();
    assert_eq!(invocations.len(), 2);
    assert_eq!(invocations.first(), invocations.last());
}

#[rstest]
fn bind_failure_carries_remote_output(executor: StubExecutor) {
    executor.push_result(1, "permission denied");
    let capture = LogCapture::new();

    let err = capture
        .in_scope(|| writer(&executor).bind("10.2.2.1", "myapp.cloud.tsuru.io"))
        .expect_err("bind should fail");

    assert_eq!(
        err,
        BindError::RemoteConfiguration {
            instance_address: String::from("10.2.2.1"),
            output: String::from("permission denied"),
        }
    );
    assert!(err.to_string().contains("10.2.2.1"));
    assert!(capture.contents().contains("permission denied"));
}

#[rstest]
fn unreachable_instance_is_a_remote_failure(executor: StubExecutor) {
    executor.push_result(UNKNOWN_EXIT_CODE, "failed to spawn ssh: not found");

    let err = writer(&executor)
        .unbind("10.2.2.1")
        .expect_err("unbind should fail");

    assert!(matches!(err, BindError::RemoteConfiguration { .. }));
}

#[rstest]
#[case("myapp'; reboot; echo '")]
#[case("myapp\" && reboot && echo \"")]
#[case("")]
fn unsafe_app_host_issues_no_command(executor: StubExecutor, #[case] app_host: &str) {
    let err = writer(&executor)
        .bind("10.2.2.1", app_host)
        .expect_err("bind should be refused");

    assert!(matches!(err, BindError::InvalidAddress(_)));
    assert!(executor.invocations().is_empty());
}

#[rstest]
fn unsafe_instance_address_issues_no_command(executor: StubExecutor) {
    let err = writer(&executor)
        .unbind("-oProxyCommand=reboot")
        .expect_err("unbind should be refused");

    assert!(matches!(err, BindError::InvalidAddress(_)));
    assert!(executor.invocations().is_empty());
}

#[rstest]
fn custom_settings_are_quoted(executor: StubExecutor) {
    let proxy = VclWriter::new(
        executor,
        ProxySettings {
            vcl_path: String::from("/etc/varnish/my proxy.vcl"),
            service_name: String::from("varnish-cache"),
        },
    );

    assert_eq!(
        proxy.unbind_command(),
        "sudo bash -c 'echo \"\" > '\\''/etc/varnish/my proxy.vcl'\\'''"
    );
    let bind = proxy.bind_command("app.local").expect("valid host");
    assert!(bind.ends_with("> '/etc/varnish/my proxy.vcl' && service varnish-cache reload\""));
}
