//! Tests for cleaning up servers whose start-up failed.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{backend_fixture, snapshot};
use crate::scaleway::ScalewayBackendError;
use crate::scaleway::lifecycle::discard_on_failure;
use crate::scaleway::types::{Action, Zone};
use crate::test_support::LogCapture;

fn provider_error(message: &str) -> ScalewayBackendError {
    ScalewayBackendError::Provider {
        message: message.to_owned(),
    }
}

#[tokio::test]
async fn failed_start_removes_the_server_once() {
    let snap = snapshot("srv-1", "stopped", Vec::<Action>::new(), None);
    let zone = Zone::from("zone");
    let started = backend_fixture().start(&zone, &snap, None).await;
    let attempts = AtomicUsize::new(0);

    let result = discard_on_failure("srv-1", started, || async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await;

    assert!(matches!(
        result,
        Err(ScalewayBackendError::PowerOnNotAllowed { ref instance_id, .. }) if instance_id == "srv-1"
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn successful_start_keeps_the_server() {
    let snap = snapshot("srv-1", "running", Vec::<Action>::new(), None);
    let zone = Zone::from("zone");
    let started = backend_fixture().start(&zone, &snap, None).await;
    let attempts = AtomicUsize::new(0);

    let result = discard_on_failure("srv-1", started, || async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
    .await;

    assert!(result.is_ok());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[test]
fn failed_removal_reports_the_start_error() {
    let capture = LogCapture::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let result = capture.in_scope(|| {
        runtime.block_on(discard_on_failure::<(), _, _>(
            "srv-2",
            Err(provider_error("user data rejected")),
            || async { Err(provider_error("delete refused")) },
        ))
    });

    assert!(matches!(
        result,
        Err(ScalewayBackendError::Provider { ref message }) if message == "user data rejected"
    ));
    let logs = capture.contents();
    assert!(logs.contains("failed to remove partially created server"));
    assert!(logs.contains("srv-2"));
    assert!(logs.contains("delete refused"));
}

#[test]
fn removal_of_a_failed_server_is_logged() {
    let capture = LogCapture::new();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let result = capture.in_scope(|| {
        runtime.block_on(discard_on_failure::<(), _, _>(
            "srv-3",
            Err(provider_error("boot failed")),
            || async { Ok(()) },
        ))
    });

    assert!(result.is_err());
    assert!(capture.contents().contains("removed partially created server"));
}
