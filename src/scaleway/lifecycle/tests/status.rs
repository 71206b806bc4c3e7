//! Tests for server state mapping.

use rstest::rstest;

use super::snapshot;
use crate::backend::{InstanceState, InstanceStatus};
use crate::scaleway::lifecycle::status::instance_state;
use crate::scaleway::types::Action;

#[rstest]
#[case("running", InstanceState::Running)]
#[case("starting", InstanceState::Pending)]
#[case("stopped", InstanceState::Stopped)]
#[case("stopped in place", InstanceState::Stopped)]
#[case("stopping", InstanceState::Stopped)]
#[case("locked", InstanceState::Error(String::from("locked")))]
fn scaleway_states_map_to_lifecycle_states(#[case] raw: &str, #[case] expected: InstanceState) {
    assert_eq!(instance_state(raw), expected);
}

#[test]
fn status_uses_public_ip_as_address() {
    let snap = snapshot("id", "running", Vec::<Action>::new(), Some("51.15.0.10"));
    assert_eq!(
        snap.status(),
        InstanceStatus {
            state: InstanceState::Running,
            address: Some(String::from("51.15.0.10")),
        }
    );
}

#[test]
fn status_without_public_ip_has_no_address() {
    let snap = snapshot("id", "starting", Vec::<Action>::new(), Some(" "));
    assert_eq!(snap.status().address, None);
}

#[test]
fn snapshot_reports_allowed_actions() {
    let snap = snapshot("id", "running", ["terminate", "poweroff"], None);
    assert!(snap.allows("terminate"));
    assert!(!snap.allows("poweron"));
}
