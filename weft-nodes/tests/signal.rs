//! Signal lifecycle: blocking emission, reset, and crash recovery.

use serde_json::json;
use std::time::Duration;
use weft_core::testing::Harness;
use weft_core::CONTROL_PORT;
use weft_nodes::triggers::signal::{
    Signal, METADATA_KEY_CONTEXT, METADATA_KEY_RUNNING, OUT_PORT,
};

fn reset_enable(harness: &Harness) -> bool {
    harness.port(CONTROL_PORT).unwrap().configuration["resetEnable"] == json!(true)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn send_starts_blocking_emission() {
    let harness = Harness::new(&Signal::default());
    harness.mark_blocking(OUT_PORT);

    assert!(!reset_enable(&harness));
    harness
        .send_as_leader(CONTROL_PORT, json!({"context": "go", "send": true}))
        .await
        .unwrap();
    settle().await;

    // Emission is in flight: payload delivered, state persisted, control
    // descriptor flipped to Reset.
    assert_eq!(harness.port_outputs(OUT_PORT), vec![json!("go")]);
    let metadata = harness.metadata();
    assert_eq!(metadata.get(METADATA_KEY_RUNNING).map(String::as_str), Some("true"));
    assert_eq!(metadata.get(METADATA_KEY_CONTEXT).map(String::as_str), Some(r#""go""#));
    assert!(reset_enable(&harness));
}

#[tokio::test]
async fn reset_ends_emission_and_clears_state() {
    let harness = Harness::new(&Signal::default());
    harness.mark_blocking(OUT_PORT);

    harness
        .send_as_leader(CONTROL_PORT, json!({"context": "go", "send": true}))
        .await
        .unwrap();
    settle().await;

    harness
        .send_as_leader(CONTROL_PORT, json!({"context": "go", "reset": true}))
        .await
        .unwrap();
    settle().await;

    let metadata = harness.metadata();
    assert!(!metadata.contains_key(METADATA_KEY_RUNNING));
    assert!(!metadata.contains_key(METADATA_KEY_CONTEXT));
    assert!(!reset_enable(&harness));

    // No re-entry after reset.
    assert_eq!(harness.port_outputs(OUT_PORT).len(), 1);
}

#[tokio::test]
async fn completed_emission_clears_running_state() {
    // Out is NOT blocking here: the edge ends immediately.
    let harness = Harness::new(&Signal::default());
    harness
        .send_as_leader(CONTROL_PORT, json!({"context": 1, "send": true}))
        .await
        .unwrap();
    settle().await;

    assert_eq!(harness.port_outputs(OUT_PORT), vec![json!(1)]);
    assert!(!harness.metadata().contains_key(METADATA_KEY_RUNNING));
    assert!(!reset_enable(&harness));
}

#[tokio::test]
async fn non_leader_control_is_ignored() {
    let harness = Harness::new(&Signal::default());
    harness
        .send(CONTROL_PORT, json!({"context": "go", "send": true}))
        .await
        .unwrap();
    settle().await;

    assert!(harness.outputs().is_empty());
    assert!(harness.metadata().is_empty());
}

#[tokio::test]
async fn leader_resumes_emission_after_pod_restart() {
    let pod1 = Harness::new(&Signal::default());
    pod1.mark_blocking(OUT_PORT);
    pod1.send_as_leader(CONTROL_PORT, json!({"context": "payload", "send": true}))
        .await
        .unwrap();
    settle().await;

    // New replica, same metadata.
    let pod2 = pod1.new_pod();
    pod2.mark_blocking(OUT_PORT);
    pod2.reconcile_as_leader().await.unwrap();
    settle().await;

    assert_eq!(pod2.port_outputs(OUT_PORT), vec![json!("payload")]);
    assert!(reset_enable(&pod2));
}

#[tokio::test]
async fn non_leader_does_not_resume_but_tracks_state() {
    let pod1 = Harness::new(&Signal::default());
    pod1.mark_blocking(OUT_PORT);
    pod1.send_as_leader(CONTROL_PORT, json!({"context": "payload", "send": true}))
        .await
        .unwrap();
    settle().await;

    let pod2 = pod1.new_pod();
    pod2.mark_blocking(OUT_PORT);
    pod2.reconcile().await.unwrap();
    settle().await;

    // No side effects, but the control descriptor reflects the cluster
    // state so a later takeover renders correctly.
    assert!(pod2.port_outputs(OUT_PORT).is_empty());
    assert!(reset_enable(&pod2));
}

#[tokio::test]
async fn orphaned_running_marker_is_cleared() {
    let harness = Harness::new(&Signal::default());
    harness.insert_metadata(METADATA_KEY_RUNNING, "true");
    // No signal-context, no settings context: nothing to re-enter with.

    harness.reconcile_as_leader().await.unwrap();
    settle().await;

    assert!(harness.outputs().is_empty());
    assert!(!harness.metadata().contains_key(METADATA_KEY_RUNNING));
}
