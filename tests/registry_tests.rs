//! Registry lifecycle behavior under concurrency: single in-flight
//! processing, monotonic observed sequences, TTL surfacing, and the JSON
//! intake/result shapes.

mod common;

use common::{task_spec, test_registry_config};
use gatepass::error::ErrorCode;
use gatepass::registry::{TaskRegistry, TaskSpec, TaskStatus, Transition, Variant};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn intake_json_round_trip() {
    let json = r#"{
        "websiteUrl": "https://example.com/checkout",
        "siteKey": "6Le-intake",
        "variant": "enterprise",
        "proxy": {
            "scheme": "http",
            "host": "10.0.0.9",
            "port": 8080,
            "username": "u",
            "password": "p"
        },
        "userAgent": "Custom/1.0",
        "action": "checkout",
        "enterprisePayload": { "s": "extra" },
        "clientKey": "client-9"
    }"#;

    let spec: TaskSpec = serde_json::from_str(json).unwrap();
    assert_eq!(spec.variant, Variant::Enterprise);
    assert_eq!(spec.proxy.as_ref().unwrap().port, 8080);
    assert_eq!(spec.action.as_deref(), Some("checkout"));
    assert!(spec.validate().is_ok());

    let registry = TaskRegistry::new(test_registry_config(16, Duration::from_secs(300)));
    let task = registry.create(spec).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
}

#[test]
fn only_one_processing_transition_wins() {
    let registry = Arc::new(TaskRegistry::new(test_registry_config(
        16,
        Duration::from_secs(300),
    )));
    let task = registry.create(task_spec(Variant::Normal)).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let id = task.id;
        handles.push(std::thread::spawn(move || {
            registry.update(id, Transition::Processing).is_ok()
        }));
    }
    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(wins, 1, "exactly one Processing transition may succeed");
}

#[test]
fn observed_sequences_are_monotonic() {
    let registry = Arc::new(TaskRegistry::new(test_registry_config(
        16,
        Duration::from_secs(300),
    )));
    let task = registry.create(task_spec(Variant::Normal)).unwrap();
    let id = task.id;

    let reader = {
        let registry = Arc::clone(&registry);
        std::thread::spawn(move || {
            let mut observed = Vec::new();
            for _ in 0..200 {
                let status = registry.get(id).unwrap().status;
                if observed.last() != Some(&status) {
                    observed.push(status);
                }
                std::thread::sleep(Duration::from_micros(200));
            }
            observed
        })
    };

    std::thread::sleep(Duration::from_millis(5));
    registry.update(id, Transition::Processing).unwrap();
    std::thread::sleep(Duration::from_millis(5));
    registry
        .update(
            id,
            Transition::Ready {
                token: "tok".into(),
                method: "audio".into(),
                cost: 0.001,
                attempts: 1,
            },
        )
        .unwrap();

    let observed = reader.join().unwrap();
    let order = [TaskStatus::Pending, TaskStatus::Processing, TaskStatus::Ready];
    // The deduplicated observation must be a subsequence of the full order
    let mut cursor = 0;
    for status in &observed {
        let position = order
            .iter()
            .position(|s| s == status)
            .expect("unexpected status observed");
        assert!(position >= cursor, "status went backwards: {:?}", observed);
        cursor = position;
    }
}

#[test]
fn expired_never_surfaces_before_ttl() {
    let registry = TaskRegistry::new(test_registry_config(16, Duration::from_millis(200)));
    let task = registry.create(task_spec(Variant::Normal)).unwrap();
    registry.update(task.id, Transition::Processing).unwrap();
    registry
        .update(
            task.id,
            Transition::Failed {
                code: ErrorCode::UNSOLVABLE,
                message: "x".into(),
                attempts: 3,
            },
        )
        .unwrap();

    // Within the TTL the record is still Failed
    assert_eq!(registry.get(task.id).unwrap().status, TaskStatus::Failed);
    assert!(registry.result_view(task.id).is_ok());

    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(registry.get(task.id).unwrap().status, TaskStatus::Expired);
    assert!(registry.result_view(task.id).is_err());
}

#[test]
fn pending_and_processing_never_expire() {
    let registry = TaskRegistry::new(test_registry_config(16, Duration::from_millis(1)));
    let pending = registry.create(task_spec(Variant::Normal)).unwrap();
    let processing = registry.create(task_spec(Variant::Normal)).unwrap();
    registry
        .update(processing.id, Transition::Processing)
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(registry.get(pending.id).unwrap().status, TaskStatus::Pending);
    assert_eq!(
        registry.get(processing.id).unwrap().status,
        TaskStatus::Processing
    );
}

#[test]
fn stats_track_outcomes() {
    let registry = TaskRegistry::new(test_registry_config(16, Duration::from_secs(300)));

    let a = registry.create(task_spec(Variant::Normal)).unwrap();
    let b = registry.create(task_spec(Variant::Invisible)).unwrap();
    registry.update(a.id, Transition::Processing).unwrap();
    registry
        .update(
            a.id,
            Transition::Ready {
                token: "t".into(),
                method: "image".into(),
                cost: 0.001,
                attempts: 2,
            },
        )
        .unwrap();
    registry.update(b.id, Transition::Processing).unwrap();
    registry
        .update(
            b.id,
            Transition::Failed {
                code: ErrorCode::UNSOLVABLE,
                message: "m".into(),
                attempts: 3,
            },
        )
        .unwrap();

    let stats = registry.stats();
    assert_eq!(stats.total_created, 2);
    assert_eq!(stats.total_completed, 1);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.by_status.get("ready"), Some(&1));
    assert_eq!(stats.by_status.get("failed"), Some(&1));
}
