//! Runtime integration tests
//!
//! Drive a started engine through its handle: bursts of adds, manual
//! confirmation, timer queues and snapshot broadcasts.

use std::sync::Arc;
use std::time::Duration;

use ruleq_queue::QueueError;
use ruleq_rules::{ActuatorCall, ActuatorRegistry, EngineConfig, RuleConfig, RuleState};
use ruleq_runtime::{QueueConfig, RuntimeBuilder, RuntimeError, TimerConfig};
use serde_json::{json, Value};
use tokio::sync::mpsc;

fn recording_actuators() -> (Arc<ActuatorRegistry>, mpsc::UnboundedReceiver<Value>) {
    let registry = ActuatorRegistry::new();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.register("PLUG_SET", move |call: ActuatorCall| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(call.value);
            Ok(())
        }
    });
    (Arc::new(registry), rx)
}

fn consume_rule(name: &str, queue: &str) -> RuleConfig {
    RuleConfig::new(name)
        .bind("q", queue)
        .precondition("q.max > q.current")
        .action("PLUG_SET", "q.get(q.max).value")
        .update("q.current = q.max")
}

#[tokio::test]
async fn test_burst_of_adds_runs_one_firing_pass() {
    let (actuators, mut rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder
        .add_queue("sensor", &QueueConfig { capacity: 5 })
        .unwrap()
        .add_rule(consume_rule("consume", "sensor"))
        .unwrap();
    let engine = builder.start();
    let handle = engine.handle();

    let (a, b, c) = tokio::join!(
        handle.add("sensor", json!(1), None),
        handle.add("sensor", json!(2), None),
        handle.add("sensor", json!(3), None),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    let rules = handle.get_rules().await.unwrap();
    assert_eq!(rules[0].activated_count, 1);

    // The single pass saw the latest state of the queue
    let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, json!(3));

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.items_added, 3);
    assert_eq!(stats.rules_fired, 1);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_fire_rule_through_handle() {
    let (actuators, mut rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder
        .add_queue("door", &QueueConfig::default())
        .unwrap()
        .add_rule(consume_rule("unlock", "door").manual())
        .unwrap();
    let engine = builder.start();
    let handle = engine.handle();

    handle.add("door", json!("open"), None).await.unwrap();
    let rule = handle.get_rules().await.unwrap().remove(0);
    assert_eq!(rule.state, RuleState::Armed);
    assert_eq!(rule.armed_id, 1);

    assert!(!handle.fire_rule("unlock", 7).await.unwrap());
    assert!(handle.fire_rule("unlock", 1).await.unwrap());

    let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, json!("open"));

    let rule = handle.get_rules().await.unwrap().remove(0);
    assert_eq!(rule.activated_count, 1);
    assert_eq!(rule.state, RuleState::Idle);

    assert!(matches!(
        handle.fire_rule("missing", 1).await,
        Err(RuntimeError::Rule(_))
    ));

    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timer_queue_ticks() {
    let (actuators, _rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder
        .add_timer(
            "1Hz",
            &TimerConfig {
                capacity: 5,
                initial_value: 1,
                interval_ms: 1000,
            },
        )
        .unwrap();
    let engine = builder.start();
    let handle = engine.handle();

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let queues = handle.get_queues().await.unwrap();
    assert_eq!(queues[0].name, "1Hz");
    assert_eq!(queues[0].max, 3);
    assert_eq!(queues[0].latest.as_ref().unwrap().value, json!(true));

    engine.shutdown().await.unwrap();
}

#[test]
fn test_zero_interval_timer_rejected() {
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), Arc::new(ActuatorRegistry::new()));
    let result = builder.add_timer(
        "fast",
        &TimerConfig {
            capacity: 1,
            initial_value: 0,
            interval_ms: 0,
        },
    );
    assert!(matches!(result, Err(RuntimeError::InvalidTimer { .. })));
}

#[tokio::test]
async fn test_subscribers_receive_snapshots() {
    let (actuators, _rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder.add_queue("DS:LIGHT", &QueueConfig { capacity: 2 }).unwrap();
    let engine = builder.start();
    let handle = engine.handle();
    let mut snapshots = handle.subscribe();

    handle.add("DS:LIGHT", json!([0, 12]), None).await.unwrap();

    let snapshot = tokio::time::timeout(Duration::from_secs(1), snapshots.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.name, "DS:LIGHT");
    assert_eq!(snapshot.max, 1);
    assert_eq!(snapshot.latest.unwrap().value, json!([0, 12]));

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_add_to_unknown_queue_fails() {
    let (actuators, _rx) = recording_actuators();
    let engine = RuntimeBuilder::new(EngineConfig::default(), actuators).start();
    let handle = engine.handle();

    let result = handle.add("nowhere", json!(1), None).await;
    assert!(matches!(
        result,
        Err(RuntimeError::Queue(QueueError::UnknownQueue(name))) if name == "nowhere"
    ));
    assert_eq!(handle.stats().await.unwrap().items_added, 0);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handle_closed_after_shutdown() {
    let (actuators, _rx) = recording_actuators();
    let engine = RuntimeBuilder::new(EngineConfig::default(), actuators).start();
    let handle = engine.handle();

    engine.shutdown().await.unwrap();

    assert!(matches!(handle.get_rules().await, Err(RuntimeError::Closed)));
    assert!(matches!(
        handle.add("q", json!(1), None).await,
        Err(RuntimeError::Closed)
    ));
}

#[tokio::test]
async fn test_rules_added_at_runtime_see_existing_data() {
    let (actuators, _rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder.add_queue("sensor", &QueueConfig::default()).unwrap();
    let engine = builder.start();
    let handle = engine.handle();

    handle.add("sensor", json!(5), None).await.unwrap();
    handle.add_rule(consume_rule("late", "sensor")).await.unwrap();

    let rules = handle.get_rules().await.unwrap();
    assert_eq!(rules[0].activated_count, 1);

    assert!(matches!(
        handle.add_rule(consume_rule("late", "sensor")).await,
        Err(RuntimeError::Rule(_))
    ));

    handle.disable_rule("late").await.unwrap();
    assert!(!handle.get_rules().await.unwrap()[0].enabled);

    tokio_test::assert_ok!(handle.enable_rule("late").await);
    assert!(handle.get_rules().await.unwrap()[0].enabled);
    tokio_test::assert_err!(handle.enable_rule("missing").await);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_update_schedules_follow_up_pass() {
    let (actuators, mut rx) = recording_actuators();
    let mut builder = RuntimeBuilder::new(EngineConfig::default(), actuators);
    builder
        .add_queue("a", &QueueConfig { capacity: 5 })
        .unwrap()
        .add_queue("b", &QueueConfig { capacity: 5 })
        .unwrap()
        .add_rule(
            RuleConfig::new("follow")
                .with_priority(1)
                .bind("a", "a")
                .bind("b", "b")
                .precondition("a.max > 0 && a.current == a.max && b.max > b.current")
                .action("PLUG_SET", "'follow'")
                .update("b.current = b.max"),
        )
        .unwrap()
        .add_rule(
            RuleConfig::new("consume")
                .with_priority(2)
                .bind("a", "a")
                .precondition("a.max > a.current")
                .action("PLUG_SET", "'consume'")
                .update("a.current = a.max"),
        )
        .unwrap();
    let engine = builder.start();
    let handle = engine.handle();

    handle.add("b", json!(1), None).await.unwrap();
    let before = handle.stats().await.unwrap();
    assert_eq!(before.rules_fired, 0);

    handle.add("a", json!(1), None).await.unwrap();

    // "follow" runs first in every pass but only becomes ready once the
    // "consume" update has moved the cursor of "a"
    let mut order = Vec::new();
    for _ in 0..2 {
        let value = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        order.push(value);
    }
    assert_eq!(order, vec![json!("consume"), json!("follow")]);

    let rules = handle.get_rules().await.unwrap();
    assert!(rules.iter().all(|rule| rule.activated_count == 1));

    // The add pass, the pass after "consume" updated "a", and the pass after
    // "follow" updated "b"
    let after = handle.stats().await.unwrap();
    assert_eq!(after.passes - before.passes, 3);
    assert_eq!(after.rules_fired, 2);

    engine.shutdown().await.unwrap();
}
