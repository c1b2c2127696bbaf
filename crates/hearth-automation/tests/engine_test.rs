//! End-to-end rule engine tests over a paused clock

use hearth_automation::{PeriodicHost, RuleConfig, RuleEngine, TriggerData};
use hearth_core::events::{
    ItemCommandData, ItemStateChangedData, ItemStateUpdatedData, ThingStatusChangedData,
};
use hearth_core::{Context, Event, ItemName, ThingStatus, ThingUid, Value};
use hearth_event_bus::EventBus;
use hearth_timers::Timers;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time;

fn engine() -> Arc<RuleEngine> {
    let bus = Arc::new(EventBus::new());
    let timers = Arc::new(Timers::new());
    Arc::new(RuleEngine::new(bus, timers))
}

fn state_changed(item: &str, old: &str, new: &str) -> Event<serde_json::Value> {
    let data = ItemStateChangedData {
        item: ItemName::new(item).unwrap(),
        old_value: Value::from(old),
        new_value: Value::from(new),
    };
    Event::typed(data, Context::new()).into_json()
}

fn state_updated(item: &str, value: &str) -> Event<serde_json::Value> {
    let data = ItemStateUpdatedData {
        item: ItemName::new(item).unwrap(),
        value: Value::from(value),
    };
    Event::typed(data, Context::new()).into_json()
}

fn command(item: &str, cmd: &str) -> Event<serde_json::Value> {
    let data = ItemCommandData {
        item: ItemName::new(item).unwrap(),
        command: Value::from(cmd),
    };
    Event::typed(data, Context::new()).into_json()
}

fn status_changed(thing: &str, old: ThingStatus, new: ThingStatus) -> Event<serde_json::Value> {
    let data = ThingStatusChangedData {
        thing: ThingUid::new(thing).unwrap(),
        old_status: old,
        new_status: new,
    };
    Event::typed(data, Context::new()).into_json()
}

trait IntoJsonEvent {
    fn into_json(self) -> Event<serde_json::Value>;
}

impl<T: serde::Serialize> IntoJsonEvent for Event<T> {
    fn into_json(self) -> Event<serde_json::Value> {
        Event {
            event_type: self.event_type,
            data: serde_json::to_value(&self.data).unwrap(),
            time_fired: self.time_fired,
            context: self.context,
        }
    }
}

fn counting_action() -> (Arc<AtomicUsize>, impl Fn(TriggerData) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = count.clone();
    (count, move |_| {
        inner.fetch_add(1, Ordering::SeqCst);
    })
}

fn motion_rule_config() -> RuleConfig {
    serde_json::from_str(
        r#"{
            "id": "motion_lights",
            "label": "Hold motion before acting",
            "triggers": [
                {
                    "trigger": "item_change",
                    "item": "Hall_Motion",
                    "to": "ON",
                    "for": "00:05:00"
                }
            ]
        }"#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_hold_never_fires() {
    let engine = engine();
    let (fired, action) = counting_action();
    engine.register(motion_rule_config(), action).unwrap();

    // t=0: OFF -> ON starts a 5 minute hold
    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));

    // t=2min: duplicate ON re-report pushes the deadline to t=7min
    time::advance(Duration::from_secs(120)).await;
    engine.dispatch(&state_updated("Hall_Motion", "ON"));

    // t=4min: OFF tears the hold down; guard fails on re-evaluation
    time::advance(Duration::from_secs(120)).await;
    engine.dispatch(&state_changed("Hall_Motion", "ON", "OFF"));

    time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hold_fires_once_after_last_refresh() {
    let engine = engine();
    let (fired, action) = counting_action();
    engine.register(motion_rule_config(), action).unwrap();

    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));

    time::advance(Duration::from_secs(120)).await;
    engine.dispatch(&state_updated("Hall_Motion", "ON"));

    // 5 minutes after the *last* event, not the first
    time::advance(Duration::from_secs(299)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Nothing further fires without a new qualifying transition
    time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_trigger_runs_synchronously() {
    let engine = engine();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "lamp_watch",
            "triggers": [
                {"trigger": "item_change", "item": "Hall_Lamp", "from": "OFF", "to": "ON"}
            ]
        }"#,
    )
    .unwrap();
    engine
        .register(config, move |data: TriggerData| {
            log.lock().unwrap().push(data);
        })
        .unwrap();

    engine.dispatch(&state_changed("Hall_Lamp", "OFF", "ON"));
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, "item_change");
        assert_eq!(seen[0].variables["source"], "Hall_Lamp");
        assert_eq!(seen[0].variables["new_value"], "ON");
    }

    // Wrong transition and wrong item are ignored
    engine.dispatch(&state_changed("Hall_Lamp", "ON", "OFF"));
    engine.dispatch(&state_changed("Other_Lamp", "OFF", "ON"));
    // Re-reported updates do not count as changes for immediate triggers
    engine.dispatch(&state_updated("Hall_Lamp", "ON"));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_command_trigger_matches_payload() {
    let engine = engine();
    let (fired, action) = counting_action();

    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "siren_cmd",
            "triggers": [
                {"trigger": "item_command", "item": "Siren", "command": "ON"}
            ]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    engine.dispatch(&command("Siren", "ON"));
    engine.dispatch(&command("Siren", "OFF"));
    engine.dispatch(&state_changed("Siren", "OFF", "ON"));

    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_thing_status_hold() {
    let engine = engine();
    let (fired, action) = counting_action();

    // Textual status spec is coerced into the status domain
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "bridge_down",
            "triggers": [
                {
                    "trigger": "thing_status",
                    "thing": "hue:bridge",
                    "to": "OFFLINE",
                    "for": "00:01:00"
                }
            ]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    engine.dispatch(&status_changed(
        "hue:bridge",
        ThingStatus::Online,
        ThingStatus::Offline,
    ));

    // Recovers before the minute is up: no alert
    time::advance(Duration::from_secs(30)).await;
    engine.dispatch(&status_changed(
        "hue:bridge",
        ThingStatus::Offline,
        ThingStatus::Online,
    ));
    time::advance(Duration::from_secs(600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // Stays down for the full minute: alert
    engine.dispatch(&status_changed(
        "hue:bridge",
        ThingStatus::Online,
        ThingStatus::Offline,
    ));
    time::advance(Duration::from_secs(61)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_rule_cancels_pending_hold() {
    let engine = engine();
    let (fired, action) = counting_action();
    engine.register(motion_rule_config(), action).unwrap();

    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));
    assert_eq!(
        engine.timers().registry().lookup_identity("motion_lights").len(),
        1
    );

    engine.remove("motion_lights").unwrap();
    assert!(!engine.contains("motion_lights"));
    assert!(engine
        .timers()
        .registry()
        .lookup_identity("motion_lights")
        .is_empty());

    time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_rule_does_not_dispatch() {
    let engine = engine();
    let (fired, action) = counting_action();
    engine.register(motion_rule_config(), action).unwrap();

    engine.disable("motion_lights").unwrap();
    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));
    time::advance(Duration::from_secs(600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    engine.enable("motion_lights").unwrap();
    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));
    time::advance(Duration::from_secs(301)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_silences_all_pending_holds() {
    let engine = engine();
    let (fired, action) = counting_action();
    engine.register(motion_rule_config(), action).unwrap();

    engine.dispatch(&state_changed("Hall_Motion", "OFF", "ON"));

    engine.shutdown();
    assert_eq!(engine.count(), 0);
    assert_eq!(engine.timers().registry().identity_count(), 0);
    assert_eq!(engine.timers().registry().reentrant_count(), 0);

    time::advance(Duration::from_secs(3600)).await;
    tokio::task::yield_now().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_consumes_bus_events() {
    let bus = Arc::new(EventBus::new());
    let timers = Arc::new(Timers::new());
    let engine = Arc::new(RuleEngine::new(bus.clone(), timers));
    let (fired, action) = counting_action();

    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "lamp_watch",
            "triggers": [
                {"trigger": "item_change", "item": "Hall_Lamp", "to": "ON"}
            ]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    let worker = engine.run();

    bus.publish_typed(
        ItemStateChangedData {
            item: ItemName::new("Hall_Lamp").unwrap(),
            old_value: Value::from("OFF"),
            new_value: Value::from("ON"),
        },
        Context::new(),
    );

    // Let the consumption loop drain the channel
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    worker.abort();
}

// --- Periodic trigger registration against a fake host scheduler ---

#[derive(Default)]
struct FakeHost {
    registered: Mutex<Vec<(String, String)>>,
    removed: Mutex<Vec<String>>,
}

impl PeriodicHost for FakeHost {
    fn add_periodic(&self, rule_id: &str, expression: &str, _action: hearth_automation::ActionFn) {
        self.registered
            .lock()
            .unwrap()
            .push((rule_id.to_string(), expression.to_string()));
    }

    fn remove_rule(&self, rule_id: &str) {
        self.removed.lock().unwrap().push(rule_id.to_string());
    }
}

fn engine_with_host() -> (Arc<RuleEngine>, Arc<FakeHost>) {
    let bus = Arc::new(EventBus::new());
    let timers = Arc::new(Timers::new());
    let host = Arc::new(FakeHost::default());
    let engine = Arc::new(RuleEngine::new(bus, timers).with_periodic_host(host.clone()));
    (engine, host)
}

#[tokio::test(start_paused = true)]
async fn test_periodic_symbol_synthesis() {
    let (engine, host) = engine_with_host();
    let (_, action) = counting_action();

    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "hourly",
            "triggers": [{"trigger": "periodic", "every": "hour"}]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    let registered = host.registered.lock().unwrap();
    assert_eq!(
        registered.as_slice(),
        [("hourly".to_string(), "0 0 * * * ?".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_periodic_interval_and_time_of_day() {
    let (engine, host) = engine_with_host();

    let (_, action) = counting_action();
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "quarter_hourly",
            "triggers": [{"trigger": "periodic", "every": "00:15:00"}]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    let (_, action) = counting_action();
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "morning_report",
            "triggers": [{"trigger": "periodic", "every": "day", "at": "08:30:00"}]
        }"#,
    )
    .unwrap();
    engine.register(config, action).unwrap();

    let registered = host.registered.lock().unwrap();
    assert_eq!(registered[0].1, "0 */15 * * * ?");
    assert_eq!(registered[1].1, "0 30 8 * * ?");
}

#[tokio::test(start_paused = true)]
async fn test_contradictory_periodic_specs_abort_registration() {
    let (engine, host) = engine_with_host();

    // Interval combined with a time of day
    let (_, action) = counting_action();
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "bad_interval",
            "triggers": [{"trigger": "periodic", "every": "00:15:00", "at": "08:00:00"}]
        }"#,
    )
    .unwrap();
    assert!(engine.register(config, action).is_err());
    assert!(!engine.contains("bad_interval"));

    // Sub-day symbolic period combined with a time of day
    let (_, action) = counting_action();
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "bad_symbol",
            "triggers": [{"trigger": "periodic", "every": "hour", "at": "08:00:00"}]
        }"#,
    )
    .unwrap();
    assert!(engine.register(config, action).is_err());

    // An unexpressible duration surfaces UnsupportedDuration
    let (_, action) = counting_action();
    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "ninety_seconds",
            "triggers": [{"trigger": "periodic", "every": "00:01:30"}]
        }"#,
    )
    .unwrap();
    assert!(engine.register(config, action).is_err());

    assert!(host.registered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_zero_hold_duration_rejected_at_registration() {
    let engine = engine();
    let (_, action) = counting_action();

    let config: RuleConfig = serde_json::from_str(
        r#"{
            "id": "bad_hold",
            "triggers": [
                {"trigger": "item_change", "item": "X1", "to": "ON", "for": "00:00:00"}
            ]
        }"#,
    )
    .unwrap();
    assert!(engine.register(config, action).is_err());
    assert!(!engine.contains("bad_hold"));
}
