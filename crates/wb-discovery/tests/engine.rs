//! End-to-end behaviour of the discovery engine over an in-memory bus.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wb_conventions::Namespace;

use wb_discovery::DiscoveryEngine;
use wb_discovery::config::DiscoveryConfig;
use wb_discovery::scheduler::TaskKey;
use wb_discovery::transport::BusEvent;
use wb_discovery::transport::memory::{MemoryTransport, Published};

// ─── Helpers ───

fn engine() -> DiscoveryEngine<MemoryTransport> {
    engine_with(DiscoveryConfig::default())
}

fn engine_with(config: DiscoveryConfig) -> DiscoveryEngine<MemoryTransport> {
    DiscoveryEngine::new(MemoryTransport::new(), config, Namespace::default())
}

async fn feed(engine: &mut DiscoveryEngine<MemoryTransport>, messages: &[(&str, &str)]) {
    for (topic, payload) in messages {
        engine.handle_message(topic, payload.as_bytes()).await;
    }
}

fn config_publishes(engine: &DiscoveryEngine<MemoryTransport>) -> Vec<Published> {
    engine
        .transport()
        .publishes()
        .into_iter()
        .filter(|p| p.topic.ends_with("/config"))
        .collect()
}

/// Log sink shared with a scoped tracing subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const MSW_TEMPERATURE: &str = "homeassistant/sensor/wb_msw/wb_msw_temperature/config";

// ─── Scenarios ───

#[tokio::test(start_paused = true)]
async fn test_temperature_sensor_end_to_end() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-msw/meta", r#"{"driver": "wb-modbus", "title": {"en": "MSW Kitchen"}}"#),
            (
                "/devices/wb-msw/controls/Temperature/meta",
                r#"{"type": "temperature", "readonly": true, "order": 1}"#,
            ),
        ],
    )
    .await;
    engine.settle().await;

    let published = engine.transport().publishes_to(MSW_TEMPERATURE);
    assert_eq!(published.len(), 1);
    assert!(published[0].retain);

    let doc = published[0].json().unwrap();
    assert_eq!(doc["name"], "Temperature");
    assert_eq!(doc["device_class"], "temperature");
    assert_eq!(doc["unit_of_measurement"], "°C");
    assert_eq!(doc["state_class"], "measurement");
    assert_eq!(doc["suggested_display_precision"], 1);
    assert_eq!(doc["value_template"], "{{ float(value) | round(1) }}");
    assert_eq!(doc["state_topic"], "/devices/wb-msw/controls/Temperature");
    assert_eq!(doc["device"]["name"], "MSW Kitchen");
    assert_eq!(doc["device"]["model"], "wb-modbus");

    let availability = engine
        .transport()
        .publishes_to("/devices/wb-msw/controls/Temperature/availability");
    assert_eq!(availability.len(), 1);
    assert_eq!(availability[0].text(), Some("1"));

    assert!(engine.ledger().contains(MSW_TEMPERATURE));
}

#[tokio::test(start_paused = true)]
async fn test_replayed_metadata_is_idempotent() {
    let messages = [
        ("/devices/wb-msw/meta/driver", "wb-modbus"),
        ("/devices/wb-msw/controls/Temperature/meta/type", "temperature"),
        ("/devices/wb-msw/controls/Temperature/meta/readonly", "1"),
    ];

    let mut engine = engine();
    feed(&mut engine, &messages).await;
    engine.settle().await;
    assert_eq!(config_publishes(&engine).len(), 1);

    engine.transport().clear();
    feed(&mut engine, &messages).await;
    assert!(!engine.is_scheduled(&TaskKey::config("wb-msw")));

    engine.settle().await;
    assert!(engine.transport().publishes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_burst_is_coalesced_into_one_publish() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-mdm3/meta/driver", "wb-modbus"),
            ("/devices/wb-mdm3/controls/Level/meta/type", "range"),
        ],
    )
    .await;

    for max in ["50", "100", "200"] {
        tokio::time::advance(Duration::from_millis(300)).await;
        engine
            .handle_message("/devices/wb-mdm3/controls/Level/meta/max", max.as_bytes())
            .await;
    }
    engine.settle().await;

    let published = config_publishes(&engine);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "homeassistant/number/wb_mdm3/wb_mdm3_level/config");
    assert_eq!(published[0].json().unwrap()["max"], 200);
}

#[tokio::test(start_paused = true)]
async fn test_channel_pair_published_as_single_light() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-mdm3/meta", r#"{"driver": "wb-modbus"}"#),
            ("/devices/wb-mdm3/controls/Channel 1/meta", r#"{"type": "switch"}"#),
            (
                "/devices/wb-mdm3/controls/Channel 1 Brightness/meta",
                r#"{"type": "range", "max": 255}"#,
            ),
        ],
    )
    .await;
    engine.settle().await;

    let published = config_publishes(&engine);
    assert_eq!(published.len(), 1);
    assert_eq!(
        published[0].topic,
        "homeassistant/light/wb_mdm3/wb_mdm3_channel_1/config"
    );

    let doc = published[0].json().unwrap();
    assert_eq!(doc["brightness_scale"], 255);
    assert_eq!(doc["command_topic"], "/devices/wb-mdm3/controls/Channel 1/on");
    assert_eq!(
        doc["brightness_state_topic"],
        "/devices/wb-mdm3/controls/Channel 1 Brightness"
    );

    // both backing controls announce availability
    assert_eq!(
        engine
            .transport()
            .publishes_to("/devices/wb-mdm3/controls/Channel 1 Brightness/availability")
            .len(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_vanished_entity_is_retracted_once() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-gpio/meta/driver", "wb-gpio"),
            ("/devices/wb-gpio/controls/EXT1_IN1/meta/type", "switch"),
        ],
    )
    .await;
    engine.settle().await;

    let switch_topic = "homeassistant/switch/wb_gpio/wb_gpio_ext1_in1/config";
    let sensor_topic = "homeassistant/binary_sensor/wb_gpio/wb_gpio_ext1_in1/config";
    assert!(engine.ledger().contains(switch_topic));

    // becoming read-only moves the entity to another platform
    engine
        .handle_message("/devices/wb-gpio/controls/EXT1_IN1/meta/readonly", b"1")
        .await;
    engine.settle().await;

    let retractions: Vec<_> = engine
        .transport()
        .publishes_to(switch_topic)
        .into_iter()
        .filter(Published::is_retraction)
        .collect();
    assert_eq!(retractions.len(), 1);
    assert!(retractions[0].retain);
    assert!(retractions[0].payload.is_none());

    assert!(!engine.ledger().contains(switch_topic));
    assert!(engine.ledger().contains(sensor_topic));
    assert_eq!(engine.transport().publishes_to(sensor_topic).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_device_left_without_entities_is_retracted() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-gpio/meta/driver", "wb-gpio"),
            ("/devices/wb-gpio/controls/K1/meta/type", "switch"),
        ],
    )
    .await;
    engine.settle().await;

    let topic = "homeassistant/switch/wb_gpio/wb_gpio_k1/config";
    assert!(engine.ledger().contains(topic));

    // the only control turns into something we cannot map
    engine
        .handle_message("/devices/wb-gpio/controls/K1/meta/type", b"thermostat")
        .await;
    engine.settle().await;

    let retractions: Vec<_> = engine
        .transport()
        .publishes_to(topic)
        .into_iter()
        .filter(Published::is_retraction)
        .collect();
    assert_eq!(retractions.len(), 1);
    assert!(!engine.ledger().contains(topic));
}

#[tokio::test(start_paused = true)]
async fn test_failed_retraction_is_retried() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-gpio/meta/driver", "wb-gpio"),
            ("/devices/wb-gpio/controls/K1/meta/type", "switch"),
        ],
    )
    .await;
    engine.settle().await;

    let topic = "homeassistant/switch/wb_gpio/wb_gpio_k1/config";
    engine.transport().set_failing(true);
    engine
        .handle_message("/devices/wb-gpio/controls/K1/meta/readonly", b"1")
        .await;

    // the broker comes back well after the first reconciliation pass
    let transport = engine.transport().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        transport.set_failing(false);
    });
    engine.settle().await;

    let attempts = engine
        .transport()
        .publishes_to(topic)
        .into_iter()
        .filter(Published::is_retraction)
        .count();
    assert!(attempts > 1, "retraction attempted {attempts} times");
    assert!(!engine.ledger().contains(topic));
}

#[tokio::test(start_paused = true)]
async fn test_leftover_documents_from_previous_run_are_retracted() {
    let mut engine = engine();
    let ours = r#"{"name": "Old", "origin": {"name": "wb-mqtt-discovery", "sw_version": "0.0.1"}}"#;
    feed(
        &mut engine,
        &[
            ("homeassistant/switch/wb_old/wb_old_k1/config", ours),
            (MSW_TEMPERATURE, ours),
            ("/devices/wb-msw/meta/driver", "wb-modbus"),
            ("/devices/wb-msw/controls/Temperature/meta/type", "temperature"),
        ],
    )
    .await;
    engine.settle().await;

    let stale = engine
        .transport()
        .publishes_to("homeassistant/switch/wb_old/wb_old_k1/config");
    assert_eq!(stale.len(), 1);
    assert!(stale[0].is_retraction());

    // still backed by the registry: republished, never retracted
    let kept = engine.transport().publishes_to(MSW_TEMPERATURE);
    assert_eq!(kept.len(), 1);
    assert!(!kept[0].is_retraction());
    assert_eq!(engine.ledger().topics().collect::<Vec<_>>(), [MSW_TEMPERATURE]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_type_is_suppressed_and_warned_once() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/hvac/meta/driver", "custom"),
            ("/devices/hvac/controls/Zone 1/meta/type", "thermostat"),
            ("/devices/hvac/controls/Zone 2/meta/type", "thermostat"),
            ("/devices/hvac/controls/Fan/meta/type", "switch"),
        ],
    )
    .await;
    engine.settle().await;

    let published = config_publishes(&engine);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic, "homeassistant/switch/hvac/hvac_fan/config");
    assert!(engine.registry().control("hvac", "Zone 1").is_some());

    assert_eq!(logs.text().matches("Unknown control type 'thermostat'").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_transitions_publish_availability() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-mr6c/meta/driver", "wb-modbus"),
            ("/devices/wb-mr6c/controls/K1/meta/type", "switch"),
        ],
    )
    .await;
    engine.settle().await;

    let topic = "/devices/wb-mr6c/controls/K1/availability";
    engine.transport().clear();

    engine.handle_message("/devices/wb-mr6c/controls/K1/meta/error", b"r").await;
    assert!(engine.is_scheduled(&TaskKey::availability("wb-mr6c", "K1")));
    assert!(!engine.is_scheduled(&TaskKey::config("wb-mr6c")));
    engine.settle().await;

    engine.handle_message("/devices/wb-mr6c/controls/K1/meta/error", b"").await;
    engine.settle().await;

    let payloads: Vec<_> = engine
        .transport()
        .publishes_to(topic)
        .iter()
        .map(|p| p.text().unwrap_or_default().to_string())
        .collect();
    assert_eq!(payloads, ["0", "1"]);
    assert!(config_publishes(&engine).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ignore_availability() {
    let mut engine = engine_with(DiscoveryConfig {
        ignore_availability: true,
        ..Default::default()
    });
    feed(
        &mut engine,
        &[
            ("/devices/wb-mr6c/meta/driver", "wb-modbus"),
            ("/devices/wb-mr6c/controls/K1/meta/type", "switch"),
            ("/devices/wb-mr6c/controls/K1/meta/error", "r"),
        ],
    )
    .await;
    engine.settle().await;

    let publishes = engine.transport().publishes();
    assert_eq!(publishes.len(), 1);
    assert!(publishes[0].json().unwrap().get("availability").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_do_not_stop_the_engine() {
    let mut engine = engine();
    engine.transport().set_failing(true);
    feed(
        &mut engine,
        &[
            ("/devices/wb-msw/meta/driver", "wb-modbus"),
            ("/devices/wb-msw/controls/Temperature/meta/type", "temperature"),
        ],
    )
    .await;
    engine.settle().await;
    assert!(engine.ledger().is_empty());

    engine.transport().set_failing(false);
    engine
        .handle_message("/devices/wb-msw/controls/Temperature/meta/title", b"Air")
        .await;
    engine.settle().await;
    assert!(engine.ledger().contains(MSW_TEMPERATURE));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_input_is_dropped() {
    let mut engine = engine();
    feed(
        &mut engine,
        &[
            ("/devices/wb-msw/meta", "{broken"),
            ("/devices/wb msw?/meta/driver", "x"),
            ("/devices/wb-msw/controls/Temperature/meta/min", "cold"),
            ("/unrelated/topic", "x"),
        ],
    )
    .await;
    engine.settle().await;

    assert!(engine.registry().is_empty());
    assert!(engine.transport().publishes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_publishes_and_shuts_down() {
    let mut engine = engine();
    let (tx, rx) = mpsc::channel(16);

    tx.send(BusEvent::Connected).await.unwrap();
    for (topic, payload) in [
        ("/devices/wb-msw/meta/driver", "wb-modbus"),
        ("/devices/wb-msw/controls/Temperature/meta/type", "temperature"),
    ] {
        tx.send(BusEvent::Message {
            topic: topic.to_string(),
            payload: Bytes::from(payload),
        })
        .await
        .unwrap();
    }

    engine.run(rx, tokio::time::sleep(Duration::from_secs(30))).await;

    assert_eq!(engine.transport().publishes_to(MSW_TEMPERATURE).len(), 1);
    assert!(engine.subscriptions().next().is_none());
    assert!(
        engine
            .transport()
            .unsubscriptions()
            .contains(&"/devices/wb-msw/controls/Temperature/meta/error".to_string())
    );
    drop(tx);
}
