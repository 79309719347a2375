//! MQTT transport over rumqttc

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{BusEvent, Qos, Transport};
use crate::Result;
use crate::config::BrokerConfig;

/// Capacity of the client request queue
const REQUEST_CAPACITY: usize = 256;

/// Build rumqttc options from the broker section
pub fn mqtt_options(config: &BrokerConfig) -> MqttOptions {
    let mut opts = MqttOptions::new(&config.client_id, &config.host, config.port);
    opts.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    opts.set_clean_session(true);
    if let Some((username, password)) = credentials(config) {
        opts.set_credentials(username, password);
    }
    opts
}

/// Username and password, only when both are configured
fn credentials(config: &BrokerConfig) -> Option<(&str, &str)> {
    match (&config.username, &config.password) {
        (Some(username), Some(password)) => Some((username, password)),
        _ => None,
    }
}

/// Create the client and its event loop
pub fn connect(config: &BrokerConfig) -> (MqttTransport, EventLoop) {
    let (client, eventloop) = AsyncClient::new(mqtt_options(config), REQUEST_CAPACITY);
    (MqttTransport::new(client), eventloop)
}

/// [`Transport`] backed by a rumqttc client
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn subscribe(&self, pattern: &str, qos: Qos) -> Result<()> {
        self.client.subscribe(pattern, qos.into()).await?;
        Ok(())
    }

    async fn unsubscribe(&self, pattern: &str) -> Result<()> {
        self.client.unsubscribe(pattern).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Option<Bytes>, qos: Qos, retain: bool) -> Result<()> {
        self.client
            .publish_bytes(topic, qos.into(), retain, payload.unwrap_or_default())
            .await?;
        Ok(())
    }
}

/// What the pump does with one event loop event
#[derive(Debug, PartialEq)]
enum PumpStep {
    Forward(BusEvent),
    Skip,
    /// Our DISCONNECT was written; everything queued before it is flushed
    Stop,
}

fn pump_step(event: Event) -> PumpStep {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => {
            tracing::info!("Connected to MQTT broker");
            PumpStep::Forward(BusEvent::Connected)
        }
        Event::Incoming(Packet::Publish(publish)) => PumpStep::Forward(BusEvent::Message {
            topic: publish.topic,
            payload: publish.payload,
        }),
        Event::Outgoing(Outgoing::Disconnect) => PumpStep::Stop,
        _ => PumpStep::Skip,
    }
}

/// Drive the event loop, forwarding connection and publish events
///
/// Connection errors are logged and the loop retries after
/// `reconnect_delay`. The task ends once the client's disconnect request has
/// been sent; events arriving after the receiver is gone are dropped so the
/// final packets still get flushed.
pub fn spawn_event_pump(
    mut eventloop: EventLoop,
    tx: mpsc::Sender<BusEvent>,
    reconnect_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match eventloop.poll().await {
                Ok(event) => match pump_step(event) {
                    PumpStep::Forward(event) => event,
                    PumpStep::Skip => continue,
                    PumpStep::Stop => {
                        tracing::debug!("Disconnect sent, stopping event loop");
                        break;
                    }
                },
                Err(err) => {
                    tracing::warn!(%err, "MQTT connection error, reconnecting");
                    tokio::time::sleep(reconnect_delay).await;
                    continue;
                }
            };

            if tx.send(event).await.is_err() {
                tracing::trace!("Event receiver gone, dropping event");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> BrokerConfig {
        BrokerConfig {
            host: "wirenboard.local".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_mqtt_options() {
        let opts = mqtt_options(&broker());
        assert_eq!(opts.broker_address(), ("wirenboard.local".to_string(), 1883));
        assert_eq!(opts.client_id(), "wb-mqtt-discovery");
        assert_eq!(opts.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let mut config = broker();
        config.username = Some("user".to_string());
        assert_eq!(credentials(&config), None);

        config.password = Some("secret".to_string());
        assert_eq!(credentials(&config), Some(("user", "secret")));
    }

    #[test]
    fn test_pump_stops_after_disconnect_is_sent() {
        assert_eq!(pump_step(Event::Outgoing(Outgoing::Disconnect)), PumpStep::Stop);
        assert_eq!(pump_step(Event::Outgoing(Outgoing::PingReq)), PumpStep::Skip);
    }

    #[test]
    fn test_pump_forwards_connack_and_publish() {
        let connack = rumqttc::ConnAck::new(rumqttc::ConnectReturnCode::Success, false);
        assert_eq!(
            pump_step(Event::Incoming(Packet::ConnAck(connack))),
            PumpStep::Forward(BusEvent::Connected)
        );

        let publish =
            rumqttc::Publish::new("/devices/d/meta/driver", rumqttc::QoS::AtLeastOnce, "wb-modbus");
        assert_eq!(
            pump_step(Event::Incoming(Packet::Publish(publish))),
            PumpStep::Forward(BusEvent::Message {
                topic: "/devices/d/meta/driver".to_string(),
                payload: Bytes::from_static(b"wb-modbus"),
            })
        );
    }
}
