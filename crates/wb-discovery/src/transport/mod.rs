//! Message bus seam
//!
//! The engine talks to the bus only through [`Transport`] and consumes inbound
//! traffic as a stream of [`BusEvent`]s. [`mqtt::MqttTransport`] is the
//! production implementation; [`memory::MemoryTransport`] records every call
//! for tests and [`DryRunTransport`] only logs what would be published.

pub mod memory;
pub mod mqtt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Result;

// ─────────────────────────────────────────────────────────────────────────────
// QoS
// ─────────────────────────────────────────────────────────────────────────────

/// Delivery guarantee, configured as `0`, `1` or `2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for Qos {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(format!("invalid QoS {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }
}

impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
            Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Inbound traffic delivered to the engine, strictly in order
#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    /// The session was (re)established; subscriptions must be re-issued
    Connected,
    Message { topic: String, payload: Bytes },
}

/// Outbound primitives of the message bus
#[async_trait]
pub trait Transport: Send + Sync {
    async fn subscribe(&self, pattern: &str, qos: Qos) -> Result<()>;

    async fn unsubscribe(&self, pattern: &str) -> Result<()>;

    /// Publish `payload`; `None` sends an empty payload (retraction)
    async fn publish(&self, topic: &str, payload: Option<Bytes>, qos: Qos, retain: bool) -> Result<()>;
}

/// Subscribes through the wrapped transport but only logs publishes
pub struct DryRunTransport<T> {
    inner: T,
}

impl<T: Transport> DryRunTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: Transport> Transport for DryRunTransport<T> {
    async fn subscribe(&self, pattern: &str, qos: Qos) -> Result<()> {
        self.inner.subscribe(pattern, qos).await
    }

    async fn unsubscribe(&self, pattern: &str) -> Result<()> {
        self.inner.unsubscribe(pattern).await
    }

    async fn publish(&self, topic: &str, payload: Option<Bytes>, qos: Qos, retain: bool) -> Result<()> {
        let body = payload
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        tracing::info!(
            topic,
            qos = u8::from(qos),
            retain,
            "[dry-run] publish {}",
            body
        );
        Ok(())
    }
}
