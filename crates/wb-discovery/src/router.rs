//! Topic Router
//!
//! Classifies inbound `(topic, payload)` pairs into typed events using the
//! fixed topic grammar:
//!
//! | Topic | Event |
//! |---|---|
//! | `<ns>/devices/<device>/meta[/<field>]` | [`InboundEvent::DeviceMeta`] |
//! | `<ns>/devices/<device>/controls/<control>/meta[/<field>]` | [`InboundEvent::ControlMeta`] |
//! | `<ns>/devices/<device>/controls/<control>/meta/error` | [`InboundEvent::ControlError`] |
//! | `<discovery>/<component>/<node>/<object>/config` | [`InboundEvent::DiscoveryEcho`] |
//!
//! The router is pure: it never touches state and never panics on input.

use serde::Deserialize;
use wb_conventions::Namespace;

use crate::meta::{ControlMetaPatch, DeviceMetaPatch};

/// Reasons an inbound message is dropped
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Topic does not match any known pattern")]
    MalformedTopic,

    #[error("Invalid identifier segment: {0:?}")]
    InvalidSegment(String),

    #[error("Payload is not valid UTF-8")]
    NotUtf8,

    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for field '{field}'")]
    InvalidField { field: String, value: String },
}

/// Classified inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    DeviceMeta {
        device_id: String,
        patch: DeviceMetaPatch,
    },
    ControlMeta {
        device_id: String,
        control_id: String,
        patch: ControlMetaPatch,
    },
    ControlError {
        device_id: String,
        control_id: String,
        has_error: bool,
    },
    DiscoveryEcho(DiscoveryEcho),
}

/// A discovery document observed on the bus (usually a retained replay)
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryEcho {
    pub topic: String,
    pub component: String,
    pub node_id: String,
    pub object_id: String,
    /// `origin.name` of the document; `None` if absent
    pub origin: Option<String>,
    /// The payload was empty (the document was retracted)
    pub retracted: bool,
}

#[derive(Deserialize)]
struct EchoDocument {
    #[serde(default)]
    origin: Option<EchoOrigin>,
}

#[derive(Deserialize)]
struct EchoOrigin {
    #[serde(default)]
    name: Option<String>,
}

/// Classifies inbound topics into [`InboundEvent`]s
#[derive(Debug, Clone)]
pub struct TopicRouter {
    namespace: Namespace,
    discovery_prefix: String,
}

impl TopicRouter {
    pub fn new(namespace: Namespace, discovery_prefix: impl Into<String>) -> Self {
        Self {
            namespace,
            discovery_prefix: discovery_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Classify a message
    ///
    /// Returns `Ok(None)` for messages that are well-formed but carry nothing
    /// to apply (a cleared retained JSON meta).
    pub fn route(&self, topic: &str, payload: &[u8]) -> Result<Option<InboundEvent>, RouteError> {
        let payload = std::str::from_utf8(payload).map_err(|_| RouteError::NotUtf8)?;

        if let Some(rest) = topic
            .strip_prefix(self.discovery_prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            return self.route_echo(topic, rest, payload).map(Some);
        }

        let rest = self.namespace.strip(topic).ok_or(RouteError::MalformedTopic)?;
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            ["devices", device, "meta"] => {
                let device_id = checked_segment(device)?;
                if payload.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(InboundEvent::DeviceMeta {
                    device_id,
                    patch: DeviceMetaPatch::from_json(payload)?,
                }))
            }
            ["devices", device, "meta", field] => Ok(Some(InboundEvent::DeviceMeta {
                device_id: checked_segment(device)?,
                patch: DeviceMetaPatch::from_field(field, payload),
            })),
            ["devices", device, "controls", control, "meta"] => {
                let device_id = checked_segment(device)?;
                let control_id = checked_segment(control)?;
                if payload.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(InboundEvent::ControlMeta {
                    device_id,
                    control_id,
                    patch: ControlMetaPatch::from_json(payload)?,
                }))
            }
            ["devices", device, "controls", control, "meta", "error"] => {
                Ok(Some(InboundEvent::ControlError {
                    device_id: checked_segment(device)?,
                    control_id: checked_segment(control)?,
                    has_error: !payload.trim().is_empty(),
                }))
            }
            ["devices", device, "controls", control, "meta", field] => {
                Ok(Some(InboundEvent::ControlMeta {
                    device_id: checked_segment(device)?,
                    control_id: checked_segment(control)?,
                    patch: ControlMetaPatch::from_field(field, payload)?,
                }))
            }
            _ => Err(RouteError::MalformedTopic),
        }
    }

    fn route_echo(&self, topic: &str, rest: &str, payload: &str) -> Result<InboundEvent, RouteError> {
        let segments: Vec<&str> = rest.split('/').collect();
        let [component, node_id, object_id, "config"] = segments.as_slice() else {
            return Err(RouteError::MalformedTopic);
        };

        let retracted = payload.trim().is_empty();
        let origin = if retracted {
            None
        } else {
            let doc: EchoDocument = serde_json::from_str(payload)?;
            doc.origin.and_then(|o| o.name)
        };

        Ok(InboundEvent::DiscoveryEcho(DiscoveryEcho {
            topic: topic.to_string(),
            component: component.to_string(),
            node_id: node_id.to_string(),
            object_id: object_id.to_string(),
            origin,
            retracted,
        }))
    }
}

/// Device and control ids accept letters, digits, `-`, `:`, `_`, parentheses
/// and spaces.
fn checked_segment(segment: &str) -> Result<String, RouteError> {
    let valid = !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | ':' | '_' | '(' | ')' | ' '));

    if valid {
        Ok(segment.to_string())
    } else {
        Err(RouteError::InvalidSegment(segment.to_string()))
    }
}
