//! In-memory transport that records every call

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{Qos, Transport};
use crate::{Error, Result};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Subscribe { pattern: String, qos: Qos },
    Unsubscribe { pattern: String },
    Publish(Published),
}

/// A recorded publish
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Option<Bytes>,
    pub qos: Qos,
    pub retain: bool,
}

impl Published {
    /// Payload parsed as JSON, `None` for retractions
    pub fn json(&self) -> Option<serde_json::Value> {
        self.payload
            .as_ref()
            .and_then(|p| serde_json::from_slice(p).ok())
    }

    pub fn text(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| std::str::from_utf8(p).ok())
    }

    pub fn is_retraction(&self) -> bool {
        self.payload.as_ref().is_none_or(|p| p.is_empty())
    }
}

/// Transport double; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    log: Arc<Mutex<Vec<Recorded>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (calls are still recorded)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    pub fn publishes(&self) -> Vec<Published> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                Recorded::Publish(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn publishes_to(&self, topic: &str) -> Vec<Published> {
        self.publishes().into_iter().filter(|p| p.topic == topic).collect()
    }

    /// Subscribed patterns, in call order
    pub fn subscriptions(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                Recorded::Subscribe { pattern, .. } => Some(pattern.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscriptions(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                Recorded::Unsubscribe { pattern } => Some(pattern.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn record(&self, entry: Recorded) -> Result<()> {
        self.log.lock().push(entry);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Transport("memory transport is failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn subscribe(&self, pattern: &str, qos: Qos) -> Result<()> {
        self.record(Recorded::Subscribe {
            pattern: pattern.to_string(),
            qos,
        })
    }

    async fn unsubscribe(&self, pattern: &str) -> Result<()> {
        self.record(Recorded::Unsubscribe {
            pattern: pattern.to_string(),
        })
    }

    async fn publish(&self, topic: &str, payload: Option<Bytes>, qos: Qos, retain: bool) -> Result<()> {
        self.record(Recorded::Publish(Published {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        }))
    }
}
