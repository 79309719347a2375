//! Discovery Reconciler
//!
//! Ledger of discovery topics this bridge owns on the bus. A reconciliation
//! pass clears every "seen" mark, marks the topics still backed by the
//! registry, then sweeps the rest; the engine retracts each swept topic with
//! an empty retained payload.

use std::collections::BTreeMap;

/// Discovery topics published (or adopted) and their seen mark
#[derive(Debug, Default)]
pub struct TopicLedger {
    entries: BTreeMap<String, bool>,
}

impl TopicLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a topic just published; it counts as seen
    pub fn record_published(&mut self, topic: &str) {
        self.entries.insert(topic.to_string(), true);
    }

    /// Take ownership of a topic found on the bus
    ///
    /// Adopted topics start unseen, so the next pass retracts them unless the
    /// registry still backs them. Returns `false` if already tracked.
    pub fn adopt(&mut self, topic: &str) -> bool {
        if self.entries.contains_key(topic) {
            return false;
        }
        self.entries.insert(topic.to_string(), false);
        true
    }

    /// Clear every seen mark
    pub fn begin_pass(&mut self) {
        for seen in self.entries.values_mut() {
            *seen = false;
        }
    }

    /// Mark a tracked topic as still backed; untracked topics are ignored
    pub fn mark_seen(&mut self, topic: &str) {
        if let Some(seen) = self.entries.get_mut(topic) {
            *seen = true;
        }
    }

    /// Remove and return every unseen topic
    pub fn sweep(&mut self) -> Vec<String> {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, seen)| !**seen)
            .map(|(topic, _)| topic.clone())
            .collect();

        for topic in &stale {
            self.entries.remove(topic);
        }
        stale
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.contains_key(topic)
    }

    pub fn is_seen(&self, topic: &str) -> bool {
        self.entries.get(topic).copied().unwrap_or(false)
    }

    /// Tracked topics in lexical order
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
