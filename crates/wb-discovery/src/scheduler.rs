//! Publish Scheduler
//!
//! Per-key debounce. Scheduling a key aborts the task still pending under
//! that key and starts a new timer, so only the last call in a burst fires.
//! Timers never touch engine state: a fired timer sends a [`Fired`] token back
//! to the engine, which checks it with [`Debouncer::accept`] before acting.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

// ─────────────────────────────────────────────────────────────────────────────
// Keys
// ─────────────────────────────────────────────────────────────────────────────

/// Logical debounce key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskKey {
    /// Config publish pass for one device
    Config { device_id: String },
    /// Availability publish for one control
    Availability { device_id: String, control_id: String },
    /// Ledger reconciliation pass
    Reconcile,
}

impl TaskKey {
    pub fn config(device_id: impl Into<String>) -> Self {
        TaskKey::Config {
            device_id: device_id.into(),
        }
    }

    pub fn availability(device_id: impl Into<String>, control_id: impl Into<String>) -> Self {
        TaskKey::Availability {
            device_id: device_id.into(),
            control_id: control_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKey::Config { device_id } => write!(f, "{device_id}:config"),
            TaskKey::Availability {
                device_id,
                control_id,
            } => write!(f, "{device_id}:{control_id}:availability"),
            TaskKey::Reconcile => f.write_str("reconcile"),
        }
    }
}

/// Token sent by an expired timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub key: TaskKey,
    pub generation: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Debouncer
// ─────────────────────────────────────────────────────────────────────────────

/// Timer task currently armed for a key
struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Map from key to the latest timer task
pub struct Debouncer {
    tx: mpsc::UnboundedSender<Fired>,
    pending: HashMap<TaskKey, Pending>,
    next_generation: u64,
}

impl Debouncer {
    /// Create a debouncer and the receiver its timers report to
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            tx,
            pending: HashMap::new(),
            next_generation: 0,
        };
        (debouncer, rx)
    }

    /// Arm `key` to fire after `delay`, replacing any pending timer
    pub fn schedule(&mut self, key: TaskKey, delay: Duration) {
        if let Some(previous) = self.pending.remove(&key) {
            previous.handle.abort();
            tracing::trace!("Debounce {} restarted", key);
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let fired = Fired {
            key: key.clone(),
            generation,
        };
        let deadline = Instant::now() + delay;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(fired);
        });

        self.pending.insert(key, Pending { generation, handle });
    }

    /// Accept a fired token if it belongs to the current timer of its key
    ///
    /// An accepted key is no longer pending. Tokens from superseded timers
    /// (sent just before they were aborted) are rejected.
    pub fn accept(&mut self, fired: &Fired) -> bool {
        match self.pending.get(&fired.key) {
            Some(current) if current.generation == fired.generation => {
                self.pending.remove(&fired.key);
                true
            }
            _ => {
                tracing::trace!("Ignoring superseded firing of {}", fired.key);
                false
            }
        }
    }

    /// Abort every pending timer
    pub fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &TaskKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
