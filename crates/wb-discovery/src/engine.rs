//! Discovery Engine
//!
//! Single-writer event loop tying the pieces together. Inbound bus messages,
//! reconnects and expired debounce timers are processed one at a time on one
//! task, so the registry and the ledger need no locking.
//!
//! Flow for one message:
//!
//! 1. [`TopicRouter`] classifies it (bad input is logged and dropped)
//! 2. [`Registry`] merges it and reports what changed
//! 3. a change arms the device's config debounce; an error transition arms
//!    the control's availability debounce
//! 4. when the config timer fires the device's entities are rebuilt, published
//!    and recorded in the [`TopicLedger`], and a reconciliation pass is armed
//!    on the longer delay

use std::collections::BTreeMap;
use std::future::Future;

use bytes::Bytes;
use tokio::sync::mpsc;
use wb_conventions::Namespace;

use crate::compositor::build_entities;
use crate::config::DiscoveryConfig;
use crate::mapper::TypeMapper;
use crate::payload::{ORIGIN_NAME, PayloadBuilder};
use crate::reconciler::TopicLedger;
use crate::registry::Registry;
use crate::router::{DiscoveryEcho, InboundEvent, TopicRouter};
use crate::scheduler::{Debouncer, Fired, TaskKey};
use crate::transport::{BusEvent, Qos, Transport};

/// A rendered config document waiting to be sent
struct Outgoing {
    topic: String,
    payload: Bytes,
    control_ids: Vec<String>,
}

/// The Discovery Synchronization Engine
pub struct DiscoveryEngine<T: Transport> {
    transport: T,
    config: DiscoveryConfig,
    namespace: Namespace,
    router: TopicRouter,
    registry: Registry,
    mapper: TypeMapper,
    payloads: PayloadBuilder,
    ledger: TopicLedger,
    debouncer: Debouncer,
    fired_rx: mpsc::UnboundedReceiver<Fired>,
    /// Patterns this engine owns, re-issued on every reconnect
    subscriptions: BTreeMap<String, Qos>,
}

impl<T: Transport> DiscoveryEngine<T> {
    pub fn new(transport: T, config: DiscoveryConfig, namespace: Namespace) -> Self {
        let (debouncer, fired_rx) = Debouncer::new();
        Self {
            router: TopicRouter::new(namespace.clone(), config.prefix.clone()),
            payloads: PayloadBuilder::new(namespace.clone(), &config),
            transport,
            config,
            namespace,
            registry: Registry::new(),
            mapper: TypeMapper::new(),
            ledger: TopicLedger::new(),
            debouncer,
            fired_rx,
            subscriptions: BTreeMap::new(),
        }
    }

    // ─── Accessors ───

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &TopicLedger {
        &self.ledger
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Patterns currently subscribed
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    /// A debounce task is armed under `key`
    pub fn is_scheduled(&self, key: &TaskKey) -> bool {
        self.debouncer.is_pending(key)
    }

    // ─── Lifecycle ───

    /// Subscribe to device metadata and discovery echoes
    pub async fn start(&mut self) {
        let [json_meta, field_meta] = self.namespace.device_meta_wildcards();
        self.subscribe(json_meta).await;
        self.subscribe(field_meta).await;

        let echoes = format!("{}/+/+/+/config", self.config.prefix.trim_end_matches('/'));
        self.subscribe(echoes).await;

        tracing::info!(
            "Discovery engine started (prefix '{}', namespace '{}')",
            self.config.prefix,
            self.namespace.devices_root()
        );
    }

    /// Re-issue every owned subscription after the session was re-established
    pub async fn on_connected(&mut self) {
        tracing::debug!("Restoring {} subscriptions", self.subscriptions.len());
        for (pattern, qos) in &self.subscriptions {
            if let Err(err) = self.transport.subscribe(pattern, *qos).await {
                tracing::warn!("Failed to subscribe to {}: {}", pattern, err);
            }
        }
    }

    /// Drive the engine until `shutdown` resolves or `events` closes
    pub async fn run<F>(&mut self, mut events: mpsc::Receiver<BusEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                event = events.recv() => match event {
                    Some(BusEvent::Connected) => self.on_connected().await,
                    Some(BusEvent::Message { topic, payload }) => {
                        self.handle_message(&topic, &payload).await;
                    }
                    None => {
                        tracing::info!("Bus event stream closed");
                        break;
                    }
                },
                Some(fired) = self.fired_rx.recv() => self.handle_fired(fired).await,
            }
        }

        self.shutdown().await;
    }

    /// Cancel pending work and drop every subscription
    pub async fn shutdown(&mut self) {
        self.debouncer.cancel_all();

        let subscriptions = std::mem::take(&mut self.subscriptions);
        for pattern in subscriptions.keys() {
            if let Err(err) = self.transport.unsubscribe(pattern).await {
                tracing::warn!("Failed to unsubscribe from {}: {}", pattern, err);
            }
        }

        tracing::info!(
            "Discovery engine stopped ({} devices, {} discovery topics)",
            self.registry.len(),
            self.ledger.len()
        );
    }

    /// Process fired timers until nothing is scheduled
    ///
    /// Returns once every debounce has fired, including the reconciliation
    /// passes armed by config publishes.
    pub async fn settle(&mut self) {
        while self.debouncer.has_pending() {
            let Some(fired) = self.fired_rx.recv().await else {
                break;
            };
            self.handle_fired(fired).await;
        }
    }

    // ─── Inbound ───

    /// Apply one inbound message; failures are logged and the message dropped
    pub async fn handle_message(&mut self, topic: &str, payload: &[u8]) {
        let event = match self.router.route(topic, payload) {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(
                    "Dropping message on '{}': {} (payload: {:?})",
                    topic,
                    err,
                    String::from_utf8_lossy(payload)
                );
                return;
            }
        };

        match event {
            InboundEvent::DeviceMeta { device_id, patch } => {
                let applied = self.registry.apply_device_meta(&device_id, &patch);
                if applied.created_device {
                    tracing::info!("[{}] New device", device_id);
                    let [json_meta, field_meta] = self.namespace.control_meta_wildcards(&device_id);
                    self.subscribe(json_meta).await;
                    self.subscribe(field_meta).await;
                }
                if applied.changed {
                    self.schedule_config(&device_id);
                }
            }
            InboundEvent::ControlMeta {
                device_id,
                control_id,
                patch,
            } => {
                let applied = match self.registry.apply_control_meta(&device_id, &control_id, &patch) {
                    Ok(applied) => applied,
                    Err(err) => {
                        tracing::warn!("[{}/{}] Meta dropped: {}", device_id, control_id, err);
                        return;
                    }
                };
                if applied.created_control {
                    self.on_control_created(&device_id, &control_id).await;
                }
                if applied.changed {
                    self.schedule_config(&device_id);
                }
            }
            InboundEvent::ControlError {
                device_id,
                control_id,
                has_error,
            } => {
                let applied = match self.registry.apply_control_error(&device_id, &control_id, has_error) {
                    Ok(applied) => applied,
                    Err(err) => {
                        tracing::warn!("[{}/{}] Error state dropped: {}", device_id, control_id, err);
                        return;
                    }
                };
                if applied.created_control {
                    self.on_control_created(&device_id, &control_id).await;
                }
                if applied.availability_changed && !self.config.ignore_availability {
                    self.debouncer.schedule(
                        TaskKey::availability(device_id, control_id),
                        self.config.publish_delay(),
                    );
                }
            }
            InboundEvent::DiscoveryEcho(echo) => self.handle_echo(echo),
        }
    }

    /// Adopt our own retained documents left over from an earlier run
    fn handle_echo(&mut self, echo: DiscoveryEcho) {
        if echo.retracted || echo.origin.as_deref() != Some(ORIGIN_NAME) {
            return;
        }
        if self.ledger.adopt(&echo.topic) {
            tracing::debug!("Adopted discovery topic {}", echo.topic);
            self.schedule_reconcile();
        }
    }

    async fn on_control_created(&mut self, device_id: &str, control_id: &str) {
        tracing::debug!("[{}/{}] New control", device_id, control_id);
        let topic = self.namespace.control_error_topic(device_id, control_id);
        self.subscribe(topic).await;
    }

    fn schedule_config(&mut self, device_id: &str) {
        self.debouncer
            .schedule(TaskKey::config(device_id), self.config.publish_delay());
    }

    fn schedule_reconcile(&mut self) {
        self.debouncer
            .schedule(TaskKey::Reconcile, self.config.reconcile_delay());
    }

    // ─── Timers ───

    /// Run the action behind a fired debounce timer
    pub async fn handle_fired(&mut self, fired: Fired) {
        if !self.debouncer.accept(&fired) {
            return;
        }

        match fired.key {
            TaskKey::Config { device_id } => self.publish_device(&device_id).await,
            TaskKey::Availability {
                device_id,
                control_id,
            } => self.publish_availability(&device_id, &control_id).await,
            TaskKey::Reconcile => self.reconcile().await,
        }
    }

    /// Publish the config document of every entity of a device
    async fn publish_device(&mut self, device_id: &str) {
        let Some(device) = self.registry.device(device_id) else {
            return;
        };

        let mut outgoing = Vec::new();
        for entity in build_entities(&mut self.mapper, device) {
            let Some(document) = self.payloads.document(device, &entity) else {
                continue;
            };
            let payload = match serde_json::to_vec(&document) {
                Ok(bytes) => Bytes::from(bytes),
                Err(err) => {
                    tracing::warn!("[{}/{}] Cannot encode config: {}", device_id, entity.main_control_id(), err);
                    continue;
                }
            };
            outgoing.push(Outgoing {
                topic: self.payloads.topic(device, &entity),
                payload,
                control_ids: entity.control_ids().into_iter().map(str::to_string).collect(),
            });
        }

        if outgoing.is_empty() {
            tracing::debug!("[{}] Nothing to publish", device_id);
            // topics published earlier for this device may now be stale
            if !self.ledger.is_empty() {
                self.schedule_reconcile();
            }
            return;
        }

        let mut announced = Vec::new();
        for item in outgoing {
            let result = self
                .transport
                .publish(
                    &item.topic,
                    Some(item.payload),
                    self.config.config_qos,
                    self.config.config_retain,
                )
                .await;

            match result {
                Ok(()) => {
                    tracing::info!("[{}] Published config {}", device_id, item.topic);
                    self.ledger.record_published(&item.topic);
                    announced.extend(item.control_ids);
                }
                Err(err) => tracing::warn!("[{}] Failed to publish {}: {}", device_id, item.topic, err),
            }
        }

        if !self.config.ignore_availability {
            for control_id in &announced {
                let first = self
                    .registry
                    .control(device_id, control_id)
                    .is_some_and(|c| !c.availability_published);
                if first {
                    self.publish_availability(device_id, control_id).await;
                }
            }
        }

        self.schedule_reconcile();
    }

    async fn publish_availability(&mut self, device_id: &str, control_id: &str) {
        if self.config.ignore_availability {
            return;
        }
        let Some(control) = self.registry.control(device_id, control_id) else {
            return;
        };

        let payload = control.availability_payload();
        let topic = self.namespace.availability_topic(device_id, control_id);
        let result = self
            .transport
            .publish(
                &topic,
                Some(Bytes::from_static(payload.as_bytes())),
                self.config.availability_qos,
                self.config.availability_retain,
            )
            .await;

        match result {
            Ok(()) => {
                tracing::debug!("[{}/{}] Availability {}", device_id, control_id, payload);
                if let Some(control) = self
                    .registry
                    .device_mut(device_id)
                    .and_then(|d| d.control_mut(control_id))
                {
                    control.availability_published = true;
                }
            }
            Err(err) => {
                tracing::warn!("[{}/{}] Failed to publish availability: {}", device_id, control_id, err)
            }
        }
    }

    /// Retract ledger topics no longer backed by the registry
    async fn reconcile(&mut self) {
        self.ledger.begin_pass();
        for device in self.registry.devices() {
            for entity in build_entities(&mut self.mapper, device) {
                self.ledger.mark_seen(&self.payloads.topic(device, &entity));
            }
        }

        let stale = self.ledger.sweep();
        if stale.is_empty() {
            tracing::debug!("Reconciliation: {} discovery topics up to date", self.ledger.len());
            return;
        }

        let mut retry = false;
        for topic in stale {
            let result = self
                .transport
                .publish(&topic, None, self.config.config_qos, self.config.config_retain)
                .await;
            match result {
                Ok(()) => tracing::info!("Retracted stale discovery topic {}", topic),
                Err(err) => {
                    tracing::warn!("Failed to retract {}: {}", topic, err);
                    self.ledger.adopt(&topic);
                    retry = true;
                }
            }
        }

        if retry {
            self.schedule_reconcile();
        }
    }

    // ─── Subscriptions ───

    async fn subscribe(&mut self, pattern: String) {
        let qos = self.config.subscribe_qos;
        if self.subscriptions.insert(pattern.clone(), qos).is_some() {
            return;
        }
        match self.transport.subscribe(&pattern, qos).await {
            Ok(()) => tracing::debug!("Subscribed to {}", pattern),
            Err(err) => tracing::warn!("Failed to subscribe to {}: {}", pattern, err),
        }
    }
}
