//! Host platform capabilities
//!
//! The sensor never talks to a concrete platform. It reads entities,
//! receives change notifications and publishes its own state through
//! [`EntityHost`], and restores its last published value through
//! [`StateStore`]. [`MemoryHost`] is the in-process implementation used by
//! the service binary and the tests.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

/// State value reported when an entity has nothing to show
pub const STATE_UNKNOWN: &str = "unknown";

/// Current value and attributes of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntitySnapshot {
    pub fn new(entity_id: &str, state: &str, attributes: Map<String, Value>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        }
    }
}

/// Value and attributes a sensor publishes (and has persisted)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorState {
    /// Level label, or `None` while no level has been determined
    pub state: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Notification that an observed entity changed
#[derive(Debug, Clone, PartialEq)]
pub struct StateChanged {
    pub entity_id: String,
    pub old_state: Option<EntitySnapshot>,
    pub new_state: Option<EntitySnapshot>,
}

/// A state published by a sensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedEvent {
    pub entity_id: String,
    pub state: String,
    pub attributes: Map<String, Value>,
    pub published_at: DateTime<Utc>,
}

/// Live change subscription for one entity.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<StateChanged>,
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(
        rx: mpsc::UnboundedReceiver<StateChanged>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Wait for the next change; `None` once the host side is gone
    pub async fn recv(&mut self) -> Option<StateChanged> {
        self.rx.recv().await
    }

    /// Take a pending change without waiting
    pub fn try_recv(&mut self) -> Option<StateChanged> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving notifications
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

/// Entity access offered by the host platform
pub trait EntityHost: Send + Sync {
    /// Current value and attributes of an entity, if it has a state
    fn get_entity(&self, entity_id: &str) -> Option<EntitySnapshot>;

    /// Whether the entity is known to the registry, with or without a state
    fn is_registered(&self, entity_id: &str) -> bool;

    /// Subscribe to change notifications for one entity
    fn on_change(&self, entity_id: &str) -> Subscription;

    /// Make a sensor state observable under `entity_id`
    fn publish(&self, entity_id: &str, state: &SensorState);
}

/// Last-known-value cache offered by the host platform
pub trait StateStore: Send + Sync {
    /// Last state persisted for a sensor unique id
    fn restore_last(&self, unique_id: &str) -> Option<SensorState>;

    /// Remember the state just published by a sensor
    fn persist_last(&self, unique_id: &str, state: &SensorState) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    states: HashMap<String, EntitySnapshot>,
    registry: HashSet<String>,
    listeners: HashMap<String, Vec<(u64, mpsc::UnboundedSender<StateChanged>)>>,
    published: Vec<mpsc::UnboundedSender<PublishedEvent>>,
}

/// In-process host keeping entity states in memory
#[derive(Clone, Default)]
pub struct MemoryHost {
    inner: Arc<RwLock<Inner>>,
    next_listener: Arc<AtomicU64>,
}

fn read(lock: &RwLock<Inner>) -> RwLockReadGuard<'_, Inner> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(lock: &RwLock<Inner>) -> RwLockWriteGuard<'_, Inner> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity without giving it a state
    pub fn register_entity(&self, entity_id: &str) {
        write(&self.inner).registry.insert(entity_id.to_string());
    }

    /// Set an entity state and notify its listeners
    pub fn set_state(&self, entity_id: &str, state: &str, attributes: Map<String, Value>) {
        self.apply(EntitySnapshot::new(entity_id, state, attributes));
    }

    /// Store a snapshot and notify listeners of the entity
    pub fn apply(&self, snapshot: EntitySnapshot) {
        let entity_id = snapshot.entity_id.clone();
        let mut inner = write(&self.inner);
        inner.registry.insert(entity_id.clone());
        let old_state = inner.states.insert(entity_id.clone(), snapshot.clone());
        Self::notify(
            &mut inner,
            StateChanged {
                entity_id,
                old_state,
                new_state: Some(snapshot),
            },
        );
    }

    /// Drop the state of an entity; it stays registered
    pub fn remove_state(&self, entity_id: &str) {
        let mut inner = write(&self.inner);
        let old_state = inner.states.remove(entity_id);
        if old_state.is_some() {
            Self::notify(
                &mut inner,
                StateChanged {
                    entity_id: entity_id.to_string(),
                    old_state,
                    new_state: None,
                },
            );
        }
    }

    /// Stream of every state published through [`EntityHost::publish`]
    pub fn published_events(&self) -> mpsc::UnboundedReceiver<PublishedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        write(&self.inner).published.push(tx);
        rx
    }

    /// Number of live listeners for an entity
    pub fn listener_count(&self, entity_id: &str) -> usize {
        read(&self.inner)
            .listeners
            .get(entity_id)
            .map_or(0, |l| l.iter().filter(|(_, tx)| !tx.is_closed()).count())
    }

    fn notify(inner: &mut Inner, change: StateChanged) {
        if let Some(listeners) = inner.listeners.get_mut(&change.entity_id) {
            listeners.retain(|(_, tx)| tx.send(change.clone()).is_ok());
        }
    }
}

impl EntityHost for MemoryHost {
    fn get_entity(&self, entity_id: &str) -> Option<EntitySnapshot> {
        read(&self.inner).states.get(entity_id).cloned()
    }

    fn is_registered(&self, entity_id: &str) -> bool {
        read(&self.inner).registry.contains(entity_id)
    }

    fn on_change(&self, entity_id: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        write(&self.inner)
            .listeners
            .entry(entity_id.to_string())
            .or_default()
            .push((id, tx));

        let inner = Arc::clone(&self.inner);
        let key = entity_id.to_string();
        Subscription::new(rx, move || {
            let mut inner = write(&inner);
            let now_empty = match inner.listeners.get_mut(&key) {
                Some(listeners) => {
                    listeners.retain(|(listener_id, _)| *listener_id != id);
                    listeners.is_empty()
                }
                None => false,
            };
            if now_empty {
                inner.listeners.remove(&key);
            }
        })
    }

    fn publish(&self, entity_id: &str, state: &SensorState) {
        let label = state.state.as_deref().unwrap_or(STATE_UNKNOWN);
        let event = PublishedEvent {
            entity_id: entity_id.to_string(),
            state: label.to_string(),
            attributes: state.attributes.clone(),
            published_at: Utc::now(),
        };
        self.set_state(entity_id, label, state.attributes.clone());
        write(&self.inner)
            .published
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}
