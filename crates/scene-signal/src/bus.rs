//! Signal bus contract and in-memory implementation

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use scene_core::{Signal, SignalSource, Value};

/// Change-notification callback
pub type SignalListener = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Handle returned by [`SignalBus::subscribe`]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subscription({})", self.0)
    }
}

/// Publish/subscribe signal table consumed by the engine
///
/// Listeners may be invoked from any producer thread; they must not block.
pub trait SignalBus: SignalSource {
    fn subscribe(&self, listener: SignalListener) -> SubscriptionId;

    /// Returns false if the subscription was unknown
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Latest-value signal table with synchronous fan-out
#[derive(Default)]
pub struct InMemorySignalBus {
    values: RwLock<HashMap<String, Value>>,
    listeners: RwLock<Vec<(SubscriptionId, SignalListener)>>,
    next_id: AtomicU64,
}

impl InMemorySignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest value for the signal's key, then notify subscribers
    ///
    /// Subscribers are called after both locks are released, against a
    /// snapshot of the subscriber list, so a listener may read the bus or
    /// subscribe further listeners.
    pub fn publish(&self, signal: Signal) {
        self.values
            .write()
            .insert(signal.key.clone(), signal.value.clone());

        let snapshot: Vec<SignalListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::trace!(
            key = %signal.key,
            value = %signal.value,
            subscribers = snapshot.len(),
            "signal published"
        );

        for listener in snapshot {
            listener(&signal);
        }
    }

    /// Shorthand for `publish(Signal::new(key, value))`
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.publish(Signal::new(key, value));
    }

    /// Copy of the whole signal table
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.read().clone()
    }

    /// Number of keys observed so far
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl SignalSource for InMemorySignalBus {
    fn current_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }
}

impl SignalBus for InMemorySignalBus {
    fn subscribe(&self, listener: SignalListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }
}

impl fmt::Debug for InMemorySignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySignalBus")
            .field("values", &*self.values.read())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
