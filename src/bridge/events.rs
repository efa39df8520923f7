//! Notifications delivered to bridge observers.
//!
//! The state machine pushes [`BridgeEvent`]s into a queue drained by a
//! dedicated dispatcher thread. Observers run there, one event at a time and
//! in arrival order, so a slow or panicking observer never stalls or corrupts
//! the state machine.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::state::StatsSnapshot;
use crate::fix::Fix;
use crate::{lock_or_recover, log_debug};

/// Notification emitted by the bridge.
///
/// Serialized as JSON with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum BridgeEvent {
    /// The worker confirmed the link.
    #[serde(rename = "connected")]
    Connected { device_address: String },

    /// A validated fix arrived.
    #[serde(rename = "location")]
    Location {
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
        bearing: Option<f64>,
        timestamp: i64,
    },

    /// A confirmed link went away.
    #[serde(rename = "disconnected")]
    Disconnected {
        device_address: String,
        stats: StatsSnapshot,
    },

    /// Reconnect attempts ran out; the session is over.
    #[serde(rename = "reconnect_failed")]
    ReconnectFailed { attempts: u32 },
}

impl BridgeEvent {
    pub fn location(fix: &Fix) -> Self {
        BridgeEvent::Location {
            latitude: fix.latitude,
            longitude: fix.longitude,
            accuracy: fix.accuracy,
            bearing: fix.bearing,
            timestamp: fix.timestamp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Connected { .. } => "connected",
            BridgeEvent::Location { .. } => "location",
            BridgeEvent::Disconnected { .. } => "disconnected",
            BridgeEvent::ReconnectFailed { .. } => "reconnect_failed",
        }
    }
}

/// Receives bridge notifications on the dispatcher thread.
///
/// Panics are caught and logged; they never reach the bridge.
pub trait BridgeObserver: Send + Sync + 'static {
    fn on_event(&self, event: &BridgeEvent);

    /// Name used in logs when this observer misbehaves.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> BridgeObserver for F
where
    F: Fn(&BridgeEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &BridgeEvent) {
        self(event)
    }
}

/// Observers and channel subscribers shared between the facade and the dispatcher.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    observers: Vec<Arc<dyn BridgeObserver>>,
    subscribers: Vec<Sender<BridgeEvent>>,
}

impl ObserverRegistry {
    pub(crate) fn add_observer(&mut self, observer: Arc<dyn BridgeObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn add_subscriber(&mut self, subscriber: Sender<BridgeEvent>) {
        self.subscribers.push(subscriber);
    }
}

/// Deliver one event to every registered observer and subscriber.
pub(crate) fn dispatch(registry: &Mutex<ObserverRegistry>, event: &BridgeEvent) {
    let observers = {
        let mut registry = lock_or_recover(registry, "observer registry");
        // Drop subscribers whose receivers are gone.
        registry
            .subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
        registry.observers.clone()
    };

    for observer in observers {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(event)));
        if delivered.is_err() {
            log_debug(&format!(
                "Observer '{}' panicked handling {} event",
                observer.name(),
                event.name()
            ));
        }
    }
}

pub(crate) fn spawn_dispatcher(
    events: Receiver<BridgeEvent>,
    registry: Arc<Mutex<ObserverRegistry>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in events.iter() {
            dispatch(&registry, &event);
        }
        log_debug("Event dispatcher exiting");
    })
}
