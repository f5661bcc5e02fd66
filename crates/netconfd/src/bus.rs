//! Object bus sink contract
//!
//! The registry exports management objects to other processes through an
//! object-manager root; the export machinery itself lives outside this core.
//! The registry only needs a sink for object lifecycle and property-change
//! notifications, so that is the whole contract here.

use std::sync::{Arc, Mutex};
use tracing::debug;

/// Sink for object lifecycle notifications emitted by the registry
pub trait ObjectBus: Send {
    fn emit_added(&self, path: &str);
    fn emit_removed(&self, path: &str);
    fn emit_property_changed(&self, path: &str, property: &str);
}

/// Default sink: record emissions in the daemon log
pub struct LoggingBus;

impl ObjectBus for LoggingBus {
    fn emit_added(&self, path: &str) {
        debug!(path, "Object added");
    }

    fn emit_removed(&self, path: &str) {
        debug!(path, "Object removed");
    }

    fn emit_property_changed(&self, path: &str, property: &str) {
        debug!(path, property, "Property changed");
    }
}

/// A single captured bus emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Added(String),
    Removed(String),
    PropertyChanged(String, String),
}

/// Capturing sink for tests; clones share the captured event list
#[derive(Clone, Default)]
pub struct RecordingBus {
    events: Arc<Mutex<Vec<BusEvent>>>,
}

impl RecordingBus {
    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().expect("bus event lock").clone()
    }
}

impl ObjectBus for RecordingBus {
    fn emit_added(&self, path: &str) {
        self.events
            .lock()
            .expect("bus event lock")
            .push(BusEvent::Added(path.to_string()));
    }

    fn emit_removed(&self, path: &str) {
        self.events
            .lock()
            .expect("bus event lock")
            .push(BusEvent::Removed(path.to_string()));
    }

    fn emit_property_changed(&self, path: &str, property: &str) {
        self.events
            .lock()
            .expect("bus event lock")
            .push(BusEvent::PropertyChanged(path.to_string(), property.to_string()));
    }
}
