// 10.0: everything the core tells the outside world goes through here.
// three event kinds: state changes, run-type changes, volatility interruptions.
// sinks may ignore any of them; the core never blocks on delivery.

use crate::calendar::RunType;
use crate::price_range::VolatilityInterruption;
use crate::state::{FormKind, Phase};
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketEvent {
    StateChanged(StateChangedEvent),
    RunTypeChanged(RunTypeChangedEvent),
    VolatilityInterrupted(VolatilityInterruption),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub form: FormKind,
    pub previous: Phase,
    pub current: Phase,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunTypeChangedEvent {
    pub previous: Option<RunType>,
    pub current: RunType,
}

pub trait EventSink: Send {
    fn publish(&mut self, event: MarketEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&mut self, _event: MarketEvent) {}
}

// 10.1: in-memory sink for tests and the simulator.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<MarketEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[MarketEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn state_changes(&self) -> impl Iterator<Item = &StateChangedEvent> {
        self.events.iter().filter_map(|e| match e {
            MarketEvent::StateChanged(change) => Some(change),
            _ => None,
        })
    }
}

impl EventSink for EventCollector {
    fn publish(&mut self, event: MarketEvent) {
        self.events.push(event);
    }
}

// 10.2: clonable sink handle for when the session lives on another thread.
#[derive(Debug, Clone, Default)]
pub struct SharedCollector {
    events: Arc<Mutex<Vec<MarketEvent>>>,
}

impl SharedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<MarketEvent> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for SharedCollector {
    fn publish(&mut self, event: MarketEvent) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}
