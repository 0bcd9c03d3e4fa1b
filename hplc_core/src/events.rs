//! Outbound engine events and the observer registry.

use crate::signal::SamplePoint;
use crate::state_machine::{RunPhase, TransitionReason};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Everything the engine tells the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        phase: RunPhase,
        previous: RunPhase,
        reason: TransitionReason,
    },
    Sample(SamplePoint),
    PressureUpdated {
        bar: f64,
        warning: bool,
    },
    EstimatedRetention {
        compound_index: usize,
        compound: String,
        retention_time: f64,
    },
}

impl EngineEvent {
    /// Short kind label, used in logs and exports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::StateChanged { .. } => "state_changed",
            EngineEvent::Sample(_) => "sample",
            EngineEvent::PressureUpdated { .. } => "pressure_updated",
            EngineEvent::EstimatedRetention { .. } => "estimated_retention",
        }
    }
}

/// Observer of engine events.
///
/// Implement `on_event` for everything, or override only the per-kind hooks.
/// Closures `FnMut(&EngineEvent) + Send` are listeners too.
pub trait EngineListener: Send {
    fn on_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::StateChanged { phase, previous, reason } => {
                self.on_state_change(*previous, *phase, *reason)
            }
            EngineEvent::Sample(point) => self.on_sample(*point),
            EngineEvent::PressureUpdated { bar, warning } => self.on_pressure(*bar, *warning),
            EngineEvent::EstimatedRetention {
                compound_index,
                retention_time,
                ..
            } => self.on_estimated_retention(*compound_index, *retention_time),
        }
    }

    fn on_state_change(&mut self, _from: RunPhase, _to: RunPhase, _reason: TransitionReason) {}

    fn on_sample(&mut self, _point: SamplePoint) {}

    fn on_pressure(&mut self, _bar: f64, _warning: bool) {}

    fn on_estimated_retention(&mut self, _compound_index: usize, _retention_time: f64) {}
}

impl<F> EngineListener for F
where
    F: FnMut(&EngineEvent) + Send,
{
    fn on_event(&mut self, event: &EngineEvent) {
        self(event)
    }
}

/// Forwards events into a tokio channel. Events are dropped once the receiver is gone.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EngineListener for ChannelListener {
    fn on_event(&mut self, event: &EngineEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Handle returned by [`EventHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Ordered set of listeners. Events are delivered in subscription order.
#[derive(Default)]
pub struct EventHub {
    listeners: Vec<(SubscriptionId, Box<dyn EngineListener>)>,
    next_id: u64,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Box<dyn EngineListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Removes a listener. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    pub fn emit(&mut self, event: &EngineEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener.on_event(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
