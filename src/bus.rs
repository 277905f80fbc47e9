use crate::maneuver::{ManeuverCommand, ManeuverKind};
use crate::protocol::Record;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{trace, warn};

pub const INBOUND_QUEUE_SIZE: usize = 64;
pub const EVENT_BROADCAST_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    Boot,
    Normal,
    Fault,
    Error,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCode {
    Initializing,
    Active,
    ComError,
    MissingData,
    Idle,
}

impl core::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            StatusCode::Initializing => "initializing",
            StatusCode::Active => "active",
            StatusCode::ComError => "communication error",
            StatusCode::MissingData => "missing data",
            StatusCode::Idle => "idle",
        };
        f.write_str(text)
    }
}

/// Messages a task consumes from the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusMessage {
    StartManeuver(ManeuverCommand),
    StopManeuver,
    ResumeManeuver { kind: ManeuverKind, tuples: String },
    /// Periodic tick that drives the active maneuver.
    StateReport,
}

/// Everything a task publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusEvent {
    EntityState { state: EntityState, code: StatusCode },
    Progress { eta: Option<u16> },
    Completion,
    Error { reason: String },
    Record(Record),
    Memento { kind: ManeuverKind, tuples: String },
}

/// Platform message bus as seen by one task.
pub trait Bus {
    /// Non-blocking drain of everything queued for this task.
    fn consume_messages(&mut self) -> Vec<BusMessage>;

    fn set_entity_state(&mut self, state: EntityState, code: StatusCode);

    fn signal_progress(&mut self, eta: Option<u16>);

    fn signal_completion(&mut self);

    fn signal_error(&mut self, _reason: &str) {}

    fn publish_record(&mut self, _record: &Record) {}

    fn publish_memento(&mut self, _kind: ManeuverKind, _tuples: &str) {}
}

/// In-process bus: an mpsc queue inbound and a broadcast channel outbound.
#[derive(Debug)]
pub struct ChannelBus {
    inbound: mpsc::Receiver<BusMessage>,
    events: broadcast::Sender<BusEvent>,
}

/// The other end of a [`ChannelBus`].
#[derive(Debug)]
pub struct BusHandle {
    pub commands: mpsc::Sender<BusMessage>,
    pub events: broadcast::Receiver<BusEvent>,
}

impl ChannelBus {
    pub fn pair() -> (Self, BusHandle) {
        let (command_tx, command_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let (event_tx, event_rx) = broadcast::channel(EVENT_BROADCAST_BUFFER_SIZE);
        (
            Self {
                inbound: command_rx,
                events: event_tx,
            },
            BusHandle {
                commands: command_tx,
                events: event_rx,
            },
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: BusEvent) {
        trace!("bus event {:?}", event);
        if self.events.send(event).is_err() {
            trace!("bus event dropped: no subscribers");
        }
    }
}

impl Bus for ChannelBus {
    fn consume_messages(&mut self) -> Vec<BusMessage> {
        let mut messages = Vec::new();
        // Empty and disconnected both end the drain.
        while let Ok(message) = self.inbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn set_entity_state(&mut self, state: EntityState, code: StatusCode) {
        self.emit(BusEvent::EntityState { state, code });
    }

    fn signal_progress(&mut self, eta: Option<u16>) {
        self.emit(BusEvent::Progress { eta });
    }

    fn signal_completion(&mut self) {
        self.emit(BusEvent::Completion);
    }

    fn signal_error(&mut self, reason: &str) {
        warn!("maneuver error: {}", reason);
        self.emit(BusEvent::Error {
            reason: reason.to_string(),
        });
    }

    fn publish_record(&mut self, record: &Record) {
        self.emit(BusEvent::Record(*record));
    }

    fn publish_memento(&mut self, kind: ManeuverKind, tuples: &str) {
        self.emit(BusEvent::Memento {
            kind,
            tuples: tuples.to_string(),
        });
    }
}
