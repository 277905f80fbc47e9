pub mod compass;
pub mod controller;
pub mod idle;

pub use compass::{CompassCalibrationConfig, CompassCalibrationManeuver};
pub use controller::{ManeuverController, ManeuverError, SavedMemento};
pub use idle::{Idle, IdleConfig};

use crate::protocol::Record;
use serde::{Deserialize, Serialize};

/// What a maneuver asks its owner to publish on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverSignal {
    Progress { eta: Option<u16> },
    Completed,
    Failed { reason: String },
}

impl ManeuverSignal {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManeuverSignal::Completed | ManeuverSignal::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverKind {
    Idle,
    CompassCalibration,
}

impl core::fmt::Display for ManeuverKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ManeuverKind::Idle => write!(f, "Idle"),
            ManeuverKind::CompassCalibration => write!(f, "CompassCalibration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManeuverCommand {
    Idle(IdleConfig),
    CompassCalibration(CompassCalibrationConfig),
}

impl ManeuverCommand {
    pub fn kind(&self) -> ManeuverKind {
        match self {
            ManeuverCommand::Idle(_) => ManeuverKind::Idle,
            ManeuverCommand::CompassCalibration(_) => ManeuverKind::CompassCalibration,
        }
    }

    pub fn validate(&self) -> Result<(), ManeuverError> {
        match self {
            ManeuverCommand::Idle(_) => Ok(()),
            ManeuverCommand::CompassCalibration(config) => config.validate(),
        }
    }
}

/// Capability set shared by every maneuver variant.
///
/// Times are milliseconds on the owning task's clock.
pub trait ManeuverBehavior {
    type Config: Clone + Default;

    fn start(&mut self, config: &Self::Config, now_ms: u64) -> ManeuverSignal;

    /// Periodic state report. Returns `None` once the maneuver is done.
    fn tick(&mut self, now_ms: u64) -> Option<ManeuverSignal>;

    fn is_done(&self) -> bool;

    /// Configuration that resumes the maneuver from where it is now.
    fn memento(&self, now_ms: u64) -> Self::Config;

    fn on_record(&mut self, _record: &Record) {}
}

#[derive(Debug)]
pub enum Maneuver {
    Idle(Idle),
    CompassCalibration(CompassCalibrationManeuver),
}

impl Maneuver {
    /// Creates the variant named by `command` and starts it.
    pub fn start(command: &ManeuverCommand, now_ms: u64) -> (Self, ManeuverSignal) {
        match command {
            ManeuverCommand::Idle(config) => {
                let mut maneuver = Idle::new();
                let signal = maneuver.start(config, now_ms);
                (Maneuver::Idle(maneuver), signal)
            }
            ManeuverCommand::CompassCalibration(config) => {
                let mut maneuver = CompassCalibrationManeuver::new();
                let signal = maneuver.start(config, now_ms);
                (Maneuver::CompassCalibration(maneuver), signal)
            }
        }
    }

    pub fn kind(&self) -> ManeuverKind {
        match self {
            Maneuver::Idle(_) => ManeuverKind::Idle,
            Maneuver::CompassCalibration(_) => ManeuverKind::CompassCalibration,
        }
    }

    pub fn tick(&mut self, now_ms: u64) -> Option<ManeuverSignal> {
        match self {
            Maneuver::Idle(m) => m.tick(now_ms),
            Maneuver::CompassCalibration(m) => m.tick(now_ms),
        }
    }

    pub fn is_done(&self) -> bool {
        match self {
            Maneuver::Idle(m) => m.is_done(),
            Maneuver::CompassCalibration(m) => m.is_done(),
        }
    }

    pub fn on_record(&mut self, record: &Record) {
        match self {
            Maneuver::Idle(m) => m.on_record(record),
            Maneuver::CompassCalibration(m) => m.on_record(record),
        }
    }

    pub fn memento(&self, now_ms: u64) -> ManeuverCommand {
        match self {
            Maneuver::Idle(m) => ManeuverCommand::Idle(m.memento(now_ms)),
            Maneuver::CompassCalibration(m) => ManeuverCommand::CompassCalibration(m.memento(now_ms)),
        }
    }
}

/// Whole seconds left until `deadline_ms`, rounded up and never below one so
/// a resumed maneuver stays bounded.
pub(crate) fn seconds_left(deadline_ms: u64, now_ms: u64) -> u16 {
    let remaining_ms = deadline_ms.saturating_sub(now_ms);
    let seconds = remaining_ms.div_ceil(1000).max(1);
    u16::try_from(seconds).unwrap_or(u16::MAX)
}
