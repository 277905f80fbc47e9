use super::{CompassCalibrationConfig, IdleConfig, Maneuver, ManeuverCommand, ManeuverKind, ManeuverSignal};
use crate::memento::{FillReport, MementoError, MementoTable};
use crate::protocol::Record;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ManeuverError {
    #[error("no maneuver is active")]
    NotActive,
    #[error("invalid {kind} configuration: {reason}")]
    InvalidConfig { kind: ManeuverKind, reason: String },
    #[error("memento table: {0}")]
    Memento(#[from] MementoError),
}

/// Configuration of an interrupted maneuver, as tuple text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMemento {
    pub kind: ManeuverKind,
    pub tuples: String,
}

/// Runs at most one maneuver at a time.
#[derive(Debug)]
pub struct ManeuverController {
    active: Option<Maneuver>,
    idle_table: MementoTable<IdleConfig>,
    compass_table: MementoTable<CompassCalibrationConfig>,
    last_saved: Option<SavedMemento>,
}

impl ManeuverController {
    pub fn new() -> Result<Self, ManeuverError> {
        Ok(Self {
            active: None,
            idle_table: IdleConfig::memento_table()?,
            compass_table: CompassCalibrationConfig::memento_table()?,
            last_saved: None,
        })
    }

    /// Starts `command`, replacing whatever was running.
    /// A command that fails validation is answered with a failure signal and
    /// leaves the running maneuver untouched.
    pub fn start(&mut self, command: &ManeuverCommand, now_ms: u64) -> ManeuverSignal {
        if let Err(e) = command.validate() {
            warn!("rejected {}: {}", command.kind(), e);
            return ManeuverSignal::Failed { reason: e.to_string() };
        }

        if let Some(previous) = &self.active {
            info!("{} replaced by {}", previous.kind(), command.kind());
        } else {
            info!("starting {}", command.kind());
        }

        let (maneuver, signal) = Maneuver::start(command, now_ms);
        self.active = Some(maneuver);
        signal
    }

    /// Interrupts the active maneuver and returns its remaining configuration.
    pub fn stop(&mut self, now_ms: u64) -> Result<SavedMemento, ManeuverError> {
        let maneuver = self.active.take().ok_or(ManeuverError::NotActive)?;

        let saved = match maneuver.memento(now_ms) {
            ManeuverCommand::Idle(config) => {
                self.idle_table.uncast_all(&config);
                SavedMemento {
                    kind: ManeuverKind::Idle,
                    tuples: self.idle_table.write_tuples(),
                }
            }
            ManeuverCommand::CompassCalibration(config) => {
                self.compass_table.uncast_all(&config);
                SavedMemento {
                    kind: ManeuverKind::CompassCalibration,
                    tuples: self.compass_table.write_tuples(),
                }
            }
        };

        info!("stopped {} ({})", saved.kind, saved.tuples);
        self.last_saved = Some(saved.clone());
        Ok(saved)
    }

    /// Rebuilds a configuration from defaults plus `tuples` and starts it.
    /// Bad tuples are skipped and reported; the maneuver starts regardless.
    pub fn resume(&mut self, kind: ManeuverKind, tuples: &str, now_ms: u64) -> (ManeuverSignal, FillReport) {
        let (command, report) = self.rebuild(kind, tuples);
        debug!("resuming {:?}", command);
        (self.start(&command, now_ms), report)
    }

    /// Decodes `tuples` over the table defaults without starting anything.
    /// The report covers the explicit tuples only.
    pub fn rebuild(&mut self, kind: ManeuverKind, tuples: &str) -> (ManeuverCommand, FillReport) {
        match kind {
            ManeuverKind::Idle => {
                let mut config = IdleConfig::default();
                self.idle_table.set_defaults(&mut config);
                let report = self.idle_table.fill(&mut config, tuples);
                (ManeuverCommand::Idle(config), report)
            }
            ManeuverKind::CompassCalibration => {
                let mut config = CompassCalibrationConfig::default();
                self.compass_table.set_defaults(&mut config);
                let report = self.compass_table.fill(&mut config, tuples);
                (ManeuverCommand::CompassCalibration(config), report)
            }
        }
    }

    /// Ticks the active maneuver and retires it once it has reported its end.
    pub fn tick(&mut self, now_ms: u64) -> Option<ManeuverSignal> {
        let maneuver = self.active.as_mut()?;
        let signal = maneuver.tick(now_ms);

        if maneuver.is_done() {
            info!("{} finished", maneuver.kind());
            self.active = None;
        }

        signal
    }

    pub fn on_record(&mut self, record: &Record) {
        if let Some(maneuver) = self.active.as_mut() {
            maneuver.on_record(record);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_kind(&self) -> Option<ManeuverKind> {
        self.active.as_ref().map(Maneuver::kind)
    }

    pub fn last_saved(&self) -> Option<&SavedMemento> {
        self.last_saved.as_ref()
    }
}

