use super::{seconds_left, ManeuverBehavior, ManeuverError, ManeuverKind, ManeuverSignal};
use crate::memento::{Accessor, MementoError, MementoTable};
use crate::protocol::Record;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CALIBRATION_TIMEOUT_S: u16 = 120;
pub const DEFAULT_CALIBRATION_TARGET: u8 = 100;
pub const MIN_CALIBRATION_TARGET: u8 = 1;
pub const MAX_CALIBRATION_TARGET: u8 = 100;

/// Waits for the vehicle's compass calibration to reach `target` percent.
/// `timeout` is in seconds; zero waits indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompassCalibrationConfig {
    pub timeout: u16,
    pub target: u8,
    pub require_thruster: bool,
}

impl Default for CompassCalibrationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CALIBRATION_TIMEOUT_S,
            target: DEFAULT_CALIBRATION_TARGET,
            require_thruster: true,
        }
    }
}

impl CompassCalibrationConfig {
    /// A target outside 1..=100 would complete at once or never.
    pub fn validate(&self) -> Result<(), ManeuverError> {
        if (MIN_CALIBRATION_TARGET..=MAX_CALIBRATION_TARGET).contains(&self.target) {
            Ok(())
        } else {
            Err(ManeuverError::InvalidConfig {
                kind: ManeuverKind::CompassCalibration,
                reason: format!(
                    "target {}% outside {}..={}",
                    self.target, MIN_CALIBRATION_TARGET, MAX_CALIBRATION_TARGET
                ),
            })
        }
    }

    pub fn memento_table() -> Result<MementoTable<CompassCalibrationConfig>, MementoError> {
        let mut table = MementoTable::<CompassCalibrationConfig>::new();
        table
            .add(
                "timeout",
                Accessor::integer(
                    0,
                    i64::from(u16::MAX),
                    |config: &CompassCalibrationConfig| i64::from(config.timeout),
                    |config: &mut CompassCalibrationConfig, value| config.timeout = value as u16,
                ),
            )?
            .default_value("120");
        table
            .add(
                "target",
                Accessor::integer(
                    i64::from(MIN_CALIBRATION_TARGET),
                    i64::from(MAX_CALIBRATION_TARGET),
                    |config: &CompassCalibrationConfig| i64::from(config.target),
                    |config: &mut CompassCalibrationConfig, value| config.target = value as u8,
                ),
            )?
            .default_value("100");
        table
            .add(
                "require_thruster",
                Accessor::boolean(
                    |config: &CompassCalibrationConfig| config.require_thruster,
                    |config: &mut CompassCalibrationConfig, value| config.require_thruster = value,
                ),
            )?
            .default_value("true");
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Running { deadline_ms: Option<u64> },
    Completed,
    Failed,
}

#[derive(Debug)]
pub struct CompassCalibrationManeuver {
    phase: Phase,
    config: CompassCalibrationConfig,
    progress: u8,
}

impl Default for CompassCalibrationManeuver {
    fn default() -> Self {
        Self::new()
    }
}

impl CompassCalibrationManeuver {
    pub fn new() -> Self {
        Self {
            phase: Phase::NotStarted,
            config: CompassCalibrationConfig::default(),
            progress: 0,
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }
}

impl ManeuverBehavior for CompassCalibrationManeuver {
    type Config = CompassCalibrationConfig;

    fn start(&mut self, config: &CompassCalibrationConfig, now_ms: u64) -> ManeuverSignal {
        self.config = *config;
        self.progress = 0;

        if config.timeout > 0 {
            self.phase = Phase::Running {
                deadline_ms: Some(now_ms.saturating_add(u64::from(config.timeout) * 1000)),
            };
            ManeuverSignal::Progress {
                eta: Some(config.timeout),
            }
        } else {
            self.phase = Phase::Running { deadline_ms: None };
            ManeuverSignal::Progress { eta: None }
        }
    }

    fn tick(&mut self, now_ms: u64) -> Option<ManeuverSignal> {
        let Phase::Running { deadline_ms } = self.phase else {
            return None;
        };

        if self.progress >= self.config.target {
            self.phase = Phase::Completed;
            return Some(ManeuverSignal::Completed);
        }

        match deadline_ms {
            Some(deadline_ms) if now_ms > deadline_ms => {
                self.phase = Phase::Failed;
                Some(ManeuverSignal::Failed {
                    reason: format!(
                        "compass calibration timed out at {}% (target {}%)",
                        self.progress, self.config.target
                    ),
                })
            }
            Some(deadline_ms) => {
                let eta = u16::try_from((deadline_ms - now_ms) / 1000).unwrap_or(u16::MAX);
                Some(ManeuverSignal::Progress { eta: Some(eta) })
            }
            None => Some(ManeuverSignal::Progress { eta: None }),
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Completed | Phase::Failed)
    }

    fn memento(&self, now_ms: u64) -> CompassCalibrationConfig {
        match self.phase {
            Phase::Running {
                deadline_ms: Some(deadline_ms),
            } => CompassCalibrationConfig {
                timeout: seconds_left(deadline_ms, now_ms),
                ..self.config
            },
            _ => self.config,
        }
    }

    fn on_record(&mut self, record: &Record) {
        if let Record::CompassCalibration(msg) = record {
            self.progress = if self.config.require_thruster {
                msg.overall_progress()
            } else {
                msg.progress_xy.min(msg.progress_z)
            };
            debug!("compass calibration progress {}%", self.progress);
        }
    }
}
