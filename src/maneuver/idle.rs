use super::{seconds_left, ManeuverBehavior, ManeuverSignal};
use crate::memento::{Accessor, MementoError, MementoTable};
use serde::{Deserialize, Serialize};

/// `duration` is in seconds; zero idles until replaced or stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleConfig {
    pub duration: u16,
}

impl IdleConfig {
    pub fn memento_table() -> Result<MementoTable<IdleConfig>, MementoError> {
        let mut table = MementoTable::<IdleConfig>::new();
        table
            .add(
                "duration",
                Accessor::integer(
                    0,
                    i64::from(u16::MAX),
                    |config: &IdleConfig| i64::from(config.duration),
                    |config: &mut IdleConfig, value| config.duration = value as u16,
                ),
            )?
            .default_value("0");
        Ok(table)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    NotStarted,
    Unbounded,
    Until { end_ms: u64 },
    Completed,
}

#[derive(Debug)]
pub struct Idle {
    phase: Phase,
    config: IdleConfig,
}

impl Default for Idle {
    fn default() -> Self {
        Self::new()
    }
}

impl Idle {
    pub fn new() -> Self {
        Self {
            phase: Phase::NotStarted,
            config: IdleConfig::default(),
        }
    }

    pub fn end_time_ms(&self) -> Option<u64> {
        match self.phase {
            Phase::Until { end_ms } => Some(end_ms),
            _ => None,
        }
    }
}

impl ManeuverBehavior for Idle {
    type Config = IdleConfig;

    fn start(&mut self, config: &IdleConfig, now_ms: u64) -> ManeuverSignal {
        self.config = *config;

        if config.duration > 0 {
            self.phase = Phase::Until {
                end_ms: now_ms.saturating_add(u64::from(config.duration) * 1000),
            };
            ManeuverSignal::Progress {
                eta: Some(config.duration),
            }
        } else {
            self.phase = Phase::Unbounded;
            ManeuverSignal::Progress { eta: None }
        }
    }

    fn tick(&mut self, now_ms: u64) -> Option<ManeuverSignal> {
        match self.phase {
            Phase::NotStarted | Phase::Completed => None,
            Phase::Unbounded => Some(ManeuverSignal::Progress { eta: None }),
            Phase::Until { end_ms } => {
                if now_ms > end_ms {
                    self.phase = Phase::Completed;
                    Some(ManeuverSignal::Completed)
                } else {
                    let eta = u16::try_from((end_ms - now_ms) / 1000).unwrap_or(u16::MAX);
                    Some(ManeuverSignal::Progress { eta: Some(eta) })
                }
            }
        }
    }

    fn is_done(&self) -> bool {
        self.phase == Phase::Completed
    }

    fn memento(&self, now_ms: u64) -> IdleConfig {
        match self.phase {
            Phase::Until { end_ms } => IdleConfig {
                duration: seconds_left(end_ms, now_ms),
            },
            Phase::Unbounded => IdleConfig { duration: 0 },
            Phase::NotStarted | Phase::Completed => self.config,
        }
    }
}
