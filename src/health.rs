use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Normal,
    Error,
}

/// Edge produced by [`HealthMonitor::evaluate`]. Only emitted when the
/// status actually changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthTransition {
    ToError { elapsed_ms: u64 },
    ToNormal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthState {
    pub last_success_ms: u64,
    pub timeout_ms: u64,
    pub status: HealthStatus,
    pub missing_reported: bool,
}

/// Tracks the last successful decode and derives link staleness.
///
/// Times are milliseconds on the owning task's monotonic clock.
#[derive(Debug)]
pub struct HealthMonitor {
    state: HealthState,
}

impl HealthMonitor {
    pub fn new(start_ms: u64, timeout_ms: u64) -> Self {
        Self {
            state: HealthState {
                last_success_ms: start_ms,
                timeout_ms,
                status: HealthStatus::Normal,
                missing_reported: false,
            },
        }
    }

    pub fn on_success(&mut self, timestamp_ms: u64) {
        // Out-of-order timestamps never move the mark backwards.
        self.state.last_success_ms = self.state.last_success_ms.max(timestamp_ms);
        self.state.missing_reported = false;
    }

    pub fn evaluate(&mut self, now_ms: u64, timeout_ms: u64) -> Option<HealthTransition> {
        self.state.timeout_ms = timeout_ms;
        let elapsed_ms = now_ms.saturating_sub(self.state.last_success_ms);

        if elapsed_ms >= timeout_ms {
            if self.state.missing_reported || self.state.status == HealthStatus::Error {
                self.state.missing_reported = true;
                return None;
            }
            self.state.missing_reported = true;
            self.state.status = HealthStatus::Error;
            warn!("no data for {} ms (timeout {} ms)", elapsed_ms, timeout_ms);
            return Some(HealthTransition::ToError { elapsed_ms });
        }

        // The flag may already have been cleared by on_success; the status
        // still remembers the open episode until it is reported closed.
        let was_missing = self.state.status == HealthStatus::Error;
        self.state.missing_reported = false;
        self.state.status = HealthStatus::Normal;

        if was_missing {
            info!("data flow restored");
            Some(HealthTransition::ToNormal)
        } else {
            None
        }
    }

    /// Evaluates against the timeout given at construction.
    pub fn check(&mut self, now_ms: u64) -> Option<HealthTransition> {
        self.evaluate(now_ms, self.state.timeout_ms)
    }

    pub fn status(&self) -> HealthStatus {
        self.state.status
    }

    pub fn is_missing(&self) -> bool {
        self.state.missing_reported
    }

    pub fn last_success_ms(&self) -> u64 {
        self.state.last_success_ms
    }

    pub fn get_state(&self) -> &HealthState {
        &self.state
    }
}
