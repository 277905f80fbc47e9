use crate::bus::{Bus, EntityState, StatusCode};
use crate::config::TaskConfig;
use crate::maneuver::{ManeuverController, ManeuverSignal};
use crate::runtime::{PioneerTask, StopFlag, TaskError};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const PIONEER_TASK: &str = "Control.Pioneer";
pub const MANEUVER_TASK: &str = "Maneuver.Multiplexer";

pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'a>>;
pub type TaskConstructor = fn(TaskConfig) -> Result<Box<dyn Task>, TaskError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("task type {0} already registered")]
    Duplicate(String),
    #[error("unknown task type {0}")]
    Unknown(String),
}

/// An independently scheduled unit of work.
pub trait Task: Send {
    fn name(&self) -> &str;

    fn run<'a>(&'a mut self, bus: &'a mut (dyn Bus + Send), stop: &'a StopFlag) -> TaskFuture<'a>;
}

/// Maps task-type names to constructors.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    constructors: BTreeMap<String, TaskConstructor>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every task type this crate provides.
    pub fn with_builtin() -> Self {
        let mut constructors: BTreeMap<String, TaskConstructor> = BTreeMap::new();
        constructors.insert(PIONEER_TASK.to_string(), |config| Ok(Box::new(PioneerTask::new(config)?)));
        constructors.insert(MANEUVER_TASK.to_string(), |config| Ok(Box::new(ManeuverTask::new(config)?)));
        Self { constructors }
    }

    pub fn register(&mut self, name: &str, constructor: TaskConstructor) -> Result<(), RegistryError> {
        if self.constructors.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        debug!("registered task type {}", name);
        self.constructors.insert(name.to_string(), constructor);
        Ok(())
    }

    pub fn create(&self, name: &str, config: TaskConfig) -> Result<Box<dyn Task>, TaskError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        constructor(config)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl Task for PioneerTask {
    fn name(&self) -> &str {
        PIONEER_TASK
    }

    fn run<'a>(&'a mut self, bus: &'a mut (dyn Bus + Send), stop: &'a StopFlag) -> TaskFuture<'a> {
        Box::pin(async move {
            PioneerTask::run(self, bus, stop).await;
            Ok(())
        })
    }
}

/// Runs maneuvers from bus commands without owning a vehicle link.
#[derive(Debug)]
pub struct ManeuverTask {
    controller: ManeuverController,
    idle_delay: Duration,
    started: tokio::time::Instant,
}

impl ManeuverTask {
    pub fn new(config: TaskConfig) -> Result<Self, TaskError> {
        config.validate()?;
        Ok(Self {
            controller: ManeuverController::new()?,
            idle_delay: config.poll_timeout(),
            started: tokio::time::Instant::now(),
        })
    }

    pub fn controller(&self) -> &ManeuverController {
        &self.controller
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Handles everything queued on the bus.
    pub fn step(&mut self, bus: &mut (dyn Bus + Send)) {
        use crate::bus::BusMessage;

        for message in bus.consume_messages() {
            let now_ms = self.now_ms();
            let signal = match message {
                BusMessage::StartManeuver(command) => Some(self.controller.start(&command, now_ms)),
                BusMessage::StopManeuver => {
                    if let Ok(saved) = self.controller.stop(now_ms) {
                        bus.publish_memento(saved.kind, &saved.tuples);
                    }
                    None
                }
                BusMessage::ResumeManeuver { kind, tuples } => Some(self.controller.resume(kind, &tuples, now_ms).0),
                BusMessage::StateReport => self.controller.tick(now_ms),
            };

            match signal {
                Some(ManeuverSignal::Progress { eta }) => bus.signal_progress(eta),
                Some(ManeuverSignal::Completed) => bus.signal_completion(),
                Some(ManeuverSignal::Failed { reason }) => bus.signal_error(&reason),
                None => {}
            }
        }
    }
}

impl Task for ManeuverTask {
    fn name(&self) -> &str {
        MANEUVER_TASK
    }

    fn run<'a>(&'a mut self, bus: &'a mut (dyn Bus + Send), stop: &'a StopFlag) -> TaskFuture<'a> {
        Box::pin(async move {
            info!("task {} starting", MANEUVER_TASK);
            bus.set_entity_state(EntityState::Normal, StatusCode::Idle);
            while !stop.is_stopped() {
                self.step(bus);
                tokio::time::sleep(self.idle_delay).await;
            }
            Ok(())
        })
    }
}
