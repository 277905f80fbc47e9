use crate::bus::{Bus, BusMessage, EntityState, StatusCode};
use crate::config::{ConfigError, TaskConfig};
use crate::health::{HealthMonitor, HealthStatus};
use crate::link::{LinkError, LinkManager, LinkState, Transport};
use crate::maneuver::{ManeuverController, ManeuverError, ManeuverSignal};
use crate::protocol::{FrameScanner, Record, COMPASS_CALIBRATION_LEN, RX_BUFFER_SIZE};
use crate::registry::RegistryError;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Upper bound on records in one receive window.
const MAX_RECORDS_PER_READ: usize = RX_BUFFER_SIZE / COMPASS_CALIBRATION_LEN;

type RecordBatch = Vec<Record, MAX_RECORDS_PER_READ>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("link: {0}")]
    Link(#[from] LinkError),
    #[error("maneuver: {0}")]
    Maneuver(#[from] ManeuverError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
}

/// Cooperative stop request shared between a task and whoever owns it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub iterations: u64,
    pub bytes_received: u64,
    pub records_decoded: u64,
    pub bytes_skipped: u64,
    pub short_frames: u64,
    pub connect_failures: u64,
    pub read_errors: u64,
    pub bus_messages: u64,
}

struct ReceiveBuffer {
    data: [u8; RX_BUFFER_SIZE],
    /// Bytes carried over from the previous read.
    len: usize,
}

impl ReceiveBuffer {
    fn new() -> Self {
        Self {
            data: [0; RX_BUFFER_SIZE],
            len: 0,
        }
    }
}

/// The `Control.Pioneer` task: keeps the vehicle link up, decodes its
/// telemetry, reports staleness and runs commanded maneuvers.
pub struct PioneerTask {
    config: TaskConfig,
    link: LinkManager,
    health: HealthMonitor,
    maneuvers: ManeuverController,
    stream_rx: ReceiveBuffer,
    datagram_rx: ReceiveBuffer,
    entity: Option<(EntityState, StatusCode)>,
    stats: TaskStats,
    started: Instant,
}

impl PioneerTask {
    pub fn new(config: TaskConfig) -> Result<Self, TaskError> {
        config.validate()?;
        let timeout_ms = config.comm_timeout_ms();

        Ok(Self {
            link: LinkManager::new(config.link.clone()),
            health: HealthMonitor::new(0, timeout_ms),
            maneuvers: ManeuverController::new()?,
            stream_rx: ReceiveBuffer::new(),
            datagram_rx: ReceiveBuffer::new(),
            entity: None,
            stats: TaskStats::default(),
            started: Instant::now(),
            config,
        })
    }

    /// Milliseconds since the task was created.
    pub fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn link(&self) -> &LinkManager {
        &self.link
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn maneuvers(&self) -> &ManeuverController {
        &self.maneuvers
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    pub fn entity_state(&self) -> Option<(EntityState, StatusCode)> {
        self.entity
    }

    /// Runs until `stop` is set, then releases the link.
    pub async fn run<B: Bus + ?Sized>(&mut self, bus: &mut B, stop: &StopFlag) -> TaskStats {
        info!("task {} starting", self.config.task);
        self.publish_entity(bus, EntityState::Boot, StatusCode::Initializing);

        while !stop.is_stopped() {
            self.step(bus).await;
        }

        self.link.close();
        info!("task {} stopped after {} iterations", self.config.task, self.stats.iterations);
        self.stats
    }

    /// One loop iteration: link upkeep, transport drains, health, bus.
    pub async fn step<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        self.stats.iterations += 1;

        if self.link.state() == LinkState::Disconnected && !self.try_connect().await {
            self.publish_entity(bus, EntityState::Normal, StatusCode::ComError);
            self.process_messages(bus);
            tokio::time::sleep(self.config.idle_delay()).await;
            return;
        }

        if self.drain_stream(bus).await.is_ok() {
            // A failed stream read already reconnected both transports.
            if let Err(e) = self.drain_datagram(bus).await {
                debug!("datagram drain ended: {}", e);
            }
        }

        self.update_health(bus);
        self.process_messages(bus);
    }

    async fn try_connect(&mut self) -> bool {
        match self.link.connect().await {
            Ok(()) => {
                self.stream_rx.len = 0;
                true
            }
            Err(_) => {
                self.stats.connect_failures += 1;
                false
            }
        }
    }

    /// Close then reopen, before anything reads from the link again.
    async fn reconnect(&mut self) {
        self.link.close();
        self.stream_rx.len = 0;
        if !self.try_connect().await {
            warn!("reconnect failed; retrying next iteration");
        }
    }

    async fn drain_stream<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<(), LinkError> {
        for _ in 0..self.config.max_drain {
            if !self.link.poll(Transport::Stream, self.config.poll_timeout()).await {
                break;
            }

            let carried = self.stream_rx.len;
            let n = match self.link.read_stream(&mut self.stream_rx.data[carried..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("TCP read failed: {}", e);
                    self.stats.read_errors += 1;
                    self.reconnect().await;
                    return Err(e);
                }
            };

            let filled = carried + n;
            let mut batch = RecordBatch::new();
            let consumed = scan(&self.stream_rx.data[..filled], &mut batch, &mut self.stats);
            self.stream_rx.data.copy_within(consumed..filled, 0);
            self.stream_rx.len = filled - consumed;

            self.stats.bytes_received += n as u64;
            self.dispatch(bus, &batch);
        }
        Ok(())
    }

    async fn drain_datagram<B: Bus + ?Sized>(&mut self, bus: &mut B) -> Result<(), LinkError> {
        for _ in 0..self.config.max_drain {
            if !self.link.poll(Transport::Datagram, self.config.poll_timeout()).await {
                break;
            }

            let n = match self.link.read_datagram(&mut self.datagram_rx.data) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("UDP read failed: {}", e);
                    self.stats.read_errors += 1;
                    self.reconnect().await;
                    return Err(e);
                }
            };

            // A datagram is complete on arrival; its tail is never carried.
            let mut batch = RecordBatch::new();
            let consumed = scan(&self.datagram_rx.data[..n], &mut batch, &mut self.stats);
            if consumed < n {
                warn!("UDP datagram dropped {} trailing byte(s)", n - consumed);
            }

            self.stats.bytes_received += n as u64;
            self.dispatch(bus, &batch);
        }
        Ok(())
    }

    fn dispatch<B: Bus + ?Sized>(&mut self, bus: &mut B, batch: &RecordBatch) {
        if batch.is_empty() {
            return;
        }

        let now_ms = self.now_ms();
        for record in batch {
            self.health.on_success(now_ms);
            self.stats.records_decoded += 1;
            self.maneuvers.on_record(record);
            bus.publish_record(record);
        }
    }

    fn update_health<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        let now_ms = self.now_ms();
        if let Some(transition) = self.health.evaluate(now_ms, self.config.comm_timeout_ms()) {
            debug!("health transition {:?}", transition);
        }

        let (state, code) = match (self.link.state(), self.health.status()) {
            (LinkState::Disconnected, _) => (EntityState::Normal, StatusCode::ComError),
            (LinkState::Connected, HealthStatus::Error) => (EntityState::Error, StatusCode::MissingData),
            (LinkState::Connected, HealthStatus::Normal) => (EntityState::Normal, StatusCode::Active),
        };
        self.publish_entity(bus, state, code);
    }

    /// Publishes only when the state actually changes.
    fn publish_entity<B: Bus + ?Sized>(&mut self, bus: &mut B, state: EntityState, code: StatusCode) {
        if self.entity == Some((state, code)) {
            return;
        }
        debug!("entity state {:?} ({})", state, code);
        self.entity = Some((state, code));
        bus.set_entity_state(state, code);
    }

    fn process_messages<B: Bus + ?Sized>(&mut self, bus: &mut B) {
        for message in bus.consume_messages() {
            self.stats.bus_messages += 1;
            let now_ms = self.now_ms();

            match message {
                BusMessage::StartManeuver(command) => {
                    let signal = self.maneuvers.start(&command, now_ms);
                    publish_signal(bus, signal);
                }
                BusMessage::StopManeuver => match self.maneuvers.stop(now_ms) {
                    Ok(saved) => bus.publish_memento(saved.kind, &saved.tuples),
                    Err(e) => debug!("stop ignored: {}", e),
                },
                BusMessage::ResumeManeuver { kind, tuples } => {
                    let (signal, report) = self.maneuvers.resume(kind, &tuples, now_ms);
                    if !report.is_clean() {
                        warn!("resumed {} with {} bad tuple(s)", kind, report.failures.len());
                    }
                    publish_signal(bus, signal);
                }
                BusMessage::StateReport => {
                    if let Some(signal) = self.maneuvers.tick(now_ms) {
                        publish_signal(bus, signal);
                    }
                }
            }
        }
    }
}

impl Drop for PioneerTask {
    fn drop(&mut self) {
        self.link.close();
    }
}

/// Decodes `window` into `batch` and returns how many bytes were consumed.
fn scan(window: &[u8], batch: &mut RecordBatch, stats: &mut TaskStats) -> usize {
    let mut scanner = FrameScanner::new(window);
    for record in scanner.by_ref() {
        if batch.push(record).is_err() {
            break;
        }
    }

    stats.bytes_skipped += scanner.skipped() as u64;
    if scanner.incomplete().is_some() {
        stats.short_frames += 1;
    }
    scanner.offset()
}

fn publish_signal<B: Bus + ?Sized>(bus: &mut B, signal: ManeuverSignal) {
    match signal {
        ManeuverSignal::Progress { eta } => bus.signal_progress(eta),
        ManeuverSignal::Completed => bus.signal_completion(),
        ManeuverSignal::Failed { reason } => bus.signal_error(&reason),
    }
}
