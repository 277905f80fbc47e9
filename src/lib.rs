//! # Pioneer Link
//!
//! Task runtime for an underwater vehicle link: keeps a TCP and a UDP
//! transport to the vehicle open, decodes its binary telemetry, reports when
//! data stops arriving, and runs commanded maneuvers against a message bus.
//!
//! ## Features
//!
//! - **Dual-transport link**: TCP stream plus UDP datagrams, reconnect on any read failure
//! - **Frame decoding**: fixed-length, opcode-dispatched big-endian records with one-byte resync
//! - **Staleness monitoring**: edge-triggered missing-data and recovery reports
//! - **Maneuvers**: idle and compass calibration state machines with stop/resume
//! - **Parameter mementos**: `name=value` tuple tables for saving maneuver configuration
//! - **Bounded buffers**: fixed 2 kB receive windows and `heapless` collections
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pioneer_link::{ChannelBus, PioneerTask, StopFlag, TaskConfig};
//!
//! # async fn example() -> Result<(), pioneer_link::TaskError> {
//! let (mut bus, _handle) = ChannelBus::pair();
//! let mut task = PioneerTask::new(TaskConfig::default())?;
//! let stop = StopFlag::new();
//!
//! let stats = task.run(&mut bus, &stop).await;
//! println!("decoded {} records", stats.records_decoded);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`protocol`] - Opcode table, record layouts, decoder and frame scanner
//! - [`link`] - TCP/UDP link manager
//! - [`health`] - Last-success tracking and staleness edges
//! - [`maneuver`] - Maneuver state machines and the controller
//! - [`memento`] - Parameter binding tables
//! - [`bus`] - Bus trait and the in-process channel bus
//! - [`runtime`] - The `Control.Pioneer` task loop
//! - [`registry`] - Task-type registry
//! - [`config`] - Task configuration

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod bus;
pub mod config;
pub mod health;
pub mod link;
pub mod maneuver;
pub mod memento;
pub mod protocol;
pub mod registry;
pub mod runtime;

// Re-export main public types for convenience
pub use bus::{Bus, BusEvent, BusHandle, BusMessage, ChannelBus, EntityState, StatusCode};
pub use config::{ConfigError, TaskConfig};
pub use health::{HealthMonitor, HealthStatus, HealthTransition};
pub use link::{LinkConfig, LinkError, LinkManager, LinkState, Transport};
pub use maneuver::{ManeuverCommand, ManeuverController, ManeuverKind, ManeuverSignal};
pub use memento::{Accessor, MementoError, MementoTable};
pub use protocol::{decode, DecodeError, FrameScanner, Opcode, Record};
pub use registry::{RegistryError, Task, TaskRegistry};
pub use runtime::{PioneerTask, StopFlag, TaskError, TaskStats};
