#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(
    clippy::use_self,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::missing_panics_doc
)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

pub mod alarm;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod pool;
pub mod processor;
/// the shared, lock protected store of pending alarms
pub mod registry;
pub mod scheduler;
pub mod worker;

/// events published for the display/log side
pub mod communication;

pub use alarm::Alarm;
pub use command::Command;
pub use communication::{Event, EventKind, EventSink};
pub use config::{Config, HeadOrder};
pub use error::{AlarmError, ConfigError, ParseError};
pub use scheduler::Scheduler;
