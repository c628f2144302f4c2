use std::io;

use thiserror::Error;

use crate::pool::WorkerId;

/// Errors produced by the registry, the command processor and the worker pool.
#[derive(Debug, Error)]
pub enum AlarmError {
    /// A `Start` named an id that is already pending.
    #[error("alarm {0} already exists")]
    DuplicateId(u64),

    /// A `Change` named an id that is not pending.
    #[error("alarm {0} not found, no change made")]
    NotFound(u64),

    /// The pool could not start a display thread.
    #[error("couldn't create display worker {worker}: {source}")]
    WorkerCreation {
        worker: WorkerId,
        #[source]
        source: io::Error,
    },

    /// A shared lock was poisoned by a panicking thread.
    #[error("lock failure on {0}")]
    LockFailure(&'static str),
}

/// Rejection of a malformed command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Bad command")]
pub struct ParseError {
    pub line: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't access config file: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("couldn't serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("couldn't find a home directory for the config file")]
    NoHome,

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Lock failures leave the shared state inconsistent, so the process stops here.
pub(crate) fn abort_on_lock_failure(what: &'static str) -> ! {
    log::error!("{}", AlarmError::LockFailure(what));
    std::process::abort()
}
