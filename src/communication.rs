use std::fmt;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender};

use crate::{alarm::Alarm, pool::WorkerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Changed,
    Dispatched,
    Announced { remaining_seconds: u64 },
    Retired,
    WorkerCreated,
    WorkerTerminated,
    WorkerFailed { reason: String },
    // pool had no worker at all, the alarm went back to the registry
    Requeued,
    Rejected { reason: String },
}

/// one observation for the display/log side
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Local>,
    pub kind: EventKind,
    pub alarm_id: Option<u64>,
    pub duration_seconds: u64,
    pub message: String,
    pub worker: Option<WorkerId>,
}

impl Event {
    #[must_use]
    pub fn for_alarm(kind: EventKind, alarm: &Alarm) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            alarm_id: Some(alarm.id),
            duration_seconds: alarm.duration_seconds,
            message: alarm.message.clone(),
            worker: None,
        }
    }

    #[must_use]
    pub fn for_worker(kind: EventKind, worker: WorkerId) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            alarm_id: None,
            duration_seconds: 0,
            message: String::new(),
            worker: Some(worker),
        }
    }

    #[must_use]
    pub fn rejected(alarm_id: u64, duration_seconds: u64, message: &str, reason: String) -> Self {
        Self {
            timestamp: Local::now(),
            kind: EventKind::Rejected { reason },
            alarm_id: Some(alarm_id),
            duration_seconds,
            message: message.to_string(),
            worker: None,
        }
    }

    #[must_use]
    pub fn on(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.timestamp.format("%H:%M:%S");
        let id = self.alarm_id.unwrap_or_default();
        let worker = self.worker.map_or_else(String::new, |w| w.to_string());
        match &self.kind {
            EventKind::Created => write!(
                f,
                "[{at}] Alarm({id}) inserted: {} {}",
                self.duration_seconds, self.message
            ),
            EventKind::Changed => write!(
                f,
                "[{at}] Alarm({id}) changed: {} {}",
                self.duration_seconds, self.message
            ),
            EventKind::Dispatched => {
                write!(f, "[{at}] Alarm({id}) assigned to display {worker}")
            }
            EventKind::Announced { remaining_seconds } => write!(
                f,
                "[{at}] Alarm({id}) display {worker}: {remaining_seconds}s left: {}",
                self.message
            ),
            EventKind::Retired => write!(
                f,
                "[{at}] Alarm({id}) expired on display {worker}: ({}) {}",
                self.duration_seconds, self.message
            ),
            EventKind::WorkerCreated => write!(f, "[{at}] Display {worker} created"),
            EventKind::WorkerTerminated => write!(f, "[{at}] Display {worker} terminated"),
            EventKind::WorkerFailed { reason } => {
                write!(f, "[{at}] Display {worker} failed to start: {reason}")
            }
            EventKind::Requeued => {
                write!(f, "[{at}] Alarm({id}) returned to the registry, no display available")
            }
            EventKind::Rejected { reason } => write!(f, "[{at}] Alarm({id}) rejected: {reason}"),
        }
    }
}

/// Cloneable handle every thread uses to publish events.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: Sender<Event>,
}

impl EventSink {
    #[must_use]
    pub const fn new(sender: Sender<Event>) -> Self {
        Self { sender }
    }

    #[must_use]
    pub fn channel() -> (Self, Receiver<Event>) {
        let (s, r) = crossbeam_channel::unbounded();
        (Self::new(s), r)
    }

    pub fn emit(&self, event: Event) {
        // nobody listening is fine, the scheduler keeps running
        if let Err(e) = self.sender.send(event) {
            log::debug!("event dropped, no receiver: {:?}", e.into_inner().kind);
        }
    }
}
