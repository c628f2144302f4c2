use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    alarm::Alarm,
    communication::{Event, EventKind, EventSink},
    error::abort_on_lock_failure,
    pool::WorkerId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Active,
    Draining,
    Terminated,
}

#[derive(Debug)]
struct Assigned {
    alarm: Alarm,
    announced: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    alarms: Vec<Assigned>,
    draining: bool,
    closed: bool,
}

/// The alarms assigned to one worker, shared between that worker and the pool.
#[derive(Debug, Default)]
pub struct WorkerQueue {
    state: Mutex<QueueState>,
    closed: Condvar,
}

impl WorkerQueue {
    #[must_use]
    pub fn with_alarm(alarm: Alarm) -> Self {
        let queue = Self::default();
        queue.lock().alarms.push(Assigned {
            alarm,
            announced: false,
        });
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|_| abort_on_lock_failure("worker queue"))
    }

    /// Appends an alarm, handing it back if the worker has started draining.
    pub fn push(&self, alarm: Alarm) -> Result<(), Alarm> {
        let mut state = self.lock();
        if state.draining || state.closed {
            return Err(alarm);
        }
        state.alarms.push(Assigned {
            alarm,
            announced: false,
        });
        Ok(())
    }

    #[must_use]
    pub fn load(&self) -> usize {
        self.lock().alarms.len()
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.lock().alarms.iter().map(|a| a.alarm.id).collect()
    }

    /// Tells the worker to stop after its current sweep.
    pub fn close(&self) {
        self.lock().closed = true;
        self.closed.notify_all();
    }

    /// One pass over the queue. Expired alarms that were already shown once are removed,
    /// everything else is announced.
    fn sweep(&self, now: Instant, tick: Duration) -> Sweep {
        let mut state = self.lock();
        let mut announced = Vec::new();
        let mut retired = Vec::new();
        let mut kept = Vec::with_capacity(state.alarms.len());
        for mut assigned in state.alarms.drain(..) {
            if assigned.announced && assigned.alarm.is_due(now) {
                retired.push(assigned.alarm);
            } else {
                assigned.announced = true;
                announced.push((
                    assigned.alarm.clone(),
                    assigned.alarm.remaining_seconds(now, tick),
                ));
                kept.push(assigned);
            }
        }
        state.alarms = kept;
        // drained under the same lock push checks, so no work lands on a leaving worker
        if state.alarms.is_empty() {
            state.draining = true;
        }
        Sweep {
            announced,
            retired,
            drained: state.draining,
            closed: state.closed,
        }
    }

    /// Sleeps for `period` without holding the lock. Only closing the queue cuts it short.
    fn sleep(&self, period: Duration) {
        let state = self.lock();
        let _state = self
            .closed
            .wait_timeout_while(state, period, |state| !state.closed)
            .unwrap_or_else(|_| abort_on_lock_failure("worker queue"));
    }
}

#[derive(Debug)]
struct Sweep {
    announced: Vec<(Alarm, u64)>,
    retired: Vec<Alarm>,
    drained: bool,
    closed: bool,
}

#[derive(Debug)]
pub struct DisplayWorker {
    id: WorkerId,
    queue: Arc<WorkerQueue>,
    events: EventSink,
    period: Duration,
    tick: Duration,
    state: WorkerState,
}

impl DisplayWorker {
    #[must_use]
    pub const fn new(
        id: WorkerId,
        queue: Arc<WorkerQueue>,
        events: EventSink,
        period: Duration,
        tick: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            events,
            period,
            tick,
            state: WorkerState::Active,
        }
    }

    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Runs until the queue drains or is closed.
    pub fn run(mut self) -> WorkerState {
        log::debug!("display {} started", self.id);
        while self.state == WorkerState::Active {
            let sweep = self.queue.sweep(Instant::now(), self.tick);
            for (alarm, remaining_seconds) in &sweep.announced {
                self.events.emit(
                    Event::for_alarm(
                        EventKind::Announced {
                            remaining_seconds: *remaining_seconds,
                        },
                        alarm,
                    )
                    .on(self.id),
                );
            }
            for alarm in &sweep.retired {
                log::info!("alarm {} expired on display {}", alarm.id, self.id);
                self.events
                    .emit(Event::for_alarm(EventKind::Retired, alarm).on(self.id));
            }
            if sweep.drained {
                self.state = WorkerState::Draining;
            } else if sweep.closed {
                log::info!(
                    "display {} closed with {} alarms left",
                    self.id,
                    sweep.announced.len()
                );
                self.state = WorkerState::Draining;
            } else {
                self.queue.sleep(self.period);
            }
        }
        self.state = WorkerState::Terminated;
        log::debug!("display {} terminated", self.id);
        self.events
            .emit(Event::for_worker(EventKind::WorkerTerminated, self.id));
        self.state
    }
}
