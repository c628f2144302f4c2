use std::{
    collections::BTreeMap,
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    alarm::Alarm,
    config::HeadOrder,
    error::{abort_on_lock_failure, AlarmError},
};

#[derive(Debug, Default)]
struct State {
    alarms: BTreeMap<u64, Alarm>,
    // bumped by every mutation so a waiting dispatcher can tell it missed nothing
    generation: u64,
    closed: bool,
}

/// What the dispatcher found at the head of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Empty,
    NotYet { wait: Duration },
    /// the head was due and has been removed
    Ready(Alarm),
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poll {
    pub head: Head,
    pub generation: u64,
}

/// pending alarms keyed by id, nothing sleeps while holding the lock
#[derive(Debug)]
pub struct AlarmRegistry {
    state: Mutex<State>,
    changed: Condvar,
    order: HeadOrder,
    tick: Duration,
}

impl AlarmRegistry {
    #[must_use]
    pub fn new(order: HeadOrder, tick: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            changed: Condvar::new(),
            order,
            tick,
        }
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        self.tick
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|_| abort_on_lock_failure("alarm registry"))
    }

    fn head_id(&self, alarms: &BTreeMap<u64, Alarm>) -> Option<u64> {
        match self.order {
            HeadOrder::Id => alarms.keys().next().copied(),
            HeadOrder::Due => alarms
                .values()
                .min_by_key(|alarm| (alarm.due_at, alarm.id))
                .map(|alarm| alarm.id),
        }
    }

    fn mutated(&self, state: &mut State) {
        state.generation += 1;
        self.changed.notify_all();
    }

    pub fn insert(&self, alarm: Alarm) -> Result<(), AlarmError> {
        let mut state = self.lock();
        if state.alarms.contains_key(&alarm.id) {
            return Err(AlarmError::DuplicateId(alarm.id));
        }
        state.alarms.insert(alarm.id, alarm);
        self.mutated(&mut state);
        Ok(())
    }

    /// Puts back an alarm the pool could not place. Fails if the id was started again
    /// while the alarm was out of the registry.
    pub fn requeue(&self, alarm: Alarm) -> Result<(), AlarmError> {
        self.insert(alarm)
    }

    pub fn find_by_id(&self, id: u64) -> Result<Alarm, AlarmError> {
        self.lock()
            .alarms
            .get(&id)
            .cloned()
            .ok_or(AlarmError::NotFound(id))
    }

    /// Changes an alarm in place and returns the updated copy. The alarm keeps its place.
    pub fn update(
        &self,
        id: u64,
        duration_seconds: u64,
        message: String,
    ) -> Result<Alarm, AlarmError> {
        let mut state = self.lock();
        let alarm = state.alarms.get_mut(&id).ok_or(AlarmError::NotFound(id))?;
        alarm.reschedule(duration_seconds, message, self.tick);
        let updated = alarm.clone();
        self.mutated(&mut state);
        Ok(updated)
    }

    /// Removes and returns the head if it is due at `now`, otherwise leaves the registry as is.
    pub fn take_earliest_ready(&self, now: Instant) -> Option<Alarm> {
        match self.poll(now).head {
            Head::Ready(alarm) => Some(alarm),
            _ => None,
        }
    }

    #[must_use]
    pub fn peek_head(&self) -> Option<Alarm> {
        let state = self.lock();
        self.head_id(&state.alarms)
            .and_then(|id| state.alarms.get(&id).cloned())
    }

    /// One dispatcher cycle: look at the head and take it out if it is due.
    pub fn poll(&self, now: Instant) -> Poll {
        let mut state = self.lock();
        let generation = state.generation;
        if state.closed {
            return Poll {
                head: Head::Closed,
                generation,
            };
        }
        let Some(id) = self.head_id(&state.alarms) else {
            return Poll {
                head: Head::Empty,
                generation,
            };
        };
        let wait = state
            .alarms
            .get(&id)
            .filter(|alarm| !alarm.is_due(now))
            .map(|alarm| alarm.time_left(now));
        let head = if let Some(wait) = wait {
            Head::NotYet { wait }
        } else {
            match state.alarms.remove(&id) {
                Some(alarm) => {
                    state.generation += 1;
                    Head::Ready(alarm)
                }
                None => Head::Empty,
            }
        };
        Poll {
            head,
            generation: state.generation,
        }
    }

    /// Blocks for at most `timeout`, returning early when the registry changed after
    /// `seen_generation` or was closed. The lock is released while blocked.
    pub fn wait_for_change(&self, seen_generation: u64, timeout: Duration) {
        let state = self.lock();
        let _state = self
            .changed
            .wait_timeout_while(state, timeout, |state| {
                state.generation == seen_generation && !state.closed
            })
            .unwrap_or_else(|_| abort_on_lock_failure("alarm registry"));
    }

    /// Stops the dispatcher on its next cycle.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        self.mutated(&mut state);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().alarms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.lock().alarms.keys().copied().collect()
    }
}
