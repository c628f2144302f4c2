use std::{
    fmt, io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    alarm::Alarm,
    communication::{Event, EventKind, EventSink},
    error::AlarmError,
    worker::{DisplayWorker, WorkerQueue},
};

/// Identifies a worker: the pool slot it lives in and a serial number that is never reused,
/// so a fresh worker in an old slot is distinguishable from its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub slot: usize,
    pub serial: u64,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} (slot {})", self.serial, self.slot)
    }
}

/// Starts the thread a display worker runs on.
pub trait Spawn: fmt::Debug + Send {
    fn spawn(&self, worker: DisplayWorker) -> io::Result<JoinHandle<()>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawn for ThreadSpawner {
    fn spawn(&self, worker: DisplayWorker) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("display-{}", worker.id().serial))
            .spawn(move || {
                worker.run();
            })
    }
}

#[derive(Debug)]
struct Slot {
    id: WorkerId,
    queue: Arc<WorkerQueue>,
    handle: JoinHandle<()>,
}

/// Where an alarm ended up after [`WorkerPool::assign`].
#[derive(Debug)]
#[must_use]
pub enum Placement {
    Assigned(WorkerId),
    /// no worker could take it, the caller gets it back
    Returned(Alarm),
}

#[derive(Debug)]
pub struct WorkerPool {
    slots: Vec<Option<Slot>>,
    spawner: Box<dyn Spawn>,
    events: EventSink,
    next_serial: u64,
    period: Duration,
    tick: Duration,
}

impl WorkerPool {
    #[must_use]
    pub fn new(capacity: usize, events: EventSink, period: Duration, tick: Duration) -> Self {
        Self::with_spawner(capacity, events, period, tick, Box::new(ThreadSpawner))
    }

    #[must_use]
    pub fn with_spawner(
        capacity: usize,
        events: EventSink,
        period: Duration,
        tick: Duration,
        spawner: Box<dyn Spawn>,
    ) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            spawner,
            events,
            next_serial: 0,
            period,
            tick,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Hands `alarm` to a worker. A new worker is started while the pool is below capacity,
    /// otherwise the live worker with the fewest alarms gets it, ties going to the lowest slot.
    pub fn assign(&mut self, mut alarm: Alarm) -> Placement {
        loop {
            self.reclaim();
            if let Some(slot) = self.free_slot() {
                match self.spawn_into(slot, alarm) {
                    Ok(id) => return Placement::Assigned(id),
                    Err((returned, e)) => {
                        log::warn!("{e}, falling back to existing displays");
                        alarm = returned;
                    }
                }
            }
            let Some(slot) = self.least_loaded() else {
                return Placement::Returned(alarm);
            };
            let Some(target) = self.slots[slot].as_ref() else {
                return Placement::Returned(alarm);
            };
            match target.queue.push(alarm) {
                Ok(()) => return Placement::Assigned(target.id),
                // drained between the load check and the push, pick again
                Err(returned) => alarm = returned,
            }
        }
    }

    /// Frees the slots of workers that have drained. Their threads are joined first so a slot
    /// never holds two workers.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        for slot in &mut self.slots {
            if !slot.as_ref().is_some_and(|s| s.queue.is_draining()) {
                continue;
            }
            if let Some(Slot { id, handle, .. }) = slot.take() {
                if handle.join().is_err() {
                    log::error!("display {id} panicked");
                }
                log::debug!("reclaimed slot {} from display {id}", id.slot);
                reclaimed += 1;
            }
        }
        reclaimed
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn least_loaded(&self) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref()
                    .filter(|s| !s.queue.is_draining())
                    .map(|s| (s.queue.load(), index))
            })
            .min()
            .map(|(_, index)| index)
    }

    fn spawn_into(&mut self, slot: usize, alarm: Alarm) -> Result<WorkerId, (Alarm, AlarmError)> {
        self.next_serial += 1;
        let id = WorkerId {
            slot,
            serial: self.next_serial,
        };
        let queue = Arc::new(WorkerQueue::with_alarm(alarm.clone()));
        let worker = DisplayWorker::new(
            id,
            Arc::clone(&queue),
            self.events.clone(),
            self.period,
            self.tick,
        );
        match self.spawner.spawn(worker) {
            Ok(handle) => {
                log::info!("display {id} created for alarm {}", alarm.id);
                self.slots[slot] = Some(Slot { id, queue, handle });
                self.events
                    .emit(Event::for_alarm(EventKind::WorkerCreated, &alarm).on(id));
                Ok(id)
            }
            Err(source) => {
                let e = AlarmError::WorkerCreation { worker: id, source };
                self.events.emit(
                    Event::for_worker(
                        EventKind::WorkerFailed {
                            reason: e.to_string(),
                        },
                        id,
                    ),
                );
                Err((alarm, e))
            }
        }
    }

    /// `(worker, load)` for every live worker, by slot.
    #[must_use]
    pub fn loads(&self) -> Vec<(WorkerId, usize)> {
        self.slots
            .iter()
            .flatten()
            .map(|s| (s.id, s.queue.load()))
            .collect()
    }

    /// Ids held by each live worker, by slot.
    #[must_use]
    pub fn assigned_ids(&self) -> Vec<(WorkerId, Vec<u64>)> {
        self.slots
            .iter()
            .flatten()
            .map(|s| (s.id, s.queue.ids()))
            .collect()
    }

    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Closes every queue and waits for the workers to exit.
    pub fn shutdown(&mut self) {
        for slot in self.slots.iter().flatten() {
            slot.queue.close();
        }
        for Slot { id, handle, .. } in self.slots.iter_mut().filter_map(Option::take) {
            if handle.join().is_err() {
                log::error!("display {id} panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const TICK: Duration = Duration::from_millis(10);

    #[derive(Debug)]
    struct FailingSpawner;

    impl Spawn for FailingSpawner {
        fn spawn(&self, _worker: DisplayWorker) -> io::Result<JoinHandle<()>> {
            Err(io::Error::other("no threads left"))
        }
    }

    /// Fails once the pool already has `limit` workers started through it.
    #[derive(Debug)]
    struct LimitedSpawner {
        limit: u64,
        started: std::sync::atomic::AtomicU64,
    }

    impl Spawn for LimitedSpawner {
        fn spawn(&self, worker: DisplayWorker) -> io::Result<JoinHandle<()>> {
            use std::sync::atomic::Ordering;
            if self.started.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(io::Error::other("limit"));
            }
            ThreadSpawner.spawn(worker)
        }
    }

    fn long_alarm(id: u64) -> Alarm {
        Alarm::new(id, 10_000, format!("alarm {id}"), TICK)
    }

    fn pool(capacity: usize) -> (WorkerPool, crossbeam_channel::Receiver<Event>) {
        let (sink, events) = EventSink::channel();
        (WorkerPool::new(capacity, sink, TICK * 5, TICK), events)
    }

    #[test]
    fn test_fills_slots_then_least_loaded() {
        let (mut pool, _events) = pool(3);
        let slots: Vec<_> = (10..14)
            .map(|id| match pool.assign(long_alarm(id)) {
                Placement::Assigned(worker) => worker.slot,
                Placement::Returned(_) => panic!("alarm {id} returned"),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0]);
        let loads: Vec<_> = pool.loads().into_iter().map(|(_, load)| load).collect();
        assert_eq!(loads, vec![2, 1, 1]);
        pool.shutdown();
    }

    #[test]
    fn test_assignment_goes_to_a_minimum_load() {
        let (mut pool, _events) = pool(3);
        for id in 0..20 {
            let before = pool.loads();
            let Placement::Assigned(worker) = pool.assign(long_alarm(id)) else {
                panic!("alarm {id} returned");
            };
            if before.len() == 3 {
                let min = before.iter().map(|(_, load)| *load).min().unwrap();
                let chosen = before.iter().find(|(w, _)| *w == worker).unwrap().1;
                assert_eq!(chosen, min);
            }
        }
        assert_eq!(pool.live_workers(), 3);
        pool.shutdown();
    }

    #[test]
    fn test_no_alarm_held_twice() {
        let (mut pool, _events) = pool(2);
        for id in 0..7 {
            let _ = pool.assign(long_alarm(id));
        }
        let mut ids: Vec<_> = pool
            .assigned_ids()
            .into_iter()
            .flat_map(|(_, ids)| ids)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..7).collect::<Vec<_>>());
        pool.shutdown();
    }

    #[test]
    fn test_creation_failure_with_no_workers_returns_alarm() {
        let (sink, events) = EventSink::channel();
        let mut pool = WorkerPool::with_spawner(3, sink, TICK, TICK, Box::new(FailingSpawner));
        match pool.assign(long_alarm(1)) {
            Placement::Returned(alarm) => assert_eq!(alarm.id, 1),
            Placement::Assigned(worker) => panic!("assigned to {worker}"),
        }
        assert!(events
            .try_iter()
            .any(|e| matches!(e.kind, EventKind::WorkerFailed { .. })));
    }

    #[test]
    fn test_creation_failure_falls_back_to_existing_worker() {
        let (sink, _events) = EventSink::channel();
        let spawner = LimitedSpawner {
            limit: 1,
            started: 0.into(),
        };
        let mut pool = WorkerPool::with_spawner(3, sink, TICK * 5, TICK, Box::new(spawner));
        let Placement::Assigned(first) = pool.assign(long_alarm(1)) else {
            panic!("first alarm returned");
        };
        let Placement::Assigned(second) = pool.assign(long_alarm(2)) else {
            panic!("second alarm returned");
        };
        assert_eq!(first, second);
        assert_eq!(pool.loads(), vec![(first, 2)]);
        pool.shutdown();
    }

    #[test]
    fn test_drained_slot_gets_a_new_worker() {
        let (mut pool, _events) = pool(1);
        let Placement::Assigned(first) = pool.assign(Alarm::new(1, 0, "x".into(), TICK)) else {
            panic!("returned");
        };
        // announced on the first sweep, retired on the second
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.loads().iter().any(|(_, load)| *load > 0) && Instant::now() < deadline {
            std::thread::sleep(TICK);
        }
        let Placement::Assigned(second) = pool.assign(long_alarm(2)) else {
            panic!("returned");
        };
        assert_eq!(second.slot, first.slot);
        assert_ne!(second.serial, first.serial);
        pool.shutdown();
    }
}
