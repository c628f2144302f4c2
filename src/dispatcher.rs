use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    communication::{Event, EventKind, EventSink},
    error::abort_on_lock_failure,
    pool::{Placement, WorkerPool},
    registry::{AlarmRegistry, Head},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// registry empty
    Idle,
    /// head not due yet
    Waiting,
    Dispatching,
    Stopped,
}

/// moves due alarms from the registry to the display pool
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<AlarmRegistry>,
    pool: Arc<Mutex<WorkerPool>>,
    events: EventSink,
    idle: Duration,
    state: DispatcherState,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(
        registry: Arc<AlarmRegistry>,
        pool: Arc<Mutex<WorkerPool>>,
        events: EventSink,
        idle: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            events,
            idle,
            state: DispatcherState::Idle,
        }
    }

    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) {
        log::info!("dispatcher started");
        while self.cycle() != DispatcherState::Stopped {}
        log::info!("dispatcher stopped");
    }

    fn pool(&self) -> MutexGuard<'_, WorkerPool> {
        self.pool
            .lock()
            .unwrap_or_else(|_| abort_on_lock_failure("worker pool"))
    }

    /// One pass: take the head if it is due and place it, or wait. The registry lock is only
    /// held inside `poll`, so a long wait never keeps commands out.
    pub fn cycle(&mut self) -> DispatcherState {
        let poll = self.registry.poll(Instant::now());
        self.state = match poll.head {
            Head::Closed => DispatcherState::Stopped,
            Head::Empty => {
                self.registry.wait_for_change(poll.generation, self.idle);
                DispatcherState::Idle
            }
            Head::NotYet { wait } => {
                log::trace!("head not due, waiting {wait:?}");
                self.registry.wait_for_change(poll.generation, wait);
                DispatcherState::Waiting
            }
            Head::Ready(alarm) => {
                let id = alarm.id;
                let dispatched = Event::for_alarm(EventKind::Dispatched, &alarm);
                let placement = self.pool().assign(alarm);
                match placement {
                    Placement::Assigned(worker) => {
                        log::info!("alarm {id} assigned to display {worker}");
                        self.events.emit(dispatched.on(worker));
                    }
                    Placement::Returned(alarm) => {
                        log::warn!("no display for alarm {id}, returning it to the registry");
                        let requeued = Event::for_alarm(EventKind::Requeued, &alarm);
                        match self.registry.requeue(alarm) {
                            Ok(()) => self.events.emit(requeued),
                            Err(e) => {
                                log::error!("couldn't requeue alarm {id}: {e}");
                                self.events.emit(Event::rejected(
                                    id,
                                    requeued.duration_seconds,
                                    &requeued.message,
                                    e.to_string(),
                                ));
                            }
                        }
                        // back off so a pool that cannot start workers is not hammered
                        thread::sleep(self.idle);
                    }
                }
                DispatcherState::Dispatching
            }
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use crate::{alarm::Alarm, config::HeadOrder, pool::Spawn, worker::DisplayWorker};

    use super::*;

    const TICK: Duration = Duration::from_millis(10);

    fn dispatcher(
        pool: WorkerPool,
    ) -> (
        Dispatcher,
        Arc<AlarmRegistry>,
        crossbeam_channel::Receiver<Event>,
    ) {
        let registry = Arc::new(AlarmRegistry::new(HeadOrder::Id, TICK));
        let (sink, events) = EventSink::channel();
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::new(Mutex::new(pool)),
            sink,
            TICK,
        );
        (dispatcher, registry, events)
    }

    #[test]
    fn test_states_follow_the_registry() {
        let (sink, _) = EventSink::channel();
        let (mut dispatcher, registry, events) =
            dispatcher(WorkerPool::new(3, sink, TICK * 5, TICK));
        assert_eq!(dispatcher.cycle(), DispatcherState::Idle);

        registry
            .insert(Alarm::new(1, 2, "x".to_string(), TICK))
            .unwrap();
        assert_eq!(dispatcher.cycle(), DispatcherState::Waiting);

        while dispatcher.cycle() != DispatcherState::Dispatching {}
        assert!(registry.is_empty());
        let dispatched = events.try_recv().unwrap();
        assert_eq!(dispatched.kind, EventKind::Dispatched);
        assert_eq!(dispatched.worker.unwrap().slot, 0);

        registry.close();
        assert_eq!(dispatcher.cycle(), DispatcherState::Stopped);
        dispatcher.pool().shutdown();
    }

    #[test]
    fn test_insert_is_not_blocked_while_dispatcher_waits() {
        let (sink, _) = EventSink::channel();
        let (dispatcher, registry, _events) =
            dispatcher(WorkerPool::new(3, sink, TICK * 5, TICK));
        registry
            .insert(Alarm::new(1, 100_000, "far".to_string(), TICK))
            .unwrap();
        let handle = dispatcher.spawn().unwrap();
        thread::sleep(TICK * 5);

        for id in 2..10 {
            let start = Instant::now();
            registry
                .insert(Alarm::new(id, 100_000, "x".to_string(), TICK))
                .unwrap();
            assert!(start.elapsed() < Duration::from_millis(500));
        }
        registry.close();
        handle.join().unwrap();
    }

    #[derive(Debug)]
    struct NoThreads;

    impl Spawn for NoThreads {
        fn spawn(&self, _worker: DisplayWorker) -> io::Result<JoinHandle<()>> {
            Err(io::Error::other("no threads"))
        }
    }

    #[test]
    fn test_unplaceable_alarm_goes_back_to_registry() {
        let (sink, _) = EventSink::channel();
        let pool = WorkerPool::with_spawner(3, sink, TICK, TICK, Box::new(NoThreads));
        let (mut dispatcher, registry, events) = dispatcher(pool);
        registry
            .insert(Alarm::new(4, 0, "x".to_string(), TICK))
            .unwrap();
        assert_eq!(dispatcher.cycle(), DispatcherState::Dispatching);
        assert_eq!(registry.ids(), vec![4]);
        assert_eq!(events.try_recv().unwrap().kind, EventKind::Requeued);
    }
}
