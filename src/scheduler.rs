use std::{
    io,
    sync::{Arc, Mutex},
    thread::JoinHandle,
};

use crate::{
    command::Command,
    communication::EventSink,
    config::Config,
    dispatcher::Dispatcher,
    error::{abort_on_lock_failure, AlarmError},
    pool::{WorkerId, WorkerPool},
    processor::CommandProcessor,
    registry::AlarmRegistry,
};

/// Owns the registry, the pool and the dispatcher thread.
#[derive(Debug)]
pub struct Scheduler {
    registry: Arc<AlarmRegistry>,
    pool: Arc<Mutex<WorkerPool>>,
    processor: CommandProcessor,
    dispatcher: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(config: &Config, events: EventSink) -> io::Result<Self> {
        let pool = WorkerPool::new(
            config.worker_capacity,
            events.clone(),
            config.display_period(),
            config.tick(),
        );
        Self::start_with_pool(config, events, pool)
    }

    pub fn start_with_pool(
        config: &Config,
        events: EventSink,
        pool: WorkerPool,
    ) -> io::Result<Self> {
        let registry = Arc::new(AlarmRegistry::new(config.head_order, config.tick()));
        let pool = Arc::new(Mutex::new(pool));
        let processor =
            CommandProcessor::new(Arc::clone(&registry), events.clone(), config.message_limit);
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&pool),
            events,
            config.idle_interval(),
        )
        .spawn()?;
        log::info!(
            "scheduler started with {} display slots",
            config.worker_capacity
        );
        Ok(Self {
            registry,
            pool,
            processor,
            dispatcher: Some(dispatcher),
        })
    }

    pub fn submit(&self, command: Command) -> Result<(), AlarmError> {
        self.processor.handle(command)
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<AlarmRegistry> {
        &self.registry
    }

    /// `(worker, load)` for every live display.
    #[must_use]
    pub fn loads(&self) -> Vec<(WorkerId, usize)> {
        self.with_pool(|pool| pool.loads())
    }

    #[must_use]
    pub fn assigned_ids(&self) -> Vec<(WorkerId, Vec<u64>)> {
        self.with_pool(|pool| pool.assigned_ids())
    }

    fn with_pool<T>(&self, f: impl FnOnce(&mut WorkerPool) -> T) -> T {
        let mut pool = self
            .pool
            .lock()
            .unwrap_or_else(|_| abort_on_lock_failure("worker pool"));
        f(&mut pool)
    }

    /// Stops the dispatcher, then closes every display and waits for it.
    pub fn shutdown(mut self) {
        self.registry.close();
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                log::error!("dispatcher panicked");
            }
        }
        self.with_pool(WorkerPool::shutdown);
        log::info!(
            "scheduler stopped with {} alarms pending",
            self.registry.len()
        );
    }
}
