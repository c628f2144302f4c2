use std::sync::Arc;

use crate::{
    alarm::{clamp_message, Alarm},
    command::Command,
    communication::{Event, EventKind, EventSink},
    error::AlarmError,
    registry::AlarmRegistry,
};

/// Applies commands to the registry. Never dispatches, even an already overdue alarm
/// waits for the dispatcher's next cycle.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    registry: Arc<AlarmRegistry>,
    events: EventSink,
    message_limit: usize,
}

impl CommandProcessor {
    #[must_use]
    pub const fn new(registry: Arc<AlarmRegistry>, events: EventSink, message_limit: usize) -> Self {
        Self {
            registry,
            events,
            message_limit,
        }
    }

    /// Every outcome, accepted or rejected, is also published on the event sink.
    pub fn handle(&self, command: Command) -> Result<(), AlarmError> {
        match command {
            Command::Start {
                id,
                duration_seconds,
                message,
            } => self.start(id, duration_seconds, message),
            Command::Change {
                id,
                duration_seconds,
                message,
            } => self.change(id, duration_seconds, message),
        }
    }

    fn start(&self, id: u64, duration_seconds: u64, message: String) -> Result<(), AlarmError> {
        let message = clamp_message(message, self.message_limit);
        let alarm = Alarm::new(id, duration_seconds, message, self.registry.tick());
        let created = Event::for_alarm(EventKind::Created, &alarm);
        match self.registry.insert(alarm) {
            Ok(()) => {
                log::info!("alarm {id} inserted, due in {duration_seconds}s");
                self.events.emit(created);
                Ok(())
            }
            Err(e) => Err(self.reject(id, duration_seconds, &created.message, e)),
        }
    }

    fn change(&self, id: u64, duration_seconds: u64, message: String) -> Result<(), AlarmError> {
        let message = clamp_message(message, self.message_limit);
        match self.registry.update(id, duration_seconds, message.clone()) {
            Ok(alarm) => {
                log::info!("alarm {id} changed, due in {duration_seconds}s");
                self.events.emit(Event::for_alarm(EventKind::Changed, &alarm));
                Ok(())
            }
            Err(e) => Err(self.reject(id, duration_seconds, &message, e)),
        }
    }

    fn reject(&self, id: u64, duration_seconds: u64, message: &str, e: AlarmError) -> AlarmError {
        log::warn!("{e}");
        let reason = match &e {
            AlarmError::NotFound(_) => "no change made".to_string(),
            other => other.to_string(),
        };
        self.events
            .emit(Event::rejected(id, duration_seconds, message, reason));
        e
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::HeadOrder;

    use super::*;

    fn processor() -> (
        CommandProcessor,
        Arc<AlarmRegistry>,
        crossbeam_channel::Receiver<Event>,
    ) {
        let registry = Arc::new(AlarmRegistry::new(
            HeadOrder::Id,
            Duration::from_millis(10),
        ));
        let (sink, events) = EventSink::channel();
        (
            CommandProcessor::new(Arc::clone(&registry), sink, 128),
            registry,
            events,
        )
    }

    fn start(id: u64, duration_seconds: u64, message: &str) -> Command {
        Command::Start {
            id,
            duration_seconds,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let (processor, registry, events) = processor();
        processor.handle(start(1, 2, "ping")).unwrap();
        assert!(matches!(
            processor.handle(start(1, 5, "pong")),
            Err(AlarmError::DuplicateId(1))
        ));

        let alarm = registry.find_by_id(1).unwrap();
        assert_eq!((alarm.duration_seconds, alarm.message.as_str()), (2, "ping"));
        assert_eq!(events.try_recv().unwrap().kind, EventKind::Created);
        assert!(matches!(
            events.try_recv().unwrap().kind,
            EventKind::Rejected { .. }
        ));
    }

    #[test]
    fn test_change_unknown_id_reports_no_change() {
        let (processor, registry, events) = processor();
        let result = processor.handle(Command::Change {
            id: 9,
            duration_seconds: 3,
            message: "x".to_string(),
        });
        assert!(matches!(result, Err(AlarmError::NotFound(9))));
        assert!(registry.is_empty());
        assert_eq!(
            events.try_recv().unwrap().kind,
            EventKind::Rejected {
                reason: "no change made".to_string()
            }
        );
    }

    #[test]
    fn test_change_replaces_duration_and_message() {
        let (processor, registry, events) = processor();
        processor.handle(start(3, 100, "old")).unwrap();
        processor
            .handle(Command::Change {
                id: 3,
                duration_seconds: 1,
                message: "new".to_string(),
            })
            .unwrap();
        let alarm = registry.find_by_id(3).unwrap();
        assert_eq!(alarm.duration_seconds, 1);
        assert_eq!(alarm.message, "new");
        assert!(alarm.time_left(std::time::Instant::now()) <= Duration::from_millis(10));
        let kinds: Vec<_> = events.try_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Created, EventKind::Changed]);
    }

    #[test]
    fn test_long_message_is_truncated() {
        let (processor, registry, _events) = processor();
        processor.handle(start(1, 1, &"a".repeat(300))).unwrap();
        assert_eq!(registry.find_by_id(1).unwrap().message.len(), 128);
    }

    #[test]
    fn test_overdue_start_stays_in_registry() {
        let (processor, registry, _events) = processor();
        processor.handle(start(1, 0, "now")).unwrap();
        assert_eq!(registry.ids(), vec![1]);
    }
}
