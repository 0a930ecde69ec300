use super::event::Event;
use super::EventConsumer;
use crate::sync::Arc;
use crossbeam::deque::{Injector, Worker};

/// A multi-producer event bus. Cloning it hands out another sender to the same bus.
///
#[derive(Clone, Debug, Default)]
pub struct EventChannel {
    bus: Arc<Injector<Event>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bus.is_empty()
    }

    pub fn send<E>(&self, event: E)
    where
        E: Into<Event>,
    {
        self.bus.push(event.into())
    }

    pub fn consumer(&self) -> EventConsumer {
        EventConsumer::new(self.bus.clone(), Worker::new_fifo())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::*;

    #[test]
    fn new_event_channel_is_empty() {
        let ec = EventChannel::new();
        assert!(ec.is_empty());
        assert!(ec.consumer().is_empty());
    }

    #[quickcheck]
    fn event_consumer_needs_to_fetch_to_get_messages(event: Event) {
        let ec = EventChannel::new();
        let c = ec.consumer();
        ec.send(event);
        assert!(c.pop().is_none());
        c.fetch();
        assert!(c.pop().is_some());
    }

    #[quickcheck]
    fn events_are_drained_in_the_order_they_are_sent(events: Vec<Event>) {
        let ec = EventChannel::new();
        let c = ec.consumer();

        for event in &events {
            ec.send(event.clone());
        }

        assert_eq!(c.drain(), events);
        assert!(ec.is_empty());
        assert!(c.pop().is_none());
    }

    #[test]
    fn typed_events_are_wrapped() {
        let ec = EventChannel::new();
        let c = ec.consumer();
        ec.send(CacheEvent::CacheHit {
            key: "abc".to_string(),
        });
        ec.send(WorkflowEvent::Shutdown);
        assert_eq!(
            c.drain(),
            vec![
                Event::CacheEvent(CacheEvent::CacheHit {
                    key: "abc".to_string()
                }),
                Event::WorkflowEvent(WorkflowEvent::Shutdown),
            ]
        );
    }
}
