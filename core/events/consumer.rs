use super::event::Event;
use crate::sync::Arc;
use crossbeam::deque::{Injector, Worker};

/// A single reader of an `EventChannel`. Events are moved in batches from the shared channel into
/// this consumer's local queue with `fetch`, and read from it with `pop`.
///
pub struct EventConsumer {
    channel: Arc<Injector<Event>>,
    queue: Worker<Event>,
}

impl EventConsumer {
    pub fn new(channel: Arc<Injector<Event>>, queue: Worker<Event>) -> Self {
        Self { channel, queue }
    }

    pub fn fetch(&self) {
        let _steal = self.channel.steal_batch(&self.queue);
    }

    pub fn pop(&self) -> Option<Event> {
        self.queue.pop()
    }

    /// Everything sent so far, in the order it was sent.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = vec![];
        loop {
            self.fetch();
            match self.pop() {
                Some(event) => events.push(event),
                None if self.channel.is_empty() => break,
                None => continue,
            }
        }
        events
    }

    pub fn is_empty(&self) -> bool {
        let _steal = self.channel.steal_batch(&self.queue);
        self.queue.is_empty()
    }
}

impl Iterator for &EventConsumer {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}
