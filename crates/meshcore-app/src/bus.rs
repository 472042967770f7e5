//! Pub/sub event bus for the script layer.
//!
//! Scripts decouple screens from protocol events by posting to named
//! topics. Delivery is deliberately asynchronous: `post` only enqueues,
//! and the queue drains at the start of the next tick. A handler
//! therefore never runs inside the `post` call that triggered it, which
//! keeps re-entrant script callbacks impossible by construction.
//!
//! Ordering: FIFO per subscriber, at-most-once per subscriber per post.

use std::collections::VecDeque;

/// Identifier returned by [`EventBus::subscribe`].
pub type SubscriptionId = u64;

/// Topic handler. Receives the topic (useful for wildcard-free reuse of
/// one handler across topics) and the payload bytes.
pub type BusHandler = Box<dyn FnMut(&str, &[u8])>;

struct Subscriber {
    id: SubscriptionId,
    topic: String,
    handler: BusHandler,
}

/// The event bus.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    queue: VecDeque<(String, Vec<u8>)>,
    next_id: SubscriptionId,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to a topic.
    pub fn subscribe(&mut self, topic: &str, handler: BusHandler) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.push(Subscriber { id, topic: topic.to_owned(), handler });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    /// Queue a message. Never delivers synchronously.
    pub fn post(&mut self, topic: &str, payload: &[u8]) {
        self.queue.push_back((topic.to_owned(), payload.to_vec()));
    }

    /// Deliver everything queued before this call. Messages posted by
    /// handlers during delivery wait for the next tick.
    pub fn dispatch(&mut self) {
        let batch = self.queue.len();
        for _ in 0..batch {
            let Some((topic, payload)) = self.queue.pop_front() else {
                return;
            };
            for subscriber in &mut self.subscribers {
                if subscriber.topic == topic {
                    (subscriber.handler)(&topic, &payload);
                }
            }
        }
    }

    /// Messages waiting for the next tick.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, BusHandler) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let handler: BusHandler = Box::new(move |topic, payload| {
            sink.borrow_mut().push(format!("{topic}:{}", String::from_utf8_lossy(payload)));
        });
        (log, handler)
    }

    #[test]
    fn post_is_never_synchronous() {
        let mut bus = EventBus::new();
        let (log, handler) = recorder();
        bus.subscribe("battery", handler);

        bus.post("battery", b"87");
        assert!(log.borrow().is_empty());

        bus.dispatch();
        assert_eq!(log.borrow().as_slice(), ["battery:87"]);
    }

    #[test]
    fn delivery_is_fifo() {
        let mut bus = EventBus::new();
        let (log, handler) = recorder();
        bus.subscribe("t", handler);

        bus.post("t", b"1");
        bus.post("t", b"2");
        bus.post("t", b"3");
        bus.dispatch();

        assert_eq!(log.borrow().as_slice(), ["t:1", "t:2", "t:3"]);
    }

    #[test]
    fn topics_are_isolated() {
        let mut bus = EventBus::new();
        let (log, handler) = recorder();
        bus.subscribe("a", handler);

        bus.post("b", b"x");
        bus.dispatch();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut bus = EventBus::new();
        let (log, handler) = recorder();
        let id = bus.subscribe("t", handler);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.post("t", b"x");
        bus.dispatch();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dispatch_drains_one_tick_worth() {
        let mut bus = EventBus::new();
        let (log, handler) = recorder();
        bus.subscribe("t", handler);

        bus.post("t", b"first");
        bus.dispatch();
        bus.post("t", b"second");

        assert_eq!(log.borrow().as_slice(), ["t:first"]);
        assert_eq!(bus.pending(), 1);

        bus.dispatch();
        assert_eq!(log.borrow().as_slice(), ["t:first", "t:second"]);
    }

    #[test]
    fn two_subscribers_each_get_one_copy() {
        let mut bus = EventBus::new();
        let (log_a, handler_a) = recorder();
        let (log_b, handler_b) = recorder();
        bus.subscribe("t", handler_a);
        bus.subscribe("t", handler_b);

        bus.post("t", b"x");
        bus.dispatch();

        assert_eq!(log_a.borrow().len(), 1);
        assert_eq!(log_b.borrow().len(), 1);
    }
}
