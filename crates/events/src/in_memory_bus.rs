//! Channel-backed bus for a single process.
//!
//! Observers that attach after the worker started (a test asserting on the
//! final `WorkerStopping`, a debug console opened mid-run) can ask for the
//! last few events via [`InMemoryEventBus::with_replay`].

use std::collections::VecDeque;
use std::sync::{Mutex, mpsc};

use tracing::trace;

use crate::bus::{EventBus, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum InMemoryBusError {
    #[error("event bus lock poisoned")]
    Poisoned,
}

#[derive(Debug)]
struct Fanout<M> {
    senders: Vec<mpsc::Sender<M>>,
    recent: VecDeque<M>,
    published: u64,
}

/// Broadcasts each message to every live subscription.
///
/// Subscriptions whose receiver was dropped are pruned on the next publish.
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    replay: usize,
    fanout: Mutex<Fanout<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::with_replay(0)
    }

    /// Keep the last `replay` messages and hand them to each new subscriber.
    pub fn with_replay(replay: usize) -> Self {
        Self {
            replay,
            fanout: Mutex::new(Fanout {
                senders: Vec::new(),
                recent: VecDeque::with_capacity(replay),
                published: 0,
            }),
        }
    }

    /// Live subscriptions as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.lock().map(|f| f.senders.len()).unwrap_or(0)
    }

    /// Messages accepted since the bus was created.
    pub fn published(&self) -> u64 {
        self.fanout.lock().map(|f| f.published).unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut fanout = self.fanout.lock().map_err(|_| InMemoryBusError::Poisoned)?;

        let before = fanout.senders.len();
        fanout.senders.retain(|tx| tx.send(message.clone()).is_ok());
        let pruned = before - fanout.senders.len();
        if pruned > 0 {
            trace!(pruned, "dropped closed event subscriptions");
        }

        if self.replay > 0 {
            if fanout.recent.len() == self.replay {
                fanout.recent.pop_front();
            }
            fanout.recent.push_back(message);
        }
        fanout.published += 1;

        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();

        // On a poisoned lock the subscription is returned detached and stays empty.
        if let Ok(mut fanout) = self.fanout.lock() {
            for message in &fanout.recent {
                let _ = tx.send(message.clone());
            }
            fanout.senders.push(tx);
        }

        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_gets_a_copy() {
        let bus = InMemoryEventBus::<u32>::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7).unwrap();

        assert_eq!(a.drain(), vec![7]);
        assert_eq!(b.drain(), vec![7]);
        assert_eq!(bus.published(), 1);
    }

    #[test]
    fn closed_subscriptions_are_pruned() {
        let bus = InMemoryEventBus::<u32>::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(1).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain(), vec![1]);
    }

    #[test]
    fn without_replay_late_subscribers_start_empty() {
        let bus = InMemoryEventBus::<&'static str>::new();
        bus.publish("early").unwrap();

        let sub = bus.subscribe();
        bus.publish("late").unwrap();

        assert_eq!(sub.drain(), vec!["late"]);
    }

    #[test]
    fn replay_hands_recent_messages_to_late_subscribers() {
        let bus = InMemoryEventBus::<u32>::with_replay(2);
        for n in 1..=3 {
            bus.publish(n).unwrap();
        }

        let sub = bus.subscribe();
        bus.publish(4).unwrap();

        assert_eq!(sub.drain(), vec![2, 3, 4]);
        assert_eq!(bus.published(), 4);
    }
}
