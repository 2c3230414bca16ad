//! One-shot reaction subscriptions.
//!
//! Every prompt or widget wait registers its own subscription with a predicate; the
//! platform adapter publishes each incoming reaction once and the broker resolves every
//! registration whose predicate accepts it. A resolved registration is discarded.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use tokio::sync::oneshot;

use crate::messaging::types::ReactionEvent;

type Predicate = Box<dyn Fn(&ReactionEvent) -> bool + Send + Sync>;

struct Registration {
    predicate: Predicate,
    tx: oneshot::Sender<ReactionEvent>,
}

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    subs: HashMap<u64, Registration>,
}

#[derive(Default)]
pub struct ReactionBroker {
    state: Mutex<BrokerState>,
}

impl ReactionBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a one-shot wait for the next event accepted by `predicate`.
    ///
    /// Dropping the returned [`Subscription`] unregisters it.
    pub fn subscribe_once<F>(self: &Arc<Self>, predicate: F) -> Subscription
    where
        F: Fn(&ReactionEvent) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut st = self.state();
        let id = st.next_id;
        st.next_id += 1;
        st.subs.insert(
            id,
            Registration {
                predicate: Box::new(predicate),
                tx,
            },
        );

        Subscription {
            id,
            broker: Arc::downgrade(self),
            rx,
        }
    }

    /// Deliver `event` to every matching subscriber. Returns how many were resolved.
    pub fn publish(&self, event: ReactionEvent) -> usize {
        let mut st = self.state();
        let matched: Vec<u64> = st
            .subs
            .iter()
            .filter(|(_, reg)| (reg.predicate)(&event))
            .map(|(id, _)| *id)
            .collect();

        let mut delivered = 0;
        for id in matched {
            let Some(reg) = st.subs.remove(&id) else {
                continue;
            };
            // A closed receiver means the waiter gave up between matching and sending.
            if reg.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live registrations.
    pub fn pending(&self) -> usize {
        self.state().subs.len()
    }

    fn unregister(&self, id: u64) {
        self.state().subs.remove(&id);
    }
}

/// A pending one-shot wait registered with a [`ReactionBroker`].
pub struct Subscription {
    id: u64,
    broker: Weak<ReactionBroker>,
    rx: oneshot::Receiver<ReactionEvent>,
}

impl Subscription {
    /// Wait for the event. `None` if the broker went away.
    pub async fn recv(mut self) -> Option<ReactionEvent> {
        (&mut self.rx).await.ok()
    }

    /// Wait for the event for at most `timeout`. `None` on timeout.
    pub async fn recv_timeout(mut self, timeout: Duration) -> Option<ReactionEvent> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(ev)) => Some(ev),
            _ => None,
        }
    }

    /// Give up waiting and unregister.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unregister(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChannelId, MessageId, MessageRef, UserId};

    fn ev(message: i32, emoji: &str) -> ReactionEvent {
        ReactionEvent {
            message: MessageRef {
                channel_id: ChannelId(1),
                message_id: MessageId(message),
            },
            emoji: emoji.to_string(),
            user_id: UserId(1),
        }
    }

    fn on_message(id: i32) -> impl Fn(&ReactionEvent) -> bool + Send + Sync + 'static {
        move |e: &ReactionEvent| e.message.message_id == MessageId(id)
    }

    #[tokio::test]
    async fn resolves_only_matching_subscribers_once() {
        let broker = ReactionBroker::new();
        let a = broker.subscribe_once(on_message(1));
        let b = broker.subscribe_once(on_message(2));
        assert_eq!(broker.pending(), 2);

        assert_eq!(broker.publish(ev(1, "▶")), 1);
        assert_eq!(broker.pending(), 1);
        // One-shot: a second event for message 1 has nobody left to resolve.
        assert_eq!(broker.publish(ev(1, "◀")), 0);

        assert_eq!(a.recv().await.unwrap().emoji, "▶");
        assert_eq!(broker.publish(ev(2, "⏹")), 1);
        assert_eq!(b.recv().await.unwrap().emoji, "⏹");
        assert_eq!(broker.pending(), 0);
    }

    #[tokio::test]
    async fn same_event_resolves_every_independent_registration() {
        let broker = ReactionBroker::new();
        let a = broker.subscribe_once(on_message(1));
        let b = broker.subscribe_once(on_message(1));

        assert_eq!(broker.publish(ev(1, "✅")), 2);
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_and_cancel_unregister() {
        let broker = ReactionBroker::new();

        let sub = broker.subscribe_once(on_message(1));
        assert!(sub.recv_timeout(Duration::from_secs(5)).await.is_none());
        assert_eq!(broker.pending(), 0);

        let sub = broker.subscribe_once(on_message(1));
        assert_eq!(broker.pending(), 1);
        sub.cancel();
        assert_eq!(broker.pending(), 0);
        assert_eq!(broker.publish(ev(1, "▶")), 0);
    }

    #[tokio::test]
    async fn concurrent_waiters_each_get_their_own_event() {
        let broker = ReactionBroker::new();
        let mut handles = Vec::new();
        for id in 0..20 {
            let sub = broker.subscribe_once(on_message(id));
            handles.push(tokio::spawn(async move {
                sub.recv().await.map(|e| e.message.message_id)
            }));
        }
        for id in (0..20).rev() {
            assert_eq!(broker.publish(ev(id, "▶")), 1);
        }
        for (id, h) in handles.into_iter().enumerate() {
            assert_eq!(h.await.unwrap(), Some(MessageId(id as i32)));
        }
    }
}
