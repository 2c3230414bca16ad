//! Shared fakes for unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    artwork::{Artwork, ArtworkProvider},
    domain::{ChannelId, MessageId, MessageRef, UserId},
    errors::Error,
    interaction::broker::ReactionBroker,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, OutgoingMessage, ReactionEvent},
    },
    Result,
};

pub const BOT: UserId = UserId(999);

#[derive(Default)]
pub struct FakeMessenger {
    next_id: AtomicI32,
    fail_sends_after: Mutex<Option<usize>>,
    send_calls: AtomicUsize,
    pub sends: Mutex<Vec<(MessageRef, OutgoingMessage)>>,
    pub edits: Mutex<Vec<(MessageRef, OutgoingMessage)>>,
    pub deletes: Mutex<Vec<MessageRef>>,
    pub reactions: Mutex<Vec<(MessageRef, String)>>,
    pub removed_reactions: Mutex<Vec<(MessageRef, String, UserId)>>,
    pub cleared: Mutex<Vec<MessageRef>>,
    pub released: Mutex<Vec<MessageRef>>,
    /// Behave like a platform whose reactions cannot be removed per user.
    shared_reactions: bool,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            ..Self::default()
        }
    }

    pub fn with_shared_reactions(mut self) -> Self {
        self.shared_reactions = true;
        self
    }

    /// Let the first `n` sends succeed, fail every later one.
    pub fn fail_sends_after(&self, n: usize) {
        *self.fail_sends_after.lock().unwrap() = Some(n);
    }

    pub fn sent(&self) -> Vec<(MessageRef, OutgoingMessage)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|(_, m)| match m {
                OutgoingMessage::Text(t) => t,
                OutgoingMessage::Embed(e) => e.title,
            })
            .collect()
    }

    pub fn reactions_on(&self, msg: MessageRef) -> Vec<String> {
        self.reactions
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == msg)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_reaction_removal: !self.shared_reactions,
        }
    }

    fn bot_user_id(&self) -> UserId {
        BOT
    }

    async fn send_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageRef> {
        let call = self.send_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_sends_after.lock().unwrap() {
            if call >= limit {
                return Err(Error::Platform("send rejected".to_string()));
            }
        }
        let r = MessageRef {
            channel_id: channel,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        };
        self.sends.lock().unwrap().push((r, msg.clone()));
        Ok(r)
    }

    async fn edit_message(&self, msg: MessageRef, content: &OutgoingMessage) -> Result<()> {
        self.edits.lock().unwrap().push((msg, content.clone()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.reactions.lock().unwrap().push((msg, emoji.to_string()));
        Ok(())
    }

    async fn remove_reaction(&self, msg: MessageRef, emoji: &str, user: UserId) -> Result<()> {
        self.removed_reactions
            .lock()
            .unwrap()
            .push((msg, emoji.to_string(), user));
        Ok(())
    }

    async fn remove_all_reactions(&self, msg: MessageRef) -> Result<()> {
        self.cleared.lock().unwrap().push(msg);
        Ok(())
    }

    async fn release(&self, msg: MessageRef) {
        self.released.lock().unwrap().push(msg);
    }
}

/// Yield until at least one subscription is registered on the broker.
///
/// Yielding keeps the test task runnable, so a paused clock never auto-advances here.
pub async fn wait_for_subscriber(broker: &ReactionBroker) {
    for _ in 0..10_000 {
        if broker.pending() > 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("no subscriber registered");
}

/// Wait for a subscriber, then publish a reaction to `message` and return how many were resolved.
pub async fn react(
    broker: &ReactionBroker,
    message: MessageRef,
    emoji: &str,
    user: UserId,
) -> usize {
    wait_for_subscriber(broker).await;
    broker.publish(ReactionEvent {
        message,
        emoji: emoji.to_string(),
        user_id: user,
    })
}

/// Provider serving a fixed set of artworks. Unknown ids are `NotFound`.
#[derive(Default)]
pub struct FakeProvider {
    artworks: HashMap<String, Artwork>,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn with(artworks: Vec<Artwork>) -> Self {
        Self {
            artworks: artworks.into_iter().map(|a| (a.id.clone(), a)).collect(),
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ArtworkProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn match_links(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .filter_map(|w| w.strip_prefix("fake://"))
            .map(str::to_string)
            .collect()
    }

    async fn find(&self, id: &str) -> Result<Artwork> {
        self.lookups.lock().unwrap().push(id.to_string());
        self.artworks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("artwork {id}")))
    }
}
