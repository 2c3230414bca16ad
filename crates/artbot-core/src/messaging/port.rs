use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    messaging::types::{MessagingCapabilities, OutgoingMessage},
    Result,
};

/// Cross-messenger port.
///
/// Incoming reactions do not flow through this trait: adapters publish them to the
/// [`ReactionBroker`](crate::interaction::broker::ReactionBroker).
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// The bot's own user id, so its own reactions can be ignored.
    fn bot_user_id(&self) -> UserId;

    async fn send_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageRef>;
    async fn edit_message(&self, msg: MessageRef, content: &OutgoingMessage) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;
    async fn remove_reaction(&self, msg: MessageRef, emoji: &str, user: UserId) -> Result<()>;
    async fn remove_all_reactions(&self, msg: MessageRef) -> Result<()>;

    /// The interaction hosted on `msg` is over. Adapters drop any state kept for it;
    /// the message itself is left alone.
    async fn release(&self, _msg: MessageRef) {}
}
