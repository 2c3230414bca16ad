//! Reaction-driven interactions: the event broker and the prompt/widget loops built on it.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    messaging::{port::MessagingPort, types::ReactionEvent},
    Result,
};

pub mod broker;
pub mod prompt;
pub mod widget;

use broker::ReactionBroker;
use prompt::{Confirmation, Prompt, PromptOutcome};
use widget::{Widget, WidgetState};

/// Messenger + broker pair every interaction needs.
#[derive(Clone)]
pub struct Interactions {
    pub messenger: Arc<dyn MessagingPort>,
    pub broker: Arc<ReactionBroker>,
}

impl Interactions {
    pub fn new(messenger: Arc<dyn MessagingPort>, broker: Arc<ReactionBroker>) -> Self {
        Self { messenger, broker }
    }

    /// Post `prompt` and block until its owner picks an option or the timeout elapses.
    pub async fn run_prompt<T: Send>(&self, prompt: Prompt<T>) -> Result<PromptOutcome<T>> {
        prompt.run(self).await
    }

    /// ✅/❎ question with an explicit three-valued answer.
    pub async fn confirm(
        &self,
        owner: UserId,
        channel: ChannelId,
        text: impl Into<String>,
        timeout: Duration,
    ) -> Result<Confirmation> {
        let outcome = Prompt::confirm(owner, channel, text)
            .timeout(timeout)
            .run(self)
            .await?;
        Ok(outcome.into())
    }

    /// Run a paginated widget in `channel` until it is stopped or expires.
    pub async fn run_widget(&self, widget: Widget, channel: ChannelId) -> Result<WidgetState> {
        widget.run(self, channel).await
    }
}

/// Decides whether a reaction event may drive an interaction hosted on `message`.
#[derive(Clone, Debug)]
pub struct ReactionFilter {
    message: MessageRef,
    owner: UserId,
    bot: UserId,
    glyphs: Vec<String>,
}

impl ReactionFilter {
    pub fn new(message: MessageRef, owner: UserId, bot: UserId, glyphs: Vec<String>) -> Self {
        Self {
            message,
            owner,
            bot,
            glyphs,
        }
    }

    pub fn matches(&self, ev: &ReactionEvent) -> bool {
        ev.message == self.message
            && ev.user_id != self.bot
            && ev.user_id == self.owner
            && self.glyphs.iter().any(|g| *g == ev.emoji)
    }
}
