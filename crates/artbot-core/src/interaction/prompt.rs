use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    errors::Error,
    interaction::{Interactions, ReactionFilter},
    messaging::types::OutgoingMessage,
    Result,
};

pub const CONFIRM: &str = "✅";
pub const DECLINE: &str = "❎";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a prompt: the owner's choice, or nothing at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptOutcome<T> {
    Selected(T),
    TimedOut,
}

/// Answer to a yes/no prompt. `TimedOut` is never folded into `Declined`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
    TimedOut,
}

impl Confirmation {
    pub fn is_confirmed(self) -> bool {
        self == Confirmation::Confirmed
    }
}

impl From<PromptOutcome<bool>> for Confirmation {
    fn from(outcome: PromptOutcome<bool>) -> Self {
        match outcome {
            PromptOutcome::Selected(true) => Confirmation::Confirmed,
            PromptOutcome::Selected(false) => Confirmation::Declined,
            PromptOutcome::TimedOut => Confirmation::TimedOut,
        }
    }
}

/// Single-decision gate: a message with one reaction per option.
pub struct Prompt<T> {
    owner: UserId,
    channel: ChannelId,
    text: String,
    options: Vec<(String, T)>,
    timeout: Duration,
}

impl Prompt<bool> {
    pub fn confirm(owner: UserId, channel: ChannelId, text: impl Into<String>) -> Self {
        Prompt::new(owner, channel, text)
            .option(CONFIRM, true)
            .option(DECLINE, false)
    }
}

impl<T: Send> Prompt<T> {
    pub fn new(owner: UserId, channel: ChannelId, text: impl Into<String>) -> Self {
        Self {
            owner,
            channel,
            text: text.into(),
            options: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Map a reaction glyph to an outcome. Reactions are attached in insertion order.
    pub fn option(mut self, glyph: impl Into<String>, value: T) -> Self {
        let glyph = glyph.into();
        self.options.retain(|(g, _)| *g != glyph);
        self.options.push((glyph, value));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(mut self, ctx: &Interactions) -> Result<PromptOutcome<T>> {
        if self.options.is_empty() {
            return Err(Error::Validation("prompt has no options".to_string()));
        }

        let msg = ctx
            .messenger
            .send_message(self.channel, &OutgoingMessage::text(self.text.clone()))
            .await?;

        let glyphs: Vec<String> = self.options.iter().map(|(g, _)| g.clone()).collect();
        let filter = ReactionFilter::new(
            msg,
            self.owner,
            ctx.messenger.bot_user_id(),
            glyphs.clone(),
        );
        // Subscribe before attaching so a fast click is not lost.
        let sub = ctx.broker.subscribe_once(move |ev| filter.matches(ev));

        for glyph in &glyphs {
            if let Err(e) = ctx.messenger.add_reaction(msg, glyph).await {
                discard(ctx, msg).await;
                return Err(e);
            }
        }

        let event = sub.recv_timeout(self.timeout).await;
        let deleted = ctx.messenger.delete_message(msg).await;
        ctx.messenger.release(msg).await;
        deleted?;

        let Some(event) = event else {
            debug!(owner = %self.owner, "prompt timed out");
            return Ok(PromptOutcome::TimedOut);
        };

        match self.options.iter().position(|(g, _)| *g == event.emoji) {
            Some(idx) => Ok(PromptOutcome::Selected(self.options.swap_remove(idx).1)),
            None => Ok(PromptOutcome::TimedOut),
        }
    }
}

async fn discard(ctx: &Interactions, msg: MessageRef) {
    if let Err(e) = ctx.messenger.delete_message(msg).await {
        warn!("failed to delete aborted prompt: {e}");
    }
    ctx.messenger.release(msg).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        interaction::broker::ReactionBroker,
        testing::{react, FakeMessenger, BOT},
    };

    const OWNER: UserId = UserId(5);

    fn setup() -> (Arc<FakeMessenger>, Interactions) {
        let fake = Arc::new(FakeMessenger::new());
        let ctx = Interactions::new(fake.clone(), ReactionBroker::new());
        (fake, ctx)
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Pick {
        Left,
        Right,
    }

    #[tokio::test(start_paused = true)]
    async fn returns_mapped_outcome_and_deletes_prompt() {
        let (fake, ctx) = setup();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                Prompt::new(OWNER, ChannelId(1), "left or right?")
                    .option("⬅", Pick::Left)
                    .option("➡", Pick::Right)
                    .run(&ctx)
                    .await
            })
        };

        crate::testing::wait_for_subscriber(&ctx.broker).await;
        let host = fake.sent()[0].0;
        assert_eq!(fake.reactions_on(host), vec!["⬅", "➡"]);

        // Noise: wrong user, the bot, unmapped glyph, another message.
        assert_eq!(react(&ctx.broker, host, "➡", UserId(6)).await, 0);
        assert_eq!(react(&ctx.broker, host, "➡", BOT).await, 0);
        assert_eq!(react(&ctx.broker, host, "👍", OWNER).await, 0);
        let other = MessageRef {
            channel_id: ChannelId(1),
            message_id: crate::domain::MessageId(host.message_id.0 + 100),
        };
        assert_eq!(react(&ctx.broker, other, "➡", OWNER).await, 0);

        assert_eq!(react(&ctx.broker, host, "➡", OWNER).await, 1);
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, PromptOutcome::Selected(Pick::Right));
        assert_eq!(*fake.deletes.lock().unwrap(), vec![host]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_distinct_from_decline() {
        let (fake, ctx) = setup();
        let answer = ctx
            .confirm(OWNER, ChannelId(1), "sure?", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(answer, Confirmation::TimedOut);
        assert!(!answer.is_confirmed());
        assert_eq!(fake.deletes.lock().unwrap().len(), 1);
        assert_eq!(ctx.broker.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_decline() {
        let (fake, ctx) = setup();
        let task = {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.confirm(OWNER, ChannelId(1), "sure?", Duration::from_secs(10))
                    .await
            })
        };
        crate::testing::wait_for_subscriber(&ctx.broker).await;
        let host = fake.sent()[0].0;
        react(&ctx.broker, host, DECLINE, OWNER).await;
        assert_eq!(task.await.unwrap().unwrap(), Confirmation::Declined);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_sending() {
        let (fake, ctx) = setup();
        let err = Prompt::<bool>::new(OWNER, ChannelId(1), "?")
            .run(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(fake.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_propagates() {
        let (fake, ctx) = setup();
        fake.fail_sends_after(0);
        let err = ctx
            .confirm(OWNER, ChannelId(1), "sure?", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Platform(_)));
        assert_eq!(ctx.broker.pending(), 0);
    }
}
