//! Reaction-controlled multi-page viewer.

use std::time::Duration;

use tracing::debug;

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    interaction::{Interactions, ReactionFilter},
    messaging::types::OutgoingMessage,
    Result,
};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Pages are skipped in steps of this size, and the skip controls only appear above it.
const SKIP: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WidgetAction {
    FirstPage,
    FiveDown,
    PreviousPage,
    Stop,
    NextPage,
    FiveUp,
    LastPage,
}

impl WidgetAction {
    pub fn glyph(self) -> &'static str {
        match self {
            WidgetAction::FirstPage => "⏮",
            WidgetAction::FiveDown => "⏪",
            WidgetAction::PreviousPage => "◀",
            WidgetAction::Stop => "⏹",
            WidgetAction::NextPage => "▶",
            WidgetAction::FiveUp => "⏩",
            WidgetAction::LastPage => "⏭",
        }
    }

    pub fn from_glyph(glyph: &str) -> Option<Self> {
        [
            WidgetAction::FirstPage,
            WidgetAction::FiveDown,
            WidgetAction::PreviousPage,
            WidgetAction::Stop,
            WidgetAction::NextPage,
            WidgetAction::FiveUp,
            WidgetAction::LastPage,
        ]
        .into_iter()
        .find(|a| a.glyph() == glyph)
    }
}

/// Terminal (or current) state of a widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetState {
    Active,
    Stopped,
    Expired,
}

/// Called after every successful navigation with the action and the new page index.
pub type WidgetCallback = Box<dyn FnMut(WidgetAction, usize) -> Result<()> + Send>;

pub struct Widget {
    owner: UserId,
    pages: Vec<OutgoingMessage>,
    current: usize,
    state: WidgetState,
    idle_timeout: Duration,
    callback: Option<WidgetCallback>,
}

impl Widget {
    pub fn new(owner: UserId, pages: Vec<OutgoingMessage>) -> Self {
        Self {
            owner,
            pages,
            current: 0,
            state: WidgetState::Active,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            callback: None,
        }
    }

    pub fn with_callback(
        mut self,
        callback: impl FnMut(WidgetAction, usize) -> Result<()> + Send + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Controls attached to the host message, in display order.
    pub fn controls(&self) -> Vec<WidgetAction> {
        if self.len() <= 1 {
            return Vec::new();
        }
        let skips = self.len() > SKIP;
        let mut out = vec![WidgetAction::FirstPage];
        if skips {
            out.push(WidgetAction::FiveDown);
        }
        out.extend([
            WidgetAction::PreviousPage,
            WidgetAction::Stop,
            WidgetAction::NextPage,
        ]);
        if skips {
            out.push(WidgetAction::FiveUp);
        }
        out.push(WidgetAction::LastPage);
        out
    }

    /// Apply a navigation action. Returns the resulting page index.
    pub fn apply(&mut self, action: WidgetAction) -> usize {
        let last = self.len().saturating_sub(1);
        self.current = match action {
            WidgetAction::FirstPage => 0,
            WidgetAction::FiveDown => self.current.saturating_sub(SKIP),
            WidgetAction::PreviousPage => self.current.saturating_sub(1),
            WidgetAction::NextPage => (self.current + 1).min(last),
            WidgetAction::FiveUp => (self.current + SKIP).min(last),
            WidgetAction::LastPage => last,
            WidgetAction::Stop => {
                self.state = WidgetState::Stopped;
                self.current
            }
        };
        self.current
    }

    /// Render page 0 and process control reactions until stopped or idle for too long.
    pub async fn run(mut self, ctx: &Interactions, channel: ChannelId) -> Result<WidgetState> {
        if self.is_empty() {
            return Ok(WidgetState::Stopped);
        }

        let host = ctx.messenger.send_message(channel, &self.pages[0]).await?;
        if self.len() == 1 {
            return Ok(WidgetState::Stopped);
        }

        let result = self.drive(ctx, host).await;
        ctx.messenger.release(host).await;
        result
    }

    async fn drive(&mut self, ctx: &Interactions, host: MessageRef) -> Result<WidgetState> {
        let controls = self.controls();
        let filter = ReactionFilter::new(
            host,
            self.owner,
            ctx.messenger.bot_user_id(),
            controls.iter().map(|a| a.glyph().to_string()).collect(),
        );
        let subscribe = || {
            let filter = filter.clone();
            ctx.broker.subscribe_once(move |ev| filter.matches(ev))
        };

        let mut sub = subscribe();
        for action in &controls {
            ctx.messenger.add_reaction(host, action.glyph()).await?;
        }

        loop {
            let Some(event) = sub.recv_timeout(self.idle_timeout).await else {
                debug!(owner = %self.owner, page = self.current, "widget expired");
                self.state = WidgetState::Expired;
                return Ok(self.state);
            };
            let Some(action) = WidgetAction::from_glyph(&event.emoji) else {
                sub = subscribe();
                continue;
            };

            let page = self.apply(action);
            if action == WidgetAction::Stop {
                ctx.messenger.remove_all_reactions(host).await?;
                return Ok(self.state);
            }

            ctx.messenger.edit_message(host, &self.pages[page]).await?;
            if let Some(cb) = self.callback.as_mut() {
                cb(action, page)?;
            }
            if ctx.messenger.capabilities().supports_reaction_removal {
                ctx.messenger
                    .remove_reaction(host, &event.emoji, event.user_id)
                    .await?;
            }

            sub = subscribe();
        }
    }
}
