//! Telegram adapter (teloxide).
//!
//! Implements the `artbot-core` MessagingPort over the Telegram Bot API. Telegram has no
//! bot-managed reactions with per-user removal, so reactions are modelled as an inline
//! keyboard: each glyph is a button whose callback data is the glyph itself.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use artbot_core::{
    domain::{ChannelId, MessageId, MessageRef, UserId},
    errors::Error,
    formatting::render_html,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, OutgoingMessage},
    },
    Result,
};

const MAX_MESSAGE_LEN: usize = 4096;

pub struct TelegramMessenger {
    bot: Bot,
    bot_id: UserId,
    /// Glyph buttons currently attached to each message.
    keyboards: Mutex<HashMap<MessageRef, Vec<String>>>,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, bot_id: UserId) -> Self {
        Self {
            bot,
            bot_id,
            keyboards: Mutex::new(HashMap::new()),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(channel: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(channel.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::RetryAfter(d) => {
                Error::RateLimited(format!("telegram, retry after {d:?}"))
            }
            other => Error::Platform(format!("telegram error: {other}")),
        }
    }

    fn keyboards(&self) -> MutexGuard<'_, HashMap<MessageRef, Vec<String>>> {
        self.keyboards.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn markup_for(&self, msg: MessageRef) -> Option<InlineKeyboardMarkup> {
        self.keyboards().get(&msg).map(|glyphs| keyboard(glyphs.as_slice()))
    }

    async fn with_retry<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.retry_raw(op).await.map_err(Self::map_err)
    }

    async fn retry_raw<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run an edit. An edit that changes nothing is not an error.
    async fn edit<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<()>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        match self.retry_raw(op).await {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }
}

fn keyboard(glyphs: &[String]) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = glyphs
        .iter()
        .map(|g| InlineKeyboardButton::callback(g.clone(), g.clone()))
        .collect();
    InlineKeyboardMarkup::new(vec![row])
}

fn message_ref(channel: ChannelId, msg: &Message) -> MessageRef {
    MessageRef {
        channel_id: channel,
        message_id: MessageId(msg.id.0),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_reaction_removal: false,
        }
    }

    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn send_message(&self, channel: ChannelId, msg: &OutgoingMessage) -> Result<MessageRef> {
        let html = render_html(msg, MAX_MESSAGE_LEN);
        let sent = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(channel), html.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(message_ref(channel, &sent))
    }

    async fn edit_message(&self, msg: MessageRef, content: &OutgoingMessage) -> Result<()> {
        let html = render_html(content, MAX_MESSAGE_LEN);
        // Editing the text drops the keyboard unless it is sent again.
        let markup = self.markup_for(msg);
        self.edit(|| {
            let req = self
                .bot
                .edit_message_text(
                    Self::tg_chat(msg.channel_id),
                    Self::tg_msg_id(msg.message_id),
                    html.clone(),
                )
                .parse_mode(ParseMode::Html);
            match markup.clone() {
                Some(m) => req.reply_markup(m),
                None => req,
            }
        })
        .await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot.delete_message(
                Self::tg_chat(msg.channel_id),
                Self::tg_msg_id(msg.message_id),
            )
        })
        .await?;
        self.keyboards().remove(&msg);
        Ok(())
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        let markup = {
            let mut boards = self.keyboards();
            let glyphs = boards.entry(msg).or_default();
            if glyphs.iter().any(|g| g == emoji) {
                return Ok(());
            }
            glyphs.push(emoji.to_string());
            keyboard(glyphs)
        };
        self.edit(|| {
            self.bot
                .edit_message_reply_markup(
                    Self::tg_chat(msg.channel_id),
                    Self::tg_msg_id(msg.message_id),
                )
                .reply_markup(markup.clone())
        })
        .await
    }

    async fn remove_reaction(&self, _msg: MessageRef, _emoji: &str, _user: UserId) -> Result<()> {
        // Buttons are shared by everyone in the chat; there is nothing per-user to undo.
        Ok(())
    }

    async fn remove_all_reactions(&self, msg: MessageRef) -> Result<()> {
        if self.keyboards().remove(&msg).is_none() {
            return Ok(());
        }
        self.edit(|| {
            self.bot.edit_message_reply_markup(
                Self::tg_chat(msg.channel_id),
                Self::tg_msg_id(msg.message_id),
            )
        })
        .await
    }

    async fn release(&self, msg: MessageRef) {
        self.keyboards().remove(&msg);
    }
}
