//! Telegram update handlers.
//!
//! Every command or repost runs as its own task: teloxide processes updates of one chat
//! in order, so a handler that waited for a button press inline would never see it.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::{debug, error, warn};

use artbot_core::{
    domain::{ChannelId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::types::{OutgoingMessage, ReactionEvent},
};

use crate::router::AppState;

mod commands;
mod links;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if let (Some(message), Some(data)) = (q.message.as_ref(), q.data.as_ref()) {
        let event = ReactionEvent {
            message: MessageRef {
                channel_id: ChannelId(message.chat.id.0),
                message_id: MessageId(message.id.0),
            },
            emoji: data.clone(),
            user_id: UserId(q.from.id.0 as i64),
        };
        let delivered = state.interactions.broker.publish(event);
        debug!(delivered, user = q.from.id.0, "button press published");
    }

    // Always answer so the client stops its spinner.
    let _ = bot.answer_callback_query(q.id).await;
    Ok(())
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };
    if msg.from().map_or(true, |u| u.is_bot) {
        return Ok(());
    }

    if text.starts_with('/') {
        tokio::spawn(commands::handle_command(bot, msg, state));
        return Ok(());
    }

    if !state.orchestrator.provider().match_links(text).is_empty() {
        tokio::spawn(links::handle_links(msg, state));
    }

    Ok(())
}

/// Tell the chat what went wrong. User mistakes are shown verbatim, internal failures are not.
async fn report(state: &AppState, chat: ChannelId, err: &Error) {
    let text = if err.is_user_facing() {
        warn!(chat = %chat, "command rejected: {err}");
        format!("❌ {err}")
    } else {
        error!(chat = %chat, "command failed: {err}");
        "❌ Something went wrong, please try again later.".to_string()
    };
    let _ = state
        .messenger
        .send_message(chat, &OutgoingMessage::text(text))
        .await;
}

async fn reply(
    state: &AppState,
    chat: ChannelId,
    text: impl Into<String>,
) -> artbot_core::Result<()> {
    state
        .messenger
        .send_message(chat, &OutgoingMessage::text(text))
        .await?;
    Ok(())
}
