use std::{collections::BTreeSet, sync::Arc};

use teloxide::prelude::*;
use tracing::{debug, info, warn};

use artbot_core::{
    domain::{ChannelId, GuildId, UserId},
    repost::{AbortReason, Destination, RepostOutcome, RepostRequest},
    settings::RepostMode,
    Result,
};

use crate::router::AppState;

use super::{report, reply};

/// A plain message with artwork links: repost here, then to the author's crosspost children.
pub async fn handle_links(msg: Message, state: Arc<AppState>) {
    let Some(user) = msg.from() else {
        return;
    };
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return;
    };
    let user = UserId(user.id.0 as i64);
    let chat = ChannelId(msg.chat.id.0);

    if let Err(e) = repost_links(&state, user, chat, text).await {
        report(&state, chat, &e).await;
    }
}

/// Repost every link in `text`. The rest of the text is conversation, not arguments:
/// page exclusions only come from `/pixiv … exclude …`.
async fn repost_links(state: &AppState, user: UserId, chat: ChannelId, text: &str) -> Result<()> {
    let settings = state.store.guild_settings(GuildId(chat.0)).await?;
    if !settings.pixiv {
        debug!(chat = %chat, "automatic reposts are off here");
        return Ok(());
    }
    let ids = state.orchestrator.provider().match_links(text);
    if ids.is_empty() {
        return Ok(());
    }
    repost_in_chat(state, user, chat, ids, BTreeSet::new(), true).await
}

/// Repost `ids` into `chat` with the chat's settings, optionally fanning out afterwards.
pub(super) async fn repost_in_chat(
    state: &AppState,
    user: UserId,
    chat: ChannelId,
    ids: Vec<String>,
    exclusions: BTreeSet<usize>,
    fan_out: bool,
) -> Result<()> {
    let settings = state.store.guild_settings(GuildId(chat.0)).await?;
    let destination = Destination {
        channel: chat,
        nsfw: settings.nsfw,
    };
    let req = RepostRequest::new(user, destination, ids.clone()).exclude(exclusions.clone());

    match state.orchestrator.repost(req, &settings).await? {
        RepostOutcome::Sent(_) => {}
        RepostOutcome::Aborted(AbortReason::NothingToSend) => {
            return reply(state, chat, "Nothing left to repost after exclusions.").await;
        }
        RepostOutcome::Truncated { .. } | RepostOutcome::Aborted(_) => return Ok(()),
    }

    if !fan_out || !settings.crosspost {
        return Ok(());
    }

    let targets = state.groups.targets(user, chat).await?;
    for target in targets {
        let mut settings = state.store.guild_settings(GuildId(target.0)).await?;
        if !settings.crosspost {
            debug!(from = %chat, to = %target, "target does not accept crossposts");
            continue;
        }
        // Nobody in the target chat is there to answer a mode prompt.
        if settings.repost_mode == RepostMode::Ask {
            settings.repost_mode = RepostMode::Embeds;
        }
        let destination = Destination {
            channel: target,
            nsfw: settings.nsfw,
        };
        let req = RepostRequest::new(user, destination, ids.clone())
            .exclude(exclusions.clone())
            .origin(chat)
            .without_size_prompt();

        match state.orchestrator.repost(req, &settings).await {
            Ok(outcome) => info!(from = %chat, to = %target, ?outcome, "crossposted"),
            Err(e) => warn!(from = %chat, to = %target, "crosspost failed: {e}"),
        }
    }
    Ok(())
}
