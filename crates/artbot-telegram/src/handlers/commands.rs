use std::{collections::BTreeSet, sync::Arc};

use teloxide::prelude::*;
use tracing::debug;

use artbot_core::{
    artwork::ArtworkProvider,
    crosspost::CrosspostGroup,
    domain::{ChannelId, GuildId, MessageId, MessageRef, UserId},
    errors::Error,
    interaction::widget::Widget,
    messaging::types::{Embed, OutgoingMessage},
    repost::parse_exclusions,
    settings::{apply_setting, on_off, GuildSettings},
    Result,
};

use crate::router::AppState;

use super::{links::repost_in_chat, report, reply};

const HELP: &str = "🎨 artbot\n\n\
Commands:\n\
/pixiv <links or ids> [exclude <pages>] - Repost artwork, e.g. /pixiv 12345 exclude 2 4-6\n\
/crosspost create <name> [parent chat] - New crosspost group rooted at this chat\n\
/crosspost delete <name> - Delete a group\n\
/crosspost add <name> <chat ids> - Add child chats\n\
/crosspost remove <name> <chat ids> - Remove child chats\n\
/crosspost copy <src> <dest> [parent chat] - Copy a group under a new parent\n\
/crosspost groups - Browse your groups\n\
/set [name value] - Show or change chat settings (repost, limit, largeset, nsfw, crosspost, pixiv)\n\
/delete - Reply to a repost to delete it shortly after posting\n\
/help - Show this message\n\n\
Tip: post a Pixiv link and it is reposted here and to your crosspost children.";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

#[derive(Debug, PartialEq, Eq)]
struct PixivArgs {
    ids: Vec<String>,
    exclusions: BTreeSet<usize>,
}

/// `<links or ids…> [exclude <pages…>]`
fn parse_pixiv_args(provider: &dyn ArtworkProvider, arg: &str) -> Result<PixivArgs> {
    let tokens: Vec<&str> = arg.split_whitespace().collect();
    let split = tokens
        .iter()
        .position(|t| matches!(t.to_lowercase().as_str(), "exclude" | "excl" | "-e"))
        .unwrap_or(tokens.len());

    let mut ids: Vec<String> = Vec::new();
    for token in &tokens[..split] {
        let found = provider.match_links(token);
        let found = if found.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
            vec![token.to_string()]
        } else {
            found
        };
        for id in found {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    if ids.is_empty() {
        return Err(Error::Validation(
            "usage: /pixiv <links or ids> [exclude <pages>]".to_string(),
        ));
    }

    let exclusions = parse_exclusions(tokens.get(split + 1..).unwrap_or_default())?;
    Ok(PixivArgs { ids, exclusions })
}

#[derive(Debug, PartialEq, Eq)]
enum CrosspostCommand {
    Create {
        name: String,
        parent: ChannelId,
    },
    Delete {
        name: String,
    },
    Add {
        name: String,
        children: Vec<ChannelId>,
    },
    Remove {
        name: String,
        children: Vec<ChannelId>,
    },
    Copy {
        src: String,
        dest: String,
        parent: ChannelId,
    },
    Groups,
}

fn parse_channel(raw: &str) -> Result<ChannelId> {
    raw.parse::<i64>()
        .map(ChannelId)
        .map_err(|_| Error::Validation(format!("{raw:?} is not a chat id")))
}

fn parse_crosspost(arg: &str, here: ChannelId) -> Result<CrosspostCommand> {
    let usage = || {
        Error::Validation("usage: /crosspost create|delete|add|remove|copy|groups …".to_string())
    };
    let tokens: Vec<&str> = arg.split_whitespace().collect();
    let Some((sub, rest)) = tokens.split_first() else {
        return Ok(CrosspostCommand::Groups);
    };

    let cmd = match (sub.to_lowercase().as_str(), rest) {
        ("create", [name]) => CrosspostCommand::Create {
            name: name.to_string(),
            parent: here,
        },
        ("create", [name, parent]) => CrosspostCommand::Create {
            name: name.to_string(),
            parent: parse_channel(parent)?,
        },
        ("delete", [name]) => CrosspostCommand::Delete {
            name: name.to_string(),
        },
        ("add", [name, ids @ ..]) if !ids.is_empty() => CrosspostCommand::Add {
            name: name.to_string(),
            children: ids.iter().map(|s| parse_channel(s)).collect::<Result<_>>()?,
        },
        ("remove", [name, ids @ ..]) if !ids.is_empty() => CrosspostCommand::Remove {
            name: name.to_string(),
            children: ids.iter().map(|s| parse_channel(s)).collect::<Result<_>>()?,
        },
        ("copy", [src, dest]) => CrosspostCommand::Copy {
            src: src.to_string(),
            dest: dest.to_string(),
            parent: here,
        },
        ("copy", [src, dest, parent]) => CrosspostCommand::Copy {
            src: src.to_string(),
            dest: dest.to_string(),
            parent: parse_channel(parent)?,
        },
        ("groups" | "list", []) => CrosspostCommand::Groups,
        _ => return Err(usage()),
    };
    Ok(cmd)
}

fn join_channels(ids: &[ChannelId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(ChannelId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// One widget page per group.
fn group_pages(groups: &[CrosspostGroup]) -> Vec<OutgoingMessage> {
    let total = groups.len();
    groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            OutgoingMessage::Embed(
                Embed::new(format!("Crosspost group: {}", g.name))
                    .description(format!(
                        "Links posted in {} are reposted to {} chat(s).",
                        g.parent,
                        g.children.len()
                    ))
                    .field("Parent", g.parent.to_string(), true)
                    .field("Children", join_channels(&g.children), false)
                    .footer(format!("Group {}/{}", i + 1, total)),
            )
        })
        .collect()
}

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) {
    let Some(user) = msg.from() else {
        return;
    };
    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return;
    };

    let user_id = UserId(user.id.0 as i64);
    let chat = ChannelId(msg.chat.id.0);
    let (cmd, arg) = parse_command(text);
    debug!(cmd = %cmd, user = %user_id, chat = %chat, "command");

    let res = match cmd.as_str() {
        "start" | "help" => reply(&state, chat, HELP).await,
        "pixiv" => pixiv(&state, user_id, chat, &arg).await,
        "crosspost" => crosspost(&state, user_id, chat, &arg).await,
        "set" => set(&bot, &msg, &state, chat, &arg).await,
        "delete" => delete(&state, &msg, user_id, chat).await,
        _ => Ok(()),
    };

    if let Err(e) = res {
        report(&state, chat, &e).await;
    }
}

async fn pixiv(state: &AppState, user: UserId, chat: ChannelId, arg: &str) -> Result<()> {
    let args = parse_pixiv_args(state.orchestrator.provider().as_ref(), arg)?;
    repost_in_chat(state, user, chat, args.ids, args.exclusions, false).await
}

async fn crosspost(state: &AppState, user: UserId, chat: ChannelId, arg: &str) -> Result<()> {
    let groups = &state.groups;
    match parse_crosspost(arg, chat)? {
        CrosspostCommand::Create { name, parent } => {
            let g = groups.create(user, &name, parent).await?;
            let text = format!("✅ Created group {} with parent {}", g.name, g.parent);
            reply(state, chat, text).await
        }
        CrosspostCommand::Delete { name } => {
            groups.delete(user, &name).await?;
            reply(state, chat, format!("✅ Deleted group {name}")).await
        }
        CrosspostCommand::Add { name, children } => {
            let added = groups.add_children(user, &name, &children).await?;
            let text = format!("✅ Added to {name}: {}", join_channels(&added));
            reply(state, chat, text).await
        }
        CrosspostCommand::Remove { name, children } => {
            let removed = groups.remove_children(user, &name, &children).await?;
            let text = format!("✅ Removed from {name}: {}", join_channels(&removed));
            reply(state, chat, text).await
        }
        CrosspostCommand::Copy { src, dest, parent } => {
            let g = groups.copy(user, &src, &dest, parent).await?;
            reply(
                state,
                chat,
                format!(
                    "✅ Copied {src} to {} with parent {} and children {}",
                    g.name,
                    g.parent,
                    join_channels(&g.children)
                ),
            )
            .await
        }
        CrosspostCommand::Groups => {
            let list = groups.groups(user).await?;
            if list.is_empty() {
                return reply(state, chat, "You have no crosspost groups.").await;
            }
            let widget = Widget::new(user, group_pages(&list))
                .idle_timeout(state.cfg.widget_idle_timeout);
            state.interactions.run_widget(widget, chat).await?;
            Ok(())
        }
    }
}

async fn set(
    bot: &Bot,
    msg: &Message,
    state: &AppState,
    chat: ChannelId,
    arg: &str,
) -> Result<()> {
    let guild = GuildId(chat.0);
    let mut settings = state.store.guild_settings(guild).await?;

    let mut parts = arg.split_whitespace();
    let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
        return reply(
            state,
            chat,
            settings_summary(&settings),
        )
        .await;
    };

    if !msg.chat.is_private() && !is_chat_admin(bot, msg).await? {
        return Err(Error::Validation(
            "only chat administrators can change settings".to_string(),
        ));
    }

    let change = apply_setting(&mut settings, name, value)?;
    state.store.save_guild_settings(&settings).await?;
    reply(state, chat, format!("✅ {change}")).await
}

fn settings_summary(s: &GuildSettings) -> String {
    format!(
        "Settings for this chat:\n\
         repost: {}\nlimit: {}\nlargeset: {}\nnsfw: {}\ncrosspost: {}\npixiv: {}\n\n\
         Change one with /set <name> <value>",
        s.repost_mode,
        s.limit,
        s.large_set,
        on_off(s.nsfw),
        on_off(s.crosspost),
        on_off(s.pixiv),
    )
}

async fn is_chat_admin(bot: &Bot, msg: &Message) -> Result<bool> {
    let Some(user) = msg.from() else {
        return Ok(false);
    };
    let member = bot
        .get_chat_member(msg.chat.id, user.id)
        .await
        .map_err(|e| Error::Platform(format!("telegram error: {e}")))?;
    Ok(member.kind.is_privileged())
}

async fn delete(state: &AppState, msg: &Message, user: UserId, chat: ChannelId) -> Result<()> {
    let Some(target) = msg.reply_to_message() else {
        return Err(Error::Validation(
            "reply to a repost with /delete to remove it".to_string(),
        ));
    };
    let target = MessageRef {
        channel_id: chat,
        message_id: MessageId(target.id.0),
    };

    if !state.cache.is_author(target, user) {
        return Err(Error::Validation(format!(
            "only the person who requested a repost can delete it, within {}s of posting",
            state.cache.ttl().as_secs()
        )));
    }

    state.messenger.delete_message(target).await?;
    state.cache.evict(target);

    let command = MessageRef {
        channel_id: chat,
        message_id: MessageId(msg.id.0),
    };
    if let Err(e) = state.messenger.delete_message(command).await {
        debug!("could not delete /delete command message: {e}");
    }
    Ok(())
}
