//! Artwork repost pipeline: mode choice, expansion, gating, limits and sending.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    artwork::{Artwork, ArtworkProvider},
    domain::{ChannelId, MessageRef, UserId},
    errors::Error,
    interaction::{
        prompt::{Prompt, PromptOutcome},
        Interactions,
    },
    messaging::types::{Embed, OutgoingMessage},
    post_cache::PostCache,
    settings::{GuildSettings, RepostMode},
    Result,
};

pub const LINKS: &str = "🔗";
pub const EMBEDS: &str = "🖼";

/// Exclusion ranges are clamped to this page number.
const MAX_PAGE: usize = 1000;

const EMBED_FOOTER: &str = "Please follow the link in the title to download high-res image";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendMode {
    Links,
    Embeds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Destination {
    pub channel: ChannelId,
    /// Whether NSFW artwork may be posted here without asking.
    pub nsfw: bool,
}

#[derive(Clone, Debug)]
pub struct RepostRequest {
    pub requester: UserId,
    pub destination: Destination,
    /// Channel prompts are shown in. Defaults to the destination.
    pub origin: Option<ChannelId>,
    pub artwork_ids: Vec<String>,
    /// 1-indexed page numbers to skip within each artwork.
    pub exclusions: BTreeSet<usize>,
    pub ask_large_set: bool,
}

impl RepostRequest {
    pub fn new(requester: UserId, destination: Destination, artwork_ids: Vec<String>) -> Self {
        Self {
            requester,
            destination,
            origin: None,
            artwork_ids,
            exclusions: BTreeSet::new(),
            ask_large_set: true,
        }
    }

    pub fn exclude(mut self, pages: BTreeSet<usize>) -> Self {
        self.exclusions = pages;
        self
    }

    pub fn origin(mut self, channel: ChannelId) -> Self {
        self.origin = Some(channel);
        self
    }

    /// Skip the large set confirmation. Used for automated fan-out.
    pub fn without_size_prompt(mut self) -> Self {
        self.ask_large_set = false;
        self
    }

    fn prompt_channel(&self) -> ChannelId {
        self.origin.unwrap_or(self.destination.channel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PromptTimeouts {
    pub mode: Duration,
    pub nsfw: Duration,
    pub large_set: Duration,
}

impl Default for PromptTimeouts {
    fn default() -> Self {
        Self {
            mode: Duration::from_secs(15),
            nsfw: Duration::from_secs(10),
            large_set: Duration::from_secs(15),
        }
    }
}

/// One page of one artwork, ready to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepostUnit {
    pub title: String,
    pub preview: String,
    pub original: String,
    pub likes: u64,
    pub tags: Vec<String>,
}

impl RepostUnit {
    /// Units for every page of `artwork` not listed in `exclusions`.
    pub fn expand(artwork: &Artwork, exclusions: &BTreeSet<usize>) -> Vec<Self> {
        let total = artwork.pages.len();
        artwork
            .pages
            .iter()
            .enumerate()
            .filter(|(i, _)| !exclusions.contains(&(i + 1)))
            .map(|(i, page)| {
                let title = if total == 1 {
                    format!("{} by {}", artwork.title, artwork.author)
                } else {
                    format!("{} by {}. Page {}/{}", artwork.title, artwork.author, i + 1, total)
                };
                RepostUnit {
                    title,
                    preview: page.preview.clone(),
                    original: page.original.clone(),
                    likes: artwork.likes,
                    tags: artwork.tags.clone(),
                }
            })
            .collect()
    }

    pub fn render(&self, mode: SendMode) -> OutgoingMessage {
        match mode {
            SendMode::Links => OutgoingMessage::text(format!(
                "{}\n{}\n♥ {}",
                self.title, self.preview, self.likes
            )),
            SendMode::Embeds => {
                let tags = if self.tags.is_empty() {
                    "none".to_string()
                } else {
                    self.tags.join(" • ")
                };
                OutgoingMessage::Embed(
                    Embed::new(&self.title)
                        .url(&self.original)
                        .image(&self.preview)
                        .field("Likes", self.likes.to_string(), true)
                        .field("Tags", tags, true)
                        .footer(EMBED_FOOTER)
                        .timestamp(Utc::now()),
                )
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// Nobody picked links or embeds in time.
    ModeNotChosen,
    /// The large set confirmation was declined or timed out.
    LargeSetDeclined,
    /// Exclusions and NSFW declines left nothing to post.
    NothingToSend,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepostOutcome {
    Sent(Vec<MessageRef>),
    /// Over the guild limit: only a notice was posted.
    Truncated {
        notice: MessageRef,
        requested: usize,
        allowed: usize,
    },
    Aborted(AbortReason),
}

pub struct RepostOrchestrator {
    interactions: Interactions,
    provider: Arc<dyn ArtworkProvider>,
    cache: Arc<PostCache>,
    timeouts: PromptTimeouts,
}

impl RepostOrchestrator {
    pub fn new(
        interactions: Interactions,
        provider: Arc<dyn ArtworkProvider>,
        cache: Arc<PostCache>,
        timeouts: PromptTimeouts,
    ) -> Self {
        Self {
            interactions,
            provider,
            cache,
            timeouts,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ArtworkProvider> {
        &self.provider
    }

    /// Run one repost request against a snapshot of the guild settings.
    ///
    /// Messages sent before a failing send stay posted and cached.
    pub async fn repost(
        &self,
        req: RepostRequest,
        settings: &GuildSettings,
    ) -> Result<RepostOutcome> {
        if req.artwork_ids.is_empty() {
            return Err(Error::Validation("no artwork to repost".to_string()));
        }

        let Some(mode) = self.choose_mode(&req, settings.repost_mode).await? else {
            return Ok(RepostOutcome::Aborted(AbortReason::ModeNotChosen));
        };

        let mut artworks = Vec::with_capacity(req.artwork_ids.len());
        for id in &req.artwork_ids {
            artworks.push(self.provider.find(id).await?);
        }

        let mut units = Vec::new();
        for artwork in &artworks {
            let pages = RepostUnit::expand(artwork, &req.exclusions);
            if pages.is_empty() {
                continue;
            }
            if artwork.nsfw && !req.destination.nsfw && !self.confirm_nsfw(&req, artwork).await? {
                debug!(artwork = %artwork.id, "nsfw artwork skipped");
                continue;
            }
            units.extend(pages);
        }

        if units.is_empty() {
            return Ok(RepostOutcome::Aborted(AbortReason::NothingToSend));
        }

        if req.ask_large_set && units.len() >= settings.large_set {
            let text = format!(
                "You're about to repost {} images. Are you sure?",
                units.len()
            );
            let answer = self
                .interactions
                .confirm(req.requester, req.prompt_channel(), text, self.timeouts.large_set)
                .await?;
            if !answer.is_confirmed() {
                return Ok(RepostOutcome::Aborted(AbortReason::LargeSetDeclined));
            }
        }

        let channel = req.destination.channel;
        let messenger = &self.interactions.messenger;

        if units.len() > settings.limit {
            let text = format!(
                "Album size ({}) is larger than the limit set on this server ({}), nothing was reposted.",
                units.len(),
                settings.limit
            );
            let notice = messenger
                .send_message(channel, &OutgoingMessage::text(text))
                .await?;
            self.cache.put(notice, req.requester);
            info!(
                channel = %channel,
                requested = units.len(),
                allowed = settings.limit,
                "repost over limit"
            );
            return Ok(RepostOutcome::Truncated {
                notice,
                requested: units.len(),
                allowed: settings.limit,
            });
        }

        info!(
            channel = %channel,
            requester = %req.requester,
            images = units.len(),
            "reposting"
        );
        let mut sent = Vec::with_capacity(units.len());
        for unit in &units {
            let msg = messenger.send_message(channel, &unit.render(mode)).await?;
            self.cache.put(msg, req.requester);
            sent.push(msg);
        }
        Ok(RepostOutcome::Sent(sent))
    }

    async fn choose_mode(
        &self,
        req: &RepostRequest,
        mode: RepostMode,
    ) -> Result<Option<SendMode>> {
        match mode {
            RepostMode::Links => Ok(Some(SendMode::Links)),
            RepostMode::Embeds => Ok(Some(SendMode::Embeds)),
            RepostMode::Ask => {
                let prompt = Prompt::new(
                    req.requester,
                    req.prompt_channel(),
                    format!("Send as links ({LINKS}) or embeds ({EMBEDS})?"),
                )
                .option(LINKS, SendMode::Links)
                .option(EMBEDS, SendMode::Embeds)
                .timeout(self.timeouts.mode);

                match self.interactions.run_prompt(prompt).await? {
                    PromptOutcome::Selected(mode) => Ok(Some(mode)),
                    PromptOutcome::TimedOut => Ok(None),
                }
            }
        }
    }

    async fn confirm_nsfw(&self, req: &RepostRequest, artwork: &Artwork) -> Result<bool> {
        let text = format!(
            "\"{}\" is marked R-18 and this chat is not NSFW. Repost it anyway?",
            artwork.title
        );
        let answer = self
            .interactions
            .confirm(req.requester, req.prompt_channel(), text, self.timeouts.nsfw)
            .await?;
        Ok(answer.is_confirmed())
    }
}

/// Parse exclusion tokens: `N` or an inclusive range `A-B` of 1-indexed pages.
///
/// Tokens that are not numbers or ranges are skipped.
pub fn parse_exclusions<I, S>(tokens: I) -> Result<BTreeSet<usize>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = BTreeSet::new();
    for token in tokens {
        let token = token.as_ref().trim();
        if let Some((lo, hi)) = token.split_once('-') {
            let (Ok(lo), Ok(hi)) = (lo.parse::<usize>(), hi.parse::<usize>()) else {
                continue;
            };
            if lo == 0 || lo > hi {
                return Err(Error::Validation(format!("invalid page range {token:?}")));
            }
            out.extend(lo..=hi.min(MAX_PAGE.max(lo)));
        } else if let Ok(n) = token.parse::<usize>() {
            if n == 0 {
                return Err(Error::Validation("page numbers start at 1".to_string()));
            }
            out.insert(n);
        }
    }
    Ok(out)
}
