//! Per-guild repost settings and typed setting changes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{domain::GuildId, errors::Error, Result};

/// How reposted artwork is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepostMode {
    /// Let the requester pick links or embeds each time.
    Ask,
    Links,
    Embeds,
}

impl FromStr for RepostMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(RepostMode::Ask),
            "links" => Ok(RepostMode::Links),
            "embeds" => Ok(RepostMode::Embeds),
            other => Err(Error::Validation(format!(
                "unknown repost mode {other:?}, expected ask, links or embeds"
            ))),
        }
    }
}

impl fmt::Display for RepostMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepostMode::Ask => "ask",
            RepostMode::Links => "links",
            RepostMode::Embeds => "embeds",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    pub repost_mode: RepostMode,
    /// Maximum number of messages one request may produce.
    pub limit: usize,
    /// Page count at which the requester must confirm before sending.
    pub large_set: usize,
    /// NSFW artwork may be posted here without asking.
    #[serde(default)]
    pub nsfw: bool,
    /// Reposts from this chat fan out to crosspost groups, and it accepts fan-out.
    #[serde(default = "enabled")]
    pub crosspost: bool,
    /// Pixiv links in plain messages are reposted automatically.
    #[serde(default = "enabled")]
    pub pixiv: bool,
}

fn enabled() -> bool {
    true
}

/// Values given to guilds without a stored record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuildDefaults {
    pub repost_mode: RepostMode,
    pub limit: usize,
    pub large_set: usize,
    pub nsfw: bool,
    pub crosspost: bool,
    pub pixiv: bool,
}

impl Default for GuildDefaults {
    fn default() -> Self {
        Self {
            repost_mode: RepostMode::Ask,
            limit: 50,
            large_set: 3,
            nsfw: false,
            crosspost: true,
            pixiv: true,
        }
    }
}

impl GuildDefaults {
    pub fn for_guild(&self, guild_id: GuildId) -> GuildSettings {
        GuildSettings {
            guild_id,
            repost_mode: self.repost_mode,
            limit: self.limit,
            large_set: self.large_set,
            nsfw: self.nsfw,
            crosspost: self.crosspost,
            pixiv: self.pixiv,
        }
    }
}

/// One applied change, with its typed previous and new value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingChange {
    RepostMode { old: RepostMode, new: RepostMode },
    Limit { old: usize, new: usize },
    LargeSet { old: usize, new: usize },
    Nsfw { old: bool, new: bool },
    Crosspost { old: bool, new: bool },
    Pixiv { old: bool, new: bool },
}

impl fmt::Display for SettingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingChange::RepostMode { old, new } => write!(f, "repost: {old} → {new}"),
            SettingChange::Limit { old, new } => write!(f, "limit: {old} → {new}"),
            SettingChange::LargeSet { old, new } => write!(f, "largeset: {old} → {new}"),
            SettingChange::Nsfw { old, new } => {
                write!(f, "nsfw: {} → {}", on_off(*old), on_off(*new))
            }
            SettingChange::Crosspost { old, new } => {
                write!(f, "crosspost: {} → {}", on_off(*old), on_off(*new))
            }
            SettingChange::Pixiv { old, new } => {
                write!(f, "pixiv: {} → {}", on_off(*old), on_off(*new))
            }
        }
    }
}

/// Validate `raw` for setting `name` and apply it. Nothing is changed on error.
pub fn apply_setting(settings: &mut GuildSettings, name: &str, raw: &str) -> Result<SettingChange> {
    match name.trim().to_ascii_lowercase().as_str() {
        "repost" | "repost_mode" => {
            let new: RepostMode = raw.parse()?;
            let old = std::mem::replace(&mut settings.repost_mode, new);
            Ok(SettingChange::RepostMode { old, new })
        }
        "limit" => {
            let new = parse_positive(name, raw)?;
            let old = std::mem::replace(&mut settings.limit, new);
            Ok(SettingChange::Limit { old, new })
        }
        "largeset" | "large_set" => {
            let new = parse_positive(name, raw)?;
            let old = std::mem::replace(&mut settings.large_set, new);
            Ok(SettingChange::LargeSet { old, new })
        }
        "nsfw" => {
            let new = parse_toggle(raw)?;
            let old = std::mem::replace(&mut settings.nsfw, new);
            Ok(SettingChange::Nsfw { old, new })
        }
        "crosspost" => {
            let new = parse_toggle(raw)?;
            let old = std::mem::replace(&mut settings.crosspost, new);
            Ok(SettingChange::Crosspost { old, new })
        }
        "pixiv" => {
            let new = parse_toggle(raw)?;
            let old = std::mem::replace(&mut settings.pixiv, new);
            Ok(SettingChange::Pixiv { old, new })
        }
        other => Err(Error::Validation(format!(
            "unknown setting {other:?}, expected one of {}",
            SETTING_NAMES.join(", ")
        ))),
    }
}

/// Names accepted by [`apply_setting`].
pub const SETTING_NAMES: [&str; 6] = ["repost", "limit", "largeset", "nsfw", "crosspost", "pixiv"];

/// Parse an on/off switch: `true`/`on`/`enabled`/`yes` or `false`/`off`/`disabled`/`no`.
pub fn parse_toggle(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "enabled" | "yes" => Ok(true),
        "false" | "off" | "disabled" | "no" => Ok(false),
        _ => Err(Error::Validation(format!("expected on or off, got {raw:?}"))),
    }
}

pub fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Validation(format!(
            "{name} must be a positive integer, got {raw:?}"
        ))),
    }
}
