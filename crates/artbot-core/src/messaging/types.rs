use chrono::{DateTime, Utc};

use crate::domain::{MessageRef, UserId};

/// A reaction added to a message by a user.
///
/// Transient: produced by the platform event stream and consumed by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub message: MessageRef,
    pub emoji: String,
    pub user_id: UserId,
}

/// Renderable outgoing message.
#[derive(Clone, Debug, PartialEq)]
pub enum OutgoingMessage {
    Text(String),
    Embed(Embed),
}

impl OutgoingMessage {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// Platform-neutral rich message. Adapters decide how much of it they can show.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Embed {
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Whether a single user's reaction can be removed (Discord yes, Telegram buttons no).
    pub supports_reaction_removal: bool,
}
