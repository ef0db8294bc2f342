//! Channel message data model.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Channel kinds that carry a message history.
const TEXT_BASED_KINDS: [u8; 9] = [
    0,  // guild text
    1,  // DM
    2,  // guild voice (has a text chat)
    3,  // group DM
    5,  // announcement
    10, // announcement thread
    11, // public thread
    12, // private thread
    13, // stage voice
];

/// A resolved remote channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: String,
    pub name: Option<String>,
    pub kind: u8,
}

impl Channel {
    pub fn is_text_based(&self) -> bool {
        TEXT_BASED_KINDS.contains(&self.kind)
    }
}

/// A single fetched channel message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub embeds: Vec<Embed>,
}

impl Message {
    /// Creation time as ISO-8601 with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// A file uploaded with a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub url: String,
    pub name: String,
}

/// Rich embed content attached to a message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<EmbedMedia>,
    pub thumbnail: Option<EmbedMedia>,
}

impl Embed {
    /// Downloadable assets in fixed order: image, then thumbnail.
    pub fn assets(&self) -> impl Iterator<Item = (AssetKind, &str)> {
        [
            (AssetKind::Image, self.image.as_ref()),
            (AssetKind::Thumbnail, self.thumbnail.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, media)| {
            media
                .and_then(|m| m.url.as_deref())
                .filter(|url| !url.is_empty())
                .map(|url| (kind, url))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedMedia {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Thumbnail,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Thumbnail => "thumbnail",
        }
    }
}
