//! Export records, log rendering and output layout

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::Result;
use crate::models::{AssetKind, Embed, Message};

pub const MESSAGE_LOG_FILE: &str = "messages.txt";
pub const EMBED_LOG_FILE: &str = "embeds.txt";
pub const STRUCTURED_LOG_FILE: &str = "messages.json";
pub const ATTACHMENTS_DIR: &str = "attachments";
pub const EMBEDS_DIR: &str = "embeds";
pub const DEFAULT_ASSET_EXTENSION: &str = ".png";

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[/\\\x00-\x1f]").expect("valid filename regex"));

/// Everything recorded about one exported message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedMessage {
    pub id: String,
    pub author: String,
    pub timestamp: String,
    pub content: String,
    pub attachments: Vec<SavedAttachment>,
    pub embeds: Vec<EmbedRecord>,
}

impl ExportedMessage {
    /// Record for a message before anything has been downloaded.
    pub fn new(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            author: message.author.clone(),
            timestamp: message.iso_timestamp(),
            content: message.content.clone(),
            attachments: Vec::new(),
            embeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedAttachment {
    pub name: String,
    pub url: String,
    /// Path relative to the output directory, `None` if the download failed.
    pub saved_as: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedRecord {
    /// 1-based position within the message.
    pub position: usize,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub assets: Vec<AssetOutcome>,
}

impl EmbedRecord {
    pub fn new(position: usize, embed: &Embed) -> Self {
        Self {
            position,
            title: embed.title.clone(),
            description: embed.description.clone(),
            url: embed.url.clone(),
            assets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetOutcome {
    pub kind: AssetKind,
    pub url: String,
    pub saved_as: Option<String>,
}

/// Replace characters that would let a name escape its directory.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(name, "_");
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// `<messageId>-<attachmentName>`
pub fn attachment_file_name(message_id: &str, attachment_name: &str) -> String {
    format!("{}-{}", message_id, sanitize_file_name(attachment_name))
}

/// `<messageId>-embed-<n>-<image|thumbnail><ext>`
pub fn embed_asset_file_name(message_id: &str, position: usize, kind: AssetKind, url: &str) -> String {
    format!(
        "{}-embed-{}-{}{}",
        message_id,
        position,
        kind.label(),
        extension_from_url(url)
    )
}

/// Extension (with the dot) of the last path segment, ignoring query and fragment.
pub fn extension_from_url(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let last_segment = path.rsplit('/').next().unwrap_or_default();

    Path::new(last_segment)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", sanitize_file_name(ext)))
        .unwrap_or_else(|| DEFAULT_ASSET_EXTENSION.to_string())
}

/// Create the output directory with its `attachments` and `embeds` subdirectories.
pub fn create_output_dirs(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join(ATTACHMENTS_DIR))?;
    fs::create_dir_all(root.join(EMBEDS_DIR))?;
    Ok(())
}

/// Render the message log: header, body, attachment lines and a spacer per message.
pub fn render_message_log(messages: &[ExportedMessage]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for msg in messages {
        lines.push(format!("[{}] {}", msg.timestamp, msg.author));
        if !msg.content.is_empty() {
            lines.push(msg.content.clone());
        }
        for attachment in &msg.attachments {
            lines.push(match &attachment.saved_as {
                Some(path) => format!("Attachment saved: {}", path),
                None => format!("Failed to download attachment: {}", attachment.url),
            });
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Render the embed log: one block per embed, asset outcomes in image/thumbnail order.
pub fn render_embed_log(messages: &[ExportedMessage]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for msg in messages {
        for embed in &msg.embeds {
            lines.push(format!("Message {} — Embed {}", msg.id, embed.position));

            let fields = [
                ("Title", &embed.title),
                ("Description", &embed.description),
                ("URL", &embed.url),
            ];
            for (label, value) in fields {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    lines.push(format!("{}: {}", label, value));
                }
            }

            for asset in &embed.assets {
                lines.push(match &asset.saved_as {
                    Some(path) => format!("Downloaded {}: {}", asset.kind.label(), path),
                    None => format!("Failed to download {}: {}", asset.kind.label(), asset.url),
                });
            }
            lines.push(String::new());
        }
    }

    lines.join("\n")
}

/// Write `messages.txt`, `embeds.txt` and optionally `messages.json`.
pub fn write_logs(root: &Path, messages: &[ExportedMessage], structured: bool) -> Result<()> {
    fs::write(root.join(MESSAGE_LOG_FILE), render_message_log(messages))?;
    fs::write(root.join(EMBED_LOG_FILE), render_embed_log(messages))?;
    if structured {
        let json = serde_json::to_string_pretty(messages)?;
        fs::write(root.join(STRUCTURED_LOG_FILE), json)?;
    }
    Ok(())
}
