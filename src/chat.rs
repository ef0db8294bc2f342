//! Channel resolution and message history pagination

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::integrations::DiscordClient;
use crate::metrics;
use crate::models::{Channel, Message};

/// Source of paginated channel history.
///
/// Pages come back newest first; `before` asks for messages older than the given id.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_page(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<Message>>;
}

/// Resolve a channel by id and make sure it has a message history.
pub async fn resolve_text_channel(client: &DiscordClient, channel_id: &str) -> Result<Channel> {
    let channel = client.fetch_channel(channel_id).await?;
    if !channel.is_text_based() {
        return Err(Error::NotTextChannel {
            id: channel.id,
            kind: channel.kind,
        });
    }
    info!(
        "Channel: {} ({})",
        channel.name.as_deref().unwrap_or("unnamed"),
        channel.id
    );
    Ok(channel)
}

/// Fetch the complete history of a channel, oldest message first.
///
/// Walks backwards one page at a time until a page comes back empty or short.
/// Any fetch error aborts the walk.
pub async fn fetch_all_messages<S>(
    source: &S,
    channel_id: &str,
    page_size: usize,
) -> Result<Vec<Message>>
where
    S: MessageSource + ?Sized,
{
    let mut messages: Vec<Message> = Vec::new();
    let mut before: Option<String> = None;

    loop {
        let page = source
            .fetch_page(channel_id, page_size, before.as_deref())
            .await?;
        metrics::record_page(page.len());
        debug!("Fetched page of {} messages (before {:?})", page.len(), before);

        let Some(oldest) = page.last() else {
            break;
        };
        before = Some(oldest.id.clone());

        let exhausted = page.len() < page_size;
        messages.extend(page);
        if exhausted {
            break;
        }
    }

    messages.reverse();
    info!("Got {} messages", messages.len());
    Ok(messages)
}
