//! Export a channel's full history to the output directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chat::{fetch_all_messages, resolve_text_channel};
use crate::config::Config;
use crate::download::Downloader;
use crate::error::Result;
use crate::export::{
    attachment_file_name, create_output_dirs, embed_asset_file_name, write_logs, AssetOutcome,
    EmbedRecord, ExportedMessage, SavedAttachment, ATTACHMENTS_DIR, EMBEDS_DIR,
};
use crate::integrations::DiscordClient;
use crate::metrics;
use crate::models::{AssetKind, Message};
use crate::session::ExportLock;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub messages: usize,
    pub attachments_saved: usize,
    pub attachments_failed: usize,
    pub assets_saved: usize,
    pub assets_failed: usize,
}

impl ExportSummary {
    fn from_records(records: &[ExportedMessage]) -> Self {
        let mut summary = Self {
            messages: records.len(),
            ..Self::default()
        };
        for record in records {
            for attachment in &record.attachments {
                if attachment.saved_as.is_some() {
                    summary.attachments_saved += 1;
                } else {
                    summary.attachments_failed += 1;
                }
            }
            for asset in record.embeds.iter().flat_map(|e| &e.assets) {
                if asset.saved_as.is_some() {
                    summary.assets_saved += 1;
                } else {
                    summary.assets_failed += 1;
                }
            }
        }
        summary
    }
}

/// Exit status for a missing or non-text channel.
pub const EXIT_INVALID_CHANNEL: i32 = 1;
/// Exit status for every other fatal error.
pub const EXIT_FAILURE: i32 = 2;

/// Process exit status for a finished run.
pub fn exit_code(result: &Result<ExportSummary>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(err) if err.is_invalid_channel() => EXIT_INVALID_CHANNEL,
        Err(_) => EXIT_FAILURE,
    }
}

/// Embed asset download running in the background.
struct PendingAsset {
    message: usize,
    embed: usize,
    kind: AssetKind,
    url: String,
    dest: PathBuf,
    handle: JoinHandle<Option<String>>,
}

/// Walks the ordered history, downloading attachments and embed assets.
pub struct Exporter {
    downloader: Downloader,
    attachments_dir: PathBuf,
    embeds_dir: PathBuf,
    strict_attachments: bool,
    limiter: Arc<Semaphore>,
}

impl Exporter {
    pub fn new(downloader: Downloader, config: &Config) -> Self {
        Self {
            downloader,
            attachments_dir: config.attachments_dir(),
            embeds_dir: config.embeds_dir(),
            strict_attachments: config.strict_attachments,
            limiter: Arc::new(Semaphore::new(config.embed_concurrency)),
        }
    }

    /// Export messages in order and return one record per message.
    ///
    /// Attachments are downloaded one at a time before moving on. Embed assets
    /// download in the background and are all settled before this returns,
    /// whether the walk succeeds or not.
    pub async fn export(&self, messages: &[Message]) -> Result<Vec<ExportedMessage>> {
        let mut pending: Vec<PendingAsset> = Vec::new();

        match self.walk(messages, &mut pending).await {
            Ok(mut records) => {
                settle_pending(&mut records, pending).await;
                Ok(records)
            }
            Err(err) => {
                cancel_pending(pending).await;
                Err(err)
            }
        }
    }

    async fn walk(
        &self,
        messages: &[Message],
        pending: &mut Vec<PendingAsset>,
    ) -> Result<Vec<ExportedMessage>> {
        let mut records: Vec<ExportedMessage> = Vec::with_capacity(messages.len());

        for (message_index, msg) in messages.iter().enumerate() {
            let mut record = ExportedMessage::new(msg);

            for attachment in &msg.attachments {
                let file_name = attachment_file_name(&msg.id, &attachment.name);
                let saved_as = self.download_attachment(&attachment.url, &file_name).await?;
                record.attachments.push(SavedAttachment {
                    name: attachment.name.clone(),
                    url: attachment.url.clone(),
                    saved_as,
                });
            }

            for (embed_index, embed) in msg.embeds.iter().enumerate() {
                let position = embed_index + 1;
                record.embeds.push(EmbedRecord::new(position, embed));

                for (kind, url) in embed.assets() {
                    let file_name = embed_asset_file_name(&msg.id, position, kind, url);
                    let dest = self.embeds_dir.join(&file_name);
                    pending.push(PendingAsset {
                        message: message_index,
                        embed: embed_index,
                        kind,
                        url: url.to_string(),
                        handle: self.spawn_asset_download(kind, url.to_string(), file_name),
                        dest,
                    });
                }
            }

            records.push(record);
        }

        Ok(records)
    }

    async fn download_attachment(&self, url: &str, file_name: &str) -> Result<Option<String>> {
        let dest = self.attachments_dir.join(file_name);

        metrics::record_download_start("attachment");
        let result = self.downloader.download(url, &dest).await;
        metrics::record_download_result("attachment", result.is_ok());

        match result {
            Ok(_) => Ok(Some(format!("{}/{}", ATTACHMENTS_DIR, file_name))),
            Err(err) if self.strict_attachments => Err(err),
            Err(err) => {
                warn!("{}", err);
                Ok(None)
            }
        }
    }

    fn spawn_asset_download(
        &self,
        kind: AssetKind,
        url: String,
        file_name: String,
    ) -> JoinHandle<Option<String>> {
        let downloader = self.downloader.clone();
        let limiter = Arc::clone(&self.limiter);
        let dest = self.embeds_dir.join(&file_name);

        tokio::spawn(async move {
            // The semaphore is never closed, so acquiring only fails if it were.
            let _permit = limiter.acquire_owned().await.ok()?;

            metrics::record_download_start(kind.label());
            let result = downloader.download(&url, &dest).await;
            metrics::record_download_result(kind.label(), result.is_ok());

            match result {
                Ok(_) => Some(format!("{}/{}", EMBEDS_DIR, file_name)),
                Err(err) => {
                    warn!("{}", err);
                    None
                }
            }
        })
    }
}

/// Join every pending download and slot its outcome into its embed.
async fn settle_pending(records: &mut [ExportedMessage], pending: Vec<PendingAsset>) {
    if !pending.is_empty() {
        info!("Waiting for {} embed downloads...", pending.len());
    }
    // Pending is in (message, embed, asset) order, so outcomes land deterministically.
    for asset in pending {
        let saved_as = match asset.handle.await {
            Ok(saved_as) => saved_as,
            Err(err) => {
                warn!("Embed download task for {} failed: {}", asset.url, err);
                None
            }
        };
        records[asset.message].embeds[asset.embed]
            .assets
            .push(AssetOutcome {
                kind: asset.kind,
                url: asset.url,
                saved_as,
            });
    }
}

/// Abort every pending download and remove files left by the aborted ones.
async fn cancel_pending(pending: Vec<PendingAsset>) {
    if pending.is_empty() {
        return;
    }
    warn!("Export aborted, cancelling {} embed downloads", pending.len());
    for asset in &pending {
        asset.handle.abort();
    }
    for asset in pending {
        if let Err(err) = asset.handle.await {
            if err.is_cancelled() {
                let _ = tokio::fs::remove_file(&asset.dest).await;
            }
        }
    }
}

/// Run a full export with the given configuration.
pub async fn run(config: &Config) -> Result<ExportSummary> {
    let start = Instant::now();
    let result = export_channel(config).await;
    metrics::record_run(start.elapsed(), result.is_ok());
    result
}

async fn export_channel(config: &Config) -> Result<ExportSummary> {
    config.validate()?;

    create_output_dirs(&config.output_dir)?;
    let _lock = ExportLock::acquire(&config.output_dir)?;

    let client = DiscordClient::new(&config.token, &config.api_base)?;
    let me = client.login().await?;
    info!("Logged in as {}", me);

    let channel = resolve_text_channel(&client, &config.channel_id).await?;

    info!("Fetching messages...");
    let messages = fetch_all_messages(&client, &channel.id, config.page_size).await?;

    let exporter = Exporter::new(Downloader::new(client.http().clone()), config);
    let records = exporter.export(&messages).await?;

    write_logs(&config.output_dir, &records, config.structured_log)?;

    let summary = ExportSummary::from_records(&records);
    info!(
        "Export complete: {} messages ({} attachments, {} embed assets, {} failed downloads)",
        summary.messages,
        summary.attachments_saved,
        summary.assets_saved,
        summary.attachments_failed + summary.assets_failed
    );
    Ok(summary)
}
