//! Configuration for the Discord API and export layout
//!
//! Loads configuration from config.yml file, `.env` and the environment

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Error, Result};
use crate::export::{ATTACHMENTS_DIR, EMBEDS_DIR};

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_OUTPUT_DIR: &str = "./output";
pub const LOCK_FILE: &str = ".export.lock";
pub const PAGE_SIZE: usize = 100;
pub const DEFAULT_EMBED_CONCURRENCY: usize = 8;
/// Config files looked up, in order, when none is given explicitly
pub const CONFIG_PATHS: [&str; 2] = ["config.yml", "../config.yml"];

/// YAML config structures
#[derive(Debug, Deserialize)]
struct YamlConfig {
    discord: Option<DiscordConfig>,
    export: Option<ExportConfig>,
}

#[derive(Debug, Deserialize)]
struct DiscordConfig {
    token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    channel_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportConfig {
    output_dir: Option<String>,
    page_size: Option<usize>,
    embed_concurrency: Option<usize>,
    strict_attachments: Option<bool>,
    structured_log: Option<bool>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Main configuration struct
#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub channel_id: String,
    pub api_base: String,
    pub output_dir: PathBuf,
    pub page_size: usize,
    pub embed_concurrency: usize,
    pub strict_attachments: bool,
    pub structured_log: bool,
}

// The token never shows up in logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("channel_id", &self.channel_id)
            .field("api_base", &self.api_base)
            .field("output_dir", &self.output_dir)
            .field("page_size", &self.page_size)
            .field("embed_concurrency", &self.embed_concurrency)
            .field("strict_attachments", &self.strict_attachments)
            .field("structured_log", &self.structured_log)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml string values
    pub fn new() -> Self {
        Self::discover(&CONFIG_PATHS).unwrap_or_else(|err| {
            warn!("{}, falling back to the environment", err);
            Self::from_env()
        })
    }

    /// Load the first config file in `paths` that exists, or the environment
    /// when none does. A file that exists but cannot be read or parsed is an error.
    pub fn discover<P: AsRef<Path>>(paths: &[P]) -> std::result::Result<Self, String> {
        for path in paths {
            let path: &Path = path.as_ref();
            if path.is_file() {
                return Self::load_from_file(path)
                    .map_err(|e| format!("{} ({})", e, path.display()));
            }
        }
        Ok(Self::from_env())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if v.starts_with("${") && v.ends_with('}') {
                let var_name = &v[2..v.len() - 1];
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        // An unresolved placeholder is as good as missing
        value.filter(|v| !(v.starts_with("${") && v.ends_with('}')))
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, String> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        let discord = yaml.discord.unwrap_or(DiscordConfig {
            token: None,
            channel_id: None,
            api_base: None,
        });

        let export = yaml.export.unwrap_or(ExportConfig {
            output_dir: None,
            page_size: None,
            embed_concurrency: None,
            strict_attachments: None,
            structured_log: None,
        });

        Ok(Self::resolve(discord, export))
    }

    /// Build config from `.env` and the environment only
    pub fn from_env() -> Self {
        Self::load_dotenv();
        Self::resolve(
            DiscordConfig {
                token: None,
                channel_id: None,
                api_base: None,
            },
            ExportConfig {
                output_dir: None,
                page_size: None,
                embed_concurrency: None,
                strict_attachments: None,
                structured_log: None,
            },
        )
    }

    fn resolve(discord: DiscordConfig, export: ExportConfig) -> Self {
        let token = Self::resolve_env_string(discord.token, "DISCORD_TOKEN").unwrap_or_default();
        let channel_id =
            Self::resolve_env_string(discord.channel_id, "DISCORD_CHANNEL_ID").unwrap_or_default();
        let api_base = Self::resolve_env_string(discord.api_base, "DISCORD_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let output_dir = Self::resolve_env_string(export.output_dir, "EXPORT_OUTPUT_DIR")
            .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());

        Self {
            token: token.trim().to_string(),
            channel_id: channel_id.trim().to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            output_dir: PathBuf::from(output_dir),
            page_size: export.page_size.unwrap_or(PAGE_SIZE),
            embed_concurrency: export
                .embed_concurrency
                .unwrap_or(DEFAULT_EMBED_CONCURRENCY),
            strict_attachments: export.strict_attachments.unwrap_or(false),
            structured_log: export.structured_log.unwrap_or(false),
        }
    }

    /// Check that everything needed for a run is present.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::InvalidArgument(
                "Discord token is not set (discord.token or DISCORD_TOKEN)".into(),
            ));
        }
        if self.channel_id.is_empty() {
            return Err(Error::InvalidArgument(
                "Channel id is not set (discord.channel_id or DISCORD_CHANNEL_ID)".into(),
            ));
        }
        if !self.channel_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidArgument(format!(
                "Channel id must be numeric, got '{}'",
                self.channel_id
            )));
        }
        if self.page_size == 0 || self.page_size > PAGE_SIZE {
            return Err(Error::InvalidArgument(format!(
                "export.page_size must be within 1..={}, got {}",
                PAGE_SIZE, self.page_size
            )));
        }
        if self.embed_concurrency == 0 {
            return Err(Error::InvalidArgument(
                "export.embed_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.output_dir.join(ATTACHMENTS_DIR)
    }

    pub fn embeds_dir(&self) -> PathBuf {
        self.output_dir.join(EMBEDS_DIR)
    }
}
