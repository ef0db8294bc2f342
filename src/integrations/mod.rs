//! External service integrations

pub mod discord;

pub use discord::DiscordClient;
