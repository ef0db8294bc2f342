//! Discord REST API client.
//!
//! Covers the three calls an export needs: who am I (login check),
//! channel lookup, and paginated message history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::chat::MessageSource;
use crate::models::{Attachment, Channel, Embed, EmbedMedia, Message};
use crate::{Error, Result};

const CLIENT_USER_AGENT: &str = concat!(
    "DiscordBot (https://github.com/channel-exporter, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Discord client holding one authenticated session for the whole run.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: Client,
    base_url: String,
    authorization: String,
}

impl DiscordClient {
    /// Create client for the given token and API base URL.
    ///
    /// A bare token is sent as a bot token; `Bot ...` or `Bearer ...` is sent as is.
    pub fn new(token: &str, base_url: &str) -> Result<Self> {
        let token = token.trim();
        let authorization = if token.starts_with("Bot ") || token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bot {}", token)
        };

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::RequestError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    /// Underlying HTTP client, shared with the downloader.
    ///
    /// It carries no credentials; the token is only attached to API calls.
    pub fn http(&self) -> &Client {
        &self.http
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, &self.authorization)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Verify the token and return the account tag.
    pub async fn login(&self) -> Result<String> {
        match self.get_json::<ApiUser>("/users/@me", &[]).await {
            Ok(user) => Ok(user.tag()),
            Err(Error::ApiError { status, body }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                Err(Error::LoginFailed(body))
            }
            Err(err) => Err(err),
        }
    }

    /// Look up a channel by id.
    pub async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        match self
            .get_json::<ApiChannel>(&format!("/channels/{}", channel_id), &[])
            .await
        {
            Ok(channel) => Ok(Channel {
                id: channel.id,
                name: channel.name,
                kind: channel.kind,
            }),
            Err(Error::ApiError { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(Error::ChannelNotFound(channel_id.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch one page of messages, newest first.
    pub async fn fetch_messages(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<Message>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }

        let page: Vec<ApiMessage> = self
            .get_json(&format!("/channels/{}/messages", channel_id), &query)
            .await?;

        Ok(page.into_iter().map(Message::from).collect())
    }
}

#[async_trait]
impl MessageSource for DiscordClient {
    async fn fetch_page(
        &self,
        channel_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<Message>> {
        self.fetch_messages(channel_id, limit, before).await
    }
}

// Wire types

#[derive(Debug, Deserialize)]
struct ApiUser {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

impl ApiUser {
    /// `name#1234`, or just `name` for accounts without a discriminator.
    fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            None | Some("") | Some("0") => self.username.clone(),
            Some(discriminator) => format!("{}#{}", self.username, discriminator),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    id: String,
    author: ApiUser,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<ApiAttachment>,
    #[serde(default)]
    embeds: Vec<ApiEmbed>,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {
    url: String,
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ApiEmbed {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    image: Option<ApiMedia>,
    thumbnail: Option<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    url: Option<String>,
}

impl From<ApiMessage> for Message {
    fn from(msg: ApiMessage) -> Self {
        Self {
            author: msg.author.tag(),
            id: msg.id,
            timestamp: msg.timestamp,
            content: msg.content,
            attachments: msg
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    url: a.url,
                    name: a.filename,
                })
                .collect(),
            embeds: msg
                .embeds
                .into_iter()
                .map(|e| Embed {
                    title: e.title,
                    description: e.description,
                    url: e.url,
                    image: e.image.map(|m| EmbedMedia { url: m.url }),
                    thumbnail: e.thumbnail.map(|m| EmbedMedia { url: m.url }),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> DiscordClient {
        DiscordClient::new("test-token", &server.base_url()).unwrap()
    }

    #[tokio::test]
    async fn login_returns_tag_and_sends_bot_token() {
        let server = MockServer::start_async().await;

        let me_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/users/@me")
                .header("authorization", "Bot test-token");
            then.status(200).json_body(json!({
                "id": "1",
                "username": "exporter",
                "discriminator": "4321"
            }));
        });

        let tag = client(&server).login().await.unwrap();

        assert_eq!(tag, "exporter#4321");
        me_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn login_reports_unauthorized() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/users/@me");
            then.status(401).body("401: Unauthorized");
        });

        let err = client(&server).login().await.unwrap_err();
        assert!(matches!(err, Error::LoginFailed(_)));
    }

    #[tokio::test]
    async fn explicit_token_scheme_is_kept() {
        let server = MockServer::start_async().await;

        let me_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/users/@me")
                .header("authorization", "Bearer oauth-token");
            then.status(200)
                .json_body(json!({ "id": "1", "username": "someone", "discriminator": "0" }));
        });

        let client = DiscordClient::new("Bearer oauth-token", &server.base_url()).unwrap();
        assert_eq!(client.login().await.unwrap(), "someone");
        me_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn fetch_channel_maps_not_found() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/channels/404404");
            then.status(404)
                .json_body(json!({ "message": "Unknown Channel", "code": 10003 }));
        });

        let err = client(&server).fetch_channel("404404").await.unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound(ref id) if id == "404404"));
    }

    #[tokio::test]
    async fn fetch_channel_returns_type() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/channels/10");
            then.status(200)
                .json_body(json!({ "id": "10", "type": 0, "name": "general" }));
        });

        let channel = client(&server).fetch_channel("10").await.unwrap();
        assert_eq!(channel.id, "10");
        assert_eq!(channel.name.as_deref(), Some("general"));
        assert!(channel.is_text_based());
    }

    #[tokio::test]
    async fn fetch_messages_passes_cursor_and_maps_fields() {
        let server = MockServer::start_async().await;

        let page_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/channels/10/messages")
                .query_param("limit", "100")
                .query_param("before", "99");
            then.status(200).json_body(json!([
                {
                    "id": "98",
                    "author": { "id": "5", "username": "alice", "discriminator": "0001" },
                    "timestamp": "2024-01-01T00:00:00.000000+00:00",
                    "content": "hello",
                    "attachments": [
                        { "id": "1", "filename": "cat.png", "url": "https://cdn.example/cat.png" }
                    ],
                    "embeds": [
                        {
                            "title": "Hi",
                            "image": { "url": "https://cdn.example/img.jpg" },
                            "thumbnail": { "url": "https://cdn.example/thumb.webp" }
                        }
                    ]
                }
            ]));
        });

        let messages = client(&server)
            .fetch_messages("10", 100, Some("99"))
            .await
            .unwrap();

        page_mock.assert_calls(1);
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.id, "98");
        assert_eq!(msg.author, "alice#0001");
        assert_eq!(msg.iso_timestamp(), "2024-01-01T00:00:00.000Z");
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.attachments[0].name, "cat.png");
        assert_eq!(msg.embeds[0].title.as_deref(), Some("Hi"));
        assert_eq!(msg.embeds[0].assets().count(), 2);
    }

    #[tokio::test]
    async fn fetch_messages_reports_api_error() {
        let server = MockServer::start_async().await;

        server.mock(|when, then| {
            when.method(GET).path("/channels/10/messages");
            then.status(403).body("Missing Access");
        });

        let err = client(&server)
            .fetch_messages("10", 100, None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ApiError { status: 403, .. }));
        assert!(err.to_string().contains("Missing Access"));
    }

    #[test]
    fn tag_drops_zero_discriminator() {
        let user = ApiUser {
            username: "bob".into(),
            discriminator: Some("0".into()),
        };
        assert_eq!(user.tag(), "bob");

        let legacy = ApiUser {
            username: "bob".into(),
            discriminator: Some("0420".into()),
        };
        assert_eq!(legacy.tag(), "bob#0420");

        let missing = ApiUser {
            username: "carol".into(),
            discriminator: None,
        };
        assert_eq!(missing.tag(), "carol");
    }
}
