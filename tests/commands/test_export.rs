//! End-to-end tests for the export command against a mocked Discord API

use std::fs;
use std::path::Path;

use channel_exporter::commands::{self, export};
use channel_exporter::config::{Config, LOCK_FILE, PAGE_SIZE};
use channel_exporter::Error;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::tempdir;

fn config(server: &MockServer, output_dir: &Path) -> Config {
    Config {
        token: "test-token".into(),
        channel_id: "900".into(),
        api_base: server.base_url(),
        output_dir: output_dir.to_path_buf(),
        page_size: PAGE_SIZE,
        embed_concurrency: 4,
        strict_attachments: false,
        structured_log: false,
    }
}

fn mock_login(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/users/@me");
        then.status(200)
            .json_body(json!({ "id": "1", "username": "exporter", "discriminator": "0" }));
    });
}

fn mock_channel(server: &MockServer, kind: u8) {
    server.mock(|when, then| {
        when.method(GET).path("/channels/900");
        then.status(200)
            .json_body(json!({ "id": "900", "type": kind, "name": "general" }));
    });
}

#[tokio::test]
async fn exports_messages_attachments_and_embeds() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    mock_channel(&server, 0);

    let image_url = server.url("/cdn/banner.jpg?width=400");
    let page = server.mock(|when, then| {
        when.method(GET)
            .path("/channels/900/messages")
            .query_param("limit", "100");
        then.status(200).json_body(json!([
            {
                "id": "42",
                "author": { "id": "5", "username": "alice", "discriminator": "0001" },
                "timestamp": "2024-01-01T00:00:00.000000+00:00",
                "content": "hello",
                "attachments": [
                    { "id": "3", "filename": "cat.png", "url": server.url("/cdn/cat.png") }
                ],
                "embeds": []
            },
            {
                "id": "7",
                "author": { "id": "6", "username": "bob", "discriminator": "0" },
                "timestamp": "2023-12-31T23:59:00.000000+00:00",
                "content": "",
                "attachments": [],
                "embeds": [
                    { "title": "Hi", "image": { "url": image_url.clone() } }
                ]
            }
        ]));
    });
    let cat = server.mock(|when, then| {
        when.method(GET).path("/cdn/cat.png");
        then.status(200).body("cat-bytes");
    });
    server.mock(|when, then| {
        when.method(GET).path("/cdn/banner.jpg");
        then.status(500);
    });

    let dir = tempdir().unwrap();
    let result = export::run(&config(&server, dir.path())).await;
    assert_eq!(commands::exit_code(&result), 0);
    let summary = result.unwrap();

    page.assert_calls(1);
    cat.assert_calls(1);
    assert_eq!(summary.messages, 2);
    assert_eq!(summary.attachments_saved, 1);
    assert_eq!(summary.assets_failed, 1);

    let messages = fs::read_to_string(dir.path().join("messages.txt")).unwrap();
    assert_eq!(
        messages,
        "[2023-12-31T23:59:00.000Z] bob\n\n\
         [2024-01-01T00:00:00.000Z] alice#0001\n\
         hello\n\
         Attachment saved: attachments/42-cat.png\n"
    );

    let embeds = fs::read_to_string(dir.path().join("embeds.txt")).unwrap();
    assert_eq!(
        embeds,
        format!(
            "Message 7 — Embed 1\nTitle: Hi\nFailed to download image: {}\n",
            image_url
        )
    );

    assert_eq!(
        fs::read_to_string(dir.path().join("attachments/42-cat.png")).unwrap(),
        "cat-bytes"
    );
    assert!(!dir.path().join("embeds/7-embed-1-image.jpg").exists());
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[tokio::test]
async fn empty_channel_writes_empty_logs() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    mock_channel(&server, 0);
    let page = server.mock(|when, then| {
        when.method(GET).path("/channels/900/messages");
        then.status(200).json_body(json!([]));
    });

    let dir = tempdir().unwrap();
    let output = dir.path().join("fresh").join("output");
    let summary = export::run(&config(&server, &output)).await.unwrap();

    page.assert_calls(1);
    assert_eq!(summary.messages, 0);
    assert_eq!(fs::read_to_string(output.join("messages.txt")).unwrap(), "");
    assert_eq!(fs::read_to_string(output.join("embeds.txt")).unwrap(), "");
    assert!(output.join("attachments").is_dir());
    assert!(output.join("embeds").is_dir());
}

#[tokio::test]
async fn structured_log_is_written_when_enabled() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    mock_channel(&server, 0);
    server.mock(|when, then| {
        when.method(GET).path("/channels/900/messages");
        then.status(200).json_body(json!([
            {
                "id": "11",
                "author": { "id": "5", "username": "alice", "discriminator": "0" },
                "timestamp": "2024-03-01T12:00:00.000000+00:00",
                "content": "structured"
            }
        ]));
    });

    let dir = tempdir().unwrap();
    let config = Config {
        structured_log: true,
        ..config(&server, dir.path())
    };
    export::run(&config).await.unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("messages.json")).unwrap())
            .unwrap();
    assert_eq!(json[0]["id"], "11");
    assert_eq!(json[0]["author"], "alice");
    assert_eq!(json[0]["timestamp"], "2024-03-01T12:00:00.000Z");
    assert_eq!(json[0]["content"], "structured");
}

#[tokio::test]
async fn non_text_channel_is_rejected() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    mock_channel(&server, 4);

    let dir = tempdir().unwrap();
    let result = export::run(&config(&server, dir.path())).await;

    assert_eq!(commands::exit_code(&result), commands::EXIT_INVALID_CHANNEL);
    let err = result.unwrap_err();
    assert!(err.is_invalid_channel());
    assert!(matches!(err, Error::NotTextChannel { kind: 4, .. }));
    assert!(!dir.path().join("messages.txt").exists());
    assert!(!dir.path().join(LOCK_FILE).exists());
}

#[tokio::test]
async fn missing_channel_is_rejected() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    server.mock(|when, then| {
        when.method(GET).path("/channels/900");
        then.status(404)
            .json_body(json!({ "message": "Unknown Channel", "code": 10003 }));
    });

    let dir = tempdir().unwrap();
    let result = export::run(&config(&server, dir.path())).await;

    assert_eq!(commands::exit_code(&result), commands::EXIT_INVALID_CHANNEL);
    let err = result.unwrap_err();
    assert!(matches!(err, Error::ChannelNotFound(_)));
    assert!(err.is_invalid_channel());
}

#[tokio::test]
async fn pagination_failure_loses_all_logs() {
    let server = MockServer::start_async().await;
    mock_login(&server);
    mock_channel(&server, 0);
    server.mock(|when, then| {
        when.method(GET).path("/channels/900/messages");
        then.status(500).body("internal");
    });

    let dir = tempdir().unwrap();
    let result = export::run(&config(&server, dir.path())).await;

    assert_eq!(commands::exit_code(&result), commands::EXIT_FAILURE);
    let err = result.unwrap_err();
    assert!(matches!(err, Error::ApiError { status: 500, .. }));
    assert!(!err.is_invalid_channel());
    assert!(!dir.path().join("messages.txt").exists());
}

#[tokio::test]
async fn bad_token_fails_login() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/users/@me");
        then.status(401).body("401: Unauthorized");
    });

    let dir = tempdir().unwrap();
    let err = export::run(&config(&server, dir.path())).await.unwrap_err();

    assert!(matches!(err, Error::LoginFailed(_)));
}
