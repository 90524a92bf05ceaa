//! Common test utilities

#![allow(dead_code)]

use serde_json::{json, Value};
use snoolens::config::RedditConfig;
use snoolens::source::{Comment, Submission};
use snoolens::utils::retry::RetryConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/api/v1/access_token";

/// Reddit config pointing both the API and the token endpoint at `server`
pub fn reddit_config(server: &MockServer) -> RedditConfig {
    RedditConfig {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
        username: "bot".to_string(),
        password: "hunter2".to_string(),
        api_base: server.uri(),
        token_url: format!("{}{TOKEN_PATH}", server.uri()),
        request_timeout_secs: 5,
        ..Default::default()
    }
}

/// Millisecond backoff so retry tests stay fast
pub fn fast_retry() -> RetryConfig {
    RetryConfig::with_delays(2, 1, 5)
}

pub async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "*"
        })))
        .mount(server)
        .await;
}

/// Listing page wrapping `things` with an optional `after` cursor
pub fn listing(kind: &str, ids: &[&str], after: Option<&str>) -> Value {
    let children: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "kind": kind, "data": { "id": id } }))
        .collect();
    json!({
        "kind": "Listing",
        "data": { "after": after, "children": children }
    })
}

pub fn comment_thing(id: &str, parent: &str, replies: Vec<Value>) -> Value {
    let replies = if replies.is_empty() {
        json!("")
    } else {
        json!({ "kind": "Listing", "data": { "children": replies } })
    };
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "author": "ferris",
            "body": format!("comment {id}"),
            "parent_id": parent,
            "link_id": "t3_p1",
            "subreddit": "rust",
            "edited": false,
            "created_utc": 1_700_000_000.0,
            "ups": 1,
            "replies": replies
        }
    })
}

pub fn submission(id: &str, author: &str, body: &str) -> Submission {
    Submission {
        id: id.to_string(),
        subreddit: "rust".to_string(),
        author: Some(author.to_string()),
        title: format!("title {id}"),
        selftext: body.to_string(),
        created_utc: 1_700_000_000.0,
        ups: 10,
        ..Default::default()
    }
}

pub fn comment(id: &str, post_id: &str, parent: &str, author: &str, body: &str) -> Comment {
    Comment {
        id: id.to_string(),
        author: Some(author.to_string()),
        body: body.to_string(),
        parent_id: parent.to_string(),
        link_id: format!("t3_{post_id}"),
        subreddit: "rust".to_string(),
        created_utc: 1_700_000_100.0,
        ups: 2,
        ..Default::default()
    }
}
