//! Reddit OAuth JSON client
//!
//! - Password grant (or client credentials when no username is configured)
//!   with the bearer token cached until shortly before expiry
//! - Listing pagination through the `after` cursor until exhausted
//! - Full comment-tree expansion via `/api/morechildren`
//! - Retry with exponential backoff on 5xx, 429 and transport timeouts

use super::{Comment, ContentSource, Redditor, Result, Submission};
use crate::config::RedditConfig;
use crate::utils::error::SourceError;
use crate::utils::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use reqwest::{header::USER_AGENT, Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const PAGE_SIZE: &str = "100";
const MORECHILDREN_BATCH: usize = 100;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// [`ContentSource`] backed by the Reddit API
pub struct RedditClient {
    client: Client,
    config: RedditConfig,
    token: RwLock<Option<AccessToken>>,
    retry: RetryConfig,
}

impl RedditClient {
    /// Create a client; no request is made until first use
    pub fn new(config: &RedditConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
            token: RwLock::new(None),
            retry: RetryConfig::default(),
        })
    }

    /// Override the retry policy for listing and lookup requests
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn access_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(t) = token.as_ref() {
                if Instant::now() + TOKEN_REFRESH_MARGIN < t.expires_at {
                    return Ok(t.value.clone());
                }
            }
        }

        let mut token = self.token.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(t) = token.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < t.expires_at {
                return Ok(t.value.clone());
            }
        }

        let form: Vec<(&str, &str)> = if self.config.username.is_empty() {
            vec![("grant_type", "client_credentials")]
        } else {
            vec![
                ("grant_type", "password"),
                ("username", self.config.username.as_str()),
                ("password", self.config.password.as_str()),
            ]
        };

        let response = self
            .client
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .header(USER_AGENT, &self.config.user_agent)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Auth(format!("token endpoint returned {status}")));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::Auth(format!("unexpected token response: {e}")))?;

        tracing::debug!(expires_in = parsed.expires_in, "Obtained Reddit access token");

        let value = parsed.access_token.clone();
        *token = Some(AccessToken {
            value: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        });
        Ok(value)
    }

    async fn request_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.api_base.trim_end_matches('/'), path);

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(token)
            .header(USER_AGENT, &self.config.user_agent)
            .query(&[("raw_json", "1")])
            .query(query);
        if let Some(form) = form {
            request = request.form(form);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match status {
            s if s.is_success() => {
                serde_json::from_str(&body).map_err(|e| SourceError::Decode(format!("{path}: {e}")))
            }
            StatusCode::NOT_FOUND => Err(SourceError::NotFound(path.to_string())),
            StatusCode::FORBIDDEN => Err(SourceError::Forbidden(path.to_string())),
            StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited),
            StatusCode::UNAUTHORIZED => {
                // token revoked early; force a refresh on the next attempt
                self.token.write().await.take();
                Err(SourceError::Api {
                    status: status.as_u16(),
                    message: "unauthorized".to_string(),
                })
            }
            _ => Err(SourceError::Api {
                status: status.as_u16(),
                message: body.chars().take(ERROR_BODY_LIMIT).collect(),
            }),
        }
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        with_retry_if(
            &self.retry,
            || self.request_once(Method::GET, path, query, None),
            |e: &SourceError| {
                e.is_transient() || matches!(e, SourceError::Api { status: 401, .. })
            },
        )
        .await
    }

    /// Walk a listing through its `after` cursor, collecting child ids
    async fn listing_ids(&self, path: &str, extra: &[(&str, &str)]) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("limit", PAGE_SIZE)];
            query.extend_from_slice(extra);
            if let Some(cursor) = after.as_deref() {
                query.push(("after", cursor));
            }

            let page = self.get(path, &query).await?;
            let data = &page["data"];
            let children = data["children"]
                .as_array()
                .ok_or_else(|| SourceError::Decode(format!("{path}: listing without children")))?;

            ids.extend(
                children
                    .iter()
                    .filter_map(|c| c["data"]["id"].as_str())
                    .map(String::from),
            );

            match data["after"].as_str() {
                Some(next) if !children.is_empty() => after = Some(next.to_string()),
                _ => break,
            }
        }

        tracing::debug!(path = %path, count = ids.len(), "Listing exhausted");
        Ok(ids)
    }

    async fn info<T: serde::de::DeserializeOwned>(&self, fullname: &str) -> Result<T> {
        let listing = self.get("/api/info", &[("id", fullname)]).await?;
        let data = listing["data"]["children"]
            .as_array()
            .and_then(|c| c.first())
            .map(|c| c["data"].clone())
            .ok_or_else(|| SourceError::NotFound(fullname.to_string()))?;
        decode(data, fullname)
    }

    async fn more_children(&self, link_id: &str, children: &[String]) -> Result<Vec<Value>> {
        let joined = children.join(",");
        let response = self
            .get(
                "/api/morechildren",
                &[
                    ("api_type", "json"),
                    ("link_id", link_id),
                    ("children", joined.as_str()),
                ],
            )
            .await?;
        Ok(response["json"]["data"]["things"]
            .as_array()
            .cloned()
            .unwrap_or_default())
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, context: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| SourceError::Decode(format!("{context}: {e}")))
}

/// Pending expansion work found while walking a comment tree
#[derive(Debug, Default)]
struct Expansion {
    more_ids: VecDeque<String>,
    continue_threads: Vec<String>,
}

/// Walk listing children depth-first, decoding comments and collecting `more` stubs
fn collect_things(
    things: &[Value],
    out: &mut Vec<Comment>,
    seen: &mut HashSet<String>,
    pending: &mut Expansion,
) -> Result<()> {
    for thing in things {
        let data = &thing["data"];
        match thing["kind"].as_str() {
            Some("t1") => {
                let comment: Comment = decode(data.clone(), "comment")?;
                let replies = data["replies"]["data"]["children"].as_array();
                if seen.insert(comment.id.clone()) {
                    out.push(comment);
                }
                if let Some(replies) = replies {
                    collect_things(replies, out, seen, pending)?;
                }
            }
            Some("more") => {
                let ids: Vec<String> = data["children"]
                    .as_array()
                    .map(|c| c.iter().filter_map(|v| v.as_str()).map(String::from).collect())
                    .unwrap_or_default();
                if ids.is_empty() {
                    // "continue this thread" stub: the subtree hangs off parent_id
                    if let Some(parent) = data["parent_id"].as_str().and_then(|p| p.strip_prefix("t1_")) {
                        pending.continue_threads.push(parent.to_string());
                    }
                } else {
                    pending.more_ids.extend(ids);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn list_submission_ids(&self, subreddit: &str) -> Result<Vec<String>> {
        self.listing_ids(&format!("/r/{subreddit}/hot"), &[]).await
    }

    async fn submission(&self, post_id: &str) -> Result<Submission> {
        self.info(&format!("t3_{post_id}")).await
    }

    async fn submission_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        let link_id = format!("t3_{post_id}");
        let path = format!("/comments/{post_id}");

        let mut comments = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = Expansion::default();

        let response = self.get(&path, &[("limit", "500")]).await?;
        let top = response[1]["data"]["children"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        collect_things(&top, &mut comments, &mut seen, &mut pending)?;

        loop {
            if !pending.more_ids.is_empty() {
                let take = pending.more_ids.len().min(MORECHILDREN_BATCH);
                let batch: Vec<String> = pending.more_ids.drain(..take).collect();
                let things = self.more_children(&link_id, &batch).await?;
                collect_things(&things, &mut comments, &mut seen, &mut pending)?;
            } else if let Some(parent) = pending.continue_threads.pop() {
                let thread = self.get(&path, &[("comment", parent.as_str())]).await?;
                let things = thread[1]["data"]["children"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default();
                collect_things(&things, &mut comments, &mut seen, &mut pending)?;
            } else {
                break;
            }
        }

        tracing::debug!(post_id = %post_id, count = comments.len(), "Expanded comment tree");
        Ok(comments)
    }

    async fn comment(&self, comment_id: &str) -> Result<Comment> {
        self.info(&format!("t1_{comment_id}")).await
    }

    async fn redditor(&self, name: &str) -> Result<Redditor> {
        let about = self.get(&format!("/user/{name}/about"), &[]).await?;
        let redditor: Redditor = decode(about["data"].clone(), name)?;
        if redditor.is_suspended {
            return Err(SourceError::Suspended(name.to_string()));
        }
        if redditor.id.is_empty() {
            return Err(SourceError::NotFound(name.to_string()));
        }
        Ok(redditor)
    }

    async fn redditor_comment_ids(&self, name: &str) -> Result<Vec<String>> {
        self.listing_ids(&format!("/user/{name}/comments"), &[("sort", "hot")])
            .await
    }

    async fn subscribe(&self, subreddit: &str) -> Result<()> {
        self.request_once(
            Method::POST,
            "/api/subscribe",
            &[],
            Some(&[("action", "sub"), ("sr_name", subreddit)][..]),
        )
        .await?;
        Ok(())
    }
}
