//! Integration tests for RedditClient using wiremock

mod common;

use serde_json::json;
use snoolens::source::{ContentSource, RedditClient};
use snoolens::utils::error::SourceError;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{comment_thing, fast_retry, listing, mount_token, reddit_config, TOKEN_PATH};

async fn client(server: &MockServer) -> RedditClient {
    mount_token(server).await;
    RedditClient::new(&reddit_config(server))
        .unwrap()
        .with_retry_config(fast_retry())
}

#[tokio::test]
async fn test_listing_follows_after_cursor() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    // the cursor-specific page is mounted first so it wins for page two
    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .and(query_param("after", "t3_b"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing("t3", &["c"], None)))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .and(query_param("limit", "100"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing("t3", &["a", "b"], Some("t3_b"))),
        )
        .mount(&server)
        .await;

    let ids = client.list_submission_ids("rust").await.unwrap();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_token_is_cached_between_requests() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing("t3", &["a"], None)))
        .mount(&server)
        .await;

    let client = RedditClient::new(&reddit_config(&server)).unwrap();
    client.list_submission_ids("rust").await.unwrap();
    client.list_submission_ids("rust").await.unwrap();
}

#[tokio::test]
async fn test_token_failure_is_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = RedditClient::new(&reddit_config(&server)).unwrap();
    let result = client.list_submission_ids("rust").await;
    assert!(matches!(result, Err(SourceError::Auth(_))), "{result:?}");
}

#[tokio::test]
async fn test_status_mapping() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/ghost/about"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/private/comments"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/busy/hot"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    assert!(matches!(
        client.redditor("ghost").await,
        Err(SourceError::NotFound(_))
    ));
    assert!(matches!(
        client.redditor_comment_ids("private").await,
        Err(SourceError::Forbidden(_))
    ));
    assert!(matches!(
        client.list_submission_ids("busy").await,
        Err(SourceError::RateLimited)
    ));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream busy"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing("t3", &["a"], None)))
        .mount(&server)
        .await;

    let ids = client.list_submission_ids("rust").await.unwrap();
    assert_eq!(ids, vec!["a"]);
}

#[tokio::test]
async fn test_server_error_after_retries_keeps_status() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    match client.list_submission_ids("rust").await {
        Err(SourceError::Api { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_suspended_redditor() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/user/banned/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "t2",
            "data": { "name": "banned", "is_suspended": true }
        })))
        .mount(&server)
        .await;

    assert!(matches!(
        client.redditor("banned").await,
        Err(SourceError::Suspended(_))
    ));
}

#[tokio::test]
async fn test_submission_lookup_via_info() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("id", "t3_p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Listing",
            "data": { "children": [{ "kind": "t3", "data": {
                "id": "p1",
                "subreddit": "rust",
                "author": "ferris",
                "title": "Why is my borrow checker sad",
                "selftext": "details",
                "created_utc": 1_700_000_000.0,
                "ups": 12
            }}]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("id", "t3_gone"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing("t3", &[], None)))
        .mount(&server)
        .await;

    let post = client.submission("p1").await.unwrap();
    assert_eq!(post.author.as_deref(), Some("ferris"));
    assert_eq!(post.ups, 12);

    assert!(matches!(
        client.submission("gone").await,
        Err(SourceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_comment_tree_expands_more_children() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    let tree = json!([
        listing("t3", &["p1"], None),
        {
            "kind": "Listing",
            "data": { "children": [
                comment_thing("c1", "t3_p1", vec![
                    comment_thing("c2", "t1_c1", vec![]),
                    json!({ "kind": "more", "data": { "children": ["c3"], "parent_id": "t1_c1" } })
                ]),
                json!({ "kind": "more", "data": { "children": [], "parent_id": "t1_c2" } })
            ]}
        }
    ]);
    Mock::given(method("GET"))
        .and(path("/comments/p1"))
        .and(query_param("comment", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            listing("t3", &["p1"], None),
            { "kind": "Listing", "data": { "children": [
                comment_thing("c2", "t1_c1", vec![comment_thing("c4", "t1_c2", vec![])])
            ]}}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/comments/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tree))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/morechildren"))
        .and(query_param("link_id", "t3_p1"))
        .and(query_param("children", "c3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "json": { "errors": [], "data": { "things": [comment_thing("c3", "t1_c1", vec![])] } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let comments = client.submission_comments("p1").await.unwrap();
    let mut ids: Vec<&str> = comments.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4"]);

    let c4 = comments.iter().find(|c| c.id == "c4").unwrap();
    assert_eq!(c4.parent_comment_id(), Some("c2"));
}

#[tokio::test]
async fn test_subscribe_posts_form() {
    let server = MockServer::start().await;
    let client = client(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/subscribe"))
        .and(body_string_contains("action=sub"))
        .and(body_string_contains("sr_name=learnrust"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client.subscribe("learnrust").await.unwrap();
}
