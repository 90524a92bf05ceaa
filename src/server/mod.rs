//! HTTP control surface
//!
//! ```text
//!   POST /login ──► shared secret ──► HS256 token
//!   GET  /version, /metrics            (open)
//!   GET  /get_sub_posts, /analyze_posts, ...
//!        │ require_bearer
//!        ▼
//!   spawn(engine op) ──► 200 {"message": "<name> endpoint"}
//! ```
//!
//! Triggers acknowledge immediately; the work runs in a detached task and its
//! outcome is visible only in logs and the `service_logs` / `errors` tables.

pub mod auth;

use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analysis::AnalysisEngine;
use crate::ingest::IngestEngine;
use crate::journal::Journal;
use crate::services::Services;

pub use auth::{Claims, TokenService};

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestEngine>,
    pub analysis: Arc<AnalysisEngine>,
    pub journal: Arc<Journal>,
    pub tokens: Arc<TokenService>,
    pub shared_secret: Arc<String>,
}

impl AppState {
    pub fn from_services(services: &Services) -> crate::Result<Self> {
        let server = &services.config.server;
        Ok(Self {
            ingest: Arc::new(services.ingest_engine()),
            analysis: services.analysis_engine()?,
            journal: Arc::new(services.journal()),
            tokens: Arc::new(TokenService::new(
                &server.jwt_secret,
                server.identity.clone(),
                server.token_lifetime_secs,
            )),
            shared_secret: Arc::new(server.shared_secret.clone()),
        })
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    let triggers = Router::new()
        .route("/get_sub_posts", get(get_sub_posts))
        .route("/get_sub_post", get(get_sub_post))
        .route("/get_author_comments", get(get_author_comments))
        .route("/get_authors_comments", get(get_authors_comments))
        .route("/analyze_post", get(analyze_post))
        .route("/analyze_posts", get(analyze_posts))
        .route("/analyze_comment", get(analyze_comment))
        .route("/analyze_comments", get(analyze_comments))
        .route("/join_new_subs", get(join_new_subs))
        .route("/get_and_analyze_post", get(get_and_analyze_post))
        .route("/get_and_analyze_comment", get(get_and_analyze_comment))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/login", post(auth::login))
        .route("/version", get(version))
        .route("/metrics", get(metrics))
        .merge(triggers)
        .with_state(state)
}

/// Router with the CORS and request tracing layers applied
pub fn build_router(state: AppState) -> Router {
    create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until `shutdown_signal` resolves
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Control surface listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("Control surface shutdown complete");
    Ok(())
}

// ============================================================================
// Open handlers
// ============================================================================

async fn version() -> impl IntoResponse {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn metrics() -> Response {
    match crate::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Triggers
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubQuery {
    pub sub: String,
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub post_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub comment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorQuery {
    pub author: String,
}

/// Run `work` detached and acknowledge the trigger
fn acknowledge<F, T>(state: &AppState, name: &'static str, work: F) -> Response
where
    F: Future<Output = crate::Result<T>> + Send + 'static,
    T: std::fmt::Debug + Send + 'static,
{
    crate::metrics::record_api_request(name, 200);
    let journal = Arc::clone(&state.journal);

    tokio::spawn(async move {
        match work.await {
            Ok(result) => {
                tracing::info!(trigger = name, ?result, "Trigger finished");
            }
            Err(e) => {
                tracing::error!(trigger = name, error = %e, "Trigger failed");
                journal.error(&format!("{name} failed: {e}")).await;
            }
        }
    });

    (
        StatusCode::OK,
        Json(json!({ "message": format!("{name} endpoint") })),
    )
        .into_response()
}

async fn get_sub_posts(State(state): State<AppState>, Query(q): Query<SubQuery>) -> Response {
    let ingest = Arc::clone(&state.ingest);
    acknowledge(&state, "get_sub_posts", async move {
        ingest.ingest_subreddit(&q.sub).await
    })
}

async fn get_sub_post(State(state): State<AppState>, Query(q): Query<PostQuery>) -> Response {
    let ingest = Arc::clone(&state.ingest);
    acknowledge(&state, "get_sub_post", async move {
        ingest.ingest_post(&q.post_id).await
    })
}

async fn get_author_comments(
    State(state): State<AppState>,
    Query(q): Query<AuthorQuery>,
) -> Response {
    let ingest = Arc::clone(&state.ingest);
    acknowledge(&state, "get_author_comments", async move {
        ingest.ingest_author_comments(&q.author).await
    })
}

async fn get_authors_comments(State(state): State<AppState>) -> Response {
    let ingest = Arc::clone(&state.ingest);
    acknowledge(&state, "get_authors_comments", async move {
        ingest.ingest_all_author_comments().await
    })
}

async fn analyze_post(State(state): State<AppState>, Query(q): Query<PostQuery>) -> Response {
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "analyze_post", async move {
        analysis.analyze_post(&q.post_id).await
    })
}

async fn analyze_posts(State(state): State<AppState>) -> Response {
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "analyze_posts", async move {
        analysis.analyze_pending_posts().await
    })
}

async fn analyze_comment(State(state): State<AppState>, Query(q): Query<CommentQuery>) -> Response {
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "analyze_comment", async move {
        analysis.analyze_comment(&q.comment_id).await
    })
}

async fn analyze_comments(State(state): State<AppState>) -> Response {
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "analyze_comments", async move {
        analysis.analyze_pending_comments().await
    })
}

async fn join_new_subs(State(state): State<AppState>) -> Response {
    let ingest = Arc::clone(&state.ingest);
    acknowledge(&state, "join_new_subs", async move {
        ingest.join_new_subreddits().await
    })
}

async fn get_and_analyze_post(
    State(state): State<AppState>,
    Query(q): Query<PostQuery>,
) -> Response {
    let ingest = Arc::clone(&state.ingest);
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "get_and_analyze_post", async move {
        analysis.fetch_and_analyze_post(&ingest, &q.post_id).await
    })
}

async fn get_and_analyze_comment(
    State(state): State<AppState>,
    Query(q): Query<CommentQuery>,
) -> Response {
    let ingest = Arc::clone(&state.ingest);
    let analysis = Arc::clone(&state.analysis);
    acknowledge(&state, "get_and_analyze_comment", async move {
        analysis
            .fetch_and_analyze_comment(&ingest, &q.comment_id)
            .await
    })
}

// ============================================================================
// Tests
// ============================================================================
