//! PostgreSQL store on a deadpool connection pool
//!
//! Analysis documents live in a JSONB column; the one-document-per-(item, model)
//! rule is a unique expression index so concurrent writers cannot duplicate it.

use super::{
    insert_sql, CommentRecord, ItemKind, PostRecord, Record, Result, SqlValue, Store, Table,
};
use crate::utils::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    subreddit TEXT NOT NULL,
    post_id TEXT PRIMARY KEY,
    post_author TEXT NOT NULL,
    post_title TEXT NOT NULL,
    post_body TEXT NOT NULL,
    post_created_utc BIGINT NOT NULL,
    is_post_oc BOOLEAN NOT NULL DEFAULT FALSE,
    is_post_video BOOLEAN NOT NULL DEFAULT FALSE,
    post_upvote_count BIGINT NOT NULL DEFAULT 0,
    post_downvote_count BIGINT NOT NULL DEFAULT 0,
    subreddit_members BIGINT NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    comment_author TEXT NOT NULL,
    is_comment_submitter BOOLEAN NOT NULL DEFAULT FALSE,
    is_comment_edited BOOLEAN NOT NULL DEFAULT FALSE,
    comment_created_utc BIGINT NOT NULL,
    comment_upvote_count BIGINT NOT NULL DEFAULT 0,
    comment_downvote_count BIGINT NOT NULL DEFAULT 0,
    comment_body TEXT NOT NULL,
    post_id TEXT NOT NULL,
    subreddit TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);

CREATE TABLE IF NOT EXISTS authors (
    author_id TEXT PRIMARY KEY,
    author_name TEXT NOT NULL,
    author_created_utc BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_documents (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    shasum_512 TEXT NOT NULL,
    analysis_document JSONB NOT NULL,
    ollama_ver TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_analysis_reference_llm
    ON analysis_documents ((analysis_document ->> 'reference_id'), (analysis_document ->> 'llm'));

CREATE TABLE IF NOT EXISTS prompt_completion_details (
    id BIGSERIAL PRIMARY KEY,
    doc_shasum_512 TEXT NOT NULL,
    ollama_host TEXT NOT NULL,
    ollama_ver TEXT NOT NULL,
    name TEXT NOT NULL,
    model TEXT NOT NULL,
    size BIGINT NOT NULL,
    digest TEXT NOT NULL,
    details JSONB,
    expires_at TEXT,
    size_vram BIGINT NOT NULL,
    prompt_completion_time DOUBLE PRECISION NOT NULL,
    tokens_per_second DOUBLE PRECISION NOT NULL
);

CREATE TABLE IF NOT EXISTS parent_child_tree_data (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    shasum256 TEXT NOT NULL,
    post_id TEXT NOT NULL,
    parent_child_tree JSONB NOT NULL,
    UNIQUE (post_id, shasum256)
);

CREATE TABLE IF NOT EXISTS subscription (
    datetimesubscribed TIMESTAMPTZ NOT NULL,
    subreddit TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS errors (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    stage TEXT NOT NULL,
    item_id TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS service_logs (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL,
    log_json JSONB NOT NULL
);
"#;

const POST_COLUMNS: &str = "subreddit, post_id, post_author, post_title, post_body, \
    post_created_utc, is_post_oc, is_post_video, post_upvote_count, post_downvote_count, \
    subreddit_members";

const COMMENT_COLUMNS: &str = "comment_id, comment_author, is_comment_submitter, \
    is_comment_edited, comment_created_utc, comment_upvote_count, comment_downvote_count, \
    comment_body, post_id, subreddit";

/// PostgreSQL implementation of [`Store`]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Create the pool, verify connectivity and ensure the schema exists
    pub async fn connect(url: &str, pool_size: usize) -> Result<Self> {
        let mut cfg = PgConfig::new();
        cfg.url = Some(url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(format!("Failed to create PostgreSQL pool: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;

        tracing::info!(pool_size = pool_size, "PostgreSQL store initialized");
        Ok(store)
    }

    /// Create tables and indexes
    pub async fn init_schema(&self) -> Result<()> {
        let client = self.pool.get().await?;
        logged("init_schema", client.batch_execute(SCHEMA).await)?;
        Ok(())
    }

    /// Run a raw statement and return its rows
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let client = self.pool.get().await?;
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        logged("query", client.query(sql, &params).await)
    }

    /// Run a raw statement and return rows as column-name maps
    pub async fn query_dict(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<Map<String, Value>>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.iter().map(row_to_map).collect())
    }

    async fn single_column(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<String>> {
        let rows = self.query(sql, params).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<_, Option<String>>(0))
            .collect())
    }
}

fn logged<T>(
    operation: &str,
    result: std::result::Result<T, tokio_postgres::Error>,
) -> Result<T> {
    result.map_err(|e| {
        tracing::error!(
            operation = operation,
            error = %e,
            detail = ?e.as_db_error(),
            "PostgreSQL operation failed"
        );
        StoreError::Postgres(e)
    })
}

fn row_to_map(row: &Row) -> Map<String, Value> {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::NAME {
            row.try_get::<_, Option<String>>(idx).ok().flatten().map(Value::from)
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx).ok().flatten().map(Value::from)
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx).ok().flatten().map(Value::from)
        } else if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx).ok().flatten().map(Value::from)
        } else if *ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx).ok().flatten().map(Value::from)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            row.try_get::<_, Option<Value>>(idx).ok().flatten()
        } else if *ty == Type::TIMESTAMPTZ {
            row.try_get::<_, Option<DateTime<Utc>>>(idx)
                .ok()
                .flatten()
                .map(|t| Value::from(t.to_rfc3339()))
        } else {
            None
        };
        map.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    map
}

fn post_from_row(row: &Row) -> std::result::Result<PostRecord, tokio_postgres::Error> {
    Ok(PostRecord {
        subreddit: row.try_get("subreddit")?,
        post_id: row.try_get("post_id")?,
        post_author: row.try_get("post_author")?,
        post_title: row.try_get("post_title")?,
        post_body: row.try_get("post_body")?,
        post_created_utc: row.try_get("post_created_utc")?,
        is_post_oc: row.try_get("is_post_oc")?,
        is_post_video: row.try_get("is_post_video")?,
        post_upvote_count: row.try_get("post_upvote_count")?,
        post_downvote_count: row.try_get("post_downvote_count")?,
        subreddit_members: row.try_get("subreddit_members")?,
    })
}

fn comment_from_row(row: &Row) -> std::result::Result<CommentRecord, tokio_postgres::Error> {
    Ok(CommentRecord {
        comment_id: row.try_get("comment_id")?,
        comment_author: row.try_get("comment_author")?,
        is_comment_submitter: row.try_get("is_comment_submitter")?,
        is_comment_edited: row.try_get("is_comment_edited")?,
        comment_created_utc: row.try_get("comment_created_utc")?,
        comment_upvote_count: row.try_get("comment_upvote_count")?,
        comment_downvote_count: row.try_get("comment_downvote_count")?,
        comment_body: row.try_get("comment_body")?,
        post_id: row.try_get("post_id")?,
        subreddit: row.try_get("subreddit")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn insert(&self, record: &dyn Record) -> Result<bool> {
        let (sql, values) = insert_sql(record, |i| format!("${i}"));
        let client = self.pool.get().await?;
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let written = logged("insert", client.execute(sql.as_str(), &params).await)?;
        tracing::trace!(table = %record.table(), written = written, "Insert");
        Ok(written > 0)
    }

    async fn existing_ids(&self, table: Table, column: &str) -> Result<HashSet<String>> {
        let column = table.checked_column(column)?;
        let sql = format!("SELECT {column} FROM {table} GROUP BY {column}");
        Ok(self
            .single_column(&sql, &[])
            .await?
            .into_iter()
            .collect())
    }

    async fn unanalyzed_ids(&self, kind: ItemKind) -> Result<Vec<String>> {
        let sql = match kind {
            ItemKind::Post => {
                r#"SELECT post_id FROM posts
                   WHERE BTRIM(post_body, ' ' || chr(9) || chr(10) || chr(13)) NOT IN ('', '[removed]', '[deleted]')
                   AND NOT EXISTS (
                       SELECT 1 FROM analysis_documents a
                       WHERE a.analysis_document ->> 'reference_id' = posts.post_id
                          OR a.analysis_document ->> 'post_id' = posts.post_id
                   )
                   ORDER BY post_created_utc"#
            }
            ItemKind::Comment => {
                r#"SELECT comment_id FROM comments
                   WHERE BTRIM(comment_body, ' ' || chr(9) || chr(10) || chr(13)) NOT IN ('', '[removed]', '[deleted]')
                   AND NOT EXISTS (
                       SELECT 1 FROM analysis_documents a
                       WHERE a.analysis_document ->> 'reference_id' = comments.comment_id
                          OR a.analysis_document ->> 'comment_id' = comments.comment_id
                   )
                   ORDER BY comment_created_utc"#
            }
        };
        self.single_column(sql, &[]).await
    }

    async fn load_post(&self, post_id: &str) -> Result<Option<PostRecord>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE post_id = $1 AND BTRIM(post_body, ' ' || chr(9) || chr(10) || chr(13)) NOT IN ('', '[removed]', '[deleted]')"
        );
        let rows = self.query(&sql, &[post_id.into()]).await?;
        rows.first()
            .map(post_from_row)
            .transpose()
            .map_err(|e| StoreError::Conversion(e.to_string()))
    }

    async fn load_comment(&self, comment_id: &str) -> Result<Option<CommentRecord>> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments \
             WHERE comment_id = $1 AND BTRIM(comment_body, ' ' || chr(9) || chr(10) || chr(13)) NOT IN ('', '[removed]', '[deleted]')"
        );
        let rows = self.query(&sql, &[comment_id.into()]).await?;
        rows.first()
            .map(comment_from_row)
            .transpose()
            .map_err(|e| StoreError::Conversion(e.to_string()))
    }

    async fn has_post(&self, post_id: &str) -> Result<bool> {
        let rows = self
            .query(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = $1)",
                &[post_id.into()],
            )
            .await?;
        Ok(rows.first().is_some_and(|row| row.get::<_, bool>(0)))
    }

    async fn has_comment(&self, comment_id: &str) -> Result<bool> {
        let rows = self
            .query(
                "SELECT EXISTS(SELECT 1 FROM comments WHERE comment_id = $1)",
                &[comment_id.into()],
            )
            .await?;
        Ok(rows.first().is_some_and(|row| row.get::<_, bool>(0)))
    }

    async fn author_names(&self) -> Result<Vec<String>> {
        self.single_column(
            "SELECT author_name FROM authors GROUP BY author_name ORDER BY author_name",
            &[],
        )
        .await
    }

    async fn unsubscribed_subreddits(&self) -> Result<Vec<String>> {
        self.single_column(
            r#"SELECT subreddit FROM posts
               WHERE subreddit NOT IN (SELECT subreddit FROM subscription)
               AND subreddit NOT LIKE 'u\_%' ESCAPE '\'
               GROUP BY subreddit
               ORDER BY subreddit"#,
            &[],
        )
        .await
    }

    async fn update_post_votes(
        &self,
        post_id: &str,
        upvotes: i64,
        downvotes: i64,
    ) -> Result<bool> {
        let client = self.pool.get().await?;
        let updated = logged(
            "update_post_votes",
            client
                .execute(
                    "UPDATE posts SET post_upvote_count = $2, post_downvote_count = $3 \
                     WHERE post_id = $1",
                    &[&post_id, &upvotes, &downvotes],
                )
                .await,
        )?;
        Ok(updated > 0)
    }
}
