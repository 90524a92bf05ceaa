//! SQLite store
//!
//! Same contract as [`super::PgStore`] on a single `Mutex<Connection>`.
//! JSON documents are stored as text and queried with `json_extract`.

use super::{insert_sql, CommentRecord, ItemKind, PostRecord, Record, Result, Store, Table};
use crate::utils::error::StoreError;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    subreddit TEXT NOT NULL,
    post_id TEXT PRIMARY KEY,
    post_author TEXT NOT NULL,
    post_title TEXT NOT NULL,
    post_body TEXT NOT NULL,
    post_created_utc INTEGER NOT NULL,
    is_post_oc INTEGER NOT NULL DEFAULT 0,
    is_post_video INTEGER NOT NULL DEFAULT 0,
    post_upvote_count INTEGER NOT NULL DEFAULT 0,
    post_downvote_count INTEGER NOT NULL DEFAULT 0,
    subreddit_members INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    comment_author TEXT NOT NULL,
    is_comment_submitter INTEGER NOT NULL DEFAULT 0,
    is_comment_edited INTEGER NOT NULL DEFAULT 0,
    comment_created_utc INTEGER NOT NULL,
    comment_upvote_count INTEGER NOT NULL DEFAULT 0,
    comment_downvote_count INTEGER NOT NULL DEFAULT 0,
    comment_body TEXT NOT NULL,
    post_id TEXT NOT NULL,
    subreddit TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(post_id);

CREATE TABLE IF NOT EXISTS authors (
    author_id TEXT PRIMARY KEY,
    author_name TEXT NOT NULL,
    author_created_utc INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    shasum_512 TEXT NOT NULL,
    analysis_document TEXT NOT NULL,
    ollama_ver TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_analysis_reference_llm ON analysis_documents (
    json_extract(analysis_document, '$.reference_id'),
    json_extract(analysis_document, '$.llm')
);

CREATE TABLE IF NOT EXISTS prompt_completion_details (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doc_shasum_512 TEXT NOT NULL,
    ollama_host TEXT NOT NULL,
    ollama_ver TEXT NOT NULL,
    name TEXT NOT NULL,
    model TEXT NOT NULL,
    size INTEGER NOT NULL,
    digest TEXT NOT NULL,
    details TEXT,
    expires_at TEXT,
    size_vram INTEGER NOT NULL,
    prompt_completion_time REAL NOT NULL,
    tokens_per_second REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS parent_child_tree_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    shasum256 TEXT NOT NULL,
    post_id TEXT NOT NULL,
    parent_child_tree TEXT NOT NULL,
    UNIQUE (post_id, shasum256)
);

CREATE TABLE IF NOT EXISTS subscription (
    datetimesubscribed TEXT NOT NULL,
    subreddit TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    stage TEXT NOT NULL,
    item_id TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    message TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS service_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    log_json TEXT NOT NULL
);
"#;

/// SQLite implementation of [`Store`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn strings(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<String>> {
        let conn = self.conn();
        let rows = conn.prepare(sql).and_then(|mut stmt| {
            let rows = stmt
                .query_map(params, |row| row.get::<_, Option<String>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        });
        Ok(logged("select", rows)?.into_iter().flatten().collect())
    }

    /// Number of rows in a table
    pub fn count(&self, table: Table) -> Result<i64> {
        let count = self
            .conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Raw JSON text of every analysis document, oldest first
    pub fn analysis_documents(&self) -> Result<Vec<serde_json::Value>> {
        let docs = self.strings(
            "SELECT analysis_document FROM analysis_documents ORDER BY id",
            [],
        )?;
        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(|e| StoreError::Conversion(e.to_string())))
            .collect()
    }

    /// Every mirrored service log entry, oldest first
    pub fn service_logs(&self) -> Result<Vec<serde_json::Value>> {
        let logs = self.strings("SELECT log_json FROM service_logs ORDER BY id", [])?;
        logs.iter()
            .map(|l| serde_json::from_str(l).map_err(|e| StoreError::Conversion(e.to_string())))
            .collect()
    }
}

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        subreddit: row.get("subreddit")?,
        post_id: row.get("post_id")?,
        post_author: row.get("post_author")?,
        post_title: row.get("post_title")?,
        post_body: row.get("post_body")?,
        post_created_utc: row.get("post_created_utc")?,
        is_post_oc: row.get("is_post_oc")?,
        is_post_video: row.get("is_post_video")?,
        post_upvote_count: row.get("post_upvote_count")?,
        post_downvote_count: row.get("post_downvote_count")?,
        subreddit_members: row.get("subreddit_members")?,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRecord> {
    Ok(CommentRecord {
        comment_id: row.get("comment_id")?,
        comment_author: row.get("comment_author")?,
        is_comment_submitter: row.get("is_comment_submitter")?,
        is_comment_edited: row.get("is_comment_edited")?,
        comment_created_utc: row.get("comment_created_utc")?,
        comment_upvote_count: row.get("comment_upvote_count")?,
        comment_downvote_count: row.get("comment_downvote_count")?,
        comment_body: row.get("comment_body")?,
        post_id: row.get("post_id")?,
        subreddit: row.get("subreddit")?,
    })
}

fn logged<T>(operation: &str, result: rusqlite::Result<T>) -> Result<T> {
    result.map_err(|e| {
        tracing::error!(operation = operation, error = %e, "SQLite operation failed");
        StoreError::Sqlite(e)
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, record: &dyn Record) -> Result<bool> {
        let (sql, values) = insert_sql(record, |i| format!("?{i}"));
        let written = logged(
            "insert",
            self.conn()
                .execute(&sql, rusqlite::params_from_iter(values.iter())),
        )?;
        Ok(written > 0)
    }

    async fn existing_ids(&self, table: Table, column: &str) -> Result<HashSet<String>> {
        let column = table.checked_column(column)?;
        let sql = format!("SELECT {column} FROM {table} GROUP BY {column}");
        Ok(self.strings(&sql, [])?.into_iter().collect())
    }

    async fn unanalyzed_ids(&self, kind: ItemKind) -> Result<Vec<String>> {
        let sql = match kind {
            ItemKind::Post => {
                r#"SELECT post_id FROM posts
                   WHERE TRIM(post_body, ' ' || char(9, 10, 13)) NOT IN ('', '[removed]', '[deleted]')
                   AND NOT EXISTS (
                       SELECT 1 FROM analysis_documents a
                       WHERE json_extract(a.analysis_document, '$.reference_id') = posts.post_id
                          OR json_extract(a.analysis_document, '$.post_id') = posts.post_id
                   )
                   ORDER BY post_created_utc"#
            }
            ItemKind::Comment => {
                r#"SELECT comment_id FROM comments
                   WHERE TRIM(comment_body, ' ' || char(9, 10, 13)) NOT IN ('', '[removed]', '[deleted]')
                   AND NOT EXISTS (
                       SELECT 1 FROM analysis_documents a
                       WHERE json_extract(a.analysis_document, '$.reference_id') = comments.comment_id
                          OR json_extract(a.analysis_document, '$.comment_id') = comments.comment_id
                   )
                   ORDER BY comment_created_utc"#
            }
        };
        self.strings(sql, [])
    }

    async fn load_post(&self, post_id: &str) -> Result<Option<PostRecord>> {
        let conn = self.conn();
        let post = conn
            .query_row(
                "SELECT * FROM posts \
                 WHERE post_id = ?1 AND TRIM(post_body, ' ' || char(9, 10, 13)) NOT IN ('', '[removed]', '[deleted]')",
                params![post_id],
                post_from_row,
            )
            .optional();
        logged("load_post", post)
    }

    async fn load_comment(&self, comment_id: &str) -> Result<Option<CommentRecord>> {
        let conn = self.conn();
        let comment = conn
            .query_row(
                "SELECT * FROM comments \
                 WHERE comment_id = ?1 AND TRIM(comment_body, ' ' || char(9, 10, 13)) NOT IN ('', '[removed]', '[deleted]')",
                params![comment_id],
                comment_from_row,
            )
            .optional();
        logged("load_comment", comment)
    }

    async fn has_post(&self, post_id: &str) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM posts WHERE post_id = ?1)",
            params![post_id],
            |row| row.get(0),
        );
        logged("has_post", exists)
    }

    async fn has_comment(&self, comment_id: &str) -> Result<bool> {
        let exists = self.conn().query_row(
            "SELECT EXISTS(SELECT 1 FROM comments WHERE comment_id = ?1)",
            params![comment_id],
            |row| row.get(0),
        );
        logged("has_comment", exists)
    }

    async fn author_names(&self) -> Result<Vec<String>> {
        self.strings(
            "SELECT author_name FROM authors GROUP BY author_name ORDER BY author_name",
            [],
        )
    }

    async fn unsubscribed_subreddits(&self) -> Result<Vec<String>> {
        self.strings(
            r#"SELECT subreddit FROM posts
               WHERE subreddit NOT IN (SELECT subreddit FROM subscription)
               AND subreddit NOT LIKE 'u\_%' ESCAPE '\'
               GROUP BY subreddit
               ORDER BY subreddit"#,
            [],
        )
    }

    async fn update_post_votes(
        &self,
        post_id: &str,
        upvotes: i64,
        downvotes: i64,
    ) -> Result<bool> {
        let updated = logged(
            "update_post_votes",
            self.conn().execute(
                "UPDATE posts SET post_upvote_count = ?2, post_downvote_count = ?3 \
                 WHERE post_id = ?1",
                params![post_id, upvotes, downvotes],
            ),
        )?;
        Ok(updated > 0)
    }
}
