//! Redis-backed fingerprint store
//!
//! Keys are `"{namespace}_{id}"` holding an empty string. Reservations in
//! expiring namespaces carry a TTL so a worker that dies mid-item eventually
//! releases the id.

use super::{FingerprintStore, Namespace, Result};
use crate::utils::error::FingerprintError;
use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::HashSet;

const SCAN_BATCH: usize = 1000;

/// Fingerprint store on a pooled Redis connection
pub struct RedisFingerprintStore {
    pool: Pool,
    reservation_ttl_secs: u64,
}

impl RedisFingerprintStore {
    /// Connect and verify the server answers PING
    pub async fn connect(
        url: &str,
        pool_size: usize,
        reservation_ttl_secs: u64,
    ) -> Result<Self> {
        let pool = PoolConfig::from_url(url)
            .builder()
            .map_err(|e| FingerprintError::Pool(format!("Failed to create pool builder: {e}")))?
            .max_size(pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| FingerprintError::Pool(e.to_string()))?;

        let mut conn = pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        tracing::info!(url = %url, "Connected to Redis fingerprint store");

        Ok(Self {
            pool,
            reservation_ttl_secs,
        })
    }

    fn key(namespace: Namespace, id: &str) -> String {
        format!("{namespace}_{id}")
    }

    fn ttl_for(&self, namespace: Namespace) -> Option<u64> {
        (namespace.expires() && self.reservation_ttl_secs > 0).then_some(self.reservation_ttl_secs)
    }
}

#[async_trait]
impl FingerprintStore for RedisFingerprintStore {
    async fn exists(&self, namespace: Namespace, id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let found: bool = conn.exists(Self::key(namespace, id)).await?;
        Ok(found)
    }

    async fn add(&self, namespace: Namespace, id: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::key(namespace, id)).arg("").arg("NX");
        if let Some(ttl) = self.ttl_for(namespace) {
            cmd.arg("EX").arg(ttl);
        }

        // SET NX replies OK when the key was written and nil otherwise
        let reply: Option<String> = cmd.query_async(&mut *conn).await?;
        Ok(reply.is_some())
    }

    async fn list(&self, namespace: Namespace) -> Result<HashSet<String>> {
        let mut conn = self.pool.get().await?;
        let prefix = format!("{namespace}_");
        let pattern = format!("{prefix}*");

        let mut ids = HashSet::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;

            ids.extend(
                keys.iter()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .map(String::from),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(namespace = %namespace, count = ids.len(), "Listed fingerprints");
        Ok(ids)
    }
}
