use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use crate::errors::Result;

/// External key/value cache contract. Values are JSON; `ttl = None` keeps
/// the entry until evicted.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Removes the listed keys; returns how many existed.
    async fn remove_all(&self, keys: &[String]) -> Result<u64>;

    async fn remove_by_prefix(&self, prefix: &str) -> Result<u64>;
}
