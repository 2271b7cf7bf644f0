//! Distributed locks for per-item mutual exclusion and single-flight jobs.
//!
//! Locks are Redis keys set with `SET NX EX` holding a value unique to the
//! acquisition; release and extension only act when the value still matches.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::Client as RedisClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Proof of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub key: String,
    pub value: String,
}

/// Lock backend.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Take the lock if free. `None` when another holder has it.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>>;

    /// Push the expiry out. `false` when the lock was lost.
    async fn extend(&self, token: &LockToken, ttl: Duration) -> Result<bool>;

    /// Release if still held by this token.
    async fn release(&self, token: &LockToken) -> Result<()>;
}

/// Redis-backed lock manager.
#[derive(Clone)]
pub struct RedisLockManager {
    redis: RedisClient,
}

impl std::fmt::Debug for RedisLockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockManager").finish()
    }
}

impl RedisLockManager {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }

    fn redis_key(key: &str) -> String {
        format!("lock:{key}")
    }
}

/// Value identifying this holder: host, process and a fresh id.
fn lock_value() -> String {
    format!("{}:{}:{}", hostname(), std::process::id(), Uuid::now_v7())
}

fn hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>> {
        let value = lock_value();
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let result: Option<String> = redis::cmd("SET")
            .arg(Self::redis_key(key))
            .arg(&value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .context("failed to acquire lock")?;

        Ok(result.map(|_| LockToken {
            key: key.to_string(),
            value,
        }))
    }

    async fn extend(&self, token: &LockToken, ttl: Duration) -> Result<bool> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        let extended: i64 = redis::Script::new(EXTEND_LOCK_SCRIPT)
            .key(Self::redis_key(&token.key))
            .arg(&token.value)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .context("failed to extend lock")?;

        Ok(extended == 1)
    }

    async fn release(&self, token: &LockToken) -> Result<()> {
        let mut conn = self
            .redis
            .get_multiplexed_async_connection()
            .await
            .context("failed to get Redis connection")?;

        redis::Script::new(RELEASE_LOCK_SCRIPT)
            .key(Self::redis_key(&token.key))
            .arg(&token.value)
            .invoke_async::<()>(&mut conn)
            .await
            .context("failed to release lock")?;

        debug!(key = %token.key, "released lock");
        Ok(())
    }
}

/// Lua script to release lock only if we own it.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Lua script to extend lock TTL only if we own it.
const EXTEND_LOCK_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("EXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// A held lock released on every exit path.
///
/// Call [`ItemLockGuard::release`] on the normal path. If the guard is dropped
/// while still held (early return, panic, cancelled future), a release is
/// spawned on the current runtime; the TTL covers the case where no runtime
/// is available.
pub struct ItemLockGuard {
    locks: Arc<dyn LockManager>,
    token: Option<LockToken>,
}

impl std::fmt::Debug for ItemLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemLockGuard")
            .field("key", &self.token.as_ref().map(|t| t.key.as_str()))
            .finish()
    }
}

impl ItemLockGuard {
    /// Try once to take `key`.
    pub async fn try_acquire(
        locks: Arc<dyn LockManager>,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Self>> {
        let token = locks.try_acquire(key, ttl).await?;
        Ok(token.map(|token| Self {
            locks,
            token: Some(token),
        }))
    }

    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Release now and wait for it.
    pub async fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.locks.release(&token).await,
            None => Ok(()),
        }
    }
}

impl Drop for ItemLockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let locks = Arc::clone(&self.locks);
                handle.spawn(async move {
                    if let Err(e) = locks.release(&token).await {
                        warn!(key = %token.key, error = %e, "failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                warn!(key = %token.key, "lock dropped outside a runtime, left to expire");
            }
        }
    }
}

/// Background task extending a lock until stopped.
pub struct Heartbeat {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    /// Extend `token` to `ttl` every `interval`.
    pub fn spawn(
        locks: Arc<dyn LockManager>,
        token: LockToken,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_heartbeat(locks, token, ttl, interval, stop_rx));
        Self { stop_tx, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

async fn run_heartbeat(
    locks: Arc<dyn LockManager>,
    token: LockToken,
    ttl: Duration,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately; the lock was just taken.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match locks.extend(&token, ttl).await {
                    Ok(true) => debug!(key = %token.key, "extended lock TTL"),
                    Ok(false) => {
                        warn!(key = %token.key, "lock lost, heartbeat stopping");
                        break;
                    }
                    Err(e) => warn!(key = %token.key, error = %e, "failed to extend lock TTL"),
                }
            }
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    debug!(key = %token.key, "heartbeat stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn redis_keys_are_prefixed() {
        assert_eq!(RedisLockManager::redis_key("translate:post:1"), "lock:translate:post:1");
    }

    #[test]
    fn lock_values_are_unique() {
        let a = lock_value();
        let b = lock_value();
        assert_ne!(a, b);
        assert!(a.contains(&std::process::id().to_string()));
    }
}
