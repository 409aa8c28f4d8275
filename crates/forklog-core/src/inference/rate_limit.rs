use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use super::InferenceError;
use crate::config::EngineConfig;

/// Fixed-window limiter for inference calls, keyed by caller.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<String, RateWindow>>>,
    window: Duration,
    limit: u32,
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            window,
            limit,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.inference_limit_per_window, config.inference_window())
    }

    /// Count one call for `key`, or deny it with the time left in the window.
    pub async fn check(&self, key: &str) -> Result<(), InferenceError> {
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let entry = guard.entry(key.to_string()).or_insert(RateWindow {
            started_at: now,
            count: 0,
        });

        if now.duration_since(entry.started_at) >= self.window {
            entry.started_at = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            let retry_after_secs = self
                .window
                .saturating_sub(now.duration_since(entry.started_at))
                .as_secs();
            tracing::warn!(
                caller = key_fingerprint(key),
                retry_after_secs,
                "Inference rate limit exceeded"
            );
            return Err(InferenceError::RateLimited { retry_after_secs });
        }

        entry.count += 1;
        Ok(())
    }
}

fn key_fingerprint(key: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
