use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

/// Remembers which login challenges were already redeemed, so a code-challenge token is
/// honoured at most once within its lifetime. Entries are kept until the token itself
/// would have expired.
#[derive(Debug, Default)]
pub struct ChallengeLedger {
    consumed: Mutex<HashMap<String, i64>>,
}

impl ChallengeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the challenge as used. Returns `false` if it had been used before.
    pub async fn consume(&self, jti: &str, expires_at: i64) -> bool {
        let mut consumed = self.consumed.lock().await;
        if consumed.contains_key(jti) {
            return false;
        }
        consumed.insert(jti.to_string(), expires_at);
        true
    }

    /// Makes a consumed challenge redeemable again after the login it started did not finish.
    pub async fn release(&self, jti: &str) {
        self.consumed.lock().await.remove(jti);
    }

    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut consumed = self.consumed.lock().await;
        let before = consumed.len();
        consumed.retain(|_, expires_at| *expires_at >= now);
        before - consumed.len()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.consumed.lock().await.len()
    }

    pub fn spawn_cleanup_task(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "purged expired login challenges");
                }
            }
        });
    }
}
