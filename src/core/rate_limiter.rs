use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Per-user cooldown between withdrawals.
///
/// Stores, for each chat, the instant until which new withdrawals are refused.
#[derive(Clone)]
pub struct RateLimiter {
    limits: Arc<Mutex<HashMap<ChatId, Instant>>>,
    cooldown: Duration,
}

impl RateLimiter {
    /// Creates a rate limiter with the given cooldown.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dogeads::core::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// let limiter = RateLimiter::new(Duration::from_secs(60));
    /// ```
    pub fn new(cooldown: Duration) -> Self {
        Self {
            limits: Arc::new(Mutex::new(HashMap::new())),
            cooldown,
        }
    }

    /// Remaining cooldown, `None` when the user may act.
    pub async fn get_remaining_time(&self, chat_id: ChatId) -> Option<Duration> {
        let limits = self.limits.lock().await;
        if let Some(&instant) = limits.get(&chat_id) {
            let now = Instant::now();
            if now < instant {
                return Some(instant - now);
            }
        }
        None
    }

    /// Starts a new cooldown period for the user.
    pub async fn update_rate_limit(&self, chat_id: ChatId) {
        let mut limits = self.limits.lock().await;
        limits.insert(chat_id, Instant::now() + self.cooldown);
    }

    /// Drops expired entries.
    pub async fn cleanup(&self) -> usize {
        let mut limits = self.limits.lock().await;
        let before = limits.len();
        let now = Instant::now();
        limits.retain(|_, until| *until > now);
        before - limits.len()
    }

    /// Runs [`cleanup`](Self::cleanup) every `period` in the background.
    pub fn spawn_cleanup_task(self: Arc<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = self.cleanup().await;
                if removed > 0 {
                    log::debug!("Rate limiter cleanup removed {} entries", removed);
                }
            }
        });
    }
}
