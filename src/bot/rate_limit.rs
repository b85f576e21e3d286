use chrono::{DateTime, Duration, Utc};
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct LimiterState {
    last_granted: DateTime<Utc>,
    per_user: HashMap<String, DateTime<Utc>>,
}

/// Cooldown gate for the random-motto feature: a strict global throttle
/// layered under a per-user throttle. State lives in process memory for the
/// process lifetime and is never persisted.
pub struct RandomRateLimiter {
    global_cooldown: Duration,
    user_cooldown: Duration,
    state: RwLock<LimiterState>,
}

impl RandomRateLimiter {
    pub fn new(global_minutes: u64, per_user_minutes: u64) -> Self {
        Self {
            global_cooldown: Duration::minutes(global_minutes as i64),
            user_cooldown: Duration::minutes(per_user_minutes as i64),
            state: RwLock::new(LimiterState {
                last_granted: DateTime::UNIX_EPOCH,
                per_user: HashMap::new(),
            }),
        }
    }

    /// Grant a request only when both the global and the user's own cooldown
    /// have elapsed. Granting updates both timestamps; a denial is final.
    pub async fn allowed(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.write().await;

        let global_ready = state.last_granted + self.global_cooldown <= now;
        if !global_ready {
            info!(
                "Nobody may request a random motto until {}",
                state.last_granted + self.global_cooldown
            );
            return false;
        }

        let last_for_user = state
            .per_user
            .get(user_id)
            .copied()
            .unwrap_or(DateTime::UNIX_EPOCH);
        if last_for_user + self.user_cooldown > now {
            info!(
                "{} may not request a random motto until {}",
                user_id,
                last_for_user + self.user_cooldown
            );
            return false;
        }

        state.last_granted = now;
        state.per_user.insert(user_id.to_string(), now);
        true
    }
}
