//! Failure recovery: capped exponential backoff plus a single degraded
//! generation attempt. The pipeline must always terminate with some
//! user-facing text, so a second failure yields a fixed apology rather
//! than another error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

use keel_core::{GenerationBackend, ModelHint, Turn};

/// Fixed, user-safe fallback when even the degraded backend fails.
pub const APOLOGY_MESSAGE: &str =
    "I'm sorry, but I ran into repeated errors and couldn't complete that request. \
     Please try again in a moment.";

/// Backoff policy for the recovery path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPolicy {
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, max_delay_ms: 30_000 }
    }
}

impl RecoveryPolicy {
    /// Delay before the recovery attempt: `min(base * 2^failures, max)`.
    pub fn delay_for(&self, failure_count: u32) -> Duration {
        let factor = 1u64 << failure_count.min(20) as u64;
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Back off, then make one degraded generation attempt. Never errors:
    /// the apology is the floor.
    pub async fn recover(
        &self,
        backend: &dyn GenerationBackend,
        messages: &[Turn],
        failure_count: u32,
    ) -> String {
        let delay = self.delay_for(failure_count);
        warn!(
            failure_count,
            delay_ms = delay.as_millis() as u64,
            "Entering failure recovery; backing off before degraded attempt"
        );
        sleep(delay).await;

        match backend.generate(messages, ModelHint::Degraded).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                error!("Degraded generation returned empty text; using apology fallback");
                APOLOGY_MESSAGE.to_string()
            }
            Err(err) => {
                error!(error = %err, "Degraded generation failed; using apology fallback");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    #[test]
    fn backoff_doubles_per_failure() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.delay_for(0).as_millis(), 1_000);
        assert_eq!(policy.delay_for(1).as_millis(), 2_000);
        assert_eq!(policy.delay_for(3).as_millis(), 8_000);
    }

    #[test]
    fn backoff_caps_at_thirty_seconds() {
        let policy = RecoveryPolicy::default();
        assert_eq!(policy.delay_for(5).as_millis(), 30_000);
        assert_eq!(policy.delay_for(63).as_millis(), 30_000);
    }

    struct FlakyBackend {
        fail: bool,
    }

    #[async_trait]
    impl GenerationBackend for FlakyBackend {
        async fn generate(&self, _messages: &[Turn], hint: ModelHint) -> anyhow::Result<String> {
            assert_eq!(hint, ModelHint::Degraded, "recovery must use the degraded tier");
            if self.fail {
                Err(anyhow!("backend down"))
            } else {
                Ok("degraded answer".to_string())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_uses_the_degraded_backend() {
        let policy = RecoveryPolicy::default();
        let text = policy
            .recover(&FlakyBackend { fail: false }, &[Turn::user("hi")], 3)
            .await;
        assert_eq!(text, "degraded answer");
    }

    #[tokio::test(start_paused = true)]
    async fn double_failure_returns_the_apology() {
        let policy = RecoveryPolicy::default();
        let text = policy
            .recover(&FlakyBackend { fail: true }, &[Turn::user("hi")], 3)
            .await;
        assert_eq!(text, APOLOGY_MESSAGE);
        assert!(!text.is_empty());
    }
}
