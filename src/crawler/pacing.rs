//! Request pacing
//!
//! Every network request is preceded by a random pause. The pauses are what
//! keeps request volume low enough to avoid challenges, so all waiting goes
//! through the [`Sleeper`] trait and can be observed in tests.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

/// Something that can wait
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Picks a uniformly random pacing delay in `[1s, max]`
///
/// A zero maximum disables pacing; a maximum under one second is used as is.
pub fn pacing_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }

    let min_ms = max_ms.min(1000);
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}
