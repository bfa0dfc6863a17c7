//! Deadline guard for session store stages
//!
//! A guarded stage races a timer. When the timer wins the stage future is
//! dropped, so nothing it would have produced is observed afterwards, and the
//! caller substitutes a degraded outcome instead of failing the request.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::SessionConfig;

/// A guarded stage did not finish before its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{stage} did not complete within {deadline:?}")]
pub struct StageTimeout {
    pub stage: &'static str,
    pub deadline: Duration,
}

/// Result of [`TimeoutGuard::wrap`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded<T> {
    pub value: T,
    /// `true` when `value` is the substituted fallback
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    deadline: Duration,
}

impl TimeoutGuard {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `stage`, giving up once the deadline passes
    pub async fn run<F, T>(&self, stage: &'static str, fut: F) -> Result<T, StageTimeout>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.deadline, fut)
            .await
            .map_err(|_| {
                warn!(stage, deadline_ms = self.deadline.as_millis() as u64, "Stage timed out");
                StageTimeout {
                    stage,
                    deadline: self.deadline,
                }
            })
    }

    /// Run `stage`, substituting `degraded()` when the deadline passes
    pub async fn wrap<F, T, D>(&self, stage: &'static str, fut: F, degraded: D) -> Guarded<T>
    where
        F: Future<Output = T>,
        D: FnOnce() -> T,
    {
        match self.run(stage, fut).await {
            Ok(value) => Guarded {
                value,
                degraded: false,
            },
            Err(_) => Guarded {
                value: degraded(),
                degraded: true,
            },
        }
    }
}

impl From<&SessionConfig> for TimeoutGuard {
    fn from(config: &SessionConfig) -> Self {
        Self::new(Duration::from_millis(config.store_timeout_ms))
    }
}
