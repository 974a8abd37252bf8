//! Sliding-window rate limiting per backend

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use plexus_core::BackendKind;

/// Default window length
pub const WINDOW: Duration = Duration::from_secs(60);

/// Rate limit error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limited, retry after {retry_after:?}")]
    Limited { retry_after: Duration },
}

/// Current usage of one backend's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStats {
    pub requests_used: u32,
    pub requests_limit: u32,
    pub window_remaining: Duration,
}

#[derive(Debug)]
struct RequestWindow {
    ceiling: u32,
    /// Admission times inside the window, oldest first
    admitted: Mutex<VecDeque<Instant>>,
}

impl RequestWindow {
    fn prune(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = admitted.front() {
            if now.duration_since(*oldest) >= window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-backend sliding-window limiter.
///
/// Windows are created up front for every limited backend, so admission only
/// locks that backend's own queue. Backends without a ceiling are never limited.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    window: Duration,
    windows: BTreeMap<BackendKind, RequestWindow>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(WINDOW)
    }
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: BTreeMap::new(),
        }
    }

    /// Cap `backend` at `ceiling` admissions per window
    pub fn with_limit(mut self, backend: BackendKind, ceiling: u32) -> Self {
        self.windows.insert(
            backend,
            RequestWindow {
                ceiling,
                admitted: Mutex::new(VecDeque::with_capacity(ceiling as usize)),
            },
        );
        self
    }

    pub fn limit(&self, backend: BackendKind) -> Option<u32> {
        self.windows.get(&backend).map(|w| w.ceiling)
    }

    /// Admit one request for `backend` or report how long until a slot frees up
    pub fn try_acquire(&self, backend: BackendKind) -> Result<(), RateLimitError> {
        let Some(window) = self.windows.get(&backend) else {
            return Ok(());
        };

        let now = Instant::now();
        let mut admitted = window.admitted.lock();
        RequestWindow::prune(&mut admitted, now, self.window);

        if admitted.len() as u32 >= window.ceiling {
            let retry_after = admitted
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(RateLimitError::Limited { retry_after });
        }

        admitted.push_back(now);
        Ok(())
    }

    /// Usage stats for a limited backend
    pub fn stats(&self, backend: BackendKind) -> Option<RateLimitStats> {
        let window = self.windows.get(&backend)?;
        let now = Instant::now();
        let mut admitted = window.admitted.lock();
        RequestWindow::prune(&mut admitted, now, self.window);

        Some(RateLimitStats {
            requests_used: admitted.len() as u32,
            requests_limit: window.ceiling,
            window_remaining: admitted
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(Duration::ZERO),
        })
    }

    /// Stats for every limited backend
    pub fn all_stats(&self) -> Vec<(BackendKind, RateLimitStats)> {
        self.windows
            .keys()
            .filter_map(|kind| self.stats(*kind).map(|s| (*kind, s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_enforced() {
        let limiter = SlidingWindowLimiter::default().with_limit(BackendKind::OpenAi, 3);

        for _ in 0..3 {
            assert!(limiter.try_acquire(BackendKind::OpenAi).is_ok());
        }
        let Err(RateLimitError::Limited { retry_after }) = limiter.try_acquire(BackendKind::OpenAi) else {
            panic!("fourth call should be limited");
        };
        assert!(retry_after <= WINDOW);
        assert!(retry_after > Duration::from_secs(50));

        let stats = limiter.stats(BackendKind::OpenAi).unwrap();
        assert_eq!(stats.requests_used, 3);
        assert_eq!(stats.requests_limit, 3);
    }

    #[test]
    fn test_unlimited_backends_always_admitted() {
        let limiter = SlidingWindowLimiter::default().with_limit(BackendKind::OpenAi, 1);
        for _ in 0..100 {
            assert!(limiter.try_acquire(BackendKind::Ollama).is_ok());
        }
        assert!(limiter.stats(BackendKind::Ollama).is_none());
        assert_eq!(limiter.all_stats().len(), 1);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(50))
            .with_limit(BackendKind::Anthropic, 1);

        assert!(limiter.try_acquire(BackendKind::Anthropic).is_ok());
        assert!(limiter.try_acquire(BackendKind::Anthropic).is_err());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(limiter.try_acquire(BackendKind::Anthropic).is_ok());
    }

    #[test]
    fn test_zero_ceiling_rejects_everything() {
        let limiter = SlidingWindowLimiter::default().with_limit(BackendKind::Ollama, 0);
        assert_eq!(
            limiter.try_acquire(BackendKind::Ollama),
            Err(RateLimitError::Limited { retry_after: WINDOW })
        );
    }
}
