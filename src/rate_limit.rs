//! Per-key fixed-window admission control.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::defaults;
use crate::error::{FarcasterError, Result};

/// Millisecond time source for the limiter.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_requests() -> u32 {
    defaults::RATE_LIMIT_MAX_REQUESTS
}

fn default_window_ms() -> u64 {
    defaults::RATE_LIMIT_WINDOW_MS
}

fn default_true() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: defaults::RATE_LIMIT_MAX_REQUESTS,
            window_ms: defaults::RATE_LIMIT_WINDOW_MS,
            enabled: true,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            enabled: true,
        }
    }

    /// Configuration with throttling switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Read-only view of one key's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub used: u32,
    pub max: u32,
    pub reset_in_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start_ms: u64,
    count: u32,
}

struct Windows {
    by_key: HashMap<String, Window>,
    last_sweep_ms: u64,
}

/// Thread-safe limiter. One mutex guards the whole key map; windows idle
/// for more than two window lengths are swept on later calls.
pub struct RateLimiter {
    config: RateLimitConfig,
    enabled: AtomicBool,
    windows: Mutex<Windows>,
    clock: Box<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Box<dyn Clock>) -> Self {
        let now = clock.now_ms();
        Self {
            config,
            enabled: AtomicBool::new(config.enabled),
            windows: Mutex::new(Windows {
                by_key: HashMap::new(),
                last_sweep_ms: now,
            }),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// When disabled, `check_limit` admits everything and records nothing.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, Windows> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit or reject one request for `key`.
    pub fn check_limit(&self, key: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        let mut windows = self.lock();

        if now.saturating_sub(windows.last_sweep_ms) >= window_ms {
            Self::sweep(&mut windows, now, window_ms);
        }

        match windows.by_key.get_mut(key) {
            None => {
                windows.by_key.insert(
                    key.to_string(),
                    Window {
                        start_ms: now,
                        count: 1,
                    },
                );
                Ok(())
            }
            Some(window) if now.saturating_sub(window.start_ms) >= window_ms => {
                window.start_ms = now;
                window.count = 1;
                Ok(())
            }
            Some(window) if window.count >= self.config.max_requests => {
                let retry_after_ms = (window.start_ms + window_ms).saturating_sub(now);
                warn!(key, retry_after_ms, "rate limit exceeded");
                Err(FarcasterError::rate_limit(key, retry_after_ms))
            }
            Some(window) => {
                window.count += 1;
                Ok(())
            }
        }
    }

    fn sweep(windows: &mut Windows, now: u64, window_ms: u64) {
        let stale_after = window_ms.saturating_mul(2);
        let before = windows.by_key.len();
        windows
            .by_key
            .retain(|_, w| now.saturating_sub(w.start_ms) <= stale_after);
        windows.last_sweep_ms = now;
        let evicted = before - windows.by_key.len();
        if evicted > 0 {
            debug!(evicted, remaining = windows.by_key.len(), "swept idle rate-limit windows");
        }
    }

    /// Current usage of `key`. Does not create, reset, or evict windows.
    pub fn get_status(&self, key: &str) -> RateLimitStatus {
        let now = self.clock.now_ms();
        let window_ms = self.config.window_ms;
        let windows = self.lock();
        let (used, reset_in_ms) = match windows.by_key.get(key) {
            Some(w) if now.saturating_sub(w.start_ms) < window_ms => {
                (w.count, (w.start_ms + window_ms).saturating_sub(now))
            }
            _ => (0, 0),
        };
        RateLimitStatus {
            used,
            max: self.config.max_requests,
            reset_in_ms,
        }
    }

    /// Forget the window for `key`.
    pub fn reset(&self, key: &str) {
        self.lock().by_key.remove(key);
    }

    /// Number of keys currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.lock().by_key.len()
    }
}
