//! Wall-clock source in Unix seconds
//!
//! Link expiry, store TTLs, rate-limit buckets and edge cache freshness all
//! read time through [`Clock`] so a test can move time forward without
//! sleeping.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time in whole Unix seconds
pub trait Clock: Send + Sync + Debug {
    /// Current Unix time in seconds
    fn now_secs(&self) -> u64;
}

/// Zero-sized type, delegates to [`SystemTime::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Manually driven clock for tests
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock frozen at `now_secs`
    #[must_use]
    pub fn new(now_secs: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(now_secs)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now_secs: u64) {
        self.now.store(now_secs, Ordering::SeqCst);
    }

    /// Move time forward by `secs`
    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;
