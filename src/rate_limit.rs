//! Fixed-window rate limiting.
//!
//! [`RateLimiter`] owns the policy and delegates time and storage to two
//! capabilities: a [`Clock`] and a [`RateLimitStore`].  The in-memory store is
//! process-local and best-effort; nothing here coordinates across instances.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.  Used to step through windows in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|n| *n).unwrap_or_else(|e| *e.into_inner())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Requests admitted per key per window.
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::seconds(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub key: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

/// Outcome of the fixed-window check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No live window: start a new one with this request.
    Reset,
    /// Inside the window with budget left.
    Increment,
    /// Inside the window and the budget is spent.
    Reject,
}

impl Admission {
    pub fn admitted(self) -> bool {
        !matches!(self, Admission::Reject)
    }
}

/// Pure fixed-window decision.  A window is live while `now - window_start`
/// does not exceed the window length.
pub fn decide(
    entry: Option<&RateLimitEntry>,
    now: DateTime<Utc>,
    policy: &RateLimitPolicy,
) -> Admission {
    match entry {
        None => Admission::Reset,
        Some(e) if now - e.window_start > policy.window => Admission::Reset,
        Some(e) if e.count < policy.limit => Admission::Increment,
        Some(_) => Admission::Reject,
    }
}

/// Backing storage for rate-limit entries.
pub trait RateLimitStore: Send + Sync {
    /// Run `step` against the current entry for `key`.  `Some` replaces the
    /// stored entry, `None` leaves it untouched.  Implementations must not
    /// interleave two updates of the same key.
    fn update(
        &self,
        key: &str,
        step: &mut dyn FnMut(Option<&RateLimitEntry>) -> Option<RateLimitEntry>,
    );

    /// Drop entries whose window started before `cutoff`; returns how many.
    fn evict_before(&self, cutoff: DateTime<Utc>) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store.  Per-key updates run under the map's shard lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }
}

impl RateLimitStore for MemoryStore {
    fn update(
        &self,
        key: &str,
        step: &mut dyn FnMut(Option<&RateLimitEntry>) -> Option<RateLimitEntry>,
    ) {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if let Some(next) = step(Some(slot.get())) {
                    slot.insert(next);
                }
            }
            Entry::Vacant(slot) => {
                if let Some(next) = step(None) {
                    slot.insert(next);
                }
            }
        }
    }

    fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.window_start >= cutoff);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Default number of tracked keys above which expired entries are swept.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 10_000;

#[derive(Clone)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    store: Arc<dyn RateLimitStore>,
    max_tracked_keys: usize,
}

impl RateLimiter {
    pub fn new(
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
        store: Arc<dyn RateLimitStore>,
    ) -> Self {
        Self {
            policy,
            clock,
            store,
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
        }
    }

    /// System clock and a fresh [`MemoryStore`].
    pub fn in_memory(policy: RateLimitPolicy) -> Self {
        Self::new(policy, Arc::new(SystemClock), Arc::new(MemoryStore::new()))
    }

    pub fn with_max_tracked_keys(mut self, max: usize) -> Self {
        self.max_tracked_keys = max;
        self
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Count one request against `key`.  Returns false when the key has
    /// used its budget for the current window.
    pub fn allow(&self, key: &str) -> bool {
        let now = self.clock.now();
        let policy = self.policy;
        let mut admission = Admission::Reject;
        self.store.update(key, &mut |entry| {
            admission = decide(entry, now, &policy);
            match admission {
                Admission::Reset => Some(RateLimitEntry {
                    key: key.to_string(),
                    window_start: now,
                    count: 1,
                }),
                Admission::Increment => entry.map(|e| RateLimitEntry {
                    count: e.count + 1,
                    ..e.clone()
                }),
                Admission::Reject => None,
            }
        });

        if admission == Admission::Reset && self.store.len() > self.max_tracked_keys {
            let evicted = self.store.evict_before(now - policy.window);
            tracing::debug!(evicted, remaining = self.store.len(), "swept expired rate-limit entries");
        }
        if !admission.admitted() {
            tracing::debug!(caller = %key, limit = policy.limit, "rate limit exceeded");
        }
        admission.admitted()
    }
}
