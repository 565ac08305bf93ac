//! Rate-limit cooldown tracking.
//!
//! The cooldown end instant lives in an atomic (fast path for every lookup)
//! and in a [`CooldownStore`] (survives restarts). Changes are published on a
//! `watch` channel; a timer task publishes [`CooldownStatus::Cleared`] when a
//! cooldown elapses.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::{watch, MutexGuard};

use crate::error_handling::StoreError;
use crate::storage::CooldownStore;

/// Sentinel for "no cooldown recorded".
const NO_COOLDOWN: i64 = i64::MIN;

/// Observable state of the geolocation rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// Requests may be issued
    Cleared,
    /// No requests until `ends_at`
    Active { ends_at: DateTime<Utc> },
}

impl CooldownStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, CooldownStatus::Active { .. })
    }
}

struct CooldownInner {
    ends_at_ms: AtomicI64,
    /// Bumped on every engage so stale timers don't clear a newer cooldown
    generation: AtomicU64,
    sender: watch::Sender<CooldownStatus>,
}

impl CooldownInner {
    fn arm_timer(self: &Arc<Self>, generation: u64, ends_at: DateTime<Utc>) {
        let remaining = (ends_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime available; cooldown expiry will be observed lazily");
            return;
        };

        let inner = Arc::clone(self);
        handle.spawn(async move {
            tokio::time::sleep(remaining).await;
            // Checked under the channel lock so a newer engage is never overwritten
            let cleared = inner.sender.send_if_modified(|status| {
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return false;
                }
                *status = CooldownStatus::Cleared;
                true
            });
            if cleared {
                info!("Geolocation cooldown cleared");
            }
        });
    }
}

/// Tracks the geolocation cooldown.
#[derive(Clone)]
pub struct CooldownTracker {
    inner: Arc<CooldownInner>,
    store: Arc<dyn CooldownStore>,
}

impl CooldownTracker {
    /// Creates a tracker, reapplying a persisted cooldown that is still running
    /// and removing one that has already ended.
    pub async fn load(store: Arc<dyn CooldownStore>) -> Result<Self, StoreError> {
        let (sender, _) = watch::channel(CooldownStatus::Cleared);
        let tracker = CooldownTracker {
            inner: Arc::new(CooldownInner {
                ends_at_ms: AtomicI64::new(NO_COOLDOWN),
                generation: AtomicU64::new(0),
                sender,
            }),
            store,
        };

        match tracker.store.load_cooldown().await? {
            Some(ends_at) if ends_at > Utc::now() => {
                info!("Reapplying geolocation cooldown until {}", ends_at);
                tracker.publish_active(ends_at);
            }
            Some(ends_at) => {
                debug!("Removing expired geolocation cooldown (ended {})", ends_at);
                tracker.store.clear_cooldown().await?;
            }
            None => {}
        }

        Ok(tracker)
    }

    fn publish_active(&self, ends_at: DateTime<Utc>) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .ends_at_ms
            .store(ends_at.timestamp_millis(), Ordering::SeqCst);
        self.inner
            .sender
            .send_replace(CooldownStatus::Active { ends_at });
        self.inner.arm_timer(generation, ends_at);
    }

    /// The end of the current cooldown, if one is running.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        let ms = self.inner.ends_at_ms.load(Ordering::SeqCst);
        if ms == NO_COOLDOWN {
            return None;
        }
        DateTime::from_timestamp_millis(ms).filter(|ends_at| *ends_at > Utc::now())
    }

    pub fn is_active(&self) -> bool {
        self.ends_at().is_some()
    }

    pub fn status(&self) -> CooldownStatus {
        match self.ends_at() {
            Some(ends_at) => CooldownStatus::Active { ends_at },
            None => CooldownStatus::Cleared,
        }
    }

    /// Subscribes to cooldown changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<CooldownStatus> {
        self.inner.sender.subscribe()
    }

    /// Resolves once no cooldown is active; immediately if none is.
    pub async fn wait_until_cleared(&self) {
        while let Some(ends_at) = self.ends_at() {
            let remaining = (ends_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(remaining).await;
        }
    }

    /// Starts a cooldown of `duration` from now, persists it and notifies
    /// subscribers.
    ///
    /// Only callable while the single-flight fetch guard is held.
    pub async fn engage(
        &self,
        duration: Duration,
        _flight: &MutexGuard<'_, ()>,
    ) -> Result<DateTime<Utc>, StoreError> {
        let span = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(1));
        let ends_at = Utc::now() + span;

        self.publish_active(ends_at);
        self.store.save_cooldown(ends_at).await?;
        info!(
            "Geolocation rate limit reached; pausing requests for {}s (until {})",
            duration.as_secs(),
            ends_at
        );
        Ok(ends_at)
    }

    /// Forgets a cooldown that has run out, removing the persisted record.
    ///
    /// Only callable while the single-flight fetch guard is held, so it never
    /// interleaves with [`engage`](Self::engage).
    pub async fn expire_if_elapsed(
        &self,
        _flight: &MutexGuard<'_, ()>,
    ) -> Result<bool, StoreError> {
        let ms = self.inner.ends_at_ms.load(Ordering::SeqCst);
        if ms == NO_COOLDOWN || ms > Utc::now().timestamp_millis() {
            return Ok(false);
        }
        self.store.clear_cooldown().await?;
        self.inner.ends_at_ms.store(NO_COOLDOWN, Ordering::SeqCst);
        self.inner.sender.send_if_modified(|status| {
            if status.is_active() {
                *status = CooldownStatus::Cleared;
                true
            } else {
                false
            }
        });
        debug!("Removed expired geolocation cooldown record");
        Ok(true)
    }
}
