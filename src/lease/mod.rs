//! Bounded background-execution grants.
//!
//! A [`Lease`] is held for the whole time the recorder is `Recording`. It is
//! returned to the host on every exit path: explicit release, drop, or
//! host-initiated expiry. Releasing twice is a no-op.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Host-issued identifier for one background-execution grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseToken(pub u64);

pub type ExpiryCallback = Box<dyn FnOnce() + Send + 'static>;

/// Host background-execution API.
pub trait BackgroundHost: Send + Sync {
    fn begin_lease(&self, label: &str) -> Result<LeaseToken>;

    fn end_lease(&self, token: LeaseToken);

    /// Register the callback the host runs if it revokes `token` early
    fn on_expiry(&self, token: LeaseToken, callback: ExpiryCallback);
}

pub struct LeaseManager {
    host: Arc<dyn BackgroundHost>,
    label: String,
}

impl LeaseManager {
    pub fn new(host: Arc<dyn BackgroundHost>, label: impl Into<String>) -> Self {
        Self {
            host,
            label: label.into(),
        }
    }

    /// Obtain a grant; `on_invalidated` runs if the host expires it first.
    pub fn acquire(&self, on_invalidated: impl FnOnce() + Send + 'static) -> Result<Lease> {
        let token = self.host.begin_lease(&self.label)?;
        let released = Arc::new(AtomicBool::new(false));

        let host = Arc::clone(&self.host);
        let flag = Arc::clone(&released);
        self.host.on_expiry(
            token,
            Box::new(move || {
                if flag.swap(true, Ordering::SeqCst) {
                    return;
                }
                warn!("Background lease {:?} expired by host", token);
                host.end_lease(token);
                on_invalidated();
            }),
        );

        info!("Background lease {:?} acquired ({})", token, self.label);
        Ok(Lease {
            token,
            host: Arc::clone(&self.host),
            released,
        })
    }

    pub fn release(&self, lease: Lease) {
        lease.release();
    }
}

/// Scoped background-execution grant, returned to the host on drop.
pub struct Lease {
    token: LeaseToken,
    host: Arc<dyn BackgroundHost>,
    released: Arc<AtomicBool>,
}

impl Lease {
    pub fn token(&self) -> LeaseToken {
        self.token
    }

    /// False once released or expired by the host.
    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    pub fn release(self) {
        // Drop does the work.
    }

    fn end(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            debug!("Background lease {:?} released", self.token);
            self.host.end_lease(self.token);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.end();
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("token", &self.token)
            .field("active", &self.is_active())
            .finish()
    }
}

/// In-process host granting leases with an optional maximum duration.
///
/// Expiry timers run on the tokio runtime, so `on_expiry` must be called from
/// within one.
pub struct ProcessHost {
    max_duration: Option<Duration>,
    next_token: AtomicU64,
    timers: Arc<Mutex<HashMap<LeaseToken, Option<JoinHandle<()>>>>>,
}

impl ProcessHost {
    pub fn new(max_duration: Option<Duration>) -> Self {
        Self {
            max_duration,
            next_token: AtomicU64::new(1),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }
}

impl BackgroundHost for ProcessHost {
    fn begin_lease(&self, label: &str) -> Result<LeaseToken> {
        let token = LeaseToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.timers
            .lock()
            .map_err(|_| anyhow::anyhow!("lease table poisoned"))?
            .insert(token, None);
        debug!("Granted lease {:?} for {}", token, label);
        Ok(token)
    }

    fn end_lease(&self, token: LeaseToken) {
        let Ok(mut timers) = self.timers.lock() else {
            return;
        };
        if let Some(Some(timer)) = timers.remove(&token) {
            timer.abort();
        }
    }

    fn on_expiry(&self, token: LeaseToken, callback: ExpiryCallback) {
        let Some(max_duration) = self.max_duration else {
            return;
        };

        let timers = Arc::clone(&self.timers);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(max_duration).await;
            let still_held = timers
                .lock()
                .map(|mut t| t.remove(&token).is_some())
                .unwrap_or(false);
            if still_held {
                callback();
            }
        });

        if let Ok(mut timers) = self.timers.lock() {
            match timers.get_mut(&token) {
                Some(slot) => *slot = Some(timer),
                None => timer.abort(),
            }
        }
    }
}
