//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the registry of per-browser
//! dashboard views.

use medi_core::dashboard::Dashboard;
use medi_core::ports::Services;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub services: Services,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            sessions: SessionRegistry::default(),
        }
    }

    /// A fresh, signed-out dashboard for a browser that has none yet.
    pub fn open_dashboard(&self) -> Arc<Dashboard> {
        Dashboard::start(self.services.clone())
    }

    /// Periodically drops views that have not been used for `max_idle`.
    pub fn spawn_idle_sweep(self: &Arc<Self>, max_idle: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        let period = max_idle.min(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            loop {
                ticks.tick().await;
                let evicted = state.sessions.evict_idle(max_idle);
                if evicted > 0 {
                    debug!(evicted, remaining = state.sessions.len(), "idle dashboards dropped");
                }
            }
        })
    }
}

//=========================================================================================
// SessionRegistry (One Dashboard per Browser)
//=========================================================================================

struct Entry {
    dashboard: Arc<Dashboard>,
    /// The access token a bearer-restored view was opened with.
    token: Option<String>,
    last_seen: Instant,
}

#[derive(Default)]
struct Views {
    entries: HashMap<String, Entry>,
    by_token: HashMap<String, String>,
}

impl Views {
    fn remove(&mut self, key: &str) -> Option<Arc<Dashboard>> {
        let entry = self.entries.remove(key)?;
        if let Some(token) = entry.token {
            self.by_token.remove(&token);
        }
        Some(entry.dashboard)
    }
}

/// Maps the opaque cookie value handed to a browser onto its dashboard view.
#[derive(Default)]
pub struct SessionRegistry {
    views: RwLock<Views>,
}

impl SessionRegistry {
    fn write(&self) -> RwLockWriteGuard<'_, Views> {
        self.views.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn add(&self, dashboard: Arc<Dashboard>, token: Option<&str>) -> String {
        let key = Uuid::new_v4().simple().to_string();
        let mut views = self.write();
        if let Some(token) = token {
            views.by_token.insert(token.to_string(), key.clone());
        }
        views.entries.insert(
            key.clone(),
            Entry {
                dashboard,
                token: token.map(str::to_string),
                last_seen: Instant::now(),
            },
        );
        key
    }

    /// Registers a view and returns the key to put in the browser's cookie.
    pub fn insert(&self, dashboard: Arc<Dashboard>) -> String {
        self.add(dashboard, None)
    }

    /// Registers a view restored from `token`, so later requests presenting the
    /// same token find it again.
    pub fn insert_for_token(&self, token: &str, dashboard: Arc<Dashboard>) -> String {
        self.add(dashboard, Some(token))
    }

    /// The live view behind a key. Views that were signed out are dropped here.
    pub fn get(&self, key: &str) -> Option<Arc<Dashboard>> {
        let mut views = self.write();
        let entry = views.entries.get_mut(key)?;
        if entry.dashboard.is_shut_down() {
            views.remove(key);
            return None;
        }
        entry.last_seen = Instant::now();
        Some(entry.dashboard.clone())
    }

    /// The view opened for `token`, as long as it is still signed in with it.
    pub fn find_by_token(&self, token: &str) -> Option<(String, Arc<Dashboard>)> {
        let mut views = self.write();
        let key = views.by_token.get(token)?.clone();
        let live = views.entries.get_mut(&key).filter(|entry| {
            !entry.dashboard.is_shut_down()
                && entry
                    .dashboard
                    .auth()
                    .session()
                    .session()
                    .is_some_and(|session| session.access_token == token)
        });
        match live {
            Some(entry) => {
                entry.last_seen = Instant::now();
                Some((key, entry.dashboard.clone()))
            }
            None => {
                views.by_token.remove(token);
                if let Some(entry) = views.entries.get_mut(&key) {
                    entry.token = None;
                }
                None
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Arc<Dashboard>> {
        self.write().remove(key)
    }

    /// Drops views unused for at least `max_idle`, and any that were shut down.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut views = self.write();
        let stale: Vec<String> = views
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry.dashboard.is_shut_down() || entry.last_seen.elapsed() >= max_idle
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            views.remove(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
