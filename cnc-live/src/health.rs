use crate::link::LinkState;
use crate::registry::{ApplyOutcome, SharedRegistry};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveHealth {
    pub uptime_seconds: u64,
    pub machines_tracked: u32,
    pub link_status: String,
    pub reconnects: u64,
    pub messages_applied: u64,
    pub messages_dropped: u64,
    pub stale_updates: u64,
}

/// Compteurs du canal live, partagés entre le driver et l'affichage
#[derive(Clone)]
pub struct LinkHealth {
    start_time: Instant,
    reconnects: Arc<AtomicU64>,
    applied: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    stale: Arc<AtomicU64>,
    link_status: Arc<parking_lot::Mutex<String>>,
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU64::new(0)),
            applied: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            stale: Arc::new(AtomicU64::new(0)),
            link_status: Arc::new(parking_lot::Mutex::new(LinkState::Disconnected.as_str().to_string())),
        }
    }

    pub fn mark_state(&self, state: LinkState) {
        *self.link_status.lock() = state.as_str().to_string();
    }

    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Created | ApplyOutcome::Applied => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Stale => {
                self.applied.fetch_add(1, Ordering::Relaxed);
                self.stale.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::Rejected => {
                self.stale.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn messages_applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, registry: &SharedRegistry) -> LiveHealth {
        LiveHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            machines_tracked: registry.len() as u32,
            link_status: self.link_status.lock().clone(),
            reconnects: self.reconnects(),
            messages_applied: self.messages_applied(),
            messages_dropped: self.messages_dropped(),
            stale_updates: self.stale.load(Ordering::Relaxed),
        }
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}
