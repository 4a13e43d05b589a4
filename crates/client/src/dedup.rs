//! Incident delivery deduplication.
//!
//! The same incident can arrive through the global channel and through a
//! viewport room. The cache remembers recently forwarded ids so each one
//! reaches the UI once per window.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::DedupSettings;

#[derive(Debug)]
pub struct DedupCache {
    seen: HashMap<String, Instant>,
    window: Duration,
    prune_threshold: usize,
}

impl DedupCache {
    pub fn new(settings: &DedupSettings) -> Self {
        Self {
            seen: HashMap::new(),
            window: settings.window(),
            prune_threshold: settings.prune_threshold,
        }
    }

    /// Records `incident_id` at `now`. Returns `false` when it was already
    /// seen within the window and should be dropped.
    pub fn check_and_record(&mut self, incident_id: &str, now: Instant) -> bool {
        if let Some(seen_at) = self.seen.get(incident_id) {
            if now.saturating_duration_since(*seen_at) < self.window {
                return false;
            }
        }

        self.seen.insert(incident_id.to_string(), now);
        if self.seen.len() > self.prune_threshold {
            self.prune(now);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        let before = self.seen.len();
        self.seen
            .retain(|_, seen_at| now.saturating_duration_since(*seen_at) < window);
        tracing::trace!(removed = before - self.seen.len(), "Pruned dedup table");
    }
}
