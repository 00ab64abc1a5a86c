use crate::session::MutationObserver;
use crate::state::data::SnipRecord;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Decoded previews of one snip
#[derive(Debug, Clone)]
pub struct PreviewEntry {
    /// Record the previews were loaded for
    pub record: SnipRecord,
    /// Flipbook frames in playback order; empty when there is no flipbook
    pub frames: Vec<RgbaImage>,
    pub snapshot: Option<RgbaImage>,
}

impl PreviewEntry {
    pub fn identifier(&self) -> &str {
        &self.record.identifier
    }
}

/// In-memory previews keyed by identifier.
///
/// No per-entry ageing: the whole map is dropped on every flush interval,
/// and single entries are dropped when their snip is mutated.
#[derive(Debug)]
pub struct PreviewCache {
    entries: HashMap<String, Arc<PreviewEntry>>,
    flush_interval: Duration,
    last_flush: Instant,
}

impl PreviewCache {
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    /// Cached entry, or the result of `loader` which is then cached
    pub fn get_or_load<F>(&mut self, identifier: &str, loader: F) -> Arc<PreviewEntry>
    where
        F: FnOnce() -> PreviewEntry,
    {
        if let Some(entry) = self.entries.get(identifier) {
            return Arc::clone(entry);
        }

        debug!(identifier, "preview cache miss");
        let entry = Arc::new(loader());
        self.entries.insert(identifier.to_string(), Arc::clone(&entry));
        entry
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<PreviewEntry>> {
        self.entries.get(identifier).cloned()
    }

    /// Store a freshly loaded entry, replacing any previous one wholesale
    pub fn insert(&mut self, entry: PreviewEntry) -> Arc<PreviewEntry> {
        let entry = Arc::new(entry);
        self.entries
            .insert(entry.identifier().to_string(), Arc::clone(&entry));
        entry
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate(&mut self, identifier: &str) {
        if self.entries.remove(identifier).is_some() {
            debug!(identifier, "preview invalidated");
        }
    }

    pub fn clear(&mut self) {
        debug!(entries = self.entries.len(), "preview cache cleared");
        self.entries.clear();
        self.last_flush = Instant::now();
    }

    /// Clear everything if the flush interval has passed since the last clear.
    /// The caller owns the timer; this only decides.
    pub fn flush_if_due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_flush) < self.flush_interval {
            return false;
        }
        self.clear();
        self.last_flush = now;
        true
    }
}

impl MutationObserver for PreviewCache {
    fn on_mutated(&mut self, identifier: &str) {
        self.invalidate(identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(identifier: &str, frames: usize) -> PreviewEntry {
        PreviewEntry {
            record: SnipRecord {
                path: "/lib/userA".into(),
                user: "userA".into(),
                identifier: identifier.into(),
                ext: "uti".into(),
                flipbook: None,
                snapshot: None,
                summary: String::new(),
                keywords: vec![],
                date: String::new(),
                time: String::new(),
                size: 0,
            },
            frames: (0..frames).map(|_| RgbaImage::new(2, 2)).collect(),
            snapshot: None,
        }
    }

    #[test]
    fn test_get_or_load_calls_loader_once() {
        let mut cache = PreviewCache::new(Duration::from_secs(300));
        let mut calls = 0;

        let first = cache.get_or_load("SOP_a_b_c_v01", || {
            calls += 1;
            entry("SOP_a_b_c_v01", 3)
        });
        let second = cache.get_or_load("SOP_a_b_c_v01", || {
            calls += 1;
            entry("SOP_a_b_c_v01", 0)
        });

        assert_eq!(calls, 1);
        assert_eq!(first.frames.len(), 3);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let mut cache = PreviewCache::new(Duration::from_secs(300));
        cache.insert(entry("SOP_a_b_c_v01", 12));

        cache.on_mutated("SOP_a_b_c_v01");
        cache.invalidate("SOP_never_was_here_v01");

        let reloaded = cache.get_or_load("SOP_a_b_c_v01", || entry("SOP_a_b_c_v01", 2));
        assert_eq!(reloaded.frames.len(), 2);
    }

    #[test]
    fn test_flush_if_due() {
        let mut cache = PreviewCache::new(Duration::from_secs(300));
        cache.insert(entry("SOP_a_b_c_v01", 1));
        cache.insert(entry("SOP_a_b_d_v01", 1));
        let start = Instant::now();

        assert!(!cache.flush_if_due(start));
        assert_eq!(cache.len(), 2);

        assert!(cache.flush_if_due(start + Duration::from_secs(301)));
        assert!(cache.is_empty());
    }
}
