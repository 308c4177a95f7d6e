//! Duplicate-suppression cache.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use sha2::{Digest, Sha256};

/// Derive the dedup key for a find.
///
/// Two events with the same username, item, and feed timestamp are the same
/// occurrence no matter how often or in which order the feed repeats them.
pub fn fingerprint(username: &str, item_name: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{username}:{item_name}:{timestamp}").as_bytes());
    hex::encode(hasher.finalize())
}

/// Fixed-capacity recency window of event fingerprints.
///
/// Eviction is strict FIFO by insertion order; looking an entry up never
/// extends its life.
pub struct DedupCache {
    window_size: usize,
    ring: VecDeque<String>,
    seen: FxHashSet<String>,
}

impl DedupCache {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ring: VecDeque::with_capacity(window_size),
            seen: FxHashSet::default(),
        }
    }

    pub fn is_duplicate(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    /// Record a fingerprint, evicting the oldest entry once the window is
    /// full. Re-recording a present fingerprint keeps it at one slot.
    pub fn record(&mut self, fingerprint: String) {
        if self.seen.contains(&fingerprint) {
            return;
        }
        if self.ring.len() >= self.window_size
            && let Some(oldest) = self.ring.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.ring.push_back(fingerprint.clone());
        self.seen.insert(fingerprint);
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_duplicate() {
        let mut cache = DedupCache::new(10);
        let fp = fingerprint("someone", "Starlight", "2024-05-01T12:00:05Z");

        assert!(!cache.is_duplicate(&fp));
        cache.record(fp.clone());
        assert!(cache.is_duplicate(&fp));
    }

    #[test]
    fn test_fifo_eviction_past_window() {
        let mut cache = DedupCache::new(3);
        let first = fingerprint("a", "item", "t0");
        cache.record(first.clone());
        for i in 1..=3 {
            cache.record(fingerprint("a", "item", &format!("t{i}")));
        }

        assert!(!cache.is_duplicate(&first));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut cache = DedupCache::new(3);
        let fp = fingerprint("a", "item", "t0");
        cache.record(fp.clone());
        cache.record(fp.clone());
        assert_eq!(cache.len(), 1);

        // The double record must not have consumed a second slot.
        cache.record(fingerprint("a", "item", "t1"));
        cache.record(fingerprint("a", "item", "t2"));
        assert!(cache.is_duplicate(&fp));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(
            fingerprint("someone", "Starlight", "t"),
            fingerprint("someone", "Starlight", "t")
        );
        assert_ne!(
            fingerprint("someone", "Starlight", "t"),
            fingerprint("someone", "Starlight", "u")
        );
    }

    #[test]
    fn test_clear() {
        let mut cache = DedupCache::new(3);
        cache.record(fingerprint("a", "item", "t0"));
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.is_duplicate(&fingerprint("a", "item", "t0")));
    }
}
