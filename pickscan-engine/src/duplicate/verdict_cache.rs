//! Short-lived verdict cache
//!
//! Collapses bursts of the same scan into one server round trip. Entries
//! expire after a short TTL; when the cache grows past its cap the oldest
//! entries are evicted first.

use super::DuplicateVerdict;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CachedVerdict {
    verdict: DuplicateVerdict,
    inserted_at: Instant,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct VerdictCache {
    entries: HashMap<String, CachedVerdict>,
    ttl: Duration,
    cap: usize,
}

impl VerdictCache {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            cap: cap.max(1),
        }
    }

    /// Unexpired verdict for `code`; an expired entry is dropped
    pub fn get(&mut self, code: &str, now: Instant) -> Option<DuplicateVerdict> {
        match self.entries.get(code) {
            Some(entry) if now < entry.expires_at => Some(entry.verdict.clone()),
            Some(_) => {
                self.entries.remove(code);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, code: &str, verdict: DuplicateVerdict, now: Instant) {
        self.entries.insert(
            code.to_string(),
            CachedVerdict {
                verdict,
                inserted_at: now,
                expires_at: now + self.ttl,
            },
        );

        if self.entries.len() > self.cap {
            let mut by_age: Vec<(String, Instant)> = self
                .entries
                .iter()
                .map(|(code, entry)| (code.clone(), entry.inserted_at))
                .collect();
            by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
            let excess = self.entries.len() - self.cap;
            for (code, _) in by_age.into_iter().take(excess) {
                self.entries.remove(&code);
            }
        }
    }

    pub fn invalidate(&mut self, code: &str) -> bool {
        self.entries.remove(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickscan_common::events::BlockReason;

    fn blocked() -> DuplicateVerdict {
        DuplicateVerdict::Block {
            reason: BlockReason::RecentlyAdded,
            minutes_elapsed: 1,
            is_already_fulfilled: false,
        }
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let mut cache = VerdictCache::new(Duration::from_secs(2), 50);
        let t0 = Instant::now();
        cache.insert("100200300", blocked(), t0);

        assert_eq!(
            cache.get("100200300", t0 + Duration::from_millis(1999)),
            Some(blocked())
        );
        assert_eq!(cache.get("100200300", t0 + Duration::from_secs(2)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest_first() {
        let mut cache = VerdictCache::new(Duration::from_secs(60), 50);
        let t0 = Instant::now();
        for i in 0..51u64 {
            cache.insert(
                &format!("code-{}", i),
                DuplicateVerdict::Allow,
                t0 + Duration::from_millis(i),
            );
        }

        assert_eq!(cache.len(), 50);
        let now = t0 + Duration::from_millis(100);
        assert_eq!(cache.get("code-0", now), None);
        assert_eq!(cache.get("code-1", now), Some(DuplicateVerdict::Allow));
        assert_eq!(cache.get("code-50", now), Some(DuplicateVerdict::Allow));
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let mut cache = VerdictCache::new(Duration::from_secs(2), 50);
        let t0 = Instant::now();
        cache.insert("100200300", blocked(), t0);
        assert!(cache.invalidate("100200300"));
        assert_eq!(cache.get("100200300", t0), None);
        assert!(!cache.invalidate("100200300"));
    }
}
