// src/speed_limit/cache.rs
//
// In-memory limit cache keyed by ~11 m cells. Entries carry their own TTL so
// live answers and static fallbacks can age differently. Nothing survives a
// restart.
//
// Stale entries are dropped when read, and swept in bulk whenever the map
// has doubled since the previous sweep, so memory tracks the set of cells
// seen within one TTL rather than every cell ever seen.

use crate::geo::CellKey;
use crate::types::SpeedLimitLookup;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

const MIN_SWEEP_LEN: usize = 1024;

#[derive(Debug, Clone)]
struct CacheEntry {
    lookup: SpeedLimitLookup,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.lookup.fetched_at < self.ttl
    }
}

#[derive(Debug)]
struct Entries {
    map: HashMap<CellKey, CacheEntry>,
    sweep_at: usize,
}

#[derive(Debug)]
pub struct LimitCache {
    entries: Mutex<Entries>,
    min_sweep_len: usize,
}

impl Default for LimitCache {
    fn default() -> Self {
        Self::with_sweep_threshold(MIN_SWEEP_LEN)
    }
}

impl LimitCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_sweep_threshold(min_sweep_len: usize) -> Self {
        let min_sweep_len = min_sweep_len.max(1);
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                sweep_at: min_sweep_len,
            }),
            min_sweep_len,
        }
    }

    /// The stored lookup if it is still fresh. Stale entries are evicted.
    pub fn get(&self, key: &CellKey, now: DateTime<Utc>) -> Option<SpeedLimitLookup> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let fresh = entries.map.get(key)?.is_fresh(now);
        if fresh {
            entries.map.get(key).map(|e| e.lookup.clone())
        } else {
            entries.map.remove(key);
            None
        }
    }

    /// Last write wins. `lookup.fetched_at` is taken as the current time.
    pub fn insert(&self, key: CellKey, lookup: SpeedLimitLookup, ttl: Duration) {
        let now = lookup.fetched_at;
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.map.insert(key, CacheEntry { lookup, ttl });

        if entries.map.len() >= entries.sweep_at {
            entries.map.retain(|_, e| e.is_fresh(now));
            let next = (entries.map.len() * 2).max(self.min_sweep_len);
            entries.sweep_at = next;
        }
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let dropped = entries.map.len();
        entries.map.clear();
        entries.sweep_at = self.min_sweep_len;
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LimitSource, RoadType};
    use chrono::TimeZone;

    fn lookup(at: DateTime<Utc>) -> SpeedLimitLookup {
        SpeedLimitLookup {
            lat: -12.05,
            lon: -77.04,
            speed_limit_kmh: 60.0,
            road_type: Some(RoadType::Urban),
            source: LimitSource::Live,
            fetched_at: at,
        }
    }

    #[test]
    fn test_entry_expires_exactly_at_ttl() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = LimitCache::new();
        let key = CellKey::from_coordinate(-12.05, -77.04);
        cache.insert(key, lookup(t0), Duration::days(7));

        assert!(cache.get(&key, t0 + Duration::days(7) - Duration::seconds(1)).is_some());
        assert!(cache.get(&key, t0 + Duration::days(7)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_reports_dropped_entries() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = LimitCache::new();
        cache.insert(CellKey::from_coordinate(1.0, 1.0), lookup(t0), Duration::hours(1));
        cache.insert(CellKey::from_coordinate(2.0, 2.0), lookup(t0), Duration::hours(1));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_sweeps_stale_cells() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = LimitCache::with_sweep_threshold(4);
        for i in 0..3 {
            let key = CellKey::from_coordinate(-12.0 - i as f64, -77.0);
            cache.insert(key, lookup(t0), Duration::hours(1));
        }
        assert_eq!(cache.len(), 3);

        // Two hours later the three old cells are stale and never read again.
        let later = t0 + Duration::hours(2);
        cache.insert(CellKey::from_coordinate(-20.0, -70.0), lookup(later), Duration::hours(1));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CellKey::from_coordinate(-20.0, -70.0), later).is_some());
    }

    #[test]
    fn test_sweep_keeps_fresh_entries() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let cache = LimitCache::with_sweep_threshold(2);
        cache.insert(CellKey::from_coordinate(1.0, 1.0), lookup(t0), Duration::days(7));
        cache.insert(CellKey::from_coordinate(2.0, 2.0), lookup(t0), Duration::days(7));
        cache.insert(CellKey::from_coordinate(3.0, 3.0), lookup(t0), Duration::days(7));
        assert_eq!(cache.len(), 3);
    }
}
