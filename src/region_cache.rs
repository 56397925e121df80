// Copyright 2026 RangeStore Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::region::RegionInfo;

/// (table, start key), compared lexicographically with the table as the
/// higher-order key, so one table's regions are contiguous in the map.
type CacheKey = (Vec<u8>, Vec<u8>);

/// The region location cache.
///
/// Invariant: the cached ranges of any single table are pairwise disjoint.
/// Gaps are fine; not every key of a table needs a cached region.
pub(crate) struct RegionCache {
    regions: RwLock<BTreeMap<CacheKey, Arc<RegionInfo>>>,
}

impl RegionCache {
    pub(crate) fn new() -> RegionCache {
        RegionCache {
            regions: RwLock::new(BTreeMap::new()),
        }
    }

    /// The cached region containing (table, key), if any.
    pub(crate) fn get(&self, table: &[u8], key: &[u8]) -> Option<Arc<RegionInfo>> {
        let regions = self.regions.read().unwrap();
        let bound = (table.to_vec(), key.to_vec());
        let (_, candidate) = regions.range(..=bound).next_back()?;
        if candidate.table() == table && candidate.contains_key(key) {
            Some(candidate.clone())
        } else {
            None
        }
    }

    /// Insert `region`, atomically displacing every cached region of the same
    /// table whose range overlaps it. Returns the installed region and the
    /// displaced set. If an overlapping region with the same identity is
    /// already cached, that one stays installed and nothing is displaced.
    pub(crate) fn put(&self, region: Arc<RegionInfo>) -> (Arc<RegionInfo>, Vec<Arc<RegionInfo>>) {
        let mut regions = self.regions.write().unwrap();

        let mut overlapping = Vec::new();
        let lower = (region.table().to_vec(), Vec::new());
        for (cache_key, cached) in regions.range(lower..) {
            if cached.table() != region.table() {
                break;
            }
            if !region.stop_key().is_empty() && cached.start_key() >= region.stop_key() {
                break;
            }
            let overlaps =
                cached.stop_key().is_empty() || cached.stop_key() > region.start_key();
            if overlaps {
                if cached.name() == region.name() {
                    return (cached.clone(), Vec::new());
                }
                overlapping.push(cache_key.clone());
            }
        }

        let mut removed = Vec::with_capacity(overlapping.len());
        for cache_key in overlapping {
            if let Some(stale) = regions.remove(&cache_key) {
                removed.push(stale);
            }
        }
        regions.insert(
            (region.table().to_vec(), region.start_key().to_vec()),
            region.clone(),
        );
        (region, removed)
    }

    /// Remove `region` by identity. A different region occupying the same
    /// (table, start key) slot is left alone.
    pub(crate) fn del(&self, region: &RegionInfo) {
        let mut regions = self.regions.write().unwrap();
        let cache_key = (region.table().to_vec(), region.start_key().to_vec());
        if regions
            .get(&cache_key)
            .is_some_and(|cached| cached.name() == region.name())
        {
            regions.remove(&cache_key);
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<Arc<RegionInfo>> {
        self.regions.read().unwrap().values().cloned().collect()
    }
}
