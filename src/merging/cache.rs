/*!
 * Merged subtitle caching.
 *
 * A merge of the same two sources read with the same encodings always produces
 * the same track, so merged tracks are memoized by the identity of both sources.
 * Entries are never mutated: a changed source or encoding simply misses.
 */

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;
use log::debug;

use crate::subtitle_processor::Subtitles;

/// Identity of one subtitle source as it was read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    /// Stable id of the source (container path plus stream index, or file path)
    pub source_id: String,

    /// Declared text encoding used to decode the source
    pub encoding: String,
}

impl SourceKey {
    /// Create a new source key
    pub fn new(source_id: impl Into<String>, encoding: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            encoding: encoding.into(),
        }
    }
}

/// A cached merge result together with the identities it was computed from
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSubtitleInfo {
    pub merged: Arc<Subtitles>,
    pub upper_source_id: String,
    pub upper_encoding: String,
    pub lower_source_id: String,
    pub lower_encoding: String,
}

impl MergedSubtitleInfo {
    pub fn new(merged: Arc<Subtitles>, upper: &SourceKey, lower: &SourceKey) -> Self {
        Self {
            merged,
            upper_source_id: upper.source_id.clone(),
            upper_encoding: upper.encoding.clone(),
            lower_source_id: lower.source_id.clone(),
            lower_encoding: lower.encoding.clone(),
        }
    }
}

/// Memoization map of merged tracks keyed by `(upper, lower)` source identities
pub struct MergeCache {
    /// Internal cache storage
    cache: Arc<RwLock<HashMap<(SourceKey, SourceKey), MergedSubtitleInfo>>>,

    /// Cache hit counter
    hits: Arc<RwLock<usize>>,

    /// Cache miss counter
    misses: Arc<RwLock<usize>>,
}

impl Default for MergeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(RwLock::new(0)),
            misses: Arc::new(RwLock::new(0)),
        }
    }

    /// Look up the merge of two sources
    pub fn get(&self, upper: &SourceKey, lower: &SourceKey) -> Option<MergedSubtitleInfo> {
        let cache = self.cache.read();

        match cache.get(&(upper.clone(), lower.clone())) {
            Some(info) => {
                *self.hits.write() += 1;
                debug!("Merge cache hit for {} + {}", upper.source_id, lower.source_id);
                Some(info.clone())
            }
            None => {
                *self.misses.write() += 1;
                debug!("Merge cache miss for {} + {}", upper.source_id, lower.source_id);
                None
            }
        }
    }

    /// Store a merge result under the identities it records
    pub fn store(&self, info: MergedSubtitleInfo) {
        let key = (
            SourceKey::new(info.upper_source_id.clone(), info.upper_encoding.clone()),
            SourceKey::new(info.lower_source_id.clone(), info.lower_encoding.clone()),
        );
        self.cache.write().insert(key, info);
    }

    /// Get cache statistics as (hits, misses, hit rate)
    pub fn stats(&self) -> (usize, usize, f64) {
        let hits = *self.hits.read();
        let misses = *self.misses.read();
        let total = hits + misses;

        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (hits, misses, hit_rate)
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
