use std::collections::HashMap;
use std::sync::Mutex;

/// A memoized provider result for one normalized base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedTranslation {
    Translated(String),
    /// The provider confirmed there is nothing to translate.
    NotTranslatable,
}

impl CachedTranslation {
    pub fn translated(&self) -> Option<&str> {
        match self {
            CachedTranslation::Translated(text) => Some(text),
            CachedTranslation::NotTranslatable => None,
        }
    }
}

/// Process-lifetime translation memo keyed by normalized base name.
///
/// Entries are write-once: the first stored result wins and is never
/// replaced. Failures are never stored, so a failed name can be retried.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: Mutex<HashMap<String, CachedTranslation>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedTranslation> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    /// Stores `value` unless `key` already has an entry. Returns the entry
    /// that is in the cache afterwards.
    pub fn insert_if_absent(&self, key: &str, value: CachedTranslation) -> CachedTranslation {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(key.to_string())
            .or_insert(value)
            .clone()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
