//! Thread-safe CSS buffer for styles extracted from component files.
//!
//! The component loader writes CSS here during `transform`, possibly from
//! several tasks at once. It is read back during `generate_bundle`, in the
//! order modules were first transformed.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// CSS keyed by module id, stitched in first-insertion order.
#[derive(Debug, Default)]
pub struct CssCache {
    /// module id → (insertion sequence, css)
    entries: DashMap<String, (usize, String)>,
    next: AtomicUsize,
}

impl CssCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite CSS for a module. An overwrite keeps the module's
    /// original position. Returns the old value if any.
    pub fn insert(&self, module_id: &str, css: String) -> Option<String> {
        match self.entries.entry(module_id.to_string()) {
            Entry::Occupied(mut entry) => Some(std::mem::replace(&mut entry.get_mut().1, css)),
            Entry::Vacant(entry) => {
                entry.insert((self.next.fetch_add(1, Ordering::Relaxed), css));
                None
            }
        }
    }

    /// Clear all cached CSS. Used between builds to prevent stale data.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All non-blank entries in insertion order, trimmed and joined by newlines.
    pub fn stitch(&self) -> String {
        let mut entries: Vec<(usize, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().0, entry.value().1.trim().to_string()))
            .filter(|(_, css)| !css.is_empty())
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries
            .into_iter()
            .map(|(_, css)| css)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
