use std::collections::HashMap;

use crate::types::BeadDetail;

/// Loop-confined map of bead id → resolved detail.
///
/// No eviction: dashboards are short-lived, and the whole map is dropped by
/// `invalidate` whenever a pipeline may have changed the backlog.
#[derive(Debug, Default)]
pub struct DetailCache {
    entries: HashMap<String, BeadDetail>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached detail and whether the lookup hit.
    pub fn get(&self, id: &str) -> Option<&BeadDetail> {
        self.entries.get(id)
    }

    pub fn set(&mut self, detail: BeadDetail) {
        self.entries.insert(detail.id.clone(), detail);
    }

    /// Drop every entry.
    pub fn invalidate(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
