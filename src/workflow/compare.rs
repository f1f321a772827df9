use std::collections::{BTreeSet, HashMap};

use crate::models::{DatasetMetadata, DatasetPreview};

/// Side-by-side comparison selection plus its per-dataset payloads.
///
/// Cache entries only ever exist for selected ids: insertion and eviction go
/// through `insert`/`remove`/`clear`, which update all three collections
/// together.
#[derive(Debug, Clone, Default)]
pub struct ComparisonCache {
    selection: BTreeSet<String>,
    metadata: HashMap<String, DatasetMetadata>,
    previews: HashMap<String, DatasetPreview>,
}

impl ComparisonCache {
    pub fn contains(&self, id: &str) -> bool {
        self.selection.contains(id)
    }

    pub fn len(&self) -> usize {
        self.selection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }

    /// Selected ids in a stable order
    pub fn selected_ids(&self) -> Vec<String> {
        self.selection.iter().cloned().collect()
    }

    pub fn metadata(&self, id: &str) -> Option<&DatasetMetadata> {
        self.metadata.get(id)
    }

    pub fn preview(&self, id: &str) -> Option<&DatasetPreview> {
        self.previews.get(id)
    }

    /// Add `id` with its fetched payloads. Metadata may be absent when its fetch degraded.
    pub(crate) fn insert(
        &mut self,
        id: &str,
        preview: DatasetPreview,
        metadata: Option<DatasetMetadata>,
    ) {
        self.selection.insert(id.to_string());
        self.previews.insert(id.to_string(), preview);
        match metadata {
            Some(metadata) => {
                self.metadata.insert(id.to_string(), metadata);
            }
            None => {
                self.metadata.remove(id);
            }
        }
    }

    /// Replace payloads of an already-selected id; ignored if `id` is not selected
    pub(crate) fn refresh(
        &mut self,
        id: &str,
        preview: DatasetPreview,
        metadata: Option<DatasetMetadata>,
    ) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.insert(id, preview, metadata);
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.metadata.remove(id);
        self.previews.remove(id);
        self.selection.remove(id)
    }

    pub(crate) fn clear(&mut self) {
        self.selection.clear();
        self.metadata.clear();
        self.previews.clear();
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.metadata.keys().all(|k| self.selection.contains(k))
            && self.previews.keys().all(|k| self.selection.contains(k))
    }
}
