use dlaunch_core::{ProviderError, ProviderResult};

/// One candidate received from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub description: String,
    /// Text sent back on activation, and matched when filtering locally.
    pub action: String,
}

impl Item {
    pub fn new(description: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            action: action.into(),
        }
    }
}

/// The cached batch of a session plus the display order over it.
///
/// `filter` maps a display position to an index into `items`; every entry is
/// a valid index and `filter.len() <= items.len()`.
#[derive(Debug, Default)]
pub struct ItemSet {
    items: Vec<Item>,
    filter: Vec<usize>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch; every item is visible.
    pub fn replace(&mut self, items: Vec<Item>) {
        self.filter = (0..items.len()).collect();
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items = Vec::new();
        self.filter = Vec::new();
    }

    /// Keep only the cached items whose action text starts with `prefix`.
    pub fn refilter(&mut self, prefix: &str) {
        self.filter = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.action.starts_with(prefix))
            .map(|(index, _)| index)
            .collect();
    }

    /// Number of visible items.
    pub fn len(&self) -> usize {
        self.filter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// Size of the underlying batch, visible or not.
    pub fn cached(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, index: usize) -> ProviderResult<&Item> {
        self.filter
            .get(index)
            .and_then(|&i| self.items.get(i))
            .ok_or(ProviderError::IndexOutOfRange {
                index,
                count: self.filter.len(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.filter.iter().filter_map(|&i| self.items.get(i))
    }
}
