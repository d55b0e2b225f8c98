//! Aggregation of per-provider results into what the front-end renders.

use crate::registry::Registry;
use dlaunch_core::ProviderId;

/// A provider that currently has items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnabledProvider {
    pub id: ProviderId,
    pub name: String,
    pub priority: i32,
    pub item_count: usize,
}

/// The enabled providers, in registration order, and the default choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct View {
    enabled: Vec<EnabledProvider>,
    default: Option<ProviderId>,
}

impl View {
    pub fn build(registry: &Registry) -> Self {
        let enabled: Vec<EnabledProvider> = registry
            .entries()
            .iter()
            .filter(|entry| entry.item_count() > 0)
            .map(|entry| EnabledProvider {
                id: entry.id(),
                name: entry.name().to_string(),
                priority: entry.priority(),
                item_count: entry.item_count(),
            })
            .collect();
        let default = default_provider(
            enabled
                .iter()
                .map(|provider| (provider.id, provider.priority, provider.item_count)),
        );
        Self { enabled, default }
    }

    pub fn enabled(&self) -> &[EnabledProvider] {
        &self.enabled
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.enabled.iter().any(|provider| provider.id == id)
    }

    pub fn get(&self, id: ProviderId) -> Option<&EnabledProvider> {
        self.enabled.iter().find(|provider| provider.id == id)
    }

    pub fn default_provider(&self) -> Option<ProviderId> {
        self.default
    }

    /// Enabled providers by descending priority, stable on ties. Each one
    /// contributes its first item to the overview.
    pub fn summary(&self) -> Vec<ProviderId> {
        let mut order: Vec<&EnabledProvider> = self.enabled.iter().collect();
        order.sort_by(|a, b| b.priority.cmp(&a.priority));
        order.into_iter().map(|provider| provider.id).collect()
    }

    /// The enabled provider after `current` in registration order, wrapping.
    pub fn cycle(&self, current: Option<ProviderId>) -> Option<ProviderId> {
        let first = self.enabled.first().map(|provider| provider.id);
        let Some(current) = current else {
            return first;
        };
        self.enabled
            .iter()
            .map(|provider| provider.id)
            .find(|&id| id > current)
            .or(first)
    }
}

/// Highest priority among providers with items; ties go to the lowest id.
pub fn default_provider(
    providers: impl IntoIterator<Item = (ProviderId, i32, usize)>,
) -> Option<ProviderId> {
    providers
        .into_iter()
        .filter(|&(_, _, count)| count > 0)
        .min_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
        .map(|(id, _, _)| id)
}

/// Boundaries of the page that starts at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub start: usize,
    /// First item that does not fit on this page, or the item count.
    pub next: usize,
    /// First item of the previous page. Equals `start` on the first page.
    pub prev: usize,
}

impl Page {
    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.next).contains(&index)
    }
}

/// Lay out items of the given display widths from `start` within `budget`.
///
/// An item costs `min(width, budget)`, so a single wide item still gets a
/// page of its own.
pub fn paginate(widths: &[usize], start: usize, budget: usize) -> Page {
    let start = start.min(widths.len());
    let cost = |width: usize| width.min(budget);

    let mut next = widths.len();
    let mut used = 0;
    for (index, &width) in widths.iter().enumerate().skip(start) {
        used += cost(width);
        if used > budget {
            next = index;
            break;
        }
    }

    let mut prev = start;
    let mut used = 0;
    while prev > 0 {
        used += cost(widths[prev - 1]);
        if used > budget {
            break;
        }
        prev -= 1;
    }

    Page { start, next, prev }
}
