use dlaunch_runtime::{Launcher, Registry};
use serde::Serialize;
use std::io::{self, Write};

/// The aggregated result of a one-shot query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryReport {
    pub input: String,
    pub default_provider: Option<String>,
    pub providers: Vec<ProviderReport>,
    /// First item of each provider, highest priority first.
    pub summary: Vec<SummaryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    pub id: usize,
    pub name: String,
    pub priority: i32,
    pub items: Vec<ItemReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub description: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub provider: String,
    pub description: String,
}

impl QueryReport {
    pub fn from_launcher(launcher: &Launcher) -> Self {
        let registry = launcher.registry();
        let view = launcher.view();

        let providers = view
            .enabled()
            .iter()
            .map(|provider| ProviderReport {
                id: provider.id.index(),
                name: provider.name.clone(),
                priority: provider.priority,
                items: items(registry, provider.id),
            })
            .collect();

        let summary = view
            .summary()
            .into_iter()
            .filter_map(|id| {
                let entry = registry.get(id)?;
                let description = registry.description(id, 0).ok()?;
                Some(SummaryEntry {
                    provider: entry.name().to_string(),
                    description: description.to_string(),
                })
            })
            .collect();

        let default_provider = view
            .default_provider()
            .and_then(|id| registry.get(id))
            .map(|entry| entry.name().to_string());

        Self {
            input: launcher.input().to_string(),
            default_provider,
            providers,
            summary,
        }
    }

    pub fn write_text(&self, out: &mut impl Write) -> io::Result<()> {
        if self.providers.is_empty() {
            writeln!(out, "no results for '{}'", self.input)?;
            return Ok(());
        }
        for provider in &self.providers {
            let marker = if self.default_provider.as_deref() == Some(provider.name.as_str()) {
                " (default)"
            } else {
                ""
            };
            writeln!(
                out,
                "{} [priority {}]{}",
                provider.name, provider.priority, marker
            )?;
            for item in &provider.items {
                writeln!(out, "  {}\t{}", item.description, item.action)?;
            }
        }
        Ok(())
    }
}

fn items(registry: &Registry, id: dlaunch_core::ProviderId) -> Vec<ItemReport> {
    (0..registry.item_count(id))
        .filter_map(|index| {
            Some(ItemReport {
                description: registry.description(id, index).ok()?.to_string(),
                action: registry.action_text(id, index).ok()?.to_string(),
            })
        })
        .collect()
}
