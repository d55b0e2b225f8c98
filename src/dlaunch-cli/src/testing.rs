use dlaunch_core::{ActivationMode, Provider, ProviderError, ProviderResult};
use dlaunch_runtime::{Launcher, Layout, Registry};

/// Offers the candidates that start with the query text.
pub struct FixedProvider {
    name: &'static str,
    priority: i32,
    candidates: Vec<&'static str>,
    matches: Vec<&'static str>,
}

impl FixedProvider {
    pub fn new(name: &'static str, priority: i32, candidates: &[&'static str]) -> Self {
        Self {
            name,
            priority,
            candidates: candidates.to_vec(),
            matches: Vec::new(),
        }
    }

    fn candidate(&self, index: usize) -> ProviderResult<&str> {
        self.matches
            .get(index)
            .copied()
            .ok_or(ProviderError::IndexOutOfRange {
                index,
                count: self.matches.len(),
            })
    }
}

impl Provider for FixedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn query(&mut self, input: &str) -> usize {
        self.matches = self
            .candidates
            .iter()
            .copied()
            .filter(|c| c.starts_with(input))
            .collect();
        self.matches.len()
    }

    fn item_count(&self) -> usize {
        self.matches.len()
    }

    fn description(&self, index: usize) -> ProviderResult<&str> {
        self.candidate(index)
    }

    fn action_text(&self, index: usize) -> ProviderResult<&str> {
        self.candidate(index)
    }

    fn open(&mut self, _index: Option<usize>, _fallback: &str, _mode: ActivationMode) -> bool {
        true
    }
}

pub fn launcher() -> Launcher {
    let mut registry = Registry::new();
    registry
        .register(Box::new(FixedProvider::new("cmd", 1, &["ls", "lsblk", "xterm"])))
        .unwrap();
    registry
        .register(Box::new(FixedProvider::new("hosts", 0, &["ls.example.org"])))
        .unwrap();
    Launcher::new(registry, None, Layout::Vertical { lines: 10 })
}
