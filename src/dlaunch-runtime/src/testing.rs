//! In-memory providers for unit tests.

use dlaunch_core::{ActivationMode, Provider, ProviderError, ProviderResult};
use std::cell::RefCell;
use std::rc::Rc;

/// Answers every query by prefix-matching a fixed candidate list.
pub struct StaticProvider {
    name: String,
    priority: i32,
    history: bool,
    candidates: Vec<String>,
    matches: Vec<usize>,
    /// Results held back until the next `update()`.
    deferred: Option<Vec<usize>>,
    delayed: bool,
    opened: Rc<RefCell<Vec<String>>>,
}

impl StaticProvider {
    pub fn new(name: &str, priority: i32, candidates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            priority,
            history: false,
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            matches: Vec::new(),
            deferred: None,
            delayed: false,
            opened: Rc::default(),
        }
    }

    pub fn with_history(mut self) -> Self {
        self.history = true;
        self
    }

    /// Answer queries with zero items and publish them on `update()`, like
    /// a provider still streaming its batch.
    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    /// Texts passed to `open`, alternate activations prefixed with `alt `.
    pub fn opened(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.opened)
    }

    fn candidate(&self, index: usize) -> ProviderResult<&str> {
        self.matches
            .get(index)
            .and_then(|&i| self.candidates.get(i))
            .map(String::as_str)
            .ok_or(ProviderError::IndexOutOfRange {
                index,
                count: self.matches.len(),
            })
    }
}

impl Provider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn records_history(&self) -> bool {
        self.history
    }

    fn query(&mut self, input: &str) -> usize {
        let matches = self
            .candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.starts_with(input))
            .map(|(i, _)| i)
            .collect();
        if self.delayed {
            self.matches.clear();
            self.deferred = Some(matches);
        } else {
            self.matches = matches;
        }
        self.matches.len()
    }

    fn update(&mut self) -> usize {
        if let Some(matches) = self.deferred.take() {
            self.matches = matches;
        }
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

    fn open(&mut self, index: Option<usize>, fallback: &str, mode: ActivationMode) -> bool {
        let text = index
            .and_then(|i| self.candidate(i).ok())
            .unwrap_or(fallback)
            .to_string();
        let text = match mode {
            ActivationMode::Normal => text,
            ActivationMode::Alternate => format!("alt {text}"),
        };
        self.opened.borrow_mut().push(text);
        true
    }
}
