use crate::registry::{QueryRoute, Registry};
use crate::view::{paginate, Page, View};
use dlaunch_core::{ActivationMode, History, ProviderId};
use unicode_width::UnicodeWidthStr;

/// Cells reserved around each item in the horizontal layout.
const ITEM_PADDING: usize = 2;

/// How many items fit on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One row, `width` cells wide.
    Horizontal { width: usize },
    /// One item per line.
    Vertical { lines: usize },
}

impl Layout {
    /// `lines > 0` selects the vertical list.
    pub fn from_display(width: usize, lines: usize) -> Self {
        if lines > 0 {
            Layout::Vertical { lines }
        } else {
            Layout::Horizontal { width }
        }
    }

    fn budget(self) -> usize {
        match self {
            Layout::Horizontal { width } => width,
            Layout::Vertical { lines } => lines,
        }
    }

    fn item_width(self, description: &str) -> usize {
        match self {
            Layout::Horizontal { .. } => description.width() + ITEM_PADDING,
            Layout::Vertical { .. } => 1,
        }
    }
}

/// An activation handed to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub provider: ProviderId,
    pub provider_name: String,
    /// The item's action text, or the typed input when nothing was selected.
    pub text: String,
    pub mode: ActivationMode,
    /// Whether the provider accepted it.
    pub dispatched: bool,
}

/// One item of the page being displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub index: usize,
    pub description: String,
    pub selected: bool,
}

/// Input text, provider results and selection state of one launcher.
pub struct Launcher {
    registry: Registry,
    history: Option<History>,
    layout: Layout,
    input: String,
    last_query: Option<String>,
    route: QueryRoute,
    view: View,
    current: Option<ProviderId>,
    /// Set once the user picked a provider explicitly.
    pinned: bool,
    selected: Option<usize>,
    page_start: usize,
    visible: bool,
}

impl Launcher {
    pub fn new(registry: Registry, history: Option<History>, layout: Layout) -> Self {
        Self {
            registry,
            history,
            layout,
            input: String::new(),
            last_query: None,
            route: QueryRoute::All,
            view: View::default(),
            current: None,
            pinned: false,
            selected: None,
            page_start: 0,
            visible: false,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn route(&self) -> &QueryRoute {
        &self.route
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn current_provider(&self) -> Option<ProviderId> {
        self.current
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn show(&mut self) {
        if self.visible {
            return;
        }
        self.visible = true;
        self.last_query = None;
        let input = self.input.clone();
        self.set_input(&input);
    }

    pub fn hide(&mut self) {
        self.visible = false;
        self.input.clear();
        self.last_query = None;
        self.pinned = false;
        self.selected = None;
        self.page_start = 0;
        if let Some(history) = self.history.as_mut() {
            history.reset_cursor();
        }
    }

    /// Replace the input text and query the providers. Identical text is not
    /// queried again. Returns whether a query was sent.
    pub fn set_input(&mut self, text: &str) -> bool {
        text.clone_into(&mut self.input);
        if self.last_query.as_deref() == Some(text) {
            return false;
        }
        self.route = self.registry.query(text);
        self.last_query = Some(text.to_string());
        self.pinned = false;
        self.selected = None;
        self.page_start = 0;
        self.rebuild();
        true
    }

    /// Pick up results that arrived after the query.
    pub fn refresh(&mut self) {
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.view = View::build(&self.registry);
        let keep = self.pinned && self.current.is_some_and(|id| self.view.contains(id));
        let current = if keep {
            self.current
        } else {
            self.view.default_provider()
        };
        if current != self.current {
            self.selected = None;
            self.page_start = 0;
        }
        self.current = current;
        self.pinned = keep;

        let count = self.current_count();
        if self.selected.is_some_and(|index| index >= count) {
            self.selected = count.checked_sub(1);
        }
        if self.page_start >= count {
            self.page_start = 0;
        }
    }

    fn current_count(&self) -> usize {
        self.current.map_or(0, |id| self.registry.item_count(id))
    }

    pub fn cycle_provider(&mut self) {
        let next = self.view.cycle(self.current);
        if next != self.current {
            self.selected = None;
            self.page_start = 0;
        }
        self.current = next;
        self.pinned = next.is_some();
    }

    /// The page holding the current page start.
    pub fn page(&self) -> Page {
        let widths: Vec<usize> = match self.current {
            Some(id) => (0..self.registry.item_count(id))
                .map(|index| {
                    let description = self.registry.description(id, index).unwrap_or_default();
                    self.layout.item_width(description)
                })
                .collect(),
            None => Vec::new(),
        };
        paginate(&widths, self.page_start, self.layout.budget())
    }

    pub fn rows(&self) -> Vec<Row> {
        let Some(id) = self.current else {
            return Vec::new();
        };
        let page = self.page();
        (page.start..page.next)
            .map(|index| Row {
                index,
                description: self
                    .registry
                    .description(id, index)
                    .unwrap_or_default()
                    .to_string(),
                selected: self.selected == Some(index),
            })
            .collect()
    }

    pub fn select_next(&mut self) {
        let count = self.current_count();
        if count == 0 {
            return;
        }
        let index = match self.selected {
            None => self.page_start,
            Some(index) => (index + 1).min(count - 1),
        };
        self.selected = Some(index);
        self.pinned = true;
        let page = self.page();
        if index >= page.next {
            self.page_start = page.next;
        }
    }

    /// Moving up from the first item returns to the typed input.
    pub fn select_previous(&mut self) {
        self.selected = match self.selected {
            None | Some(0) => None,
            Some(index) => Some(index - 1),
        };
        if let Some(index) = self.selected {
            if index < self.page_start {
                self.page_start = self.page().prev;
            }
        } else {
            self.page_start = 0;
        }
    }

    pub fn next_page(&mut self) {
        let page = self.page();
        if page.next < self.current_count() {
            self.page_start = page.next;
            self.selected = Some(page.next);
            self.pinned = true;
        }
    }

    pub fn previous_page(&mut self) {
        if self.page_start == 0 {
            return;
        }
        let page = self.page();
        self.page_start = page.prev;
        self.selected = Some(page.prev);
        self.pinned = true;
    }

    fn selected_action(&self) -> Option<&str> {
        let id = self.current?;
        let index = self.selected?;
        self.registry.action_text(id, index).ok()
    }

    /// Copy the selected item's action text into the input.
    pub fn complete(&mut self) -> bool {
        let Some(text) = self.selected_action().map(str::to_string) else {
            return false;
        };
        self.set_input(&text);
        true
    }

    /// Activate the selection, or the typed input when nothing is selected.
    ///
    /// With no provider holding items the typed input goes to the default
    /// provider among all registered ones.
    pub fn activate(&mut self, mode: ActivationMode) -> Option<Activation> {
        let id = self.current.or_else(|| self.fallback_provider())?;
        let fallback = match &self.route {
            QueryRoute::Filtered { text, .. } => text.clone(),
            QueryRoute::All => self.input.clone(),
        };
        let text = self
            .selected_action()
            .map(str::to_string)
            .unwrap_or_else(|| fallback.clone());
        let index = if self.current == Some(id) {
            self.selected
        } else {
            None
        };

        let dispatched = match self.registry.open(id, index, &fallback, mode) {
            Ok(dispatched) => dispatched,
            Err(err) => {
                tracing::warn!(provider = %id, error = %err, "activation failed");
                false
            }
        };
        let entry = self.registry.get(id)?;
        let activation = Activation {
            provider: id,
            provider_name: entry.name().to_string(),
            text,
            mode,
            dispatched,
        };

        if dispatched {
            if entry.provider().records_history() {
                if let Some(history) = self.history.as_mut() {
                    if let Err(err) = history.add(&activation.provider_name, &activation.text) {
                        tracing::warn!(error = %err, "failed to record history");
                    }
                }
            }
            self.hide();
        }
        Some(activation)
    }

    fn fallback_provider(&self) -> Option<ProviderId> {
        crate::view::default_provider(
            self.registry
                .entries()
                .iter()
                .map(|entry| (entry.id(), entry.priority(), 1)),
        )
    }

    pub fn history_previous(&mut self) -> bool {
        let line = self
            .history
            .as_mut()
            .and_then(|history| history.previous().map(str::to_string));
        match line {
            Some(line) => {
                self.jump_to_history(&line);
                true
            }
            None => false,
        }
    }

    pub fn history_next(&mut self) -> bool {
        let line = self
            .history
            .as_mut()
            .and_then(|history| history.next().map(str::to_string));
        match line {
            Some(line) => {
                self.jump_to_history(&line);
                true
            }
            None => false,
        }
    }

    /// Re-run a history entry: query its text and select its provider when
    /// that provider has results.
    pub fn jump_to_history(&mut self, line: &str) {
        let Some((name, text)) = History::split_entry(line) else {
            self.set_input(line);
            return;
        };
        self.set_input(text);
        if let Some(id) = self.registry.find(name) {
            if self.view.contains(id) && self.current != Some(id) {
                self.current = Some(id);
                self.pinned = true;
                self.selected = None;
                self.page_start = 0;
            }
        }
    }
}
