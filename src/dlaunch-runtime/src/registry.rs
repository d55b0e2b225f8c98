//! The ordered set of registered providers.

use dlaunch_core::{
    ActivationMode, PollSet, Provider, ProviderError, ProviderId, ProviderResult, FIELD_SEPARATOR,
};
use thiserror::Error;

/// Characters a provider name may not contain.
const RESERVED: [char; 2] = [FIELD_SEPARATOR, ','];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider name must not be empty")]
    EmptyName,
    #[error("provider name '{name}' contains reserved character '{reserved}'")]
    ReservedCharacter { name: String, reserved: char },
    #[error("a provider named '{name}' is already registered")]
    DuplicateName { name: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// A registered provider and the item count it last reported.
pub struct Entry {
    id: ProviderId,
    provider: Box<dyn Provider>,
    item_count: usize,
    /// Whether the current query was sent to this provider.
    routed: bool,
}

impl Entry {
    pub fn id(&self) -> ProviderId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn priority(&self) -> i32 {
        self.provider.priority()
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }
}

/// How a query text was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRoute {
    /// Sent unchanged to every provider.
    All,
    /// `prefix:text` matched the names of `providers`, which received `text`.
    Filtered {
        prefix: String,
        text: String,
        providers: Vec<ProviderId>,
    },
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `provider` and assign it the next identifier.
    pub fn register(&mut self, provider: Box<dyn Provider>) -> Result<ProviderId, RegistryError> {
        let name = provider.name();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if let Some(reserved) = name.chars().find(|c| RESERVED.contains(c)) {
            return Err(RegistryError::ReservedCharacter {
                name: name.to_string(),
                reserved,
            });
        }
        if self.find(name).is_some() {
            return Err(RegistryError::DuplicateName {
                name: name.to_string(),
            });
        }

        let id = ProviderId::new(self.entries.len());
        tracing::debug!(provider = %name, %id, priority = provider.priority(), "registered provider");
        self.entries.push(Entry {
            id,
            provider,
            item_count: 0,
            routed: true,
        });
        Ok(id)
    }

    pub fn init_all(&mut self) {
        for entry in &mut self.entries {
            entry.provider.init();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, id: ProviderId) -> Option<&Entry> {
        self.entries.get(id.index())
    }

    fn entry_mut(&mut self, id: ProviderId) -> Result<&mut Entry, ProviderError> {
        self.entries
            .get_mut(id.index())
            .ok_or(ProviderError::UnknownProvider(id))
    }

    pub fn find(&self, name: &str) -> Option<ProviderId> {
        self.entries
            .iter()
            .find(|entry| entry.name() == name)
            .map(Entry::id)
    }

    /// Split `prefix:text` when `prefix` starts the name of at least one
    /// provider.
    pub fn route(&self, input: &str) -> QueryRoute {
        if let Some((prefix, text)) = input.split_once(FIELD_SEPARATOR) {
            let providers: Vec<ProviderId> = self
                .entries
                .iter()
                .filter(|entry| entry.name().starts_with(prefix))
                .map(Entry::id)
                .collect();
            if !providers.is_empty() {
                return QueryRoute::Filtered {
                    prefix: prefix.to_string(),
                    text: text.to_string(),
                    providers,
                };
            }
        }
        QueryRoute::All
    }

    /// Fan `input` out to the routed providers in registration order.
    pub fn query(&mut self, input: &str) -> QueryRoute {
        let route = self.route(input);
        for entry in &mut self.entries {
            let text = match &route {
                QueryRoute::All => Some(input),
                QueryRoute::Filtered {
                    text, providers, ..
                } => providers.contains(&entry.id).then_some(text.as_str()),
            };
            entry.routed = text.is_some();
            entry.item_count = match text {
                Some(text) => entry.provider.query(text),
                None => 0,
            };
        }
        tracing::debug!(query = %input, ?route, "query dispatched");
        route
    }

    /// Collect the descriptors every provider wants to wait on.
    pub fn collect_watches<'a>(&'a self, set: &mut PollSet<'a>) {
        for entry in &self.entries {
            entry.provider.before_update(&mut set.registrar(entry.id));
        }
    }

    /// Whether any provider is still waiting on its backend.
    pub fn has_pending(&self) -> bool {
        let mut set = PollSet::new();
        self.collect_watches(&mut set);
        !set.is_empty()
    }

    /// Let a provider consume its ready descriptor. Returns whether its item
    /// count changed.
    pub fn update(&mut self, id: ProviderId) -> Result<bool, RegistryError> {
        let entry = self.entry_mut(id)?;
        let count = entry.provider.update();
        let count = if entry.routed { count } else { 0 };
        let changed = count != entry.item_count;
        entry.item_count = count;
        Ok(changed)
    }

    pub fn housekeeping(&mut self) {
        for entry in &mut self.entries {
            entry.provider.housekeeping();
        }
    }

    pub fn item_count(&self, id: ProviderId) -> usize {
        self.get(id).map_or(0, Entry::item_count)
    }

    pub fn description(&self, id: ProviderId, index: usize) -> ProviderResult<&str> {
        let entry = self.get(id).ok_or(ProviderError::UnknownProvider(id))?;
        checked(entry, index)?;
        entry.provider.description(index)
    }

    pub fn action_text(&self, id: ProviderId, index: usize) -> ProviderResult<&str> {
        let entry = self.get(id).ok_or(ProviderError::UnknownProvider(id))?;
        checked(entry, index)?;
        entry.provider.action_text(index)
    }

    /// Hand an activation to the provider. `index` outside its items means
    /// `fallback` is sent instead.
    pub fn open(
        &mut self,
        id: ProviderId,
        index: Option<usize>,
        fallback: &str,
        mode: ActivationMode,
    ) -> Result<bool, RegistryError> {
        let entry = self.entry_mut(id)?;
        let index = index.filter(|&i| i < entry.item_count);
        Ok(entry.provider.open(index, fallback, mode))
    }
}

/// Reject indices beyond the count the registry last saw, even if the
/// provider has since grown.
fn checked(entry: &Entry, index: usize) -> ProviderResult<()> {
    if index < entry.item_count {
        Ok(())
    } else {
        Err(ProviderError::IndexOutOfRange {
            index,
            count: entry.item_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticProvider;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(Box::new(StaticProvider::new("cmd", 0, &["ls", "lsblk"])))
            .unwrap();
        registry
            .register(Box::new(StaticProvider::new("ssh", 0, &["ssh host"])))
            .unwrap();
        registry
            .register(Box::new(StaticProvider::new("sshfs", 0, &["sshfs host"])))
            .unwrap();
        registry
    }

    #[test]
    fn ids_are_dense_in_registration_order() {
        let registry = registry();
        let ids: Vec<usize> = registry.entries().iter().map(|e| e.id().index()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(registry.find("ssh"), Some(ProviderId::new(1)));
        assert_eq!(registry.find("nope"), None);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register(Box::new(StaticProvider::new("", 0, &[]))),
            Err(RegistryError::EmptyName)
        );
        assert_eq!(
            registry.register(Box::new(StaticProvider::new("a:b", 0, &[]))),
            Err(RegistryError::ReservedCharacter {
                name: "a:b".into(),
                reserved: ':'
            })
        );
        assert!(matches!(
            registry.register(Box::new(StaticProvider::new("a,b", 0, &[]))),
            Err(RegistryError::ReservedCharacter { reserved: ',', .. })
        ));
        assert_eq!(
            registry.register(Box::new(StaticProvider::new("cmd", 3, &[]))),
            Err(RegistryError::DuplicateName { name: "cmd".into() })
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn query_reaches_every_provider() {
        let mut registry = registry();
        assert_eq!(registry.query("ls"), QueryRoute::All);
        assert_eq!(registry.item_count(ProviderId::new(0)), 2);
        assert_eq!(registry.item_count(ProviderId::new(1)), 0);
    }

    #[test]
    fn name_prefix_routes_query() {
        let mut registry = registry();
        let route = registry.query("ssh:ssh");
        assert_eq!(
            route,
            QueryRoute::Filtered {
                prefix: "ssh".into(),
                text: "ssh".into(),
                providers: vec![ProviderId::new(1), ProviderId::new(2)],
            }
        );
        assert_eq!(registry.item_count(ProviderId::new(0)), 0);
        assert_eq!(registry.item_count(ProviderId::new(1)), 1);
        assert_eq!(registry.item_count(ProviderId::new(2)), 1);
    }

    #[test]
    fn unmatched_prefix_is_plain_text() {
        let mut registry = registry();
        assert_eq!(registry.query("http://host"), QueryRoute::All);
    }

    #[test]
    fn accessors_check_bounds() {
        let mut registry = registry();
        registry.query("ls");
        let cmd = ProviderId::new(0);
        assert_eq!(registry.description(cmd, 1), Ok("lsblk"));
        assert_eq!(registry.action_text(cmd, 0), Ok("ls"));
        assert_eq!(
            registry.description(cmd, 2),
            Err(ProviderError::IndexOutOfRange { index: 2, count: 2 })
        );
        assert_eq!(
            registry.description(ProviderId::new(9), 0),
            Err(ProviderError::UnknownProvider(ProviderId::new(9)))
        );
        assert!(registry.update(ProviderId::new(9)).is_err());
    }

    #[test]
    fn open_falls_back_outside_range() {
        let provider = StaticProvider::new("cmd", 0, &["ls", "lsblk"]);
        let opened = provider.opened();
        let mut registry = Registry::new();
        let cmd = registry.register(Box::new(provider)).unwrap();
        registry.query("ls");

        assert_eq!(registry.open(cmd, Some(7), "typed", ActivationMode::Normal), Ok(true));
        assert_eq!(registry.open(cmd, Some(1), "typed", ActivationMode::Alternate), Ok(true));
        assert_eq!(*opened.borrow(), vec!["typed", "alt lsblk"]);
    }
}
