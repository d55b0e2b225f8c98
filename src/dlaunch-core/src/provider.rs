use std::fmt;
use std::os::fd::BorrowedFd;
use thiserror::Error;

/// Separates a provider name from the rest of a history line or a routed query.
///
/// Provider names may not contain it.
pub const FIELD_SEPARATOR: char = ':';

/// Dense, zero-based identifier assigned at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId(usize);

impl ProviderId {
    pub fn new(index: usize) -> Self {
        ProviderId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Readiness a provider wants to be woken up for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Interest: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        /// Error and hang-up conditions.
        const STATUS = 1 << 2;
    }
}

/// How an item is activated. `Alternate` corresponds to a modified submit
/// (shift+enter in a graphical front-end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationMode {
    #[default]
    Normal,
    Alternate,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("item index {index} out of range (provider has {count} items)")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("unknown provider {0}")]
    UnknownProvider(ProviderId),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One descriptor the scheduler should wait on for a provider.
#[derive(Debug)]
pub struct Watch<'a> {
    pub owner: ProviderId,
    pub fd: BorrowedFd<'a>,
    pub interest: Interest,
}

/// Descriptors collected from every provider for one loop tick.
///
/// The set borrows the providers, so it lives only until the wait returns.
#[derive(Debug, Default)]
pub struct PollSet<'a> {
    watches: Vec<Watch<'a>>,
}

impl<'a> PollSet<'a> {
    pub fn new() -> Self {
        Self {
            watches: Vec::new(),
        }
    }

    /// A registration handle scoped to one provider.
    pub fn registrar(&mut self, owner: ProviderId) -> Registrar<'_, 'a> {
        Registrar { set: self, owner }
    }

    pub fn watches(&self) -> &[Watch<'a>] {
        &self.watches
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

pub struct Registrar<'s, 'a> {
    set: &'s mut PollSet<'a>,
    owner: ProviderId,
}

impl<'s, 'a> Registrar<'s, 'a> {
    /// Ask for `update()` to be called once `fd` is ready for `interest`.
    pub fn register(&mut self, fd: BorrowedFd<'a>, interest: Interest) {
        if interest.is_empty() {
            return;
        }
        self.set.watches.push(Watch {
            owner: self.owner,
            fd,
            interest,
        });
    }

    pub fn owner(&self) -> ProviderId {
        self.owner
    }
}

/// A source of candidate items for the launcher.
///
/// Every call happens on the launcher's single event-loop thread. Providers
/// that talk to slow backends answer `query` with zero items, register a
/// descriptor in `before_update`, and publish results from `update`.
pub trait Provider {
    /// Display name, unique within a registry.
    fn name(&self) -> &str;

    /// Higher priorities win the default selection.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether activations should be written to the history file.
    fn records_history(&self) -> bool {
        false
    }

    /// Called once after registration.
    fn init(&mut self) {}

    /// Resolve `input` and return the number of items now available.
    fn query(&mut self, input: &str) -> usize;

    /// Register descriptors to wait on before the scheduler blocks.
    fn before_update<'a>(&'a self, _registrar: &mut Registrar<'_, 'a>) {}

    /// Called when a registered descriptor became ready.
    fn update(&mut self) -> usize {
        self.item_count()
    }

    fn item_count(&self) -> usize;

    fn description(&self, index: usize) -> ProviderResult<&str>;

    fn action_text(&self, index: usize) -> ProviderResult<&str>;

    /// Dispatch the item at `index`, or `fallback` when there is no such
    /// item. Returns whether the action was handed off.
    fn open(&mut self, index: Option<usize>, fallback: &str, mode: ActivationMode) -> bool;

    /// Periodic maintenance, run once per loop tick.
    fn housekeeping(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn registrar_tags_watches_with_owner() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut set = PollSet::new();
        set.registrar(ProviderId::new(3))
            .register(a.as_fd(), Interest::READ | Interest::STATUS);
        set.registrar(ProviderId::new(5)).register(b.as_fd(), Interest::empty());

        assert_eq!(set.len(), 1);
        let watch = &set.watches()[0];
        assert_eq!(watch.owner, ProviderId::new(3));
        assert!(watch.interest.contains(Interest::READ));
        assert!(!watch.interest.contains(Interest::WRITE));
    }

    #[test]
    fn out_of_range_error_mentions_count() {
        let err = ProviderError::IndexOutOfRange { index: 4, count: 2 };
        assert_eq!(
            err.to_string(),
            "item index 4 out of range (provider has 2 items)"
        );
    }
}
