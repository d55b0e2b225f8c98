//! Provider registry, readiness scheduler and result aggregation.
//!
//! A [`Launcher`] owns the [`Registry`] and the selection state; the
//! composition root drives it with [`Scheduler::tick`] and redraws when a
//! tick reports changed providers.

pub mod launcher;
pub mod registry;
pub mod scheduler;
pub mod view;

#[cfg(test)]
mod testing;

pub use launcher::{Activation, Launcher, Layout, Row};
pub use registry::{Entry, QueryRoute, Registry, RegistryError};
pub use scheduler::{Scheduler, SchedulerError, TickOutcome};
pub use view::{default_provider, paginate, EnabledProvider, Page, View};
