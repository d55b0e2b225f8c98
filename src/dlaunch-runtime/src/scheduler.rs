//! The readiness loop tick.

use crate::registry::Registry;
use dlaunch_core::{Interest, PollSet, ProviderId};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::os::fd::BorrowedFd;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("waiting for descriptors failed: {0}")]
    Poll(#[source] Errno),
}

/// What one tick observed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Providers whose item count changed after draining.
    pub changed: Vec<ProviderId>,
    /// Indices into the external sources that became ready.
    pub external: Vec<usize>,
}

impl TickOutcome {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    timeout: Duration,
}

impl Scheduler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait once on every provider descriptor plus `external`, drain ready
    /// providers and run housekeeping.
    pub fn tick(
        &self,
        registry: &mut Registry,
        external: &[BorrowedFd<'_>],
    ) -> Result<TickOutcome, SchedulerError> {
        let (ready, external_ready) = self.wait(registry, external)?;

        let mut changed = Vec::new();
        for id in ready {
            match registry.update(id) {
                Ok(true) => changed.push(id),
                Ok(false) => {}
                Err(err) => tracing::warn!(provider = %id, error = %err, "failed to update provider"),
            }
        }
        registry.housekeeping();

        if !changed.is_empty() {
            tracing::trace!(?changed, "provider results changed");
        }
        Ok(TickOutcome {
            changed,
            external: external_ready,
        })
    }

    fn wait(
        &self,
        registry: &Registry,
        external: &[BorrowedFd<'_>],
    ) -> Result<(Vec<ProviderId>, Vec<usize>), SchedulerError> {
        let mut set = PollSet::new();
        registry.collect_watches(&mut set);

        let mut fds: Vec<PollFd<'_>> = set
            .watches()
            .iter()
            .map(|watch| PollFd::new(watch.fd, poll_flags(watch.interest)))
            .collect();
        fds.extend(external.iter().map(|fd| PollFd::new(*fd, PollFlags::POLLIN)));

        match poll(&mut fds, poll_timeout(self.timeout)) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok((Vec::new(), Vec::new())),
            Err(err) => return Err(SchedulerError::Poll(err)),
        }

        let mut owners = Vec::new();
        let mut external_ready = Vec::new();
        for (index, fd) in fds.iter().enumerate() {
            let ready = fd.revents().is_some_and(|revents| !revents.is_empty());
            if !ready {
                continue;
            }
            match set.watches().get(index) {
                Some(watch) => {
                    if !owners.contains(&watch.owner) {
                        owners.push(watch.owner);
                    }
                }
                None => external_ready.push(index - set.len()),
            }
        }
        owners.sort();
        Ok((owners, external_ready))
    }
}

fn poll_flags(interest: Interest) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.contains(Interest::READ) {
        flags |= PollFlags::POLLIN;
    }
    if interest.contains(Interest::WRITE) {
        flags |= PollFlags::POLLOUT;
    }
    if interest.contains(Interest::STATUS) {
        flags |= PollFlags::POLLPRI;
    }
    flags
}

fn poll_timeout(timeout: Duration) -> PollTimeout {
    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    PollTimeout::from(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_maps_to_poll_flags() {
        assert_eq!(poll_flags(Interest::READ), PollFlags::POLLIN);
        assert_eq!(
            poll_flags(Interest::READ | Interest::WRITE | Interest::STATUS),
            PollFlags::POLLIN | PollFlags::POLLOUT | PollFlags::POLLPRI
        );
        assert_eq!(poll_flags(Interest::empty()), PollFlags::empty());
    }

    #[test]
    fn long_timeouts_are_clamped() {
        assert_eq!(
            poll_timeout(Duration::from_secs(3600)),
            PollTimeout::from(u16::MAX)
        );
        assert_eq!(
            poll_timeout(Duration::from_millis(250)),
            PollTimeout::from(250u16)
        );
    }

    #[test]
    fn idle_tick_times_out_with_nothing_ready() {
        let mut registry = Registry::new();
        let scheduler = Scheduler::new(Duration::from_millis(10));
        let outcome = scheduler.tick(&mut registry, &[]).unwrap();
        assert_eq!(outcome, TickOutcome::default());
        assert!(!outcome.has_changes());
    }
}
