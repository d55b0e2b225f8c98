use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Runs a provider's restart command, at most once per `delay`.
///
/// The window is measured from the previous attempt, whether or not that
/// attempt managed to spawn.
#[derive(Debug)]
pub struct RetryThrottle {
    command: Option<String>,
    delay: Duration,
    last: Option<Instant>,
    children: Vec<Child>,
    fired: usize,
}

impl RetryThrottle {
    pub fn new(command: Option<String>, delay: Duration) -> Self {
        Self {
            command,
            delay,
            last: None,
            children: Vec::new(),
            fired: 0,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.command.is_some()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Number of restart attempts made so far.
    pub fn fired(&self) -> usize {
        self.fired
    }

    /// Restart commands still running.
    pub fn running(&self) -> usize {
        self.children.len()
    }

    pub fn should_fire(&self, now: Instant) -> bool {
        if self.command.is_none() {
            return false;
        }
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.delay,
        }
    }

    /// Spawn the restart command if the window allows it. Returns whether an
    /// attempt was made.
    pub fn trigger(&mut self, now: Instant) -> bool {
        if !self.should_fire(now) {
            return false;
        }
        let Some(command) = self.command.as_deref() else {
            return false;
        };
        self.last = Some(now);
        self.fired += 1;

        match Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .spawn()
        {
            Ok(child) => {
                tracing::info!(command = %command, pid = child.id(), "spawned restart command");
                self.children.push(child);
            }
            Err(err) => {
                tracing::warn!(command = %command, error = %err, "failed to spawn restart command");
            }
        }
        true
    }

    /// Collect restart commands that have exited.
    pub fn reap(&mut self) {
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(pid = child.id(), %status, "restart command exited");
                false
            }
            Ok(None) => true,
            Err(err) => {
                tracing::warn!(pid = child.id(), error = %err, "failed to poll restart command");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_most_once_per_window() {
        let mut throttle = RetryThrottle::new(Some("true".into()), Duration::from_secs(3));
        let start = Instant::now();
        let mut fired_at = Vec::new();

        for step in 0..100u64 {
            let now = start + Duration::from_millis(step * 100);
            if throttle.trigger(now) {
                fired_at.push(now - start);
            }
        }

        assert_eq!(
            fired_at,
            vec![
                Duration::ZERO,
                Duration::from_millis(3100),
                Duration::from_millis(6200),
                Duration::from_millis(9300),
            ]
        );
        assert_eq!(throttle.fired(), 4);
        for pair in fired_at.windows(2) {
            assert!(pair[1] - pair[0] > Duration::from_secs(3));
        }
    }

    #[test]
    fn exactly_the_delay_is_not_enough() {
        let mut throttle = RetryThrottle::new(Some("true".into()), Duration::from_secs(3));
        let start = Instant::now();
        assert!(throttle.trigger(start));
        assert!(!throttle.should_fire(start + Duration::from_secs(3)));
        assert!(throttle.should_fire(start + Duration::from_millis(3001)));
    }

    #[test]
    fn without_command_nothing_fires() {
        let mut throttle = RetryThrottle::new(None, Duration::from_secs(3));
        assert!(!throttle.is_configured());
        assert!(!throttle.trigger(Instant::now()));
        assert_eq!(throttle.fired(), 0);
    }

    #[test]
    fn reap_collects_finished_children() {
        let mut throttle = RetryThrottle::new(Some("exit 0".into()), Duration::ZERO);
        let start = Instant::now();
        assert!(throttle.trigger(start));
        assert_eq!(throttle.running(), 1);

        let deadline = Instant::now() + Duration::from_secs(5);
        while throttle.running() > 0 && Instant::now() < deadline {
            throttle.reap();
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(throttle.running(), 0);
    }
}
