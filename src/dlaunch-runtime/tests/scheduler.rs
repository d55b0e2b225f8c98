#![cfg(unix)]

use dlaunch_core::{
    ActivationMode, Interest, Provider, ProviderError, ProviderId, ProviderResult, Registrar,
};
use dlaunch_plugin::ExternalProvider;
use dlaunch_runtime::{Launcher, Layout, Registry, Scheduler, View};
use std::cell::Cell;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Publishes one item per line received on its socket.
struct LineProvider {
    name: &'static str,
    priority: i32,
    stream: UnixStream,
    partial: String,
    lines: Vec<String>,
    housekeeping: Rc<Cell<usize>>,
}

impl LineProvider {
    fn new(name: &'static str, priority: i32) -> (Self, UnixStream) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        let provider = Self {
            name,
            priority,
            stream: ours,
            partial: String::new(),
            lines: Vec::new(),
            housekeeping: Rc::default(),
        };
        (provider, theirs)
    }

    fn line(&self, index: usize) -> ProviderResult<&str> {
        self.lines
            .get(index)
            .map(String::as_str)
            .ok_or(ProviderError::IndexOutOfRange {
                index,
                count: self.lines.len(),
            })
    }
}

impl Provider for LineProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn query(&mut self, _input: &str) -> usize {
        self.lines.len()
    }

    fn before_update<'a>(&'a self, registrar: &mut Registrar<'_, 'a>) {
        registrar.register(self.stream.as_fd(), Interest::READ | Interest::STATUS);
    }

    fn update(&mut self) -> usize {
        let mut buf = [0u8; 256];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => self.partial.push_str(&String::from_utf8_lossy(&buf[..n])),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => panic!("read failed: {err}"),
            }
        }
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            self.lines.push(line.trim_end().to_string());
        }
        self.lines.len()
    }

    fn item_count(&self) -> usize {
        self.lines.len()
    }

    fn description(&self, index: usize) -> ProviderResult<&str> {
        self.line(index)
    }

    fn action_text(&self, index: usize) -> ProviderResult<&str> {
        self.line(index)
    }

    fn open(&mut self, _index: Option<usize>, _fallback: &str, _mode: ActivationMode) -> bool {
        true
    }

    fn housekeeping(&mut self) {
        self.housekeeping.set(self.housekeeping.get() + 1);
    }
}

fn scheduler() -> Scheduler {
    Scheduler::new(Duration::from_millis(20))
}

#[test]
fn ready_descriptor_is_drained_by_its_owner() {
    let (quiet, _quiet_peer) = LineProvider::new("quiet", 0);
    let (busy, mut busy_peer) = LineProvider::new("busy", 0);
    let ticks = Rc::clone(&busy.housekeeping);

    let mut registry = Registry::new();
    let quiet_id = registry.register(Box::new(quiet)).unwrap();
    let busy_id = registry.register(Box::new(busy)).unwrap();
    registry.query("");

    let outcome = scheduler().tick(&mut registry, &[]).unwrap();
    assert!(!outcome.has_changes());
    assert_eq!(ticks.get(), 1);

    busy_peer.write_all(b"first\nsecond\n").unwrap();
    let outcome = scheduler().tick(&mut registry, &[]).unwrap();
    assert_eq!(outcome.changed, vec![busy_id]);
    assert_eq!(registry.item_count(busy_id), 2);
    assert_eq!(registry.item_count(quiet_id), 0);
    assert_eq!(registry.description(busy_id, 1), Ok("second"));
    assert_eq!(ticks.get(), 2);
}

#[test]
fn external_sources_are_reported_by_index() {
    let mut registry = Registry::new();
    let (idle_a, _idle_b) = UnixStream::pair().unwrap();
    let (ready_a, mut ready_b) = UnixStream::pair().unwrap();
    ready_b.write_all(b"show\n").unwrap();

    let outcome = scheduler()
        .tick(&mut registry, &[idle_a.as_fd(), ready_a.as_fd()])
        .unwrap();
    assert_eq!(outcome.external, vec![1]);
    assert!(outcome.changed.is_empty());
}

#[test]
fn equal_priority_prefers_earlier_registration() {
    let (b, mut b_peer) = LineProvider::new("b", 5);
    let (filler, _filler_peer) = LineProvider::new("filler", 0);
    let (a, mut a_peer) = LineProvider::new("a", 5);

    let mut registry = Registry::new();
    let b_id = registry.register(Box::new(b)).unwrap();
    registry.register(Box::new(filler)).unwrap();
    let a_id = registry.register(Box::new(a)).unwrap();
    assert_eq!((b_id, a_id), (ProviderId::new(0), ProviderId::new(2)));

    a_peer.write_all(b"from a\n").unwrap();
    b_peer.write_all(b"from b\n").unwrap();
    let outcome = scheduler().tick(&mut registry, &[]).unwrap();
    assert_eq!(outcome.changed, vec![b_id, a_id]);

    let view = View::build(&registry);
    assert_eq!(view.default_provider(), Some(b_id));
}

#[test]
fn asynchronous_provider_completes_through_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("backend.sh");
    std::fs::write(
        &script,
        r#"while IFS= read -r line; do
  case "$line" in
    q) printf 'c\0' ;;
    q*) printf 'c'; sleep 0.2; printf 'open %s\n%s\n\0' "${line#q}" "${line#q}" ;;
  esac
done
"#,
    )
    .unwrap();

    let slow = ExternalProvider::from_declaration(
        "slow",
        format!("sh '{}'", script.display()),
        "ASYNC=1:PRIORITY=2",
    )
    .unwrap();
    let missing = ExternalProvider::from_declaration(
        "missing",
        dir.path().join("absent.sock").to_string_lossy(),
        "TYPE=UNIXSOCK:PRIORITY=9",
    )
    .unwrap();

    let mut registry = Registry::new();
    let slow_id = registry.register(Box::new(slow)).unwrap();
    registry.register(Box::new(missing)).unwrap();
    let mut launcher = Launcher::new(registry, None, Layout::Vertical { lines: 5 });
    launcher.show();
    launcher.set_input("firefox");
    assert_eq!(launcher.current_provider(), None);
    assert!(launcher.registry().has_pending());

    let start = Instant::now();
    while launcher.current_provider().is_none() && start.elapsed() < Duration::from_secs(10) {
        let outcome = scheduler().tick(launcher.registry_mut(), &[]).unwrap();
        if outcome.has_changes() {
            launcher.refresh();
        }
    }

    assert_eq!(launcher.current_provider(), Some(slow_id));
    assert!(!launcher.registry().has_pending());
    let rows = launcher.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].description, "open firefox");
}
