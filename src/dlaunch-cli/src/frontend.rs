//! A line-oriented front-end: text lines set the input, `!` lines are keys.

use dlaunch_core::ActivationMode;
use dlaunch_runtime::{Activation, Launcher};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrontendError {
    #[error("unknown command '!{0}'")]
    UnknownCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    NextProvider,
    Down,
    Up,
    PageDown,
    PageUp,
    Complete,
    Open,
    OpenAlternate,
    HistoryPrevious,
    HistoryNext,
    Summary,
    Hide,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Key(Key),
}

pub fn parse_line(line: &str) -> Result<Input, FrontendError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let Some(command) = line.strip_prefix('!') else {
        return Ok(Input::Text(line.to_string()));
    };
    if command.starts_with('!') {
        return Ok(Input::Text(command.to_string()));
    }
    let key = match command.trim() {
        "next" => Key::NextProvider,
        "down" => Key::Down,
        "up" => Key::Up,
        "pgdn" => Key::PageDown,
        "pgup" => Key::PageUp,
        "tab" => Key::Complete,
        "open" => Key::Open,
        "alt" => Key::OpenAlternate,
        "hist-prev" => Key::HistoryPrevious,
        "hist-next" => Key::HistoryNext,
        "summary" => Key::Summary,
        "hide" => Key::Hide,
        "quit" => Key::Quit,
        other => return Err(FrontendError::UnknownCommand(other.to_string())),
    };
    Ok(Input::Key(key))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Activated(Activation),
    /// Print the cross-provider overview instead of the usual page.
    Summary,
    Hidden,
    Quit,
}

pub fn apply(launcher: &mut Launcher, input: Input) -> Outcome {
    let key = match input {
        Input::Text(text) => {
            launcher.set_input(&text);
            return Outcome::Continue;
        }
        Input::Key(key) => key,
    };
    match key {
        Key::NextProvider => launcher.cycle_provider(),
        Key::Down => launcher.select_next(),
        Key::Up => launcher.select_previous(),
        Key::PageDown => launcher.next_page(),
        Key::PageUp => launcher.previous_page(),
        Key::Complete => {
            launcher.complete();
        }
        Key::Open | Key::OpenAlternate => {
            let mode = if key == Key::Open {
                ActivationMode::Normal
            } else {
                ActivationMode::Alternate
            };
            return match launcher.activate(mode) {
                Some(activation) => Outcome::Activated(activation),
                None => Outcome::Continue,
            };
        }
        Key::HistoryPrevious => {
            launcher.history_previous();
        }
        Key::HistoryNext => {
            launcher.history_next();
        }
        Key::Summary => return Outcome::Summary,
        Key::Hide => {
            launcher.hide();
            return Outcome::Hidden;
        }
        Key::Quit => return Outcome::Quit,
    }
    Outcome::Continue
}

/// Print the provider prompt, the input and the current page.
pub fn render(launcher: &Launcher, out: &mut impl Write) -> io::Result<()> {
    let current = launcher.current_provider();
    let names: Vec<String> = launcher
        .view()
        .enabled()
        .iter()
        .map(|provider| {
            if Some(provider.id) == current {
                format!("[{}]", provider.name)
            } else {
                provider.name.clone()
            }
        })
        .collect();
    writeln!(out, "providers: {}", names.join(" "))?;
    writeln!(out, "> {}", launcher.input())?;
    for row in launcher.rows() {
        let marker = if row.selected { '*' } else { ' ' };
        writeln!(out, "{marker} {}", row.description)?;
    }
    out.flush()
}

/// First item of every provider with results, highest priority first.
pub fn render_summary(launcher: &Launcher, out: &mut impl Write) -> io::Result<()> {
    let registry = launcher.registry();
    writeln!(out, "> {}", launcher.input())?;
    for id in launcher.view().summary() {
        let (Some(entry), Ok(description)) = (registry.get(id), registry.description(id, 0))
        else {
            continue;
        };
        writeln!(out, "{}: {}", entry.name(), description)?;
    }
    out.flush()
}

/// Splits raw reads from a descriptor into lines.
#[derive(Debug)]
pub struct LineInput<R> {
    reader: R,
    partial: Vec<u8>,
    closed: bool,
}

impl<R: Read> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// One read, to be called once the descriptor polled readable. A final
    /// unterminated line is returned at end of input.
    pub fn read_lines(&mut self) -> io::Result<Vec<String>> {
        let mut buf = [0u8; 4096];
        let n = match self.reader.read(&mut buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        if n == 0 {
            self.closed = true;
            if self.partial.is_empty() {
                return Ok(Vec::new());
            }
            let rest = std::mem::take(&mut self.partial);
            return Ok(vec![String::from_utf8_lossy(&rest).into_owned()]);
        }

        self.partial.extend_from_slice(&buf[..n]);
        let mut lines = Vec::new();
        while let Some(end) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=end).collect();
            lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
        }
        Ok(lines)
    }
}

impl<R: AsFd> AsFd for LineInput<R> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::launcher;
    use std::os::unix::net::UnixStream;

    #[test]
    fn parses_text_and_keys() {
        assert_eq!(parse_line("firefox\n"), Ok(Input::Text("firefox".into())));
        assert_eq!(parse_line("!down"), Ok(Input::Key(Key::Down)));
        assert_eq!(parse_line("!hist-prev\r\n"), Ok(Input::Key(Key::HistoryPrevious)));
        assert_eq!(parse_line("!!bang"), Ok(Input::Text("!bang".into())));
        assert_eq!(parse_line(""), Ok(Input::Text(String::new())));
        assert_eq!(
            parse_line("!launch"),
            Err(FrontendError::UnknownCommand("launch".into()))
        );
    }

    #[test]
    fn keys_drive_the_launcher() {
        let mut launcher = launcher();
        launcher.show();
        assert_eq!(apply(&mut launcher, Input::Text("ls".into())), Outcome::Continue);
        apply(&mut launcher, Input::Key(Key::Down));
        apply(&mut launcher, Input::Key(Key::Down));
        assert_eq!(launcher.selected(), Some(1));

        match apply(&mut launcher, Input::Key(Key::OpenAlternate)) {
            Outcome::Activated(activation) => {
                assert_eq!(activation.text, "lsblk");
                assert_eq!(activation.mode, ActivationMode::Alternate);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(!launcher.is_visible());
        assert_eq!(apply(&mut launcher, Input::Key(Key::Quit)), Outcome::Quit);
    }

    #[test]
    fn render_marks_current_provider_and_selection() {
        let mut launcher = launcher();
        launcher.show();
        launcher.set_input("ls");
        launcher.select_next();

        let mut out = Vec::new();
        render(&launcher, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "providers: [cmd] hosts\n> ls\n* ls\n  lsblk\n");
    }

    #[test]
    fn summary_lists_each_provider_by_priority() {
        let mut launcher = launcher();
        launcher.show();
        launcher.set_input("ls");
        assert_eq!(parse_line("!summary"), Ok(Input::Key(Key::Summary)));
        assert_eq!(
            apply(&mut launcher, Input::Key(Key::Summary)),
            Outcome::Summary
        );

        let mut out = Vec::new();
        render_summary(&launcher, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "> ls\ncmd: ls\nhosts: ls.example.org\n"
        );
    }

    #[test]
    fn line_input_reassembles_split_lines() {
        let (reader, mut writer) = UnixStream::pair().unwrap();
        let mut input = LineInput::new(reader);

        writer.write_all(b"fire").unwrap();
        assert!(input.read_lines().unwrap().is_empty());
        writer.write_all(b"fox\n!open\nta").unwrap();
        assert_eq!(input.read_lines().unwrap(), vec!["firefox", "!open"]);
        writer.write_all(b"il").unwrap();
        drop(writer);
        assert!(input.read_lines().unwrap().is_empty());
        assert_eq!(input.read_lines().unwrap(), vec!["tail"]);
        assert!(input.is_closed());
    }
}
