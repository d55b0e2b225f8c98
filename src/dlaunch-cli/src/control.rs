//! The control socket through which `dlaunch show|hide|quit` reach the
//! resident process.

use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("dlaunch is already running (control socket {path} is live)")]
    AlreadyRunning { path: PathBuf },
    #[error("failed to remove stale control socket {path}: {source}")]
    RemoveStale { path: PathBuf, source: io::Error },
    #[error("failed to bind control socket {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },
    #[error("failed to reach dlaunch at {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },
    #[error("failed to send control command: {0}")]
    Send(#[source] io::Error),
    #[error("failed to accept control connection: {0}")]
    Accept(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Show,
    Hide,
    Quit,
}

impl ControlCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlCommand::Show => "show",
            ControlCommand::Hide => "hide",
            ControlCommand::Quit => "quit",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "show" => Ok(ControlCommand::Show),
            "hide" => Ok(ControlCommand::Hide),
            "quit" => Ok(ControlCommand::Quit),
            other => Err(other.to_string()),
        }
    }
}

/// Listening end, owned by the resident process. The socket file is removed
/// on drop.
#[derive(Debug)]
pub struct ControlSocket {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlSocket {
    pub fn bind(path: &Path) -> Result<Self, ControlError> {
        if path.exists() {
            if UnixStream::connect(path).is_ok() {
                return Err(ControlError::AlreadyRunning {
                    path: path.to_path_buf(),
                });
            }
            std::fs::remove_file(path).map_err(|source| ControlError::RemoveStale {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "removed stale control socket");
        }

        let bind_err = |source| ControlError::Bind {
            path: path.to_path_buf(),
            source,
        };
        let listener = UnixListener::bind(path).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        tracing::info!(path = %path.display(), "listening for control commands");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept every pending connection and read one command from each.
    pub fn accept_commands(&self) -> Result<Vec<ControlCommand>, ControlError> {
        let mut commands = Vec::new();
        loop {
            let stream = match self.listener.accept() {
                Ok((stream, _)) => stream,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ControlError::Accept(err)),
            };
            match read_command(stream) {
                Ok(Some(command)) => commands.push(command),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "failed to read control command"),
            }
        }
        Ok(commands)
    }
}

impl AsFd for ControlSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_command(stream: UnixStream) -> io::Result<Option<ControlCommand>> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line)?;
    match line.parse() {
        Ok(command) => Ok(Some(command)),
        Err(unknown) => {
            tracing::warn!(command = %unknown, "ignoring unknown control command");
            Ok(None)
        }
    }
}

/// Deliver `command` to the resident process listening at `path`.
pub fn send(path: &Path, command: ControlCommand) -> Result<(), ControlError> {
    let mut stream = UnixStream::connect(path).map_err(|source| ControlError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    writeln!(stream, "{command}").map_err(ControlError::Send)?;
    stream.flush().map_err(ControlError::Send)
}
