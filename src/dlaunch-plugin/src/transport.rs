//! Duplex byte channel to a provider backend.

use crate::options::BackendKind;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to spawn `sh -c {command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("spawned process has no {0}")]
    MissingPipe(&'static str),
    #[error("failed to connect to {path}: {source}")]
    Connect { path: PathBuf, source: io::Error },
    #[error("transport is not connected")]
    NotConnected,
    #[error("failed to read from backend: {0}")]
    Read(io::Error),
    #[error("failed to write to backend: {0}")]
    Write(io::Error),
    #[error("failed to change blocking mode: {0}")]
    Mode(io::Error),
}

/// Where a provider's backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Run through `sh -c`, talking over the child's stdin and stdout.
    Exec { command: String },
    /// A server listening on a unix-domain stream socket.
    UnixSocket { path: PathBuf },
}

impl Backend {
    pub fn from_entry(kind: BackendKind, entry: impl Into<String>) -> Self {
        let entry = entry.into();
        match kind {
            BackendKind::Exec => Backend::Exec { command: entry },
            BackendKind::UnixSocket => Backend::UnixSocket {
                path: PathBuf::from(entry),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Exec { command } => format!("exec `{command}`"),
            Backend::UnixSocket { path } => format!("socket {}", path.display()),
        }
    }
}

/// Outcome of a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    /// Non-blocking mode and nothing buffered yet.
    WouldBlock,
    /// The peer closed its end.
    Closed,
}

enum Channel {
    Process {
        child: Child,
        stdin: ChildStdin,
        stdout: ChildStdout,
    },
    Socket(UnixStream),
}

pub struct Transport {
    backend: Backend,
    channel: Option<Channel>,
    nonblocking: bool,
}

impl Transport {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            channel: None,
            nonblocking: false,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Spawn or connect the backend. A no-op when already connected.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        if self.channel.is_some() {
            return Ok(());
        }

        let channel = match &self.backend {
            Backend::Exec { command } => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|source| TransportError::Spawn {
                        command: command.clone(),
                        source,
                    })?;
                match (child.stdin.take(), child.stdout.take()) {
                    (Some(stdin), Some(stdout)) => Channel::Process {
                        child,
                        stdin,
                        stdout,
                    },
                    (stdin, _) => {
                        let missing = if stdin.is_none() { "stdin" } else { "stdout" };
                        reap(&mut child);
                        return Err(TransportError::MissingPipe(missing));
                    }
                }
            }
            Backend::UnixSocket { path } => {
                let stream =
                    UnixStream::connect(path).map_err(|source| TransportError::Connect {
                        path: path.clone(),
                        source,
                    })?;
                Channel::Socket(stream)
            }
        };

        tracing::debug!(backend = %self.backend.describe(), "backend connected");
        self.channel = Some(channel);
        self.nonblocking = false;
        Ok(())
    }

    /// Switch the receive side between blocking and non-blocking reads.
    ///
    /// For a socket backend this also affects writes, so callers switch back
    /// to blocking before sending a frame.
    pub fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), TransportError> {
        let channel = self.channel.as_ref().ok_or(TransportError::NotConnected)?;
        if self.nonblocking == nonblocking {
            return Ok(());
        }
        match channel {
            Channel::Process { stdout, .. } => set_fd_nonblocking(stdout.as_fd(), nonblocking),
            Channel::Socket(stream) => stream.set_nonblocking(nonblocking),
        }
        .map_err(TransportError::Mode)?;
        self.nonblocking = nonblocking;
        Ok(())
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadStatus, TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;
        loop {
            let result = match channel {
                Channel::Process { stdout, .. } => stdout.read(buf),
                Channel::Socket(stream) => stream.read(buf),
            };
            return match result {
                Ok(0) if !buf.is_empty() => Ok(ReadStatus::Closed),
                Ok(n) => Ok(ReadStatus::Data(n)),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(ReadStatus::WouldBlock),
                Err(err) => Err(TransportError::Read(err)),
            };
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let channel = self.channel.as_mut().ok_or(TransportError::NotConnected)?;
        let result = match channel {
            Channel::Process { stdin, .. } => stdin.write_all(bytes).and_then(|_| stdin.flush()),
            Channel::Socket(stream) => stream.write_all(bytes).and_then(|_| stream.flush()),
        };
        result.map_err(TransportError::Write)
    }

    /// Descriptor that becomes readable when the backend sends data.
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        match self.channel.as_ref()? {
            Channel::Process { stdout, .. } => Some(stdout.as_fd()),
            Channel::Socket(stream) => Some(stream.as_fd()),
        }
    }

    /// Release the connection. Safe to call when already closed.
    pub fn close(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        self.nonblocking = false;
        match channel {
            Channel::Process {
                mut child,
                stdin,
                stdout,
            } => {
                drop(stdin);
                drop(stdout);
                reap(&mut child);
            }
            Channel::Socket(stream) => drop(stream),
        }
        tracing::debug!(backend = %self.backend.describe(), "backend disconnected");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn reap(child: &mut Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn set_fd_nonblocking(fd: BorrowedFd<'_>, nonblocking: bool) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    let flags = if nonblocking {
        flags | OFlag::O_NONBLOCK
    } else {
        flags - OFlag::O_NONBLOCK
    };
    fcntl(fd, FcntlArg::F_SETFL(flags))?;
    Ok(())
}
