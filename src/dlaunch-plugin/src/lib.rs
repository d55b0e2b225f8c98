//! External providers for the dlaunch launcher.
//!
//! This crate provides:
//! - The option string accepted when a provider is declared
//! - A transport to a provider backend, either `sh -c <entry>` over pipes or
//!   a unix-domain stream socket
//! - The framing of queries, replies, item batches and activations
//! - [`ExternalProvider`], a session implementing `dlaunch_core::Provider`
//!
//! # Wire protocol
//!
//! ```text
//! launcher -> backend   'q' <query text> '\n'
//! backend  -> launcher  'f'                          keep the last batch, filter locally
//!                       'c' (<description> '\n' <action> '\n')* '\0'
//! launcher -> backend   'o' <action text> '\n'       activate
//!                       'O' <action text> '\n'       alternate activation
//! ```
//!
//! # Example backend (pseudocode)
//!
//! ```text
//! while (line = read_stdin()):
//!     if line starts with 'q':
//!         write('c')
//!         for candidate in complete(line[1:]):
//!             write(candidate.label + "\n" + candidate.command + "\n")
//!         write('\0')
//!     elif line starts with 'o' or 'O':
//!         spawn(line[1:])
//! ```

mod items;
pub mod options;
pub mod protocol;
mod retry;
mod session;
mod transport;

pub use items::{Item, ItemSet};
pub use options::{BackendKind, OptionsError, ProviderOptions};
pub use protocol::{BatchParser, FramingError, Reply};
pub use retry::RetryThrottle;
pub use session::{ExternalProvider, SessionError, SessionState};
pub use transport::{Backend, ReadStatus, Transport, TransportError};
