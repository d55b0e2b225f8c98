//! Parsing of the `KEY=VALUE:KEY=VALUE` option string attached to a provider
//! declaration. A colon inside a value is written as `\:`.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// `sh -c <entry>` with stdin/stdout piped.
    #[default]
    Exec,
    /// A unix-domain stream socket at `<entry>`.
    UnixSocket,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOptions {
    pub kind: BackendKind,
    pub priority: i32,
    pub history: bool,
    pub asynchronous: bool,
    pub retry_command: Option<String>,
    pub retry_delay: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            priority: 0,
            history: false,
            asynchronous: false,
            retry_command: None,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown backend type '{0}', expected EXEC or UNIXSOCK")]
    UnknownType(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl ProviderOptions {
    /// Parse an option string. When a key repeats, the first occurrence wins.
    pub fn parse(opt: &str) -> Result<Self, OptionsError> {
        let mut options = Self::default();
        let mut seen: Vec<String> = Vec::new();

        for field in split_fields(opt) {
            if field.is_empty() {
                continue;
            }
            let Some((key, value)) = field.split_once('=') else {
                tracing::warn!(field = %field, "ignoring provider option without a value");
                continue;
            };
            if seen.iter().any(|k| k == key) {
                continue;
            }
            seen.push(key.to_string());

            match key {
                "TYPE" => {
                    options.kind = match value {
                        "EXEC" => BackendKind::Exec,
                        "UNIXSOCK" => BackendKind::UnixSocket,
                        other => return Err(OptionsError::UnknownType(other.to_string())),
                    }
                }
                "PRIORITY" => {
                    options.priority =
                        value
                            .trim()
                            .parse()
                            .map_err(|_| OptionsError::InvalidValue {
                                key: "PRIORITY",
                                value: value.to_string(),
                            })?
                }
                "HIST" => options.history = parse_bool("HIST", value)?,
                "ASYNC" => options.asynchronous = parse_bool("ASYNC", value)?,
                "RETRY_CMD" => {
                    options.retry_command = (!value.is_empty()).then(|| value.to_string())
                }
                "RETRY_DELAY" => {
                    let seconds: u64 =
                        value
                            .trim()
                            .parse()
                            .map_err(|_| OptionsError::InvalidValue {
                                key: "RETRY_DELAY",
                                value: value.to_string(),
                            })?;
                    options.retry_delay = Duration::from_secs(seconds);
                }
                other => tracing::warn!(key = %other, "ignoring unknown provider option"),
            }
        }

        Ok(options)
    }
}

/// Split on unescaped colons, turning `\:` into `:` inside each field.
fn split_fields(opt: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = opt.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&':') => {
                current.push(':');
                chars.next();
            }
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, OptionsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(OptionsError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}
