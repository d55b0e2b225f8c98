pub mod config;
pub mod history;
pub mod logging;
pub mod paths;
pub mod provider;

pub use config::{
    Config, ConfigError, DisplayConfig, HistoryConfig, LogLevel, LoggingConfig, ProviderEntry,
    SchedulerConfig, ValidationError,
};
pub use history::{History, HistoryError};
pub use logging::{init_logging, LogMode, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};
pub use provider::{
    ActivationMode, Interest, PollSet, Provider, ProviderError, ProviderId, ProviderResult,
    Registrar, Watch, FIELD_SEPARATOR,
};

pub const APP_NAME: &str = "dlaunch";
pub const APP_AUTHOR: &str = "dlaunch";
pub const APP_QUALIFIER: &str = "org";
