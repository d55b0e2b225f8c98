use crate::{APP_AUTHOR, APP_NAME, APP_QUALIFIER};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
    log_dir: PathBuf,
    runtime_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self, DirsError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .ok_or(DirsError::MissingProjectDirs)?;
        let log_dir = dirs.data_dir().join("logs");
        // Not every platform has a runtime dir; the cache dir is private enough for a socket.
        let runtime_dir = dirs
            .runtime_dir()
            .unwrap_or_else(|| dirs.cache_dir())
            .to_path_buf();
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
            log_dir,
            runtime_dir,
        })
    }

    /// Lay every directory out under a single root. Used by tests and `--config`-style overrides.
    pub fn rooted(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            cache_dir: root.join("cache"),
            log_dir: root.join("data").join("logs"),
            runtime_dir: root.join("run"),
        }
    }

    pub fn ensure_exists(&self) -> Result<(), DirsError> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.cache_dir,
            &self.log_dir,
            &self.runtime_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|source| DirsError::CreateDirectory {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn control_socket(&self) -> PathBuf {
        self.runtime_dir.join("control.sock")
    }
}

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("unable to determine project directories for dlaunch")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_returns_dirs() {
        let dirs = AppDirs::discover().expect("should build dirs");
        assert!(dirs.config_dir().ends_with(APP_NAME));
        assert!(dirs.log_dir().ends_with("logs"));
    }

    #[test]
    fn rooted_dirs_are_created() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AppDirs::rooted(root.path());
        dirs.ensure_exists().unwrap();
        assert!(dirs.runtime_dir().is_dir());
        assert_eq!(dirs.control_socket(), root.path().join("run").join("control.sock"));
    }
}
