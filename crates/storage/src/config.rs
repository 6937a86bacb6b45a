use crate::StoreError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const DATABASE_FILE: &str = "readshelf.db";
const DATABASE_ENV: &str = "READSHELF_DB";

/// Where the document database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

impl StoreConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { database_path: path.into() }
    }

    pub fn from_default_project() -> Result<Self, StoreError> {
        let dirs = ProjectDirs::from("dev", "Readshelf", "Readshelf")
            .ok_or(StoreError::NoDataDirectory)?;

        Ok(Self { database_path: dirs.data_local_dir().join(DATABASE_FILE) })
    }

    /// `READSHELF_DB` if set and non-empty, otherwise the platform data dir.
    pub fn from_env() -> Result<Self, StoreError> {
        match std::env::var_os(DATABASE_ENV) {
            Some(path) if !path.is_empty() => Ok(Self::with_path(path)),
            _ => Self::from_default_project(),
        }
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_override_wins() {
        std::env::set_var(DATABASE_ENV, "/tmp/readshelf-test.db");
        let config = StoreConfig::from_env().expect("config should resolve");
        std::env::remove_var(DATABASE_ENV);

        assert_eq!(config.database_path(), Path::new("/tmp/readshelf-test.db"));
    }

    #[test]
    #[serial]
    fn empty_env_falls_back_to_project_dir() {
        std::env::set_var(DATABASE_ENV, "");
        let config = StoreConfig::from_env();
        std::env::remove_var(DATABASE_ENV);

        if let Ok(config) = config {
            assert!(config.database_path().ends_with(DATABASE_FILE));
        }
    }
}
