use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::app_error::AppResult;

/// Default LMDB map size (10 MiB). A shopping list never comes close.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_READERS: u32 = 126;
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(3);

/// Record store settings.
///
/// The environment lives in the directory `<name>.lmdb`.
///
/// ```rust
/// use shopping_list_core::config::StoreConfig;
///
/// let config = StoreConfig::from_json(r#"{"name":"groceries"}"#)?;
/// assert_eq!(config.env_dir().to_str(), Some("groceries.lmdb"));
/// # Ok::<(), shopping_list_core::app_error::AppError>(())
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub map_size: usize,
    pub max_readers: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "shopping_list".to_string(),
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
        }
    }
}

impl StoreConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn env_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}.lmdb", self.name))
    }
}

/// Presentation controller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long the "new shopping started" notice stays up.
    pub notice_duration: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            notice_duration: DEFAULT_NOTICE_DURATION,
        }
    }
}
