//! User settings kept apart from product records.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::watch;

use crate::app_error::{AppError, AppResult};
use crate::record_store::RecordStore;

pub const DEFAULT_LANGUAGE: &str = "en";

const DARK_MODE_KEY: &str = "dark_mode";
const LANGUAGE_KEY: &str = "language";

/// Settings backend. Reads are live values; writes are upserts.
pub trait Preferences: Send + Sync {
    /// `None` until the user picks a theme explicitly.
    fn is_dark_mode(&self) -> watch::Receiver<Option<bool>>;

    fn set_dark_mode(&self, is_dark: bool) -> AppResult<()>;

    /// ISO-639-1 code, [`DEFAULT_LANGUAGE`] when never set.
    fn language(&self) -> watch::Receiver<String>;

    fn set_language(&self, code: &str) -> AppResult<()>;
}

/// Accepts two ASCII letters in any case and returns them lower-cased.
pub fn normalize_language(code: &str) -> AppResult<String> {
    let code = code.trim();
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_lowercase())
    } else {
        Err(AppError::validation(format!("Invalid language code: '{}'", code)))
    }
}

/// Settings persisted in the record store's `settings` database.
pub struct LmdbPreferences {
    store: Arc<RecordStore>,
    dark_mode: watch::Sender<Option<bool>>,
    language: watch::Sender<String>,
}

impl LmdbPreferences {
    pub fn new(store: Arc<RecordStore>) -> AppResult<Self> {
        let dark_mode = match store.read_setting(DARK_MODE_KEY)?.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            Some(other) => {
                warn!("Ignoring unreadable dark_mode setting '{}'", other);
                None
            }
            None => None,
        };
        let language = store
            .read_setting(LANGUAGE_KEY)?
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        Ok(Self {
            store,
            dark_mode: watch::channel(dark_mode).0,
            language: watch::channel(language).0,
        })
    }
}

impl Preferences for LmdbPreferences {
    fn is_dark_mode(&self) -> watch::Receiver<Option<bool>> {
        self.dark_mode.subscribe()
    }

    fn set_dark_mode(&self, is_dark: bool) -> AppResult<()> {
        self.store
            .write_setting(DARK_MODE_KEY, if is_dark { "true" } else { "false" })?;
        self.dark_mode.send_replace(Some(is_dark));
        debug!("Dark mode set to {}", is_dark);
        Ok(())
    }

    fn language(&self) -> watch::Receiver<String> {
        self.language.subscribe()
    }

    fn set_language(&self, code: &str) -> AppResult<()> {
        let code = normalize_language(code)?;
        self.store.write_setting(LANGUAGE_KEY, &code)?;
        debug!("Language set to {}", code);
        self.language.send_replace(code);
        Ok(())
    }
}

/// In-memory settings, for tests and hosts that persist settings themselves.
pub struct MemoryPreferences {
    dark_mode: watch::Sender<Option<bool>>,
    language: watch::Sender<String>,
}

impl Default for MemoryPreferences {
    fn default() -> Self {
        Self {
            dark_mode: watch::channel(None).0,
            language: watch::channel(DEFAULT_LANGUAGE.to_string()).0,
        }
    }
}

impl Preferences for MemoryPreferences {
    fn is_dark_mode(&self) -> watch::Receiver<Option<bool>> {
        self.dark_mode.subscribe()
    }

    fn set_dark_mode(&self, is_dark: bool) -> AppResult<()> {
        self.dark_mode.send_replace(Some(is_dark));
        Ok(())
    }

    fn language(&self) -> watch::Receiver<String> {
        self.language.subscribe()
    }

    fn set_language(&self, code: &str) -> AppResult<()> {
        self.language.send_replace(normalize_language(code)?);
        Ok(())
    }
}
