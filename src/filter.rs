use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::app_error::AppError;

/// Which derived sequence the list view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl Display for ProductFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProductFilter::All => "ALL",
            ProductFilter::Active => "ACTIVE",
            ProductFilter::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

impl FromStr for ProductFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(ProductFilter::All),
            "ACTIVE" => Ok(ProductFilter::Active),
            "COMPLETED" => Ok(ProductFilter::Completed),
            other => Err(AppError::validation(format!("Unknown filter: {}", other))),
        }
    }
}

/// Holder of the current filter. Starts at [`ProductFilter::All`] and only
/// changes through [`FilterState::select`].
pub struct FilterState {
    tx: watch::Sender<ProductFilter>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProductFilter::All);
        Self { tx }
    }

    pub fn current(&self) -> ProductFilter {
        *self.tx.borrow()
    }

    pub fn select(&self, filter: ProductFilter) {
        self.tx.send_if_modified(|current| {
            let changed = *current != filter;
            *current = filter;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ProductFilter> {
        self.tx.subscribe()
    }
}
