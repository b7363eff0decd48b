//! Product record definitions.
//!
//! [`Product`] is the one entity kept by the record store. It is stored as
//! JSON, so records written by older schema versions decode with defaults
//! for the fields they lack.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single item on the shopping list.
///
/// # Lifecycle flags
///
/// An item is in exactly one of three states:
///
/// | state            | `is_active` | `is_done` |
/// |------------------|-------------|-----------|
/// | idle             | `false`     | `false`   |
/// | pending (active) | `true`      | `false`   |
/// | completed        | `false`     | `true`    |
///
/// Newly added products start idle. Both flags can end up set, either by
/// toggling a pending product done with
/// [`crate::repository::ShoppingListRepository::toggle_product_done`] or by an
/// `update_product` call carrying them; such a record counts as completed.
///
/// # Examples
///
/// ```rust
/// use shopping_list_core::product::Product;
///
/// let milk = Product::new("Milk", Some("1L"), None, "Dairy");
/// assert_eq!(milk.id, 0);
/// assert!(!milk.is_active && !milk.is_done);
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Product {
    /// Store-assigned identifier, `0` until the record is inserted.
    #[serde(default)]
    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub quantity: Option<String>,

    #[serde(default)]
    pub note: Option<String>,

    /// Empty string means uncategorized. Added in schema v2.
    #[serde(default)]
    pub category: String,

    /// Added in schema v3.
    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub is_done: bool,
}

impl Product {
    /// Builds an idle, not yet inserted product with all text inputs trimmed.
    pub fn new(name: &str, quantity: Option<&str>, note: Option<&str>, category: &str) -> Self {
        Self {
            id: 0,
            name: name.trim().to_string(),
            quantity: quantity.map(|q| q.trim().to_string()),
            note: note.map(|n| n.trim().to_string()),
            category: category.trim().to_string(),
            is_active: false,
            is_done: false,
        }
    }

    /// Pending on the current shopping run.
    pub fn is_pending(&self) -> bool {
        self.is_active && !self.is_done
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category.is_empty()
    }
}

/// Display order for every product list: uncategorized items last, then
/// category ascending, then name ascending. Comparison is byte-wise and
/// case-sensitive.
pub fn display_order(a: &Product, b: &Product) -> Ordering {
    a.is_uncategorized()
        .cmp(&b.is_uncategorized())
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.name.cmp(&b.name))
}

/// Lifecycle transitions applied to a single product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    AddToActive,
    RemoveFromActive,
    MarkCompleted,
    MoveBackToActive,
}

impl Transition {
    /// The `(is_active, is_done)` pair the transition writes.
    pub fn flags(self) -> (bool, bool) {
        match self {
            Transition::AddToActive | Transition::MoveBackToActive => (true, false),
            Transition::RemoveFromActive => (false, false),
            Transition::MarkCompleted => (false, true),
        }
    }

    pub fn apply(self, product: &mut Product) {
        let (is_active, is_done) = self.flags();
        product.is_active = is_active;
        product.is_done = is_done;
    }
}
