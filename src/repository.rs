//! Domain operations over the record store.
//!
//! Every mutating call returns an [`AppResult`]; nothing panics or escapes
//! as an unchecked error past this boundary. The repository keeps no copy of
//! the data and always reads through the store's latest snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{debug, info};

use crate::app_error::{AppError, AppResult};
use crate::filter::ProductFilter;
use crate::live::LiveSequence;
use crate::product::{display_order, Product, Transition};
use crate::record_store::RecordStore;

pub const BLANK_NAME_MESSAGE: &str = "Product name cannot be empty";

#[derive(Clone)]
pub struct ShoppingListRepository {
    store: Arc<RecordStore>,
}

impl ShoppingListRepository {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn get_all_products(&self) -> LiveSequence<Vec<Product>> {
        LiveSequence::new(self.store.subscribe(), all_products)
    }

    /// Pending items of the current run: `is_active && !is_done`.
    pub fn get_active_products(&self) -> LiveSequence<Vec<Product>> {
        LiveSequence::new(self.store.subscribe(), active_products)
    }

    pub fn get_completed_products(&self) -> LiveSequence<Vec<Product>> {
        LiveSequence::new(self.store.subscribe(), completed_products)
    }

    /// Unique non-empty categories, ascending.
    pub fn get_distinct_categories(&self) -> LiveSequence<Vec<String>> {
        LiveSequence::new(self.store.subscribe(), distinct_categories)
    }

    pub fn get_active_count(&self) -> LiveSequence<usize> {
        LiveSequence::new(self.store.subscribe(), |products| {
            products.iter().filter(|p| p.is_pending()).count()
        })
    }

    /// One-shot read of the list `filter` selects.
    pub fn products_for(&self, filter: ProductFilter) -> Vec<Product> {
        let snapshot = self.store.snapshot();
        match filter {
            ProductFilter::All => all_products(&snapshot),
            ProductFilter::Active => active_products(&snapshot),
            ProductFilter::Completed => completed_products(&snapshot),
        }
    }

    pub fn get_product(&self, id: u64) -> Option<Product> {
        self.store.snapshot().iter().find(|p| p.id == id).cloned()
    }

    /// Categories containing `input`, ignoring case. Blank input matches all.
    pub fn suggest_categories(&self, input: &str) -> Vec<String> {
        let needle = input.trim().to_lowercase();
        distinct_categories(&self.store.snapshot())
            .into_iter()
            .filter(|c| needle.is_empty() || c.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn add_product(
        &self,
        name: &str,
        quantity: Option<&str>,
        note: Option<&str>,
        category: &str,
    ) -> AppResult<u64> {
        let product = Product::new(name, quantity, note, category);
        if product.name.is_empty() {
            return Err(AppError::validation(BLANK_NAME_MESSAGE));
        }
        let id = self.store.insert(product)?;
        debug!("Added product {}", id);
        Ok(id)
    }

    /// Full replace of the record with `product.id`. A missing id is a no-op.
    pub fn update_product(&self, product: &Product) -> AppResult<()> {
        if product.name.trim().is_empty() {
            return Err(AppError::validation(BLANK_NAME_MESSAGE));
        }
        if !self.store.replace(product)? {
            debug!("Update skipped, product {} does not exist", product.id);
        }
        Ok(())
    }

    pub fn delete_product(&self, product: &Product) -> AppResult<()> {
        self.delete_product_by_id(product.id)
    }

    pub fn delete_product_by_id(&self, id: u64) -> AppResult<()> {
        if !self.store.remove(id)? {
            debug!("Delete skipped, product {} does not exist", id);
        }
        Ok(())
    }

    /// Flips `is_done` in a single store transaction, so concurrent toggles
    /// of the same id compose instead of clobbering each other.
    pub fn toggle_product_done(&self, id: u64) -> AppResult<()> {
        self.store.modify(id, |p| p.is_done = !p.is_done)?;
        Ok(())
    }

    /// Renames `old_category` to `new_category` on every record carrying it.
    pub fn update_category(&self, old_category: &str, new_category: &str) -> AppResult<()> {
        let old_category = old_category.trim();
        let new_category = new_category.trim();
        if old_category == new_category {
            return Ok(());
        }
        let renamed = self.store.modify_all(|p| {
            if p.category == old_category {
                p.category = new_category.to_string();
                true
            } else {
                false
            }
        })?;
        info!(
            "Renamed category '{}' to '{}' on {} products",
            old_category, new_category, renamed
        );
        Ok(())
    }

    /// Resets every record to idle, keeping all other fields.
    pub fn start_new_shopping(&self) -> AppResult<()> {
        let reset = self.store.modify_all(|p| {
            let changed = p.is_active || p.is_done;
            p.is_active = false;
            p.is_done = false;
            changed
        })?;
        info!("Started new shopping, {} products reset", reset);
        Ok(())
    }

    pub fn add_to_active_list(&self, id: u64) -> AppResult<()> {
        self.transition(id, Transition::AddToActive)
    }

    pub fn remove_from_active_list(&self, id: u64) -> AppResult<()> {
        self.transition(id, Transition::RemoveFromActive)
    }

    pub fn mark_as_completed(&self, id: u64) -> AppResult<()> {
        self.transition(id, Transition::MarkCompleted)
    }

    pub fn move_back_to_active(&self, id: u64) -> AppResult<()> {
        self.transition(id, Transition::MoveBackToActive)
    }

    pub fn transition(&self, id: u64, transition: Transition) -> AppResult<()> {
        self.store.modify(id, |p| transition.apply(p))?;
        Ok(())
    }
}

fn sorted(mut products: Vec<Product>) -> Vec<Product> {
    products.sort_by(display_order);
    products
}

pub fn all_products(products: &[Product]) -> Vec<Product> {
    sorted(products.to_vec())
}

pub fn active_products(products: &[Product]) -> Vec<Product> {
    sorted(products.iter().filter(|p| p.is_pending()).cloned().collect())
}

pub fn completed_products(products: &[Product]) -> Vec<Product> {
    sorted(products.iter().filter(|p| p.is_done).cloned().collect())
}

pub fn distinct_categories(products: &[Product]) -> Vec<String> {
    products
        .iter()
        .filter(|p| !p.category.is_empty())
        .map(|p| p.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
