//! Combines the filter with the store snapshot into one view.

use log::debug;
use serde::Serialize;
use tokio::sync::watch;

use crate::filter::ProductFilter;
use crate::product::Product;
use crate::record_store::Snapshot;
use crate::repository::{
    active_products, all_products, completed_products, distinct_categories, ShoppingListRepository,
};

/// Everything the list screen renders, recomputed as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ReconciledView {
    pub filter: ProductFilter,
    pub products: Vec<Product>,
    pub categories: Vec<String>,
    pub active_count: usize,
}

impl ReconciledView {
    /// Derives every field from one filter value and one snapshot.
    pub fn build(filter: ProductFilter, snapshot: &[Product]) -> Self {
        let products = match filter {
            ProductFilter::All => all_products(snapshot),
            ProductFilter::Active => active_products(snapshot),
            ProductFilter::Completed => completed_products(snapshot),
        };
        Self {
            filter,
            products,
            categories: distinct_categories(snapshot),
            active_count: snapshot.iter().filter(|p| p.is_pending()).count(),
        }
    }
}

pub struct ViewReconciler {
    filter: watch::Receiver<ProductFilter>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ViewReconciler {
    pub fn new(repository: &ShoppingListRepository, filter: watch::Receiver<ProductFilter>) -> Self {
        Self {
            filter,
            snapshots: repository.store().subscribe(),
        }
    }

    /// Products matching the current filter.
    pub fn visible_products(&self) -> Vec<Product> {
        self.current().products
    }

    pub fn current(&self) -> ReconciledView {
        // Never hold two watch guards at once.
        let filter = *self.filter.borrow();
        let snapshot = self.snapshots.borrow().clone();
        ReconciledView::build(filter, &snapshot)
    }

    /// Waits for a filter selection or a store commit. `false` once either
    /// upstream is gone.
    pub async fn changed(&mut self) -> bool {
        tokio::select! {
            res = self.filter.changed() => res.is_ok(),
            res = self.snapshots.changed() => res.is_ok(),
        }
    }

    /// Republishes the reconciled view on `tx` after every upstream change
    /// until the filter or the store goes away.
    pub async fn run(mut self, tx: watch::Sender<ReconciledView>) {
        loop {
            let view = self.current();
            tx.send_if_modified(|published| {
                if *published == view {
                    false
                } else {
                    *published = view;
                    true
                }
            });
            if !self.changed().await {
                debug!("View reconciler stopped");
                return;
            }
        }
    }
}
