//! Presentation controller: the state a list screen binds to, plus the
//! actions it can fire.
//!
//! Mutations are fire-and-forget. Each one runs as a blocking job on the
//! runtime's blocking pool; the caller learns about the outcome only through
//! the published view (on success) or [`UiState::Error`] (on failure).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::app_error::{AppError, AppResult};
use crate::config::ControllerConfig;
use crate::filter::{FilterState, ProductFilter};
use crate::preferences::Preferences;
use crate::product::Product;
use crate::reconciler::{ReconciledView, ViewReconciler};
use crate::repository::{ShoppingListRepository, BLANK_NAME_MESSAGE};
use crate::share::format_shopping_list_for_sharing;

pub const BLANK_CATEGORY_MESSAGE: &str = "Category name cannot be empty";

/// Outcome of the most recent user action. A new error replaces the old one;
/// only [`ShoppingListController::clear_error`] goes back to `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UiState {
    #[default]
    Success,
    Error(String),
}

impl UiState {
    fn from_error(err: &AppError, fallback: &str) -> Self {
        let message = err.message().trim();
        if message.is_empty() {
            UiState::Error(fallback.to_string())
        } else {
            UiState::Error(message.to_string())
        }
    }
}

/// Transient messages that dismiss themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    NewShoppingStarted,
}

pub struct ShoppingListController {
    runtime: Handle,
    repository: ShoppingListRepository,
    preferences: Arc<dyn Preferences>,
    filter: FilterState,
    view: watch::Receiver<ReconciledView>,
    ui_state: Arc<watch::Sender<UiState>>,
    notice: Arc<watch::Sender<Option<Notice>>>,
    notice_generation: Arc<AtomicU64>,
    in_flight: Arc<watch::Sender<usize>>,
    config: ControllerConfig,
}

/// Counts a dispatched job until it finishes, even if it panics.
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn start(counter: &Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl ShoppingListController {
    /// Builds the controller and spawns its view reconciler on `runtime`.
    /// The reconciler stops when the controller is dropped.
    pub fn new(
        runtime: &Handle,
        repository: ShoppingListRepository,
        preferences: Arc<dyn Preferences>,
        config: ControllerConfig,
    ) -> Self {
        let filter = FilterState::new();
        let reconciler = ViewReconciler::new(&repository, filter.subscribe());
        let (view_tx, view) = watch::channel(reconciler.current());
        runtime.spawn(reconciler.run(view_tx));

        Self {
            runtime: runtime.clone(),
            repository,
            preferences,
            filter,
            view,
            ui_state: Arc::new(watch::channel(UiState::Success).0),
            notice: Arc::new(watch::channel(None).0),
            notice_generation: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(watch::channel(0).0),
            config,
        }
    }

    pub fn view(&self) -> watch::Receiver<ReconciledView> {
        self.view.clone()
    }

    pub fn visible_products(&self) -> Vec<Product> {
        self.view.borrow().products.clone()
    }

    pub fn categories(&self) -> Vec<String> {
        self.view.borrow().categories.clone()
    }

    pub fn suggest_categories(&self, input: &str) -> Vec<String> {
        self.repository.suggest_categories(input)
    }

    pub fn filter(&self) -> ProductFilter {
        self.filter.current()
    }

    pub fn set_filter(&self, filter: ProductFilter) {
        debug!("Filter set to {}", filter);
        self.filter.select(filter);
    }

    pub fn ui_state(&self) -> watch::Receiver<UiState> {
        self.ui_state.subscribe()
    }

    pub fn clear_error(&self) {
        self.ui_state.send_replace(UiState::Success);
    }

    /// Number of dispatched actions that have not finished yet.
    pub fn in_flight(&self) -> watch::Receiver<usize> {
        self.in_flight.subscribe()
    }

    pub fn notice(&self) -> watch::Receiver<Option<Notice>> {
        self.notice.subscribe()
    }

    pub fn dismiss_notice(&self) {
        self.notice_generation.fetch_add(1, Ordering::SeqCst);
        self.notice.send_replace(None);
    }

    pub fn add_product(&self, name: &str, quantity: Option<&str>, note: Option<&str>, category: &str) {
        if name.trim().is_empty() {
            self.fail(BLANK_NAME_MESSAGE);
            return;
        }
        let name = name.to_string();
        let quantity = quantity.map(str::to_string);
        let note = note.map(str::to_string);
        let category = category.to_string();
        self.dispatch("Failed to add product", move |repo| {
            repo.add_product(&name, quantity.as_deref(), note.as_deref(), &category)
                .map(|_| ())
        });
    }

    pub fn update_product(&self, product: Product) {
        if product.name.trim().is_empty() {
            self.fail(BLANK_NAME_MESSAGE);
            return;
        }
        self.dispatch("Failed to update product", move |repo| repo.update_product(&product));
    }

    /// Saves an edit of `product`. When the edit moves the product out of a
    /// non-blank category, every other product in that category follows.
    pub fn edit_product(
        &self,
        product: &Product,
        name: &str,
        quantity: Option<&str>,
        note: Option<&str>,
        category: &str,
    ) {
        if name.trim().is_empty() {
            self.fail(BLANK_NAME_MESSAGE);
            return;
        }
        let old_category = product.category.clone();
        let edited = Product {
            id: product.id,
            is_active: product.is_active,
            is_done: product.is_done,
            ..Product::new(name, quantity, note, category)
        };
        let renames = !old_category.trim().is_empty() && old_category != edited.category;

        self.dispatch("Failed to update product", move |repo| {
            repo.update_product(&edited)?;
            if renames {
                repo.update_category(&old_category, &edited.category)?;
            }
            Ok(())
        });
    }

    pub fn delete_product(&self, product: &Product) {
        let id = product.id;
        self.dispatch("Failed to delete product", move |repo| repo.delete_product_by_id(id));
    }

    pub fn toggle_product_done(&self, id: u64) {
        self.dispatch("Failed to update product", move |repo| repo.toggle_product_done(id));
    }

    pub fn update_category(&self, old_category: &str, new_category: &str) {
        if new_category.trim().is_empty() {
            self.fail(BLANK_CATEGORY_MESSAGE);
            return;
        }
        let old_category = old_category.to_string();
        let new_category = new_category.to_string();
        self.dispatch("Failed to update category", move |repo| {
            repo.update_category(&old_category, &new_category)
        });
    }

    pub fn add_to_active_list(&self, id: u64) {
        self.dispatch("Failed to update product", move |repo| repo.add_to_active_list(id));
    }

    pub fn remove_from_active_list(&self, id: u64) {
        self.dispatch("Failed to update product", move |repo| repo.remove_from_active_list(id));
    }

    pub fn mark_as_completed(&self, id: u64) {
        self.dispatch("Failed to update product", move |repo| repo.mark_as_completed(id));
    }

    pub fn move_back_to_active(&self, id: u64) {
        self.dispatch("Failed to update product", move |repo| repo.move_back_to_active(id));
    }

    /// Starting over while items are still pending should be confirmed.
    pub fn needs_new_shopping_confirmation(&self) -> bool {
        self.view.borrow().active_count > 0
    }

    /// Resets every product to idle, shows the full list again and raises
    /// [`Notice::NewShoppingStarted`] once the reset is committed.
    pub fn start_new_shopping(&self) {
        self.set_filter(ProductFilter::All);

        let notice = Arc::clone(&self.notice);
        let generation = Arc::clone(&self.notice_generation);
        let duration = self.config.notice_duration;
        let runtime = self.runtime.clone();

        self.dispatch("Failed to start new shopping", move |repo| {
            repo.start_new_shopping()?;

            let raised = generation.fetch_add(1, Ordering::SeqCst) + 1;
            notice.send_replace(Some(Notice::NewShoppingStarted));
            runtime.spawn(async move {
                tokio::time::sleep(duration).await;
                if generation.load(Ordering::SeqCst) == raised {
                    notice.send_replace(None);
                }
            });
            Ok(())
        });
    }

    pub fn format_shopping_list_for_sharing(&self, products: &[Product]) -> String {
        format_shopping_list_for_sharing(products)
    }

    /// Share text for whatever the current filter shows.
    pub fn share_text(&self) -> String {
        format_shopping_list_for_sharing(&self.view.borrow().products)
    }

    pub fn dark_mode(&self) -> watch::Receiver<Option<bool>> {
        self.preferences.is_dark_mode()
    }

    pub fn set_dark_mode(&self, is_dark: bool) {
        let preferences = Arc::clone(&self.preferences);
        self.dispatch_with("Failed to save theme", move || preferences.set_dark_mode(is_dark));
    }

    pub fn language(&self) -> watch::Receiver<String> {
        self.preferences.language()
    }

    pub fn set_language(&self, code: &str) {
        let preferences = Arc::clone(&self.preferences);
        let code = code.to_string();
        self.dispatch_with("Failed to save language", move || preferences.set_language(&code));
    }

    fn fail(&self, message: &str) {
        warn!("Rejected input: {}", message);
        self.ui_state.send_replace(UiState::Error(message.to_string()));
    }

    fn dispatch<F>(&self, fallback: &'static str, job: F)
    where
        F: FnOnce(&ShoppingListRepository) -> AppResult<()> + Send + 'static,
    {
        let repository = self.repository.clone();
        self.dispatch_with(fallback, move || job(&repository));
    }

    fn dispatch_with<F>(&self, fallback: &'static str, job: F)
    where
        F: FnOnce() -> AppResult<()> + Send + 'static,
    {
        let ui_state = Arc::clone(&self.ui_state);
        let in_flight = InFlight::start(&self.in_flight);
        self.runtime.spawn_blocking(move || {
            let _in_flight = in_flight;
            if let Err(err) = job() {
                warn!("{}: {}", fallback, err);
                ui_state.send_replace(UiState::from_error(&err, fallback));
            }
        });
    }
}
