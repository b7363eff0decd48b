//! # Shopping List Core
//!
//! Local-first core of a personal shopping list: items with a name,
//! quantity, note and category, a per-run lifecycle (idle → active →
//! completed), filtered live views and plain-text sharing. Storage is LMDB;
//! native UIs link the library through the C ABI below, Rust hosts use the
//! [`controller::ShoppingListController`] directly.
//!
//! ## Data flow
//!
//! UI action → controller → [`repository::ShoppingListRepository`] →
//! [`record_store::RecordStore`] commit → new snapshot → derived
//! [`live::LiveSequence`]s → [`reconciler::ViewReconciler`] → published view.
//!
//! ## Quick Start
//!
//! ```no_run
//! use shopping_list_core::{shopping_list_open, shopping_list_add_product, shopping_list_get_products};
//! use std::ffi::CString;
//!
//! let name = CString::new("groceries").unwrap();
//! let handle = shopping_list_open(name.as_ptr());
//!
//! let json = CString::new(r#"{"name":"Milk","quantity":"1L"}"#).unwrap();
//! let added = shopping_list_add_product(handle, json.as_ptr());
//!
//! let filter = CString::new("ALL").unwrap();
//! let products = shopping_list_get_products(handle, filter.as_ptr());
//! ```
//!
//! ## FFI Functions
//!
//! Every function returns a JSON-encoded [`app_response::AppResponse`] that
//! the caller releases with [`shopping_list_free_string`].
//!
//! - [`shopping_list_open`] / [`shopping_list_close`] - handle lifecycle
//! - [`shopping_list_add_product`], [`shopping_list_update_product`],
//!   [`shopping_list_delete_product`] - record edits
//! - [`shopping_list_toggle_done`], [`shopping_list_set_lifecycle`],
//!   [`shopping_list_start_new_shopping`] - lifecycle transitions
//! - [`shopping_list_rename_category`] - category rename propagation
//! - [`shopping_list_get_products`], [`shopping_list_get_categories`],
//!   [`shopping_list_share_text`] - reads
//! - [`shopping_list_get_settings`], [`shopping_list_set_dark_mode`],
//!   [`shopping_list_set_language`] - settings

pub mod app_error;
pub mod app_response;
pub mod config;
pub mod controller;
pub mod filter;
pub mod live;
pub mod preferences;
pub mod product;
pub mod reconciler;
pub mod record_store;
pub mod repository;
pub mod share;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;
use crate::config::StoreConfig;
use crate::filter::ProductFilter;
use crate::preferences::{LmdbPreferences, Preferences};
use crate::product::{Product, Transition};
use crate::record_store::RecordStore;
use crate::repository::ShoppingListRepository;
use crate::share::format_shopping_list_for_sharing;

/// State behind the opaque pointer handed to native callers.
pub struct ShoppingListHandle {
    repository: ShoppingListRepository,
    preferences: LmdbPreferences,
}

impl ShoppingListHandle {
    pub fn open(config: &StoreConfig) -> Result<Self, app_error::AppError> {
        let store = Arc::new(RecordStore::open(config)?);
        let preferences = LmdbPreferences::new(Arc::clone(&store))?;
        Ok(Self {
            repository: ShoppingListRepository::new(store),
            preferences,
        })
    }

    pub fn repository(&self) -> &ShoppingListRepository {
        &self.repository
    }
}

#[derive(Debug, Deserialize)]
struct NewProductRequest {
    name: String,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
struct RenameCategoryRequest {
    old: String,
    new: String,
}

#[derive(Debug, Serialize)]
struct SettingsResponse {
    dark_mode: Option<bool>,
    language: String,
}

/// Opens (or creates) the list stored in `<name>.lmdb`.
///
/// Returns a null pointer when `name` is null, not UTF-8, or the store
/// cannot be opened. Release the handle with [`shopping_list_close`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_open(name: *const c_char) -> *mut ShoppingListHandle {
    if name.is_null() {
        warn!("Null name pointer passed to shopping_list_open");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = StoreConfig::named(name_str);
    match ShoppingListHandle::open(&config) {
        Ok(handle) => {
            info!("Shopping list '{}' opened", name_str);
            Box::into_raw(Box::new(handle))
        }
        Err(e) => {
            warn!("Failed to open shopping list at {}: {}", config.env_dir().display(), e);
            std::ptr::null_mut()
        }
    }
}

/// Releases a handle from [`shopping_list_open`]. The pointer must not be
/// used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_close(handle: *mut ShoppingListHandle) -> *const c_char {
    if handle.is_null() {
        let error = AppResponse::BadRequest("Null handle passed to shopping_list_close".to_string());
        return response_to_c_string(&error);
    }

    drop(unsafe { Box::from_raw(handle) });
    response_to_c_string(&AppResponse::success("Shopping list closed"))
}

/// Adds a product from `{"name", "quantity"?, "note"?, "category"?}` and
/// answers with the new id.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_add_product(
    handle: *mut ShoppingListHandle,
    json_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_add_product") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let request: NewProductRequest = match parse_json(json_ptr) {
        Ok(r) => r,
        Err(err) => return err,
    };

    let result = handle.repository.add_product(
        &request.name,
        request.quantity.as_deref(),
        request.note.as_deref(),
        &request.category,
    );
    response_to_c_string(&AppResponse::from_result(result))
}

/// Full replace of an existing product. Unknown ids are ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_update_product(
    handle: *mut ShoppingListHandle,
    json_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_update_product") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let product: Product = match parse_json(json_ptr) {
        Ok(p) => p,
        Err(err) => return err,
    };

    let result = handle.repository.update_product(&product);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Deletes the product `id`. Unknown ids are ignored.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_delete_product(handle: *mut ShoppingListHandle, id: u64) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_delete_product") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let result = handle.repository.delete_product_by_id(id);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Flips the done flag of product `id` in one store transaction.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_toggle_done(handle: *mut ShoppingListHandle, id: u64) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_toggle_done") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let result = handle.repository.toggle_product_done(id);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Applies one of `add_to_active`, `remove_from_active`, `mark_completed`
/// or `move_back_to_active` to the product `id`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_set_lifecycle(
    handle: *mut ShoppingListHandle,
    id: u64,
    transition_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_set_lifecycle") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let name = match c_ptr_to_string(transition_ptr, "transition") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let transition: Transition = match serde_json::from_value(serde_json::Value::String(name.clone())) {
        Ok(t) => t,
        Err(_) => {
            let error = AppResponse::BadRequest(format!("Unknown transition: {name}"));
            return response_to_c_string(&error);
        }
    };

    let result = handle.repository.transition(id, transition);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Renames a category on every product from `{"old": .., "new": ..}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_rename_category(
    handle: *mut ShoppingListHandle,
    json_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_rename_category") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let request: RenameCategoryRequest = match parse_json(json_ptr) {
        Ok(r) => r,
        Err(err) => return err,
    };

    let result = handle.repository.update_category(&request.old, &request.new);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Resets every product to idle for a new shopping run.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_start_new_shopping(handle: *mut ShoppingListHandle) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_start_new_shopping") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let result = handle.repository.start_new_shopping();
    response_to_c_string(&AppResponse::from_result(result))
}

/// Products for `ALL`, `ACTIVE` or `COMPLETED`, in display order.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_get_products(
    handle: *mut ShoppingListHandle,
    filter_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_get_products") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let filter = match parse_filter(filter_ptr) {
        Ok(f) => f,
        Err(err) => return err,
    };

    let products = handle.repository.products_for(filter);
    response_to_c_string(&AppResponse::json(&products))
}

/// Distinct non-empty categories, ascending, as a JSON array.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_get_categories(handle: *mut ShoppingListHandle) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_get_categories") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let categories = handle.repository.get_distinct_categories().current();
    response_to_c_string(&AppResponse::json(&categories))
}

/// Share text for the list `filter` selects, as a JSON string.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_share_text(
    handle: *mut ShoppingListHandle,
    filter_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_share_text") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let filter = match parse_filter(filter_ptr) {
        Ok(f) => f,
        Err(err) => return err,
    };

    let text = format_shopping_list_for_sharing(&handle.repository.products_for(filter));
    response_to_c_string(&AppResponse::json(&text))
}

/// Current `{"dark_mode", "language"}` settings.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_get_settings(handle: *mut ShoppingListHandle) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_get_settings") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let settings = SettingsResponse {
        dark_mode: *handle.preferences.is_dark_mode().borrow(),
        language: handle.preferences.language().borrow().clone(),
    };
    response_to_c_string(&AppResponse::json(&settings))
}

/// Persists the dark mode preference.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`].
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_set_dark_mode(handle: *mut ShoppingListHandle, is_dark: bool) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_set_dark_mode") {
        Ok(h) => h,
        Err(err) => return err,
    };

    let result = handle.preferences.set_dark_mode(is_dark);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Persists a two-letter language code, lower-cased.
///
/// # Safety
///
/// `handle` must be null or a live pointer from [`shopping_list_open`], and
/// `code` must be null or a null-terminated C string.
/// The returned string must be released with [`shopping_list_free_string`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_set_language(
    handle: *mut ShoppingListHandle,
    code_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "shopping_list_set_language") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let code = match c_ptr_to_string(code_ptr, "language") {
        Ok(s) => s,
        Err(err) => return err,
    };

    let result = handle.preferences.set_language(&code);
    response_to_c_string(&AppResponse::from_result(result))
}

/// Frees a string returned by any function of this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn shopping_list_free_string(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn handle_ref<'a>(
    handle: *mut ShoppingListHandle,
    caller: &str,
) -> Result<&'a ShoppingListHandle, *const c_char> {
    match unsafe { handle.as_ref() } {
        Some(h) => Ok(h),
        None => {
            let error = AppResponse::BadRequest(format!("Null handle passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(json_ptr: *const c_char) -> Result<T, *const c_char> {
    let json_str = c_ptr_to_string(json_ptr, "JSON")?;
    serde_json::from_str(&json_str).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
        response_to_c_string(&error)
    })
}

fn parse_filter(filter_ptr: *const c_char) -> Result<ProductFilter, *const c_char> {
    let raw = c_ptr_to_string(filter_ptr, "filter")?;
    raw.parse::<ProductFilter>().map_err(|e| {
        let error = AppResponse::BadRequest(e.message().to_string());
        response_to_c_string(&error)
    })
}

/// Serializes `response` into a caller-owned C string; null if that fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Copies a C string into a `String`, answering null pointers and invalid
/// UTF-8 with a `BadRequest` envelope.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
