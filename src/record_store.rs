//! LMDB-backed record store for product records.
//!
//! The store owns the only copy of the data. Each committed product write is
//! followed by a fresh snapshot published on a `watch` channel; everything
//! reactive in the crate derives from that channel.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lmdb::{
    Cursor, Database, DatabaseFlags, Environment, Error as LmdbError, RwTransaction, Transaction,
    WriteFlags,
};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::app_error::{AppError, AppResult};
use crate::config::StoreConfig;
use crate::product::Product;

/// Latest committed content of the products database, in id order.
pub type Snapshot = Arc<Vec<Product>>;

/// v1: id, name, quantity, note, is_done. v2: category. v3: is_active.
pub const SCHEMA_VERSION: u32 = 3;

const PRODUCTS_DB: &str = "products";
const SETTINGS_DB: &str = "settings";
const META_DB: &str = "meta";

const SCHEMA_VERSION_KEY: &str = "schema_version";
const NEXT_ID_KEY: &str = "next_id";

pub struct RecordStore {
    env: Environment,
    products: Database,
    settings: Database,
    meta: Database,
    path: PathBuf,
    // Held across commit and publish so snapshots go out in commit order.
    write_lock: Mutex<()>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl RecordStore {
    /// Opens (or creates) the environment described by `config` and brings
    /// its schema up to [`SCHEMA_VERSION`].
    pub fn open(config: &StoreConfig) -> AppResult<Self> {
        let path = config.env_dir();
        fs::create_dir_all(&path)?;
        info!("Opening record store at {}", path.display());

        let env = Environment::new()
            .set_max_dbs(3)
            .set_map_size(config.map_size)
            .set_max_readers(config.max_readers)
            .open(&path)?;

        let products = env.create_db(Some(PRODUCTS_DB), DatabaseFlags::empty())?;
        let settings = env.create_db(Some(SETTINGS_DB), DatabaseFlags::empty())?;
        let meta = env.create_db(Some(META_DB), DatabaseFlags::empty())?;

        ensure_schema(&env, products, meta)?;

        let initial = {
            let txn = env.begin_ro_txn()?;
            read_all(&txn, products)?
        };
        info!("Record store ready with {} products", initial.len());

        let (snapshot_tx, _) = watch::channel(Arc::new(initial));

        Ok(Self {
            env,
            products,
            settings,
            meta,
            path,
            write_lock: Mutex::new(()),
            snapshot_tx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// New subscription to the snapshot channel. The current value is
    /// immediately readable; later commits mark it changed.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn schema_version(&self) -> AppResult<u32> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.meta, &SCHEMA_VERSION_KEY) {
            Ok(bytes) => decode_u32(bytes),
            Err(LmdbError::NotFound) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Inserts `product` under a freshly allocated id and returns that id.
    /// Whatever id the caller put on the product is ignored.
    pub fn insert(&self, product: Product) -> AppResult<u64> {
        let products = self.products;
        let meta = self.meta;
        self.write_products("insert", move |txn| {
            let id = allocate_id(txn, meta)?;
            let record = Product { id, ..product };
            put_product(txn, products, &record)?;
            Ok(id)
        })
    }

    /// Overwrites the record with `product.id`. Returns `false` without
    /// writing when no such record exists.
    pub fn replace(&self, product: &Product) -> AppResult<bool> {
        let products = self.products;
        self.write_products("replace", |txn| {
            let exists = match txn.get(products, &product.id.to_be_bytes()) {
                Ok(_) => true,
                Err(LmdbError::NotFound) => false,
                Err(e) => return Err(e.into()),
            };
            if exists {
                put_product(txn, products, product)?;
            }
            Ok(exists)
        })
    }

    /// Deletes the record with `id`; `false` when it did not exist.
    pub fn remove(&self, id: u64) -> AppResult<bool> {
        let products = self.products;
        self.write_products("remove", move |txn| {
            match txn.del(products, &id.to_be_bytes(), None) {
                Ok(()) => Ok(true),
                Err(LmdbError::NotFound) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Read-modify-write of one record inside a single write transaction.
    /// Concurrent callers on the same id are serialized by LMDB, so no
    /// update can be lost. Returns `false` when the id does not exist.
    pub fn modify<F>(&self, id: u64, f: F) -> AppResult<bool>
    where
        F: FnOnce(&mut Product),
    {
        let products = self.products;
        self.write_products("modify", move |txn| {
            let mut record: Product = match txn.get(products, &id.to_be_bytes()) {
                Ok(bytes) => serde_json::from_slice(bytes)?,
                Err(LmdbError::NotFound) => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            f(&mut record);
            record.id = id;
            put_product(txn, products, &record)?;
            Ok(true)
        })
    }

    /// Rewrites every record for which `f` reports a change, all in one
    /// write transaction. Returns the number of records rewritten.
    pub fn modify_all<F>(&self, mut f: F) -> AppResult<usize>
    where
        F: FnMut(&mut Product) -> bool,
    {
        let products = self.products;
        self.write_products("modify_all", move |txn| {
            let mut changed = 0;
            for mut record in read_all(&*txn, products)? {
                if f(&mut record) {
                    put_product(txn, products, &record)?;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }

    /// Removes every product record. Settings and the id counter survive.
    pub fn clear(&self) -> AppResult<()> {
        let products = self.products;
        self.write_products("clear", move |txn| {
            txn.clear_db(products)?;
            Ok(())
        })
    }

    pub(crate) fn read_setting(&self, key: &str) -> AppResult<Option<String>> {
        let txn = self.env.begin_ro_txn()?;
        match txn.get(self.settings, &key) {
            Ok(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| AppError::storage(format!("Setting '{}' is not UTF-8: {}", key, e))),
            Err(LmdbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn write_setting(&self, key: &str, value: &str) -> AppResult<()> {
        let _guard = self.write_lock.lock();
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.settings, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        debug!("Setting '{}' written", key);
        Ok(())
    }

    fn write_products<R, F>(&self, op: &str, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut RwTransaction<'_>) -> AppResult<R>,
    {
        let _guard = self.write_lock.lock();
        let result = self.env.begin_rw_txn().map_err(AppError::from).and_then(|mut txn| {
            let out = f(&mut txn)?;
            txn.commit()?;
            Ok(out)
        });

        match result {
            Ok(out) => {
                debug!("Record store {} committed", op);
                // The write is durable at this point; a failed refresh only
                // delays the snapshot until the next commit.
                if let Err(e) = self.publish() {
                    warn!("Record store {} committed but snapshot refresh failed: {}", op, e);
                }
                Ok(out)
            }
            Err(e) => {
                warn!("Record store {} failed: {}", op, e);
                Err(e)
            }
        }
    }

    fn publish(&self) -> AppResult<()> {
        let latest = {
            let txn = self.env.begin_ro_txn()?;
            read_all(&txn, self.products)?
        };
        self.snapshot_tx.send_if_modified(|current| {
            if **current == latest {
                false
            } else {
                *current = Arc::new(latest);
                true
            }
        });
        Ok(())
    }
}

fn ensure_schema(env: &Environment, products: Database, meta: Database) -> AppResult<()> {
    let mut txn = env.begin_rw_txn()?;

    let stored = match txn.get(meta, &SCHEMA_VERSION_KEY) {
        Ok(bytes) => Some(decode_u32(bytes)?),
        Err(LmdbError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let records = read_all(&txn, products)?;

    // A store without a version key but with records predates versioning.
    let version = match stored {
        Some(v) => v,
        None if records.is_empty() => SCHEMA_VERSION,
        None => 1,
    };

    if version > SCHEMA_VERSION {
        return Err(AppError::storage(format!(
            "Store schema v{} is newer than supported v{}",
            version, SCHEMA_VERSION
        )));
    }

    if version < SCHEMA_VERSION {
        info!(
            "Migrating {} products from schema v{} to v{}",
            records.len(),
            version,
            SCHEMA_VERSION
        );
        // Decoding already filled the new fields with defaults; writing the
        // records back persists them in the current layout.
        for record in &records {
            put_product(&mut txn, products, record)?;
        }
    }

    let max_id = records.iter().map(|p| p.id).max().unwrap_or(0);
    let next_id = match txn.get(meta, &NEXT_ID_KEY) {
        Ok(bytes) => decode_u64(bytes)?,
        Err(LmdbError::NotFound) => 1,
        Err(e) => return Err(e.into()),
    };
    if next_id <= max_id {
        txn.put(meta, &NEXT_ID_KEY, &(max_id + 1).to_be_bytes(), WriteFlags::empty())?;
    }

    txn.put(meta, &SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_be_bytes(), WriteFlags::empty())?;
    txn.commit()?;
    Ok(())
}

fn read_all<T: Transaction>(txn: &T, products: Database) -> AppResult<Vec<Product>> {
    let mut cursor = txn.open_ro_cursor(products)?;
    let mut records = Vec::new();
    for (_key, value) in cursor.iter() {
        records.push(serde_json::from_slice(value)?);
    }
    Ok(records)
}

fn put_product(txn: &mut RwTransaction<'_>, products: Database, product: &Product) -> AppResult<()> {
    let json = serde_json::to_vec(product)?;
    txn.put(products, &product.id.to_be_bytes(), &json, WriteFlags::empty())?;
    Ok(())
}

fn allocate_id(txn: &mut RwTransaction<'_>, meta: Database) -> AppResult<u64> {
    let next = match txn.get(meta, &NEXT_ID_KEY) {
        Ok(bytes) => decode_u64(bytes)?,
        Err(LmdbError::NotFound) => 1,
        Err(e) => return Err(e.into()),
    };
    txn.put(meta, &NEXT_ID_KEY, &(next + 1).to_be_bytes(), WriteFlags::empty())?;
    Ok(next)
}

fn decode_u32(bytes: &[u8]) -> AppResult<u32> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| AppError::storage("Malformed schema version"))?;
    Ok(u32::from_be_bytes(raw))
}

fn decode_u64(bytes: &[u8]) -> AppResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| AppError::storage("Malformed id counter"))?;
    Ok(u64::from_be_bytes(raw))
}

#[cfg(test)]
pub(crate) fn write_raw_record(store: &RecordStore, id: u64, json: &str) -> AppResult<()> {
    let mut txn = store.env.begin_rw_txn()?;
    txn.put(store.products, &id.to_be_bytes(), &json, WriteFlags::empty())?;
    txn.commit()?;
    Ok(())
}
