//! Durable Storage Module
//!
//! Crash-safe persistence for the relayer, backed by RocksDB with one column
//! family per bucket:
//!
//! | Column family | Key | Value |
//! |---|---|---|
//! | `Check` | poly tx hash bytes | retry key that produced it |
//! | `Retry` | serialized `CrossTransfer` | single sentinel byte |
//! | `Height` | `"poly_height"` / `"zil_height"` / `"zil_ds_height"` | little-endian cursor |
//!
//! All operations go through a single read/write lock so both monitors can
//! share one store.

mod error;

pub use error::StoreError;

use rocksdb::{IteratorMode, Options, DB};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

pub const CF_CHECK: &str = "Check";
pub const CF_RETRY: &str = "Retry";
pub const CF_HEIGHT: &str = "Height";

/// Every column family, all of which are required to open the database.
const COLUMN_FAMILIES: [&str; 3] = [CF_CHECK, CF_RETRY, CF_HEIGHT];

const POLY_HEIGHT_KEY: &[u8] = b"poly_height";
const ZIL_HEIGHT_KEY: &[u8] = b"zil_height";
const ZIL_DS_HEIGHT_KEY: &[u8] = b"zil_ds_height";

const RETRY_SENTINEL: [u8; 1] = [0x00];

/// Upper bound of retry records handed out per drain cycle.
pub const MAX_PENDING_BATCH: usize = 1000;

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// STORE
// ============================================================================

pub struct RelayerStore {
    db: RwLock<DB>,
    path: PathBuf,
}

impl RelayerStore {
    /// Opens (creating if needed) the store under `path`.
    ///
    /// With `remove_existing`, any previous database at `path` is deleted first.
    pub fn open<P: AsRef<Path>>(path: P, remove_existing: bool) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if remove_existing && path.exists() {
            info!("Removing existing database at {}", path.display());
            std::fs::remove_dir_all(&path)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, &path, COLUMN_FAMILIES)?;
        info!("Opened relayer database at {}", path.display());
        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    /// Opens an existing store without taking the write lock on disk.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = DB::open_cf_for_read_only(&Options::default(), &path, COLUMN_FAMILIES, false)?;
        Ok(Self {
            db: RwLock::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf<'a>(db: &'a DB, name: &'static str) -> StoreResult<&'a rocksdb::ColumnFamily> {
        db.cf_handle(name).ok_or(StoreError::MissingColumnFamily(name))
    }

    // ------------------------------------------------------------------------
    // Retry bucket
    // ------------------------------------------------------------------------

    /// Queues a serialized `CrossTransfer`; inserting the same record twice is a no-op.
    pub async fn put_pending(&self, record: &[u8]) -> StoreResult<()> {
        let db = self.db.write().await;
        db.put_cf(Self::cf(&db, CF_RETRY)?, record, RETRY_SENTINEL)?;
        Ok(())
    }

    /// Returns up to `limit` queued records in key order.
    pub async fn list_pending(&self, limit: usize) -> StoreResult<Vec<Vec<u8>>> {
        let db = self.db.read().await;
        let mut keys = Vec::new();
        for item in db.iterator_cf(Self::cf(&db, CF_RETRY)?, IteratorMode::Start) {
            if keys.len() >= limit {
                break;
            }
            let (key, _) = item?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Up to `limit` queued records (never more than [`MAX_PENDING_BATCH`])
    /// and how many queued records were left out.
    pub async fn pending_page(&self, limit: usize) -> StoreResult<(Vec<Vec<u8>>, usize)> {
        let keys = self.list_pending(limit.min(MAX_PENDING_BATCH)).await?;
        let total = self.count_pending().await?;
        let hidden = total.saturating_sub(keys.len());
        Ok((keys, hidden))
    }

    pub async fn count_pending(&self) -> StoreResult<usize> {
        self.count(CF_RETRY).await
    }

    /// Removes a queued record. Absent keys are not an error.
    pub async fn delete_pending(&self, key: &[u8]) -> StoreResult<()> {
        let db = self.db.write().await;
        db.delete_cf(Self::cf(&db, CF_RETRY)?, key)?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Check bucket
    // ------------------------------------------------------------------------

    /// Records that the retry key `value` resulted in poly transaction `tx_hash` (hex).
    pub async fn put_checked(&self, tx_hash: &str, value: &[u8]) -> StoreResult<()> {
        let clean = tx_hash.strip_prefix("0x").unwrap_or(tx_hash);
        let key = hex::decode(clean).map_err(|_| StoreError::InvalidHexKey(tx_hash.to_string()))?;
        let db = self.db.write().await;
        db.put_cf(Self::cf(&db, CF_CHECK)?, key, value)?;
        Ok(())
    }

    pub async fn get_checked(&self, tx_hash: &str) -> StoreResult<Option<Vec<u8>>> {
        let clean = tx_hash.strip_prefix("0x").unwrap_or(tx_hash);
        let key = hex::decode(clean).map_err(|_| StoreError::InvalidHexKey(tx_hash.to_string()))?;
        let db = self.db.read().await;
        Ok(db.get_cf(Self::cf(&db, CF_CHECK)?, key)?)
    }

    pub async fn count_checked(&self) -> StoreResult<usize> {
        self.count(CF_CHECK).await
    }

    // ------------------------------------------------------------------------
    // Height bucket
    // ------------------------------------------------------------------------

    pub async fn set_poly_height(&self, height: u32) -> StoreResult<()> {
        self.put_height(POLY_HEIGHT_KEY, &height.to_le_bytes()).await
    }

    /// Persisted poly cursor; 0 when never written.
    pub async fn poly_height(&self) -> StoreResult<u32> {
        match self.get_height(POLY_HEIGHT_KEY).await? {
            None => Ok(0),
            Some(raw) => {
                let bytes: [u8; 4] = raw.as_slice().try_into().map_err(|_| StoreError::CorruptValue {
                    key: "poly_height",
                    len: raw.len(),
                })?;
                Ok(u32::from_le_bytes(bytes))
            }
        }
    }

    pub async fn set_zil_height(&self, height: u64) -> StoreResult<()> {
        self.put_height(ZIL_HEIGHT_KEY, &height.to_le_bytes()).await
    }

    pub async fn zil_height(&self) -> StoreResult<Option<u64>> {
        self.get_u64(ZIL_HEIGHT_KEY, "zil_height").await
    }

    pub async fn set_zil_ds_height(&self, height: u64) -> StoreResult<()> {
        self.put_height(ZIL_DS_HEIGHT_KEY, &height.to_le_bytes()).await
    }

    pub async fn zil_ds_height(&self) -> StoreResult<Option<u64>> {
        self.get_u64(ZIL_DS_HEIGHT_KEY, "zil_ds_height").await
    }

    async fn put_height(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let db = self.db.write().await;
        db.put_cf(Self::cf(&db, CF_HEIGHT)?, key, value)?;
        Ok(())
    }

    async fn get_height(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let db = self.db.read().await;
        Ok(db.get_cf(Self::cf(&db, CF_HEIGHT)?, key)?)
    }

    async fn get_u64(&self, key: &[u8], name: &'static str) -> StoreResult<Option<u64>> {
        match self.get_height(key).await? {
            None => Ok(None),
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| StoreError::CorruptValue { key: name, len: raw.len() })?;
                Ok(Some(u64::from_le_bytes(bytes)))
            }
        }
    }

    async fn count(&self, cf: &'static str) -> StoreResult<usize> {
        let db = self.db.read().await;
        let mut n = 0;
        for item in db.iterator_cf(Self::cf(&db, cf)?, IteratorMode::Start) {
            item?;
            n += 1;
        }
        Ok(n)
    }
}
