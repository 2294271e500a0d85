use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] rocksdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("column family {0} doesn't exist")]
    MissingColumnFamily(&'static str),

    #[error("checked key is not valid hex: {0}")]
    InvalidHexKey(String),

    #[error("stored {key} has unexpected length {len}")]
    CorruptValue { key: &'static str, len: usize },
}
