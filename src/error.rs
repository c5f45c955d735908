#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(feature = "tikv")]
    #[error("TiKV error: {0}")]
    Tikv(#[from] tikv_client::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("Record id is {0} bytes, expected 32")]
    InvalidIdLength(usize),
    #[error("Unsupported index record version: {0}")]
    UnsupportedVersion(u32),
    #[error("Not found")]
    NotFound,
    #[error("Indexes and payloads sizes mismatch: {indexes} != {payloads}")]
    SizeMismatch { indexes: usize, payloads: usize },
    #[error("Rollback incomplete: {0}")]
    Inconsistent(#[source] Box<Error>),
    #[error("Internal: {0}")]
    Internal(String),
}
