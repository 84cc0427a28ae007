//! Errors returned by cache updates.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("entry of size {size} exceeds the hard limit of {hard_limit}")]
    Oversized { size: u64, hard_limit: u64 },

    #[error("entry of size {size} would overflow the total size of {total_size}")]
    TotalOverflow { size: u64, total_size: u64 },
}
