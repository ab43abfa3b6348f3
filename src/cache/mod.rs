//! Content-addressed page cache
//!
//! Every successfully fetched body is written to
//! `<root>/<partition>/<sha256(identity[:salt])>` and served from there on
//! later runs. Bodies written by older versions of the crawler sit directly
//! under `<root>` and are moved into their partition the first time they are
//! looked up.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{ContentCache, UNKNOWN_PARTITION};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the cache; all of them are local disk failures
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to move {from} to {to}: {source}")]
    Relocate {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
