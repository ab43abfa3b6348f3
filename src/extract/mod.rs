//! Mapping detail pages to records
//!
//! The controller never looks inside a detail page; it hands the body to a
//! [`RecordBuilder`] and stores whatever comes back.

mod film;

pub use film::{Country, Credit, FilmBuilder, FilmRecord};

use crate::state::ItemId;
use thiserror::Error;

/// A detail page that could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("item {id}: {what} not found")]
    MissingField { id: ItemId, what: &'static str },

    #[error("item {id}: malformed {what}: {detail}")]
    Malformed {
        id: ItemId,
        what: &'static str,
        detail: String,
    },
}

impl ParseFailure {
    pub fn item(&self) -> ItemId {
        match self {
            Self::MissingField { id, .. } | Self::Malformed { id, .. } => *id,
        }
    }
}

/// Builds a record from a detail page body
pub trait RecordBuilder {
    type Record;

    fn build_record(&self, id: ItemId, body: &str) -> Result<Self::Record, ParseFailure>;
}
