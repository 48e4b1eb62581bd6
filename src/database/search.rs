//! Full-text search over stored documents.

pub mod fts;

pub use fts::{BooleanOperator, BooleanQuery, FtsIndex, SearchHit, SearchQuery};
