//! SQLite persistence for paired sensor rows.
//!
//! [`SqliteSink`] implements [`weatherpair_core::RowSink`] with one table per
//! device slot (`esp1`, `esp2`).

mod error;
mod sqlite;

pub use error::WriterError;
pub use sqlite::SqliteSink;
