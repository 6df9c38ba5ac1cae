//! # caskdb
//!
//! An embedded, persistent key-value store organized as a segmented
//! append-only log with an in-memory key index, after the Bitcask
//! design.
//!
//! ## Features
//!
//! - **Append-only writes**: every put appends one record to the tail
//!   of the active log segment
//! - **O(1) reads**: the in-memory index points straight at the byte
//!   range of the latest record for each key
//! - **Crash recovery**: a persisted index is validated on open and the
//!   log is replayed when it is missing or suspect
//! - **Merge compaction**: shadowed records and tombstones are reclaimed
//!   by rewriting live data into a fresh log
//! - **Single-writer safety**: an advisory file lock keeps a database
//!   directory exclusive to one handle
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use caskdb::Database;
//!
//! let db = Database::open("./my_data")?;
//!
//! db.put(b"hello", b"world")?;
//! let value = db.get(b"hello")?;
//! db.delete(b"hello")?;
//!
//! // Reclaim disk space held by old records
//! db.merge()?;
//!
//! db.close()?;
//! ```

// Public modules
pub mod data;
pub mod error;
pub mod index;
pub mod options;

// Database module
mod db;

// Internal modules
mod util;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{
    with_max_datafile_size, with_max_key_size, with_max_value_size, with_memory_pool, with_sync,
    Config, OptionFn, DEFAULT_MAX_DATAFILE_SIZE, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE,
};

// Database
pub use db::{Database, Stats};

// Storage building blocks
pub use data::{Datafile, Entry};
pub use index::{Item, KeyIndex};
