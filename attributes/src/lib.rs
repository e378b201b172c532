//! Wide-column attribute facet over a time-series session.
//!
//! A traditional time-series store records, per series, a stream of
//! `(timestamp, f64)` values with optional opaque annotation bytes. This
//! crate lets every individual data point carry a bounded set of
//! high-cardinality labels ("attributes", e.g. `host=host-0000123`) without
//! creating a new indexed series per label combination and without teaching
//! the store any schema.
//!
//! # Architecture
//!
//! Attribute values are dictionary-encoded into a per-series **symbol
//! table**. Each data point's annotation carries only the table version and
//! a fixed-width vector of local indices (the *indexed header*); the
//! human-readable expansion lives in a dedicated **symbol-table stream**,
//! an append-only instruction log persisted as annotation-bearing points on
//! its own series key. Readers reconstruct a table at any referenced version
//! by replaying the stream, tolerating torn and interleaved partial writes.
//!
//! # Key Concepts
//!
//! - [`AttributeSession`]: the user-facing facade for attribute-bearing
//!   writes and lazy-decoding fetches.
//! - [`SymTable`]: the in-memory dictionary and per-attribute index.
//! - [`SymStreamWriter`] / [`SymStreamReader`]: append and replay the
//!   instruction stream.
//! - [`SeriesFamily`]: shards a logical series across physical keys while
//!   sharing one symbol table.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use attributes::{AttributeSession, Config};
//! use common::{Tag, TimeUnit};
//!
//! let session = AttributeSession::new(store, Config::default());
//! session
//!     .write_value_with_tagged_attributes(
//!         "metrics",
//!         "cpu_utilization",
//!         vec![],
//!         &[Tag::new("host", "host-0000123")],
//!         now,
//!         42.0,
//!         TimeUnit::Milliseconds,
//!         None,
//!     )
//!     .await?;
//!
//! let mut iter = session
//!     .fetch_value_with_tagged_attribute("metrics", "cpu_utilization", t0, t1)
//!     .await?;
//! while iter.next().await? {
//!     let (point, _unit) = iter.current().unwrap();
//!     let attrs = iter.attributes().await?;
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod family;
pub mod iterator;
pub mod names;
pub mod reader;
pub mod session;
pub mod symtable;
pub mod writer;

pub use codec::{AttributeEncoding, Instruction, TableInstruction};
pub use config::Config;
pub use error::{Error, Result};
pub use family::SeriesFamily;
pub use iterator::AttributeSeriesIterator;
pub use reader::SymStreamReader;
pub use session::{AttributeSession, SymbolTableNameResolver};
pub use symtable::{AttributeTable, SymTable};
pub use writer::{SymStreamWriter, WriteCompletion};
