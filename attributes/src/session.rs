//! The user-facing attribute session.
//!
//! An [`AttributeSession`] wraps an underlying time-series session and lets
//! every tagged data point carry a high-cardinality attribute tuple without
//! creating a new indexed series per label combination. On write, attribute
//! values are interned into the per-series symbol table and the point is
//! annotated with a compact indexed header; on read, the annotation is
//! decoded lazily against the table version it references.
//!
//! # Concurrency
//!
//! Symbol tables live in a bounded concurrent cache. All metadata mutation
//! for a table (dictionary, attribute indices, sequence numbers, annotation
//! encoding) happens under that table's async mutex; the underlying
//! data-point write is dispatched to a background task after the mutex is
//! released so the hot path never blocks on store latency. Cache eviction
//! drops only the cache's reference; tables stay alive through their `Arc`
//! while iterators or in-flight metadata phases still hold them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;

use common::{Tag, TimeSeriesSession, TimeUnit};

use crate::codec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::iterator::AttributeSeriesIterator;
use crate::names;
use crate::reader::SymStreamReader;
use crate::symtable::SymTable;
use crate::writer::{SymStreamWriter, WriteCompletion};

/// Version assigned to symbol tables created on the write path.
const DEFAULT_TABLE_VERSION: u16 = 1;

/// Maps a (possibly shard-qualified) data series id to the id of the
/// symbol-table stream that describes it.
pub type SymbolTableNameResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub(crate) type SymTableHandle = Arc<Mutex<SymTable>>;

/// Session facade adding an attribute facet to an underlying time-series
/// session.
#[derive(Clone)]
pub struct AttributeSession {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    session: Arc<dyn TimeSeriesSession>,
    config: Config,
    sym_tables: Cache<String, SymTableHandle>,
    num_symbol_updates: AtomicU64,
    num_attribute_updates: AtomicU64,
}

impl AttributeSession {
    /// Creates a session over the given underlying store.
    pub fn new(session: Arc<dyn TimeSeriesSession>, config: Config) -> Self {
        let sym_tables = Cache::builder()
            .max_capacity(config.max_symbol_tables)
            .build();
        Self {
            inner: Arc::new(SessionInner {
                session,
                config,
                sym_tables,
                num_symbol_updates: AtomicU64::new(0),
                num_attribute_updates: AtomicU64::new(0),
            }),
        }
    }

    /// Writes a tagged value carrying the given attributes.
    ///
    /// The metadata phase (symbol-table resolution, interning, annotation
    /// encoding) runs synchronously and its failures are returned directly;
    /// the data-point write itself is dispatched to a background task and
    /// reports through `completion`.
    #[tracing::instrument(level = "trace", skip_all, fields(id = %id))]
    pub async fn write_value_with_tagged_attributes(
        &self,
        namespace: &str,
        id: &str,
        tags: Vec<Tag>,
        attributes: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.write_with_resolver(
            namespace,
            id,
            tags,
            attributes,
            timestamp,
            value,
            unit,
            &names::sym_table_stream_name,
            completion,
        )
        .await
    }

    /// Resolver-parameterized write path shared with series families.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn write_with_resolver(
        &self,
        namespace: &str,
        id: &str,
        tags: Vec<Tag>,
        attributes: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        resolver: &(dyn Fn(&str) -> String + Send + Sync),
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        let sym_table_name = resolver(id);
        let handle = self.sym_table_for_write(namespace, &sym_table_name).await;

        let annotation = {
            let mut table = handle.lock().await;

            let attribute_map: BTreeMap<String, String> = attributes
                .iter()
                .map(|tag| (tag.name.clone(), tag.value.clone()))
                .collect();

            let (header, missing) = table.get_indexed_header(&attribute_map);
            let header = if missing {
                self.update_symbols_and_attributes(&mut table, &attribute_map)?;
                let (header, missing) = table.get_indexed_header(&attribute_map);
                if missing {
                    return Err(Error::UnresolvedAttribute(format!(
                        "attributes for series {} could not be resolved against {}",
                        id, sym_table_name
                    )));
                }
                header
            } else {
                header
            };

            codec::encode_indexed_header(table.version(), &header)?
        };

        let session = Arc::clone(&self.inner.session);
        let namespace = namespace.to_string();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = session
                .write_tagged(&namespace, &id, &tags, timestamp, value, unit, Some(annotation))
                .await
                .map_err(Error::from);
            if let Err(ref err) = result {
                tracing::warn!(series = %id, error = %err, "tagged attribute write failed");
            }
            if let Some(complete) = completion {
                complete(result);
            }
        });

        Ok(())
    }

    /// Fetches a series wrapped in an iterator that decodes per-point
    /// attributes on demand.
    #[tracing::instrument(level = "trace", skip_all, fields(id = %id))]
    pub async fn fetch_value_with_tagged_attribute(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<AttributeSeriesIterator> {
        self.fetch_with_resolver(
            namespace,
            id,
            start_inclusive,
            end_exclusive,
            Arc::new(|id: &str| names::sym_table_stream_name(id)),
        )
        .await
    }

    pub(crate) async fn fetch_with_resolver(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
        resolver: SymbolTableNameResolver,
    ) -> Result<AttributeSeriesIterator> {
        let iter = self
            .inner
            .session
            .fetch(namespace, id, start_inclusive, end_exclusive)
            .await?;
        Ok(AttributeSeriesIterator::new(
            iter,
            Arc::clone(&self.inner),
            resolver,
            namespace,
            start_inclusive,
            end_exclusive,
        ))
    }

    /// Writes a value without attributes, passing through to the store.
    pub async fn write(
        &self,
        namespace: &str,
        id: &str,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<bytes::Bytes>,
    ) -> Result<()> {
        self.inner
            .session
            .write(namespace, id, timestamp, value, unit, annotation)
            .await
            .map_err(Error::from)
    }

    /// Writes a tagged value without attributes, passing through to the
    /// store.
    pub async fn write_tagged(
        &self,
        namespace: &str,
        id: &str,
        tags: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<bytes::Bytes>,
    ) -> Result<()> {
        self.inner
            .session
            .write_tagged(namespace, id, tags, timestamp, value, unit, annotation)
            .await
            .map_err(Error::from)
    }

    /// Fetches raw points without attribute decoding.
    pub async fn fetch(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<Box<dyn common::SeriesIterator + Send>> {
        self.inner
            .session
            .fetch(namespace, id, start_inclusive, end_exclusive)
            .await
            .map_err(Error::from)
    }

    /// Closes the underlying session.
    pub async fn close(&self) -> Result<()> {
        self.inner.session.close().await.map_err(Error::from)
    }

    /// Waits until no cached symbol table has stream writes pending, bounded
    /// by `timeout` per table (zero means wait forever).
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        for (_, handle) in &self.inner.sym_tables {
            let table = handle.lock().await;
            table.wait(timeout).await?;
        }
        Ok(())
    }

    /// Number of dictionary update batches applied on the write path.
    pub fn num_symbol_updates(&self) -> u64 {
        self.inner.num_symbol_updates.load(Ordering::Relaxed)
    }

    /// Number of attribute value insertions applied on the write path.
    pub fn num_attribute_updates(&self) -> u64 {
        self.inner.num_attribute_updates.load(Ordering::Relaxed)
    }

    /// Resolves the symbol table for a write, creating a fresh version-1
    /// table with an attached stream writer on first use.
    async fn sym_table_for_write(&self, namespace: &str, name: &str) -> SymTableHandle {
        let inner = Arc::clone(&self.inner);
        let namespace = namespace.to_string();
        let table_name = name.to_string();
        self.inner
            .sym_tables
            .get_with(name.to_string(), async move {
                let writer = SymStreamWriter::new(
                    namespace,
                    table_name.clone(),
                    Arc::clone(&inner.session),
                    inner.config.max_pending_stream_writes,
                );
                Arc::new(Mutex::new(SymTable::with_writer(
                    table_name,
                    DEFAULT_TABLE_VERSION,
                    writer,
                )))
            })
            .await
    }

    /// Interns attribute values the table has not seen and indexes every
    /// attribute pair. Values are interned in one deduplicated batch so ids
    /// stay dense and the batch emits a single dictionary record.
    fn update_symbols_and_attributes(
        &self,
        table: &mut SymTable,
        attributes: &BTreeMap<String, String>,
    ) -> Result<()> {
        let symbols: Vec<String> = attributes
            .values()
            .filter(|value| !table.attribute_value_exists(value))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !symbols.is_empty() {
            table.update_dictionary(&symbols, None)?;
            self.inner.num_symbol_updates.fetch_add(1, Ordering::Relaxed);
        }

        for (name, value) in attributes {
            table.insert_attribute_value(name, value, None)?;
            self.inner
                .num_attribute_updates
                .fetch_add(1, Ordering::Relaxed);
        }

        Ok(())
    }
}

impl SessionInner {
    /// Returns the cached symbol table when its version matches; otherwise
    /// replays the stream at the requested version and caches the result.
    #[tracing::instrument(level = "trace", skip(self))]
    pub(crate) async fn fetch_or_create_sym_table(
        &self,
        namespace: &str,
        sym_table_name: &str,
        version: u16,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<SymTableHandle> {
        if let Some(handle) = self.sym_tables.get(sym_table_name).await {
            if handle.lock().await.version() == version {
                return Ok(handle);
            }
        }

        let mut reader =
            SymStreamReader::new(namespace, sym_table_name, Arc::clone(&self.session));
        reader.seek(start_inclusive, end_exclusive).await?;
        let table = reader.read_table(sym_table_name, version).await?;

        let handle = Arc::new(Mutex::new(table));
        self.sym_tables
            .insert(sym_table_name.to_string(), Arc::clone(&handle))
            .await;
        Ok(handle)
    }
}
