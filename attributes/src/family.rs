//! Series families: horizontally sharded logical series.
//!
//! A family spreads writes of a logical series across a fixed set of
//! physical keys by round-robin shard assignment, while every shard shares
//! the family's single symbol-table stream. Admission control bounds the
//! number of writes in flight across the family.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{Tag, TimeUnit};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::iterator::AttributeSeriesIterator;
use crate::names;
use crate::session::{AttributeSession, SymbolTableNameResolver};
use crate::writer::WriteCompletion;

/// Polling granularity of admission control and [`SeriesFamily::wait`].
const ADMISSION_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// A collection of physically sharded series sharing one symbol table.
pub struct SeriesFamily {
    name: String,
    namespace: String,
    session: AttributeSession,
    distribution_factor: u16,
    next_shard_index: AtomicU32,
    dictionary_limit: u32,
    max_concurrent_writes: u32,
    pending_writes: Arc<AtomicI32>,
    resolver: SymbolTableNameResolver,
}

impl SeriesFamily {
    /// Creates a family over the given session.
    ///
    /// `distribution_factor` values below 1 are treated as 1 (no sharding).
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        session: AttributeSession,
        config: &Config,
    ) -> Self {
        let name = name.into();
        let stream_name = names::family_stream_name(&name);
        Self {
            name,
            namespace: namespace.into(),
            session,
            distribution_factor: config.distribution_factor.max(1),
            next_shard_index: AtomicU32::new(0),
            dictionary_limit: config.dictionary_limit,
            max_concurrent_writes: config.max_concurrent_writes,
            pending_writes: Arc::new(AtomicI32::new(0)),
            resolver: Arc::new(move |_: &str| stream_name.clone()),
        }
    }

    /// Name of the family.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace the family writes into.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Soft cap on dictionary size. Accepted but not yet enforced.
    pub fn dictionary_limit(&self) -> u32 {
        self.dictionary_limit
    }

    /// Number of family writes currently in flight.
    pub fn pending_writes(&self) -> i32 {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Writes a value with attributes and no extra tags.
    pub async fn write(
        &self,
        id: &str,
        attributes: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.write_tagged(id, Vec::new(), attributes, timestamp, value, unit, completion)
            .await
    }

    /// Writes a tagged value with attributes to the next shard in
    /// round-robin order.
    ///
    /// Blocks while `max_concurrent_writes` family writes are already in
    /// flight. The admission slot is released when the data-point write
    /// completes (or immediately, when the metadata phase fails
    /// synchronously).
    #[tracing::instrument(level = "trace", skip_all, fields(family = %self.name, id = %id))]
    pub async fn write_tagged(
        &self,
        id: &str,
        tags: Vec<Tag>,
        attributes: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.acquire_write_slot().await;

        let shard =
            self.next_shard_index.fetch_add(1, Ordering::SeqCst) % u32::from(self.distribution_factor);
        let qualified_id = names::shard_qualified_id(shard, id);

        let pending = Arc::clone(&self.pending_writes);
        let completion: WriteCompletion = Box::new(move |result| {
            pending.fetch_sub(1, Ordering::SeqCst);
            if let Some(complete) = completion {
                complete(result);
            }
        });

        let result = self
            .session
            .write_with_resolver(
                &self.namespace,
                &qualified_id,
                tags,
                attributes,
                timestamp,
                value,
                unit,
                self.resolver.as_ref(),
                Some(completion),
            )
            .await;
        if result.is_err() {
            // No write was dispatched, so the completion will never run.
            self.pending_writes.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Fetches a shard-qualified series with the family's symbol-table
    /// resolver.
    pub async fn fetch(
        &self,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Result<AttributeSeriesIterator> {
        self.session
            .fetch_with_resolver(
                &self.namespace,
                id,
                start_inclusive,
                end_exclusive,
                Arc::clone(&self.resolver),
            )
            .await
    }

    /// Waits until no family writes are pending or the timeout elapses.
    /// A zero timeout waits indefinitely.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let mut waited = Duration::ZERO;
        loop {
            let pending = self.pending_writes.load(Ordering::SeqCst);
            if pending == 0 {
                return Ok(());
            }
            tokio::time::sleep(ADMISSION_POLL_INTERVAL).await;
            waited += ADMISSION_POLL_INTERVAL;
            if !timeout.is_zero() && waited > timeout {
                return Err(Error::Timeout(format!(
                    "{} family writes still pending after {:?}",
                    pending, timeout
                )));
            }
        }
    }

    /// Claims an admission slot, spinning with a short sleep while the
    /// family is at its concurrency bound.
    async fn acquire_write_slot(&self) {
        loop {
            let pending = self.pending_writes.load(Ordering::SeqCst);
            if pending < self.max_concurrent_writes as i32
                && self
                    .pending_writes
                    .compare_exchange(pending, pending + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return;
            }
            tokio::time::sleep(ADMISSION_POLL_INTERVAL).await;
        }
    }
}
