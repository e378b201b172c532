//! Writer for the symbol-table instruction stream.
//!
//! Instruction records are persisted as annotation-bearing points on a
//! dedicated stream series: the point value is always zero, the annotation
//! carries the encoded record. Encoding happens synchronously into a
//! writer-local scratch buffer; the underlying store write is handed off to
//! a background task so the caller never blocks on network latency.
//!
//! Timestamps are stamped on the calling task before dispatch. The stream
//! series is time-ordered, so stamping inside the worker would let
//! concurrent dispatches persist in the wrong order.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;

use common::{time, TimeSeriesSession, TimeUnit};

use crate::codec::{self, AttributeEncoding, TableInstruction, INIT_SEQUENCE_NUM, MAX_RECORD_SIZE};
use crate::error::{Error, Result};

/// Completion callback invoked exactly once with the outcome of a dispatched
/// write.
pub type WriteCompletion = Box<dyn FnOnce(Result<()>) + Send + 'static>;

/// Polling granularity of [`SymStreamWriter::wait`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Appends instruction records to a symbol-table stream series.
pub struct SymStreamWriter {
    namespace: String,
    stream_id: String,
    session: Arc<dyn TimeSeriesSession>,
    scratch: BytesMut,
    pending_writes: Arc<AtomicI64>,
    max_pending_writes: usize,
}

impl SymStreamWriter {
    /// Creates a writer for the given stream series.
    ///
    /// `max_pending_writes` bounds the number of in-flight record writes;
    /// once reached, further writes fail [`Error::Backpressure`] instead of
    /// queueing without limit.
    pub fn new(
        namespace: impl Into<String>,
        stream_id: impl Into<String>,
        session: Arc<dyn TimeSeriesSession>,
        max_pending_writes: usize,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            stream_id: stream_id.into(),
            session,
            scratch: BytesMut::with_capacity(MAX_RECORD_SIZE),
            pending_writes: Arc::new(AtomicI64::new(0)),
            max_pending_writes,
        }
    }

    /// The stream series this writer appends to.
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Number of record writes currently in flight.
    pub fn pending_writes(&self) -> i64 {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Writes an init record. Init records always carry sequence number 1.
    pub fn write_init(
        &mut self,
        version: u16,
        values: &[String],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_backpressure()?;
        self.scratch.clear();
        codec::encode_record_header(
            &mut self.scratch,
            version,
            TableInstruction::Init,
            INIT_SEQUENCE_NUM,
        );
        codec::encode_values(&mut self.scratch, values)?;
        self.dispatch(completion);
        Ok(())
    }

    /// Writes an update record appending `values` to the dictionary.
    pub fn write_update(
        &mut self,
        version: u16,
        sequence_num: u32,
        values: &[String],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_backpressure()?;
        self.scratch.clear();
        codec::encode_record_header(
            &mut self.scratch,
            version,
            TableInstruction::Update,
            sequence_num,
        );
        codec::encode_values(&mut self.scratch, values)?;
        self.dispatch(completion);
        Ok(())
    }

    /// Writes an add-attribute record appending `value_ids` to the named
    /// attribute.
    pub fn write_add_attribute(
        &mut self,
        version: u16,
        sequence_num: u32,
        name: &str,
        encoding: AttributeEncoding,
        value_ids: &[u64],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_backpressure()?;
        self.scratch.clear();
        codec::encode_record_header(
            &mut self.scratch,
            version,
            TableInstruction::AddAttribute,
            sequence_num,
        );
        codec::encode_add_attribute(&mut self.scratch, name, encoding, value_ids)?;
        self.dispatch(completion);
        Ok(())
    }

    /// Writes an end record, closing the current table version.
    pub fn write_end(
        &mut self,
        version: u16,
        sequence_num: u32,
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_backpressure()?;
        self.scratch.clear();
        codec::encode_record_header(
            &mut self.scratch,
            version,
            TableInstruction::End,
            sequence_num,
        );
        self.dispatch(completion);
        Ok(())
    }

    /// Waits until no record writes are pending or the timeout elapses.
    ///
    /// A zero timeout waits indefinitely. In-flight writes continue after a
    /// timeout; there is no cancellation.
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        let mut waited = Duration::ZERO;
        loop {
            let pending = self.pending_writes.load(Ordering::SeqCst);
            if pending == 0 {
                return Ok(());
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            waited += WAIT_POLL_INTERVAL;
            if !timeout.is_zero() && waited > timeout {
                return Err(Error::Timeout(format!(
                    "{} stream writes still pending after {:?}",
                    pending, timeout
                )));
            }
        }
    }

    fn check_backpressure(&self) -> Result<()> {
        let pending = self.pending_writes.load(Ordering::SeqCst);
        if pending >= self.max_pending_writes as i64 {
            return Err(Error::Backpressure(format!(
                "{} stream writes already pending on {}",
                pending, self.stream_id
            )));
        }
        Ok(())
    }

    /// Snapshots the scratch buffer into an owned record, stamps the
    /// timestamp, and hands the write off to a background task.
    fn dispatch(&mut self, completion: Option<WriteCompletion>) {
        let encoded = self.scratch.split().freeze();
        let timestamp = time::now_nanos();

        let session = Arc::clone(&self.session);
        let namespace = self.namespace.clone();
        let stream_id = self.stream_id.clone();
        let pending = Arc::clone(&self.pending_writes);
        pending.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = session
                .write(
                    &namespace,
                    &stream_id,
                    timestamp,
                    0.0,
                    TimeUnit::Milliseconds,
                    Some(encoded),
                )
                .await
                .map_err(Error::from);
            pending.fetch_sub(1, Ordering::SeqCst);
            if let Err(ref err) = result {
                tracing::warn!(stream = %stream_id, error = %err, "symbol table stream write failed");
            }
            if let Some(complete) = completion {
                complete(result);
            }
        });
    }
}
