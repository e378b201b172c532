//! Reader for the symbol-table instruction stream.
//!
//! The reader replays instruction records from a time window to reconstruct
//! a symbol table at a requested version. Streams are written by concurrent,
//! crash-prone writers, so replay has to tolerate torn attempts: a version
//! mismatch or a sequence gap mid-stream discards the partial table and the
//! scan resumes looking for a later init record of the requested version.
//! When several complete attempts exist, the latest one wins.

use std::sync::Arc;

use bytes::Bytes;

use common::{SeriesIterator, TimeSeriesSession};

use crate::codec::{self, AttributeEncoding, TableInstruction, INIT_SEQUENCE_NUM,
    RECORD_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::symtable::SymTable;

/// Cursor-style reader over one symbol-table stream.
pub struct SymStreamReader {
    namespace: String,
    stream_id: String,
    session: Arc<dyn TimeSeriesSession>,
    iter: Option<Box<dyn SeriesIterator + Send>>,
    current_instruction: TableInstruction,
    current_raw: Option<Bytes>,
}

impl SymStreamReader {
    pub fn new(
        namespace: impl Into<String>,
        stream_id: impl Into<String>,
        session: Arc<dyn TimeSeriesSession>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            stream_id: stream_id.into(),
            session,
            iter: None,
            current_instruction: TableInstruction::Nop,
            current_raw: None,
        }
    }

    /// Opens the stream over `[start_inclusive, end_exclusive)`.
    pub async fn seek(&mut self, start_inclusive: i64, end_exclusive: i64) -> Result<()> {
        let iter = self
            .session
            .fetch(&self.namespace, &self.stream_id, start_inclusive, end_exclusive)
            .await?;
        self.iter = Some(iter);
        self.current_instruction = TableInstruction::Nop;
        self.current_raw = None;
        Ok(())
    }

    /// Advances to the next record and returns its
    /// `(version, sequence_num, instruction)` header. Returns
    /// [`TableInstruction::Nop`] at end of stream.
    pub async fn next(&mut self) -> Result<(u16, u32, TableInstruction)> {
        let Some(iter) = self.iter.as_mut() else {
            return Err(Error::Internal(
                "stream reader used before seek".to_string(),
            ));
        };

        if !iter.next().await? {
            self.current_instruction = TableInstruction::Nop;
            self.current_raw = None;
            return Ok((0, 0, TableInstruction::Nop));
        }

        let raw = iter
            .current()
            .and_then(|point| point.annotation.clone())
            .ok_or_else(|| {
                Error::MalformedRecord("stream record carries no annotation".to_string())
            })?;
        let (version, instruction, sequence_num) = codec::decode_record_header(&raw)?;
        self.current_instruction = instruction;
        self.current_raw = Some(raw);
        Ok((version, sequence_num, instruction))
    }

    /// Reads the init payload at the cursor.
    pub fn read_init(&self) -> Result<Vec<String>> {
        let mut payload = self.current_payload(TableInstruction::Init)?;
        codec::decode_values(&mut payload)
    }

    /// Reads the update payload at the cursor.
    pub fn read_update(&self) -> Result<Vec<String>> {
        let mut payload = self.current_payload(TableInstruction::Update)?;
        codec::decode_values(&mut payload)
    }

    /// Reads the add-attribute payload at the cursor.
    pub fn read_attribute(&self) -> Result<(String, AttributeEncoding, Vec<u64>)> {
        let mut payload = self.current_payload(TableInstruction::AddAttribute)?;
        codec::decode_add_attribute(&mut payload)
    }

    /// Verifies the cursor is on an end record (which has no payload).
    pub fn read_end(&self) -> Result<()> {
        self.current_payload(TableInstruction::End).map(|_| ())
    }

    /// Replays the stream into a symbol table at the requested version.
    ///
    /// Call [`seek`](Self::seek) first. Returns [`Error::NotFound`] when no
    /// init record of the version exists in the window, and
    /// [`Error::MalformedStream`] when a sequence gap cannot be recovered by
    /// a later init record.
    #[tracing::instrument(level = "trace", skip(self))]
    pub async fn read_table(&mut self, table_name: &str, version: u16) -> Result<SymTable> {
        let mut restart_error: Option<Error> = None;

        'search: loop {
            if self.find_init(version).await?.is_none() {
                return Err(restart_error.unwrap_or_else(|| {
                    Error::NotFound(format!(
                        "no init record for version {} on stream {}",
                        version, self.stream_id
                    ))
                }));
            }

            let values = self.read_init()?;
            let mut table = SymTable::new(table_name, version);
            table.update_dictionary(&values, None)?;
            let mut prev_seq = INIT_SEQUENCE_NUM;

            loop {
                let (record_version, sequence_num, instruction) = self.next().await?;

                if instruction == TableInstruction::Nop {
                    // End of window; the stream is still being appended to.
                    return Ok(table);
                }

                if record_version != version {
                    // A torn write from another version's lineage; whatever
                    // was built so far cannot be trusted.
                    tracing::debug!(
                        stream = %self.stream_id,
                        found = record_version,
                        expected = version,
                        "version mismatch mid-stream, restarting replay"
                    );
                    restart_error = None;
                    continue 'search;
                }

                if instruction == TableInstruction::Init {
                    if sequence_num != INIT_SEQUENCE_NUM {
                        return Err(Error::MalformedStream(format!(
                            "init record with sequence {} on stream {}",
                            sequence_num, self.stream_id
                        )));
                    }
                    // A later attempt at the same version supersedes the
                    // table built so far.
                    let values = self.read_init()?;
                    table = SymTable::new(table_name, version);
                    table.update_dictionary(&values, None)?;
                    prev_seq = INIT_SEQUENCE_NUM;
                    continue;
                }

                if sequence_num != prev_seq + 1 {
                    // An instruction in this lineage was lost. Recoverable
                    // only if a later complete attempt exists.
                    tracing::debug!(
                        stream = %self.stream_id,
                        expected = prev_seq + 1,
                        found = sequence_num,
                        "sequence gap, discarding partial table"
                    );
                    restart_error = Some(Error::MalformedStream(format!(
                        "expected sequence {} but found {} on stream {}",
                        prev_seq + 1,
                        sequence_num,
                        self.stream_id
                    )));
                    continue 'search;
                }
                prev_seq = sequence_num;

                match instruction {
                    TableInstruction::End => {
                        self.read_end()?;
                        table.finalize(None)?;
                        return Ok(table);
                    }
                    TableInstruction::Update => {
                        let values = self.read_update()?;
                        table.update_dictionary(&values, None)?;
                    }
                    TableInstruction::AddAttribute => {
                        let (name, _encoding, value_ids) = self.read_attribute()?;
                        table.insert_attribute_indices(&name, &value_ids, None)?;
                    }
                    TableInstruction::Init | TableInstruction::Nop => unreachable!(),
                }
            }
        }
    }

    /// Scans forward for an init record of the requested version. Returns
    /// `None` at end of stream.
    async fn find_init(&mut self, version: u16) -> Result<Option<u32>> {
        loop {
            let (record_version, sequence_num, instruction) = self.next().await?;
            if instruction == TableInstruction::Nop {
                return Ok(None);
            }
            if instruction == TableInstruction::Init && record_version == version {
                if sequence_num != INIT_SEQUENCE_NUM {
                    return Err(Error::MalformedStream(format!(
                        "init record with sequence {} on stream {}",
                        sequence_num, self.stream_id
                    )));
                }
                return Ok(Some(sequence_num));
            }
        }
    }

    fn current_payload(&self, expected: TableInstruction) -> Result<&[u8]> {
        match &self.current_raw {
            Some(raw) if self.current_instruction == expected => Ok(&raw[RECORD_HEADER_SIZE..]),
            _ => Err(Error::WrongInstruction(format!(
                "cursor is on {:?}, expected {:?}",
                self.current_instruction, expected
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::BytesMut;

    use common::{InMemorySession, TimeUnit};

    use crate::codec::Instruction;
    use crate::writer::SymStreamWriter;

    const STREAM: &str = "m3_symboltable_s";

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Appends a hand-crafted record to the stream at the given timestamp.
    async fn push_record(
        session: &InMemorySession,
        timestamp: i64,
        version: u16,
        seq: u32,
        instruction: &Instruction,
    ) {
        let mut buf = BytesMut::new();
        codec::encode_record(&mut buf, version, seq, instruction).unwrap();
        session
            .write(
                "ns",
                STREAM,
                timestamp,
                0.0,
                TimeUnit::Milliseconds,
                Some(buf.freeze()),
            )
            .await
            .unwrap();
    }

    async fn reader(session: Arc<InMemorySession>) -> SymStreamReader {
        let mut reader = SymStreamReader::new("ns", STREAM, session);
        reader.seek(0, i64::MAX).await.unwrap();
        reader
    }

    #[tokio::test]
    async fn should_step_through_records_and_decode_payloads() {
        // given
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;
        push_record(
            &session,
            2,
            1,
            2,
            &Instruction::AddAttribute {
                name: "host".to_string(),
                encoding: AttributeEncoding::DictionaryEncoded,
                value_ids: vec![0],
            },
        )
        .await;

        // when
        let mut reader = reader(session).await;

        // then
        assert_eq!(reader.next().await.unwrap(), (1, 1, TableInstruction::Init));
        assert_eq!(reader.read_init().unwrap(), strings(&["a"]));

        assert_eq!(
            reader.next().await.unwrap(),
            (1, 2, TableInstruction::AddAttribute)
        );
        let (name, encoding, value_ids) = reader.read_attribute().unwrap();
        assert_eq!(name, "host");
        assert_eq!(encoding, AttributeEncoding::DictionaryEncoded);
        assert_eq!(value_ids, vec![0]);

        // and the stream ends with a nop
        assert_eq!(reader.next().await.unwrap(), (0, 0, TableInstruction::Nop));
    }

    #[tokio::test]
    async fn should_fail_payload_reads_on_the_wrong_instruction() {
        // given
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;

        // when
        let mut reader = reader(session).await;
        reader.next().await.unwrap();

        // then
        assert!(matches!(
            reader.read_update(),
            Err(Error::WrongInstruction(_))
        ));
        assert!(matches!(
            reader.read_attribute(),
            Err(Error::WrongInstruction(_))
        ));
        assert!(matches!(reader.read_end(), Err(Error::WrongInstruction(_))));
        assert!(reader.read_init().is_ok());
    }

    #[tokio::test]
    async fn should_replay_a_complete_stream() {
        // given
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a", "b"]) }).await;
        push_record(
            &session,
            2,
            1,
            2,
            &Instruction::AddAttribute {
                name: "host".to_string(),
                encoding: AttributeEncoding::DictionaryEncoded,
                value_ids: vec![1],
            },
        )
        .await;
        push_record(&session, 3, 1, 3, &Instruction::Update { values: strings(&["c"]) }).await;
        push_record(&session, 4, 1, 4, &Instruction::End).await;

        // when
        let table = reader(session).await.read_table("t", 1).await.unwrap();

        // then
        assert_eq!(table.num_symbols(), 3);
        assert_eq!(table.find_attribute_value("host", 0), Some("b"));
        assert!(table.is_finalized());
    }

    #[tokio::test]
    async fn should_return_unfinalized_table_at_end_of_window() {
        // given: no end record, the stream is still being appended to
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;

        // when
        let table = reader(session).await.read_table("t", 1).await.unwrap();

        // then
        assert_eq!(table.num_symbols(), 1);
        assert!(!table.is_finalized());
    }

    #[tokio::test]
    async fn should_fail_not_found_without_a_matching_init() {
        // given: only version 2 exists
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 2, 1, &Instruction::Init { values: strings(&["a"]) }).await;

        // when
        let result = reader(session).await.read_table("t", 1).await;

        // then
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn should_recover_from_a_torn_init_via_a_later_attempt() {
        // given: first attempt has a sequence gap, second attempt is complete
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;
        push_record(&session, 2, 1, 3, &Instruction::Update { values: strings(&["c"]) }).await;
        push_record(&session, 3, 1, 1, &Instruction::Init { values: strings(&["a", "b"]) }).await;
        push_record(&session, 4, 1, 2, &Instruction::End).await;

        // when
        let table = reader(session).await.read_table("t", 1).await.unwrap();

        // then: the second table wins
        assert_eq!(table.num_symbols(), 2);
        assert!(table.attribute_value_exists("a"));
        assert!(table.attribute_value_exists("b"));
        assert!(!table.attribute_value_exists("c"));
        assert!(table.is_finalized());
    }

    #[tokio::test]
    async fn should_restart_on_a_version_mismatch_mid_stream() {
        // given: a v2 record interleaves a torn v1 attempt
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;
        push_record(&session, 2, 2, 2, &Instruction::Update { values: strings(&["z"]) }).await;
        push_record(&session, 3, 1, 1, &Instruction::Init { values: strings(&["x", "y"]) }).await;
        push_record(&session, 4, 1, 2, &Instruction::End).await;

        // when
        let table = reader(session).await.read_table("t", 1).await.unwrap();

        // then
        assert_eq!(table.num_symbols(), 2);
        assert!(table.attribute_value_exists("x"));
        assert!(table.attribute_value_exists("y"));
        assert!(!table.attribute_value_exists("a"));
    }

    #[tokio::test]
    async fn should_fail_malformed_stream_on_an_unrecoverable_gap() {
        // given: a gap with no later init to recover from
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;
        push_record(&session, 2, 1, 4, &Instruction::Update { values: strings(&["b"]) }).await;

        // when
        let result = reader(session).await.read_table("t", 1).await;

        // then
        assert!(matches!(result, Err(Error::MalformedStream(_))));
    }

    #[tokio::test]
    async fn should_prefer_the_latest_complete_init() {
        // given: two complete attempts back to back
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["old"]) }).await;
        push_record(&session, 2, 1, 1, &Instruction::Init { values: strings(&["new"]) }).await;
        push_record(&session, 3, 1, 2, &Instruction::End).await;

        // when
        let table = reader(session).await.read_table("t", 1).await.unwrap();

        // then
        assert!(table.attribute_value_exists("new"));
        assert!(!table.attribute_value_exists("old"));
    }

    #[tokio::test]
    async fn should_reproduce_a_live_table_from_its_stream() {
        // given: a table mutated through a live stream writer
        let session = Arc::new(InMemorySession::new());
        let writer = SymStreamWriter::new("ns", STREAM, session.clone(), 1024);
        let mut original = SymTable::with_writer(STREAM, 1, writer);
        original
            .update_dictionary(&strings(&["a", "b"]), None)
            .unwrap();
        original.insert_attribute_value("host", "a", None).unwrap();
        original.insert_attribute_value("host", "c", None).unwrap();
        original.insert_attribute_value("dc", "b", None).unwrap();
        original
            .update_dictionary(&strings(&["d", "e"]), None)
            .unwrap();
        original.insert_attribute_value("rack", "e", None).unwrap();
        original.wait(Duration::ZERO).await.unwrap();

        // when
        let replayed = reader(session).await.read_table(STREAM, 1).await.unwrap();

        // then
        assert!(original.is_same(&replayed));
        assert!(replayed.is_same(&original));
    }

    #[tokio::test]
    async fn should_propagate_malformed_records_in_the_target_lineage() {
        // given: a record of the target version whose payload is truncated
        let session = Arc::new(InMemorySession::new());
        push_record(&session, 1, 1, 1, &Instruction::Init { values: strings(&["a"]) }).await;
        let mut buf = BytesMut::new();
        codec::encode_record(&mut buf, 1, 2, &Instruction::Update { values: strings(&["bb"]) })
            .unwrap();
        let truncated = buf.freeze().slice(0..RECORD_HEADER_SIZE + 5);
        session
            .write("ns", STREAM, 2, 0.0, TimeUnit::Milliseconds, Some(truncated))
            .await
            .unwrap();

        // when
        let result = reader(session).await.read_table("t", 1).await;

        // then
        assert!(matches!(result, Err(Error::MalformedRecord(_))));
    }
}
