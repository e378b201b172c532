//! Dictionary-encoded symbol table for per-point attributes.
//!
//! A symbol table maps attribute value strings to dense u64 ids (the global
//! dictionary) and, per attribute name, maps those ids to dense local
//! indices. A data point then carries only the local indices, in header
//! order, instead of the strings themselves.
//!
//! Tables are not internally synchronized; callers must guarantee exclusive
//! access while mutating. When a stream writer is attached, every mutation
//! appends a matching instruction record so the table can be reconstructed
//! by replaying the stream.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crate::codec::AttributeEncoding;
use crate::error::{Error, Result};
use crate::writer::{SymStreamWriter, WriteCompletion};

/// Per-attribute index: local index -> global value id, plus the reverse
/// mapping. Local indices are dense and assigned in insertion order; a value
/// id appears at most once per attribute.
#[derive(Debug)]
pub struct AttributeTable {
    name: String,
    encoding: AttributeEncoding,
    encoded_values: Vec<u64>,
    local_index_by_value_id: HashMap<u64, u64>,
}

impl AttributeTable {
    fn new(name: impl Into<String>, encoding: AttributeEncoding) -> Self {
        Self {
            name: name.into(),
            encoding,
            encoded_values: Vec::new(),
            local_index_by_value_id: HashMap::new(),
        }
    }

    /// Appends a value id unless it is already locally indexed.
    fn append(&mut self, value_id: u64) {
        if let std::collections::hash_map::Entry::Vacant(entry) =
            self.local_index_by_value_id.entry(value_id)
        {
            entry.insert(self.encoded_values.len() as u64);
            self.encoded_values.push(value_id);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding(&self) -> AttributeEncoding {
        self.encoding
    }

    /// The local-index -> value-id mapping, in local index order.
    pub fn encoded_values(&self) -> &[u64] {
        &self.encoded_values
    }

    /// The reverse value-id -> local-index mapping.
    pub fn local_index_by_value_id(&self) -> &HashMap<u64, u64> {
        &self.local_index_by_value_id
    }
}

/// Dictionary-encoded symbol table for one data series.
pub struct SymTable {
    name: String,
    version: u16,
    instruction_seq: u32,
    finalized: bool,
    dict_to_string: HashMap<u64, String>,
    dict_to_index: HashMap<String, u64>,
    header: Vec<String>,
    attributes: HashMap<String, AttributeTable>,
    stream_writer: Option<SymStreamWriter>,
}

impl SymTable {
    /// Creates a table with no stream writer attached. Mutations are purely
    /// in-memory; the replay path uses this constructor.
    pub fn new(name: impl Into<String>, version: u16) -> Self {
        Self {
            name: name.into(),
            version,
            instruction_seq: 0,
            finalized: false,
            dict_to_string: HashMap::new(),
            dict_to_index: HashMap::new(),
            header: Vec::new(),
            attributes: HashMap::new(),
            stream_writer: None,
        }
    }

    /// Creates a table whose mutations are persisted through the given
    /// stream writer.
    pub fn with_writer(name: impl Into<String>, version: u16, writer: SymStreamWriter) -> Self {
        let mut table = Self::new(name, version);
        table.stream_writer = Some(writer);
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Sequence number of the last emitted instruction.
    pub fn instruction_seq(&self) -> u32 {
        self.instruction_seq
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of distinct values in the dictionary.
    pub fn num_symbols(&self) -> usize {
        self.dict_to_string.len()
    }

    /// Number of attributes in the table.
    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    /// Attribute names in header (insertion) order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Returns true if the given value is already interned.
    pub fn attribute_value_exists(&self, value: &str) -> bool {
        self.dict_to_index.contains_key(value)
    }

    /// Atomically appends `values` to the global dictionary, assigning ids
    /// in order starting at the current cardinality.
    ///
    /// Fails [`Error::EmptyInput`] on an empty batch and
    /// [`Error::DuplicateValue`] (before any mutation) if any value is
    /// already interned or repeated within the batch. Emits an init record
    /// for the first instruction of the table, an update record afterwards.
    pub fn update_dictionary(
        &mut self,
        values: &[String],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_not_finalized()?;
        if values.is_empty() {
            return Err(Error::EmptyInput(
                "dictionary update with no values".to_string(),
            ));
        }

        let mut batch = HashSet::with_capacity(values.len());
        for value in values {
            if self.dict_to_index.contains_key(value) || !batch.insert(value.as_str()) {
                return Err(Error::DuplicateValue(format!(
                    "value {:?} already exists in symbol table {}",
                    value, self.name
                )));
            }
        }

        let mut value_id = self.dict_to_string.len() as u64;
        for value in values {
            self.dict_to_string.insert(value_id, value.clone());
            self.dict_to_index.insert(value.clone(), value_id);
            value_id += 1;
        }

        self.emit_dictionary(values, completion)
    }

    /// Inserts a single attribute value, interning it and creating the
    /// attribute on demand.
    ///
    /// Interning a value the dictionary has not seen emits a dictionary
    /// record first, so the stream stays self-contained for replay. Repeated
    /// calls with the same pair do not grow the attribute index, but each
    /// call emits an add-attribute record; replay tolerates the redundancy.
    pub fn insert_attribute_value(
        &mut self,
        name: &str,
        value: &str,
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_not_finalized()?;

        let value_id = match self.dict_to_index.get(value) {
            Some(&id) => id,
            None => {
                let id = self.dict_to_string.len() as u64;
                self.dict_to_string.insert(id, value.to_string());
                self.dict_to_index.insert(value.to_string(), id);
                self.emit_dictionary(&[value.to_string()], None)?;
                id
            }
        };

        let attribute = self.attribute_entry(name);
        attribute.append(value_id);
        let encoding = attribute.encoding;

        self.emit_add_attribute(name, encoding, &[value_id], completion)
    }

    /// Bulk-appends value ids to the named attribute, creating it on demand.
    /// Used by the replay path.
    ///
    /// Fails [`Error::UnknownValueId`] (before any mutation) if an id is not
    /// in the dictionary. Ids already indexed under the attribute are
    /// skipped, so redundant add-attribute records replay to the same state.
    pub fn insert_attribute_indices(
        &mut self,
        name: &str,
        value_ids: &[u64],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        self.check_not_finalized()?;

        for id in value_ids {
            if !self.dict_to_string.contains_key(id) {
                return Err(Error::UnknownValueId(format!(
                    "value id {} does not exist in symbol table {}",
                    id, self.name
                )));
            }
        }

        let attribute = self.attribute_entry(name);
        for &id in value_ids {
            attribute.append(id);
        }
        let encoding = attribute.encoding;

        self.emit_add_attribute(name, encoding, value_ids, completion)
    }

    /// Projects the given attribute map onto the table header.
    ///
    /// Returns one i32 local index per header slot, `-1` where the input has
    /// no value for the slot or the value is unknown to the attribute. The
    /// flag is true when any slot is `-1` or the input names an attribute
    /// the table does not know yet (those need interning before the point
    /// can be annotated).
    pub fn get_indexed_header(&self, attributes: &BTreeMap<String, String>) -> (Vec<i32>, bool) {
        if self.header.is_empty() {
            return (Vec::new(), !attributes.is_empty());
        }

        let mut has_missing = attributes
            .keys()
            .any(|name| !self.attributes.contains_key(name));
        let mut header = vec![-1i32; self.header.len()];
        for (slot, name) in self.header.iter().enumerate() {
            match attributes.get(name) {
                Some(value) => {
                    header[slot] = self.find_attribute_index(name, value);
                    if header[slot] == -1 {
                        has_missing = true;
                    }
                }
                None => has_missing = true,
            }
        }

        (header, has_missing)
    }

    /// Inverse of [`get_indexed_header`](Self::get_indexed_header): rebuilds
    /// the attribute map, skipping `-1` and out-of-range slots.
    pub fn get_attributes_from_indexed_header(&self, header: &[i32]) -> BTreeMap<String, String> {
        let mut attributes = BTreeMap::new();
        for (slot, name) in self.header.iter().enumerate() {
            if slot >= header.len() {
                break;
            }
            if header[slot] < 0 {
                continue;
            }
            if let Some(value) = self.find_attribute_value(name, header[slot] as u64) {
                attributes.insert(name.clone(), value.to_string());
            }
        }
        attributes
    }

    /// Returns the local index of `value` under the named attribute, or `-1`
    /// when the attribute or value is absent.
    pub fn find_attribute_index(&self, name: &str, value: &str) -> i32 {
        let Some(attribute) = self.attributes.get(name) else {
            return -1;
        };
        let Some(value_id) = self.dict_to_index.get(value) else {
            return -1;
        };
        match attribute.local_index_by_value_id.get(value_id) {
            Some(&local) => local as i32,
            None => -1,
        }
    }

    /// Returns the value at `local_index` under the named attribute, or
    /// `None` when the attribute is absent or the index out of bounds.
    pub fn find_attribute_value(&self, name: &str, local_index: u64) -> Option<&str> {
        let attribute = self.attributes.get(name)?;
        let value_id = attribute.encoded_values.get(local_index as usize)?;
        self.dict_to_string.get(value_id).map(String::as_str)
    }

    /// Structural equality: same dictionary, same header order, same
    /// attributes with identical encoding and local-index order.
    ///
    /// Two tables built from the same stream are the same; replaying the
    /// stream in a different order is not.
    pub fn is_same(&self, other: &SymTable) -> bool {
        if self.dict_to_string.len() != other.dict_to_string.len() {
            return false;
        }
        for (id, value) in &self.dict_to_string {
            if other.dict_to_string.get(id) != Some(value) {
                return false;
            }
        }

        if self.header != other.header {
            return false;
        }

        if self.attributes.len() != other.attributes.len() {
            return false;
        }
        for (name, attribute) in &self.attributes {
            let Some(other_attribute) = other.attributes.get(name) else {
                return false;
            };
            if attribute.encoding != other_attribute.encoding {
                return false;
            }
            if attribute.encoded_values != other_attribute.encoded_values {
                return false;
            }
        }

        true
    }

    /// Marks the table immutable, emitting an end record when a stream
    /// writer is attached. Finalizing twice is a no-op.
    pub fn finalize(&mut self, completion: Option<WriteCompletion>) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        if let Some(writer) = self.stream_writer.as_mut() {
            writer.write_end(self.version, self.instruction_seq + 1, completion)?;
            self.instruction_seq += 1;
        }
        self.finalized = true;
        Ok(())
    }

    /// Waits for pending stream writes to drain, bounded by `timeout`
    /// (zero means wait forever).
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        match &self.stream_writer {
            Some(writer) => writer.wait(timeout).await,
            None => Ok(()),
        }
    }

    fn check_not_finalized(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::Finalized(format!(
                "symbol table {} is finalized",
                self.name
            )));
        }
        Ok(())
    }

    /// Looks up the attribute, creating it and extending the header when
    /// absent.
    fn attribute_entry(&mut self, name: &str) -> &mut AttributeTable {
        match self.attributes.entry(name.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => {
                self.header.push(name.to_string());
                entry.insert(AttributeTable::new(name, AttributeEncoding::DictionaryEncoded))
            }
        }
    }

    /// Emits an init record for the first instruction of the table, an
    /// update record afterwards.
    fn emit_dictionary(
        &mut self,
        values: &[String],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        if let Some(writer) = self.stream_writer.as_mut() {
            if self.instruction_seq == 0 {
                writer.write_init(self.version, values, completion)?;
            } else {
                writer.write_update(self.version, self.instruction_seq + 1, values, completion)?;
            }
            self.instruction_seq += 1;
        }
        Ok(())
    }

    fn emit_add_attribute(
        &mut self,
        name: &str,
        encoding: AttributeEncoding,
        value_ids: &[u64],
        completion: Option<WriteCompletion>,
    ) -> Result<()> {
        if let Some(writer) = self.stream_writer.as_mut() {
            writer.write_add_attribute(
                self.version,
                self.instruction_seq + 1,
                name,
                encoding,
                value_ids,
                completion,
            )?;
            self.instruction_seq += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn should_update_dictionary_and_reject_duplicates() {
        // given
        let mut table = SymTable::new("test", 1);
        let values = strings(&["a", "b", "c", "d", "e"]);

        // when
        table.update_dictionary(&values, None).unwrap();

        // then
        for value in ["a", "b", "c", "d", "e"] {
            assert!(table.attribute_value_exists(value));
        }
        assert!(!table.attribute_value_exists("f"));

        // and a second identical batch fails without changing the table
        let result = table.update_dictionary(&values, None);
        assert!(matches!(result, Err(Error::DuplicateValue(_))));
        assert_eq!(table.num_symbols(), 5);
    }

    #[test]
    fn should_reject_duplicate_within_one_batch() {
        // given
        let mut table = SymTable::new("test", 1);

        // when
        let result = table.update_dictionary(&strings(&["a", "a"]), None);

        // then: nothing was interned
        assert!(matches!(result, Err(Error::DuplicateValue(_))));
        assert_eq!(table.num_symbols(), 0);
    }

    #[test]
    fn should_reject_empty_dictionary_update() {
        // given
        let mut table = SymTable::new("test", 1);

        // when
        let result = table.update_dictionary(&[], None);

        // then
        assert!(matches!(result, Err(Error::EmptyInput(_))));
    }

    #[test]
    fn should_index_attribute_values() {
        // given
        let mut table = SymTable::new("test", 1);
        table
            .update_dictionary(&strings(&["a", "b", "c", "d", "e"]), None)
            .unwrap();

        // when
        table.insert_attribute_value("host", "a", None).unwrap();

        // then
        assert_eq!(table.find_attribute_index("host", "a"), 0);
        // value "b" has not yet been mapped to the host attribute
        assert_eq!(table.find_attribute_index("host", "b"), -1);

        // when it is mapped the index continues from the previous one
        table.insert_attribute_value("host", "b", None).unwrap();
        assert_eq!(table.find_attribute_index("host", "b"), 1);
        assert_eq!(table.find_attribute_index("host", "a"), 0);

        // and reverse lookups agree
        assert_eq!(table.find_attribute_value("host", 0), Some("a"));
        assert_eq!(table.find_attribute_value("host", 1), Some("b"));
        assert_eq!(table.find_attribute_value("host", 2), None);
        assert_eq!(table.find_attribute_value("missing", 0), None);
    }

    #[test]
    fn should_keep_local_indices_per_attribute() {
        // given: host, src, dst share one universe of values
        let mut table = SymTable::new("test", 1);
        let values = strings(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"]);
        table.update_dictionary(&values, None).unwrap();

        // when
        for value in &values {
            table.insert_attribute_value("host", value, None).unwrap();
        }
        for value in &values[0..5] {
            table.insert_attribute_value("src", value, None).unwrap();
        }
        for value in &values[5..] {
            table.insert_attribute_value("dst", value, None).unwrap();
        }

        // then: each attribute has its own index space starting at 0
        for (ndx, value) in values.iter().enumerate() {
            assert_eq!(table.find_attribute_index("host", value), ndx as i32);
        }
        for (ndx, value) in values[0..5].iter().enumerate() {
            assert_eq!(table.find_attribute_index("src", value), ndx as i32);
            assert_eq!(table.find_attribute_value("src", ndx as u64), Some(value.as_str()));
        }
        for (ndx, value) in values[5..].iter().enumerate() {
            assert_eq!(table.find_attribute_index("dst", value), ndx as i32);
            assert_eq!(table.find_attribute_value("dst", ndx as u64), Some(value.as_str()));
        }

        // and the indexed header resolves all three slots
        let (header, has_missing) =
            table.get_indexed_header(&map(&[("host", "a"), ("src", "a"), ("dst", "f")]));
        assert_eq!(header, vec![0, 0, 0]);
        assert!(!has_missing);
    }

    #[test]
    fn should_maintain_forward_and_reverse_invariants() {
        // given
        let mut table = SymTable::new("test", 1);
        table
            .update_dictionary(&strings(&["a", "b", "c"]), None)
            .unwrap();
        table.insert_attribute_value("host", "c", None).unwrap();
        table.insert_attribute_value("host", "a", None).unwrap();
        table.insert_attribute_value("dc", "b", None).unwrap();

        // then: local_index_by_value_id[encoded_values[k]] == k for all k
        for name in ["host", "dc"] {
            let attribute = &table.attributes[name];
            for (k, value_id) in attribute.encoded_values().iter().enumerate() {
                assert_eq!(
                    attribute.local_index_by_value_id()[value_id],
                    k as u64
                );
            }
        }

        // and the dictionary is a bijection
        assert_eq!(table.dict_to_string.len(), table.dict_to_index.len());
        for (value, id) in &table.dict_to_index {
            assert_eq!(table.dict_to_string.get(id), Some(value));
        }
    }

    #[test]
    fn should_be_idempotent_on_repeated_inserts() {
        // given
        let mut table = SymTable::new("test", 1);

        // when
        for _ in 0..3 {
            table.insert_attribute_value("host", "a", None).unwrap();
        }

        // then
        assert_eq!(table.attributes["host"].encoded_values(), &[0]);
        assert_eq!(table.num_symbols(), 1);
    }

    #[test]
    fn should_intern_unknown_values_on_insert() {
        // given
        let mut table = SymTable::new("test", 1);

        // when
        table.insert_attribute_value("host", "h1", None).unwrap();
        table.insert_attribute_value("host", "h2", None).unwrap();

        // then
        assert_eq!(table.num_symbols(), 2);
        assert_eq!(table.attributes["host"].encoded_values(), &[0, 1]);
    }

    #[test]
    fn should_reject_unknown_value_ids_without_mutating() {
        // given
        let mut table = SymTable::new("test", 1);
        table.update_dictionary(&strings(&["a", "b"]), None).unwrap();

        // when
        let result = table.insert_attribute_indices("host", &[0, 7], None);

        // then: the attribute was not created either
        assert!(matches!(result, Err(Error::UnknownValueId(_))));
        assert_eq!(table.num_attributes(), 0);
        assert!(table.header().is_empty());
    }

    #[test]
    fn should_skip_already_indexed_ids_on_bulk_insert() {
        // given
        let mut table = SymTable::new("test", 1);
        table.update_dictionary(&strings(&["a", "b"]), None).unwrap();
        table.insert_attribute_indices("host", &[0], None).unwrap();

        // when: a redundant record replays the same id
        table.insert_attribute_indices("host", &[0, 1], None).unwrap();

        // then
        assert_eq!(table.attributes["host"].encoded_values(), &[0, 1]);
    }

    #[test]
    fn should_project_indexed_header_boundaries() {
        // given
        let mut table = SymTable::new("test", 1);

        // then: empty header and empty input
        assert_eq!(table.get_indexed_header(&BTreeMap::new()), (vec![], false));
        // an unknown table still flags input it cannot represent
        assert_eq!(table.get_indexed_header(&map(&[("host", "a")])), (vec![], true));

        // given a populated table
        table.update_dictionary(&strings(&["a"]), None).unwrap();
        table.insert_attribute_value("host", "a", None).unwrap();

        // then: header slot without input is -1 and flagged
        let (header, has_missing) = table.get_indexed_header(&BTreeMap::new());
        assert_eq!(header, vec![-1]);
        assert!(has_missing);

        // unknown value under a known attribute is -1 and flagged
        let (header, has_missing) = table.get_indexed_header(&map(&[("host", "zzz")]));
        assert_eq!(header, vec![-1]);
        assert!(has_missing);

        // an attribute name the table has never seen is flagged even though
        // every header slot resolves
        let (header, has_missing) =
            table.get_indexed_header(&map(&[("host", "a"), ("rack", "r1")]));
        assert_eq!(header, vec![0]);
        assert!(has_missing);
    }

    #[test]
    fn should_round_trip_attribute_maps_through_the_header() {
        // given
        let mut table = SymTable::new("test", 1);
        table.insert_attribute_value("host", "h1", None).unwrap();
        table.insert_attribute_value("host", "h2", None).unwrap();
        table.insert_attribute_value("dc", "east", None).unwrap();
        let attributes = map(&[("host", "h2"), ("dc", "east")]);

        // when
        let (header, has_missing) = table.get_indexed_header(&attributes);
        let decoded = table.get_attributes_from_indexed_header(&header);

        // then
        assert!(!has_missing);
        assert_eq!(decoded, attributes);
    }

    #[test]
    fn should_skip_missing_slots_when_decoding_headers() {
        // given
        let mut table = SymTable::new("test", 1);
        table.insert_attribute_value("host", "h1", None).unwrap();
        table.insert_attribute_value("dc", "east", None).unwrap();

        // when: dc slot is -1 and a stale header is shorter than the table's
        let decoded = table.get_attributes_from_indexed_header(&[0, -1]);
        let short = table.get_attributes_from_indexed_header(&[0]);

        // then
        assert_eq!(decoded, map(&[("host", "h1")]));
        assert_eq!(short, map(&[("host", "h1")]));
    }

    #[test]
    fn should_compare_tables_structurally() {
        // given
        let values = strings(&["a", "b", "c", "d", "e"]);
        let mut table = SymTable::new("test", 1);
        let mut other = SymTable::new("test2", 2);
        table.update_dictionary(&values, None).unwrap();
        other.update_dictionary(&values, None).unwrap();
        for value in &values {
            table.insert_attribute_value("host", value, None).unwrap();
            other.insert_attribute_value("host", value, None).unwrap();
        }
        assert!(table.is_same(&other));

        // when one table interns an extra value
        table.insert_attribute_value("host", "extra", None).unwrap();
        assert!(!table.is_same(&other));

        // and catches up
        other.insert_attribute_value("host", "extra", None).unwrap();
        assert!(table.is_same(&other));

        // when an attribute is missing from the other table
        for value in &values[0..2] {
            table.insert_attribute_value("src", value, None).unwrap();
        }
        assert!(!table.is_same(&other));

        // and present but incomplete
        other.insert_attribute_value("src", &values[0], None).unwrap();
        assert!(!table.is_same(&other));

        // and complete again
        other.insert_attribute_value("src", &values[1], None).unwrap();
        assert!(table.is_same(&other));
    }

    #[test]
    fn should_treat_local_index_order_as_identity() {
        // given: the same values applied to dst in opposite order
        let mut table = SymTable::new("a", 1);
        let mut other = SymTable::new("b", 1);
        for t in [&mut table, &mut other] {
            t.update_dictionary(&strings(&["x", "y"]), None).unwrap();
        }

        // when
        table.insert_attribute_value("dst", "x", None).unwrap();
        table.insert_attribute_value("dst", "y", None).unwrap();
        other.insert_attribute_value("dst", "y", None).unwrap();
        other.insert_attribute_value("dst", "x", None).unwrap();

        // then
        assert!(!table.is_same(&other));
    }

    #[test]
    fn should_treat_header_order_as_identity() {
        // given: identical dictionaries and attributes, different header order
        let mut table = SymTable::new("a", 1);
        let mut other = SymTable::new("b", 1);
        table.insert_attribute_value("host", "h1", None).unwrap();
        table.insert_attribute_value("dc", "h1", None).unwrap();
        other.insert_attribute_value("dc", "h1", None).unwrap();
        other.insert_attribute_value("host", "h1", None).unwrap();

        // then: dictionaries differ in id order too, so align them first
        assert_eq!(table.num_symbols(), other.num_symbols());
        assert!(!table.is_same(&other));
    }

    #[test]
    fn should_fail_mutations_after_finalize() {
        // given
        let mut table = SymTable::new("test", 1);
        table.update_dictionary(&strings(&["a"]), None).unwrap();
        table.finalize(None).unwrap();
        assert!(table.is_finalized());

        // when / then
        assert!(matches!(
            table.update_dictionary(&strings(&["b"]), None),
            Err(Error::Finalized(_))
        ));
        assert!(matches!(
            table.insert_attribute_value("host", "a", None),
            Err(Error::Finalized(_))
        ));
        assert!(matches!(
            table.insert_attribute_indices("host", &[0], None),
            Err(Error::Finalized(_))
        ));

        // and a second finalize is a no-op
        table.finalize(None).unwrap();
    }
}
