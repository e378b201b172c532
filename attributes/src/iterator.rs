//! Series iterator with lazy per-point attribute decoding.
//!
//! The wrapper forwards points from the underlying iterator untouched and
//! withholds the raw annotation. Attributes are only materialized when
//! [`AttributeSeriesIterator::attributes`] is called: the annotation names
//! the symbol table version it was written against, and the matching table
//! is fetched (from the session cache, or by replaying the symbol-table
//! stream) on first use. Iterating a window without asking for attributes
//! never touches the stream.

use std::sync::Arc;

use bytes::Bytes;

use common::{Datapoint, SeriesIterator, Tag, TimeUnit};

use crate::codec;
use crate::error::Result;
use crate::session::{SessionInner, SymTableHandle, SymbolTableNameResolver};

/// Iterator over the points of one attribute-bearing series.
pub struct AttributeSeriesIterator {
    iter: Box<dyn SeriesIterator + Send>,
    inner: Arc<SessionInner>,
    resolver: SymbolTableNameResolver,
    namespace: String,
    start_inclusive: i64,
    end_exclusive: i64,
    sym_table: Option<SymTableHandle>,
    annotation: Option<Bytes>,
    attributes: Option<Vec<Tag>>,
}

impl AttributeSeriesIterator {
    pub(crate) fn new(
        iter: Box<dyn SeriesIterator + Send>,
        inner: Arc<SessionInner>,
        resolver: SymbolTableNameResolver,
        namespace: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> Self {
        Self {
            iter,
            inner,
            resolver,
            namespace: namespace.to_string(),
            start_inclusive,
            end_exclusive,
            sym_table: None,
            annotation: None,
            attributes: None,
        }
    }

    /// Advances to the next point, invalidating the previous point's cached
    /// annotation and attribute tuple.
    pub async fn next(&mut self) -> Result<bool> {
        self.annotation = None;
        self.attributes = None;
        if !self.iter.next().await? {
            return Ok(false);
        }
        self.annotation = self
            .iter
            .current()
            .and_then(|point| point.annotation.clone());
        Ok(true)
    }

    /// Returns the current point. The annotation is consumed internally and
    /// not exposed; use [`attributes`](Self::attributes) for its decoded
    /// form.
    pub fn current(&self) -> Option<(Datapoint, TimeUnit)> {
        self.iter.current().map(|point| (point.datapoint, point.unit))
    }

    /// Decodes and returns the attributes of the current point.
    ///
    /// The symbol table referenced by the point's annotation is resolved on
    /// first use and kept for subsequent points of the same version. A point
    /// without an annotation has no attributes.
    pub async fn attributes(&mut self) -> Result<&[Tag]> {
        if self.attributes.is_none() {
            let decoded = self.decode_attributes().await?;
            self.attributes = Some(decoded);
        }
        Ok(self.attributes.as_deref().unwrap_or_default())
    }

    /// The id of the underlying series.
    pub fn id(&self) -> &str {
        self.iter.id()
    }

    /// The namespace of the underlying series.
    pub fn namespace(&self) -> &str {
        self.iter.namespace()
    }

    /// The indexed tags of the underlying series.
    pub fn tags(&self) -> &[Tag] {
        self.iter.tags()
    }

    /// Releases the underlying iterator and all cached state.
    pub fn close(&mut self) {
        self.annotation = None;
        self.attributes = None;
        self.sym_table = None;
        self.iter.close();
    }

    async fn decode_attributes(&mut self) -> Result<Vec<Tag>> {
        let Some(annotation) = self.annotation.clone() else {
            return Ok(Vec::new());
        };

        let version = codec::decode_annotation_version(&annotation)?;
        let cached_version = match &self.sym_table {
            Some(handle) => Some(handle.lock().await.version()),
            None => None,
        };
        if cached_version != Some(version) {
            let sym_table_name = (self.resolver)(self.iter.id());
            let handle = self
                .inner
                .fetch_or_create_sym_table(
                    &self.namespace,
                    &sym_table_name,
                    version,
                    self.start_inclusive,
                    self.end_exclusive,
                )
                .await?;
            self.sym_table = Some(handle);
        }

        let (_, indexed_header) = codec::decode_indexed_header(&annotation)?;
        let Some(handle) = &self.sym_table else {
            return Ok(Vec::new());
        };
        let table = handle.lock().await;
        let attributes = table.get_attributes_from_indexed_header(&indexed_header);
        Ok(attributes
            .into_iter()
            .map(|(name, value)| Tag { name, value })
            .collect())
    }
}
