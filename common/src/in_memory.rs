//! In-memory implementation of the time-series session.
//!
//! Stores all points in memory and is useful for testing or scenarios where
//! durability is not required. Points of a series are returned in timestamp
//! order; the sort is stable so write order is preserved among points that
//! share a timestamp, matching the ordering contract of the real store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::session::{
    Datapoint, Point, SeriesIterator, SessionError, SessionResult, Tag, TimeSeriesSession,
    TimeUnit,
};

type SeriesKey = (String, String);

#[derive(Clone, Debug, Default)]
struct SeriesData {
    tags: Vec<Tag>,
    points: Vec<Point>,
}

/// In-memory implementation of the [`TimeSeriesSession`] trait.
///
/// Fetch calls are counted per series id so tests can assert how often a
/// series (for example a symbol-table stream) was actually read.
pub struct InMemorySession {
    data: RwLock<BTreeMap<SeriesKey, SeriesData>>,
    fetch_counts: Mutex<HashMap<String, u64>>,
}

impl InMemorySession {
    /// Creates a new session with an empty store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            fetch_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns how many times the series with the given id has been fetched.
    pub fn fetch_count(&self, id: &str) -> u64 {
        self.fetch_counts
            .lock()
            .map(|counts| counts.get(id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Returns the ids of all series written under the given namespace.
    pub fn series_ids(&self, namespace: &str) -> Vec<String> {
        self.data
            .read()
            .map(|data| {
                data.keys()
                    .filter(|(ns, _)| ns == namespace)
                    .map(|(_, id)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of points written to the given series.
    pub fn point_count(&self, namespace: &str, id: &str) -> usize {
        self.data
            .read()
            .map(|data| {
                data.get(&(namespace.to_string(), id.to_string()))
                    .map(|series| series.points.len())
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    fn append(
        &self,
        namespace: &str,
        id: &str,
        tags: Option<&[Tag]>,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| SessionError::Internal(format!("failed to acquire write lock: {}", e)))?;
        let series = data
            .entry((namespace.to_string(), id.to_string()))
            .or_default();
        if let Some(tags) = tags {
            series.tags = tags.to_vec();
        }
        series.points.push(Point {
            datapoint: Datapoint::new(timestamp, value),
            unit,
            annotation,
        });
        Ok(())
    }
}

impl Default for InMemorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesSession for InMemorySession {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn write(
        &self,
        namespace: &str,
        id: &str,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        self.append(namespace, id, None, timestamp, value, unit, annotation)
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn write_tagged(
        &self,
        namespace: &str,
        id: &str,
        tags: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        self.append(
            namespace,
            id,
            Some(tags),
            timestamp,
            value,
            unit,
            annotation,
        )
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn fetch(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> SessionResult<Box<dyn SeriesIterator + Send>> {
        if let Ok(mut counts) = self.fetch_counts.lock() {
            *counts.entry(id.to_string()).or_insert(0) += 1;
        }

        let data = self
            .data
            .read()
            .map_err(|e| SessionError::Internal(format!("failed to acquire read lock: {}", e)))?;
        let series = data
            .get(&(namespace.to_string(), id.to_string()))
            .cloned()
            .unwrap_or_default();

        let mut points: Vec<Point> = series
            .points
            .into_iter()
            .filter(|p| p.datapoint.timestamp >= start_inclusive && p.datapoint.timestamp < end_exclusive)
            .collect();
        points.sort_by_key(|p| p.datapoint.timestamp);

        Ok(Box::new(InMemorySeriesIterator {
            namespace: namespace.to_string(),
            id: id.to_string(),
            tags: series.tags,
            points,
            index: 0,
            started: false,
        }))
    }

    async fn close(&self) -> SessionResult<()> {
        Ok(())
    }
}

struct InMemorySeriesIterator {
    namespace: String,
    id: String,
    tags: Vec<Tag>,
    points: Vec<Point>,
    index: usize,
    started: bool,
}

#[async_trait]
impl SeriesIterator for InMemorySeriesIterator {
    async fn next(&mut self) -> SessionResult<bool> {
        if !self.started {
            self.started = true;
        } else if self.index < self.points.len() {
            self.index += 1;
        }
        Ok(self.index < self.points.len())
    }

    fn current(&self) -> Option<&Point> {
        if !self.started {
            return None;
        }
        self.points.get(self.index)
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn tags(&self) -> &[Tag] {
        &self.tags
    }

    fn close(&mut self) {
        self.points.clear();
        self.index = 0;
        self.started = false;
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(SessionError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(SessionError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> SessionResult<()> {
    use std::sync::Arc;

    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            // Swap to None; if another task raced us, one of them gets the
            // error and the others pass through, which is fine for tests.
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A session wrapper that delegates to an inner [`TimeSeriesSession`] but can
/// inject failures into `write`, `write_tagged`, and `fetch` on demand.
///
/// Failures can be *persistent* (returned on every call until cleared) or
/// *once* (returned on the next call, then automatically cleared).
///
/// Gated behind the `test-utils` feature.
#[cfg(feature = "test-utils")]
pub struct FailingSession {
    inner: std::sync::Arc<dyn TimeSeriesSession>,
    fail_write: FailSlot,
    fail_write_tagged: FailSlot,
    fail_fetch: FailSlot,
}

#[cfg(feature = "test-utils")]
impl FailingSession {
    /// Wraps an existing session, with all failure injections initially `None`.
    pub fn wrap(inner: std::sync::Arc<dyn TimeSeriesSession>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            inner,
            fail_write: arc_swap::ArcSwap::from_pointee(None),
            fail_write_tagged: arc_swap::ArcSwap::from_pointee(None),
            fail_fetch: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `write` return the given error on every subsequent call.
    pub fn fail_write(&self, err: SessionError) {
        self.fail_write
            .store(std::sync::Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `write` return the given error on the next call only.
    pub fn fail_write_once(&self, err: SessionError) {
        self.fail_write
            .store(std::sync::Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `write_tagged` return the given error on every subsequent call.
    pub fn fail_write_tagged(&self, err: SessionError) {
        self.fail_write_tagged
            .store(std::sync::Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `write_tagged` return the given error on the next call only.
    pub fn fail_write_tagged_once(&self, err: SessionError) {
        self.fail_write_tagged
            .store(std::sync::Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `fetch` return the given error on every subsequent call.
    pub fn fail_fetch(&self, err: SessionError) {
        self.fail_fetch
            .store(std::sync::Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `fetch` return the given error on the next call only.
    pub fn fail_fetch_once(&self, err: SessionError) {
        self.fail_fetch
            .store(std::sync::Arc::new(Some(Failure::Once(err))));
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl TimeSeriesSession for FailingSession {
    async fn write(
        &self,
        namespace: &str,
        id: &str,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        check_failure(&self.fail_write)?;
        self.inner
            .write(namespace, id, timestamp, value, unit, annotation)
            .await
    }

    async fn write_tagged(
        &self,
        namespace: &str,
        id: &str,
        tags: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        check_failure(&self.fail_write_tagged)?;
        self.inner
            .write_tagged(namespace, id, tags, timestamp, value, unit, annotation)
            .await
    }

    async fn fetch(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> SessionResult<Box<dyn SeriesIterator + Send>> {
        check_failure(&self.fail_fetch)?;
        self.inner
            .fetch(namespace, id, start_inclusive, end_exclusive)
            .await
    }

    async fn close(&self) -> SessionResult<()> {
        self.inner.close().await
    }
}

/// A session wrapper whose writes block while the gate is closed.
///
/// Useful for tests that need writes to stay in flight at a controlled
/// moment (pending-write counters, admission control, wait timeouts).
///
/// Gated behind the `test-utils` feature.
#[cfg(feature = "test-utils")]
pub struct GatedSession {
    inner: std::sync::Arc<dyn TimeSeriesSession>,
    gate: tokio::sync::watch::Sender<bool>,
}

#[cfg(feature = "test-utils")]
impl GatedSession {
    /// Wraps an existing session with the gate initially open.
    pub fn wrap(inner: std::sync::Arc<dyn TimeSeriesSession>) -> std::sync::Arc<Self> {
        let (gate, _) = tokio::sync::watch::channel(true);
        std::sync::Arc::new(Self { inner, gate })
    }

    /// Blocks subsequent writes until the gate is reopened.
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Releases all writes waiting on the gate.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    async fn wait_open(&self) {
        let mut rx = self.gate.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl TimeSeriesSession for GatedSession {
    async fn write(
        &self,
        namespace: &str,
        id: &str,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        self.wait_open().await;
        self.inner
            .write(namespace, id, timestamp, value, unit, annotation)
            .await
    }

    async fn write_tagged(
        &self,
        namespace: &str,
        id: &str,
        tags: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()> {
        self.wait_open().await;
        self.inner
            .write_tagged(namespace, id, tags, timestamp, value, unit, annotation)
            .await
    }

    async fn fetch(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> SessionResult<Box<dyn SeriesIterator + Send>> {
        self.inner
            .fetch(namespace, id, start_inclusive, end_exclusive)
            .await
    }

    async fn close(&self) -> SessionResult<()> {
        self.inner.close().await
    }
}
