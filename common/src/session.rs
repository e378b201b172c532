//! The time-series session interface consumed by the attribute layer.
//!
//! This module defines the narrow surface the attribute engine needs from an
//! underlying time-series store: point writes (optionally tagged and
//! annotated), windowed fetches returning a cursor-style iterator, and
//! shutdown. The store itself is opaque; implementations only need to keep
//! points of a series ordered by their assigned timestamps.

use async_trait::async_trait;
use bytes::Bytes;

/// Unit of the value carried by a data point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    #[default]
    Milliseconds,
    Seconds,
}

/// A single sample: timestamp in nanoseconds since the Unix epoch plus value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Datapoint {
    pub timestamp: i64,
    pub value: f64,
}

impl Datapoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// An indexed label on a series, passed through to the underlying store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A fetched point together with its unit and opaque annotation bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub datapoint: Datapoint,
    pub unit: TimeUnit,
    pub annotation: Option<Bytes>,
}

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Errors surfaced by the underlying store.
    Session(String),
    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for SessionError {}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Session(msg) => write!(f, "Session error: {}", msg),
            SessionError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Cursor-style iterator over the points of one series.
///
/// `next` advances the cursor and reports whether a point is available;
/// `current` exposes the point at the cursor. Errors from the underlying
/// store are returned by `next` rather than through a separate accessor.
#[async_trait]
pub trait SeriesIterator: Send {
    /// Advances to the next point. Returns `false` at the end of the window.
    async fn next(&mut self) -> SessionResult<bool>;

    /// Returns the point at the cursor, or `None` before the first `next`
    /// or after the iterator is exhausted.
    fn current(&self) -> Option<&Point>;

    /// The id of the series being iterated.
    fn id(&self) -> &str;

    /// The namespace of the series being iterated.
    fn namespace(&self) -> &str;

    /// The indexed tags of the series.
    fn tags(&self) -> &[Tag];

    /// Releases any resources held by the iterator.
    fn close(&mut self);
}

/// The session type encapsulates access to the underlying time-series store.
#[async_trait]
pub trait TimeSeriesSession: Send + Sync {
    /// Writes a value to the series identified by `id`.
    async fn write(
        &self,
        namespace: &str,
        id: &str,
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()>;

    /// Writes a value to the series identified by `id` with indexed tags.
    async fn write_tagged(
        &self,
        namespace: &str,
        id: &str,
        tags: &[Tag],
        timestamp: i64,
        value: f64,
        unit: TimeUnit,
        annotation: Option<Bytes>,
    ) -> SessionResult<()>;

    /// Fetches the points of a series in `[start_inclusive, end_exclusive)`.
    async fn fetch(
        &self,
        namespace: &str,
        id: &str,
        start_inclusive: i64,
        end_exclusive: i64,
    ) -> SessionResult<Box<dyn SeriesIterator + Send>>;

    /// Closes the session, releasing any resources.
    async fn close(&self) -> SessionResult<()>;
}
