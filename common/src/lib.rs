pub mod in_memory;
pub mod serde;
pub mod session;
pub mod time;

#[cfg(feature = "test-utils")]
pub use in_memory::{FailingSession, GatedSession};
pub use in_memory::InMemorySession;
pub use session::{
    Datapoint, Point, SeriesIterator, SessionError, SessionResult, Tag, TimeSeriesSession,
    TimeUnit,
};
