//! Configuration options for attribute sessions and series families.

/// Configuration for an [`AttributeSession`](crate::AttributeSession) and
/// the [`SeriesFamily`](crate::SeriesFamily) instances built on top of it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of the symbol-table cache. Least-recently-used tables are
    /// evicted beyond this bound.
    pub max_symbol_tables: u64,

    /// Admission bound for concurrent series-family writes.
    pub max_concurrent_writes: u32,

    /// Shard fan-out per series family.
    pub distribution_factor: u16,

    /// Soft cap on dictionary size. Accepted but not yet enforced.
    pub dictionary_limit: u32,

    /// Ceiling on in-flight symbol-table stream writes per table; beyond it
    /// writes fail with backpressure instead of queueing without bound.
    pub max_pending_stream_writes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_symbol_tables: 1024,
            max_concurrent_writes: 64,
            distribution_factor: 1,
            dictionary_limit: 16384,
            max_pending_stream_writes: 4096,
        }
    }
}
