//! Key naming conventions for attribute-bearing series.
//!
//! A data series owns a dedicated symbol-table stream series whose id is the
//! data series id behind a fixed prefix. Series families shard their data
//! across prefixed physical keys while sharing one symbol-table stream per
//! family.

/// Prefix of a per-series symbol-table stream.
pub const SYMBOL_TABLE_PREFIX: &str = "m3_symboltable_";

/// Prefix of a per-family symbol-table stream.
pub const FAMILY_SYMBOL_TABLE_PREFIX: &str = "m3_symboltable_sf_";

/// Prefix of a shard-qualified data series key.
pub const DATA_SERIES_PREFIX: &str = "m3_data_";

/// Returns the symbol-table stream id for a data series.
pub fn sym_table_stream_name(series_id: &str) -> String {
    format!("{SYMBOL_TABLE_PREFIX}{series_id}")
}

/// Returns the shared symbol-table stream id for a series family.
pub fn family_stream_name(family: &str) -> String {
    format!("{FAMILY_SYMBOL_TABLE_PREFIX}{family}")
}

/// Returns the physical key of a series shard within a family.
pub fn shard_qualified_id(shard: u32, series_id: &str) -> String {
    format!("{DATA_SERIES_PREFIX}{shard:05}_{series_id}")
}
