//! Normalized record types shared by the store, aggregator and views.

pub mod types;

pub use types::{
    AdRecord, CategoryKey, DatasetId, InvalidRange, Party, Record, RemovalRecord, RequestRecord,
    StateSpendRecord, TimeRange, Timestamp,
};
