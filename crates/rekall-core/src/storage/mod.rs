//! Storage layer: connection pooling, record store, schema migrations.

pub mod migrations;
pub mod pool;
pub mod records;

pub use pool::{ConnectionPool, PoolError, PoolRegistry, PooledConnection};
pub use records::{
    content_hash, parse_record, parse_timestamp, ListFilter, MemoryRecord, NewRecord,
    RecordPatch, RecordStatus, RecordStore, Scope, StoreError,
};
