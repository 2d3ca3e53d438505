// Domain layer - Pure data types, no I/O
pub mod error;
pub mod ingest_batch;
pub mod time_series;
