// Application layer - Use cases and capability traits
pub mod ingest_service;
pub mod metric_data_layer;
pub mod metric_store;
pub mod plugin;
pub mod plugins;
