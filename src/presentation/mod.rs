// Presentation layer - Invocation entry point and exporter HTTP surface
pub mod app_state;
pub mod exporter_server;
pub mod handlers;
pub mod invocation;
