// Provider clients - HTTP adapters injected into plugins
pub mod monday_client;
pub mod quickbooks_client;
