// Provider plugin variants
pub mod monday;
pub mod quickbooks;
