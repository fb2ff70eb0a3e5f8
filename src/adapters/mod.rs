// Adapters layer: concrete catalog implementations behind the domain ports.

pub mod memory;
pub mod shopify;
