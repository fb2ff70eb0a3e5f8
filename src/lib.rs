pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

#[cfg(feature = "lambda")]
pub use config::lambda::{LambdaConfig, S3Storage};

pub use adapters::{memory::MemoryCatalog, shopify::ShopifyClient};
pub use config::{cli::LocalStorage, toml_config::ReconcileConfig};
pub use core::{
    classifier::HeuristicClassifier,
    menu_scan::MenuIntegrityScan,
    metafield_scan::MetafieldConsistencyScan,
    scan::ScanEngine,
    trust_report::TrustReport,
    webhook::{WebhookHandler, WebhookRequest, WebhookResponse},
};
pub use utils::error::{ReconcileError, Result};
