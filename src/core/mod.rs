pub mod classifier;
pub mod exec_log;
pub mod idempotency;
pub mod menu_scan;
pub mod metafield_scan;
pub mod pagination;
pub mod scan;
pub mod trust_report;
pub mod webhook;

pub use crate::domain::ports::{Catalog, ConfigProvider, Storage};
pub use crate::utils::error::Result;
