use crate::config::toml_config::{ClassifierConfig, ReportConfig, ShopConfig};
use crate::domain::ports::{ConfigProvider, Storage};
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::{self, Validate};
use aws_sdk_s3::Client as S3Client;
use std::env;

/// Webhook Lambda settings, read from the function environment.
#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub shop: ShopConfig,
    pub webhook_secret: Option<String>,
    pub s3_bucket: String,
    pub s3_prefix: String,
    pub s3_region: String,
    pub taxonomy: Taxonomy,
    pub classifier: ClassifierConfig,
    pub report: ReportConfig,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = ShopConfig::default();
        let shop = ShopConfig {
            name: env::var("SHOPIFY_SHOP").unwrap_or_default(),
            api_version: env::var("SHOPIFY_API_VERSION").unwrap_or(defaults.api_version),
            access_token: env::var("SHOPIFY_ACCESS_TOKEN").ok(),
            endpoint: env::var("SHOPIFY_GRAPHQL_ENDPOINT").ok(),
            page_size: env::var("SHOPIFY_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.page_size),
            timeout_seconds: defaults.timeout_seconds,
            menu_item_type: defaults.menu_item_type,
        };

        Ok(Self {
            shop,
            webhook_secret: env::var("SHOPIFY_WEBHOOK_SECRET").ok(),
            s3_bucket: env::var("S3_BUCKET").map_err(|_| ReconcileError::MissingConfigError {
                field: "S3_BUCKET".to_string(),
            })?,
            s3_prefix: env::var("S3_PREFIX").unwrap_or_else(|_| "catalog-reconcile".to_string()),
            s3_region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            taxonomy: Taxonomy::default(),
            classifier: ClassifierConfig::default(),
            report: ReportConfig::default(),
        })
    }
}

impl ConfigProvider for LambdaConfig {
    fn shop(&self) -> &ShopConfig {
        &self.shop
    }

    fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn classifier(&self) -> &ClassifierConfig {
        &self.classifier
    }

    fn report(&self) -> &ReportConfig {
        &self.report
    }

    // webhook 路徑沒有修復模式的概念，快取重建一律唯讀
    fn fix_mode(&self) -> bool {
        false
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.trim().is_empty())
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("SHOPIFY_SHOP", &self.shop.name)?;
        validation::validate_required_field("SHOPIFY_ACCESS_TOKEN", &self.shop.access_token)?;
        validation::validate_required_field("SHOPIFY_WEBHOOK_SECRET", &self.webhook_secret)?;
        if let Some(endpoint) = &self.shop.endpoint {
            validation::validate_url("SHOPIFY_GRAPHQL_ENDPOINT", endpoint)?;
        }
        validate_s3_bucket_name("S3_BUCKET", &self.s3_bucket)?;
        validation::validate_non_empty_string("S3_PREFIX", &self.s3_prefix)?;
        validate_aws_region("S3_REGION", &self.s3_region)?;

        tracing::info!("✅ Lambda configuration validation passed");
        Ok(())
    }
}

fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    let reason = if bucket_name.len() < 3 || bucket_name.len() > 63 {
        Some("S3 bucket name must be between 3 and 63 characters")
    } else if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        Some("S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots")
    } else if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        Some("S3 bucket name cannot start or end with a hyphen")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validation::validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ReconcileError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }
    Ok(())
}

/// S3 report sink; every key is placed under `prefix/`.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String, prefix: String) -> Self {
        Self {
            client,
            bucket,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    fn key(&self, path: &str) -> String {
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

impl Storage for S3Storage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| ReconcileError::StorageError {
                message: format!("Failed to read s3://{}/{}: {}", self.bucket, self.key(path), e),
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| ReconcileError::StorageError {
                message: format!("Failed to collect S3 data: {}", e),
            })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| ReconcileError::StorageError {
                message: format!("Failed to write s3://{}/{}: {}", self.bucket, self.key(path), e),
            })?;
        Ok(())
    }
}
