use crate::config::toml_config::{ClassifierConfig, ReportConfig, ShopConfig};
use crate::domain::model::{MetaobjectRecord, Product, RecordStatus};
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

impl<S: Storage> Storage for &S {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_file(path).await
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        (**self).write_file(path, data).await
    }
}

pub trait ConfigProvider: Send + Sync {
    fn shop(&self) -> &ShopConfig;
    fn taxonomy(&self) -> &Taxonomy;
    fn classifier(&self) -> &ClassifierConfig;
    fn report(&self) -> &ReportConfig;
    fn fix_mode(&self) -> bool;
    fn webhook_secret(&self) -> Option<&str>;
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub end_cursor: Option<String>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn last(records: Vec<T>) -> Self {
        Self {
            records,
            end_cursor: None,
            has_more: false,
        }
    }
}

/// Read side of the remote catalog.
#[async_trait]
pub trait CatalogQuery: Send + Sync {
    async fn product_page(&self, page_size: usize, after: Option<String>) -> Result<Page<Product>>;

    async fn metaobject_page(
        &self,
        record_type: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<MetaobjectRecord>>;

    async fn collection_product_page(
        &self,
        collection_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<Product>>;

    /// `Ok(None)` when the product does not exist.
    async fn product(&self, id: &str) -> Result<Option<Product>>;

    /// `Ok(None)` when the record does not exist.
    async fn metaobject(&self, id: &str) -> Result<Option<MetaobjectRecord>>;
}

/// Write side of the remote catalog.
#[async_trait]
pub trait CatalogMutation: Send + Sync {
    /// `None` clears the metafield.
    async fn set_metafield(
        &self,
        owner_id: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()>;

    /// `None` clears the field.
    async fn set_record_field(&self, record_id: &str, key: &str, value: Option<&str>) -> Result<()>;

    /// Returns the new record id.
    async fn create_record(&self, record_type: &str, fields: &[(&str, String)]) -> Result<String>;

    async fn set_record_status(&self, record_id: &str, status: RecordStatus) -> Result<()>;
}

pub trait Catalog: CatalogQuery + CatalogMutation {}

impl<T: CatalogQuery + CatalogMutation> Catalog for T {}
