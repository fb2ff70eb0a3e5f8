use crate::domain::model::{Metafield, MetaobjectRecord, Product, RecordField, RecordStatus};
use crate::domain::ports::{CatalogMutation, CatalogQuery, Page};
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::Mutex;

/// A JSON catalog export: products, metaobjects and collection membership.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    pub metaobjects: Vec<MetaobjectRecord>,
    /// collection id → product ids
    pub collections: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetMetafield {
        owner_id: String,
        namespace: String,
        key: String,
        value: Option<String>,
    },
    SetRecordField {
        record_id: String,
        key: String,
        value: Option<String>,
    },
    CreateRecord {
        record_type: String,
        record_id: String,
    },
    SetRecordStatus {
        record_id: String,
        status: RecordStatus,
    },
}

/// In-process catalog used for offline runs (`--snapshot`) and tests.
///
/// Writes change the in-memory copy only and are recorded in call order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogSnapshot>,
    mutations: Mutex<Vec<Mutation>>,
}

fn page_of<T: Clone>(items: &[T], page_size: usize, after: Option<String>) -> Result<Page<T>> {
    let start = match after {
        None => 0,
        Some(cursor) => cursor
            .parse::<usize>()
            .map_err(|_| ReconcileError::TransientFetchFailure {
                target: "memory catalog".to_string(),
                message: format!("unknown cursor {}", cursor),
            })?,
    };
    let end = start.saturating_add(page_size.max(1)).min(items.len());
    let records = items.get(start..end).unwrap_or(&[]).to_vec();

    Ok(Page {
        records,
        end_cursor: Some(end.to_string()),
        has_more: end < items.len(),
    })
}

fn not_found(operation: &str, target: &str) -> ReconcileError {
    ReconcileError::RepairFailure {
        operation: operation.to_string(),
        target: target.to_string(),
        message: "not found".to_string(),
    }
}

impl MemoryCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            mutations: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(Self::new(serde_json::from_slice(data)?))
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read(path.as_ref()).await?;
        tracing::info!("📦 Loaded catalog snapshot {}", path.as_ref().display());
        Self::from_json(&data)
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.state.lock().await.clone()
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().await.clone()
    }

    pub async fn mutation_count(&self) -> usize {
        self.mutations.lock().await.len()
    }

    async fn record(&self, mutation: Mutation) {
        self.mutations.lock().await.push(mutation);
    }
}

#[async_trait]
impl CatalogQuery for MemoryCatalog {
    async fn product_page(&self, page_size: usize, after: Option<String>) -> Result<Page<Product>> {
        page_of(&self.state.lock().await.products, page_size, after)
    }

    async fn metaobject_page(
        &self,
        record_type: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<MetaobjectRecord>> {
        let state = self.state.lock().await;
        let records: Vec<MetaobjectRecord> = state
            .metaobjects
            .iter()
            .filter(|r| r.record_type == record_type)
            .cloned()
            .collect();
        page_of(&records, page_size, after)
    }

    async fn collection_product_page(
        &self,
        collection_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<Product>> {
        let state = self.state.lock().await;
        let members = state.collections.get(collection_id).cloned().unwrap_or_default();
        let products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| members.contains(&p.id))
            .cloned()
            .collect();
        page_of(&products, page_size, after)
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        let state = self.state.lock().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn metaobject(&self, id: &str) -> Result<Option<MetaobjectRecord>> {
        let state = self.state.lock().await;
        Ok(state.metaobjects.iter().find(|r| r.id == id).cloned())
    }
}

#[async_trait]
impl CatalogMutation for MemoryCatalog {
    async fn set_metafield(
        &self,
        owner_id: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let product = state
                .products
                .iter_mut()
                .find(|p| p.id == owner_id)
                .ok_or_else(|| not_found("set_metafield", owner_id))?;

            product
                .metafields
                .retain(|m| !(m.namespace == namespace && m.key == key));
            if let Some(value) = value {
                product.metafields.push(Metafield {
                    namespace: namespace.to_string(),
                    key: key.to_string(),
                    value: Some(value.to_string()),
                });
            }
        }

        self.record(Mutation::SetMetafield {
            owner_id: owner_id.to_string(),
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.map(str::to_string),
        })
        .await;
        Ok(())
    }

    async fn set_record_field(&self, record_id: &str, key: &str, value: Option<&str>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let record = state
                .metaobjects
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| not_found("set_record_field", record_id))?;
            record.set_field(key, value.map(str::to_string));
        }

        self.record(Mutation::SetRecordField {
            record_id: record_id.to_string(),
            key: key.to_string(),
            value: value.map(str::to_string),
        })
        .await;
        Ok(())
    }

    async fn create_record(&self, record_type: &str, fields: &[(&str, String)]) -> Result<String> {
        let record_id = {
            let mut state = self.state.lock().await;
            let record_id = format!("gid://shopify/Metaobject/{}", 1000 + state.metaobjects.len());
            state.metaobjects.push(MetaobjectRecord {
                id: record_id.clone(),
                record_type: record_type.to_string(),
                status: RecordStatus::Active,
                fields: fields
                    .iter()
                    .map(|(key, value)| RecordField {
                        key: key.to_string(),
                        value: Some(value.clone()),
                    })
                    .collect(),
                updated_at: None,
            });
            record_id
        };

        self.record(Mutation::CreateRecord {
            record_type: record_type.to_string(),
            record_id: record_id.clone(),
        })
        .await;
        Ok(record_id)
    }

    async fn set_record_status(&self, record_id: &str, status: RecordStatus) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let record = state
                .metaobjects
                .iter_mut()
                .find(|r| r.id == record_id)
                .ok_or_else(|| not_found("set_record_status", record_id))?;
            record.status = status;
        }

        self.record(Mutation::SetRecordStatus {
            record_id: record_id.to_string(),
            status,
        })
        .await;
        Ok(())
    }
}
