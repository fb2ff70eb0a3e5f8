//! Shopify Admin GraphQL client.
//!
//! Every call is a POST of `{query, variables}`; values are always passed as
//! variables, never spliced into the query text.

use crate::config::toml_config::ShopConfig;
use crate::domain::model::{
    Metafield, MetaobjectRecord, Product, RecordField, RecordStatus, INGREDIENT_FIELD,
    MENU_REFERENCE_FIELD,
};
use crate::domain::ports::{CatalogMutation, CatalogQuery, ConfigProvider, Page};
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const PRODUCT_FIELDS: &str = r#"
fragment ProductFields on Product {
  id
  title
  productType
  vendor
  tags
  updatedAt
  variants(first: 1) { nodes { sku } }
  ingredient: metafield(namespace: "inventory", key: "active_ingredient") { value }
  menuReference: metafield(namespace: "bar", key: "menu_reference") { value }
}"#;

const METAOBJECT_FIELDS: &str = r#"
fragment MetaobjectFields on Metaobject {
  id
  type
  updatedAt
  capabilities { publishable { status } }
  fields { key value }
}"#;

const PRODUCTS_QUERY: &str = r#"
query Products($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes { ...ProductFields }
  }
}"#;

const COLLECTION_PRODUCTS_QUERY: &str = r#"
query CollectionProducts($id: ID!, $first: Int!, $after: String) {
  collection(id: $id) {
    products(first: $first, after: $after) {
      pageInfo { hasNextPage endCursor }
      nodes { ...ProductFields }
    }
  }
}"#;

const PRODUCT_QUERY: &str = r#"
query Product($id: ID!) {
  product(id: $id) { ...ProductFields }
}"#;

const METAOBJECTS_QUERY: &str = r#"
query Metaobjects($type: String!, $first: Int!, $after: String) {
  metaobjects(type: $type, first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    nodes { ...MetaobjectFields }
  }
}"#;

const METAOBJECT_QUERY: &str = r#"
query Metaobject($id: ID!) {
  metaobject(id: $id) { ...MetaobjectFields }
}"#;

const METAFIELDS_SET: &str = r#"
mutation MetafieldsSet($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { id }
    userErrors { field message }
  }
}"#;

const METAFIELDS_DELETE: &str = r#"
mutation MetafieldsDelete($metafields: [MetafieldIdentifierInput!]!) {
  metafieldsDelete(metafields: $metafields) {
    deletedMetafields { key }
    userErrors { field message }
  }
}"#;

const METAOBJECT_CREATE: &str = r#"
mutation MetaobjectCreate($metaobject: MetaobjectCreateInput!) {
  metaobjectCreate(metaobject: $metaobject) {
    metaobject { id }
    userErrors { field message }
  }
}"#;

const METAOBJECT_UPDATE: &str = r#"
mutation MetaobjectUpdate($id: ID!, $metaobject: MetaobjectUpdateInput!) {
  metaobjectUpdate(id: $id, metaobject: $metaobject) {
    metaobject { id }
    userErrors { field message }
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorEntry {
    message: String,
}

#[derive(Debug, Deserialize)]
struct UserError {
    #[serde(default)]
    field: Option<Vec<String>>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    page_info: PageInfo,
    nodes: Vec<T>,
}

impl<T> Connection<T> {
    fn into_page<U: From<T>>(self) -> Page<U> {
        Page {
            records: self.nodes.into_iter().map(U::from).collect(),
            end_cursor: self.page_info.end_cursor,
            has_more: self.page_info.has_next_page,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValueNode {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkuNode {
    sku: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductNode {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    product_type: String,
    #[serde(default)]
    vendor: String,
    #[serde(default)]
    tags: Vec<String>,
    updated_at: Option<String>,
    variants: Option<Nodes<SkuNode>>,
    ingredient: Option<ValueNode>,
    menu_reference: Option<ValueNode>,
}

impl From<ProductNode> for Product {
    fn from(node: ProductNode) -> Self {
        let metafield = |(namespace, key): (&str, &str), node: Option<ValueNode>| {
            node.map(|n| Metafield {
                namespace: namespace.to_string(),
                key: key.to_string(),
                value: n.value,
            })
        };
        let sku = node
            .variants
            .and_then(|v| v.nodes.into_iter().next())
            .and_then(|v| v.sku)
            .filter(|s| !s.is_empty());

        Self {
            id: node.id,
            title: node.title,
            product_type: node.product_type,
            vendor: node.vendor,
            tags: node.tags,
            sku,
            updated_at: node.updated_at,
            metafields: [
                metafield(INGREDIENT_FIELD, node.ingredient),
                metafield(MENU_REFERENCE_FIELD, node.menu_reference),
            ]
            .into_iter()
            .flatten()
            .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Publishable {
    status: RecordStatus,
}

#[derive(Debug, Deserialize)]
struct Capabilities {
    publishable: Option<Publishable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaobjectNode {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    updated_at: Option<String>,
    capabilities: Option<Capabilities>,
    #[serde(default)]
    fields: Vec<RecordField>,
}

impl From<MetaobjectNode> for MetaobjectRecord {
    fn from(node: MetaobjectNode) -> Self {
        // 沒開 publishable 的 metaobject 一律視為上架
        let status = node
            .capabilities
            .and_then(|c| c.publishable)
            .map(|p| p.status)
            .unwrap_or(RecordStatus::Active);
        Self {
            id: node.id,
            record_type: node.record_type,
            status,
            fields: node.fields,
            updated_at: node.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductsData {
    products: Connection<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct CollectionData {
    collection: Option<CollectionNode>,
}

#[derive(Debug, Deserialize)]
struct CollectionNode {
    products: Connection<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct ProductData {
    product: Option<ProductNode>,
}

#[derive(Debug, Deserialize)]
struct MetaobjectsData {
    metaobjects: Connection<MetaobjectNode>,
}

#[derive(Debug, Deserialize)]
struct MetaobjectData {
    metaobject: Option<MetaobjectNode>,
}

/// Metafield value type Shopify expects for a definition.
fn metafield_type(namespace: &str, key: &str) -> &'static str {
    if (namespace, key) == MENU_REFERENCE_FIELD {
        "metaobject_reference"
    } else {
        "single_line_text_field"
    }
}

#[derive(Debug, Clone)]
pub struct ShopifyClient {
    client: Client,
    endpoint: String,
    access_token: String,
    timeout: Duration,
}

impl ShopifyClient {
    pub fn new(shop: &ShopConfig) -> Result<Self> {
        let access_token = shop
            .access_token()
            .ok_or_else(|| ReconcileError::MissingConfigError {
                field: "shop.access_token".to_string(),
            })?
            .to_string();

        Ok(Self {
            client: Client::new(),
            endpoint: shop.graphql_endpoint(),
            access_token,
            timeout: Duration::from_secs(shop.timeout_seconds),
        })
    }

    pub fn from_config<C: ConfigProvider + ?Sized>(config: &C) -> Result<Self> {
        Self::new(config.shop())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<T> {
        tracing::debug!("🌐 GraphQL {} → {}", operation, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-Shopify-Access-Token", &self.access_token)
            .timeout(self.timeout)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ReconcileError::AuthenticationFailure {
                reason: format!("{} returned {}", operation, status),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReconcileError::TransientFetchFailure {
                target: operation.to_string(),
                message: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            });
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(ReconcileError::GraphQlError {
                message: format!("{}: {}", operation, messages.join("; ")),
            });
        }
        body.data.ok_or_else(|| ReconcileError::GraphQlError {
            message: format!("{}: response has no data", operation),
        })
    }

    /// Runs a mutation and turns `userErrors` into a `RepairFailure`.
    async fn mutate(
        &self,
        operation: &str,
        root: &str,
        target: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value> {
        let data: Value = self.execute(operation, query, variables).await?;
        let payload = data.get(root).cloned().unwrap_or(Value::Null);

        let user_errors: Vec<UserError> = match payload.get("userErrors") {
            Some(errors) => serde_json::from_value(errors.clone())?,
            None => Vec::new(),
        };
        if !user_errors.is_empty() {
            let message = user_errors
                .iter()
                .map(|e| match &e.field {
                    Some(field) => format!("{}: {}", field.join("."), e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ReconcileError::RepairFailure {
                operation: operation.to_string(),
                target: target.to_string(),
                message,
            });
        }
        Ok(payload)
    }

    async fn update_record(&self, record_id: &str, metaobject: Value) -> Result<()> {
        self.mutate(
            "metaobjectUpdate",
            "metaobjectUpdate",
            record_id,
            METAOBJECT_UPDATE,
            json!({ "id": record_id, "metaobject": metaobject }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogQuery for ShopifyClient {
    async fn product_page(&self, page_size: usize, after: Option<String>) -> Result<Page<Product>> {
        let data: ProductsData = self
            .execute(
                "products",
                &format!("{}\n{}", PRODUCTS_QUERY, PRODUCT_FIELDS),
                json!({ "first": page_size, "after": after }),
            )
            .await?;
        Ok(data.products.into_page())
    }

    async fn metaobject_page(
        &self,
        record_type: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<MetaobjectRecord>> {
        let data: MetaobjectsData = self
            .execute(
                "metaobjects",
                &format!("{}\n{}", METAOBJECTS_QUERY, METAOBJECT_FIELDS),
                json!({ "type": record_type, "first": page_size, "after": after }),
            )
            .await?;
        Ok(data.metaobjects.into_page())
    }

    async fn collection_product_page(
        &self,
        collection_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> Result<Page<Product>> {
        let data: CollectionData = self
            .execute(
                "collection",
                &format!("{}\n{}", COLLECTION_PRODUCTS_QUERY, PRODUCT_FIELDS),
                json!({ "id": collection_id, "first": page_size, "after": after }),
            )
            .await?;
        match data.collection {
            Some(collection) => Ok(collection.products.into_page()),
            None => {
                tracing::warn!("⚠️ Collection {} not found", collection_id);
                Ok(Page::last(Vec::new()))
            }
        }
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        let data: ProductData = self
            .execute(
                "product",
                &format!("{}\n{}", PRODUCT_QUERY, PRODUCT_FIELDS),
                json!({ "id": id }),
            )
            .await?;
        Ok(data.product.map(Product::from))
    }

    async fn metaobject(&self, id: &str) -> Result<Option<MetaobjectRecord>> {
        let data: MetaobjectData = self
            .execute(
                "metaobject",
                &format!("{}\n{}", METAOBJECT_QUERY, METAOBJECT_FIELDS),
                json!({ "id": id }),
            )
            .await?;
        Ok(data.metaobject.map(MetaobjectRecord::from))
    }
}

#[async_trait]
impl CatalogMutation for ShopifyClient {
    async fn set_metafield(
        &self,
        owner_id: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        match value {
            Some(value) => {
                self.mutate(
                    "metafieldsSet",
                    "metafieldsSet",
                    owner_id,
                    METAFIELDS_SET,
                    json!({ "metafields": [{
                        "ownerId": owner_id,
                        "namespace": namespace,
                        "key": key,
                        "type": metafield_type(namespace, key),
                        "value": value,
                    }] }),
                )
                .await?;
            }
            None => {
                self.mutate(
                    "metafieldsDelete",
                    "metafieldsDelete",
                    owner_id,
                    METAFIELDS_DELETE,
                    json!({ "metafields": [{
                        "ownerId": owner_id,
                        "namespace": namespace,
                        "key": key,
                    }] }),
                )
                .await?;
            }
        }
        tracing::debug!("✏️ {} {}.{} updated", owner_id, namespace, key);
        Ok(())
    }

    async fn set_record_field(&self, record_id: &str, key: &str, value: Option<&str>) -> Result<()> {
        // metaobject 欄位以空字串清除
        self.update_record(
            record_id,
            json!({ "fields": [{ "key": key, "value": value.unwrap_or("") }] }),
        )
        .await
    }

    async fn create_record(&self, record_type: &str, fields: &[(&str, String)]) -> Result<String> {
        let fields: Vec<Value> = fields
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        let payload = self
            .mutate(
                "metaobjectCreate",
                "metaobjectCreate",
                record_type,
                METAOBJECT_CREATE,
                json!({ "metaobject": {
                    "type": record_type,
                    "fields": fields,
                    "capabilities": { "publishable": { "status": RecordStatus::Active.as_str() } },
                } }),
            )
            .await?;

        payload
            .pointer("/metaobject/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ReconcileError::RepairFailure {
                operation: "metaobjectCreate".to_string(),
                target: record_type.to_string(),
                message: "response did not include the new metaobject id".to_string(),
            })
    }

    async fn set_record_status(&self, record_id: &str, status: RecordStatus) -> Result<()> {
        self.update_record(
            record_id,
            json!({ "capabilities": { "publishable": { "status": status.as_str() } } }),
        )
        .await
    }
}
