//! Near-real-time catalog updates driven by Shopify webhooks.
//!
//! Every delivery is authenticated, deduplicated on `<id>:<updated_at>` and
//! then dispatched by topic. A delivery key is only recorded after every
//! catalog write of the event succeeded, so a failed delivery is retried by
//! the platform.

use crate::core::classifier::HeuristicClassifier;
use crate::core::exec_log::ExecutionLog;
use crate::core::idempotency::IdempotencyStore;
use crate::core::menu_scan::{MenuIntegrityScan, MENU_CACHE_PATH};
use crate::core::pagination::fetch_all;
use crate::core::scan::{Scan, ScanOutput};
use crate::domain::model::{
    Ingredient, Layer, Product, RecordStatus, INGREDIENT_FIELD, MENU_REFERENCE_FIELD,
};
use crate::domain::ports::{Catalog, ConfigProvider, Storage};
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::{ReconcileError, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::Sha256;
use std::future::Future;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";
pub const TOPIC_HEADER: &str = "x-shopify-topic";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTopic {
    ProductCreate,
    ProductUpdate,
    MetaobjectCreate,
    MetaobjectUpdate,
    CollectionUpdate,
}

impl WebhookTopic {
    /// Accepts both `products/create` and `product_create`.
    pub fn parse(topic: &str) -> Option<Self> {
        match topic.trim().to_lowercase().as_str() {
            "products/create" | "product_create" => Some(Self::ProductCreate),
            "products/update" | "product_update" => Some(Self::ProductUpdate),
            "metaobjects/create" | "metaobject_create" => Some(Self::MetaobjectCreate),
            "metaobjects/update" | "metaobject_update" => Some(Self::MetaobjectUpdate),
            "collections/update" | "collection_update" => Some(Self::CollectionUpdate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductCreate => "products/create",
            Self::ProductUpdate => "products/update",
            Self::MetaobjectCreate => "metaobjects/create",
            Self::MetaobjectUpdate => "metaobjects/update",
            Self::CollectionUpdate => "collections/update",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TagsField {
    List(Vec<String>),
    Text(String),
}

/// Tags arrive as a JSON list or as one comma-separated string.
fn deserialize_tags<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tags = match Option::<TagsField>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TagsField::List(tags)) => tags,
        Some(TagsField::Text(text)) => text.split(',').map(str::to_string).collect(),
    };
    Ok(tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

/// Prefers `admin_graphql_api_id`; numeric REST ids become GIDs.
fn entity_gid(resource: &str, api_id: &Option<String>, id: &Value) -> Option<String> {
    if let Some(gid) = api_id.as_deref().filter(|s| !s.is_empty()) {
        return Some(gid.to_string());
    }
    match id {
        Value::String(s) if s.starts_with("gid://") => Some(s.clone()),
        Value::String(s) if !s.is_empty() => Some(format!("gid://shopify/{}/{}", resource, s)),
        Value::Number(n) => Some(format!("gid://shopify/{}/{}", resource, n)),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub admin_graphql_api_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ProductPayload {
    pub fn gid(&self) -> Option<String> {
        entity_gid("Product", &self.admin_graphql_api_id, &self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaobjectPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub admin_graphql_api_id: Option<String>,
    #[serde(default, rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl MetaobjectPayload {
    pub fn gid(&self) -> Option<String> {
        entity_gid("Metaobject", &self.admin_graphql_api_id, &self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionPayload {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub admin_graphql_api_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl CollectionPayload {
    pub fn gid(&self) -> Option<String> {
        entity_gid("Collection", &self.admin_graphql_api_id, &self.id)
    }
}

#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub topic: String,
    pub signature: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Processed,
    Skipped,
    Ignored,
    Rejected,
    Failed,
}

/// One catalog mutation (or review request) attempted for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub action: String,
    pub target: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Action {
    fn noted(action: &str, target: &str, detail: Option<String>) -> Self {
        Self {
            action: action.to_string(),
            target: target.to_string(),
            ok: true,
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: WebhookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingredient: Option<Ingredient>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl WebhookResponse {
    fn with_status(status: WebhookStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            layer: None,
            ingredient: None,
            actions: Vec::new(),
        }
    }

    fn processed(actions: Vec<Action>) -> Self {
        Self {
            status: WebhookStatus::Processed,
            reason: None,
            layer: None,
            ingredient: None,
            actions,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self.status {
            WebhookStatus::Processed | WebhookStatus::Skipped | WebhookStatus::Ignored => 200,
            WebhookStatus::Rejected => 401,
            WebhookStatus::Failed => 500,
        }
    }
}

/// base64(HMAC-SHA256(secret, body)), as sent in `X-Shopify-Hmac-Sha256`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ReconcileError::config(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a base64 signature.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn parse_payload<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| ReconcileError::PayloadError {
        message: e.to_string(),
    })
}

/// Runs one mutation and records it as an action. A failure is recorded, not
/// propagated, so the remaining actions still run.
async fn act<F>(actions: &mut Vec<Action>, action: &str, target: &str, write: F) -> bool
where
    F: Future<Output = Result<()>>,
{
    let (ok, detail) = match write.await {
        Ok(()) => (true, None),
        Err(e) => {
            tracing::error!("❌ {} on {} failed: {}", action, target, e);
            (false, Some(e.to_string()))
        }
    };
    actions.push(Action {
        action: action.to_string(),
        target: target.to_string(),
        ok,
        detail,
    });
    ok
}

pub struct WebhookHandler<C: Catalog, I: IdempotencyStore, S: Storage> {
    catalog: C,
    idempotency: I,
    storage: S,
    classifier: HeuristicClassifier,
    taxonomy: Taxonomy,
    secret: Option<String>,
    menu_item_type: String,
    page_size: usize,
}

impl<C: Catalog, I: IdempotencyStore, S: Storage> WebhookHandler<C, I, S> {
    pub fn new<P: ConfigProvider + ?Sized>(
        config: &P,
        catalog: C,
        idempotency: I,
        storage: S,
    ) -> Result<Self> {
        Ok(Self {
            catalog,
            idempotency,
            storage,
            classifier: HeuristicClassifier::from_config(config)?,
            taxonomy: config.taxonomy().clone(),
            secret: config.webhook_secret().map(str::to_string),
            menu_item_type: config.shop().menu_item_type.clone(),
            page_size: config.shop().page_size,
        })
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn idempotency(&self) -> &I {
        &self.idempotency
    }

    pub async fn handle(&self, request: &WebhookRequest) -> WebhookResponse {
        let secret = match self.secret.as_deref() {
            Some(secret) => secret,
            None => {
                tracing::error!("❌ Webhook secret is not configured, rejecting delivery");
                return WebhookResponse::with_status(
                    WebhookStatus::Rejected,
                    "webhook secret not configured",
                );
            }
        };
        let authentic = request
            .signature
            .as_deref()
            .is_some_and(|sig| verify_signature(secret, request.body.as_bytes(), sig));
        if !authentic {
            tracing::warn!("🔒 Rejected {} delivery: bad or missing signature", request.topic);
            return WebhookResponse::with_status(WebhookStatus::Rejected, "invalid signature");
        }

        let Some(topic) = WebhookTopic::parse(&request.topic) else {
            tracing::info!("⏭️ Ignoring unsupported topic {}", request.topic);
            return WebhookResponse::with_status(
                WebhookStatus::Ignored,
                format!("unsupported topic {}", request.topic),
            );
        };

        tracing::info!("📨 Webhook {}", topic.as_str());
        let result = match topic {
            WebhookTopic::ProductCreate | WebhookTopic::ProductUpdate => {
                match parse_payload::<ProductPayload>(&request.body) {
                    Ok(payload) => {
                        let key = payload.gid().zip(payload.updated_at.clone());
                        self.deduplicated(key, async {
                            if topic == WebhookTopic::ProductCreate {
                                self.product_created(&payload).await
                            } else {
                                self.product_updated(&payload).await
                            }
                        })
                        .await
                    }
                    Err(e) => Err(e),
                }
            }
            WebhookTopic::MetaobjectCreate | WebhookTopic::MetaobjectUpdate => {
                match parse_payload::<MetaobjectPayload>(&request.body) {
                    Ok(payload) => {
                        let key = payload.gid().zip(payload.updated_at.clone());
                        self.deduplicated(key, self.metaobject_changed(&payload)).await
                    }
                    Err(e) => Err(e),
                }
            }
            WebhookTopic::CollectionUpdate => {
                match parse_payload::<CollectionPayload>(&request.body) {
                    Ok(payload) => {
                        let key = payload.gid().zip(payload.updated_at.clone());
                        self.deduplicated(key, self.collection_updated(&payload)).await
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(response) => response,
            // 格式錯誤的 payload 重送也不會變好，回 200 避免無限重試
            Err(ReconcileError::PayloadError { message }) => {
                tracing::error!("❌ Malformed {} payload: {}", topic.as_str(), message);
                WebhookResponse::with_status(
                    WebhookStatus::Ignored,
                    format!("malformed payload: {}", message),
                )
            }
            Err(e) => {
                tracing::error!("❌ {} failed: {}", topic.as_str(), e);
                WebhookResponse::with_status(WebhookStatus::Failed, e.user_friendly_message())
            }
        }
    }

    /// `key` is `(entity id, updated_at)`; without it the event is processed
    /// but cannot be deduplicated.
    async fn deduplicated<F>(&self, key: Option<(String, String)>, process: F) -> Result<WebhookResponse>
    where
        F: Future<Output = Result<WebhookResponse>>,
    {
        let key = key.map(|(id, updated_at)| format!("{}:{}", id, updated_at));
        match &key {
            Some(key) => match self.idempotency.seen(key).await {
                Ok(true) => {
                    tracing::info!("⏭️ Duplicate delivery {}", key);
                    return Ok(WebhookResponse::with_status(WebhookStatus::Skipped, "duplicate"));
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("⚠️ Idempotency lookup failed for {}: {}", key, e),
            },
            None => tracing::warn!("⚠️ Payload has no id/updated_at, deduplication skipped"),
        }

        let response = process.await?;

        // 任何寫入失敗都回 500 且不記錄 key，讓平台重送
        let failed: Vec<String> = response
            .actions
            .iter()
            .filter(|a| !a.ok)
            .map(|a| a.action.clone())
            .collect();
        if !failed.is_empty() {
            let failed = failed.join(", ");
            tracing::warn!("🔁 Catalog writes failed ({}), leaving delivery open", failed);
            return Ok(WebhookResponse {
                status: WebhookStatus::Failed,
                reason: Some(format!("catalog writes failed: {}", failed)),
                ..response
            });
        }

        if let Some(key) = &key {
            if let Err(e) = self.idempotency.record(key).await {
                tracing::warn!("⚠️ Could not record delivery {}: {}", key, e);
            }
        }
        Ok(response)
    }

    async fn product_created(&self, payload: &ProductPayload) -> Result<WebhookResponse> {
        let product_id = payload.gid().ok_or_else(|| ReconcileError::PayloadError {
            message: "product payload has no id".to_string(),
        })?;
        let product = Product {
            id: product_id.clone(),
            title: payload.title.clone(),
            product_type: payload.product_type.clone(),
            vendor: payload.vendor.clone(),
            tags: payload.tags.clone(),
            ..Product::default()
        };
        let classification = self.classifier.classify(product.text());
        let mut actions = Vec::new();

        match &classification.ingredient {
            Ingredient::Known(ingredient) => {
                let (namespace, key) = INGREDIENT_FIELD;
                act(
                    &mut actions,
                    "set_ingredient",
                    &product_id,
                    self.catalog
                        .set_metafield(&product_id, namespace, key, Some(ingredient.as_str())),
                )
                .await;
            }
            Ingredient::NeedsReview => actions.push(self.queue_review(&product)),
        }

        if classification.layer == Layer::Bar {
            // 重送時品項可能已建立並連結
            let linked = self
                .catalog
                .product(&product_id)
                .await?
                .and_then(|p| p.metafield(MENU_REFERENCE_FIELD).map(str::to_string));
            match linked {
                Some(menu_item_id) => {
                    tracing::info!("⏭️ {} already linked to {}", product.title, menu_item_id);
                }
                None => {
                    let card_type = classification
                        .card_type
                        .clone()
                        .unwrap_or_else(|| self.taxonomy.default_card_type.clone());
                    self.create_menu_item(&product, &card_type, &mut actions).await;
                }
            }
        }

        tracing::info!(
            "✅ {} classified as {} / {}",
            product.title,
            classification.layer,
            classification.ingredient
        );
        Ok(WebhookResponse {
            layer: Some(classification.layer),
            ingredient: Some(classification.ingredient),
            ..WebhookResponse::processed(actions)
        })
    }

    async fn product_updated(&self, payload: &ProductPayload) -> Result<WebhookResponse> {
        let product_id = payload.gid().ok_or_else(|| ReconcileError::PayloadError {
            message: "product payload has no id".to_string(),
        })?;
        // 以目前商品狀態為準；取不到就回 500 讓平台重送
        let product = match self.catalog.product(&product_id).await? {
            Some(product) => product,
            None => {
                return Ok(WebhookResponse::with_status(
                    WebhookStatus::Ignored,
                    format!("product {} no longer exists", product_id),
                ))
            }
        };

        let classification = self.classifier.classify(product.text());
        let mut actions = Vec::new();

        match &classification.ingredient {
            Ingredient::Known(ingredient)
                if product.metafield(INGREDIENT_FIELD) != Some(ingredient.as_str()) =>
            {
                let (namespace, key) = INGREDIENT_FIELD;
                act(
                    &mut actions,
                    "set_ingredient",
                    &product.id,
                    self.catalog
                        .set_metafield(&product.id, namespace, key, Some(ingredient.as_str())),
                )
                .await;
            }
            Ingredient::NeedsReview if product.metafield(INGREDIENT_FIELD).is_none() => {
                actions.push(self.queue_review(&product));
            }
            _ => {}
        }

        let current_reference = product.metafield(MENU_REFERENCE_FIELD);
        match (current_reference, classification.layer) {
            (None, Layer::Bar) => {
                let card_type = classification
                    .card_type
                    .clone()
                    .unwrap_or_else(|| self.taxonomy.default_card_type.clone());
                self.create_menu_item(&product, &card_type, &mut actions).await;
            }
            (Some(menu_item_id), Layer::TakeHome) => {
                // 下架只改狀態為 DRAFT，不刪除
                act(
                    &mut actions,
                    "archive_menu_item",
                    menu_item_id,
                    self.catalog.set_record_status(menu_item_id, RecordStatus::Draft),
                )
                .await;
                let (namespace, key) = MENU_REFERENCE_FIELD;
                act(
                    &mut actions,
                    "unlink_menu_item",
                    &product.id,
                    self.catalog.set_metafield(&product.id, namespace, key, None),
                )
                .await;
            }
            _ => {}
        }

        Ok(WebhookResponse {
            layer: Some(classification.layer),
            ingredient: Some(classification.ingredient),
            ..WebhookResponse::processed(actions)
        })
    }

    async fn metaobject_changed(&self, payload: &MetaobjectPayload) -> Result<WebhookResponse> {
        if payload.record_type != self.menu_item_type {
            return Ok(WebhookResponse::with_status(
                WebhookStatus::Ignored,
                format!("metaobject type {} is not tracked", payload.record_type),
            ));
        }

        // 只重建快取；夜間掃描的報告與執行紀錄不動
        let scan = MenuIntegrityScan::new(
            &self.catalog,
            &self.taxonomy,
            &self.menu_item_type,
            self.page_size,
            false,
        );
        let records = scan.snapshot().await?;
        let mut log = ExecutionLog::new();
        let output = scan.reconcile(records, &mut log).await;
        for artifact in output.artifacts()? {
            self.storage.write_file(&artifact.path, &artifact.data).await?;
        }

        tracing::info!("🗂️ Menu cache rebuilt with {} items", output.cache.total_items);
        Ok(WebhookResponse::processed(vec![Action::noted(
            "rebuild_bar_menu_cache",
            MENU_CACHE_PATH,
            Some(format!("{} items", output.cache.total_items)),
        )]))
    }

    async fn collection_updated(&self, payload: &CollectionPayload) -> Result<WebhookResponse> {
        let collection_id = payload.gid().ok_or_else(|| ReconcileError::PayloadError {
            message: "collection payload has no id".to_string(),
        })?;
        let products = fetch_all("collection products", |after| {
            self.catalog
                .collection_product_page(&collection_id, self.page_size, after)
        })
        .await?;

        let mut actions = Vec::new();
        for product in products
            .iter()
            .filter(|p| p.metafield(INGREDIENT_FIELD).is_none())
        {
            match self.classifier.classify(product.text()).ingredient {
                Ingredient::Known(ingredient) => {
                    let (namespace, key) = INGREDIENT_FIELD;
                    act(
                        &mut actions,
                        "backfill_ingredient",
                        &product.id,
                        self.catalog
                            .set_metafield(&product.id, namespace, key, Some(ingredient.as_str())),
                    )
                    .await;
                }
                Ingredient::NeedsReview => actions.push(self.queue_review(product)),
            }
        }

        tracing::info!(
            "✅ Collection {}: {} of {} products needed an ingredient",
            collection_id,
            actions.len(),
            products.len()
        );
        Ok(WebhookResponse::processed(actions))
    }

    /// Creates an ACTIVE menu item for the product and links it back.
    async fn create_menu_item(&self, product: &Product, card_type: &str, actions: &mut Vec<Action>) {
        let fields = [
            ("product_reference", product.id.clone()),
            ("menu_label", product.title.clone()),
            ("card_type", card_type.to_string()),
            ("display_order", self.taxonomy.default_display_order.to_string()),
            ("seasonal_flag", "false".to_string()),
        ];

        let menu_item_id = match self
            .catalog
            .create_record(&self.menu_item_type, &fields)
            .await
        {
            Ok(id) => {
                actions.push(Action::noted("create_menu_item", &id, None));
                id
            }
            Err(e) => {
                tracing::error!("❌ create_menu_item for {} failed: {}", product.id, e);
                actions.push(Action {
                    action: "create_menu_item".to_string(),
                    target: product.id.clone(),
                    ok: false,
                    detail: Some(e.to_string()),
                });
                return;
            }
        };

        let (namespace, key) = MENU_REFERENCE_FIELD;
        act(
            actions,
            "link_menu_item",
            &product.id,
            self.catalog
                .set_metafield(&product.id, namespace, key, Some(menu_item_id.as_str())),
        )
        .await;
    }

    fn queue_review(&self, product: &Product) -> Action {
        tracing::info!("👀 {} queued for manual ingredient review", product.title);
        Action::noted("queue_review", &product.id, Some(product.title.clone()))
    }
}
