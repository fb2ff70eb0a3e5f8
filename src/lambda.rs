#[cfg(feature = "lambda")]
use aws_config::BehaviorVersion;
#[cfg(feature = "lambda")]
use aws_sdk_s3::config::Region;
#[cfg(feature = "lambda")]
use aws_sdk_s3::Client as S3Client;
#[cfg(feature = "lambda")]
use base64::{engine::general_purpose, Engine as _};
#[cfg(feature = "lambda")]
use catalog_reconcile::config::lambda::{LambdaConfig, S3Storage};
#[cfg(feature = "lambda")]
use catalog_reconcile::core::idempotency::StorageIdempotencyStore;
#[cfg(feature = "lambda")]
use catalog_reconcile::core::webhook::{
    WebhookHandler, WebhookRequest, SIGNATURE_HEADER, TOPIC_HEADER,
};
#[cfg(feature = "lambda")]
use catalog_reconcile::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use catalog_reconcile::ShopifyClient;
#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "lambda")]
use std::collections::HashMap;

#[cfg(feature = "lambda")]
type Handler = WebhookHandler<ShopifyClient, StorageIdempotencyStore<S3Storage>, S3Storage>;

/// Lambda function URL request (payload format 2.0).
#[cfg(feature = "lambda")]
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[cfg(feature = "lambda")]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

#[cfg(feature = "lambda")]
impl Request {
    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// HMAC 必須對原始 body 計算，所以先還原 base64
    fn raw_body(&self) -> Result<String, Error> {
        let body = self.body.clone().unwrap_or_default();
        if !self.is_base64_encoded {
            return Ok(body);
        }
        let bytes = general_purpose::STANDARD.decode(body.as_bytes())?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[cfg(feature = "lambda")]
async fn function_handler(handler: &Handler, event: LambdaEvent<Request>) -> Result<Response, Error> {
    let request = event.payload;
    let webhook = WebhookRequest {
        topic: request.header(TOPIC_HEADER).unwrap_or_default(),
        signature: request.header(SIGNATURE_HEADER),
        body: request.raw_body()?,
    };
    tracing::info!("📨 Received {} webhook", webhook.topic);

    let response = handler.handle(&webhook).await;
    tracing::info!(
        "✅ Webhook {} → {:?} ({} actions)",
        webhook.topic,
        response.status,
        response.actions.len()
    );

    Ok(Response {
        status_code: response.status_code(),
        headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: serde_json::to_string(&response)?,
    })
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    let lambda_config = LambdaConfig::from_env()?;
    lambda_config.validate()?;

    // 創建AWS配置和S3客戶端
    let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws)
        .region(Region::new(lambda_config.s3_region.clone()))
        .force_path_style(true)
        .build();
    let storage = S3Storage::new(
        S3Client::from_conf(s3_config),
        lambda_config.s3_bucket.clone(),
        lambda_config.s3_prefix.clone(),
    );

    let handler: Handler = WebhookHandler::new(
        &lambda_config,
        ShopifyClient::from_config(&lambda_config)?,
        StorageIdempotencyStore::new(storage.clone()),
        storage,
    )?;
    let handler = &handler;

    run(service_fn(move |event: LambdaEvent<Request>| async move {
        function_handler(handler, event).await
    }))
    .await
}
