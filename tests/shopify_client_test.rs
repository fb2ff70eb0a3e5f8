use anyhow::Result;
use catalog_reconcile::config::toml_config::ShopConfig;
use catalog_reconcile::core::pagination::fetch_all;
use catalog_reconcile::domain::model::{RecordStatus, INGREDIENT_FIELD, MENU_REFERENCE_FIELD};
use catalog_reconcile::domain::ports::{CatalogMutation, CatalogQuery};
use catalog_reconcile::{ReconcileError, ShopifyClient};
use httpmock::prelude::*;
use serde_json::json;

fn client(server: &MockServer) -> Result<ShopifyClient> {
    let shop = ShopConfig {
        name: "test-shop".to_string(),
        access_token: Some("shpat_test".to_string()),
        endpoint: Some(server.url("/graphql.json")),
        ..ShopConfig::default()
    };
    Ok(ShopifyClient::new(&shop)?)
}

fn product_node(id: &str, title: &str, ingredient: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "productType": "Beverage",
        "vendor": "Test Vendor",
        "tags": ["bar"],
        "updatedAt": "2024-11-01T10:00:00Z",
        "variants": { "nodes": [{ "sku": format!("SKU-{}", title.len()) }] },
        "ingredient": ingredient.map(|v| json!({ "value": v })),
        "menuReference": null
    })
}

#[tokio::test]
async fn test_products_are_fetched_page_by_page() -> Result<()> {
    let server = MockServer::start_async().await;

    // 第一頁
    let first = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .header("x-shopify-access-token", "shpat_test")
                .body_contains("query Products")
                .body_contains("\"after\":null");
            then.status(200).json_body(json!({
                "data": { "products": {
                    "pageInfo": { "hasNextPage": true, "endCursor": "cursor-1" },
                    "nodes": [
                        product_node("gid://shopify/Product/1", "Kava Pour", Some("Kava")),
                        product_node("gid://shopify/Product/2", "Mystery", None)
                    ]
                } }
            }));
        })
        .await;

    // 第二頁
    let second = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .body_contains("query Products")
                .body_contains("\"after\":\"cursor-1\"");
            then.status(200).json_body(json!({
                "data": { "products": {
                    "pageInfo": { "hasNextPage": false, "endCursor": "cursor-2" },
                    "nodes": [product_node("gid://shopify/Product/3", "Kratom Shot", Some("Kratom"))]
                } }
            }));
        })
        .await;

    let client = client(&server)?;
    let products = fetch_all("products", |after| client.product_page(2, after)).await?;

    first.assert_async().await;
    second.assert_async().await;
    assert_eq!(products.len(), 3);
    assert_eq!(products[0].metafield(INGREDIENT_FIELD), Some("Kava"));
    assert_eq!(products[1].metafield(INGREDIENT_FIELD), None);
    assert_eq!(products[2].id, "gid://shopify/Product/3");
    assert_eq!(products[0].sku.as_deref(), Some("SKU-9"));
    Ok(())
}

#[tokio::test]
async fn test_user_errors_become_repair_failures() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .body_contains("metafieldsSet")
                .body_contains("metaobject_reference");
            then.status(200).json_body(json!({
                "data": { "metafieldsSet": {
                    "metafields": [],
                    "userErrors": [{ "field": ["metafields", "0", "value"], "message": "Value must be a metaobject GID" }]
                } }
            }));
        })
        .await;

    let client = client(&server)?;
    let (namespace, key) = MENU_REFERENCE_FIELD;
    let result = client
        .set_metafield("gid://shopify/Product/1", namespace, key, Some("not-a-gid"))
        .await;

    mock.assert_async().await;
    match result {
        Err(ReconcileError::RepairFailure {
            operation,
            target,
            message,
        }) => {
            assert_eq!(operation, "metafieldsSet");
            assert_eq!(target, "gid://shopify/Product/1");
            assert!(message.contains("metafields.0.value"));
        }
        other => panic!("expected RepairFailure, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_clearing_a_metafield_deletes_it() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .body_contains("metafieldsDelete");
            then.status(200).json_body(json!({
                "data": { "metafieldsDelete": {
                    "deletedMetafields": [{ "key": "menu_reference" }],
                    "userErrors": []
                } }
            }));
        })
        .await;

    let client = client(&server)?;
    let (namespace, key) = MENU_REFERENCE_FIELD;
    client
        .set_metafield("gid://shopify/Product/1", namespace, key, None)
        .await?;

    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_is_authentication_failure() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql.json");
            then.status(401).body("[API] Invalid API key or access token");
        })
        .await;

    let client = client(&server)?;
    let result = client.product("gid://shopify/Product/1").await;
    assert!(matches!(result, Err(ReconcileError::AuthenticationFailure { .. })));
    Ok(())
}

#[tokio::test]
async fn test_server_error_is_transient() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql.json");
            then.status(502).body("Bad Gateway");
        })
        .await;

    let client = client(&server)?;
    let result = client.metaobject_page("bar_menu_item", 50, None).await;
    assert!(matches!(result, Err(ReconcileError::TransientFetchFailure { .. })));
    Ok(())
}

#[tokio::test]
async fn test_graphql_errors_are_surfaced() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql.json");
            then.status(200).json_body(json!({
                "errors": [{ "message": "Throttled" }]
            }));
        })
        .await;

    let client = client(&server)?;
    match client.product_page(50, None).await {
        Err(ReconcileError::GraphQlError { message }) => assert!(message.contains("Throttled")),
        other => panic!("expected GraphQlError, got {:?}", other.map(|p| p.records.len())),
    }
    Ok(())
}

#[tokio::test]
async fn test_missing_records_are_none() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql.json").body_contains("query Metaobject(");
            then.status(200).json_body(json!({ "data": { "metaobject": null } }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/graphql.json").body_contains("query CollectionProducts");
            then.status(200).json_body(json!({ "data": { "collection": null } }));
        })
        .await;

    let client = client(&server)?;
    assert!(client.metaobject("gid://shopify/Metaobject/404").await?.is_none());

    let page = client
        .collection_product_page("gid://shopify/Collection/404", 50, None)
        .await?;
    assert!(page.records.is_empty());
    assert!(!page.has_more);
    Ok(())
}

#[tokio::test]
async fn test_menu_items_are_created_active() -> Result<()> {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .body_contains("metaobjectCreate")
                .body_contains("\"status\":\"ACTIVE\"");
            then.status(200).json_body(json!({
                "data": { "metaobjectCreate": {
                    "metaobject": { "id": "gid://shopify/Metaobject/77" },
                    "userErrors": []
                } }
            }));
        })
        .await;
    let archive = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/graphql.json")
                .body_contains("metaobjectUpdate")
                .body_contains("\"status\":\"DRAFT\"");
            then.status(200).json_body(json!({
                "data": { "metaobjectUpdate": {
                    "metaobject": { "id": "gid://shopify/Metaobject/77" },
                    "userErrors": []
                } }
            }));
        })
        .await;

    let client = client(&server)?;
    let id = client
        .create_record(
            "bar_menu_item",
            &[
                ("product_reference", "gid://shopify/Product/1".to_string()),
                ("card_type", "draft".to_string()),
            ],
        )
        .await?;
    assert_eq!(id, "gid://shopify/Metaobject/77");

    client.set_record_status(&id, RecordStatus::Draft).await?;

    create.assert_async().await;
    archive.assert_async().await;
    Ok(())
}
