use anyhow::Result;
use async_trait::async_trait;
use catalog_reconcile::adapters::memory::{CatalogSnapshot, MemoryCatalog};
use catalog_reconcile::core::menu_scan::{MenuCache, MENU_CACHE_PATH};
use catalog_reconcile::core::metafield_scan::{IngredientEntry, INGREDIENT_MAP_PATH};
use catalog_reconcile::core::scan::{latest_report_path, ScanOutput};
use catalog_reconcile::domain::issue::{FixKind, IssueKind, ScanReport, ScanStatus};
use catalog_reconcile::domain::model::{
    Metafield, MetaobjectRecord, Product, RecordStatus, MENU_REFERENCE_FIELD,
};
use catalog_reconcile::domain::ports::{CatalogMutation, CatalogQuery, Page, Storage};
use catalog_reconcile::domain::taxonomy::Taxonomy;
use catalog_reconcile::{
    LocalStorage, MenuIntegrityScan, MetafieldConsistencyScan, ReconcileError, ScanEngine,
};
use std::collections::BTreeMap;
use tempfile::TempDir;

const MENU_TYPE: &str = "bar_menu_item";

fn product(id: &str, title: &str, ingredient: Option<&str>, menu_reference: Option<&str>) -> Product {
    let mut metafields = Vec::new();
    if let Some(value) = ingredient {
        metafields.push(Metafield {
            namespace: "inventory".to_string(),
            key: "active_ingredient".to_string(),
            value: Some(value.to_string()),
        });
    }
    if let Some(value) = menu_reference {
        metafields.push(Metafield {
            namespace: "bar".to_string(),
            key: "menu_reference".to_string(),
            value: Some(value.to_string()),
        });
    }
    Product {
        id: id.to_string(),
        title: title.to_string(),
        sku: Some(format!("SKU-{}", id)),
        metafields,
        ..Product::default()
    }
}

fn menu_item(
    id: &str,
    product_id: &str,
    card_type: Option<&str>,
    display_order: Option<&str>,
) -> MetaobjectRecord {
    let mut record = MetaobjectRecord {
        id: id.to_string(),
        record_type: MENU_TYPE.to_string(),
        ..MetaobjectRecord::default()
    };
    record.set_field("product_reference", Some(product_id.to_string()));
    record.set_field("menu_label", Some(format!("Label {}", id)));
    record.set_field("card_type", card_type.map(str::to_string));
    record.set_field("display_order", display_order.map(str::to_string));
    record
}

fn storage(temp_dir: &TempDir) -> LocalStorage {
    LocalStorage::new(temp_dir.path().to_str().unwrap().to_string())
}

async fn read_json<T: serde::de::DeserializeOwned>(storage: &LocalStorage, path: &str) -> Result<T> {
    Ok(serde_json::from_slice(&storage.read_file(path).await?)?)
}

/// Delegates to a `MemoryCatalog` but can fail selected calls.
#[derive(Default)]
struct FlakyCatalog {
    inner: MemoryCatalog,
    fail_listing: bool,
    fail_metaobject_fetch: bool,
    fail_product_fetch: bool,
    fail_writes: bool,
}

fn transient(target: &str) -> ReconcileError {
    ReconcileError::TransientFetchFailure {
        target: target.to_string(),
        message: "connection reset".to_string(),
    }
}

fn rejected(operation: &str, target: &str) -> ReconcileError {
    ReconcileError::RepairFailure {
        operation: operation.to_string(),
        target: target.to_string(),
        message: "ACCESS_DENIED".to_string(),
    }
}

#[async_trait]
impl CatalogQuery for FlakyCatalog {
    async fn product_page(&self, page_size: usize, after: Option<String>) -> catalog_reconcile::Result<Page<Product>> {
        if self.fail_listing && after.is_some() {
            return Err(transient("products"));
        }
        self.inner.product_page(page_size, after).await
    }

    async fn metaobject_page(
        &self,
        record_type: &str,
        page_size: usize,
        after: Option<String>,
    ) -> catalog_reconcile::Result<Page<MetaobjectRecord>> {
        if self.fail_listing {
            return Err(transient("metaobjects"));
        }
        self.inner.metaobject_page(record_type, page_size, after).await
    }

    async fn collection_product_page(
        &self,
        collection_id: &str,
        page_size: usize,
        after: Option<String>,
    ) -> catalog_reconcile::Result<Page<Product>> {
        self.inner
            .collection_product_page(collection_id, page_size, after)
            .await
    }

    async fn product(&self, id: &str) -> catalog_reconcile::Result<Option<Product>> {
        if self.fail_product_fetch {
            return Err(transient(id));
        }
        self.inner.product(id).await
    }

    async fn metaobject(&self, id: &str) -> catalog_reconcile::Result<Option<MetaobjectRecord>> {
        if self.fail_metaobject_fetch {
            return Err(transient(id));
        }
        self.inner.metaobject(id).await
    }
}

#[async_trait]
impl CatalogMutation for FlakyCatalog {
    async fn set_metafield(
        &self,
        owner_id: &str,
        namespace: &str,
        key: &str,
        value: Option<&str>,
    ) -> catalog_reconcile::Result<()> {
        if self.fail_writes {
            return Err(rejected("metafieldsDelete", owner_id));
        }
        self.inner.set_metafield(owner_id, namespace, key, value).await
    }

    async fn set_record_field(&self, record_id: &str, key: &str, value: Option<&str>) -> catalog_reconcile::Result<()> {
        if self.fail_writes {
            return Err(rejected("metaobjectUpdate", record_id));
        }
        self.inner.set_record_field(record_id, key, value).await
    }

    async fn create_record(&self, record_type: &str, fields: &[(&str, String)]) -> catalog_reconcile::Result<String> {
        self.inner.create_record(record_type, fields).await
    }

    async fn set_record_status(&self, record_id: &str, status: RecordStatus) -> catalog_reconcile::Result<()> {
        self.inner.set_record_status(record_id, status).await
    }
}

fn metafield_catalog() -> CatalogSnapshot {
    let mut draft_item = menu_item("m2", "p5", Some("can"), None);
    draft_item.status = RecordStatus::Draft;

    CatalogSnapshot {
        products: vec![
            product("p1", "Fiji Kava Pour", Some("Kava"), Some("m1")),
            product("p2", "Mystery Tin", None, None),
            product("p3", "Gift Box", Some("needs_review"), None),
            product("p4", "Delta-8 Seltzer", Some("THC"), Some("m-deleted")),
            product("p5", "Kratom Can", Some("Kratom"), Some("m2")),
        ],
        metaobjects: vec![menu_item("m1", "p1", Some("draft"), Some("1")), draft_item],
        collections: BTreeMap::new(),
    }
}

#[tokio::test]
async fn test_metafield_scan_reports_and_repairs() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(metafield_catalog());
    let taxonomy = Taxonomy::default();

    let scan = MetafieldConsistencyScan::new(&catalog, &taxonomy, 2, true);
    let output = ScanEngine::new(scan, &storage).run().await?;
    let report = output.report();

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.count("products"), 5);
    assert_eq!(report.count("valid_ingredients"), 3);
    assert_eq!(report.count("valid_bar_references"), 1);
    assert_eq!(report.count("needs_review"), 1);

    let counts = report.issue_counts();
    assert_eq!(counts[&IssueKind::MissingIngredient], 1);
    assert_eq!(counts[&IssueKind::InvalidIngredient], 1);
    assert_eq!(counts[&IssueKind::StaleBarReference], 2);
    assert_eq!(report.fix_counts()[&FixKind::ClearedStaleReference], 2);

    // needs_review 不會被自動修復
    let p3 = catalog.product("p3").await?.unwrap();
    assert_eq!(p3.metafield(("inventory", "active_ingredient")), Some("needs_review"));
    let p4 = catalog.product("p4").await?.unwrap();
    assert_eq!(p4.metafield(MENU_REFERENCE_FIELD), None);

    let ingredient_map: BTreeMap<String, IngredientEntry> =
        read_json(&storage, INGREDIENT_MAP_PATH).await?;
    assert_eq!(ingredient_map.len(), 3);
    assert_eq!(ingredient_map["p1"].ingredient, "Kava");
    assert_eq!(ingredient_map["p1"].sku, "SKU-p1");

    let saved: ScanReport =
        read_json(&storage, &latest_report_path("metafield_consistency_scan")).await?;
    assert_eq!(saved.issues.len(), report.issues.len());
    Ok(())
}

#[tokio::test]
async fn test_metafield_scan_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(metafield_catalog());
    let taxonomy = Taxonomy::default();

    let first = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 50, true), &storage)
        .run()
        .await?;
    assert_eq!(first.report().fixes.len(), 2);
    let writes_after_first = catalog.mutation_count().await;

    let second = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 50, true), &storage)
        .run()
        .await?;
    assert!(second.report().fixes.is_empty());
    assert_eq!(second.report().issues_of(IssueKind::StaleBarReference).count(), 0);
    assert_eq!(catalog.mutation_count().await, writes_after_first);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_never_writes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(metafield_catalog());
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 50, false), &storage)
        .run()
        .await?;

    assert_eq!(output.report().issues_of(IssueKind::StaleBarReference).count(), 2);
    assert!(output.report().fixes.is_empty());
    assert_eq!(catalog.mutation_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_metaobject_fetch_error_skips_reference_check() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = FlakyCatalog {
        inner: MemoryCatalog::new(metafield_catalog()),
        fail_metaobject_fetch: true,
        ..FlakyCatalog::default()
    };
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 50, true), &storage)
        .run()
        .await?;
    let report = output.report();

    assert_eq!(report.count("skipped"), 3);
    assert_eq!(report.count("valid_bar_references"), 0);
    assert_eq!(report.issues_of(IssueKind::StaleBarReference).count(), 0);
    assert!(report.fixes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_repair_is_reported_not_retried() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = FlakyCatalog {
        inner: MemoryCatalog::new(metafield_catalog()),
        fail_writes: true,
        ..FlakyCatalog::default()
    };
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 50, true), &storage)
        .run()
        .await?;
    let report = output.report();

    assert_eq!(report.issues_of(IssueKind::StaleBarReference).count(), 2);
    assert_eq!(report.issues_of(IssueKind::RepairFailed).count(), 2);
    assert!(report.fixes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_partial_listing_aborts_scan() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = FlakyCatalog {
        inner: MemoryCatalog::new(metafield_catalog()),
        fail_listing: true,
        ..FlakyCatalog::default()
    };
    let taxonomy = Taxonomy::default();

    // 第二頁失敗：不可用第一頁的部分資料繼續
    let result = ScanEngine::new(MetafieldConsistencyScan::new(&catalog, &taxonomy, 2, true), &storage)
        .run()
        .await;
    assert!(matches!(result, Err(ReconcileError::SnapshotUnavailable { .. })));
    assert_eq!(catalog.inner.mutation_count().await, 0);

    let saved: ScanReport =
        read_json(&storage, &latest_report_path("metafield_consistency_scan")).await?;
    assert_eq!(saved.status, ScanStatus::Aborted);
    assert!(saved.issues.is_empty());
    assert!(saved.summary.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_card_type_round_trip() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(CatalogSnapshot {
        products: vec![product("p1", "Kava Pour", Some("Kava"), Some("m1"))],
        metaobjects: vec![menu_item("m1", "p1", Some("bottle"), Some("2"))],
        collections: BTreeMap::new(),
    });
    let taxonomy = Taxonomy::default();

    let first = ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 50, true),
        &storage,
    )
    .run()
    .await?;
    assert_eq!(first.report().issues_of(IssueKind::InvalidCardType).count(), 1);
    assert_eq!(first.report().fix_counts()[&FixKind::NormalizedCardType], 1);

    let record = catalog.metaobject("m1").await?.unwrap();
    assert_eq!(record.field("card_type"), Some("draft"));

    let second = ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 50, true),
        &storage,
    )
    .run()
    .await?;
    assert!(second.report().issues.is_empty());
    assert!(second.report().fixes.is_empty());
    assert_eq!(second.cache.bucket("draft").len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_menu_cache_order_is_published() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(CatalogSnapshot {
        products: vec![
            product("pa", "A", Some("Kava"), Some("A")),
            product("pb", "B", Some("Kava"), Some("B")),
            product("pc", "C", Some("Kava"), Some("C")),
        ],
        metaobjects: vec![
            menu_item("A", "pa", Some("can"), Some("5")),
            menu_item("B", "pb", Some("can"), Some("1")),
            menu_item("C", "pc", Some("can"), Some("3")),
        ],
        collections: BTreeMap::new(),
    });
    let taxonomy = Taxonomy::default();

    ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 2, true),
        &storage,
    )
    .run()
    .await?;

    let cache: MenuCache = read_json(&storage, MENU_CACHE_PATH).await?;
    let order: Vec<&str> = cache
        .bucket("can")
        .iter()
        .map(|entry| entry.metaobject_id.as_str())
        .collect();
    assert_eq!(order, vec!["B", "C", "A"]);
    assert_eq!(cache.total_items, 3);
    assert!(cache.bucket("draft").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_deleted_product_reference_is_reported_not_fixed() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = MemoryCatalog::new(CatalogSnapshot {
        products: vec![product("p1", "Kava Pour", Some("Kava"), Some("m1"))],
        metaobjects: vec![
            menu_item("m1", "p1", Some("draft"), Some("1")),
            menu_item("m9", "p-deleted", Some("draft"), Some("2")),
        ],
        collections: BTreeMap::new(),
    });
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 50, true),
        &storage,
    )
    .run()
    .await?;
    let report = output.report();

    let invalid: Vec<_> = report.issues_of(IssueKind::InvalidProductReference).collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].entity_id, "m9");
    assert!(report.fixes.is_empty());
    assert_eq!(catalog.mutation_count().await, 0);

    let cached: Vec<&str> = output
        .cache
        .bucket("draft")
        .iter()
        .map(|entry| entry.metaobject_id.as_str())
        .collect();
    assert_eq!(cached, vec!["m1"]);
    Ok(())
}

#[tokio::test]
async fn test_menu_dry_run_normalizes_cache_only() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let mut item = menu_item("m1", "p1", Some("bottle"), Some("first"));
    item.set_field("keg_status", Some("overflowing".to_string()));
    let mut archived = menu_item("m2", "p1", Some("can"), Some("1"));
    archived.status = RecordStatus::Draft;

    let catalog = MemoryCatalog::new(CatalogSnapshot {
        products: vec![product("p1", "Kava Pour", Some("Kava"), Some("m1"))],
        metaobjects: vec![item, archived],
        collections: BTreeMap::new(),
    });
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 50, false),
        &storage,
    )
    .run()
    .await?;
    let report = output.report();

    assert_eq!(report.count("archived"), 1);
    assert_eq!(report.count("valid_items"), 1);
    assert_eq!(report.issues_of(IssueKind::InvalidCardType).count(), 1);
    assert_eq!(report.issues_of(IssueKind::InvalidKegStatus).count(), 1);
    assert_eq!(report.issues_of(IssueKind::InvalidDisplayOrder).count(), 1);
    assert_eq!(catalog.mutation_count().await, 0);

    let draft = output.cache.bucket("draft");
    assert_eq!(draft.len(), 1);
    assert_eq!(draft[0].keg_status, None);
    assert_eq!(draft[0].display_order, 999);
    assert!(output.cache.bucket("can").is_empty());
    Ok(())
}

#[tokio::test]
async fn test_product_fetch_error_skips_menu_item() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let storage = storage(&temp_dir);
    let catalog = FlakyCatalog {
        inner: MemoryCatalog::new(CatalogSnapshot {
            products: vec![product("p1", "Kava Pour", Some("Kava"), Some("m1"))],
            metaobjects: vec![menu_item("m1", "p1", Some("bottle"), Some("1"))],
            collections: BTreeMap::new(),
        }),
        fail_product_fetch: true,
        ..FlakyCatalog::default()
    };
    let taxonomy = Taxonomy::default();

    let output = ScanEngine::new(
        MenuIntegrityScan::new(&catalog, &taxonomy, MENU_TYPE, 50, true),
        &storage,
    )
    .run()
    .await?;

    assert_eq!(output.report().count("skipped"), 1);
    assert!(output.report().issues.is_empty());
    assert_eq!(output.cache.total_items, 0);
    Ok(())
}
