use crate::core::exec_log::ExecutionLog;
use crate::core::pagination::fetch_all;
use crate::core::scan::{Artifact, Findings, Scan, ScanOutput};
use crate::domain::issue::{FixKind, Issue, IssueKind, ScanReport, ScanStatus};
use crate::domain::model::{BarMenuItem, MetaobjectRecord};
use crate::domain::ports::Catalog;
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

pub const JOB_NAME: &str = "menu_integrity_scan";
pub const MENU_CACHE_PATH: &str = "runtime/bar_menu_cache.json";

/// A menu item after validation, with every field normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMenuItem {
    pub id: String,
    pub product_id: String,
    pub menu_label: Option<String>,
    pub size_oz: Option<String>,
    pub card_type: String,
    pub keg_status: Option<String>,
    pub display_order: i64,
    pub seasonal_flag: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCacheEntry {
    pub metaobject_id: String,
    pub product_id: String,
    pub menu_label: Option<String>,
    pub size_oz: Option<String>,
    pub keg_status: Option<String>,
    pub display_order: i64,
    pub seasonal_flag: bool,
}

/// Published runtime menu, grouped by card type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuCache {
    pub timestamp: DateTime<Utc>,
    pub total_items: usize,
    pub by_card_type: BTreeMap<String, Vec<MenuCacheEntry>>,
}

impl MenuCache {
    /// Every taxonomy card type gets a bucket, even an empty one. Buckets keep
    /// encounter order for equal `display_order` values.
    pub fn build(items: &[ValidMenuItem], taxonomy: &Taxonomy, timestamp: DateTime<Utc>) -> Self {
        let mut by_card_type: BTreeMap<String, Vec<MenuCacheEntry>> = taxonomy
            .card_types
            .iter()
            .map(|card_type| (card_type.clone(), Vec::new()))
            .collect();

        for item in items {
            by_card_type
                .entry(item.card_type.clone())
                .or_default()
                .push(MenuCacheEntry {
                    metaobject_id: item.id.clone(),
                    product_id: item.product_id.clone(),
                    menu_label: item.menu_label.clone(),
                    size_oz: item.size_oz.clone(),
                    keg_status: item.keg_status.clone(),
                    display_order: item.display_order,
                    seasonal_flag: item.seasonal_flag,
                });
        }

        for bucket in by_card_type.values_mut() {
            bucket.sort_by_key(|entry| entry.display_order);
        }

        Self {
            timestamp,
            total_items: items.len(),
            by_card_type,
        }
    }

    pub fn bucket(&self, card_type: &str) -> &[MenuCacheEntry] {
        self.by_card_type
            .get(card_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Validates `bar_menu_item` records and rebuilds the runtime menu cache.
pub struct MenuIntegrityScan<'a, C: Catalog> {
    catalog: &'a C,
    taxonomy: &'a Taxonomy,
    menu_item_type: &'a str,
    page_size: usize,
    fix_mode: bool,
}

impl<'a, C: Catalog> MenuIntegrityScan<'a, C> {
    pub fn new(
        catalog: &'a C,
        taxonomy: &'a Taxonomy,
        menu_item_type: &'a str,
        page_size: usize,
        fix_mode: bool,
    ) -> Self {
        Self {
            catalog,
            taxonomy,
            menu_item_type,
            page_size,
            fix_mode,
        }
    }

    async fn normalize_card_type(
        &self,
        item: &BarMenuItem,
        findings: &mut Findings,
        log: &mut ExecutionLog,
    ) -> String {
        let default = &self.taxonomy.default_card_type;
        match item.card_type.as_deref() {
            None => default.clone(),
            Some(card_type) if self.taxonomy.is_card_type(card_type) => card_type.to_string(),
            Some(card_type) => {
                findings.issue(
                    Issue::new(IssueKind::InvalidCardType, &item.id).with_value(Some(card_type)),
                );
                if self.fix_mode {
                    findings
                        .repair(
                            log,
                            FixKind::NormalizedCardType,
                            &item.id,
                            self.catalog
                                .set_record_field(&item.id, "card_type", Some(default.as_str())),
                        )
                        .await;
                }
                default.clone()
            }
        }
    }

    async fn normalize_keg_status(
        &self,
        item: &BarMenuItem,
        findings: &mut Findings,
        log: &mut ExecutionLog,
    ) -> Option<String> {
        match item.keg_status.as_deref() {
            None => None,
            Some(status) if self.taxonomy.is_keg_status(status) => Some(status.to_string()),
            Some(status) => {
                findings.issue(
                    Issue::new(IssueKind::InvalidKegStatus, &item.id).with_value(Some(status)),
                );
                if self.fix_mode {
                    findings
                        .repair(
                            log,
                            FixKind::ClearedInvalidKegStatus,
                            &item.id,
                            self.catalog.set_record_field(&item.id, "keg_status", None),
                        )
                        .await;
                }
                None
            }
        }
    }

    async fn normalize_display_order(
        &self,
        item: &BarMenuItem,
        findings: &mut Findings,
        log: &mut ExecutionLog,
    ) -> i64 {
        let default = self.taxonomy.default_display_order;
        let raw = match item.display_order.as_deref() {
            None => return default,
            Some(raw) => raw,
        };
        if let Ok(order) = raw.trim().parse::<i64>() {
            return order;
        }

        findings.issue(Issue::new(IssueKind::InvalidDisplayOrder, &item.id).with_value(Some(raw)));
        if self.fix_mode {
            let value = default.to_string();
            findings
                .repair(
                    log,
                    FixKind::ResetDisplayOrder,
                    &item.id,
                    self.catalog
                        .set_record_field(&item.id, "display_order", Some(value.as_str())),
                )
                .await;
        }
        default
    }
}

#[derive(Debug, Clone)]
pub struct MenuScanOutput {
    pub valid_items: Vec<ValidMenuItem>,
    pub cache: MenuCache,
    pub report: ScanReport,
}

impl ScanOutput for MenuScanOutput {
    fn report(&self) -> &ScanReport {
        &self.report
    }

    fn artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(vec![Artifact::json(MENU_CACHE_PATH, &self.cache)?])
    }
}

#[async_trait]
impl<'a, C: Catalog> Scan for MenuIntegrityScan<'a, C> {
    type Snapshot = Vec<MetaobjectRecord>;
    type Output = MenuScanOutput;

    fn job_name(&self) -> &'static str {
        JOB_NAME
    }

    fn fix_mode(&self) -> bool {
        self.fix_mode
    }

    async fn snapshot(&self) -> Result<Vec<MetaobjectRecord>> {
        let records = fetch_all(self.menu_item_type, |after| {
            self.catalog
                .metaobject_page(self.menu_item_type, self.page_size, after)
        })
        .await?;
        tracing::info!("📥 Fetched {} {} records", records.len(), self.menu_item_type);
        Ok(records)
    }

    async fn reconcile(&self, records: Vec<MetaobjectRecord>, log: &mut ExecutionLog) -> MenuScanOutput {
        let started_at = Utc::now();
        let mut findings = Findings::default();
        let mut valid_items = Vec::new();
        let mut archived = 0usize;
        let mut skipped = 0usize;
        // 同一商品可能被多個品項引用，只查一次
        let mut product_exists: HashMap<String, bool> = HashMap::new();

        for record in &records {
            if !record.is_active() {
                archived += 1;
                log.action(
                    "skipped_archived",
                    json!({ "metaobject_id": record.id, "status": record.status.as_str() }),
                );
                continue;
            }

            let item = BarMenuItem::from(record);
            let product_id = match item.product_reference.as_deref() {
                Some(product_id) => product_id,
                None => {
                    findings.issue(
                        Issue::new(IssueKind::InvalidProductReference, &item.id)
                            .with_detail("product_reference is empty"),
                    );
                    continue;
                }
            };

            let exists = match product_exists.get(product_id).copied() {
                Some(exists) => exists,
                None => match self.catalog.product(product_id).await {
                    Ok(product) => {
                        product_exists.insert(product_id.to_string(), product.is_some());
                        product.is_some()
                    }
                    Err(e) => {
                        log.error(
                            "product_fetch_failed",
                            json!({ "metaobject_id": item.id, "product_id": product_id, "message": e.to_string() }),
                        );
                        skipped += 1;
                        continue;
                    }
                },
            };
            if !exists {
                // 商品已刪除：只回報，不自動修復
                findings.issue(
                    Issue::new(IssueKind::InvalidProductReference, &item.id)
                        .with_value(Some(product_id))
                        .with_detail("referenced product not found"),
                );
                continue;
            }

            let card_type = self.normalize_card_type(&item, &mut findings, log).await;
            let keg_status = self.normalize_keg_status(&item, &mut findings, log).await;
            let display_order = self.normalize_display_order(&item, &mut findings, log).await;

            valid_items.push(ValidMenuItem {
                id: item.id.clone(),
                product_id: product_id.to_string(),
                menu_label: item.menu_label.clone(),
                size_oz: item.size_oz.clone(),
                card_type,
                keg_status,
                display_order,
                seasonal_flag: item.seasonal_flag,
            });
        }

        let finished_at = Utc::now();
        let cache = MenuCache::build(&valid_items, self.taxonomy, finished_at);
        let summary = BTreeMap::from([
            ("items".to_string(), records.len()),
            ("valid_items".to_string(), valid_items.len()),
            ("archived".to_string(), archived),
            ("skipped".to_string(), skipped),
            ("issues".to_string(), findings.issues.len()),
            ("fixes".to_string(), findings.fixes.len()),
        ]);

        MenuScanOutput {
            valid_items,
            cache,
            report: ScanReport {
                job: JOB_NAME.to_string(),
                status: ScanStatus::Completed,
                fix_mode: self.fix_mode,
                started_at,
                finished_at,
                summary,
                issues: findings.issues,
                fixes: findings.fixes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, card_type: &str, display_order: i64) -> ValidMenuItem {
        ValidMenuItem {
            id: id.to_string(),
            product_id: format!("product-{}", id),
            menu_label: Some(id.to_string()),
            size_oz: None,
            card_type: card_type.to_string(),
            keg_status: None,
            display_order,
            seasonal_flag: false,
        }
    }

    #[test]
    fn test_cache_sorts_each_bucket_by_display_order() {
        let items = vec![item("A", "draft", 5), item("B", "draft", 1), item("C", "draft", 3)];
        let cache = MenuCache::build(&items, &Taxonomy::default(), Utc::now());

        let order: Vec<&str> = cache
            .bucket("draft")
            .iter()
            .map(|e| e.metaobject_id.as_str())
            .collect();
        assert_eq!(order, vec!["B", "C", "A"]);
        assert_eq!(cache.total_items, 3);
    }

    #[test]
    fn test_cache_keeps_encounter_order_for_ties() {
        let items = vec![item("X", "can", 999), item("Y", "can", 999), item("Z", "can", 10)];
        let cache = MenuCache::build(&items, &Taxonomy::default(), Utc::now());

        let order: Vec<&str> = cache
            .bucket("can")
            .iter()
            .map(|e| e.metaobject_id.as_str())
            .collect();
        assert_eq!(order, vec!["Z", "X", "Y"]);
    }

    #[test]
    fn test_cache_has_every_card_type_bucket() {
        let cache = MenuCache::build(&[], &Taxonomy::default(), Utc::now());
        for card_type in ["draft", "can", "shot", "keg"] {
            assert!(cache.by_card_type.contains_key(card_type), "missing {}", card_type);
        }
        assert!(cache.bucket("shot").is_empty());
    }
}
