use crate::core::exec_log::ExecutionLog;
use crate::core::pagination::fetch_all;
use crate::core::scan::{Artifact, Findings, Scan, ScanOutput};
use crate::domain::issue::{FixKind, Issue, IssueKind, ScanReport, ScanStatus};
use crate::domain::model::{Product, INGREDIENT_FIELD, MENU_REFERENCE_FIELD, NEEDS_REVIEW};
use crate::domain::ports::Catalog;
use crate::domain::taxonomy::Taxonomy;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

pub const JOB_NAME: &str = "metafield_consistency_scan";
pub const INGREDIENT_MAP_PATH: &str = "architecture/active_ingredient_map.json";
pub const BAR_REFERENCE_MAP_PATH: &str = "architecture/bar_menu_item_map.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientEntry {
    pub sku: String,
    pub title: String,
    pub ingredient: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarReferenceEntry {
    pub sku: String,
    pub title: String,
    pub metaobject_id: String,
}

/// Checks every product's ingredient metafield and bar menu reference.
pub struct MetafieldConsistencyScan<'a, C: Catalog> {
    catalog: &'a C,
    taxonomy: &'a Taxonomy,
    page_size: usize,
    fix_mode: bool,
}

impl<'a, C: Catalog> MetafieldConsistencyScan<'a, C> {
    pub fn new(catalog: &'a C, taxonomy: &'a Taxonomy, page_size: usize, fix_mode: bool) -> Self {
        Self {
            catalog,
            taxonomy,
            page_size,
            fix_mode,
        }
    }

    async fn check_bar_reference(
        &self,
        product: &Product,
        reference: &str,
        output: &mut MetafieldScanOutput,
        findings: &mut Findings,
        log: &mut ExecutionLog,
    ) {
        let record = match self.catalog.metaobject(reference).await {
            Ok(record) => record,
            Err(e) => {
                // 暫時性錯誤：跳過這筆，不當成 stale
                log.error(
                    "metaobject_fetch_failed",
                    json!({ "product_id": product.id, "metaobject_id": reference, "message": e.to_string() }),
                );
                output.skipped += 1;
                return;
            }
        };

        match record {
            Some(record) if record.is_active() => {
                output.bar_reference_map.insert(
                    product.id.clone(),
                    BarReferenceEntry {
                        sku: product.sku_or_placeholder().to_string(),
                        title: product.title.clone(),
                        metaobject_id: record.id,
                    },
                );
            }
            other => {
                let detail = match other {
                    Some(record) => format!("menu item status {}", record.status.as_str()),
                    None => "menu item not found".to_string(),
                };
                findings.issue(
                    Issue::new(IssueKind::StaleBarReference, &product.id)
                        .with_value(Some(reference))
                        .with_product(product.sku_or_placeholder(), &product.title)
                        .with_detail(detail),
                );
                if self.fix_mode {
                    let (namespace, key) = MENU_REFERENCE_FIELD;
                    findings
                        .repair(
                            log,
                            FixKind::ClearedStaleReference,
                            &product.id,
                            self.catalog.set_metafield(&product.id, namespace, key, None),
                        )
                        .await;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetafieldScanOutput {
    /// product id → entry
    pub ingredient_map: BTreeMap<String, IngredientEntry>,
    /// product id → entry
    pub bar_reference_map: BTreeMap<String, BarReferenceEntry>,
    pub report: ScanReport,
    skipped: usize,
}

impl ScanOutput for MetafieldScanOutput {
    fn report(&self) -> &ScanReport {
        &self.report
    }

    fn artifacts(&self) -> Result<Vec<Artifact>> {
        Ok(vec![
            Artifact::json(INGREDIENT_MAP_PATH, &self.ingredient_map)?,
            Artifact::json(BAR_REFERENCE_MAP_PATH, &self.bar_reference_map)?,
        ])
    }
}

#[async_trait]
impl<'a, C: Catalog> Scan for MetafieldConsistencyScan<'a, C> {
    type Snapshot = Vec<Product>;
    type Output = MetafieldScanOutput;

    fn job_name(&self) -> &'static str {
        JOB_NAME
    }

    fn fix_mode(&self) -> bool {
        self.fix_mode
    }

    async fn snapshot(&self) -> Result<Vec<Product>> {
        let products = fetch_all("products", |after| {
            self.catalog.product_page(self.page_size, after)
        })
        .await?;
        tracing::info!("📥 Fetched {} products", products.len());
        Ok(products)
    }

    async fn reconcile(&self, products: Vec<Product>, log: &mut ExecutionLog) -> MetafieldScanOutput {
        let started_at = Utc::now();
        let mut findings = Findings::default();
        let mut needs_review = 0usize;
        let mut output = MetafieldScanOutput {
            ingredient_map: BTreeMap::new(),
            bar_reference_map: BTreeMap::new(),
            report: ScanReport::aborted(JOB_NAME, self.fix_mode, started_at),
            skipped: 0,
        };

        for product in &products {
            let sku = product.sku_or_placeholder();

            match product.metafield(INGREDIENT_FIELD) {
                None => findings.issue(
                    Issue::new(IssueKind::MissingIngredient, &product.id)
                        .with_product(sku, &product.title),
                ),
                Some(value) if self.taxonomy.is_ingredient(value) => {
                    output.ingredient_map.insert(
                        product.id.clone(),
                        IngredientEntry {
                            sku: sku.to_string(),
                            title: product.title.clone(),
                            ingredient: value.to_string(),
                        },
                    );
                }
                Some(value) => {
                    findings.issue(
                        Issue::new(IssueKind::InvalidIngredient, &product.id)
                            .with_value(Some(value))
                            .with_product(sku, &product.title),
                    );
                    // needs_review 只排入人工審核，不自動修復
                    if value == NEEDS_REVIEW {
                        needs_review += 1;
                        log.action(
                            "queued_for_review",
                            json!({ "product_id": product.id, "sku": sku, "title": product.title }),
                        );
                    }
                }
            }

            if let Some(reference) = product.metafield(MENU_REFERENCE_FIELD) {
                self.check_bar_reference(product, reference, &mut output, &mut findings, log)
                    .await;
            }
        }

        let summary = BTreeMap::from([
            ("products".to_string(), products.len()),
            ("valid_ingredients".to_string(), output.ingredient_map.len()),
            ("valid_bar_references".to_string(), output.bar_reference_map.len()),
            ("needs_review".to_string(), needs_review),
            ("issues".to_string(), findings.issues.len()),
            ("fixes".to_string(), findings.fixes.len()),
            ("skipped".to_string(), output.skipped),
        ]);

        output.report = ScanReport {
            job: JOB_NAME.to_string(),
            status: ScanStatus::Completed,
            fix_mode: self.fix_mode,
            started_at,
            finished_at: Utc::now(),
            summary,
            issues: findings.issues,
            fixes: findings.fixes,
        };
        output
    }
}
