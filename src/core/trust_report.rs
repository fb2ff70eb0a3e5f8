//! Weekly human-readable health report over the latest scan results.

use crate::config::toml_config::ReportConfig;
use crate::core::menu_scan::JOB_NAME as MENU_JOB;
use crate::core::metafield_scan::{IngredientEntry, INGREDIENT_MAP_PATH, JOB_NAME as METAFIELD_JOB};
use crate::core::scan::latest_report_path;
use crate::domain::issue::{FixKind, Issue, IssueKind, ScanReport, ScanStatus};
use crate::domain::model::NEEDS_REVIEW;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATS_PATH: &str = "reports/trust_stats.json";
const MAX_ROWS: usize = 10;

/// Headline numbers, kept between runs as the delta baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustStats {
    pub generated_at: DateTime<Utc>,
    pub total_products: usize,
    pub products_with_ingredient: usize,
    pub products_with_bar_reference: usize,
    pub needs_review: usize,
    pub invalid_product_references: usize,
    pub total_issues: usize,
}

impl TrustStats {
    /// Items that need a human; never auto-repaired.
    pub fn unresolved(&self) -> usize {
        self.needs_review + self.invalid_product_references
    }
}

#[derive(Debug, Clone)]
pub struct TrustReport {
    pub markdown: String,
    pub stats: TrustStats,
    pub previous: Option<TrustStats>,
    pub path: String,
}

async fn load_json<S: Storage, T: DeserializeOwned>(storage: &S, path: &str) -> Option<T> {
    let data = match storage.read_file(path).await {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("📭 {} not available: {}", path, e);
            return None;
        }
    };
    match serde_json::from_slice(&data) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("⚠️ Ignoring unreadable {}: {}", path, e);
            None
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Markdown table cell: no pipes, no newlines, at most 50 chars.
fn cell(value: Option<&str>) -> String {
    let value = value.unwrap_or("N/A");
    let truncated: String = value.chars().take(50).collect();
    truncated.replace('|', "\\|").replace('\n', " ")
}

fn select<'i>(all: &[&'i Issue], pred: impl Fn(&Issue) -> bool) -> Vec<&'i Issue> {
    all.iter().copied().filter(|i| pred(i)).collect()
}

fn is_review(issue: &Issue) -> bool {
    issue.value.as_deref() == Some(NEEDS_REVIEW)
}

fn trend(delta: i64, higher_is_better: bool) -> &'static str {
    match (delta.signum(), higher_is_better) {
        (0, _) => "➖",
        (1, true) | (-1, false) => "✅",
        _ => "⚠️",
    }
}

impl TrustReport {
    pub async fn generate<S: Storage>(
        storage: &S,
        config: &ReportConfig,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let metafield: Option<ScanReport> =
            load_json(storage, &latest_report_path(METAFIELD_JOB)).await;
        let menu: Option<ScanReport> = load_json(storage, &latest_report_path(MENU_JOB)).await;
        let ingredient_map: BTreeMap<String, IngredientEntry> =
            load_json(storage, INGREDIENT_MAP_PATH).await.unwrap_or_default();
        let previous: Option<TrustStats> = load_json(storage, STATS_PATH).await;

        let stats = collect_stats(metafield.as_ref(), menu.as_ref(), now);
        let markdown = Renderer {
            config,
            now,
            stats: &stats,
            previous: previous.as_ref(),
            metafield: metafield.as_ref(),
            menu: menu.as_ref(),
            ingredient_map: &ingredient_map,
        }
        .render();

        let path = format!("reports/trust_report_{}.md", now.format("%Y%m%d"));
        storage.write_file(&path, markdown.as_bytes()).await?;
        storage
            .write_file(STATS_PATH, &serde_json::to_vec_pretty(&stats)?)
            .await?;
        tracing::info!("📊 Trust report generated: {}", path);

        Ok(Self {
            markdown,
            stats,
            previous,
            path,
        })
    }
}

fn collect_stats(
    metafield: Option<&ScanReport>,
    menu: Option<&ScanReport>,
    now: DateTime<Utc>,
) -> TrustStats {
    let count = |report: Option<&ScanReport>, key: &str| report.map_or(0, |r| r.count(key));
    let issues = |report: Option<&ScanReport>| report.map_or(0, |r| r.issues.len());

    TrustStats {
        generated_at: now,
        total_products: count(metafield, "products"),
        products_with_ingredient: count(metafield, "valid_ingredients"),
        products_with_bar_reference: count(metafield, "valid_bar_references"),
        needs_review: metafield.map_or(0, |r| {
            r.issues_of(IssueKind::InvalidIngredient)
                .filter(|i| i.value.as_deref() == Some(NEEDS_REVIEW))
                .count()
        }),
        invalid_product_references: menu
            .map_or(0, |r| r.issues_of(IssueKind::InvalidProductReference).count()),
        total_issues: issues(metafield) + issues(menu),
    }
}

struct Renderer<'a> {
    config: &'a ReportConfig,
    now: DateTime<Utc>,
    stats: &'a TrustStats,
    previous: Option<&'a TrustStats>,
    metafield: Option<&'a ScanReport>,
    menu: Option<&'a ScanReport>,
    ingredient_map: &'a BTreeMap<String, IngredientEntry>,
}

impl Renderer<'_> {
    fn render(&self) -> String {
        let mut lines = Vec::new();
        self.header(&mut lines);
        self.summary(&mut lines);
        self.issues(&mut lines);
        self.delta(&mut lines);
        self.fixes(&mut lines);
        self.recommendations(&mut lines);
        self.footer(&mut lines);
        lines.join("\n")
    }

    fn all_issues(&self) -> Vec<&Issue> {
        self.metafield
            .into_iter()
            .chain(self.menu)
            .flat_map(|r| r.issues.iter())
            .collect()
    }

    fn healthy(&self) -> bool {
        let scans_ok = [self.metafield, self.menu]
            .iter()
            .all(|r| r.is_some_and(|r| r.status == ScanStatus::Completed));
        scans_ok && self.stats.unresolved() == 0 && self.stats.total_issues == 0
    }

    fn bar_denominator(&self) -> usize {
        self.config
            .expected_bar_products
            .unwrap_or_else(|| self.menu.map_or(0, |r| r.count("valid_items")))
    }

    fn header(&self, lines: &mut Vec<String>) {
        let status = if self.healthy() {
            "🟢 Healthy"
        } else {
            "🟡 Needs Attention"
        };
        lines.push("# Catalog Data Trust Report".to_string());
        lines.push(format!("**Report Date:** {}  ", self.now.format("%B %d, %Y")));
        lines.push(format!(
            "**Report Period:** {} - {}  ",
            (self.now - Duration::days(7)).format("%B %d"),
            self.now.format("%B %d, %Y")
        ));
        lines.push(format!("**Status:** {}  ", status));
        lines.push(String::new());

        for (job, report) in [(METAFIELD_JOB, self.metafield), (MENU_JOB, self.menu)] {
            match report {
                None => lines.push(format!("> ⚠️ No `{}` report found.", job)),
                Some(r) if r.status == ScanStatus::Aborted => lines.push(format!(
                    "> ⚠️ `{}` aborted at {}: catalog snapshot unavailable.",
                    job,
                    r.started_at.format("%Y-%m-%d %H:%M")
                )),
                Some(_) => {}
            }
        }
        lines.extend(["---".to_string(), String::new()]);
    }

    fn summary(&self, lines: &mut Vec<String>) {
        let stats = self.stats;
        lines.extend([
            "## 📊 Summary Statistics".to_string(),
            String::new(),
            "| Metric | Value | Coverage |".to_string(),
            "|:---|---:|:---:|".to_string(),
            format!("| **Total Products** | {} | 100% |", stats.total_products),
            format!(
                "| **Products with Active Ingredient** | {} | {:.1}% |",
                stats.products_with_ingredient,
                percent(stats.products_with_ingredient, stats.total_products)
            ),
            format!(
                "| **Products with Bar Menu Reference** | {} | {:.1}% |",
                stats.products_with_bar_reference,
                percent(stats.products_with_bar_reference, self.bar_denominator())
            ),
            String::new(),
            format!(
                "**Unresolved:** {} `needs_review`, {} `invalid_product_reference`",
                stats.needs_review, stats.invalid_product_references
            ),
            String::new(),
            "### Ingredient Breakdown".to_string(),
            String::new(),
        ]);

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in self.ingredient_map.values() {
            *counts.entry(entry.ingredient.as_str()).or_insert(0) += 1;
        }
        if counts.is_empty() {
            lines.push("*No products have a valid ingredient yet.*".to_string());
        } else {
            let total: usize = counts.values().sum();
            lines.push("| Ingredient | Products | Percentage |".to_string());
            lines.push("|:---|---:|:---:|".to_string());
            for (ingredient, count) in &counts {
                lines.push(format!(
                    "| {} | {} | {:.1}% |",
                    ingredient,
                    count,
                    percent(*count, total)
                ));
            }
        }
        lines.push(String::new());
    }

    fn issue_table<'i>(
        lines: &mut Vec<String>,
        title: &str,
        columns: (&str, &str),
        issues: &[&'i Issue],
        row: impl Fn(&'i Issue) -> (Option<&'i str>, Option<&'i str>),
    ) {
        if issues.is_empty() {
            return;
        }
        lines.push(format!("### {} ({})", title, issues.len()));
        lines.push(String::new());
        lines.push(format!("| {} | {} |", columns.0, columns.1));
        lines.push("|:---|:---|".to_string());
        for issue in issues.iter().take(MAX_ROWS) {
            let (left, right) = row(*issue);
            lines.push(format!("| {} | {} |", cell(left), cell(right)));
        }
        if issues.len() > MAX_ROWS {
            lines.push(format!("| ... | *{} more* |", issues.len() - MAX_ROWS));
        }
        lines.push(String::new());
    }

    fn issues(&self, lines: &mut Vec<String>) {
        let all = self.all_issues();
        lines.extend([
            "---".to_string(),
            String::new(),
            "## ⚠️ Issues Found".to_string(),
            String::new(),
            format!("**Total Issues:** {}", all.len()),
            String::new(),
        ]);

        if all.is_empty() {
            lines.push("✅ **No issues found!** Catalog metadata is complete and consistent.".to_string());
            lines.push(String::new());
            return;
        }

        Self::issue_table(
            lines,
            "Products Missing `active_ingredient`",
            ("SKU", "Product Title"),
            &select(&all, |i| i.kind == IssueKind::MissingIngredient),
            |i| (i.sku.as_deref(), i.title.as_deref()),
        );
        Self::issue_table(
            lines,
            "Products Requiring Manual Review",
            ("SKU", "Product ID"),
            &select(&all, |i| i.kind == IssueKind::InvalidIngredient && is_review(i)),
            |i| (i.sku.as_deref(), Some(i.entity_id.as_str())),
        );
        Self::issue_table(
            lines,
            "Products with Unknown Ingredient Values",
            ("SKU", "Value"),
            &select(&all, |i| i.kind == IssueKind::InvalidIngredient && !is_review(i)),
            |i| (i.sku.as_deref(), i.value.as_deref()),
        );
        Self::issue_table(
            lines,
            "Stale `bar.menu_reference` Links",
            ("SKU", "Menu Item"),
            &select(&all, |i| i.kind == IssueKind::StaleBarReference),
            |i| (i.sku.as_deref(), i.value.as_deref()),
        );
        Self::issue_table(
            lines,
            "Bar Menu Items with Invalid Product References",
            ("Metaobject ID", "Product Reference"),
            &select(&all, |i| i.kind == IssueKind::InvalidProductReference),
            |i| (Some(i.entity_id.as_str()), i.value.as_deref()),
        );
        Self::issue_table(
            lines,
            "Bar Menu Items with Invalid Fields",
            ("Metaobject ID", "Problem"),
            &select(&all, |i| {
                matches!(
                    i.kind,
                    IssueKind::InvalidCardType
                        | IssueKind::InvalidKegStatus
                        | IssueKind::InvalidDisplayOrder
                )
            }),
            |i| (Some(i.entity_id.as_str()), Some(i.kind.as_str())),
        );
        Self::issue_table(
            lines,
            "Failed Repairs",
            ("Entity", "Error"),
            &select(&all, |i| i.kind == IssueKind::RepairFailed),
            |i| (Some(i.entity_id.as_str()), i.detail.as_deref()),
        );
    }

    fn delta(&self, lines: &mut Vec<String>) {
        lines.extend([
            "---".to_string(),
            String::new(),
            "## 📈 Delta Since Last Report".to_string(),
            String::new(),
        ]);

        let Some(previous) = self.previous else {
            lines.push("*No previous report available for comparison.*".to_string());
            lines.push(String::new());
            return;
        };

        let diff = |now: usize, before: usize| now as i64 - before as i64;
        let rows = [
            (
                "New Products Added",
                diff(self.stats.total_products, previous.total_products),
                true,
            ),
            (
                "Products with Active Ingredient",
                diff(self.stats.products_with_ingredient, previous.products_with_ingredient),
                true,
            ),
            (
                "Products with Bar Menu Reference",
                diff(
                    self.stats.products_with_bar_reference,
                    previous.products_with_bar_reference,
                ),
                true,
            ),
            (
                "Products Requiring Manual Review",
                diff(self.stats.needs_review, previous.needs_review),
                false,
            ),
            (
                "Total Issues",
                diff(self.stats.total_issues, previous.total_issues),
                false,
            ),
        ];

        lines.push(format!(
            "Compared with {}.",
            previous.generated_at.format("%B %d, %Y")
        ));
        lines.push(String::new());
        lines.push("| Metric | Change | Trend |".to_string());
        lines.push("|:---|---:|:---:|".to_string());
        for (metric, delta, higher_is_better) in rows {
            lines.push(format!(
                "| {} | {:+} | {} |",
                metric,
                delta,
                trend(delta, higher_is_better)
            ));
        }
        lines.push(String::new());
    }

    fn fixes(&self, lines: &mut Vec<String>) {
        let mut counts: BTreeMap<FixKind, usize> = BTreeMap::new();
        for report in self.metafield.into_iter().chain(self.menu) {
            for (kind, count) in report.fix_counts() {
                *counts.entry(kind).or_insert(0) += count;
            }
        }

        lines.push("### Fixes Applied".to_string());
        lines.push(String::new());
        if counts.is_empty() {
            lines.push("*No fixes were required.*".to_string());
        } else {
            lines.push(format!("**Total Fixes:** {}", counts.values().sum::<usize>()));
            lines.push(String::new());
            for (kind, count) in &counts {
                lines.push(format!("- {}: {}", kind.label(), count));
            }
        }
        lines.push(String::new());
    }

    fn recommendations(&self, lines: &mut Vec<String>) {
        let stats = self.stats;
        let mut recommendations = Vec::new();

        let ingredient_coverage = percent(stats.products_with_ingredient, stats.total_products);
        if ingredient_coverage < self.config.ingredient_coverage_target {
            recommendations.push(format!(
                "**Improve Ingredient Coverage:** Currently at {:.1}% (target {:.0}%). \
                 Review products without `active_ingredient` and assign appropriate values.",
                ingredient_coverage, self.config.ingredient_coverage_target
            ));
        }

        let bar_coverage = percent(stats.products_with_bar_reference, self.bar_denominator());
        if bar_coverage < self.config.bar_coverage_target {
            recommendations.push(format!(
                "**Complete Bar Menu Setup:** Currently at {:.1}% (target {:.0}%). \
                 Ensure all bar products have a `bar.menu_reference` metafield.",
                bar_coverage, self.config.bar_coverage_target
            ));
        }

        if stats.needs_review > 0 {
            recommendations.push(format!(
                "**Resolve Manual Reviews:** {} products are marked `needs_review`.",
                stats.needs_review
            ));
        }
        if stats.invalid_product_references > 0 {
            recommendations.push(format!(
                "**Retire Orphaned Menu Items:** {} bar menu items point at missing products.",
                stats.invalid_product_references
            ));
        }

        lines.extend([
            "---".to_string(),
            String::new(),
            "## 💡 Recommendations".to_string(),
            String::new(),
        ]);
        if recommendations.is_empty() {
            lines.push("*No action needed.*".to_string());
        }
        for (i, recommendation) in recommendations.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, recommendation));
        }
        lines.push(String::new());
    }

    fn footer(&self, lines: &mut Vec<String>) {
        lines.extend([
            "---".to_string(),
            String::new(),
            "## 📅 Next Steps".to_string(),
            String::new(),
            "1. Review and address any outstanding issues listed above".to_string(),
            "2. Monitor reconciliation job logs for recurring problems".to_string(),
            format!(
                "3. Next trust report: {}",
                (self.now + Duration::days(7)).format("%B %d, %Y")
            ),
            String::new(),
            "---".to_string(),
            String::new(),
            format!(
                "*Generation time: {}*",
                self.now.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_handles_zero() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 4), 25.0);
    }

    #[test]
    fn test_cell_escapes_and_truncates() {
        assert_eq!(cell(None), "N/A");
        assert_eq!(cell(Some("Kava | Shell")), "Kava \\| Shell");
        assert_eq!(cell(Some(&"x".repeat(80))).len(), 50);
    }

    #[test]
    fn test_trend() {
        assert_eq!(trend(3, true), "✅");
        assert_eq!(trend(-3, true), "⚠️");
        assert_eq!(trend(-3, false), "✅");
        assert_eq!(trend(0, false), "➖");
    }
}
