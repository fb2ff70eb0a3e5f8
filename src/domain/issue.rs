use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingIngredient,
    InvalidIngredient,
    StaleBarReference,
    InvalidProductReference,
    InvalidCardType,
    InvalidKegStatus,
    InvalidDisplayOrder,
    RepairFailed,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingIngredient => "missing_ingredient",
            Self::InvalidIngredient => "invalid_ingredient",
            Self::StaleBarReference => "stale_bar_reference",
            Self::InvalidProductReference => "invalid_product_reference",
            Self::InvalidCardType => "invalid_card_type",
            Self::InvalidKegStatus => "invalid_keg_status",
            Self::InvalidDisplayOrder => "invalid_display_order",
            Self::RepairFailed => "repair_failed",
        }
    }
}

/// A detected drift from the expected metadata shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Issue {
    pub fn new(kind: IssueKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
            value: None,
            sku: None,
            title: None,
            detail: None,
        }
    }

    pub fn with_value(mut self, value: Option<&str>) -> Self {
        self.value = value.map(str::to_string);
        self
    }

    pub fn with_product(mut self, sku: &str, title: &str) -> Self {
        self.sku = Some(sku.to_string());
        self.title = Some(title.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    ClearedStaleReference,
    NormalizedCardType,
    ClearedInvalidKegStatus,
    ResetDisplayOrder,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClearedStaleReference => "cleared_stale_reference",
            Self::NormalizedCardType => "normalized_card_type",
            Self::ClearedInvalidKegStatus => "cleared_invalid_keg_status",
            Self::ResetDisplayOrder => "reset_display_order",
        }
    }

    /// "cleared_stale_reference" -> "Cleared Stale Reference"
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<String>>()
            .join(" ")
    }
}

/// A repair that was applied during a fix-mode scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    #[serde(rename = "type")]
    pub kind: FixKind,
    pub entity_id: String,
}

impl Fix {
    pub fn new(kind: FixKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    Aborted,
}

/// Serialized result of one scan run: `{issues, fixes, summary}` plus run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub job: String,
    pub status: ScanStatus,
    pub fix_mode: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: BTreeMap<String, usize>,
    pub issues: Vec<Issue>,
    pub fixes: Vec<Fix>,
}

impl ScanReport {
    /// 快照取不到時的零結果報告
    pub fn aborted(job: &str, fix_mode: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            job: job.to_string(),
            status: ScanStatus::Aborted,
            fix_mode,
            started_at,
            finished_at: Utc::now(),
            summary: BTreeMap::new(),
            issues: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn count(&self, key: &str) -> usize {
        self.summary.get(key).copied().unwrap_or(0)
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// 依問題類型統計
    pub fn issue_counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn fix_counts(&self) -> BTreeMap<FixKind, usize> {
        let mut counts = BTreeMap::new();
        for fix in &self.fixes {
            *counts.entry(fix.kind).or_insert(0) += 1;
        }
        counts
    }

    /// One CSV row per issue.
    pub fn issues_csv(&self) -> crate::utils::error::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["type", "entity_id", "value", "sku", "title", "detail"])?;
        for issue in &self.issues {
            writer.write_record([
                issue.kind.as_str(),
                issue.entity_id.as_str(),
                issue.value.as_deref().unwrap_or(""),
                issue.sku.as_deref().unwrap_or(""),
                issue.title.as_deref().unwrap_or(""),
                issue.detail.as_deref().unwrap_or(""),
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| crate::utils::error::ReconcileError::StorageError {
                message: format!("Failed to flush CSV buffer: {}", e),
            })
    }
}
