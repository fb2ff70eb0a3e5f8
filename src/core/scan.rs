use crate::core::exec_log::ExecutionLog;
use crate::domain::issue::{Fix, FixKind, Issue, IssueKind, ScanReport};
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::future::Future;

/// A file the scan wants published, relative to the storage root.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: String,
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn json<T: serde::Serialize>(path: &str, value: &T) -> Result<Self> {
        Ok(Self {
            path: path.to_string(),
            data: serde_json::to_vec_pretty(value)?,
        })
    }
}

pub trait ScanOutput: Send {
    fn report(&self) -> &ScanReport;
    fn artifacts(&self) -> Result<Vec<Artifact>>;
}

/// One reconciliation job: fetch a full snapshot, then validate and repair it.
#[async_trait]
pub trait Scan: Send + Sync {
    type Snapshot: Send;
    type Output: ScanOutput;

    fn job_name(&self) -> &'static str;
    fn fix_mode(&self) -> bool;

    /// Must fail rather than return a partial snapshot.
    async fn snapshot(&self) -> Result<Self::Snapshot>;

    /// Per-record problems become issues; they never abort the run.
    async fn reconcile(&self, snapshot: Self::Snapshot, log: &mut ExecutionLog) -> Self::Output;
}

/// Issues and fixes gathered during one reconcile pass.
#[derive(Debug, Default)]
pub struct Findings {
    pub issues: Vec<Issue>,
    pub fixes: Vec<Fix>,
}

impl Findings {
    pub fn issue(&mut self, issue: Issue) {
        tracing::debug!(
            "⚠️ {} on {} ({})",
            issue.kind.as_str(),
            issue.entity_id,
            issue.value.as_deref().unwrap_or("-")
        );
        self.issues.push(issue);
    }

    /// Runs one repair write. Success records a fix; failure records a
    /// `repair_failed` issue and is not retried in this run.
    pub async fn repair<F>(
        &mut self,
        log: &mut ExecutionLog,
        kind: FixKind,
        entity_id: &str,
        write: F,
    ) -> bool
    where
        F: Future<Output = Result<()>>,
    {
        match write.await {
            Ok(()) => {
                log.action(kind.as_str(), json!({ "entity_id": entity_id }));
                self.fixes.push(Fix::new(kind, entity_id));
                true
            }
            Err(e) => {
                log.error(
                    "repair_failed",
                    json!({ "fix": kind.as_str(), "entity_id": entity_id, "message": e.to_string() }),
                );
                self.issues.push(
                    Issue::new(IssueKind::RepairFailed, entity_id)
                        .with_value(Some(kind.as_str()))
                        .with_detail(e.to_string()),
                );
                false
            }
        }
    }
}

pub struct ScanEngine<S: Scan, St: Storage> {
    scan: S,
    storage: St,
    monitor: SystemMonitor,
}

impl<S: Scan, St: Storage> ScanEngine<S, St> {
    pub fn new(scan: S, storage: St) -> Self {
        Self::new_with_monitoring(scan, storage, false)
    }

    pub fn new_with_monitoring(scan: S, storage: St, monitor_enabled: bool) -> Self {
        Self {
            scan,
            storage,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn storage(&self) -> &St {
        &self.storage
    }

    pub async fn run(&mut self) -> Result<S::Output> {
        let job = self.scan.job_name();
        let fix_mode = self.scan.fix_mode();
        let started_at = Utc::now();
        let mut log = ExecutionLog::new();

        tracing::info!(
            "🚀 Starting {} (fix mode: {})",
            job,
            if fix_mode { "ENABLED" } else { "DISABLED" }
        );
        log.action("scan_started", json!({ "job": job, "fix_mode": fix_mode }));
        self.monitor.log_phase(job, "start");

        let snapshot = match self.scan.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // 快照不完整就不掃描，輸出零結果報告
                tracing::error!("❌ {}: catalog snapshot unavailable: {}", job, e);
                log.error("snapshot_unavailable", json!({ "message": e.to_string() }));
                let report = ScanReport::aborted(job, fix_mode, started_at);
                if let Err(persist_err) = self.persist(&report, &log).await {
                    tracing::warn!("⚠️ Could not persist aborted report: {}", persist_err);
                }
                return Err(ReconcileError::SnapshotUnavailable {
                    job: job.to_string(),
                    message: e.to_string(),
                });
            }
        };
        self.monitor.log_phase(job, "snapshot");

        let output = self.scan.reconcile(snapshot, &mut log).await;
        self.monitor.log_phase(job, "reconcile");

        for artifact in output.artifacts()? {
            tracing::debug!("💾 Writing {} ({} bytes)", artifact.path, artifact.data.len());
            self.storage.write_file(&artifact.path, &artifact.data).await?;
        }

        let report = output.report();
        log.action(
            "scan_complete",
            json!({
                "summary": report.summary,
                "issues": report.issues.len(),
                "fixes": report.fixes.len(),
            }),
        );
        self.persist(report, &log).await?;
        self.monitor.log_phase(job, "publish");

        tracing::info!(
            "📊 {} complete: {} issues, {} fixes",
            job,
            report.issues.len(),
            report.fixes.len()
        );
        Ok(output)
    }

    async fn persist(&self, report: &ScanReport, log: &ExecutionLog) -> Result<()> {
        let latest = latest_report_path(&report.job);
        self.storage
            .write_file(&latest, &serde_json::to_vec_pretty(report)?)
            .await?;
        self.storage
            .write_file(
                &format!("reports/{}_issues.csv", report.job),
                &report.issues_csv()?,
            )
            .await?;
        self.storage
            .write_file(
                &ExecutionLog::file_name(&report.job, report.started_at),
                &log.to_json()?,
            )
            .await?;
        tracing::info!("📄 Report saved: {}", latest);
        Ok(())
    }
}

/// reports/<job>_latest.json
pub fn latest_report_path(job: &str) -> String {
    format!("reports/{}_latest.json", job)
}
