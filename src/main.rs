use catalog_reconcile::config::Command;
use catalog_reconcile::core::scan::ScanOutput;
use catalog_reconcile::domain::issue::ScanReport;
use catalog_reconcile::domain::model::ProductText;
use catalog_reconcile::domain::ports::{Catalog, ConfigProvider};
use catalog_reconcile::utils::error::ErrorSeverity;
use catalog_reconcile::utils::{logger, validation::Validate};
use catalog_reconcile::{
    CliConfig, HeuristicClassifier, LocalStorage, MemoryCatalog, MenuIntegrityScan,
    MetafieldConsistencyScan, ReconcileConfig, ReconcileError, Result, ScanEngine, ShopifyClient,
    TrustReport,
};
use clap::Parser;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);

    tracing::info!("Starting catalog-reconcile CLI");
    if cli.verbose {
        tracing::debug!("CLI args: {:?}", cli);
    }

    let config = match cli.load().and_then(|config| config.validate().map(|_| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(e) = run(&cli, &config).await {
        tracing::error!(
            "❌ {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(cli: &CliConfig, config: &ReconcileConfig) -> Result<()> {
    let storage = LocalStorage::new(config.output.path.clone());

    match &cli.command {
        Command::Classify {
            title,
            product_type,
            tags,
            vendor,
        } => {
            let classifier = HeuristicClassifier::from_config(config)?;
            let classification = classifier.classify(ProductText {
                title,
                product_type,
                tags,
                vendor,
            });
            println!("{}", serde_json::to_string_pretty(&classification)?);
            Ok(())
        }
        Command::TrustReport => {
            let report = TrustReport::generate(&storage, &config.report, chrono::Utc::now()).await?;
            println!("📊 Trust report generated: {}", report.path);
            println!(
                "   {} products, {} unresolved",
                report.stats.total_products,
                report.stats.unresolved()
            );
            Ok(())
        }
        command => match &cli.snapshot {
            Some(path) => {
                tracing::info!("📦 Offline run against {}", path);
                let catalog = MemoryCatalog::from_file(path).await?;
                run_scans(command, &catalog, config, &storage, cli.monitor).await
            }
            None => {
                let catalog = ShopifyClient::from_config(config)?;
                tracing::info!("🌐 Using {}", catalog.endpoint());
                run_scans(command, &catalog, config, &storage, cli.monitor).await
            }
        },
    }
}

/// Both scans run on `nightly`; the first failure is returned after the
/// second scan has finished.
async fn run_scans<C: Catalog>(
    command: &Command,
    catalog: &C,
    config: &ReconcileConfig,
    storage: &LocalStorage,
    monitor: bool,
) -> Result<()> {
    let mut first_error: Option<ReconcileError> = None;
    let page_size = config.shop.page_size;

    if matches!(command, Command::Nightly { .. } | Command::Metafields { .. }) {
        let scan =
            MetafieldConsistencyScan::new(catalog, &config.taxonomy, page_size, config.fix_mode());
        let mut engine = ScanEngine::new_with_monitoring(scan, storage, monitor);
        match engine.run().await {
            Ok(output) => print_summary(output.report()),
            Err(e) => {
                tracing::error!("❌ Metafield scan failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    if matches!(command, Command::Nightly { .. } | Command::Menu { .. }) {
        let scan = MenuIntegrityScan::new(
            catalog,
            &config.taxonomy,
            &config.shop.menu_item_type,
            page_size,
            config.fix_mode(),
        );
        let mut engine = ScanEngine::new_with_monitoring(scan, storage, monitor);
        match engine.run().await {
            Ok(output) => print_summary(output.report()),
            Err(e) => {
                tracing::error!("❌ Menu scan failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_summary(report: &ScanReport) {
    println!("✅ {} completed (fix mode: {})", report.job, report.fix_mode);
    for (key, count) in &report.summary {
        println!("   {}: {}", key, count);
    }
}
