pub mod cli;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod toml_config;

#[cfg(feature = "cli")]
use crate::config::toml_config::ReconcileConfig;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "catalog-reconcile")]
#[command(about = "Classify products and reconcile catalog metadata across bar and take-home")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "reconcile.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per scan phase")]
    pub monitor: bool,

    /// Run against a JSON catalog export instead of the live API
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Override output.path from the config file
    #[arg(long)]
    pub output: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Metafield consistency scan followed by menu integrity scan
    Nightly {
        /// Report issues without repairing them
        #[arg(long)]
        dry_run: bool,
    },
    /// Metafield consistency scan only
    Metafields {
        #[arg(long)]
        dry_run: bool,
    },
    /// Menu integrity scan and bar menu cache rebuild
    Menu {
        #[arg(long)]
        dry_run: bool,
    },
    /// Render the weekly trust report from the latest scan results
    TrustReport,
    /// Classify a single product and print the result
    Classify {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        product_type: String,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        #[arg(long, default_value = "")]
        vendor: String,
    },
}

#[cfg(feature = "cli")]
impl Command {
    pub fn dry_run(&self) -> bool {
        match self {
            Self::Nightly { dry_run } | Self::Metafields { dry_run } | Self::Menu { dry_run } => {
                *dry_run
            }
            Self::TrustReport | Self::Classify { .. } => false,
        }
    }
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML 並套用命令列覆寫；檔案不存在時使用預設值
    pub fn load(&self) -> Result<ReconcileConfig> {
        let mut config = if std::path::Path::new(&self.config).exists() {
            ReconcileConfig::from_file(&self.config)?
        } else {
            tracing::warn!(
                "⚠️ Config file '{}' not found, using built-in defaults",
                self.config
            );
            ReconcileConfig::default()
        };

        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if self.command.dry_run() {
            config.scan.fix_mode = false;
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_disables_fix_mode() {
        let cli = CliConfig::parse_from([
            "catalog-reconcile",
            "--config",
            "/nonexistent/reconcile.toml",
            "--output",
            "/tmp/out",
            "nightly",
            "--dry-run",
        ]);

        let config = cli.load().unwrap();
        assert!(!config.scan.fix_mode);
        assert_eq!(config.output.path, "/tmp/out");
    }

    #[test]
    fn test_classify_tags_are_comma_separated() {
        let cli = CliConfig::parse_from([
            "catalog-reconcile",
            "classify",
            "--title",
            "Mitra 9 Draft Pour - Kratom",
            "--tags",
            "kratom,draft,bar",
        ]);

        match cli.command {
            Command::Classify { tags, .. } => assert_eq!(tags, vec!["kratom", "draft", "bar"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
