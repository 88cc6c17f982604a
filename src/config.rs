//! CLI configuration and runtime settings for static content deployment.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::placer::PlacementMode;
use crate::theme::{Area, LocaleCode, ThemeCode};

/// How much of the output tree is replaced by symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SymlinkMode {
    /// Copy every file
    #[default]
    Off,
    /// Symlink every file back to its source
    File,
    /// Deploy one locale per theme and area, symlink the other locale directories to it
    Locale,
}

/// High-performance static content deployment for Magento 2
#[derive(Parser, Debug)]
#[command(name = "magento-static-deploy")]
#[command(version)]
#[command(about = "High-performance static content deployment for Magento 2")]
pub struct Cli {
    /// Magento root directory
    #[arg(default_value = ".")]
    pub magento_root: PathBuf,

    /// Areas to deploy (comma-separated)
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "frontend,adminhtml"
    )]
    pub area: Vec<String>,

    /// Themes to deploy in Vendor/name format (comma-separated, default: all in app/design)
    #[arg(short, long, value_delimiter = ',')]
    pub theme: Option<Vec<String>>,

    /// Locales to deploy (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "en_US")]
    pub locale: Vec<String>,

    /// Number of parallel workers
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub jobs: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Include development files (.ts, .md, package.json, etc.)
    #[arg(short = 'd', long)]
    pub include_dev: bool,

    /// Symlink mode
    #[arg(long, value_enum, default_value_t = SymlinkMode::Off)]
    pub symlink: SymlinkMode,

    /// Clear each job's output directory before deploying
    #[arg(short, long)]
    pub force: bool,

    /// Content version written to deployed_version.txt (default: UNIX timestamp)
    #[arg(long)]
    pub content_version: Option<String>,

    /// Strategy passed to bin/magento for delegated themes
    #[arg(long, default_value = "quick")]
    pub strategy: String,

    /// Command run after each deployed job as: <cmd> <dir> <area> <theme> <locale>
    #[arg(long)]
    pub compile_command: Option<PathBuf>,

    /// Path to bin/magento (default: <root>/bin/magento)
    #[arg(long)]
    pub magento_bin: Option<PathBuf>,
}

/// Runtime configuration parsed from CLI
#[derive(Debug, Clone)]
pub struct Config {
    /// Magento root directory
    pub magento_root: PathBuf,
    /// Areas to deploy
    pub areas: Vec<Area>,
    /// Themes to deploy (None = all discovered)
    pub themes: Option<Vec<ThemeCode>>,
    /// Locales to deploy (type-safe)
    pub locales: Vec<LocaleCode>,
    /// Number of parallel workers
    pub jobs: usize,
    /// Enable verbose output
    pub verbose: bool,
    /// Include development files (default: exclude)
    pub include_dev: bool,
    pub symlink: SymlinkMode,
    pub force: bool,
    pub content_version: Option<String>,
    pub strategy: String,
    pub compile_command: Option<PathBuf>,
    pub magento_bin: Option<PathBuf>,
}

impl Config {
    /// Create Config from CLI arguments
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let magento_root = cli.magento_root.canonicalize().unwrap_or(cli.magento_root);

        let areas: Vec<Area> = cli.area.iter().filter_map(|s| Area::parse(s)).collect();
        if areas.is_empty() {
            anyhow::bail!("No valid area given (expected frontend or adminhtml)");
        }

        let mut locales = Vec::with_capacity(cli.locale.len());
        for locale_str in cli.locale {
            match LocaleCode::validated(&locale_str) {
                Ok(locale) => locales.push(locale),
                Err(msg) => anyhow::bail!(msg),
            }
        }

        let themes = match cli.theme {
            Some(names) => {
                let mut themes = Vec::with_capacity(names.len());
                for name in names {
                    match ThemeCode::parse(&name) {
                        Some(code) => themes.push(code),
                        None => anyhow::bail!("Invalid theme '{name}': expected Vendor/name"),
                    }
                }
                Some(themes)
            }
            None => None,
        };

        Ok(Config {
            magento_root,
            areas,
            themes,
            locales,
            jobs: cli.jobs.max(1),
            verbose: cli.verbose,
            include_dev: cli.include_dev,
            symlink: cli.symlink,
            force: cli.force,
            content_version: cli.content_version.filter(|v| !v.trim().is_empty()),
            strategy: cli.strategy,
            compile_command: cli.compile_command,
            magento_bin: cli.magento_bin,
        })
    }

    /// Per-file placement used by workers
    pub fn placement(&self) -> PlacementMode {
        match self.symlink {
            SymlinkMode::File => PlacementMode::Symlink,
            SymlinkMode::Off | SymlinkMode::Locale => PlacementMode::Copy,
        }
    }

    /// Whether deferred locales become directory symlinks
    pub fn locale_symlinks(&self) -> bool {
        self.symlink == SymlinkMode::Locale
    }
}
