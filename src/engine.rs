//! Whole-run orchestration.
//!
//! Resolve themes, classify, deploy the native set in parallel, collapse
//! deferred locales, run the derived-asset hook, stamp the content version,
//! then hand the remaining themes to `bin/magento`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::backend::{default_magento_bin, run_delegated, DelegatedRequest};
use crate::classifier::classify;
use crate::compiler::{compile_results, AssetCompiler, CommandCompiler};
use crate::config::Config;
use crate::deployer::{
    deploy_job, generate_content_version, write_deployed_version, DeployContext, DeployResult,
    DeployStats, DeployStatus,
};
use crate::error::DeployError;
use crate::filter::ExclusionFilter;
use crate::scanner::{discover_themes, PackageIndex};
use crate::scheduler::{plan_jobs, run_jobs};
use crate::symlink::apply_locale_symlinks;
use crate::theme::{ThemeCode, ThemeGraph};

/// Progress hooks called while a run is in flight. Both default to no-ops.
pub trait Progress: Sync {
    /// Number of results the run will produce, known once jobs are planned
    fn planned(&self, _results: usize) {}

    /// Called from a worker thread as each real job finishes
    fn job_done(&self, _result: &DeployResult) {}
}

impl Progress for () {}

/// Outcome of handing themes to bin/magento
#[derive(Debug)]
pub struct DelegatedOutcome {
    pub themes: Vec<ThemeCode>,
    pub result: Result<(), DeployError>,
}

/// Everything a run produced
#[derive(Debug)]
pub struct DeployReport {
    /// One entry per native job, real jobs first, then symlinked locales
    pub results: Vec<DeployResult>,
    pub delegated: Option<DelegatedOutcome>,
    pub content_version: String,
    pub version_written: bool,
    pub cancelled: bool,
    pub duration: Duration,
}

impl DeployReport {
    /// Files actually placed; symlinked locales add nothing
    pub fn total_files(&self) -> u64 {
        self.results
            .iter()
            .filter(|r| !r.symlinked)
            .map(|r| r.file_count)
            .sum()
    }

    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.status, DeployStatus::NotFound))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    /// Any failure other than "not found", including the delegated batch
    pub fn has_failure(&self) -> bool {
        self.failed() > 0 || self.delegated.as_ref().is_some_and(|d| d.result.is_err())
    }

    pub fn has_success(&self) -> bool {
        self.successful() > 0 || self.delegated.as_ref().is_some_and(|d| d.result.is_ok())
    }

    /// Process exit status: 0 ok, 1 partial failure, 2 total failure, 130 cancelled
    pub fn exit_status(&self) -> u8 {
        if self.cancelled {
            130
        } else if self.has_failure() && !self.has_success() {
            2
        } else if self.has_failure() {
            1
        } else {
            0
        }
    }
}

/// Runs one deployment described by an immutable [`Config`]
pub struct StaticDeployer {
    config: Config,
    compiler: Option<Box<dyn AssetCompiler>>,
}

impl StaticDeployer {
    pub fn new(config: Config) -> Self {
        let compiler = config
            .compile_command
            .clone()
            .map(|cmd| Box::new(CommandCompiler::new(cmd)) as Box<dyn AssetCompiler>);
        Self { config, compiler }
    }

    /// Replace the derived-asset compiler
    pub fn with_compiler(mut self, compiler: Box<dyn AssetCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Requested themes, or every theme under app/design in the requested
    /// areas. Duplicates are dropped, first occurrence wins.
    pub fn requested_themes(&self) -> Result<Vec<ThemeCode>, DeployError> {
        let mut themes = match &self.config.themes {
            Some(themes) => themes.clone(),
            None => {
                let mut all = Vec::new();
                for &area in &self.config.areas {
                    all.extend(discover_themes(&self.config.magento_root, area)?);
                }
                all
            }
        };

        let mut seen = std::collections::HashSet::new();
        themes.retain(|t| seen.insert(t.clone()));
        Ok(themes)
    }

    /// Execute the run. Per-job errors end up in the report; only a failure
    /// to enumerate themes is returned as an error.
    pub fn run(
        &self,
        shutdown: &AtomicBool,
        progress: &dyn Progress,
    ) -> Result<DeployReport, DeployError> {
        let start = Instant::now();
        let config = &self.config;
        let root = config.magento_root.as_path();

        let themes = self.requested_themes()?;
        if themes.is_empty() {
            return Err(DeployError::NoThemes {
                path: root.to_path_buf(),
            });
        }

        let graph = ThemeGraph::build(root, &themes, &config.areas);
        let classification = classify(&graph, &themes, &config.areas);
        info!(
            native = classification.native.len(),
            delegated = classification.delegated.len(),
            resolved = graph.len(),
            "Themes classified"
        );

        let plan = plan_jobs(
            &config.locales,
            &classification.native,
            &config.areas,
            config.locale_symlinks(),
        );
        progress.planned(plan.total());

        let packages = if plan.jobs.is_empty() {
            PackageIndex::default()
        } else {
            PackageIndex::scan(root)
        };
        info!(packages = packages.len(), "Package index built");

        let stats = DeployStats::new();
        let ctx = DeployContext {
            magento_root: root,
            graph: &graph,
            packages: &packages,
            filter: ExclusionFilter::new(config.include_dev),
            placement: config.placement(),
            force: config.force,
            stats: &stats,
        };

        let mut results = run_jobs(&plan.jobs, config.jobs, shutdown, |job| {
            let result = deploy_job(job, &ctx);
            progress.job_done(&result);
            result
        });

        let linked = apply_locale_symlinks(root, &plan.groups, &results);
        for result in &linked {
            progress.job_done(result);
        }

        let cancelled = shutdown.load(Ordering::Relaxed);
        match &self.compiler {
            Some(compiler) if !cancelled => {
                let compiled = compile_results(compiler.as_ref(), root, &results);
                info!(compiled, "Derived assets compiled");
            }
            _ => {}
        }
        results.extend(linked);

        let content_version = config
            .content_version
            .clone()
            .unwrap_or_else(generate_content_version);
        let version_written = stamp_version(root, &content_version, &results);

        let delegated = if classification.delegated.is_empty() || cancelled {
            None
        } else {
            Some(self.delegate(classification.delegated, &content_version))
        };

        info!(
            files = stats.files_placed.get(),
            bytes = stats.bytes_copied.get(),
            errors = stats.errors.get(),
            "Native deployment finished"
        );

        Ok(DeployReport {
            results,
            delegated,
            content_version,
            version_written,
            cancelled,
            duration: start.elapsed(),
        })
    }

    fn delegate(&self, themes: Vec<ThemeCode>, content_version: &str) -> DelegatedOutcome {
        let config = &self.config;
        let request = DelegatedRequest {
            areas: config.areas.clone(),
            themes,
            locales: config.locales.clone(),
            jobs: config.jobs,
            strategy: config.strategy.clone(),
            force: config.force,
            content_version: content_version.to_string(),
        };
        let bin = config
            .magento_bin
            .clone()
            .unwrap_or_else(|| default_magento_bin(&config.magento_root));

        let result = run_delegated(&bin, &config.magento_root, &request);
        if let Err(e) = &result {
            warn!(error = %e.report(), "Delegated deployment failed");
        }
        DelegatedOutcome {
            themes: request.themes,
            result,
        }
    }
}

/// Write deployed_version.txt if any real job placed a file
fn stamp_version(root: &Path, version: &str, results: &[DeployResult]) -> bool {
    let placed: u64 = results
        .iter()
        .filter(|r| !r.symlinked)
        .map(|r| r.file_count)
        .sum();
    if placed == 0 {
        return false;
    }

    match write_deployed_version(root, version) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e.report(), "Could not write content version");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SymlinkMode;
    use crate::deployer::{read_deployed_version, DeployJob};
    use crate::theme::{Area, LocaleCode};
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn touch(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn config(root: &Path, themes: Option<&[&str]>, locales: &[&str]) -> Config {
        Config {
            magento_root: root.to_path_buf(),
            areas: vec![Area::Frontend],
            themes: themes.map(|t| t.iter().map(|c| ThemeCode::parse(c).unwrap()).collect()),
            locales: locales.iter().map(|l| LocaleCode::new(l)).collect(),
            jobs: 2,
            verbose: false,
            include_dev: false,
            symlink: SymlinkMode::Off,
            force: false,
            content_version: Some("12345".to_string()),
            strategy: "quick".to_string(),
            compile_command: None,
            magento_bin: None,
        }
    }

    fn hyva_child(root: &Path) {
        let child = root.join("app/design/frontend/Acme/shop");
        touch(&child.join("theme.xml"), "<theme><parent>Hyva/reset</parent></theme>");
        touch(&child.join("web/js/app.js"), "app");
        let reset = root.join("app/design/frontend/Hyva/reset");
        touch(&reset.join("theme.xml"), "<theme/>");
        touch(&reset.join("web/css/reset.css"), "reset");
    }

    #[derive(Default)]
    struct Counter {
        planned: AtomicUsize,
        done: AtomicUsize,
    }

    impl Progress for Counter {
        fn planned(&self, results: usize) {
            self.planned.store(results, Ordering::Relaxed);
        }

        fn job_done(&self, _result: &DeployResult) {
            self.done.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_run_deploys_and_stamps_version() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        hyva_child(root);

        let deployer = StaticDeployer::new(config(root, None, &["en_US", "nl_NL"]));
        let counter = Counter::default();
        let report = deployer.run(&AtomicBool::new(false), &counter).unwrap();

        // Discovery found both themes, both native
        assert_eq!(report.results.len(), 4);
        assert_eq!(report.successful(), 4);
        assert_eq!(report.total_files(), 2 + 1 + 2 + 1);
        assert!(report.delegated.is_none());
        assert!(report.version_written);
        assert_eq!(read_deployed_version(root), Some("12345".to_string()));
        assert_eq!(counter.planned.load(Ordering::Relaxed), 4);
        assert_eq!(counter.done.load(Ordering::Relaxed), 4);
        assert_eq!(report.exit_status(), 0);
    }

    #[test]
    fn test_run_missing_theme_is_skipped_without_version() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let deployer = StaticDeployer::new(config(root, Some(&["Ghost/theme"]), &["en_US"]));
        let report = deployer.run(&AtomicBool::new(false), &()).unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.total_files(), 0);
        assert!(!report.has_failure());
        assert!(!report.version_written);
        assert_eq!(read_deployed_version(root), None);
    }

    #[test]
    fn test_run_without_themes_is_error() {
        let temp = TempDir::new().unwrap();
        let deployer = StaticDeployer::new(config(temp.path(), None, &["en_US"]));
        assert!(matches!(
            deployer.run(&AtomicBool::new(false), &()),
            Err(DeployError::NoThemes { .. })
        ));
    }

    #[test]
    fn test_run_cancelled_before_dispatch() {
        let temp = TempDir::new().unwrap();
        hyva_child(temp.path());

        let deployer = StaticDeployer::new(config(temp.path(), Some(&["Acme/shop"]), &["en_US"]));
        let report = deployer.run(&AtomicBool::new(true), &()).unwrap();

        assert!(report.cancelled);
        assert_eq!(report.exit_status(), 130);
        assert!(matches!(report.results[0].status, DeployStatus::Cancelled));
    }

    #[test]
    fn test_requested_themes_deduplicated() {
        let temp = TempDir::new().unwrap();
        let deployer = StaticDeployer::new(config(
            temp.path(),
            Some(&["Acme/shop", "Hyva/reset", "Acme/shop"]),
            &["en_US"],
        ));
        let themes = deployer.requested_themes().unwrap();
        assert_eq!(themes.len(), 2);
        assert_eq!(themes[0].as_str(), "Acme/shop");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_delegates_non_native_themes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let luma = root.join("app/design/frontend/Magento/luma");
        touch(&luma.join("theme.xml"), "<theme/>");
        touch(&luma.join("web/css/source/_theme.less"), "@x: 1;");

        let mut cfg = config(root, Some(&["Magento/luma"]), &["en_US"]);
        cfg.magento_bin = Some(std::path::PathBuf::from("false"));
        let report = StaticDeployer::new(cfg).run(&AtomicBool::new(false), &()).unwrap();

        assert!(report.results.is_empty());
        let delegated = report.delegated.as_ref().unwrap();
        assert_eq!(delegated.themes, vec![ThemeCode::parse("Magento/luma").unwrap()]);
        assert!(matches!(
            delegated.result,
            Err(DeployError::DelegatedBackendFailure { code: 1, .. })
        ));
        assert_eq!(report.exit_status(), 2);
    }

    #[test]
    fn test_report_exit_status_partial_failure() {
        let job = |locale: &str| {
            DeployJob::new(
                LocaleCode::new(locale),
                ThemeCode::parse("A/b").unwrap(),
                Area::Frontend,
            )
        };
        let report = DeployReport {
            results: vec![
                DeployResult::new(job("en_US"), DeployStatus::Success, 3, Duration::ZERO),
                DeployResult::new(
                    job("nl_NL"),
                    DeployStatus::Failed(DeployError::Cancelled),
                    0,
                    Duration::ZERO,
                ),
            ],
            delegated: None,
            content_version: "1".to_string(),
            version_written: true,
            cancelled: false,
            duration: Duration::ZERO,
        };

        assert!(report.has_failure());
        assert!(report.has_success());
        assert_eq!(report.exit_status(), 1);
    }
}
