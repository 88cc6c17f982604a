use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use magento_static_deploy::config::{Cli, Config};
use magento_static_deploy::deployer::DeployResult;
use magento_static_deploy::engine::{DeployReport, Progress, StaticDeployer};

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = Config::from_cli(cli)?;

    // Validate Magento root
    if !config.magento_root.exists() {
        bail!("Magento root not found: {}", config.magento_root.display());
    }

    let env_php = config.magento_root.join("app").join("etc").join("env.php");
    if !env_php.exists() {
        bail!(
            "Not a Magento installation: {} (app/etc/env.php not found)",
            config.magento_root.display()
        );
    }

    // Setup Ctrl+C handler
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Discovery and classification scans run on the global Rayon pool
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build_global()
        .ok();

    info!(
        root = %config.magento_root.display(),
        workers = config.jobs,
        locales = config.locales.len(),
        symlink = ?config.symlink,
        "Starting deployment"
    );

    let progress = JobProgress::new(config.verbose);
    let deployer = StaticDeployer::new(config);
    let report = deployer
        .run(&shutdown, &progress)
        .context("Deployment failed")?;
    progress.finish();

    print_report(&report);

    if report.cancelled {
        eprintln!("\nDeployment cancelled");
    }
    Ok(ExitCode::from(report.exit_status()))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("magento_static_deploy=debug,warn")
    } else {
        EnvFilter::new("magento_static_deploy=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// Progress bar driven from worker threads (verbose mode only)
struct JobProgress {
    bar: Option<ProgressBar>,
}

impl JobProgress {
    fn new(verbose: bool) -> Self {
        let bar = verbose.then(|| {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        });
        Self { bar }
    }

    fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_with_message("Complete");
        }
    }
}

impl Progress for JobProgress {
    fn planned(&self, results: usize) {
        if let Some(pb) = &self.bar {
            pb.set_length(results as u64);
        }
    }

    fn job_done(&self, result: &DeployResult) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("{}/{}", result.job.theme, result.job.locale));
            pb.inc(1);
        }
    }
}

fn print_report(report: &DeployReport) {
    let duration = report.duration.as_secs_f64();
    let total_files = report.total_files();
    let throughput = if duration > 0.0 {
        total_files as f64 / duration
    } else {
        0.0
    };

    println!(
        "Deployed {} files in {:.2}s ({:.0} files/sec)",
        total_files, duration, throughput
    );

    // Per-job breakdown
    for result in &report.results {
        println!(
            "  {}/{}/{}: {}",
            result.job.area,
            result.job.theme,
            result.job.locale,
            result.summary()
        );
    }

    if let Some(delegated) = &report.delegated {
        let themes: Vec<String> = delegated.themes.iter().map(|t| t.to_string()).collect();
        match &delegated.result {
            Ok(()) => println!("  delegated to bin/magento: {}", themes.join(", ")),
            Err(e) => println!(
                "  delegated to bin/magento: {}: FAILED: {}",
                themes.join(", "),
                e.report()
            ),
        }
    }

    if report.version_written {
        println!("Content version: {}", report.content_version);
    }
}
