//! Post-deploy hook for derived assets (e.g. a Tailwind build).
//!
//! Runs once per real, successfully deployed job after the parallel phase.
//! Failures are logged and never change the job's outcome.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::deployer::{DeployResult, DeployStatus};
use crate::theme::{Area, LocaleCode, ThemeCode};

/// What a compiler gets to work on
#[derive(Debug, Clone, Copy)]
pub struct CompileTarget<'a> {
    pub destination: &'a Path,
    pub area: Area,
    pub theme: &'a ThemeCode,
    pub locale: &'a LocaleCode,
}

/// Derived-asset compiler
pub trait AssetCompiler: Sync {
    fn compile(&self, target: &CompileTarget<'_>) -> anyhow::Result<()>;
}

/// Runs `<program> <destination> <area> <theme> <locale>`
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: PathBuf,
}

impl CommandCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl AssetCompiler for CommandCompiler {
    fn compile(&self, target: &CompileTarget<'_>) -> anyhow::Result<()> {
        let output = Command::new(&self.program)
            .arg(target.destination)
            .arg(target.area.as_str())
            .arg(target.theme.as_str())
            .arg(target.locale.as_str())
            .output()?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Compile every real successful result. Returns how many compiled cleanly.
pub fn compile_results(
    compiler: &dyn AssetCompiler,
    magento_root: &Path,
    results: &[DeployResult],
) -> usize {
    let mut compiled = 0;
    for result in results {
        if !matches!(result.status, DeployStatus::Success) || result.symlinked {
            continue;
        }

        let job = &result.job;
        let destination = job.output_path(magento_root);
        let target = CompileTarget {
            destination: &destination,
            area: job.area,
            theme: &job.theme,
            locale: &job.locale,
        };

        match compiler.compile(&target) {
            Ok(()) => {
                debug!(theme = %job.theme, locale = %job.locale, "Derived assets compiled");
                compiled += 1;
            }
            Err(e) => warn!(
                theme = %job.theme,
                area = %job.area,
                locale = %job.locale,
                error = %format!("{e:#}"),
                "Derived asset compilation failed"
            ),
        }
    }
    compiled
}
