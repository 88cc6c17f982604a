//! Hand-off of non-native themes to `bin/magento setup:static-content:deploy`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::DeployError;
use crate::theme::{Area, LocaleCode, ThemeCode};

/// One batch for the external deployment tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedRequest {
    pub areas: Vec<Area>,
    pub themes: Vec<ThemeCode>,
    pub locales: Vec<LocaleCode>,
    pub jobs: usize,
    /// Magento deploy strategy: standard, quick or compact
    pub strategy: String,
    pub force: bool,
    pub content_version: String,
}

impl DelegatedRequest {
    /// Arguments after the executable
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["setup:static-content:deploy".to_string()];
        args.extend(self.areas.iter().map(|a| format!("--area={a}")));
        args.extend(self.themes.iter().map(|t| format!("--theme={t}")));
        args.push(format!("--jobs={}", self.jobs));
        args.push(format!("--strategy={}", self.strategy));
        if self.force {
            args.push("--force".to_string());
        }
        args.push(format!("--content-version={}", self.content_version));
        args.extend(self.locales.iter().map(|l| l.to_string()));
        args
    }
}

/// `bin/magento` below the root
pub fn default_magento_bin(magento_root: &Path) -> PathBuf {
    magento_root.join("bin").join("magento")
}

/// Run the external tool and wait for it. A non-zero exit fails the whole
/// batch.
pub fn run_delegated(
    magento_bin: &Path,
    magento_root: &Path,
    request: &DelegatedRequest,
) -> Result<(), DeployError> {
    let args = request.args();
    info!(
        bin = %magento_bin.display(),
        themes = request.themes.len(),
        "Delegating themes to bin/magento"
    );
    debug!(args = ?args, "Delegated command line");

    let output = Command::new(magento_bin)
        .args(&args)
        .current_dir(magento_root)
        .output()?;

    if !output.stdout.is_empty() {
        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "bin/magento output");
    }

    if output.status.success() {
        Ok(())
    } else {
        Err(DeployError::DelegatedBackendFailure {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
