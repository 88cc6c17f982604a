//! Deployment of a single (locale, theme, area) job.
//!
//! Handles the layered copy into `pub/static/{area}/{Vendor}/{theme}/{locale}`
//! with cache-aligned atomic counters for run-wide progress.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::error::DeployError;
use crate::filter::ExclusionFilter;
use crate::layers::enumerate_layers;
use crate::placer::{place_tree, PlacementMode};
use crate::scanner::PackageIndex;
use crate::theme::{Area, LocaleCode, ThemeCode, ThemeGraph};

/// Name of the content version marker below pub/static
pub const VERSION_FILE: &str = "deployed_version.txt";

/// A deployment job combining locale, theme, and area
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeployJob {
    pub locale: LocaleCode,
    pub theme: ThemeCode,
    pub area: Area,
}

impl DeployJob {
    pub fn new(locale: LocaleCode, theme: ThemeCode, area: Area) -> Self {
        Self {
            locale,
            theme,
            area,
        }
    }

    /// Destination subtree owned by this job
    pub fn output_path(&self, magento_root: &Path) -> PathBuf {
        static_root(magento_root)
            .join(self.area.as_str())
            .join(self.theme.vendor())
            .join(self.theme.name())
            .join(self.locale.as_str())
    }
}

/// Deployment outcome
#[derive(Debug)]
pub enum DeployStatus {
    /// Successfully deployed
    Success,
    /// No layer produced any file; skipped, not an error
    NotFound,
    /// Failed with error
    Failed(DeployError),
    /// Never started because of Ctrl+C
    Cancelled,
}

/// Result of a deployment job
#[derive(Debug)]
pub struct DeployResult {
    /// Which job this result belongs to
    pub job: DeployJob,
    pub status: DeployStatus,
    /// Number of files placed
    pub file_count: u64,
    /// Time taken for this job
    pub duration: Duration,
    /// Destination is a directory symlink to another locale's output
    pub symlinked: bool,
    pub symlink_target: Option<LocaleCode>,
}

impl DeployResult {
    pub fn new(job: DeployJob, status: DeployStatus, file_count: u64, duration: Duration) -> Self {
        Self {
            job,
            status,
            file_count,
            duration,
            symlinked: false,
            symlink_target: None,
        }
    }

    pub fn cancelled(job: DeployJob) -> Self {
        Self::new(job, DeployStatus::Cancelled, 0, Duration::ZERO)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, DeployStatus::Success)
    }

    /// Failed for a reason other than "not found"
    pub fn is_failure(&self) -> bool {
        matches!(&self.status, DeployStatus::Failed(e) if e.is_failure())
    }

    pub fn error(&self) -> Option<&DeployError> {
        match &self.status {
            DeployStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// One-line outcome for the run report
    pub fn summary(&self) -> String {
        match &self.status {
            DeployStatus::Success => match &self.symlink_target {
                Some(target) if self.symlinked => {
                    format!("{} files (symlink to {})", self.file_count, target)
                }
                _ => format!(
                    "{} files in {:.1}s",
                    self.file_count,
                    self.duration.as_secs_f64()
                ),
            },
            DeployStatus::NotFound => {
                let reason = DeployError::NotFound {
                    theme: self.job.theme.to_string(),
                    area: self.job.area.to_string(),
                };
                format!("skipped ({reason})")
            }
            DeployStatus::Failed(e) => format!("FAILED: {}", e.report()),
            DeployStatus::Cancelled => "cancelled".to_string(),
        }
    }
}

/// Cache-line aligned atomic counter to prevent false sharing
/// Each counter is on its own 64-byte cache line
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAlignedAtomic(pub AtomicU64);

impl CacheAlignedAtomic {
    pub const fn new(val: u64) -> Self {
        Self(AtomicU64::new(val))
    }

    #[inline]
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run-wide counters for progress reporting, updated from every worker
#[derive(Debug, Default)]
pub struct DeployStats {
    pub files_placed: CacheAlignedAtomic,
    pub bytes_copied: CacheAlignedAtomic,
    pub errors: CacheAlignedAtomic,
}

impl DeployStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Read-only state shared by all workers of one run
#[derive(Debug)]
pub struct DeployContext<'a> {
    pub magento_root: &'a Path,
    pub graph: &'a ThemeGraph,
    pub packages: &'a PackageIndex,
    pub filter: ExclusionFilter,
    pub placement: PlacementMode,
    /// Clear the job's destination before placing
    pub force: bool,
    pub stats: &'a DeployStats,
}

/// pub/static below the Magento root
pub fn static_root(magento_root: &Path) -> PathBuf {
    magento_root.join("pub").join("static")
}

/// Read deployed version from pub/static/deployed_version.txt
pub fn read_deployed_version(magento_root: &Path) -> Option<String> {
    fs::read_to_string(static_root(magento_root).join(VERSION_FILE))
        .ok()
        .map(|s| s.trim().to_string())
}

/// Write the content version marker
pub fn write_deployed_version(magento_root: &Path, version: &str) -> Result<(), DeployError> {
    let dir = static_root(magento_root);
    fs::create_dir_all(&dir).map_err(|source| DeployError::CreateDirFailed {
        path: dir.clone(),
        source,
    })?;
    fs::write(dir.join(VERSION_FILE), version)?;
    Ok(())
}

/// Content version used when the caller supplies none: UNIX seconds
pub fn generate_content_version() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

/// Remove whatever sits at `path`: a symlink or file is unlinked, a
/// directory removed recursively
pub(crate) fn remove_entry(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Deploy a single theme for a single locale and area
pub fn deploy_job(job: &DeployJob, ctx: &DeployContext<'_>) -> DeployResult {
    let start = Instant::now();
    let (status, file_count) = match place_layers(job, ctx) {
        Ok(0) => (DeployStatus::NotFound, 0),
        Ok(files) => (DeployStatus::Success, files),
        Err((e, files)) => {
            ctx.stats.errors.add(1);
            (DeployStatus::Failed(e), files)
        }
    };

    ctx.stats.files_placed.add(file_count);
    let result = DeployResult::new(job.clone(), status, file_count, start.elapsed());
    match &result.status {
        DeployStatus::Success => debug!(
            area = %job.area,
            theme = %job.theme,
            locale = %job.locale,
            files = file_count,
            elapsed_ms = result.duration.as_millis() as u64,
            "Job deployed"
        ),
        DeployStatus::NotFound => debug!(
            area = %job.area,
            theme = %job.theme,
            locale = %job.locale,
            "Theme not found, skipped"
        ),
        DeployStatus::Failed(e) => warn!(
            area = %job.area,
            theme = %job.theme,
            locale = %job.locale,
            error = %e.report(),
            "Job failed"
        ),
        DeployStatus::Cancelled => {}
    }
    result
}

/// Returns placed file count, or the aborting error with the count so far
fn place_layers(job: &DeployJob, ctx: &DeployContext<'_>) -> Result<u64, (DeployError, u64)> {
    let chain = ctx.graph.ancestry(&job.theme, job.area);
    if chain.is_empty() {
        return Ok(0);
    }

    let dest = job.output_path(ctx.magento_root);
    claim_destination(&dest, ctx.force).map_err(|source| {
        (
            DeployError::DestinationCreateFailure {
                path: dest.clone(),
                source,
            },
            0,
        )
    })?;

    let layers = enumerate_layers(ctx.magento_root, &chain, job.area, ctx.packages);

    let placed = AtomicU64::new(0);
    for layer in &layers {
        let target = layer.destination(&dest);
        match place_tree(&layer.path, &target, ctx.filter, ctx.placement, &placed) {
            Ok(stats) => ctx.stats.bytes_copied.add(stats.bytes),
            // Destination side: the job's own output is broken
            Err(e) if !e.is_source_error() => {
                return Err((e, placed.load(Ordering::Relaxed)));
            }
            Err(e) if layer.kind.is_required() => {
                return Err((
                    DeployError::RequiredLayerFailure {
                        path: layer.path.clone(),
                        source: Box::new(e),
                    },
                    placed.load(Ordering::Relaxed),
                ));
            }
            Err(e) => {
                let err = DeployError::ExtensionLayerFailure {
                    path: layer.path.clone(),
                    source: Box::new(e),
                };
                warn!(
                    theme = %job.theme,
                    locale = %job.locale,
                    ordinal = layer.ordinal,
                    error = %err.report(),
                    "Layer skipped"
                );
            }
        }
    }

    Ok(placed.load(Ordering::Relaxed))
}

/// Make `dest` a real directory owned by this job. A symlink or file left
/// there (e.g. by an earlier locale-symlink run) is unlinked, never followed.
fn claim_destination(dest: &Path, force: bool) -> std::io::Result<()> {
    if force {
        remove_entry(dest)?;
    } else if let Ok(meta) = fs::symlink_metadata(dest) {
        if !meta.is_dir() {
            // Windows directory symlinks need remove_dir
            fs::remove_file(dest).or_else(|_| fs::remove_dir(dest))?;
        }
    }
    fs::create_dir_all(dest)
}
