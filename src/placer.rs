//! First-writer-wins file placement.
//!
//! A destination entry is only ever created when nothing exists at that path
//! yet. Layers are processed highest priority first, so the first layer to
//! offer a relative path owns it, and a second run over an already deployed
//! tree places nothing.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use crate::error::{is_disk_full, DeployError};
use crate::filter::ExclusionFilter;

/// How a file lands in the destination tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Byte copy of the source
    #[default]
    Copy,
    /// Destination-relative symlink pointing at the source
    Symlink,
}

/// Outcome of placing one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// File placed; carries bytes written (0 for symlinks)
    Placed(u64),
    /// Something already occupies the destination
    Occupied,
}

/// Totals for one layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaceStats {
    pub files: u64,
    pub bytes: u64,
}

/// True if any entry (file, directory, or dangling symlink) exists at `path`
#[inline]
pub fn entry_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Copy a single file from src to dst, creating parent directories
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64, DeployError> {
    ensure_parent(dst)?;

    // Open the source separately so an unreadable source is not mistaken
    // for a failed write
    fs::File::open(src).map_err(|source| DeployError::ReadFailed {
        path: src.to_path_buf(),
        source,
    })?;

    fs::copy(src, dst).map_err(|e| {
        if is_disk_full(&e) {
            return DeployError::DiskFull {
                path: dst.to_path_buf(),
            };
        }
        DeployError::CopyFailed {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
            source: e,
        }
    })
}

/// Create a symlink at `link` whose target is `src` expressed relative to
/// the link's parent directory
pub fn link_file(src: &Path, link: &Path) -> Result<(), DeployError> {
    ensure_parent(link)?;

    let src_abs = absolute(src)?;
    let link_abs = absolute(link)?;
    let base = link_abs.parent().unwrap_or(Path::new("/"));
    let target = relative_path(base, &src_abs);

    symlink(&target, link, false).map_err(|source| DeployError::SymlinkFailure {
        link: link.to_path_buf(),
        target,
        source,
    })
}

/// Place one file at `dst` unless the destination is already occupied
pub fn place_file(src: &Path, dst: &Path, mode: PlacementMode) -> Result<Placement, DeployError> {
    if entry_exists(dst) {
        return Ok(Placement::Occupied);
    }

    match mode {
        PlacementMode::Copy => copy_file(src, dst).map(Placement::Placed),
        PlacementMode::Symlink => match link_file(src, dst) {
            Ok(()) => Ok(Placement::Placed(0)),
            Err(DeployError::SymlinkFailure { source, .. })
                if source.kind() == io::ErrorKind::AlreadyExists =>
            {
                Ok(Placement::Occupied)
            }
            Err(e) => Err(e),
        },
    }
}

/// Place every non-excluded file below `src` into `dst`, skipping paths that
/// already exist. Each placed file bumps `counter`.
///
/// Files placed before an error stay placed and stay counted.
pub fn place_tree(
    src: &Path,
    dst: &Path,
    filter: ExclusionFilter,
    mode: PlacementMode,
    counter: &AtomicU64,
) -> Result<PlaceStats, DeployError> {
    let mut stats = PlaceStats::default();

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| DeployError::WalkFailed {
            path: e.path().unwrap_or(src).to_path_buf(),
            source: io::Error::from(e),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let src_path = entry.path();
        let relative = src_path.strip_prefix(src).unwrap_or(src_path);
        if filter.excludes(relative) {
            continue;
        }

        if let Placement::Placed(bytes) = place_file(src_path, &dst.join(relative), mode)? {
            counter.fetch_add(1, Ordering::Relaxed);
            stats.files += 1;
            stats.bytes += bytes;
        }
    }

    Ok(stats)
}

/// Lexical relative path from directory `from` to `to`. Both must be
/// absolute (or both relative to the same base).
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn ensure_parent(path: &Path) -> Result<(), DeployError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(parent).map_err(|e| {
        if is_disk_full(&e) {
            return DeployError::DiskFull {
                path: parent.to_path_buf(),
            };
        }
        DeployError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        }
    })
}

#[cfg(unix)]
pub(crate) fn symlink(target: &Path, link: &Path, _is_dir: bool) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink(target: &Path, link: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
