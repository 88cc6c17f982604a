//! Locale-level symlink reduction.
//!
//! Locale only changes the destination path of a native theme, never which
//! assets are selected, so one locale per (theme, area) is deployed for real
//! and every other locale becomes a directory symlink to it. Linking runs
//! sequentially after all real jobs have finished.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::deployer::{remove_entry, DeployJob, DeployResult, DeployStatus};
use crate::error::DeployError;
use crate::placer::{relative_path, symlink};
use crate::theme::{Area, LocaleCode, ThemeCode};

/// Locales of one (theme, area) sharing the representative's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkGroup {
    pub theme: ThemeCode,
    pub area: Area,
    pub representative: LocaleCode,
    pub deferred: Vec<LocaleCode>,
}

impl SymlinkGroup {
    fn job(&self, locale: &LocaleCode) -> DeployJob {
        DeployJob::new(locale.clone(), self.theme.clone(), self.area)
    }
}

/// Keep the first-seen locale of every (theme, area) as a real job and defer
/// the rest. Groups come out in the order their representative was seen.
pub fn partition_locales(jobs: Vec<DeployJob>) -> (Vec<DeployJob>, Vec<SymlinkGroup>) {
    let mut real = Vec::new();
    let mut groups: Vec<SymlinkGroup> = Vec::new();
    let mut index: HashMap<(ThemeCode, Area), usize> = HashMap::new();

    for job in jobs {
        match index.get(&(job.theme.clone(), job.area)) {
            Some(&i) => groups[i].deferred.push(job.locale),
            None => {
                index.insert((job.theme.clone(), job.area), groups.len());
                groups.push(SymlinkGroup {
                    theme: job.theme.clone(),
                    area: job.area,
                    representative: job.locale.clone(),
                    deferred: Vec::new(),
                });
                real.push(job);
            }
        }
    }

    groups.retain(|g| !g.deferred.is_empty());
    (real, groups)
}

/// Replace whatever is at `link` with a relative symlink to the directory
/// `target`
fn link_locale_dir(target: &Path, link: &Path) -> Result<(), DeployError> {
    let parent = link.parent().unwrap_or(Path::new("."));
    let relative = relative_path(parent, target);

    // A real directory at `link` is only removed if the target does not
    // resolve into it
    let is_real_dir = fs::symlink_metadata(link).is_ok_and(|m| m.is_dir());
    if is_real_dir {
        if let (Ok(resolved_target), Ok(resolved_link)) =
            (fs::canonicalize(target), fs::canonicalize(link))
        {
            if resolved_target.starts_with(&resolved_link) {
                return Err(DeployError::SymlinkFailure {
                    link: link.to_path_buf(),
                    target: relative,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "target resolves into the directory being replaced",
                    ),
                });
            }
        }
    }

    let io_result = remove_entry(link)
        .and_then(|()| fs::create_dir_all(parent))
        .and_then(|()| symlink(&relative, link, true));

    io_result.map_err(|source| DeployError::SymlinkFailure {
        link: link.to_path_buf(),
        target: relative,
        source,
    })
}

/// Create the deferred locale symlinks and synthesize their results.
///
/// `results` are the real jobs' results. A deferred locale mirrors its
/// representative: linked with the same file count on success, or on a skip
/// whose output directory exists; left alone with the same outcome otherwise.
/// A link failure is recorded on that locale's result only.
pub fn apply_locale_symlinks(
    magento_root: &Path,
    groups: &[SymlinkGroup],
    results: &[DeployResult],
) -> Vec<DeployResult> {
    let by_job: HashMap<&DeployJob, &DeployResult> =
        results.iter().map(|r| (&r.job, r)).collect();

    let mut out = Vec::new();
    for group in groups {
        let rep_job = group.job(&group.representative);
        let rep_dir = rep_job.output_path(magento_root);
        let representative = by_job.get(&rep_job).copied();

        for locale in &group.deferred {
            let job = group.job(locale);
            let result = match representative {
                Some(rep) if rep.is_success() => {
                    link_result(job, &group.representative, &rep_dir, rep, magento_root)
                }
                Some(rep) if matches!(rep.status, DeployStatus::NotFound) => {
                    if rep_dir.is_dir() {
                        link_result(job, &group.representative, &rep_dir, rep, magento_root)
                    } else {
                        DeployResult::new(job, DeployStatus::NotFound, 0, Default::default())
                    }
                }
                Some(rep) => mirror_unlinked(job, rep),
                None => DeployResult::cancelled(job),
            };
            out.push(result);
        }
    }
    out
}

fn link_result(
    job: DeployJob,
    rep_locale: &LocaleCode,
    rep_dir: &Path,
    rep: &DeployResult,
    magento_root: &Path,
) -> DeployResult {
    let link = job.output_path(magento_root);
    match link_locale_dir(rep_dir, &link) {
        Ok(()) => {
            debug!(
                theme = %job.theme,
                area = %job.area,
                locale = %job.locale,
                target = %rep_locale,
                "Locale symlinked"
            );
            let status = match rep.status {
                DeployStatus::NotFound => DeployStatus::NotFound,
                _ => DeployStatus::Success,
            };
            let mut result = DeployResult::new(job, status, rep.file_count, rep.duration);
            result.symlinked = true;
            result.symlink_target = Some(rep_locale.clone());
            result
        }
        Err(e) => {
            warn!(
                theme = %job.theme,
                locale = %job.locale,
                error = %e.report(),
                "Locale symlink failed"
            );
            DeployResult::new(job, DeployStatus::Failed(e), 0, Default::default())
        }
    }
}

fn mirror_unlinked(job: DeployJob, rep: &DeployResult) -> DeployResult {
    let status = match &rep.status {
        DeployStatus::Failed(e) => DeployStatus::Failed(DeployError::RepresentativeFailed {
            locale: rep.job.locale.to_string(),
            reason: e.report(),
        }),
        _ => DeployStatus::Cancelled,
    };
    DeployResult::new(job, status, 0, Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn job(locale: &str, theme: &str, area: Area) -> DeployJob {
        DeployJob::new(LocaleCode::new(locale), ThemeCode::parse(theme).unwrap(), area)
    }

    #[test]
    fn test_partition_keeps_first_locale() {
        let jobs = vec![
            job("en_US", "Vendor/Demo", Area::Frontend),
            job("en_US", "Vendor/Demo", Area::Adminhtml),
            job("de_DE", "Vendor/Demo", Area::Frontend),
            job("de_DE", "Vendor/Demo", Area::Adminhtml),
            job("fr_FR", "Vendor/Demo", Area::Frontend),
        ];

        let (real, groups) = partition_locales(jobs);

        assert_eq!(real.len(), 2);
        assert!(real.iter().all(|j| j.locale.as_str() == "en_US"));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].area, Area::Frontend);
        assert_eq!(
            groups[0].deferred,
            vec![LocaleCode::new("de_DE"), LocaleCode::new("fr_FR")]
        );
        assert_eq!(groups[1].deferred, vec![LocaleCode::new("de_DE")]);
    }

    #[test]
    fn test_partition_single_locale_has_no_groups() {
        let (real, groups) = partition_locales(vec![job("en_US", "A/b", Area::Frontend)]);
        assert_eq!(real.len(), 1);
        assert!(groups.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_creates_relative_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let rep_job = job("en_US", "Vendor/Demo", Area::Frontend);
        let rep_dir = rep_job.output_path(root);
        fs::create_dir_all(rep_dir.join("js")).unwrap();
        fs::write(rep_dir.join("js/app.js"), "x").unwrap();

        // Stale real directory from an earlier non-symlink run
        let stale = root.join("pub/static/frontend/Vendor/Demo/fr_FR");
        fs::create_dir_all(&stale).unwrap();
        fs::write(stale.join("old.js"), "old").unwrap();

        let results = vec![DeployResult::new(
            rep_job,
            DeployStatus::Success,
            7,
            Duration::from_millis(5),
        )];
        let groups = vec![SymlinkGroup {
            theme: ThemeCode::parse("Vendor/Demo").unwrap(),
            area: Area::Frontend,
            representative: LocaleCode::new("en_US"),
            deferred: vec![LocaleCode::new("de_DE"), LocaleCode::new("fr_FR")],
        }];

        let linked = apply_locale_symlinks(root, &groups, &results);

        assert_eq!(linked.len(), 2);
        for result in &linked {
            assert!(result.is_success());
            assert!(result.symlinked);
            assert_eq!(result.symlink_target, Some(LocaleCode::new("en_US")));
            assert_eq!(result.file_count, 7);

            let link = result.job.output_path(root);
            assert_eq!(fs::read_link(&link).unwrap(), Path::new("en_US"));
            assert!(link.join("js/app.js").is_file());
        }
        assert!(!stale.join("old.js").exists());
    }

    #[test]
    fn test_failed_representative_is_mirrored_without_link() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let rep_job = job("en_US", "Vendor/Demo", Area::Frontend);
        let results = vec![DeployResult::new(
            rep_job,
            DeployStatus::Failed(DeployError::Cancelled),
            0,
            Duration::ZERO,
        )];
        let groups = vec![SymlinkGroup {
            theme: ThemeCode::parse("Vendor/Demo").unwrap(),
            area: Area::Frontend,
            representative: LocaleCode::new("en_US"),
            deferred: vec![LocaleCode::new("de_DE")],
        }];

        let linked = apply_locale_symlinks(root, &groups, &results);

        assert_eq!(linked.len(), 1);
        assert!(linked[0].is_failure());
        assert!(!linked[0].symlinked);
        assert!(fs::symlink_metadata(linked[0].job.output_path(root)).is_err());
    }

    #[test]
    fn test_cancelled_representative_cancels_deferred() {
        let temp = TempDir::new().unwrap();
        let rep_job = job("en_US", "Vendor/Demo", Area::Frontend);
        let results = vec![DeployResult::cancelled(rep_job)];
        let groups = vec![SymlinkGroup {
            theme: ThemeCode::parse("Vendor/Demo").unwrap(),
            area: Area::Frontend,
            representative: LocaleCode::new("en_US"),
            deferred: vec![LocaleCode::new("nl_NL")],
        }];

        let linked = apply_locale_symlinks(temp.path(), &groups, &results);
        assert!(matches!(linked[0].status, DeployStatus::Cancelled));
    }

    #[cfg(unix)]
    #[test]
    fn test_refuses_to_replace_directory_the_target_resolves_into() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let de_dir = job("de_DE", "Vendor/Demo", Area::Frontend).output_path(root);
        fs::create_dir_all(de_dir.join("css")).unwrap();
        fs::write(de_dir.join("css/app.css"), "assets").unwrap();
        let rep_job = job("en_US", "Vendor/Demo", Area::Frontend);
        symlink(Path::new("de_DE"), &rep_job.output_path(root), true).unwrap();

        let results = vec![DeployResult::new(rep_job, DeployStatus::NotFound, 0, Duration::ZERO)];
        let groups = vec![SymlinkGroup {
            theme: ThemeCode::parse("Vendor/Demo").unwrap(),
            area: Area::Frontend,
            representative: LocaleCode::new("en_US"),
            deferred: vec![LocaleCode::new("de_DE")],
        }];

        let linked = apply_locale_symlinks(root, &groups, &results);

        assert!(matches!(
            linked[0].error(),
            Some(DeployError::SymlinkFailure { .. })
        ));
        assert_eq!(fs::read_to_string(de_dir.join("css/app.css")).unwrap(), "assets");
    }
}
