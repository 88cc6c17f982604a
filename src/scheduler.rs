//! Fans deployment jobs out over a fixed pool of worker threads.
//!
//! Workers pull tasks from one bounded queue. Every task carries its job and
//! an exclusive borrow of that job's result slot, so workers write disjoint
//! slots without any lock, and the driver reads the slots back once every
//! worker has been joined.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, info};

use crate::deployer::{DeployJob, DeployResult};
use crate::symlink::{partition_locales, SymlinkGroup};
use crate::theme::{Area, LocaleCode, ThemeCode};

/// Jobs to run in parallel plus the locales deferred to directory symlinks
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    pub jobs: Vec<DeployJob>,
    pub groups: Vec<SymlinkGroup>,
}

impl JobPlan {
    /// Number of results the run will report
    pub fn total(&self) -> usize {
        self.jobs.len() + self.groups.iter().map(|g| g.deferred.len()).sum::<usize>()
    }
}

/// Generate the job matrix for all locale × theme × area combinations,
/// locale-major
pub fn job_matrix(locales: &[LocaleCode], themes: &[ThemeCode], areas: &[Area]) -> Vec<DeployJob> {
    let mut jobs = Vec::with_capacity(locales.len() * themes.len() * areas.len());

    for locale in locales {
        for theme in themes {
            for &area in areas {
                jobs.push(DeployJob::new(locale.clone(), theme.clone(), area));
            }
        }
    }

    jobs
}

/// Build the job plan. With `locale_symlinks` and more than one locale, only
/// the first locale of every (theme, area) becomes a real job.
pub fn plan_jobs(
    locales: &[LocaleCode],
    themes: &[ThemeCode],
    areas: &[Area],
    locale_symlinks: bool,
) -> JobPlan {
    let jobs = job_matrix(locales, themes, areas);

    if locale_symlinks && locales.len() > 1 {
        let (jobs, groups) = partition_locales(jobs);
        JobPlan { jobs, groups }
    } else {
        JobPlan {
            jobs,
            groups: Vec::new(),
        }
    }
}

struct Task<'a> {
    job: &'a DeployJob,
    slot: &'a mut Option<DeployResult>,
}

/// Run every job on `workers` threads and return one result per job, in job
/// order. Once `shutdown` is set no further job is dispatched; jobs already
/// running finish and undispatched jobs report `Cancelled`.
pub fn run_jobs<F>(
    jobs: &[DeployJob],
    workers: usize,
    shutdown: &AtomicBool,
    work: F,
) -> Vec<DeployResult>
where
    F: Fn(&DeployJob) -> DeployResult + Sync,
{
    let mut slots: Vec<Option<DeployResult>> = Vec::with_capacity(jobs.len());
    slots.resize_with(jobs.len(), || None);

    let workers = workers.clamp(1, jobs.len().max(1));
    let tasks: Vec<Task<'_>> = jobs
        .iter()
        .zip(slots.iter_mut())
        .map(|(job, slot)| Task { job, slot })
        .collect();

    info!(jobs = jobs.len(), workers, "Dispatching deployment jobs");

    let (sender, receiver) = bounded::<Task<'_>>(workers);
    let work = &work;

    thread::scope(|s| {
        for id in 0..workers {
            let receiver = receiver.clone();
            s.spawn(move || {
                debug!(worker = id, "Worker starting");
                let mut done = 0usize;
                for task in receiver {
                    *task.slot = Some(work(task.job));
                    done += 1;
                }
                debug!(worker = id, jobs = done, "Worker finished");
            });
        }
        drop(receiver);

        for task in tasks {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, no further jobs dispatched");
                break;
            }
            if sender.send(task).is_err() {
                break;
            }
        }
        drop(sender);
    });

    jobs.iter()
        .zip(slots)
        .map(|(job, slot)| slot.unwrap_or_else(|| DeployResult::cancelled(job.clone())))
        .collect()
}
