//! The batch orchestrator: expands partitions into per-month work items,
//! filters them through the persisted sentinel state, and submits one main
//! task per item with its handler chain.
//!
//! Each invocation is short-lived and fire-and-forget: it submits tasks and
//! dependency edges, prints a report and exits. All waiting happens in the
//! scheduler. Re-invoking a launcher for a partition while its previous
//! tasks still run races on the scratch wipe; the contract assumes a single
//! writer per partition.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{JobFileConfig, Paths, PeriodConfig};
use crate::error::MarlinError;
use crate::output::{clean_canonical_logs, write_descriptor};
use crate::partition::{
    self, Enumeration, LevelContext, PartitionEntry, WorkItem, enumerate_partition,
};
use crate::scheduler::{DepCondition, JobHandle, JobScheduler, JobSpec};
use crate::state_machine::{SentinelStore, TaskEvent};

// Follow-up jobs (handlers, cleanup) are tiny; these mirror the wrap-job
// limits used on the cluster.
const FOLLOWUP_TIME_LIMIT: &str = "00:02:00";
const FOLLOWUP_MEMORY_MB: u32 = 2;

/// Which enumerated items are (re)submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitMode {
    /// Submit everything, clearing stale sentinels and logs first.
    All,
    /// Submit only items with a failed marker or never attempted.
    FailedOnly,
}

/// Per-invocation options, straight from the command line.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub mode: SubmitMode,
    /// Chain a cleanup task deleting the source-level partition data once
    /// the whole array succeeds. Off unless explicitly requested.
    pub remove_source: bool,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    /// Have handlers delete the input descriptor once processed.
    pub rm_input: bool,
    /// Config file forwarded to the handler jobs. Handlers run later, on
    /// whatever node the scheduler picks, and need it to resolve the data
    /// root when the environment does not carry `MARLIN_DATA_DIR`.
    pub config_file: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            mode: SubmitMode::All,
            remove_source: false,
            start_year: None,
            end_year: None,
            rm_input: false,
            config_file: None,
            verbose: false,
        }
    }
}

/// Submission summary for one partition.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionReport {
    pub sid_dck: String,
    pub submitted: usize,
    pub skipped_succeeded: usize,
    pub missing_source: usize,
    pub main_jobs: Vec<String>,
    pub cleanup_job: Option<String>,
}

impl PartitionReport {
    fn empty(sid_dck: &str) -> Self {
        Self {
            sid_dck: sid_dck.to_string(),
            submitted: 0,
            skipped_succeeded: 0,
            missing_source: 0,
            main_jobs: Vec::new(),
            cleanup_job: None,
        }
    }
}

/// The invocation report, printed as pretty JSON at the end of a launch.
#[derive(Debug, Serialize)]
pub struct SubmissionReport {
    pub release: String,
    pub update: String,
    pub dataset: String,
    pub level: String,
    pub mode: SubmitMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions: Vec<PartitionReport>,
}

impl SubmissionReport {
    pub fn total_submitted(&self) -> usize {
        self.partitions.iter().map(|p| p.submitted).sum()
    }
}

/// Drives one launcher invocation over a set of partitions.
pub struct Launcher<'a> {
    config: &'a JobFileConfig,
    periods: &'a PeriodConfig,
    paths: &'a Paths,
    options: LaunchOptions,
}

impl<'a> Launcher<'a> {
    pub fn new(
        config: &'a JobFileConfig,
        periods: &'a PeriodConfig,
        paths: &'a Paths,
        options: LaunchOptions,
    ) -> Self {
        Self { config, periods, paths, options }
    }

    fn context(&self) -> LevelContext {
        let job = &self.config.job_config;
        LevelContext {
            release: self.config.release.clone(),
            update: self.config.update.clone(),
            dataset: self.config.dataset.clone(),
            source_level: job.source_level.clone(),
            target_level: job.data_level.clone(),
        }
    }

    /// Validate everything, then submit partition by partition.
    ///
    /// Validation is fail-fast: a missing directory, script or resource
    /// value for ANY listed partition aborts before a single task is sent
    /// to the scheduler.
    pub fn run<S: JobScheduler>(
        &self,
        scheduler: &mut S,
        entries: &[PartitionEntry],
    ) -> Result<SubmissionReport, MarlinError> {
        let ctx = self.context();

        self.config
            .validate_resources(entries.iter().map(|e| e.sid_dck.as_str()))?;

        let level_dir = self
            .paths
            .data_dir
            .join(&ctx.release)
            .join(&ctx.dataset)
            .join(&ctx.target_level);
        let log_dir = level_dir.join("log");
        for dir in [&level_dir, &log_dir] {
            if !dir.is_dir() {
                return Err(MarlinError::MissingDir(dir.clone()));
            }
        }
        for entry in entries {
            let dir = log_dir.join(&entry.sid_dck);
            if !dir.is_dir() {
                return Err(MarlinError::MissingDir(dir));
            }
        }

        let script = self.paths.scripts_dir.join(&self.config.job_config.script_name);
        if !script.is_file() {
            return Err(MarlinError::MissingFile(script));
        }

        let source_root = partition::source_tree_root(
            &self.paths.data_dir,
            &ctx.release,
            &ctx.dataset,
            &ctx.source_level,
        );
        if !source_root.is_dir() {
            return Err(MarlinError::MissingDir(source_root));
        }

        let started_at = Utc::now();
        let mut partitions = Vec::with_capacity(entries.len());
        for entry in entries {
            partitions.push(self.launch_partition(
                scheduler,
                entry,
                &ctx,
                &source_root,
                &log_dir,
                &script,
            )?);
        }

        Ok(SubmissionReport {
            release: ctx.release,
            update: ctx.update,
            dataset: ctx.dataset,
            level: ctx.target_level,
            mode: self.options.mode,
            started_at,
            finished_at: Utc::now(),
            partitions,
        })
    }

    fn launch_partition<S: JobScheduler>(
        &self,
        scheduler: &mut S,
        entry: &PartitionEntry,
        ctx: &LevelContext,
        source_root: &Path,
        log_dir: &Path,
        script: &Path,
    ) -> Result<PartitionReport, MarlinError> {
        let sid = &entry.sid_dck;

        let base = entry
            .range
            .or_else(|| self.periods.range(sid))
            .ok_or_else(|| MarlinError::MissingPeriod(sid.clone()))?;
        let Some(range) = base.clip_years(self.options.start_year, self.options.end_year) else {
            eprintln!("  ! {sid}: no periods within the requested year window");
            return Ok(PartitionReport::empty(sid));
        };

        let enumeration =
            enumerate_partition(source_root, sid, &range, &self.config.job_config.source_table, ctx);
        // Gaps are the operator's coverage map; always worth a line.
        for period in &enumeration.missing {
            eprintln!("  ! {sid}: no source file for {period}");
        }

        let partition_log_dir = log_dir.join(sid);
        let store = SentinelStore::open(&partition_log_dir, &ctx.target_level)?;
        let (selected, skipped) = self.filter_items(&store, &enumeration)?;

        for (_, item) in &selected {
            clean_canonical_logs(&partition_log_dir, &item.canonical_id())?;
        }

        let mut report = PartitionReport {
            skipped_succeeded: skipped,
            missing_source: enumeration.missing.len(),
            ..PartitionReport::empty(sid)
        };
        if selected.is_empty() {
            eprintln!("  ! {sid}: no tasks to submit");
            return Ok(report);
        }

        // Scratch is wiped and recreated per invocation; it holds the input
        // descriptors and the raw scheduler stdout/stderr until the output
        // handler relocates them.
        let scratch = self.paths.scratch_dir.join(&ctx.target_level).join(sid);
        if scratch.is_dir() {
            fs::remove_dir_all(&scratch)?;
        }
        fs::create_dir_all(&scratch)?;

        let time_limit = self.config.resolve_time(sid)?;
        let memory_mb = self.config.resolve_memory_mb(sid)?;
        let handler_exe = std::env::current_exe()
            .unwrap_or_else(|_| PathBuf::from("marlin"))
            .display()
            .to_string();

        let mut mains: Vec<JobHandle> = Vec::with_capacity(selected.len());
        for (index, item) in &selected {
            let descriptor = write_descriptor(&scratch, *index, item)?;

            let main = JobSpec {
                name: format!("{sid}_{index}"),
                command: "python3".to_string(),
                args: vec![
                    script.display().to_string(),
                    self.paths.data_dir.display().to_string(),
                    item.release.clone(),
                    item.update.clone(),
                    item.dataset.clone(),
                    descriptor.display().to_string(),
                ],
                stdout: Some(scratch.join(format!("{index}.out"))),
                stderr: Some(scratch.join(format!("{index}.err"))),
                time_limit: Some(time_limit.clone()),
                memory_mb: Some(memory_mb),
            };
            let handle = scheduler.submit(&main)?;
            if self.options.verbose {
                let state = store.state(*index).next(TaskEvent::Submit);
                eprintln!("  {} [{state}]: {}", main.name, item.canonical_id());
            }

            let handler_spec = |role: &str, status: &str| {
                let mut args = vec![
                    "output".to_string(),
                    descriptor.display().to_string(),
                    status.to_string(),
                ];
                if self.options.rm_input {
                    args.push("--rm-input".to_string());
                }
                if let Some(config) = &self.options.config_file {
                    args.push("--config-file".to_string());
                    args.push(config.display().to_string());
                }
                JobSpec {
                    name: format!("{sid}_{index}_{role}"),
                    command: handler_exe.clone(),
                    args,
                    stdout: None,
                    stderr: None,
                    time_limit: Some(FOLLOWUP_TIME_LIMIT.to_string()),
                    memory_mb: Some(FOLLOWUP_MEMORY_MB),
                }
            };
            scheduler.submit_after(
                &handler_spec("ok", "0"),
                std::slice::from_ref(&handle),
                DepCondition::AllSucceeded,
            )?;
            scheduler.submit_after(
                &handler_spec("err", "1"),
                std::slice::from_ref(&handle),
                DepCondition::AnyFailed,
            )?;

            report.main_jobs.push(handle.to_string());
            mains.push(handle);
        }

        // Cleanup is a whole-array AND barrier: it must never run on
        // partial success, and only when explicitly requested.
        if self.options.remove_source {
            let target = source_root.join(sid);
            let spec = JobSpec {
                name: format!("{sid}_clean"),
                command: "rm".to_string(),
                args: vec!["-rf".to_string(), target.display().to_string()],
                stdout: None,
                stderr: None,
                time_limit: Some(FOLLOWUP_TIME_LIMIT.to_string()),
                memory_mb: Some(FOLLOWUP_MEMORY_MB),
            };
            let handle = scheduler.submit_after(&spec, &mains, DepCondition::AllSucceeded)?;
            report.cleanup_job = Some(handle.to_string());
        }

        report.submitted = selected.len();
        Ok(report)
    }

    /// The idempotency filter. Indices are 1-based positions in the full
    /// enumeration, stable across reruns because enumeration order is
    /// ascending — a failed-only rerun therefore addresses the same
    /// sentinel an earlier full run created.
    fn filter_items<'i>(
        &self,
        store: &SentinelStore,
        enumeration: &'i Enumeration,
    ) -> Result<(Vec<(usize, &'i WorkItem)>, usize), MarlinError> {
        let mut selected = Vec::new();
        let mut skipped = 0;
        match self.options.mode {
            SubmitMode::All => {
                store.clear_all()?;
                selected.extend(enumeration.items.iter().enumerate().map(|(i, x)| (i + 1, x)));
            }
            SubmitMode::FailedOnly => {
                for (i, item) in enumeration.items.iter().enumerate() {
                    let index = i + 1;
                    if store.state(index).eligible_failed_only() {
                        store.clear(index)?;
                        selected.push((index, item));
                    } else {
                        skipped += 1;
                    }
                }
            }
        }
        Ok((selected, skipped))
    }
}
