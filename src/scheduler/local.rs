//! In-process backend: runs each job as a child process once its dependency
//! condition is satisfied, in submission order.
//!
//! Submission order is a valid linearization of the dependency DAG because a
//! job can only depend on handles that already exist. Jobs whose condition
//! is not met when their turn comes are skipped, which is the local
//! equivalent of Slurm cancelling a job with an invalid dependency.

use std::collections::HashMap;
use std::fs::File;
use std::process::{Command, Stdio};

use uuid::Uuid;

use crate::error::MarlinError;

use super::types::{DepCondition, JobHandle, JobScheduler, JobSpec};

/// Terminal state of one locally executed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOutcome {
    Succeeded,
    Failed,
    /// The dependency condition was never satisfied; the job did not run.
    Skipped,
}

struct PendingJob {
    handle: JobHandle,
    spec: JobSpec,
    deps: Vec<JobHandle>,
    condition: DepCondition,
}

/// Executes submitted jobs in-process. Used for `--run-local` interactive
/// runs and for exercising the dependency-chain logic without a cluster.
#[derive(Default)]
pub struct LocalScheduler {
    queue: Vec<PendingJob>,
    outcomes: HashMap<JobHandle, LocalOutcome>,
    completed: Vec<(String, LocalOutcome)>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs queued and not yet run.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Outcome of a job after [`run_all`](Self::run_all).
    #[allow(dead_code)]
    pub fn outcome(&self, handle: &JobHandle) -> Option<LocalOutcome> {
        self.outcomes.get(handle).copied()
    }

    /// Every drained job in execution order, with its outcome. A failed
    /// handler or cleanup shows up here just like a failed main task.
    pub fn completed(&self) -> &[(String, LocalOutcome)] {
        &self.completed
    }

    /// Number of jobs that ran and failed.
    pub fn failure_count(&self) -> usize {
        self.completed
            .iter()
            .filter(|(_, outcome)| *outcome == LocalOutcome::Failed)
            .count()
    }

    /// Run every queued job whose condition holds, in submission order.
    /// Time and memory limits are not enforced locally.
    pub fn run_all(&mut self) -> Result<(), MarlinError> {
        let queue = std::mem::take(&mut self.queue);
        for job in queue {
            let outcome = if self.condition_met(&job) {
                self.run_one(&job.spec)?
            } else {
                LocalOutcome::Skipped
            };
            self.outcomes.insert(job.handle, outcome);
            self.completed.push((job.spec.name, outcome));
        }
        Ok(())
    }

    fn condition_met(&self, job: &PendingJob) -> bool {
        let of = |h: &JobHandle| self.outcomes.get(h).copied();
        match job.condition {
            DepCondition::AllSucceeded => job
                .deps
                .iter()
                .all(|d| of(d) == Some(LocalOutcome::Succeeded)),
            DepCondition::AnySucceeded => job
                .deps
                .iter()
                .any(|d| of(d) == Some(LocalOutcome::Succeeded)),
            DepCondition::AnyFailed => {
                job.deps.iter().any(|d| of(d) == Some(LocalOutcome::Failed))
            }
        }
    }

    fn run_one(&self, spec: &JobSpec) -> Result<LocalOutcome, MarlinError> {
        let stdio = |path: &Option<std::path::PathBuf>| -> Result<Stdio, MarlinError> {
            match path {
                Some(p) => Ok(Stdio::from(File::create(p)?)),
                None => Ok(Stdio::null()),
            }
        };
        let status = Command::new(&spec.command)
            .args(&spec.args)
            .stdout(stdio(&spec.stdout)?)
            .stderr(stdio(&spec.stderr)?)
            .status()
            .map_err(|e| {
                MarlinError::Scheduler(format!("failed to spawn `{}`: {e}", spec.command))
            })?;
        Ok(if status.success() {
            LocalOutcome::Succeeded
        } else {
            LocalOutcome::Failed
        })
    }

    fn enqueue(
        &mut self,
        spec: &JobSpec,
        deps: Vec<JobHandle>,
        condition: DepCondition,
    ) -> JobHandle {
        let handle = JobHandle(Uuid::new_v4().to_string());
        self.queue.push(PendingJob {
            handle: handle.clone(),
            spec: spec.clone(),
            deps,
            condition,
        });
        handle
    }
}

impl JobScheduler for LocalScheduler {
    fn submit(&mut self, spec: &JobSpec) -> Result<JobHandle, MarlinError> {
        // No deps: AllSucceeded holds vacuously.
        Ok(self.enqueue(spec, Vec::new(), DepCondition::AllSucceeded))
    }

    fn submit_after(
        &mut self,
        spec: &JobSpec,
        deps: &[JobHandle],
        condition: DepCondition,
    ) -> Result<JobHandle, MarlinError> {
        Ok(self.enqueue(spec, deps.to_vec(), condition))
    }
}
