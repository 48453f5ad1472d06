//! The scheduler seam: everything the orchestrator knows about batch
//! scheduling is behind [`JobScheduler`], so the dependency-chain logic can
//! run against Slurm on the cluster and against an in-process backend in
//! tests and interactive runs.

use std::fmt;
use std::path::PathBuf;

use crate::error::MarlinError;

/// Resource and identity parameters for one submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Scheduler-visible job name (e.g. `103-792_4`).
    pub name: String,
    /// Program to run.
    pub command: String,
    pub args: Vec<String>,
    /// Raw stdout/stderr destinations in the scratch directory. The output
    /// handler relocates them to their canonical names afterwards.
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    /// `HH:MM:SS` wall-clock limit.
    pub time_limit: Option<String>,
    pub memory_mb: Option<u32>,
}

impl JobSpec {
    #[allow(dead_code)]
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            stdout: None,
            stderr: None,
            time_limit: None,
            memory_mb: None,
        }
    }
}

/// Opaque scheduler-assigned job id. Ephemeral: scoped to one launcher
/// invocation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition under which a dependent job becomes runnable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepCondition {
    /// Every dependency reached a successful terminal state. This is the
    /// whole-array AND barrier used for cleanup: partial success never
    /// satisfies it.
    AllSucceeded,
    #[allow(dead_code)]
    AnySucceeded,
    AnyFailed,
}

/// A batch scheduler the orchestrator can submit to.
///
/// Submissions are fire and forget: the launcher never waits for completion;
/// all ordering is expressed through the dependency conditions and evaluated
/// by the scheduler itself.
pub trait JobScheduler {
    fn submit(&mut self, spec: &JobSpec) -> Result<JobHandle, MarlinError>;

    fn submit_after(
        &mut self,
        spec: &JobSpec,
        deps: &[JobHandle],
        condition: DepCondition,
    ) -> Result<JobHandle, MarlinError>;
}
