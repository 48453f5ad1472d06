//! Slurm backend: builds `sbatch` invocations and parses job ids back.

use std::process::Command;

use crate::error::MarlinError;

use super::types::{DepCondition, JobHandle, JobScheduler, JobSpec};

/// Submits jobs by shelling out to `sbatch`.
pub struct SlurmScheduler {
    /// Accounting project passed as `-A`, if any.
    pub account: Option<String>,
}

impl SlurmScheduler {
    pub fn new(account: Option<String>) -> Self {
        Self { account }
    }

    /// Build the full `sbatch` argument list for a spec. Kept free of
    /// process spawning so the flag construction is unit-testable.
    fn sbatch_args(
        &self,
        spec: &JobSpec,
        deps: &[JobHandle],
        condition: Option<DepCondition>,
    ) -> Vec<String> {
        let mut args = vec![format!("--job-name={}", spec.name), "--parsable".to_string()];
        if let Some(out) = &spec.stdout {
            args.push(format!("--output={}", out.display()));
        }
        if let Some(err) = &spec.stderr {
            args.push(format!("--error={}", err.display()));
        }
        if let Some(t) = &spec.time_limit {
            args.push(format!("--time={t}"));
        }
        if let Some(mem) = spec.memory_mb {
            args.push(format!("--mem={mem}"));
        }
        if let Some(account) = &self.account {
            args.push(format!("-A{account}"));
        }
        if let Some(condition) = condition {
            args.push(format!("--dependency={}", dependency_expr(deps, condition)));
            // Dependencies that can never be satisfied (e.g. afterok on a
            // failed job) must cancel the dependent instead of leaving it
            // queued forever.
            args.push("--kill-on-invalid-dep=yes".to_string());
        }
        let mut wrap = spec.command.clone();
        for a in &spec.args {
            wrap.push(' ');
            wrap.push_str(a);
        }
        args.push(format!("--wrap={wrap}"));
        args
    }

    fn run_sbatch(&self, args: &[String]) -> Result<JobHandle, MarlinError> {
        let output = Command::new("sbatch")
            .args(args)
            .output()
            .map_err(|e| MarlinError::Scheduler(format!("failed to run sbatch: {e}")))?;
        if !output.status.success() {
            return Err(MarlinError::Scheduler(format!(
                "sbatch exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        // With --parsable the output is the bare job id; without it, the id
        // is the last token of "Submitted batch job <id>". Taking the last
        // whitespace token covers both.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let jid = stdout
            .split_whitespace()
            .last()
            .ok_or_else(|| MarlinError::Scheduler("sbatch produced no job id".to_string()))?;
        Ok(JobHandle(jid.to_string()))
    }
}

/// Render a Slurm `--dependency` expression. Slurm joins requirements that
/// must ALL hold with `:` inside one type, and alternatives with `?`.
fn dependency_expr(deps: &[JobHandle], condition: DepCondition) -> String {
    let ids: Vec<&str> = deps.iter().map(|h| h.0.as_str()).collect();
    match condition {
        DepCondition::AllSucceeded => format!("afterok:{}", ids.join(":")),
        DepCondition::AnySucceeded => ids
            .iter()
            .map(|id| format!("afterok:{id}"))
            .collect::<Vec<_>>()
            .join("?"),
        DepCondition::AnyFailed => ids
            .iter()
            .map(|id| format!("afternotok:{id}"))
            .collect::<Vec<_>>()
            .join("?"),
    }
}

impl JobScheduler for SlurmScheduler {
    fn submit(&mut self, spec: &JobSpec) -> Result<JobHandle, MarlinError> {
        let args = self.sbatch_args(spec, &[], None);
        self.run_sbatch(&args)
    }

    fn submit_after(
        &mut self,
        spec: &JobSpec,
        deps: &[JobHandle],
        condition: DepCondition,
    ) -> Result<JobHandle, MarlinError> {
        if deps.is_empty() {
            return self.submit(spec);
        }
        let args = self.sbatch_args(spec, deps, Some(condition));
        self.run_sbatch(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec() -> JobSpec {
        JobSpec {
            name: "103-792_4".into(),
            command: "python3".into(),
            args: vec!["level1b.py".into(), "/data".into()],
            stdout: Some(PathBuf::from("/scratch/4.out")),
            stderr: Some(PathBuf::from("/scratch/4.err")),
            time_limit: Some("02:00:00".into()),
            memory_mb: Some(8000),
        }
    }

    #[test]
    fn sbatch_args_carry_resources_and_wrap() {
        let sched = SlurmScheduler::new(Some("glamod".into()));
        let args = sched.sbatch_args(&spec(), &[], None);

        assert!(args.contains(&"--job-name=103-792_4".to_string()));
        assert!(args.contains(&"--time=02:00:00".to_string()));
        assert!(args.contains(&"--mem=8000".to_string()));
        assert!(args.contains(&"-Aglamod".to_string()));
        assert!(args.contains(&"--output=/scratch/4.out".to_string()));
        assert_eq!(args.last().unwrap(), "--wrap=python3 level1b.py /data");
        assert!(!args.iter().any(|a| a.starts_with("--dependency")));
    }

    #[test]
    fn all_succeeded_joins_ids_with_colon() {
        let deps = vec![JobHandle("11".into()), JobHandle("12".into()), JobHandle("13".into())];
        assert_eq!(
            dependency_expr(&deps, DepCondition::AllSucceeded),
            "afterok:11:12:13"
        );
    }

    #[test]
    fn any_conditions_join_with_question_mark() {
        let deps = vec![JobHandle("11".into()), JobHandle("12".into())];
        assert_eq!(
            dependency_expr(&deps, DepCondition::AnySucceeded),
            "afterok:11?afterok:12"
        );
        assert_eq!(
            dependency_expr(&deps, DepCondition::AnyFailed),
            "afternotok:11?afternotok:12"
        );
    }

    #[test]
    fn dependent_submission_kills_on_invalid_dep() {
        let sched = SlurmScheduler::new(None);
        let deps = vec![JobHandle("42".into())];
        let args = sched.sbatch_args(&spec(), &deps, Some(DepCondition::AnyFailed));
        assert!(args.contains(&"--dependency=afternotok:42".to_string()));
        assert!(args.contains(&"--kill-on-invalid-dep=yes".to_string()));
    }
}
