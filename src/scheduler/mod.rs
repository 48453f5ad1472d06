mod local;
mod slurm;
mod types;

pub use local::{LocalOutcome, LocalScheduler};
pub use slurm::SlurmScheduler;
pub use types::{DepCondition, JobHandle, JobScheduler, JobSpec};
