mod sentinel;
mod state;

pub use sentinel::{SentinelStore, SentinelSummary};
pub use state::{TaskEvent, TaskOutcome, TaskState};
