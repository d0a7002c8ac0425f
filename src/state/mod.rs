//! Persisted execution state and run history.
//!
//! Both files live in the subject's work directory and are written only by
//! the engine.

pub mod history;
pub mod store;

pub use history::{RunHistory, RunHistoryBuilder, RunRecord, RunStatus};
pub use store::{ExecutionState, StatusCounts, StepRecord, StepStatus};
