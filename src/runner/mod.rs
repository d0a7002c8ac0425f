//! Step execution orchestration.

pub mod engine;
pub mod report;

pub use engine::{
    request_interrupt, CancelToken, Engine, EngineEvent, EngineOptions, PlannedStep,
};
pub use report::{RoleOutput, RunReport, StepOutcome};
