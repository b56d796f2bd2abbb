//! Task execution engine.
//!
//! This module provides the composites that turn leaf tasks into operation
//! pipelines: sequential and concurrent groups, progress-reporting display
//! steps, inline function tasks and the builder that assembles them.

mod builder;
mod display;
mod func;
mod parallel;
mod progress;
mod serial;
mod traced;

pub use builder::Builder;
pub use display::{ParallelStepDisplay, StepDisplay};
pub use func::FnTask;
pub use parallel::Parallel;
pub use progress::ProgressSnapshot;
pub use serial::{Serial, StepStatus};
