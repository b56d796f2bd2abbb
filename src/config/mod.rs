//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for operator options and
//! rehearsal plans.

mod error;
mod options;
mod plan;
mod yaml;

pub use error::ConfigError;
pub use options::OperatorOptions;
pub use plan::{HostConfig, PlanConfig, StepConfig, StepKind};
pub use yaml::YamlLoader;
