//! YAML configuration parsing.
//!
//! Parses operator options and rehearsal plans from YAML files.

use std::collections::HashSet;
use std::path::Path;

use super::error::ConfigError;
use super::options::OperatorOptions;
use super::plan::{PlanConfig, StepKind};

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load operator options from a file.
    pub fn load_options(path: impl AsRef<Path>) -> Result<OperatorOptions, ConfigError> {
        let path = path.as_ref();
        let content = read(path)?;
        let options: OperatorOptions =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        options.validate()?;
        Ok(options)
    }

    /// Parse operator options from a YAML string.
    pub fn parse_options(yaml: &str) -> Result<OperatorOptions, ConfigError> {
        let options: OperatorOptions = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Load a rehearsal plan from a file.
    pub fn load_plan(path: impl AsRef<Path>) -> Result<PlanConfig, ConfigError> {
        let path = path.as_ref();
        let content = read(path)?;
        let plan: PlanConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_plan(&plan)?;
        Ok(plan)
    }

    /// Parse a rehearsal plan from a YAML string.
    pub fn parse_plan(yaml: &str) -> Result<PlanConfig, ConfigError> {
        let plan: PlanConfig = serde_yaml::from_str(yaml)?;
        Self::validate_plan(&plan)?;
        Ok(plan)
    }

    /// Validate a rehearsal plan.
    pub fn validate_plan(plan: &PlanConfig) -> Result<(), ConfigError> {
        if plan.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name".into()));
        }

        if plan.steps.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "plan must have at least one step".into(),
            ));
        }

        let mut names = HashSet::new();
        for step in &plan.steps {
            if step.name.trim().is_empty() {
                return Err(ConfigError::MissingField("steps[].name".into()));
            }
            if !names.insert(step.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate step name: {}",
                    step.name
                )));
            }

            if let StepKind::Parallel { hosts, .. } = &step.kind {
                if hosts.is_empty() {
                    return Err(ConfigError::InvalidConfig(format!(
                        "parallel step '{}' has no hosts",
                        step.name
                    )));
                }
                let mut seen = HashSet::new();
                for host in hosts {
                    if !seen.insert(host.host()) {
                        return Err(ConfigError::InvalidConfig(format!(
                            "parallel step '{}' lists host '{}' twice",
                            step.name,
                            host.host()
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
        path: path.to_path_buf(),
        source,
    })
}
