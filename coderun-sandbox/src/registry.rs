//! Environment registry - the runtimes this host can execute code in

use crate::config::{CodeInput, Ecosystem, EnvironmentConfig};
use crate::error::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use which::which;

/// A selectable, installed language runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub tag: String,
    pub display_name: String,
    pub language: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub input: CodeInput,
    pub ecosystem: Option<Ecosystem>,
}

impl Environment {
    /// Build from config without probing the host
    pub fn from_config(config: &EnvironmentConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            display_name: config.display_name.clone(),
            language: config.language.clone(),
            program: PathBuf::from(&config.program),
            args: config.args.clone(),
            input: config.input,
            ecosystem: config.ecosystem.or_else(|| ecosystem_for_tag(&config.tag)),
        }
    }
}

/// Python-family tags install with pip, JavaScript-family tags with npm
pub fn ecosystem_for_tag(tag: &str) -> Option<Ecosystem> {
    let tag = tag.to_lowercase();
    if tag.contains("python") {
        Some(Ecosystem::Pip)
    } else if tag.contains("javascript") {
        Some(Ecosystem::Npm)
    } else {
        None
    }
}

/// What callers see for one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub display_name: String,
    pub language: String,
}

/// Read-only table of installed environments, built once at startup
#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    environments: BTreeMap<String, Environment>,
    base_tag: String,
}

impl EnvironmentRegistry {
    /// Keep the configured environments whose interpreter is installed
    pub fn discover(configs: &[EnvironmentConfig], base_tag: impl Into<String>) -> Result<Self> {
        let mut environments = Vec::new();
        for config in configs {
            match resolve_program(Path::new(&config.program)) {
                Some(program) => {
                    let mut env = Environment::from_config(config);
                    env.program = program;
                    tracing::debug!(
                        environment = %env.tag,
                        program = %env.program.display(),
                        "Environment available"
                    );
                    environments.push(env);
                }
                None => {
                    tracing::info!(
                        environment = %config.tag,
                        program = %config.program,
                        "Interpreter not installed, skipping environment"
                    );
                }
            }
        }
        Self::from_environments(environments, base_tag)
    }

    /// Build from already resolved environments
    pub fn from_environments(
        environments: impl IntoIterator<Item = Environment>,
        base_tag: impl Into<String>,
    ) -> Result<Self> {
        let base_tag = base_tag.into();
        let mut map = BTreeMap::new();
        for env in environments {
            if map.contains_key(&env.tag) {
                return Err(SandboxError::Config(format!(
                    "Environment '{}' is configured more than once",
                    env.tag
                )));
            }
            map.insert(env.tag.clone(), env);
        }

        if map.keys().all(|tag| *tag == base_tag) {
            return Err(SandboxError::Config(
                "No execution environments are installed on this host".to_string(),
            ));
        }

        Ok(Self {
            environments: map,
            base_tag,
        })
    }

    /// Environments callers may select, without the base environment
    pub fn list(&self) -> BTreeMap<String, EnvironmentInfo> {
        self.environments
            .values()
            .filter(|env| env.tag != self.base_tag)
            .map(|env| {
                (
                    env.tag.clone(),
                    EnvironmentInfo {
                        display_name: env.display_name.clone(),
                        language: env.language.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn get(&self, tag: &str) -> Option<&Environment> {
        self.environments.get(tag)
    }

    pub fn base_tag(&self) -> &str {
        &self.base_tag
    }

    pub fn is_base(&self, tag: &str) -> bool {
        tag == self.base_tag
    }
}

/// Paths with a separator are checked in place, bare names are looked up on `PATH`.
/// Either way the result must be an executable file.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    which(program).ok()
}
