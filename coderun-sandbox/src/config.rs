//! Configuration management for the execution service

use crate::error::{Result, SandboxError};
use crate::store::TtlPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Candidate environments; those whose interpreter is missing are dropped at startup
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            execution: ExecutionConfig::default(),
            environments: default_environments(),
        }
    }
}

/// Address the persisted files are served from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Overrides the `http://{host}:{port}` prefix of file URLs
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: None,
        }
    }
}

impl ServerConfig {
    pub fn public_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.port))
    }
}

/// Shared persisted-file store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub files_dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub short_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub long_ttl: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            files_dir: PathBuf::from("/files"),
            sweep_interval: Duration::from_secs(60),
            short_ttl: Duration::from_secs(20 * 60),
            long_ttl: Duration::from_secs(2880 * 60),
        }
    }
}

impl StorageConfig {
    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy {
            short: self.short_ttl,
            long: self.long_ttl,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Tag of the base environment, hidden from listings and refused for execution
    pub base_environment: String,
    /// Silence budget in seconds for requests that do not set one
    pub default_timeout: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_environment: "python3".to_string(),
            default_timeout: 60,
        }
    }
}

/// How code reaches the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeInput {
    /// Appended as the last argument
    #[default]
    Argument,
    /// Written to the interpreter's stdin
    Stdin,
}

/// Package ecosystem used by the installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Pip,
    Npm,
}

/// One selectable environment as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub tag: String,
    pub display_name: String,
    pub language: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub input: CodeInput,
    /// Derived from the tag when absent
    #[serde(default)]
    pub ecosystem: Option<Ecosystem>,
}

impl EnvironmentConfig {
    fn new(tag: &str, display_name: &str, language: &str, program: &str, args: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            display_name: display_name.to_string(),
            language: language.to_string(),
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            input: CodeInput::Argument,
            ecosystem: None,
        }
    }
}

fn default_environments() -> Vec<EnvironmentConfig> {
    let mut java = EnvironmentConfig::new("java", "Java", "java", "jshell", &["-q", "-"]);
    java.input = CodeInput::Stdin;

    vec![
        EnvironmentConfig::new("python3", "Python 3 (base)", "python", "python3", &["-c"]),
        EnvironmentConfig::new("python", "Python 3", "python", "python3", &["-c"]),
        EnvironmentConfig::new(
            "python_scientific",
            "Python 3 (scientific)",
            "python",
            "python3",
            &["-c"],
        ),
        EnvironmentConfig::new("bash", "Bash", "bash", "bash", &["-c"]),
        EnvironmentConfig::new("javascript", "JavaScript (Node.js)", "javascript", "node", &["-e"]),
        java,
    ]
}

impl AppConfig {
    /// Load configuration from `path`, or defaults when no path is given.
    /// Environment variables (and a `.env` file) take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    SandboxError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("CODERUN_FILES_DIR") {
            self.storage.files_dir = PathBuf::from(dir);
        }
        if let Ok(host) = std::env::var("CODERUN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = std::env::var("CODERUN_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
        {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("CODERUN_PUBLIC_URL") {
            self.server.public_base_url = Some(url);
        }
    }
}
