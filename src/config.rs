//! Run configuration, loaded from TOML.
//!
//! ```toml
//! [staging]
//! root = "/tmp/open-data-sync"
//!
//! [execution]
//! num_threads = 4
//! max_in_flight_units = 2
//! chunk_size = 10
//!
//! [publish]
//! folder_template = "{source}/{odata_version}/{id}"
//!
//! [gcp.dev]
//! project_id = "dataverbinders-dev"
//! bucket = "dataverbinders-dev"
//! location = "EU"
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::execution::ExecutionOptions;
use crate::model::DatasetDescriptor;

/// Default destination folder template.
pub const DEFAULT_FOLDER_TEMPLATE: &str = "{source}/{odata_version}/{id}";

/// Default number of descriptors per chunk in [`crate::orchestrator::SyncOrchestrator::run_chunked`].
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Target environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcpEnv {
    Dev,
    Test,
    Prod,
}

impl fmt::Display for GcpEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcpEnv::Dev => f.write_str("dev"),
            GcpEnv::Test => f.write_str("test"),
            GcpEnv::Prod => f.write_str("prod"),
        }
    }
}

impl FromStr for GcpEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            other => Err(ConfigError::Invalid {
                message: format!("unknown environment '{other}' (expected dev, test or prod)"),
            }),
        }
    }
}

/// Cloud project of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpProject {
    pub project_id: String,
    pub bucket: String,
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_location() -> String {
    "EU".to_string()
}

/// Projects per environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpConfig {
    pub dev: Option<GcpProject>,
    pub test: Option<GcpProject>,
    pub prod: Option<GcpProject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent of all staging directories.
    pub root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("open-data-sync"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads; `None` uses the available parallelism.
    pub num_threads: Option<usize>,
    /// Units running at the same time.
    pub max_in_flight_units: usize,
    /// Descriptors per chunk for full-catalog runs.
    pub chunk_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let options = ExecutionOptions::default();
        Self {
            num_threads: options.num_threads,
            max_in_flight_units: options.max_in_flight_units,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ExecutionConfig {
    pub fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            num_threads: self.num_threads,
            max_in_flight_units: self.max_in_flight_units,
            chunk_size: self.chunk_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Destination folder per dataset. Placeholders: `{source}`, `{id}`, `{odata_version}`.
    pub folder_template: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            folder_template: DEFAULT_FOLDER_TEMPLATE.to_string(),
        }
    }
}

impl PublishConfig {
    /// Destination folder of `descriptor`. Empty segments left by a missing source are dropped.
    pub fn folder_for(&self, descriptor: &DatasetDescriptor) -> String {
        let rendered = self
            .folder_template
            .replace("{source}", descriptor.source.as_deref().unwrap_or_default())
            .replace("{id}", &descriptor.id)
            .replace("{odata_version}", &descriptor.odata_version.to_string());
        rendered
            .split('/')
            .filter(|seg| !seg.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Full configuration of a synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub staging: StagingConfig,
    pub execution: ExecutionConfig,
    pub publish: PublishConfig,
    pub gcp: GcpConfig,
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Project configured for `env`.
    pub fn project(&self, env: GcpEnv) -> Result<&GcpProject, ConfigError> {
        let project = match env {
            GcpEnv::Dev => self.gcp.dev.as_ref(),
            GcpEnv::Test => self.gcp.test.as_ref(),
            GcpEnv::Prod => self.gcp.prod.as_ref(),
        };
        project.ok_or_else(|| ConfigError::Invalid {
            message: format!("no [gcp.{env}] project configured"),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::Invalid {
            message: message.to_string(),
        };
        if self.execution.max_in_flight_units == 0 {
            return Err(invalid("execution.max_in_flight_units must be > 0"));
        }
        if self.execution.chunk_size == 0 {
            return Err(invalid("execution.chunk_size must be > 0"));
        }
        if self.execution.num_threads == Some(0) {
            return Err(invalid("execution.num_threads must be > 0 when set"));
        }
        if !self.publish.folder_template.contains("{id}") {
            return Err(invalid("publish.folder_template must contain {id}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OdataVersion;

    const SAMPLE: &str = r#"
[staging]
root = "/var/tmp/sync"

[execution]
num_threads = 2
max_in_flight_units = 1

[gcp.dev]
project_id = "dataverbinders-dev"
bucket = "dataverbinders-dev"

[gcp.prod]
project_id = "dataverbinders"
bucket = "dataverbinders"
location = "europe-west4"
"#;

    #[test]
    fn parses_sections_with_defaults() {
        let cfg = SyncConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.staging.root, PathBuf::from("/var/tmp/sync"));
        assert_eq!(cfg.execution.num_threads, Some(2));
        assert_eq!(cfg.execution.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(cfg.publish.folder_template, DEFAULT_FOLDER_TEMPLATE);
        assert_eq!(cfg.project(GcpEnv::Dev).unwrap().location, "EU");
        assert_eq!(cfg.project(GcpEnv::Prod).unwrap().location, "europe-west4");
        assert!(cfg.project(GcpEnv::Test).is_err());
    }

    #[test]
    fn env_parses_case_insensitively() {
        assert_eq!("PROD".parse::<GcpEnv>().unwrap(), GcpEnv::Prod);
        assert_eq!(" dev ".parse::<GcpEnv>().unwrap(), GcpEnv::Dev);
        assert!("staging".parse::<GcpEnv>().is_err());
    }

    #[test]
    fn rejects_zero_limits() {
        let err = SyncConfig::from_toml_str("[execution]\nmax_in_flight_units = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(SyncConfig::from_toml_str("[execution]\nchunk_size = 0\n").is_err());
        assert!(SyncConfig::from_toml_str("[execution = broken").is_err());
    }

    #[test]
    fn folder_template_renders_descriptor() {
        let publish = PublishConfig::default();
        let d = DatasetDescriptor::new("83583NED")
            .with_source("cbs")
            .with_odata_version(OdataVersion::V4);
        assert_eq!(publish.folder_for(&d), "cbs/v4/83583NED");
        assert_eq!(publish.folder_for(&DatasetDescriptor::new("x")), "v3/x");
    }
}
