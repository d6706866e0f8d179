//! CLI configuration: TOML file, then command-line overrides.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use clhello_opencl::dump::DEFAULT_DUMP_PREFIX;
use clhello_opencl::host::{DEFAULT_COUNT, DEFAULT_SEED};
use clhello_opencl::{DeviceClass, DumpOptions, PipelineConfig, DEFAULT_BUILD_OPTIONS};
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "clhello.toml";

const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Runtime the pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Host emulation, always available.
    Reference,
    /// System OpenCL ICD loader (needs the `opencl` feature).
    #[value(name = "opencl")]
    OpenCl,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "opencl") {
            Self::OpenCl
        } else {
            Self::Reference
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::OpenCl => write!(f, "opencl"),
        }
    }
}

/// Main CLI configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub backend: Backend,
    /// `gpu` or `cpu`.
    pub device: String,
    pub run: RunConfig,
    pub dump: DumpConfig,
    pub logging: LoggingConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            device: "gpu".to_string(),
            run: RunConfig::default(),
            dump: DumpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub count: usize,
    pub seed: u64,
    pub build_options: String,
    /// Exit non-zero when any result differs from the host recomputation.
    pub strict: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_COUNT,
            seed: DEFAULT_SEED,
            build_options: DEFAULT_BUILD_OPTIONS.to_string(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    pub enabled: bool,
    pub prefix: String,
    pub dir: PathBuf,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self { enabled: true, prefix: DEFAULT_DUMP_PREFIX.to_string(), dir: PathBuf::from(".") }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "warn".to_string(), format: "pretty".to_string() }
    }
}

impl CliConfig {
    pub fn device_class(&self) -> Result<DeviceClass> {
        self.device.parse::<DeviceClass>().map_err(anyhow::Error::msg)
    }

    /// Check every field that can only be validated as a whole.
    pub fn validate(&self) -> Result<()> {
        self.device_class()?;
        if self.run.count == 0 {
            bail!("run.count must be greater than zero");
        }
        if u32::try_from(self.run.count).is_err() {
            bail!("run.count {} does not fit the kernel's unsigned int count", self.run.count);
        }
        if self.dump.enabled && self.dump.prefix.is_empty() {
            bail!("dump.prefix must not be empty");
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            bail!(
                "unknown log format '{}'. Expected one of: {}",
                self.logging.format,
                LOG_FORMATS.join(", ")
            );
        }
        Ok(())
    }

    pub fn to_pipeline(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            device_class: self.device_class()?,
            count: self.run.count,
            seed: self.run.seed,
            build_options: self.run.build_options.clone(),
            dump: self.dump.enabled.then(|| DumpOptions {
                dir: self.dump.dir.clone(),
                prefix: self.dump.prefix.clone(),
            }),
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Layers command-line overrides on top of a file or the defaults.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: CliConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: CliConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(Self { config })
    }

    pub fn backend(mut self, backend: Option<Backend>) -> Self {
        if let Some(backend) = backend {
            self.config.backend = backend;
        }
        self
    }

    pub fn device(mut self, device: Option<String>) -> Self {
        if let Some(device) = device {
            self.config.device = device;
        }
        self
    }

    pub fn count(mut self, count: Option<usize>) -> Self {
        if let Some(count) = count {
            self.config.run.count = count;
        }
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.config.run.seed = seed;
        }
        self
    }

    pub fn build_options(mut self, options: Option<String>) -> Self {
        if let Some(options) = options {
            self.config.run.build_options = options;
        }
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.run.strict |= strict;
        self
    }

    pub fn dump_prefix(mut self, prefix: Option<String>) -> Self {
        if let Some(prefix) = prefix {
            self.config.dump.prefix = prefix;
        }
        self
    }

    pub fn dump_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.config.dump.dir = dir;
        }
        self
    }

    pub fn no_dump(mut self, no_dump: bool) -> Self {
        if no_dump {
            self.config.dump.enabled = false;
        }
        self
    }

    pub fn log_level(mut self, level: Option<String>) -> Self {
        if let Some(level) = level {
            self.config.logging.level = level;
        }
        self
    }

    pub fn log_format(mut self, format: Option<String>) -> Self {
        if let Some(format) = format {
            self.config.logging.format = format;
        }
        self
    }

    pub fn build(self) -> Result<CliConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_the_classic_run() {
        let config = ConfigBuilder::new().build().unwrap();
        let pipeline = config.to_pipeline().unwrap();

        assert_eq!(pipeline.count, 1024);
        assert_eq!(pipeline.device_class, DeviceClass::Gpu);
        assert_eq!(pipeline.build_options, "-cl-std=CL1.2");
        let dump = pipeline.dump.unwrap();
        assert_eq!(dump.prefix, "square");
        assert_eq!(dump.dir, PathBuf::from("."));
        assert!(!config.run.strict);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clhello.toml");
        std::fs::write(
            &path,
            r#"
device = "cpu"

[run]
count = 64

[dump]
prefix = "kernel"
"#,
        )
        .unwrap();

        let config = ConfigBuilder::from_file(&path).unwrap().build().unwrap();
        assert_eq!(config.device_class().unwrap(), DeviceClass::Cpu);
        assert_eq!(config.run.count, 64);
        assert_eq!(config.run.seed, DEFAULT_SEED);
        assert_eq!(config.dump.prefix, "kernel");
        assert!(config.dump.enabled);
    }

    #[test]
    fn overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clhello.toml");
        std::fs::write(&path, "[run]\ncount = 64\nseed = 9\n").unwrap();

        let config = ConfigBuilder::from_file(&path)
            .unwrap()
            .count(Some(128))
            .backend(Some(Backend::Reference))
            .no_dump(true)
            .strict(true)
            .build()
            .unwrap();
        assert_eq!(config.run.count, 128);
        assert_eq!(config.run.seed, 9);
        assert_eq!(config.backend, Backend::Reference);
        assert!(config.to_pipeline().unwrap().dump.is_none());
        assert!(config.run.strict);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ConfigBuilder::new().count(Some(0)).build().is_err());
        assert!(ConfigBuilder::new().device(Some("fpga".into())).build().is_err());
        assert!(ConfigBuilder::new().log_format(Some("xml".into())).build().is_err());
        assert!(ConfigBuilder::new().dump_prefix(Some(String::new())).build().is_err());
        // An empty prefix is fine when nothing is dumped.
        assert!(ConfigBuilder::new().dump_prefix(Some(String::new())).no_dump(true).build().is_ok());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "run = [").unwrap();

        let err = ConfigBuilder::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn printed_config_parses_back() {
        let config = ConfigBuilder::new().seed(Some(7)).build().unwrap();
        let text = config.to_toml().unwrap();
        let parsed: CliConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
