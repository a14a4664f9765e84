use crate::error::{Result, TablextractError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub tool: ToolConfig,
    pub output: OutputConfig,
    pub staging: StagingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Installation directory of the extraction tool; logs are staged here.
    pub install_dir: PathBuf,
    pub executable: String,
    /// Owner prefixed to unqualified table names.
    pub owner: String,
    pub confirm_prompt: String,
    pub confirm_response: String,
    pub progress_marker: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for `<table>.txt` when no output path is given.
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    pub make_writable: bool,
    pub buffer_size: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            executable: "dbtran".to_string(),
            owner: "dba".to_string(),
            confirm_prompt: "Do you want to replace it? (Y/N)".to_string(),
            confirm_response: "Y".to_string(),
            progress_marker: "complete".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            make_writable: true,
            buffer_size: 64 * 1024, // 64KB buffer
        }
    }
}

#[cfg(windows)]
fn default_install_dir() -> PathBuf {
    PathBuf::from(r"C:\Program Files\SQL Anywhere 12\Bin64")
}

#[cfg(not(windows))]
fn default_install_dir() -> PathBuf {
    PathBuf::from("/opt/sqlanywhere12/bin64")
}

#[cfg(windows)]
fn default_output_dir() -> PathBuf {
    PathBuf::from(r"C:\abase")
}

#[cfg(not(windows))]
fn default_output_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(TablextractError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TablextractError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| TablextractError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["tablextract.toml", ".tablextract.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref install_dir) = cli_args.install_dir {
            self.tool.install_dir = install_dir.clone();
        }

        if let Some(ref executable) = cli_args.executable {
            self.tool.executable = executable.clone();
        }

        if let Some(ref owner) = cli_args.owner {
            self.tool.owner = owner.clone();
        }

        if let Some(ref output_dir) = cli_args.output_dir {
            self.output.directory = output_dir.clone();
        }
    }

    /// Anchor relative directories at the current directory.
    ///
    /// The tool runs with its install directory as working directory, so a
    /// relative install dir would otherwise be resolved twice.
    pub fn make_paths_absolute(&mut self) -> Result<()> {
        self.tool.install_dir = std::path::absolute(&self.tool.install_dir)?;
        self.output.directory = std::path::absolute(&self.output.directory)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("tool.executable", &self.tool.executable),
            ("tool.owner", &self.tool.owner),
            ("tool.confirm_prompt", &self.tool.confirm_prompt),
            ("tool.progress_marker", &self.tool.progress_marker),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(TablextractError::Config {
                    message: format!("{} must not be empty", key),
                });
            }
        }

        if self.tool.install_dir.as_os_str().is_empty() {
            return Err(TablextractError::Config {
                message: "tool.install_dir must not be empty".to_string(),
            });
        }

        if self.staging.buffer_size == 0 {
            return Err(TablextractError::Config {
                message: "staging.buffer_size must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub install_dir: Option<PathBuf>,
    pub executable: Option<String>,
    pub owner: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_install_dir(mut self, install_dir: Option<PathBuf>) -> Self {
        self.install_dir = install_dir;
        self
    }

    pub fn with_executable(mut self, executable: Option<String>) -> Self {
        self.executable = executable;
        self
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }
}
