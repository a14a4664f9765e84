use crate::config::{CliOverrides, Config};
use crate::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tablextract")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Export a table from a transaction log with dbtran")]
#[command(
    long_about = "Tablextract copies a transaction log into the dbtran installation directory \
                  and runs dbtran to export one table to a text file, showing progress while it runs."
)]
#[command(after_help = "EXAMPLES:\n  \
    tablextract backup.log --table customers\n  \
    tablextract backup.log -t sales.orders -o exports/orders.txt\n  \
    tablextract backup.log -t customers --tool-dir /opt/sqlanywhere12/bin64 --force\n  \
    tablextract backup.log -t customers --no-copy --output-format json")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Transaction log file to extract from
    #[arg(required_unless_present = "generate_config")]
    pub log_file: Option<PathBuf>,

    /// Table to export (optionally owner-qualified, e.g. sales.orders)
    #[arg(short, long, env = "TABLEXTRACT_TABLE")]
    pub table: Option<String>,

    /// Text file to write (defaults to <output dir>/<table>.txt)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Installation directory of the extraction tool
    #[arg(long, env = "TABLEXTRACT_TOOL_DIR")]
    pub tool_dir: Option<PathBuf>,

    /// Name of the extraction executable
    #[arg(long, help = "Extraction executable name (default: dbtran)")]
    pub executable: Option<String>,

    /// Owner for unqualified table names
    #[arg(long, help = "Owner prefixed to unqualified table names (default: dba)")]
    pub owner: Option<String>,

    /// Directory for the default output file
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Replace an existing staged log without asking
    #[arg(long, help = "Overwrite an existing copy in the tool directory without asking")]
    pub force: bool,

    /// Use the copy already in the tool directory
    #[arg(long, conflicts_with = "force", help = "Skip copying; the log must already be in the tool directory")]
    pub no_copy: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "Show the staged path and command line without running anything")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        config.merge_with_cli_args(&self.create_cli_overrides());
        config.validate()?;
        config.make_paths_absolute()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_install_dir(self.tool_dir.clone())
            .with_executable(self.executable.clone())
            .with_owner(self.owner.clone())
            .with_output_dir(self.output_dir.clone())
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or("")
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Default `tracing` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity_level() {
            _ if self.quiet => "tablextract=error",
            0 => "tablextract=warn",
            1 => "tablextract=info",
            2 => "tablextract=debug",
            _ => "tablextract=trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_invocation() {
        let cli = Cli::try_parse_from(["tablextract", "backup.log", "--table", "orders"]).unwrap();
        assert_eq!(cli.log_file, Some(PathBuf::from("backup.log")));
        assert_eq!(cli.table_name(), "orders");
        assert!(!cli.force);
        assert!(!cli.no_copy);
    }

    #[test]
    fn test_log_file_required() {
        assert!(Cli::try_parse_from(["tablextract", "--table", "orders"]).is_err());
        assert!(Cli::try_parse_from(["tablextract", "--generate-config"]).is_ok());
    }

    #[test]
    fn test_conflicting_flags() {
        assert!(Cli::try_parse_from(["tablextract", "a.log", "--force", "--no-copy"]).is_err());
        assert!(Cli::try_parse_from(["tablextract", "a.log", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_overrides_reach_config() {
        let cli = Cli::try_parse_from([
            "tablextract",
            "a.log",
            "--tool-dir",
            "/opt/tool",
            "--owner",
            "sales",
            "--executable",
            "dbtran17",
        ])
        .unwrap();

        let mut config = Config::default();
        config.merge_with_cli_args(&cli.create_cli_overrides());
        assert_eq!(config.tool.install_dir, PathBuf::from("/opt/tool"));
        assert_eq!(config.tool.owner, "sales");
        assert_eq!(config.tool.executable, "dbtran17");
    }

    #[test]
    fn test_relative_tool_dir_is_anchored() {
        let config_file = tempfile::NamedTempFile::new().unwrap();
        let cli = Cli::try_parse_from([
            "tablextract",
            "a.log",
            "--tool-dir",
            "tools",
            "--config",
            config_file.path().to_str().unwrap(),
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.tool.install_dir, cwd.join("tools"));
        assert!(config.output.directory.is_absolute());
    }

    #[test]
    fn test_log_filter_follows_verbosity() {
        let cli = Cli::try_parse_from(["tablextract", "a.log", "-vv"]).unwrap();
        assert_eq!(cli.log_filter(), "tablextract=debug");

        let cli = Cli::try_parse_from(["tablextract", "a.log", "-q"]).unwrap();
        assert_eq!(cli.log_filter(), "tablextract=error");
    }
}
