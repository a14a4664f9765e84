use crate::config::ToolConfig;
use crate::error::{Result, TablextractError};
use crate::runner::process::{resolve_executable, CommandSpec};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_$#]+(\.[A-Za-z0-9_$#]+)?$").expect("table name pattern is valid")
});

/// One extraction: which staged log, which table, and where the text export goes.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    pub source: PathBuf,
    pub staged_path: PathBuf,
    pub table: String,
    /// `owner.table` as passed to the tool.
    pub qualified_table: String,
    pub output_path: PathBuf,
    pub tool_dir: PathBuf,
    pub executable: PathBuf,
}

impl ExtractionRequest {
    pub fn new(
        source: &Path,
        staged_path: &Path,
        table: &str,
        output: Option<&Path>,
        output_dir: &Path,
        tool: &ToolConfig,
    ) -> Result<Self> {
        let table = validate_table_name(table)?;
        let qualified_table = qualify_table(&table, &tool.owner);
        let output_path = resolve_output_path(output, output_dir, &table)?;

        if staged_path.file_name().is_none() {
            return Err(TablextractError::InvalidPath {
                path: staged_path.display().to_string(),
            });
        }

        // The child runs from here, so neither it nor the executable may stay relative
        let tool_dir = std::path::absolute(&tool.install_dir)?;
        let executable = resolve_executable(&tool_dir, &tool.executable);

        Ok(Self {
            source: source.to_path_buf(),
            staged_path: staged_path.to_path_buf(),
            table,
            qualified_table,
            output_path,
            tool_dir,
            executable,
        })
    }

    /// `dbtran -s -r <staged log> -it <owner.table> -n <output>`, run from the tool directory.
    pub fn command(&self) -> CommandSpec {
        let staged_name = self
            .staged_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        CommandSpec::new(&self.executable)
            .args(["-s", "-r"])
            .arg(staged_name)
            .arg("-it")
            .arg(self.qualified_table.clone())
            .arg("-n")
            .arg(self.output_path.to_string_lossy().into_owned())
            .current_dir(&self.tool_dir)
    }
}

pub fn validate_table_name(name: &str) -> Result<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(TablextractError::MissingTableName);
    }

    if !TABLE_NAME.is_match(name) {
        return Err(TablextractError::InvalidTableName {
            name: name.to_string(),
        });
    }

    Ok(name.to_string())
}

fn qualify_table(table: &str, owner: &str) -> String {
    if table.contains('.') {
        table.to_string()
    } else {
        format!("{}.{}", owner, table)
    }
}

/// Explicit output path or `<output_dir>/<table>.txt`; `.txt` is added when no extension is given.
pub fn resolve_output_path(output: Option<&Path>, output_dir: &Path, table: &str) -> Result<PathBuf> {
    let mut path = match output {
        Some(path) => path.to_path_buf(),
        None => {
            let file_stem = table.rsplit('.').next().unwrap_or(table);
            output_dir.join(file_stem)
        }
    };

    if path.file_name().is_none() {
        return Err(TablextractError::InvalidPath {
            path: path.display().to_string(),
        });
    }

    if path.extension().is_none() {
        path.set_extension("txt");
    }

    // Relative paths would otherwise resolve against the tool directory
    if path.is_relative() {
        path = std::env::current_dir()?.join(path);
    }

    match path.parent() {
        Some(parent) if parent.is_dir() => Ok(path),
        _ => Err(TablextractError::InvalidPath {
            path: format!("Destination directory does not exist: {}", path.display()),
        }),
    }
}
