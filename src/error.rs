use thiserror::Error;

#[derive(Error, Debug)]
pub enum TablextractError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Permission denied: {path}")]
    Permission { path: String },

    #[error("Log file not found: {path}")]
    SourceNotFound { path: String },

    #[error("Staged log file is missing: {path}")]
    StagedFileMissing { path: String },

    #[error("Overwrite of {path} was declined")]
    OverwriteDeclined { path: String },

    #[error("Table name is required")]
    MissingTableName,

    #[error("Invalid table name: {name}")]
    InvalidTableName { name: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Another extraction is already running")]
    ExtractionInProgress,

    #[error("Operation was cancelled by user")]
    Cancelled,
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for TablextractError {
    fn user_message(&self) -> String {
        match self {
            TablextractError::Permission { path } => {
                format!("You do not have permission to write to: {}", path)
            }
            TablextractError::SourceNotFound { path } => {
                format!("Log file does not exist or is not a file: {}", path)
            }
            TablextractError::StagedFileMissing { path } => {
                format!("The log file has not been copied to the tool directory: {}", path)
            }
            TablextractError::OverwriteDeclined { path } => {
                format!("Kept the existing file, nothing was copied: {}", path)
            }
            TablextractError::MissingTableName => "Enter the table name to extract".to_string(),
            TablextractError::InvalidTableName { name } => {
                format!("Invalid table name: {}", name)
            }
            TablextractError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            TablextractError::Spawn { program, message } => {
                format!("Could not start {}: {}", program, message)
            }
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            TablextractError::Permission { .. } => Some(
                "Run the program as administrator, or point --tool-dir at a directory you can write to.".to_string()
            ),
            TablextractError::SourceNotFound { .. } => Some(
                "Check the path of the .log file you want to extract from.".to_string()
            ),
            TablextractError::StagedFileMissing { .. } => Some(
                "Run again without --no-copy so the log file is copied first.".to_string()
            ),
            TablextractError::OverwriteDeclined { .. } => Some(
                "Use --no-copy to extract from the existing file, or --force to replace it without asking.".to_string()
            ),
            TablextractError::MissingTableName => Some(
                "Pass the table with --table (e.g., --table customers).".to_string()
            ),
            TablextractError::InvalidTableName { .. } => Some(
                "Table names may contain letters, digits, '_', '$' and '#', optionally prefixed by 'owner.'.".to_string()
            ),
            TablextractError::Spawn { .. } => Some(
                "Check that the extraction tool is installed and that --tool-dir and --executable are correct.".to_string()
            ),
            TablextractError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            TablextractError::ExtractionInProgress => Some(
                "Wait for the running extraction to finish.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for TablextractError {
    fn from(error: toml::de::Error) -> Self {
        TablextractError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TablextractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_friendly_messages() {
        let error = TablextractError::Permission {
            path: "/opt/tool/x.log".to_string(),
        };
        assert!(error.user_message().contains("permission"));
        assert!(error.suggestion().unwrap().contains("administrator"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_error = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let error = TablextractError::from(toml_error);
        assert!(matches!(error, TablextractError::Config { .. }));
    }
}
