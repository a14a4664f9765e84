use crate::config::StagingConfig;
use crate::error::{Result, TablextractError};
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Asked before an existing staged copy is replaced.
pub trait OverwritePrompt {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool>;
}

impl<F> OverwritePrompt for F
where
    F: Fn(&Path) -> bool,
{
    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        Ok(self(path))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagedLog {
    pub source: PathBuf,
    pub path: PathBuf,
    pub bytes_copied: u64,
    pub replaced_existing: bool,
}

/// Copies transaction logs into the extraction tool's directory.
pub struct LogStager {
    tool_dir: PathBuf,
    make_writable: bool,
    buffer_size: usize,
}

impl LogStager {
    pub fn new<P: Into<PathBuf>>(tool_dir: P) -> Self {
        Self {
            tool_dir: tool_dir.into(),
            make_writable: true,
            buffer_size: 64 * 1024,
        }
    }

    pub fn from_config<P: Into<PathBuf>>(tool_dir: P, config: &StagingConfig) -> Self {
        Self::new(tool_dir)
            .with_make_writable(config.make_writable)
            .with_buffer_size(config.buffer_size)
    }

    pub fn with_make_writable(mut self, writable: bool) -> Self {
        self.make_writable = writable;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(4096); // Minimum 4KB buffer
        self
    }

    pub fn staged_path(&self, source: &Path) -> Result<PathBuf> {
        let file_name = source.file_name().ok_or_else(|| TablextractError::InvalidPath {
            path: source.display().to_string(),
        })?;
        Ok(self.tool_dir.join(file_name))
    }

    pub fn stage(&self, source: &Path, prompt: &dyn OverwritePrompt) -> Result<StagedLog> {
        if !source.is_file() {
            return Err(TablextractError::SourceNotFound {
                path: source.display().to_string(),
            });
        }

        if !has_log_extension(source) {
            tracing::warn!(path = %source.display(), "source does not have a .log extension");
        }

        if !self.tool_dir.is_dir() {
            return Err(TablextractError::InvalidPath {
                path: format!("Tool directory does not exist: {}", self.tool_dir.display()),
            });
        }

        let dest = self.staged_path(source)?;

        if same_file(source, &dest) {
            tracing::info!(path = %dest.display(), "log already lives in the tool directory");
            let bytes = fs::metadata(&dest)?.len();
            return Ok(StagedLog {
                source: source.to_path_buf(),
                path: dest,
                bytes_copied: bytes,
                replaced_existing: false,
            });
        }

        let replaced_existing = dest.exists();
        if replaced_existing && !prompt.confirm_overwrite(&dest)? {
            tracing::info!(path = %dest.display(), "overwrite declined");
            return Err(TablextractError::OverwriteDeclined {
                path: dest.display().to_string(),
            });
        }

        let bytes_copied = self
            .copy_file_with_buffer(source, &dest)
            .map_err(|e| permission_aware(e, &dest))?;

        if self.make_writable {
            make_world_writable(&dest).map_err(|e| permission_aware(e, &dest))?;
        }

        tracing::info!(
            source = %source.display(),
            dest = %dest.display(),
            bytes = bytes_copied,
            "staged log file"
        );

        Ok(StagedLog {
            source: source.to_path_buf(),
            path: dest,
            bytes_copied,
            replaced_existing,
        })
    }

    /// The staged copy for `source`, which must already exist.
    pub fn existing(&self, source: &Path) -> Result<StagedLog> {
        let dest = self.staged_path(source)?;
        let metadata = fs::metadata(&dest).map_err(|_| TablextractError::StagedFileMissing {
            path: dest.display().to_string(),
        })?;

        if !metadata.is_file() {
            return Err(TablextractError::StagedFileMissing {
                path: dest.display().to_string(),
            });
        }

        Ok(StagedLog {
            source: source.to_path_buf(),
            path: dest,
            bytes_copied: 0,
            replaced_existing: false,
        })
    }

    fn copy_file_with_buffer(&self, source: &Path, dest: &Path) -> io::Result<u64> {
        let source_file = fs::File::open(source)?;
        // Written beside the destination and renamed over it only once complete
        let partial = tempfile::NamedTempFile::new_in(&self.tool_dir)?;

        let mut reader = BufReader::with_capacity(self.buffer_size, source_file);
        let mut writer = BufWriter::with_capacity(self.buffer_size, partial);

        let total_bytes = io::copy(&mut reader, &mut writer)?;
        let partial = writer.into_inner().map_err(|e| e.into_error())?;

        // Set file modification time to match source
        if let Ok(modified_time) = fs::metadata(source).and_then(|m| m.modified()) {
            let _ = filetime::set_file_mtime(
                partial.path(),
                filetime::FileTime::from_system_time(modified_time),
            );
        }

        partial.persist(dest).map_err(|e| e.error)?;

        Ok(total_bytes)
    }
}

fn has_log_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("log"))
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn permission_aware(error: io::Error, path: &Path) -> TablextractError {
    if error.kind() == io::ErrorKind::PermissionDenied {
        TablextractError::Permission {
            path: path.display().to_string(),
        }
    } else {
        TablextractError::Io(error)
    }
}

#[cfg(unix)]
fn make_world_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn make_world_writable(path: &Path) -> io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn write_log(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_stage_copies_into_tool_dir() {
        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "log data");

        let stager = LogStager::new(tool_dir.path());
        let never_asked = |_: &Path| -> bool { panic!("no prompt expected") };
        let staged = stager.stage(&source, &never_asked).unwrap();

        assert_eq!(staged.path, tool_dir.path().join("backup.log"));
        assert_eq!(staged.bytes_copied, 8);
        assert!(!staged.replaced_existing);
        assert_eq!(fs::read_to_string(&staged.path).unwrap(), "log data");
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_copy_is_world_writable() {
        use std::os::unix::fs::PermissionsExt;

        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "x");

        let staged = LogStager::new(tool_dir.path())
            .stage(&source, &|_: &Path| true)
            .unwrap();

        let mode = fs::metadata(&staged.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn test_existing_destination_prompts() {
        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "new data");
        write_log(tool_dir.path(), "backup.log", "old data");

        let asked = Cell::new(false);
        let accept = |_: &Path| {
            asked.set(true);
            true
        };

        let staged = LogStager::new(tool_dir.path()).stage(&source, &accept).unwrap();
        assert!(asked.get());
        assert!(staged.replaced_existing);
        assert_eq!(fs::read_to_string(&staged.path).unwrap(), "new data");
    }

    #[test]
    fn test_declined_overwrite_leaves_destination_untouched() {
        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "new data");
        let dest = write_log(tool_dir.path(), "backup.log", "old data");

        let result = LogStager::new(tool_dir.path()).stage(&source, &|_: &Path| false);

        assert!(matches!(result, Err(TablextractError::OverwriteDeclined { .. })));
        assert_eq!(fs::read_to_string(dest).unwrap(), "old data");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_keeps_previous_copy() {
        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let dest = write_log(tool_dir.path(), "backup.log", "old data");

        // Opening a directory works on Unix but reading it fails mid-copy
        let stager = LogStager::new(tool_dir.path());
        assert!(stager.copy_file_with_buffer(source_dir.path(), &dest).is_err());

        assert_eq!(fs::read_to_string(&dest).unwrap(), "old data");
        let entries: Vec<_> = fs::read_dir(tool_dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "partial copy left behind");
    }

    #[test]
    fn test_copy_preserves_mtime() {
        let source_dir = TempDir::new().unwrap();
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "x");
        let mtime = filetime::FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&source, mtime).unwrap();

        let staged = LogStager::new(tool_dir.path())
            .stage(&source, &|_: &Path| true)
            .unwrap();

        let metadata = fs::metadata(&staged.path).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&metadata), mtime);
    }

    #[test]
    fn test_missing_source() {
        let tool_dir = TempDir::new().unwrap();
        let result = LogStager::new(tool_dir.path())
            .stage(Path::new("/no/such/backup.log"), &|_: &Path| true);
        assert!(matches!(result, Err(TablextractError::SourceNotFound { .. })));
    }

    #[test]
    fn test_missing_tool_dir() {
        let source_dir = TempDir::new().unwrap();
        let source = write_log(source_dir.path(), "backup.log", "x");
        let result = LogStager::new(source_dir.path().join("nope")).stage(&source, &|_: &Path| true);
        assert!(matches!(result, Err(TablextractError::InvalidPath { .. })));
    }

    #[test]
    fn test_existing_staged_copy() {
        let tool_dir = TempDir::new().unwrap();
        let stager = LogStager::new(tool_dir.path());

        assert!(matches!(
            stager.existing(Path::new("/elsewhere/backup.log")),
            Err(TablextractError::StagedFileMissing { .. })
        ));

        write_log(tool_dir.path(), "backup.log", "x");
        let staged = stager.existing(Path::new("/elsewhere/backup.log")).unwrap();
        assert_eq!(staged.path, tool_dir.path().join("backup.log"));
    }

    #[test]
    fn test_log_already_in_tool_dir() {
        let tool_dir = TempDir::new().unwrap();
        let source = write_log(tool_dir.path(), "backup.log", "x");

        let staged = LogStager::new(tool_dir.path())
            .stage(&source, &|_: &Path| -> bool { panic!("no prompt expected") })
            .unwrap();
        assert_eq!(fs::read_to_string(staged.path).unwrap(), "x");
    }

    #[test]
    fn test_log_extension_check() {
        assert!(has_log_extension(Path::new("a.log")));
        assert!(has_log_extension(Path::new("A.LOG")));
        assert!(!has_log_extension(Path::new("a.txt")));
        assert!(!has_log_extension(Path::new("log")));
    }
}
