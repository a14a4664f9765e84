use crate::error::Result;
use crate::staging::OverwritePrompt;
use console::{style, Term};
use std::path::Path;

/// Asks on the terminal; anything but an explicit yes keeps the existing file.
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl OverwritePrompt for TerminalPrompt {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        if !self.term.is_term() {
            tracing::warn!(path = %path.display(), "not a terminal, keeping existing file");
            return Ok(false);
        }

        self.term.write_str(&format!(
            "{} A file with the same name already exists: {}\n  Replace it? [y/N] ",
            style("!").yellow().bold(),
            path.display()
        ))?;
        let answer = self.term.read_line()?;
        Ok(parse_answer(&answer))
    }
}

/// `--force`: replace without asking.
pub struct AssumeYes;

impl OverwritePrompt for AssumeYes {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        tracing::info!(path = %path.display(), "replacing existing file (--force)");
        Ok(true)
    }
}

pub fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
