pub mod output;
pub mod progress;
pub mod prompt;
pub mod signals;

pub use output::{OutputFormatter, OutputMode};
pub use progress::ProgressManager;
pub use prompt::{AssumeYes, TerminalPrompt};
pub use signals::GracefulShutdown;
