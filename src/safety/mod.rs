//! Confirmation before the originals are deleted.
//!
//! The prompt only guards the delete phase; scanning, building and uploading
//! never ask. It is skipped when:
//! - `--force` is set (always the case for [`Config::for_source`])
//! - JSON logging is enabled, so structured output stays clean
//! - stdin or stdout is not a terminal
//!
//! A declined prompt keeps the originals. It is not an error.

#[cfg(test)]
mod safety_properties;

use crate::config::Config;
use anyhow::Result;
use std::io::{BufRead, IsTerminal, Write};

/// Trait for handling user prompts, enabling testability.
///
/// The default implementation ([`StdioPromptHandler`]) uses stdin/stdout.
/// Tests can provide custom implementations to avoid blocking on user input.
pub trait PromptHandler: Send + Sync {
    /// Display `prompt` and read a line of user input, trimmed.
    fn read_confirmation(&self, prompt: &str) -> Result<String>;

    /// Whether both stdin and stdout are connected to a TTY.
    fn is_interactive(&self) -> bool;
}

/// Default prompt handler using stdin/stdout.
pub struct StdioPromptHandler;

impl PromptHandler for StdioPromptHandler {
    fn read_confirmation(&self, prompt: &str) -> Result<String> {
        print!("{prompt}");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().lock().read_line(&mut input)?;
        Ok(input.trim().to_string())
    }

    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }
}

pub struct SafetyChecker {
    force: bool,
    json_logging: bool,
    prompt_handler: Box<dyn PromptHandler>,
}

impl SafetyChecker {
    pub fn new(config: &Config) -> Self {
        Self::with_prompt_handler(config, Box::new(StdioPromptHandler))
    }

    /// Create a SafetyChecker with a custom prompt handler (for testing).
    pub fn with_prompt_handler(config: &Config, prompt_handler: Box<dyn PromptHandler>) -> Self {
        let json_logging = config
            .tracing_config
            .map(|tc| tc.json_tracing)
            .unwrap_or(false);

        Self {
            force: config.force,
            json_logging,
            prompt_handler,
        }
    }

    /// Returns `Ok(true)` when deletion may proceed, `Ok(false)` when the user
    /// declined.
    pub fn confirm_deletion(&self, count: usize, bucket: &str) -> Result<bool> {
        if self.force || self.should_skip_prompt() {
            return Ok(true);
        }

        let prompt = format!("Delete {count} original file(s) from s3://{bucket}? (y/N): ");
        let input = self.prompt_handler.read_confirmation(&prompt)?;

        Ok(is_affirmative(&input))
    }

    fn should_skip_prompt(&self) -> bool {
        self.json_logging || !self.prompt_handler.is_interactive()
    }
}

pub(crate) fn is_affirmative(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
