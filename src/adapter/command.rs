//! Extractor backed by an external program.
//!
//! The program is run as `command args... <absolute path>` and must print one
//! parse result as JSON on stdout.

use super::framework::{Extractor, ParseResult, SourceInput};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Longest stderr excerpt carried in an error
const MAX_STDERR_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub struct CommandExtractor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandExtractor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Extractor for CommandExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    async fn extract(&self, input: &SourceInput) -> Result<ParseResult> {
        debug!("{} {}", self.program, input.relative_path);

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&input.absolute_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| {
                    Error::Extractor(format!(
                        "{} timed out after {}ms on {}",
                        self.program,
                        limit.as_millis(),
                        input.relative_path
                    ))
                })??,
            None => command.output().await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(MAX_STDERR_CHARS).collect();
            return Err(Error::Extractor(format!(
                "{} exited with {} on {}: {}",
                self.program,
                output.status,
                input.relative_path,
                excerpt.trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| Error::Parse {
            path: input.relative_path.clone(),
            message: format!("invalid JSON from {}: {}", self.program, e),
        })
    }
}
