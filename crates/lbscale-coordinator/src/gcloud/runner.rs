//! Process execution for the gcloud CLI

use super::error::{classify_failure, GcloudError, GcloudResult};
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

/// Executes one CLI invocation and returns its stdout.
///
/// Abstracted so the compute layer can be exercised without a real CLI.
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String]) -> impl Future<Output = GcloudResult<String>> + Send;
}

/// Runs the real `gcloud` binary
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    project: Option<String>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            project: None,
        }
    }

    /// Pin every invocation to a project instead of the ambient default
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, args: &[String]) -> GcloudResult<String> {
        let mut command = Command::new(&self.program);
        command
            .args(args)
            .arg("--quiet")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(project) = &self.project {
            command.arg(format!("--project={project}"));
        }

        debug!(program = %self.program, args = ?args, "Running gcloud");

        let output = command.output().await.map_err(|source| GcloudError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            trace!(bytes = stdout.len(), "gcloud succeeded");
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let error = classify_failure(output.status.code(), &stderr);
        debug!(args = ?args, error = %error, "gcloud failed");
        Err(error)
    }
}
