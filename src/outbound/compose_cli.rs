use crate::domain::models::names::ProjectName;
use crate::domain::ports::{CommandOutput, ComposeExecutor};
use crate::error::ControlError;
use log::{debug, error};
use std::path::PathBuf;
use tokio::process::Command;

const DEFAULT_COMMAND: [&str; 2] = ["docker", "compose"];

/// Runs the compose command line tool against one compose file.
#[derive(Debug, Clone)]
pub struct ComposeCli {
    command: Vec<String>,
    compose_file: PathBuf,
    compatibility_mode: bool,
    windows_host: bool,
}

impl ComposeCli {
    /// `command` is the program followed by its leading arguments, e.g. `["docker", "compose"]`.
    /// An empty command falls back to `docker compose`.
    pub fn new(command: Vec<String>, compose_file: PathBuf) -> Self {
        let command = if command.is_empty() {
            DEFAULT_COMMAND.iter().map(|part| part.to_string()).collect()
        } else {
            command
        };
        Self {
            command,
            compose_file,
            compatibility_mode: false,
            windows_host: false,
        }
    }

    pub fn with_compatibility_mode(mut self, enabled: bool) -> Self {
        self.compatibility_mode = enabled;
        self
    }

    pub fn with_windows_host(mut self, enabled: bool) -> Self {
        self.windows_host = enabled;
        self
    }

    /// Full argument list after the program name.
    pub fn arguments(&self, project_name: &ProjectName, args: &[String]) -> Vec<String> {
        let mut arguments: Vec<String> = self.command[1..].to_vec();
        arguments.push("--file".to_string());
        arguments.push(self.compose_file.display().to_string());
        arguments.push("--project-name".to_string());
        arguments.push(project_name.to_string());
        if self.compatibility_mode {
            arguments.push("--compatibility".to_string());
        }
        arguments.extend(args.iter().cloned());
        arguments
    }

    fn environment(&self) -> Vec<(&'static str, &'static str)> {
        if self.windows_host {
            vec![
                ("COMPOSE_FORCE_WINDOWS_HOST", "1"),
                ("COMPOSE_CONVERT_WINDOWS_PATHS", "1"),
            ]
        } else {
            Vec::new()
        }
    }
}

impl ComposeExecutor for ComposeCli {
    async fn execute(&self, project_name: &ProjectName, args: &[String]) -> Result<CommandOutput, ControlError> {
        let arguments = self.arguments(project_name, args);
        let rendered = format!("{} {}", self.command[0], arguments.join(" "));
        debug!("running {rendered}");

        let mut command = Command::new(&self.command[0]);
        command.args(&arguments).envs(self.environment());
        if let Some(directory) = self.compose_file.parent()
            && !directory.as_os_str().is_empty()
        {
            command.current_dir(directory);
        }
        let output = command.output().await?;

        let output_captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!("{rendered} returned {}: {}", output.status, output_captured.combined());

        if output.status.success() {
            Ok(output_captured)
        } else {
            let combined = output_captured.combined();
            error!("{rendered} failed with {}: {combined}", output.status);
            Err(ControlError::CommandFailed {
                command: args.join(" "),
                output: combined,
            })
        }
    }
}
