use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    NotFound(String),
    #[error("permission denied")]
    Forbidden,
    #[error("authentication required")]
    Unauthenticated,
    #[error("command `{command}` failed: {output}")]
    CommandFailed { command: String, output: String },
    #[error("container runtime error: {0}")]
    Runtime(String),
    #[error("invalid compose configuration: {0}")]
    ConfigInvalid(String),
    #[error("configuration unavailable: {0}")]
    ConfigUnavailable(String),
    #[error("system busy, another command is running")]
    SystemBusy,
    #[error("{0}")]
    InvalidState(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ControlError {
    pub fn service_not_found(project_name: &str, service_name: &str) -> Self {
        ControlError::NotFound(format!(
            "couldn't find service '{service_name}' in project '{project_name}'"
        ))
    }

    pub fn project_not_found(project_name: &str) -> Self {
        ControlError::NotFound(format!("couldn't find project '{project_name}'"))
    }
}
