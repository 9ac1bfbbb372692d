use crate::domain::models::container::{Container, ContainerID};
use crate::domain::models::names::{ProjectName, ServiceName};
use crate::error::ControlError;

/// Captured output of a finished compose command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Runs the external compose tool against the configured compose file.
pub trait ComposeExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        project_name: &ProjectName,
        args: &[String],
    ) -> impl Future<Output = Result<CommandOutput, ControlError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerFilter {
    /// Every container, labelled or not.
    All,
    /// Containers carrying a compose project label.
    AnyProject,
    Project(ProjectName),
    Service(ProjectName, ServiceName),
}

/// Live container state and per-container commands.
pub trait ContainerRuntime: Send + Sync + 'static {
    fn list_containers(
        &self,
        filter: ContainerFilter,
    ) -> impl Future<Output = Result<Vec<Container>, ControlError>> + Send;

    fn get_container(
        &self,
        container_id: &ContainerID,
    ) -> impl Future<Output = Result<Container, ControlError>> + Send;

    fn stop_container(&self, container_id: &ContainerID) -> impl Future<Output = Result<(), ControlError>> + Send;

    fn start_container(&self, container_id: &ContainerID) -> impl Future<Output = Result<(), ControlError>> + Send;

    fn restart_container(&self, container_id: &ContainerID) -> impl Future<Output = Result<(), ControlError>> + Send;

    fn remove_container(&self, container_id: &ContainerID) -> impl Future<Output = Result<(), ControlError>> + Send;

    fn rename_container(
        &self,
        container_id: &ContainerID,
        new_name: &str,
    ) -> impl Future<Output = Result<(), ControlError>> + Send;

    /// Last `lines` log lines, each prefixed with its RFC 3339 timestamp.
    fn container_logs(
        &self,
        container_id: &ContainerID,
        lines: usize,
    ) -> impl Future<Output = Result<String, ControlError>> + Send;

    fn remove_dangling_images(&self) -> impl Future<Output = Result<(), ControlError>> + Send;

    /// Removes stopped containers and unused networks.
    fn prune(&self) -> impl Future<Output = Result<(), ControlError>> + Send;

    /// Removes unused images and volumes.
    fn prune_images_and_volumes(&self) -> impl Future<Output = Result<(), ControlError>> + Send;
}
