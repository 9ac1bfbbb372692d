//! Compose project and service commands, including the update/rollback protocol.
//!
//! The generation of a container is encoded in its name: renaming a container with the
//! rollback suffix turns it into rollback material. The compose tool then no longer counts it
//! as a replica of its service name pattern, so scaling up launches a fresh generation next to it.
//! Steps run strictly in order and a failing step aborts the sequence without compensation.
use crate::domain::logs::format_log_lines;
use crate::domain::models::config::ServiceConfig;
use crate::domain::models::container::Container;
use crate::domain::models::names::{ProjectName, ServiceName};
use crate::domain::models::project::Project;
use crate::domain::models::service::Service;
use crate::domain::ports::{CommandOutput, ComposeExecutor, ContainerFilter, ContainerRuntime};
use crate::error::ControlError;
use log::{debug, info};
use std::sync::Arc;

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub struct Lifecycle<E: ComposeExecutor, R: ContainerRuntime> {
    executor: Arc<E>,
    runtime: Arc<R>,
    post_update_command: Vec<String>,
}

impl<E: ComposeExecutor, R: ContainerRuntime> Lifecycle<E, R> {
    pub fn new(executor: Arc<E>, runtime: Arc<R>, post_update_command: Vec<String>) -> Self {
        Self {
            executor,
            runtime,
            post_update_command,
        }
    }

    async fn compose(&self, project_name: &ProjectName, args: Vec<String>) -> Result<CommandOutput, ControlError> {
        self.executor.execute(project_name, &args).await
    }

    pub async fn load_service(
        &self,
        project_name: &ProjectName,
        service_name: &ServiceName,
        config: Option<ServiceConfig>,
    ) -> Result<Service, ControlError> {
        let mut service = Service::new(project_name.clone(), service_name.clone(), config, Vec::new());
        self.refresh(&mut service).await?;
        Ok(service)
    }

    /// Replaces the service's containers with what the runtime reports now.
    pub async fn refresh(&self, service: &mut Service) -> Result<(), ControlError> {
        service.containers = self
            .runtime
            .list_containers(ContainerFilter::Service(
                service.project_name.clone(),
                service.service_name.clone(),
            ))
            .await?;
        Ok(())
    }

    pub async fn pull(&self, service: &Service) -> Result<(), ControlError> {
        debug!("pulling image for {}", service.service_name);
        self.compose(&service.project_name, args(["pull", service.service_name.as_str()]))
            .await?;
        Ok(())
    }

    pub async fn up(&self, service: &Service) -> Result<(), ControlError> {
        self.pull(service).await?;
        self.compose(
            &service.project_name,
            args(["up", "--detach", "--no-deps", service.service_name.as_str()]),
        )
        .await?;
        Ok(())
    }

    pub async fn stop(&self, service: &Service) -> Result<(), ControlError> {
        self.compose(&service.project_name, args(["stop", service.service_name.as_str()]))
            .await?;
        Ok(())
    }

    pub async fn start(&self, service: &Service) -> Result<(), ControlError> {
        self.compose(&service.project_name, args(["start", service.service_name.as_str()]))
            .await?;
        Ok(())
    }

    pub async fn remove(&self, service: &Service) -> Result<(), ControlError> {
        self.compose(
            &service.project_name,
            args(["rm", "--force", service.service_name.as_str()]),
        )
        .await?;
        Ok(())
    }

    pub async fn restart(&self, service: &Service) -> Result<(), ControlError> {
        self.compose(&service.project_name, args(["restart", service.service_name.as_str()]))
            .await?;
        Ok(())
    }

    pub async fn scale(&self, service: &Service, replicas: u32) -> Result<(), ControlError> {
        self.pull(service).await?;
        let target = format!("{}={replicas}", service.service_name);
        self.compose(
            &service.project_name,
            args([
                "up",
                "--detach",
                "--no-deps",
                "--scale",
                &target,
                "--no-recreate",
                service.service_name.as_str(),
            ]),
        )
        .await?;
        Ok(())
    }

    /// Launches a new generation of the service and keeps the current one, stopped, for rollback.
    pub async fn update(&self, service: &mut Service) -> Result<(), ControlError> {
        let replicas = match &service.config {
            Some(config) => config.scale,
            None => {
                return Err(ControlError::InvalidState(format!(
                    "service '{}' has no declared configuration",
                    service.service_name
                )));
            }
        };
        let doubled = replicas.checked_mul(2).ok_or_else(|| {
            ControlError::InvalidState(format!(
                "service '{}' declares too many replicas ({replicas}) to keep a rollback generation",
                service.service_name
            ))
        })?;
        info!("updating service {} of {}", service.service_name, service.project_name);

        self.pull(service).await?;

        let stale: Vec<Container> = service.rollback_containers().cloned().collect();
        for container in stale {
            info!("removing leftover rollback container {}", container.name);
            self.runtime.remove_container(&container.id).await?;
        }
        self.refresh(service).await?;

        for container in service.containers.clone() {
            let new_name = container.rollback_name();
            debug!("renaming {} to {new_name}", container.name);
            self.runtime.rename_container(&container.id, &new_name).await?;
        }
        self.refresh(service).await?;

        self.scale(service, doubled).await?;
        self.refresh(service).await?;

        let previous: Vec<Container> = service.rollback_containers().cloned().collect();
        for container in previous.iter().filter(|c| !c.is_exited()) {
            debug!("stopping previous container {}", container.name);
            self.runtime.stop_container(&container.id).await?;
        }
        self.refresh(service).await?;

        self.run_post_update_hook(&service.project_name).await?;
        info!(
            "service {} updated, {} containers kept for rollback",
            service.service_name,
            previous.len()
        );
        Ok(())
    }

    /// Discards the current generation and restores the one kept by the last update.
    pub async fn rollback(&self, service: &mut Service) -> Result<(), ControlError> {
        info!("rolling back service {} of {}", service.service_name, service.project_name);
        let (previous, current): (Vec<Container>, Vec<Container>) = service
            .containers
            .iter()
            .cloned()
            .partition(|c| c.is_rollback_candidate());

        // the restored names may still be taken by the current generation
        for container in current {
            if !container.is_exited() {
                self.runtime.stop_container(&container.id).await?;
            }
            self.runtime.remove_container(&container.id).await?;
        }
        for container in previous {
            debug!("restoring {} as {}", container.name, container.restored_name());
            self.runtime
                .rename_container(&container.id, container.restored_name())
                .await?;
            self.runtime.start_container(&container.id).await?;
        }
        self.refresh(service).await?;

        self.run_post_update_hook(&service.project_name).await?;
        info!("service {} rolled back", service.service_name);
        Ok(())
    }

    pub async fn logs(&self, service: &Service, lines: usize) -> Result<Vec<String>, ControlError> {
        let output = self
            .compose(
                &service.project_name,
                vec![
                    "logs".to_string(),
                    "--no-color".to_string(),
                    "--timestamps".to_string(),
                    format!("--tail={lines}"),
                    service.service_name.to_string(),
                ],
            )
            .await?;
        Ok(format_log_lines(&output.combined()))
    }

    async fn run_post_update_hook(&self, project_name: &ProjectName) -> Result<(), ControlError> {
        if self.post_update_command.is_empty() {
            return Ok(());
        }
        info!("running post update command {:?}", self.post_update_command);
        self.compose(project_name, self.post_update_command.clone()).await?;
        Ok(())
    }

    pub async fn project_up(&self, project: &Project) -> Result<(), ControlError> {
        self.compose(&project.project_name, args(["pull"])).await?;
        self.compose(&project.project_name, args(["up", "--detach"])).await?;
        Ok(())
    }

    pub async fn project_down(&self, project: &Project) -> Result<(), ControlError> {
        self.compose(&project.project_name, args(["down"])).await?;
        Ok(())
    }

    pub async fn project_remove(&self, project: &Project) -> Result<(), ControlError> {
        self.compose(&project.project_name, args(["rm", "--force"])).await?;
        Ok(())
    }

    pub async fn project_restart(&self, project: &Project) -> Result<(), ControlError> {
        self.compose(&project.project_name, args(["restart"])).await?;
        Ok(())
    }
}
