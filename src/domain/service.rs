use crate::domain::config_cache::ConfigCache;
use crate::domain::gate::{ConcurrencyGate, GatePass};
use crate::domain::lifecycle::Lifecycle;
use crate::domain::models::config::ProjectConfig;
use crate::domain::models::container::{Container, ContainerID};
use crate::domain::models::names::{ProjectName, ServiceName};
use crate::domain::models::permission::{
    ContainerAction, Permission, PermissionEntry, ProjectAction, ServiceAction,
};
use crate::domain::models::project::{Project, group_projects};
use crate::domain::models::service::Service;
use crate::domain::permissions::{Actor, Authorizer, PermissionRegistry, container_namespace};
use crate::domain::ports::{ComposeExecutor, ContainerFilter, ContainerRuntime};
use crate::error::ControlError;
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ControlOptions {
    pub compose_file: Option<PathBuf>,
    pub project_name: Option<ProjectName>,
    pub post_update_command: Vec<String>,
    pub strip_custom_registry: String,
    pub disable_service_container_actions: bool,
}

pub struct ComposeFile {
    pub path: PathBuf,
    pub project_name: ProjectName,
    pub file_content: String,
}

/// Entry point for every command.
///
/// Each guarded command runs the same stages in order: authorize the actor, take the
/// concurrency gate when the command mutates, resolve the resource, check the capability
/// predicate against fresh runtime state, then execute. A failing stage stops the pipeline.
pub struct ControlCenter<E: ComposeExecutor, R: ContainerRuntime> {
    runtime: Arc<R>,
    config: ConfigCache<E>,
    registry: PermissionRegistry,
    authorizer: Authorizer,
    gate: ConcurrencyGate,
    lifecycle: Lifecycle<E, R>,
    options: ControlOptions,
}

fn require(allowed: bool, message: impl FnOnce() -> String) -> Result<(), ControlError> {
    if allowed {
        Ok(())
    } else {
        Err(ControlError::InvalidState(message()))
    }
}

impl<E: ComposeExecutor, R: ContainerRuntime> ControlCenter<E, R> {
    pub fn new(executor: Arc<E>, runtime: Arc<R>, gate: ConcurrencyGate, options: ControlOptions) -> Self {
        let registry = PermissionRegistry::new();
        Self {
            config: ConfigCache::new(
                options.compose_file.clone(),
                options.project_name.clone(),
                executor.clone(),
                registry.clone(),
            ),
            authorizer: Authorizer::new(registry.clone()),
            lifecycle: Lifecycle::new(executor, runtime.clone(), options.post_update_command.clone()),
            registry,
            runtime,
            gate,
            options,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn strip_custom_registry(&self) -> &str {
        &self.options.strip_custom_registry
    }

    pub async fn config(&self) -> Result<Option<Arc<ProjectConfig>>, ControlError> {
        self.config.get_config().await
    }

    pub async fn permissions(&self) -> Vec<PermissionEntry> {
        self.refresh_permissions().await;
        self.registry.entries().await
    }

    /// Loading the config syncs the registry. Load failures surface again when the
    /// resource is resolved, so here they only leave the registry as it was.
    async fn refresh_permissions(&self) {
        match self.config.get_config().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.registry.sync_static().await;
            }
            Err(e) => {
                debug!("permissions not refreshed: {e}");
                self.registry.sync_static().await;
            }
        }
    }

    async fn authorize(&self, actor: &Actor, permission: Permission) -> Result<(), ControlError> {
        if !actor.superuser {
            self.refresh_permissions().await;
        }
        self.authorizer.authorize(actor, &permission).await
    }

    fn exclusive(&self) -> Result<GatePass, ControlError> {
        self.gate.try_acquire()
    }

    async fn managed_project(&self, project_name: &ProjectName) -> Result<Project, ControlError> {
        let config = self.config.require_config().await?;
        if &config.project_name != project_name {
            return Err(ControlError::project_not_found(project_name.as_str()));
        }
        let containers = self
            .runtime
            .list_containers(ContainerFilter::Project(project_name.clone()))
            .await?;
        group_projects(containers, Some(&config))
            .into_iter()
            .next()
            .ok_or_else(|| ControlError::project_not_found(project_name.as_str()))
    }

    async fn service(&self, project_name: &ProjectName, service_name: &ServiceName) -> Result<Service, ControlError> {
        let config = self.config.require_config().await?;
        let service_config = config
            .service_config(project_name, service_name)
            .cloned()
            .ok_or_else(|| ControlError::service_not_found(project_name.as_str(), service_name.as_str()))?;
        self.lifecycle
            .load_service(project_name, service_name, Some(service_config))
            .await
    }

    /// The managed project, restricted to the services the actor may view.
    pub async fn managed_projects(&self, actor: &Actor) -> Result<Vec<Project>, ControlError> {
        let Some(config) = self.config.get_config().await? else {
            return Ok(Vec::new());
        };
        let containers = self
            .runtime
            .list_containers(ContainerFilter::Project(config.project_name.clone()))
            .await?;
        let mut projects = group_projects(containers, Some(&config));
        for project in &mut projects {
            let mut visible = Vec::with_capacity(project.services.len());
            for service in project.services.drain(..) {
                let permission = Permission::service(&service.service_name, ServiceAction::View);
                // the config was just loaded, so the registry is current
                if self.authorizer.is_allowed(actor, &permission).await {
                    visible.push(service);
                }
            }
            project.services = visible;
        }
        Ok(projects)
    }

    pub async fn other_projects(&self) -> Result<Vec<Project>, ControlError> {
        let managed = self.config.project_name();
        let containers: Vec<Container> = self
            .runtime
            .list_containers(ContainerFilter::AnyProject)
            .await?
            .into_iter()
            .filter(|c| c.project.as_ref() != managed)
            .collect();
        Ok(group_projects(containers, None))
    }

    pub async fn standalone_containers(&self) -> Result<Vec<Container>, ControlError> {
        Ok(self
            .runtime
            .list_containers(ContainerFilter::All)
            .await?
            .into_iter()
            .filter(|c| c.project.is_none() && c.service.is_none())
            .collect())
    }

    pub async fn project_up(&self, actor: &Actor, project_name: &ProjectName) -> Result<(), ControlError> {
        self.authorize(actor, Permission::project(project_name, ProjectAction::Up)).await?;
        let _pass = self.exclusive()?;
        let project = self.managed_project(project_name).await?;
        require(project.can_up(), || format!("project '{project_name}' has containers pending rollback"))?;
        info!("{} runs up on project {project_name}", actor.username);
        self.lifecycle.project_up(&project).await
    }

    pub async fn project_down(&self, actor: &Actor, project_name: &ProjectName) -> Result<(), ControlError> {
        self.authorize(actor, Permission::project(project_name, ProjectAction::Down)).await?;
        let _pass = self.exclusive()?;
        let project = self.managed_project(project_name).await?;
        require(project.can_down(), || format!("project '{project_name}' can't be taken down"))?;
        info!("{} runs down on project {project_name}", actor.username);
        self.lifecycle.project_down(&project).await
    }

    pub async fn project_remove(&self, actor: &Actor, project_name: &ProjectName) -> Result<(), ControlError> {
        self.authorize(actor, Permission::project(project_name, ProjectAction::Remove)).await?;
        let _pass = self.exclusive()?;
        let project = self.managed_project(project_name).await?;
        require(project.can_remove(), || {
            format!("project '{project_name}' has no removable containers")
        })?;
        info!("{} removes stopped containers of project {project_name}", actor.username);
        self.lifecycle.project_remove(&project).await
    }

    pub async fn project_restart(&self, actor: &Actor, project_name: &ProjectName) -> Result<(), ControlError> {
        self.authorize(actor, Permission::project(project_name, ProjectAction::Restart)).await?;
        let _pass = self.exclusive()?;
        let project = self.managed_project(project_name).await?;
        require(project.can_restart(), || format!("project '{project_name}' can't be restarted"))?;
        info!("{} restarts project {project_name}", actor.username);
        self.lifecycle.project_restart(&project).await
    }

    pub async fn service_up(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Up)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_up(), || format!("service '{service_name}' has containers pending rollback"))?;
        info!("{} runs up on service {service_name}", actor.username);
        self.lifecycle.up(&service).await
    }

    pub async fn service_stop(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Stop)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_stop(), || format!("service '{service_name}' has no running containers"))?;
        info!("{} stops service {service_name}", actor.username);
        self.lifecycle.stop(&service).await
    }

    pub async fn service_start(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Start)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_start(), || format!("service '{service_name}' can't be started"))?;
        info!("{} starts service {service_name}", actor.username);
        self.lifecycle.start(&service).await
    }

    pub async fn service_remove(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Remove)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_remove(), || format!("service '{service_name}' has no stopped containers"))?;
        info!("{} removes stopped containers of service {service_name}", actor.username);
        self.lifecycle.remove(&service).await
    }

    pub async fn service_restart(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Restart)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_restart(), || format!("service '{service_name}' can't be restarted"))?;
        info!("{} restarts service {service_name}", actor.username);
        self.lifecycle.restart(&service).await
    }

    pub async fn service_scale(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
        replicas: u32,
    ) -> Result<(), ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Scale)).await?;
        let _pass = self.exclusive()?;
        let service = self.service(project_name, service_name).await?;
        require(service.can_up(), || format!("service '{service_name}' has containers pending rollback"))?;
        info!("{} scales service {service_name} to {replicas}", actor.username);
        self.lifecycle.scale(&service, replicas).await
    }

    pub async fn service_update(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<Service, ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Update)).await?;
        let _pass = self.exclusive()?;
        let mut service = self.service(project_name, service_name).await?;
        require(service.can_update(), || format!("service '{service_name}' can't be updated"))?;
        info!("{} updates service {service_name}", actor.username);
        self.lifecycle.update(&mut service).await?;
        Ok(service)
    }

    pub async fn service_rollback(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
    ) -> Result<Service, ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Rollback)).await?;
        let _pass = self.exclusive()?;
        let mut service = self.service(project_name, service_name).await?;
        require(service.can_rollback(), || format!("service '{service_name}' has nothing to roll back"))?;
        info!("{} rolls back service {service_name}", actor.username);
        self.lifecycle.rollback(&mut service).await?;
        Ok(service)
    }

    pub async fn service_logs(
        &self,
        actor: &Actor,
        project_name: &ProjectName,
        service_name: &ServiceName,
        lines: usize,
    ) -> Result<Vec<String>, ControlError> {
        self.authorize(actor, Permission::service(service_name, ServiceAction::Logs)).await?;
        let service = self.service(project_name, service_name).await?;
        self.lifecycle.logs(&service, lines).await
    }

    /// Looks the container up and authorizes the action against the namespace owning it.
    async fn authorized_container(
        &self,
        actor: &Actor,
        container_id: &ContainerID,
        action: ContainerAction,
    ) -> Result<Container, ControlError> {
        let container = self.runtime.get_container(container_id).await?;
        let managed = self.config.project_name();
        let namespace = container_namespace(&container, managed);
        self.authorize(actor, Permission::container(namespace, action)).await?;
        Ok(container)
    }

    fn container_actions_enabled(&self, container: &Container) -> Result<(), ControlError> {
        let managed = container.project.is_some() && container.project.as_ref() == self.config.project_name();
        require(!(self.options.disable_service_container_actions && managed), || {
            format!(
                "container actions are disabled for service containers, use the service of '{}'",
                container.name
            )
        })
    }

    pub async fn container_stop(&self, actor: &Actor, container_id: &ContainerID) -> Result<Container, ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Stop).await?;
        self.container_actions_enabled(&container)?;
        let _pass = self.exclusive()?;
        let container = self.runtime.get_container(container_id).await?;
        require(container.can_be_stopped(), || format!("container '{}' is not running", container.name))?;
        info!("{} stops container {}", actor.username, container.name);
        self.runtime.stop_container(&container.id).await?;
        Ok(container)
    }

    pub async fn container_start(&self, actor: &Actor, container_id: &ContainerID) -> Result<Container, ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Start).await?;
        self.container_actions_enabled(&container)?;
        let _pass = self.exclusive()?;
        let container = self.runtime.get_container(container_id).await?;
        require(container.can_be_started(), || format!("container '{}' has not exited", container.name))?;
        info!("{} starts container {}", actor.username, container.name);
        self.runtime.start_container(&container.id).await?;
        Ok(container)
    }

    pub async fn container_restart(&self, actor: &Actor, container_id: &ContainerID) -> Result<Container, ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Restart).await?;
        self.container_actions_enabled(&container)?;
        let _pass = self.exclusive()?;
        let container = self.runtime.get_container(container_id).await?;
        require(container.can_be_restarted(), || format!("container '{}' is not running", container.name))?;
        info!("{} restarts container {}", actor.username, container.name);
        self.runtime.restart_container(&container.id).await?;
        Ok(container)
    }

    pub async fn container_remove(&self, actor: &Actor, container_id: &ContainerID) -> Result<Container, ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Remove).await?;
        self.container_actions_enabled(&container)?;
        let _pass = self.exclusive()?;
        let container = self.runtime.get_container(container_id).await?;
        require(container.can_be_removed(), || format!("container '{}' has not exited", container.name))?;
        info!("{} removes container {}", actor.username, container.name);
        self.runtime.remove_container(&container.id).await?;
        Ok(container)
    }

    pub async fn container_rename(
        &self,
        actor: &Actor,
        container_id: &ContainerID,
        new_name: &str,
    ) -> Result<Container, ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Rename).await?;
        self.container_actions_enabled(&container)?;
        let new_name = new_name.trim();
        require(!new_name.is_empty(), || "container name must not be empty".to_string())?;
        let _pass = self.exclusive()?;
        info!("{} renames container {} to {new_name}", actor.username, container.name);
        self.runtime.rename_container(&container.id, new_name).await?;
        self.runtime.get_container(&container.id).await
    }

    pub async fn container_logs(
        &self,
        actor: &Actor,
        container_id: &ContainerID,
        lines: usize,
    ) -> Result<(Container, Vec<String>), ControlError> {
        let container = self.authorized_container(actor, container_id, ContainerAction::Logs).await?;
        let raw = self.runtime.container_logs(&container.id, lines).await?;
        Ok((container, crate::domain::logs::format_log_lines(&raw)))
    }

    pub async fn clean_old_images(&self, actor: &Actor) -> Result<(), ControlError> {
        self.authorize(actor, Permission::system_commands()).await?;
        let _pass = self.exclusive()?;
        info!("{} removes dangling images", actor.username);
        self.runtime.remove_dangling_images().await
    }

    pub async fn prune(&self, actor: &Actor) -> Result<(), ControlError> {
        self.authorize(actor, Permission::system_commands()).await?;
        let _pass = self.exclusive()?;
        info!("{} prunes the docker system", actor.username);
        self.runtime.remove_dangling_images().await?;
        self.runtime.prune().await
    }

    pub async fn prune_all(&self, actor: &Actor) -> Result<(), ControlError> {
        self.authorize(actor, Permission::system_commands()).await?;
        let _pass = self.exclusive()?;
        info!("{} prunes everything unused", actor.username);
        self.runtime.remove_dangling_images().await?;
        self.runtime.prune().await?;
        self.runtime.prune_images_and_volumes().await
    }

    pub async fn compose_file(&self, actor: &Actor) -> Result<ComposeFile, ControlError> {
        self.authorize(actor, Permission::system_commands()).await?;
        let config = self.config.require_config().await?;
        Ok(ComposeFile {
            path: config.compose_file_path.clone(),
            project_name: config.project_name.clone(),
            file_content: self.config.file_content().await?,
        })
    }

    pub async fn update_compose_file(&self, actor: &Actor, file_content: &str) -> Result<(), ControlError> {
        self.authorize(actor, Permission::system_commands()).await?;
        let _pass = self.exclusive()?;
        info!("{} edits the compose file", actor.username);
        self.config.update_file_content(file_content).await
    }
}
