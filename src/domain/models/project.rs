use crate::domain::models::config::ProjectConfig;
use crate::domain::models::container::Container;
use crate::domain::models::names::ProjectName;
use crate::domain::models::service::Service;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct Project {
    pub project_name: ProjectName,
    pub config: Option<ProjectConfig>,
    pub services: Vec<Service>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectCapabilities {
    pub can_up: bool,
    pub can_down: bool,
    pub can_remove: bool,
    pub can_restart: bool,
}

impl Project {
    pub fn new(project_name: ProjectName, config: Option<ProjectConfig>) -> Self {
        Self {
            project_name,
            config,
            services: Vec::new(),
        }
    }

    pub fn running_containers(&self) -> impl Iterator<Item = &Container> {
        self.services.iter().flat_map(|service| service.running_containers())
    }

    pub fn stopped_containers(&self) -> impl Iterator<Item = &Container> {
        self.services.iter().flat_map(|service| service.stopped_containers())
    }

    pub fn rollback_containers(&self) -> impl Iterator<Item = &Container> {
        self.services.iter().flat_map(|service| service.rollback_containers())
    }

    pub fn can_up(&self) -> bool {
        self.rollback_containers().next().is_none()
    }

    pub fn can_down(&self) -> bool {
        true
    }

    pub fn can_remove(&self) -> bool {
        self.rollback_containers().next().is_none() && self.stopped_containers().next().is_some()
    }

    pub fn can_restart(&self) -> bool {
        self.rollback_containers().next().is_none()
            && (self.stopped_containers().next().is_some() || self.running_containers().next().is_some())
    }

    pub fn capabilities(&self) -> ProjectCapabilities {
        ProjectCapabilities {
            can_up: self.can_up(),
            can_down: self.can_down(),
            can_remove: self.can_remove(),
            can_restart: self.can_restart(),
        }
    }
}

/// Groups containers into projects and services by their compose labels.
///
/// When a config is given, its project comes first and lists every declared service in
/// declaration order, even those without containers. Containers lacking either label are skipped.
pub fn group_projects(containers: Vec<Container>, config: Option<&ProjectConfig>) -> Vec<Project> {
    let mut projects: Vec<Project> = Vec::new();
    if let Some(config) = config {
        let mut project = Project::new(config.project_name.clone(), Some(config.clone()));
        for service_config in &config.service_configs {
            project.services.push(Service::new(
                config.project_name.clone(),
                service_config.service_name.clone(),
                Some(service_config.clone()),
                Vec::new(),
            ));
        }
        projects.push(project);
    }

    for container in containers {
        let (Some(project_name), Some(service_name)) = (container.project.clone(), container.service.clone())
        else {
            continue;
        };
        let project_index = match projects.iter().position(|p| p.project_name == project_name) {
            Some(index) => index,
            None => {
                projects.push(Project::new(project_name.clone(), None));
                projects.len() - 1
            }
        };
        let project = &mut projects[project_index];
        match project.services.iter_mut().find(|s| s.service_name == service_name) {
            Some(service) => service.containers.push(container),
            None => project.services.push(Service::new(
                project_name,
                service_name,
                None,
                vec![container],
            )),
        }
    }
    projects
}
