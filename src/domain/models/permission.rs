use crate::domain::models::names::{ProjectName, ServiceName};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const OTHER_PROJECTS: &str = "other_projects";
pub const OTHER_CONTAINERS: &str = "other_containers";
pub const DOCKER_SYSTEM: &str = "docker_system";
pub const SYSTEM_COMMANDS: &str = "system_commands";

/// Grouping key under which action permissions are registered.
#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Namespace(pub String);

impl Namespace {
    pub fn project(project_name: &ProjectName) -> Self {
        Self(project_name.as_str().to_string())
    }

    pub fn service(service_name: &ServiceName) -> Self {
        Self(service_name.as_str().to_string())
    }

    pub fn other_projects() -> Self {
        Self(OTHER_PROJECTS.to_string())
    }

    pub fn other_containers() -> Self {
        Self(OTHER_CONTAINERS.to_string())
    }

    pub fn system() -> Self {
        Self(DOCKER_SYSTEM.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectAction {
    Up,
    Down,
    Remove,
    Restart,
}

impl ProjectAction {
    pub const ALL: [ProjectAction; 4] = [
        ProjectAction::Up,
        ProjectAction::Down,
        ProjectAction::Remove,
        ProjectAction::Restart,
    ];

    pub fn codename(&self) -> &'static str {
        match self {
            ProjectAction::Up => "up",
            ProjectAction::Down => "down",
            ProjectAction::Remove => "remove",
            ProjectAction::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    View,
    Up,
    Stop,
    Start,
    Remove,
    Restart,
    Scale,
    Update,
    Rollback,
    Logs,
}

impl ServiceAction {
    pub const ALL: [ServiceAction; 10] = [
        ServiceAction::View,
        ServiceAction::Up,
        ServiceAction::Stop,
        ServiceAction::Start,
        ServiceAction::Remove,
        ServiceAction::Restart,
        ServiceAction::Scale,
        ServiceAction::Update,
        ServiceAction::Rollback,
        ServiceAction::Logs,
    ];

    pub fn codename(&self) -> &'static str {
        match self {
            ServiceAction::View => "view",
            ServiceAction::Up => "up",
            ServiceAction::Stop => "stop",
            ServiceAction::Start => "start",
            ServiceAction::Remove => "remove",
            ServiceAction::Restart => "restart",
            ServiceAction::Scale => "scale",
            ServiceAction::Update => "update",
            ServiceAction::Rollback => "rollback",
            ServiceAction::Logs => "logs",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Stop,
    Start,
    Remove,
    Restart,
    Rename,
    Logs,
}

impl ContainerAction {
    pub const ALL: [ContainerAction; 6] = [
        ContainerAction::Stop,
        ContainerAction::Start,
        ContainerAction::Remove,
        ContainerAction::Restart,
        ContainerAction::Rename,
        ContainerAction::Logs,
    ];

    fn verb(&self) -> &'static str {
        match self {
            ContainerAction::Stop => "stop",
            ContainerAction::Start => "start",
            ContainerAction::Remove => "remove",
            ContainerAction::Restart => "restart",
            ContainerAction::Rename => "rename",
            ContainerAction::Logs => "logs",
        }
    }

    // prefixed so they share a service namespace with the service actions
    pub fn codename(&self) -> String {
        format!("container_{}", self.verb())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Permission {
    pub namespace: Namespace,
    pub codename: String,
}

impl Permission {
    pub fn new(namespace: Namespace, codename: impl Into<String>) -> Self {
        Self {
            namespace,
            codename: codename.into(),
        }
    }

    pub fn project(project_name: &ProjectName, action: ProjectAction) -> Self {
        Self::new(Namespace::project(project_name), action.codename())
    }

    pub fn service(service_name: &ServiceName, action: ServiceAction) -> Self {
        Self::new(Namespace::service(service_name), action.codename())
    }

    pub fn container(namespace: Namespace, action: ContainerAction) -> Self {
        Self::new(namespace, action.codename())
    }

    pub fn system_commands() -> Self {
        Self::new(Namespace::system(), SYSTEM_COMMANDS)
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace.as_str(), self.codename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPermission(pub String);

impl Display for InvalidPermission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "permission `{}` is not of the form namespace.codename", self.0)
    }
}

impl FromStr for Permission {
    type Err = InvalidPermission;

    // codenames never contain a dot, service names may
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((namespace, codename)) if !namespace.is_empty() && !codename.is_empty() => {
                Ok(Permission::new(Namespace(namespace.to_string()), codename))
            }
            _ => Err(InvalidPermission(s.to_string())),
        }
    }
}

/// A registered permission with its human readable label.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PermissionEntry {
    pub permission: Permission,
    pub name: String,
}
