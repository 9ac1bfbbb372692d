use crate::domain::models::config::ProjectConfig;
use crate::domain::models::container::Container;
use crate::domain::models::names::ProjectName;
use crate::domain::models::permission::{
    ContainerAction, Namespace, Permission, PermissionEntry, ProjectAction, ServiceAction,
};
use crate::error::ControlError;
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Append-only set of known permissions, synchronized from the compose config on every reload.
#[derive(Clone, Default)]
pub struct PermissionRegistry {
    entries: Arc<RwLock<BTreeMap<Permission, String>>>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the permission unless present. Returns whether it was created.
    pub async fn ensure(&self, entry: PermissionEntry) -> bool {
        if self.entries.read().await.contains_key(&entry.permission) {
            return false;
        }
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.permission) {
            return false;
        }
        debug!("creating permission {}", entry.permission);
        entries.insert(entry.permission, entry.name);
        true
    }

    /// Ensures every permission derived from `config` exists. Entries of removed services stay.
    pub async fn sync(&self, config: &ProjectConfig) -> usize {
        let mut created = 0;
        for entry in required_permissions(config) {
            if self.ensure(entry).await {
                created += 1;
            }
        }
        if created > 0 {
            info!(
                "created {created} permissions for project {}",
                config.project_name
            );
        }
        created
    }

    pub async fn sync_static(&self) -> usize {
        let mut created = 0;
        for entry in static_permissions() {
            if self.ensure(entry).await {
                created += 1;
            }
        }
        created
    }

    pub async fn contains(&self, permission: &Permission) -> bool {
        self.entries.read().await.contains_key(permission)
    }

    pub async fn entries(&self) -> Vec<PermissionEntry> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(permission, name)| PermissionEntry {
                permission: permission.clone(),
                name: name.clone(),
            })
            .collect()
    }
}

fn container_entries(namespace: &Namespace) -> impl Iterator<Item = PermissionEntry> + '_ {
    ContainerAction::ALL.into_iter().map(move |action| PermissionEntry {
        permission: Permission::container(namespace.clone(), action),
        name: format!("Can {} container", action.codename().trim_start_matches("container_")),
    })
}

pub fn required_permissions(config: &ProjectConfig) -> Vec<PermissionEntry> {
    let mut entries: Vec<PermissionEntry> = ProjectAction::ALL
        .into_iter()
        .map(|action| PermissionEntry {
            permission: Permission::project(&config.project_name, action),
            name: format!("Can {} project", action.codename()),
        })
        .collect();

    for service in &config.service_configs {
        entries.extend(ServiceAction::ALL.into_iter().map(|action| PermissionEntry {
            permission: Permission::service(&service.service_name, action),
            name: match action {
                ServiceAction::Logs => "Can see service logs".to_string(),
                _ => format!("Can {} service", action.codename()),
            },
        }));
        entries.extend(container_entries(&Namespace::service(&service.service_name)));
    }

    entries.extend(static_permissions());
    entries
}

/// Permissions that exist whether or not a compose project is configured.
pub fn static_permissions() -> Vec<PermissionEntry> {
    let mut entries: Vec<PermissionEntry> = container_entries(&Namespace::other_projects())
        .chain(container_entries(&Namespace::other_containers()))
        .collect();
    entries.push(PermissionEntry {
        permission: Permission::system_commands(),
        name: "Can use docker system commands".to_string(),
    });
    entries
}

/// An authenticated principal and the permissions granted to it.
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
    pub superuser: bool,
    grants: HashSet<Permission>,
}

impl Actor {
    pub fn new(username: impl Into<String>, superuser: bool, grants: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            username: username.into(),
            superuser,
            grants: grants.into_iter().collect(),
        }
    }

    pub fn has_grant(&self, permission: &Permission) -> bool {
        self.grants.contains(permission)
    }
}

/// Decides allow or deny for an actor. Denials are `Forbidden`, never `NotFound`.
#[derive(Clone)]
pub struct Authorizer {
    registry: PermissionRegistry,
}

impl Authorizer {
    pub fn new(registry: PermissionRegistry) -> Self {
        Self { registry }
    }

    pub async fn is_allowed(&self, actor: &Actor, permission: &Permission) -> bool {
        if actor.superuser {
            return true;
        }
        actor.has_grant(permission) && self.registry.contains(permission).await
    }

    pub async fn authorize(&self, actor: &Actor, permission: &Permission) -> Result<(), ControlError> {
        if self.is_allowed(actor, permission).await {
            Ok(())
        } else {
            info!("denied {permission} to {}", actor.username);
            Err(ControlError::Forbidden)
        }
    }
}

/// Namespace guarding a container: its service if it belongs to the managed project,
/// `other_projects` for other compose projects and `other_containers` otherwise.
pub fn container_namespace(container: &Container, managed_project: Option<&ProjectName>) -> Namespace {
    match (&container.project, &container.service) {
        (Some(project), Some(service)) if Some(project) == managed_project => Namespace::service(service),
        (Some(_), _) => Namespace::other_projects(),
        (None, _) => Namespace::other_containers(),
    }
}
