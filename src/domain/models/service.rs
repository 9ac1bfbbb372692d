use crate::domain::models::config::ServiceConfig;
use crate::domain::models::container::Container;
use crate::domain::models::names::{ProjectName, ServiceName};
use serde::Serialize;

/// A compose service joined with the containers the runtime currently reports for it.
#[derive(Debug, Clone)]
pub struct Service {
    pub service_name: ServiceName,
    pub project_name: ProjectName,
    pub config: Option<ServiceConfig>,
    pub containers: Vec<Container>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceCapabilities {
    pub can_up: bool,
    pub can_start: bool,
    pub can_stop: bool,
    pub can_restart: bool,
    pub can_remove: bool,
    pub can_update: bool,
    pub can_rollback: bool,
}

impl Service {
    pub fn new(
        project_name: ProjectName,
        service_name: ServiceName,
        config: Option<ServiceConfig>,
        containers: Vec<Container>,
    ) -> Self {
        Self {
            service_name,
            project_name,
            config,
            containers,
        }
    }

    pub fn running_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().filter(|c| c.is_running())
    }

    pub fn stopped_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().filter(|c| c.is_exited())
    }

    pub fn rollback_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter().filter(|c| c.is_rollback_candidate())
    }

    /// Containers started from a configuration other than the declared one.
    pub fn out_of_sync_containers(&self) -> impl Iterator<Item = &Container> {
        let hash = self.config.as_ref().map(|config| config.hash.as_str());
        self.containers.iter().filter(move |c| match hash {
            Some(hash) => !c.is_rollback_candidate() && c.config_hash.as_deref() != Some(hash),
            None => false,
        })
    }

    fn has_rollback_containers(&self) -> bool {
        self.rollback_containers().next().is_some()
    }

    pub fn can_up(&self) -> bool {
        !self.has_rollback_containers()
    }

    pub fn can_start(&self) -> bool {
        !self.has_rollback_containers() && self.stopped_containers().next().is_some()
    }

    pub fn can_stop(&self) -> bool {
        self.running_containers().next().is_some()
    }

    pub fn can_restart(&self) -> bool {
        !self.has_rollback_containers() && !self.containers.is_empty()
    }

    pub fn can_remove(&self) -> bool {
        self.stopped_containers().next().is_some()
    }

    /// Published ports can't be bound twice, so services declaring ports are never updated in place.
    pub fn can_update(&self) -> bool {
        match &self.config {
            Some(config) => config.ports.is_empty() && self.out_of_sync_containers().next().is_some(),
            None => false,
        }
    }

    pub fn can_rollback(&self) -> bool {
        self.has_rollback_containers()
    }

    pub fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities {
            can_up: self.can_up(),
            can_start: self.can_start(),
            can_stop: self.can_stop(),
            can_restart: self.can_restart(),
            can_remove: self.can_remove(),
            can_update: self.can_update(),
            can_rollback: self.can_rollback(),
        }
    }
}
