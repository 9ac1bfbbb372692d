use crate::domain::models::names::{ImageName, ProjectName, ServiceName};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub type ContainerID = String;

/// Appended to a container name to mark it as the previous generation of its service.
pub const ROLLBACK_SUFFIX: &str = "_previous";

pub const PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
pub const CONFIG_HASH_LABEL: &str = "com.docker.compose.config-hash";

const SHORT_ID_LEN: usize = 12;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Restarting,
    Running,
    Removing,
    Paused,
    Exited,
    Dead,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Running => "running",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
        }
    }
}

impl Display for ContainerStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl Display for UnknownStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown container status `{}`", self.0)
    }
}

impl FromStr for ContainerStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(ContainerStatus::Created),
            "restarting" => Ok(ContainerStatus::Restarting),
            "running" => Ok(ContainerStatus::Running),
            "removing" => Ok(ContainerStatus::Removing),
            "paused" => Ok(ContainerStatus::Paused),
            "exited" => Ok(ContainerStatus::Exited),
            "dead" => Ok(ContainerStatus::Dead),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Which generation of its service a container belongs to, read from the name once.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Active,
    RollbackCandidate,
}

impl Generation {
    pub fn of(name: &str) -> Self {
        if name.ends_with(ROLLBACK_SUFFIX) {
            Generation::RollbackCandidate
        } else {
            Generation::Active
        }
    }
}

/// Snapshot of a container as reported by the runtime.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Container {
    pub name: String,
    pub short_id: String,
    pub id: ContainerID,
    pub tags: Option<Vec<String>>,
    pub status: ContainerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub service: Option<ServiceName>,
    pub project: Option<ProjectName>,
    pub config_hash: Option<String>,
    pub generation: Generation,
}

impl Container {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ContainerStatus) -> Self {
        let id = id.into();
        let name = name.into().trim_start_matches('/').to_string();
        Self {
            short_id: id.chars().take(SHORT_ID_LEN).collect(),
            generation: Generation::of(&name),
            name,
            id,
            tags: None,
            status,
            started_at: None,
            service: None,
            project: None,
            config_hash: None,
        }
    }

    pub fn with_labels(mut self, labels: &HashMap<String, String>) -> Self {
        self.project = labels.get(PROJECT_LABEL).map(ProjectName::new);
        self.service = labels.get(SERVICE_LABEL).map(ServiceName::new);
        self.config_hash = labels.get(CONFIG_HASH_LABEL).cloned();
        self
    }

    pub fn with_tags(mut self, tags: Option<Vec<String>>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_started_at(mut self, started_at: Option<DateTime<Utc>>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn is_rollback_candidate(&self) -> bool {
        self.generation == Generation::RollbackCandidate
    }

    /// Name the container carries while it is kept as rollback material.
    pub fn rollback_name(&self) -> String {
        format!("{}{}", self.name, ROLLBACK_SUFFIX)
    }

    /// Name the container had before it was marked for rollback.
    pub fn restored_name(&self) -> &str {
        self.name.strip_suffix(ROLLBACK_SUFFIX).unwrap_or(&self.name)
    }

    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    pub fn is_exited(&self) -> bool {
        self.status == ContainerStatus::Exited
    }

    pub fn can_be_stopped(&self) -> bool {
        self.is_running()
    }

    pub fn can_be_started(&self) -> bool {
        self.is_exited()
    }

    pub fn can_be_restarted(&self) -> bool {
        self.is_running()
    }

    pub fn can_be_removed(&self) -> bool {
        self.is_exited()
    }

    pub fn tags_display(&self, strip_registry: &str) -> String {
        match &self.tags {
            Some(tags) => tags
                .iter()
                .map(|tag| ImageName::new(tag.as_str()).display(strip_registry))
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// Docker reports `0001-01-01T00:00:00Z` for containers that never started.
pub fn parse_started_at(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?.with_timezone(&Utc);
    (parsed.year() > 1).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_read_from_name() {
        let active = Container::new("a".repeat(64), "/web-1", ContainerStatus::Running);
        assert_eq!(active.name, "web-1");
        assert_eq!(active.short_id.len(), 12);
        assert!(!active.is_rollback_candidate());

        let previous = Container::new("b", "web-1_previous", ContainerStatus::Exited);
        assert!(previous.is_rollback_candidate());
        assert_eq!(previous.restored_name(), "web-1");
    }

    #[test]
    fn test_rollback_name_round_trip() {
        let container = Container::new("c", "app_previous_db-1", ContainerStatus::Running);
        // the suffix only counts at the end of the name
        assert!(!container.is_rollback_candidate());
        assert_eq!(container.rollback_name(), "app_previous_db-1_previous");
    }

    #[test]
    fn test_labels() {
        let labels = HashMap::from([
            (PROJECT_LABEL.to_string(), "shop".to_string()),
            (SERVICE_LABEL.to_string(), "web".to_string()),
            (CONFIG_HASH_LABEL.to_string(), "abc".to_string()),
        ]);
        let container = Container::new("c", "shop-web-1", ContainerStatus::Created).with_labels(&labels);
        assert_eq!(container.project, Some(ProjectName::new("shop")));
        assert_eq!(container.service, Some(ServiceName::new("web")));
        assert_eq!(container.config_hash.as_deref(), Some("abc"));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("running".parse::<ContainerStatus>(), Ok(ContainerStatus::Running));
        assert_eq!("Exited".parse::<ContainerStatus>(), Ok(ContainerStatus::Exited));
        assert!("sleeping".parse::<ContainerStatus>().is_err());
    }

    #[test]
    fn test_container_predicates() {
        let running = Container::new("r", "r", ContainerStatus::Running);
        assert!(running.can_be_stopped() && running.can_be_restarted());
        assert!(!running.can_be_started() && !running.can_be_removed());
        let exited = Container::new("e", "e", ContainerStatus::Exited);
        assert!(exited.can_be_started() && exited.can_be_removed());
        assert!(!exited.can_be_stopped());
    }

    #[test]
    fn test_started_at() {
        assert_eq!(parse_started_at("0001-01-01T00:00:00Z"), None);
        assert_eq!(parse_started_at(""), None);
        let started = parse_started_at("2024-03-01T10:20:30.123456789Z").unwrap();
        assert_eq!(started.timestamp(), 1709288430);
    }

    #[test]
    fn test_tags_display() {
        let container = Container::new("t", "t", ContainerStatus::Running).with_tags(Some(vec![
            "registry.local/app:1".to_string(),
            "registry.local/app:latest".to_string(),
        ]));
        assert_eq!(container.tags_display("registry.local/"), "app:1\napp:latest");
        let untagged = Container::new("u", "u", ContainerStatus::Running);
        assert_eq!(untagged.tags_display(""), "");
    }
}
