use crate::domain::models::names::{ImageName, ProjectName, ServiceName};
use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

#[derive(Deserialize)]
struct ComposeDocument {
    #[serde(default)]
    version: Option<YamlValue>,
    #[serde(default)]
    services: serde_yaml::Mapping,
}

#[derive(Deserialize, Default)]
struct ServiceDocument {
    image: Option<String>,
    container_name: Option<String>,
    restart: Option<String>,
    scale: Option<u32>,
    deploy: Option<DeployDocument>,
    #[serde(default)]
    ports: Vec<YamlValue>,
    #[serde(default)]
    volumes: Vec<YamlValue>,
    environment: Option<YamlValue>,
    depends_on: Option<YamlValue>,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Deserialize, Default)]
struct DeployDocument {
    replicas: Option<u32>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub service_name: ServiceName,
    pub image: Option<ImageName>,
    pub container_name: Option<String>,
    pub restart: Option<String>,
    pub scale: u32,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub depends_on: Vec<ServiceName>,
    pub links: Vec<String>,
    /// Fingerprint of the resolved service definition, as computed by the compose tool.
    pub hash: String,
}

impl ServiceConfig {
    pub fn merged_dependencies(&self) -> BTreeSet<ServiceName> {
        let linked = self
            .links
            .iter()
            .map(|link| ServiceName::new(link.split(':').next().unwrap_or(link)));
        self.depends_on.iter().cloned().chain(linked).collect()
    }

    pub fn image_display(&self, strip_registry: &str) -> String {
        self.image
            .as_ref()
            .map(|image| image.display(strip_registry))
            .unwrap_or_default()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    pub project_name: ProjectName,
    pub compose_file_path: PathBuf,
    pub version: Option<String>,
    pub service_configs: Vec<ServiceConfig>,
}

impl ProjectConfig {
    /// Builds the project from the output of `config` and the per-service hashes of `config --hash=*`.
    pub fn parse(
        project_name: ProjectName,
        compose_file_path: PathBuf,
        resolved: &str,
        hashes: &HashMap<ServiceName, String>,
    ) -> Result<Self, ControlError> {
        let document: ComposeDocument = serde_yaml::from_str(resolved)
            .map_err(|e| ControlError::ConfigInvalid(format!("error parsing compose file: {e}")))?;

        let mut service_configs = Vec::with_capacity(document.services.len());
        for (key, value) in document.services {
            let service_name = key
                .as_str()
                .map(ServiceName::new)
                .ok_or_else(|| ControlError::ConfigInvalid(format!("invalid service key {key:?}")))?;
            let service: ServiceDocument = if value.is_null() {
                ServiceDocument::default()
            } else {
                serde_yaml::from_value(value).map_err(|e| {
                    ControlError::ConfigInvalid(format!("service `{service_name}`: {e}"))
                })?
            };
            let hash = hashes.get(&service_name).cloned().ok_or_else(|| {
                ControlError::ConfigInvalid(format!("no config hash for service `{service_name}`"))
            })?;
            service_configs.push(ServiceConfig {
                image: service.image.map(ImageName::new),
                container_name: service.container_name,
                restart: service.restart,
                scale: service
                    .scale
                    .or(service.deploy.and_then(|deploy| deploy.replicas))
                    .unwrap_or(1),
                ports: service.ports.iter().map(yaml_to_string).collect(),
                volumes: service.volumes.iter().map(yaml_to_string).collect(),
                environment: environment(service.environment),
                depends_on: dependencies(service.depends_on),
                links: service.links,
                service_name,
                hash,
            });
        }

        Ok(Self {
            project_name,
            compose_file_path,
            version: document.version.as_ref().map(yaml_to_string),
            service_configs,
        })
    }

    pub fn service_config(&self, project_name: &ProjectName, service_name: &ServiceName) -> Option<&ServiceConfig> {
        if project_name != &self.project_name {
            return None;
        }
        self.service_configs
            .iter()
            .find(|config| &config.service_name == service_name)
    }
}

/// Parses `<service> <hash>` lines.
pub fn parse_service_hashes(output: &str) -> HashMap<ServiceName, String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(service, hash)| (ServiceName::new(service), hash.trim().to_string()))
        .collect()
}

fn yaml_to_string(value: &YamlValue) -> String {
    match value {
        YamlValue::String(s) => s.clone(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn environment(value: Option<YamlValue>) -> BTreeMap<String, String> {
    match value {
        Some(YamlValue::Mapping(map)) => map
            .iter()
            .map(|(key, value)| (yaml_to_string(key), yaml_to_string(value)))
            .collect(),
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .map(yaml_to_string)
            .map(|item| match item.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (item, String::new()),
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

// `depends_on` is either a list of names or a map of name to condition
fn dependencies(value: Option<YamlValue>) -> Vec<ServiceName> {
    match value {
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .map(|item| ServiceName::new(yaml_to_string(item)))
            .collect(),
        Some(YamlValue::Mapping(map)) => map
            .keys()
            .map(|key| ServiceName::new(yaml_to_string(key)))
            .collect(),
        _ => Vec::new(),
    }
}
