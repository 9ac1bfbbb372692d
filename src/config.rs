use crate::domain::models::names::ProjectName;
use crate::domain::models::permission::Permission;
use crate::domain::permissions::Actor;
use crate::domain::service::ControlOptions;
use crate::error::ControlError;
use figment2::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "compose-control.toml";

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserConfig {
    pub token: String,
    #[serde(default)]
    pub superuser: bool,
    /// `namespace.codename` strings, e.g. `web.update`.
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub compose_file: Option<PathBuf>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default = "default_compose_command")]
    pub compose_command: Vec<String>,
    #[serde(default)]
    pub compatibility_mode: bool,
    #[serde(default)]
    pub windows_host: bool,
    #[serde(default)]
    pub post_update_command: Vec<String>,
    #[serde(default)]
    pub strip_custom_registry: String,
    #[serde(default)]
    pub disable_service_container_actions: bool,
    #[serde(default)]
    pub users: BTreeMap<String, UserConfig>,
}

fn default_port() -> u16 {
    3033
}

fn default_compose_command() -> Vec<String> {
    vec!["docker".to_string(), "compose".to_string()]
}

impl Config {
    /// Explicit project name, else the lowercased name of the directory holding the compose file.
    pub fn project_name(&self) -> Option<ProjectName> {
        if let Some(name) = &self.project_name {
            return Some(ProjectName::new(name.as_str()));
        }
        let compose_file = self.compose_file.as_ref()?;
        let directory = match compose_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir().ok()?,
        };
        let name = directory.file_name()?.to_string_lossy().to_lowercase();
        Some(ProjectName::new(name))
    }

    pub fn control_options(&self) -> ControlOptions {
        ControlOptions {
            compose_file: self.compose_file.clone(),
            project_name: self.project_name(),
            post_update_command: self.post_update_command.clone(),
            strip_custom_registry: self.strip_custom_registry.clone(),
            disable_service_container_actions: self.disable_service_container_actions,
        }
    }

    /// Actors keyed by their bearer token.
    pub fn actors(&self) -> Result<HashMap<String, Actor>, ControlError> {
        let mut actors = HashMap::with_capacity(self.users.len());
        for (username, user) in &self.users {
            let grants = user
                .permissions
                .iter()
                .map(|raw| {
                    raw.parse::<Permission>().map_err(|e| {
                        ControlError::ConfigInvalid(format!("user {username}: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            if actors
                .insert(user.token.clone(), Actor::new(username.as_str(), user.superuser, grants))
                .is_some()
            {
                return Err(ControlError::ConfigInvalid(format!(
                    "user {username} shares its token with another user"
                )));
            }
        }
        Ok(actors)
    }
}

pub fn load_config(config_path: &Path) -> Result<Config, figment2::Error> {
    Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("COMPOSE_CONTROL_").split("__"))
        .extract()
}
