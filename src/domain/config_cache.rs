use crate::domain::models::config::{ProjectConfig, parse_service_hashes};
use crate::domain::models::names::ProjectName;
use crate::domain::permissions::PermissionRegistry;
use crate::domain::ports::ComposeExecutor;
use crate::error::ControlError;
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;

struct CachedConfig {
    modified: SystemTime,
    config: Arc<ProjectConfig>,
}

/// Parsed compose configuration, reloaded whenever the file's modification time advances.
///
/// Reloads are not serialized: two callers may both see a stale entry and both reload.
/// Both produce the same config, the last write wins.
pub struct ConfigCache<E: ComposeExecutor> {
    compose_file: Option<PathBuf>,
    project_name: Option<ProjectName>,
    executor: Arc<E>,
    registry: PermissionRegistry,
    slot: RwLock<Option<CachedConfig>>,
}

impl<E: ComposeExecutor> ConfigCache<E> {
    pub fn new(
        compose_file: Option<PathBuf>,
        project_name: Option<ProjectName>,
        executor: Arc<E>,
        registry: PermissionRegistry,
    ) -> Self {
        Self {
            compose_file,
            project_name,
            executor,
            registry,
            slot: RwLock::new(None),
        }
    }

    pub fn project_name(&self) -> Option<&ProjectName> {
        self.project_name.as_ref()
    }

    fn target(&self) -> Result<(&Path, &ProjectName), ControlError> {
        match (&self.compose_file, &self.project_name) {
            (Some(path), Some(project_name)) => Ok((path, project_name)),
            _ => Err(ControlError::ConfigUnavailable(
                "no compose file configured".to_string(),
            )),
        }
    }

    /// `None` when no compose file is configured.
    pub async fn get_config(&self) -> Result<Option<Arc<ProjectConfig>>, ControlError> {
        if self.compose_file.is_none() {
            return Ok(None);
        }
        let (path, project_name) = self.target()?;
        let modified = modification_time(path).await?;

        if let Some(cached) = self.slot.read().await.as_ref()
            && modified <= cached.modified
        {
            return Ok(Some(cached.config.clone()));
        }

        debug!("loading compose file at {}", path.display());
        let config = Arc::new(self.load(path, project_name).await.map_err(|e| {
            error!("error loading compose file {}: {e}", path.display());
            match e {
                ControlError::CommandFailed { output, .. } => ControlError::ConfigUnavailable(output),
                ControlError::ConfigInvalid(reason) => ControlError::ConfigUnavailable(reason),
                other => other,
            }
        })?);
        self.registry.sync(&config).await;
        *self.slot.write().await = Some(CachedConfig {
            modified,
            config: config.clone(),
        });
        info!(
            "loaded compose project {} with {} services",
            config.project_name,
            config.service_configs.len()
        );
        Ok(Some(config))
    }

    /// Like [`Self::get_config`], but an unconfigured compose file is an error.
    pub async fn require_config(&self) -> Result<Arc<ProjectConfig>, ControlError> {
        self.get_config().await?.ok_or_else(|| {
            ControlError::ConfigUnavailable("no compose file configured".to_string())
        })
    }

    async fn load(&self, path: &Path, project_name: &ProjectName) -> Result<ProjectConfig, ControlError> {
        let resolved = self.resolve().await?;
        let hashes = self
            .executor
            .execute(project_name, &["config".to_string(), "--hash=*".to_string()])
            .await?;
        ProjectConfig::parse(
            project_name.clone(),
            path.to_path_buf(),
            &resolved,
            &parse_service_hashes(&hashes.stdout),
        )
    }

    /// Validates the compose file and returns it with variables interpolated and extends merged.
    pub async fn resolve(&self) -> Result<String, ControlError> {
        let (_, project_name) = self.target()?;
        let output = self
            .executor
            .execute(project_name, &["config".to_string()])
            .await?;
        Ok(output.stdout)
    }

    pub async fn file_content(&self) -> Result<String, ControlError> {
        let (path, _) = self.target()?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    /// Replaces the compose file. Content that fails to resolve is reverted before returning.
    pub async fn update_file_content(&self, content: &str) -> Result<(), ControlError> {
        let (path, _) = self.target()?;
        if content.trim().is_empty() {
            return Err(ControlError::ConfigInvalid("compose file content is empty".to_string()));
        }
        let original = tokio::fs::read(path).await?;
        let content = content.replace("\r\n", "\n");

        let result = async {
            tokio::fs::write(path, content.as_bytes()).await?;
            self.resolve().await
        }
        .await;

        match result {
            Ok(_) => {
                info!("compose file {} updated", path.display());
                Ok(())
            }
            Err(e) => {
                warn!("restoring compose file {} after failed edit: {e}", path.display());
                tokio::fs::write(path, &original).await?;
                Err(match e {
                    ControlError::CommandFailed { output, .. } => ControlError::ConfigInvalid(output),
                    other => other,
                })
            }
        }
    }
}

async fn modification_time(path: &Path) -> Result<SystemTime, ControlError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.modified()?),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let message = format!("docker-compose file [{}] not found", path.display());
            error!("{message}");
            Err(ControlError::ConfigUnavailable(message))
        }
        Err(e) => Err(e.into()),
    }
}
