use crate::domain::models::container::{
    Container, ContainerID, ContainerStatus, PROJECT_LABEL, SERVICE_LABEL, UnknownStatus,
    parse_started_at,
};
use crate::domain::ports::{ContainerFilter, ContainerRuntime};
use crate::error::ControlError;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, ContainerState};
use bollard::query_parameters::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, PruneContainersOptions,
    PruneImagesOptions, PruneNetworksOptions, PruneVolumesOptions, RemoveContainerOptions,
    RenameContainerOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use futures_util::TryStreamExt;
use futures_util::future::join_all;
use log::{debug, error, info, warn};
use std::collections::HashMap;

const STOP_TIMEOUT_SECONDS: i32 = 30;

impl From<BollardError> for ControlError {
    fn from(e: BollardError) -> Self {
        match e {
            BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            } => ControlError::NotFound(message),
            other => ControlError::Runtime(other.to_string()),
        }
    }
}

fn label_filters(filter: &ContainerFilter) -> Option<HashMap<String, Vec<String>>> {
    let labels = match filter {
        ContainerFilter::All => return None,
        ContainerFilter::AnyProject => vec![PROJECT_LABEL.to_string()],
        ContainerFilter::Project(project_name) => vec![format!("{PROJECT_LABEL}={project_name}")],
        ContainerFilter::Service(project_name, service_name) => vec![
            format!("{PROJECT_LABEL}={project_name}"),
            format!("{SERVICE_LABEL}={service_name}"),
        ],
    };
    Some(HashMap::from([("label".to_string(), labels)]))
}

fn container_status(state: &ContainerState) -> Result<ContainerStatus, UnknownStatus> {
    state
        .status
        .as_ref()
        .map(|status| status.to_string())
        .unwrap_or_default()
        .parse()
}

fn dangling(value: bool) -> Option<HashMap<String, Vec<String>>> {
    Some(HashMap::from([(
        "dangling".to_string(),
        vec![value.to_string()],
    )]))
}

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new() -> Result<Self, ControlError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn image_tags(&self, image_id: &str) -> Option<Vec<String>> {
        match self.docker.inspect_image(image_id).await {
            Ok(image) => image.repo_tags,
            Err(e) => {
                debug!("no tags for image {image_id}: {e}");
                None
            }
        }
    }

    async fn to_container(&self, details: ContainerInspectResponse) -> Result<Container, UnknownStatus> {
        let id = details.id.unwrap_or_default();
        let state = details.state.unwrap_or_default();
        let status = container_status(&state)?;
        let labels = details
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();
        let tags = match &details.image {
            Some(image_id) => self.image_tags(image_id).await,
            None => None,
        };

        Ok(Container::new(id, details.name.unwrap_or_default(), status)
            .with_labels(&labels)
            .with_tags(tags)
            .with_started_at(state.started_at.as_deref().and_then(parse_started_at)))
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerInspectResponse, ControlError> {
        self.docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .inspect_err(|x| debug!("Error inspecting container {container_id}: {x:?}"))
            .map_err(ControlError::from)
    }

    /// Containers the runtime reports in a state we cannot read are left out of listings.
    async fn listed_container(&self, container_id: String) -> Result<Option<Container>, ControlError> {
        let details = self.inspect(&container_id).await?;
        match self.to_container(details).await {
            Ok(container) => Ok(Some(container)),
            Err(e) => {
                warn!("skipping container {container_id}: {e}");
                Ok(None)
            }
        }
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, filter: ContainerFilter) -> Result<Vec<Container>, ControlError> {
        let options = ListContainersOptions {
            all: true,
            filters: label_filters(&filter),
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        debug!("found {} containers for {filter:?}", summaries.len());

        let lookups = summaries
            .into_iter()
            .filter_map(|summary| summary.id)
            .map(|id| self.listed_container(id));

        let mut containers = Vec::new();
        for result in join_all(lookups).await {
            match result {
                Ok(Some(container)) => containers.push(container),
                // removed between listing and inspection
                Ok(None) | Err(ControlError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn get_container(&self, container_id: &ContainerID) -> Result<Container, ControlError> {
        let details = self.inspect(container_id).await?;
        self.to_container(details)
            .await
            .map_err(|e| ControlError::Runtime(format!("container {container_id}: {e}")))
    }

    async fn stop_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        let options = StopContainerOptionsBuilder::new().t(STOP_TIMEOUT_SECONDS).build();
        self.docker.stop_container(container_id, Some(options)).await?;
        debug!("container {container_id} stopped");
        Ok(())
    }

    async fn start_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions>)
            .await?;
        debug!("container {container_id} started");
        Ok(())
    }

    async fn restart_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.docker
            .restart_container(container_id, None::<RestartContainerOptions>)
            .await?;
        debug!("container {container_id} restarted");
        Ok(())
    }

    async fn remove_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
        debug!("container {container_id} removed");
        Ok(())
    }

    async fn rename_container(&self, container_id: &ContainerID, new_name: &str) -> Result<(), ControlError> {
        let rename_options = RenameContainerOptions {
            name: new_name.to_string(),
        };
        self.docker
            .rename_container(container_id, rename_options)
            .await?;
        debug!("container {container_id} renamed to {new_name}");
        Ok(())
    }

    async fn container_logs(&self, container_id: &ContainerID, lines: usize) -> Result<String, ControlError> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: lines.to_string(),
            ..Default::default()
        };
        let chunks: Vec<_> = self
            .docker
            .logs(container_id, Some(options))
            .try_collect()
            .await
            .inspect_err(|e| error!("Error reading logs of {container_id}: {e:?}"))?;
        Ok(chunks.iter().map(|chunk| chunk.to_string()).collect())
    }

    async fn remove_dangling_images(&self) -> Result<(), ControlError> {
        let report = self
            .docker
            .prune_images(Some(PruneImagesOptions {
                filters: dangling(true),
                ..Default::default()
            }))
            .await?;
        info!(
            "removed {} dangling images",
            report.images_deleted.map(|deleted| deleted.len()).unwrap_or(0)
        );
        Ok(())
    }

    async fn prune(&self) -> Result<(), ControlError> {
        let containers = self
            .docker
            .prune_containers(None::<PruneContainersOptions>)
            .await?;
        let networks = self.docker.prune_networks(None::<PruneNetworksOptions>).await?;
        info!(
            "pruned {} containers and {} networks",
            containers.containers_deleted.map(|deleted| deleted.len()).unwrap_or(0),
            networks.networks_deleted.map(|deleted| deleted.len()).unwrap_or(0)
        );
        Ok(())
    }

    async fn prune_images_and_volumes(&self) -> Result<(), ControlError> {
        let images = self
            .docker
            .prune_images(Some(PruneImagesOptions {
                filters: dangling(false),
                ..Default::default()
            }))
            .await?;
        let volumes = self.docker.prune_volumes(None::<PruneVolumesOptions>).await?;
        info!(
            "pruned {} images and {} volumes",
            images.images_deleted.map(|deleted| deleted.len()).unwrap_or(0),
            volumes.volumes_deleted.map(|deleted| deleted.len()).unwrap_or(0)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::names::{ProjectName, ServiceName};

    #[test]
    fn test_label_filters() {
        assert_eq!(label_filters(&ContainerFilter::All), None);
        let filters = label_filters(&ContainerFilter::Service(
            ProjectName::new("shop"),
            ServiceName::new("web"),
        ))
        .unwrap();
        assert_eq!(
            filters["label"],
            vec![
                "com.docker.compose.project=shop".to_string(),
                "com.docker.compose.service=web".to_string(),
            ]
        );
        assert_eq!(
            label_filters(&ContainerFilter::AnyProject).unwrap()["label"],
            vec!["com.docker.compose.project".to_string()]
        );
    }

    #[test]
    fn test_container_status() {
        let running = ContainerState {
            status: Some(bollard::models::ContainerStateStatusEnum::RUNNING),
            ..Default::default()
        };
        assert_eq!(container_status(&running), Ok(ContainerStatus::Running));

        let empty = ContainerState {
            status: Some(bollard::models::ContainerStateStatusEnum::EMPTY),
            ..Default::default()
        };
        assert!(container_status(&empty).is_err());
        assert!(container_status(&ContainerState::default()).is_err());
    }

    #[test]
    fn test_not_found_mapping() {
        let error: ControlError = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_string(),
        }
        .into();
        assert!(matches!(error, ControlError::NotFound(message) if message.contains("abc")));

        let error: ControlError = BollardError::DockerResponseServerError {
            status_code: 500,
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(error, ControlError::Runtime(_)));
    }
}
