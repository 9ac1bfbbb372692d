use axum::response::IntoResponse;
use axum::{
    Extension, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::logs::DEFAULT_LOG_LINES;
use crate::domain::models::container::{Container, ContainerStatus, Generation};
use crate::domain::models::names::{ProjectName, ServiceName};
use crate::domain::models::permission::PermissionEntry;
use crate::domain::models::project::{Project, ProjectCapabilities};
use crate::domain::models::service::{Service, ServiceCapabilities};
use crate::domain::permissions::Actor;
use crate::domain::ports::{ComposeExecutor, ContainerRuntime};
use crate::domain::service::ControlCenter;
use crate::error::ControlError;

pub struct AppState<E: ComposeExecutor, R: ContainerRuntime> {
    pub control: Arc<ControlCenter<E, R>>,
    /// Actors keyed by bearer token.
    pub actors: Arc<HashMap<String, Actor>>,
}

impl<E: ComposeExecutor, R: ContainerRuntime> Clone for AppState<E, R> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
            actors: self.actors.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ControlError>;

fn done(message: String) -> ApiResult<String> {
    Ok(Json(ApiResponse::success(message)))
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Forbidden => StatusCode::FORBIDDEN,
            ControlError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ControlError::InvalidState(_) => StatusCode::CONFLICT,
            ControlError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
            ControlError::SystemBusy | ControlError::ConfigUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::CommandFailed { .. } | ControlError::Runtime(_) | ControlError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("request failed: {self}");
            "operation failed".to_string()
        } else {
            debug!("request rejected with {status}: {self}");
            self.to_string()
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContainerView {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub image: String,
    pub project: Option<ProjectName>,
    pub service: Option<ServiceName>,
    pub generation: Generation,
    pub can_stop: bool,
    pub can_start: bool,
    pub can_restart: bool,
    pub can_remove: bool,
}

impl ContainerView {
    fn new(container: &Container, strip_registry: &str) -> Self {
        Self {
            id: container.id.clone(),
            short_id: container.short_id.clone(),
            name: container.name.clone(),
            status: container.status,
            started_at: container.started_at,
            image: container.tags_display(strip_registry),
            project: container.project.clone(),
            service: container.service.clone(),
            generation: container.generation,
            can_stop: container.can_be_stopped(),
            can_start: container.can_be_started(),
            can_restart: container.can_be_restarted(),
            can_remove: container.can_be_removed(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ServiceView {
    pub service_name: ServiceName,
    pub project_name: ProjectName,
    pub image: String,
    pub scale: Option<u32>,
    pub depends_on: Vec<ServiceName>,
    #[serde(flatten)]
    pub capabilities: ServiceCapabilities,
    pub containers: Vec<ContainerView>,
}

impl ServiceView {
    fn new(service: &Service, strip_registry: &str) -> Self {
        let config = service.config.as_ref();
        Self {
            service_name: service.service_name.clone(),
            project_name: service.project_name.clone(),
            image: config
                .map(|config| config.image_display(strip_registry))
                .unwrap_or_default(),
            scale: config.map(|config| config.scale),
            depends_on: config
                .map(|config| config.merged_dependencies().into_iter().collect())
                .unwrap_or_default(),
            capabilities: service.capabilities(),
            containers: service
                .containers
                .iter()
                .map(|container| ContainerView::new(container, strip_registry))
                .collect(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProjectView {
    pub project_name: ProjectName,
    #[serde(flatten)]
    pub capabilities: ProjectCapabilities,
    pub services: Vec<ServiceView>,
}

impl ProjectView {
    fn new(project: &Project, strip_registry: &str) -> Self {
        Self {
            project_name: project.project_name.clone(),
            capabilities: project.capabilities(),
            services: project
                .services
                .iter()
                .map(|service| ServiceView::new(service, strip_registry))
                .collect(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ComposeConfigView {
    pub compose_file_path: PathBuf,
    pub project_name: ProjectName,
    pub version: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ComposeFileView {
    pub path: PathBuf,
    pub project_name: ProjectName,
    pub file_content: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ComposeFileUpdate {
    pub file_content: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ScaleRequest {
    pub replicas: u32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

impl LogsQuery {
    fn lines(&self) -> usize {
        self.lines.unwrap_or(DEFAULT_LOG_LINES)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LogsView {
    pub name: String,
    pub lines: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SystemStatus {
    pub busy: bool,
}

// Authentication middleware
async fn auth_middleware<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ControlError> {
    // Skip auth for health check
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    };
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let actor = match token.and_then(|token| state.actors.get(token)) {
        Some(actor) => actor.clone(),
        None => return Err(ControlError::Unauthenticated),
    };
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}

// Web handlers
async fn health() -> &'static str {
    "OK"
}

async fn get_compose_config<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
) -> ApiResult<ComposeConfigView> {
    let config = state
        .control
        .config()
        .await?
        .ok_or_else(|| ControlError::ConfigUnavailable("no compose file configured".to_string()))?;
    Ok(Json(ApiResponse::success(ComposeConfigView {
        compose_file_path: config.compose_file_path.clone(),
        project_name: config.project_name.clone(),
        version: config.version.clone(),
    })))
}

async fn get_managed_projects<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Vec<ProjectView>> {
    let strip = state.control.strip_custom_registry();
    let projects = state.control.managed_projects(&actor).await?;
    Ok(Json(ApiResponse::success(
        projects.iter().map(|project| ProjectView::new(project, strip)).collect(),
    )))
}

async fn get_other_projects<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
) -> ApiResult<Vec<ProjectView>> {
    let strip = state.control.strip_custom_registry();
    let projects = state.control.other_projects().await?;
    Ok(Json(ApiResponse::success(
        projects.iter().map(|project| ProjectView::new(project, strip)).collect(),
    )))
}

async fn get_standalone_containers<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
) -> ApiResult<Vec<ContainerView>> {
    let strip = state.control.strip_custom_registry();
    let containers = state.control.standalone_containers().await?;
    Ok(Json(ApiResponse::success(
        containers
            .iter()
            .map(|container| ContainerView::new(container, strip))
            .collect(),
    )))
}

async fn get_permissions<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
) -> ApiResult<Vec<PermissionEntry>> {
    Ok(Json(ApiResponse::success(state.control.permissions().await)))
}

async fn project_action<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, action)): Path<(ProjectName, String)>,
) -> ApiResult<String> {
    debug!("{} requests {action} on project {project_name}", actor.username);
    let control = &state.control;
    match action.as_str() {
        "up" => control.project_up(&actor, &project_name).await?,
        "down" => control.project_down(&actor, &project_name).await?,
        "restart" => control.project_restart(&actor, &project_name).await?,
        "rm" => control.project_remove(&actor, &project_name).await?,
        _ => return Err(ControlError::NotFound(format!("unknown project action '{action}'"))),
    }
    done(format!("{action} on project {project_name} done"))
}

async fn service_action<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, service_name, action)): Path<(ProjectName, ServiceName, String)>,
) -> ApiResult<String> {
    debug!("{} requests {action} on service {service_name}", actor.username);
    let control = &state.control;
    match action.as_str() {
        "up" => control.service_up(&actor, &project_name, &service_name).await?,
        "stop" => control.service_stop(&actor, &project_name, &service_name).await?,
        "start" => control.service_start(&actor, &project_name, &service_name).await?,
        "restart" => control.service_restart(&actor, &project_name, &service_name).await?,
        "rm" => control.service_remove(&actor, &project_name, &service_name).await?,
        _ => return Err(ControlError::NotFound(format!("unknown service action '{action}'"))),
    }
    done(format!("{action} on service {service_name} done"))
}

async fn update_service<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, service_name)): Path<(ProjectName, ServiceName)>,
) -> ApiResult<ServiceView> {
    let service = state
        .control
        .service_update(&actor, &project_name, &service_name)
        .await?;
    Ok(Json(ApiResponse::success(ServiceView::new(
        &service,
        state.control.strip_custom_registry(),
    ))))
}

async fn rollback_service<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, service_name)): Path<(ProjectName, ServiceName)>,
) -> ApiResult<ServiceView> {
    let service = state
        .control
        .service_rollback(&actor, &project_name, &service_name)
        .await?;
    Ok(Json(ApiResponse::success(ServiceView::new(
        &service,
        state.control.strip_custom_registry(),
    ))))
}

async fn scale_service<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, service_name)): Path<(ProjectName, ServiceName)>,
    Json(payload): Json<ScaleRequest>,
) -> ApiResult<String> {
    state
        .control
        .service_scale(&actor, &project_name, &service_name, payload.replicas)
        .await?;
    done(format!("service {service_name} scaled to {}", payload.replicas))
}

async fn service_logs<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((project_name, service_name)): Path<(ProjectName, ServiceName)>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsView> {
    let lines = state
        .control
        .service_logs(&actor, &project_name, &service_name, query.lines())
        .await?;
    Ok(Json(ApiResponse::success(LogsView {
        name: service_name.to_string(),
        lines,
    })))
}

async fn container_action<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path((container_id, action)): Path<(String, String)>,
) -> ApiResult<String> {
    debug!("{} requests {action} on container {container_id}", actor.username);
    let control = &state.control;
    let container = match action.as_str() {
        "stop" => control.container_stop(&actor, &container_id).await?,
        "start" => control.container_start(&actor, &container_id).await?,
        "restart" => control.container_restart(&actor, &container_id).await?,
        "rm" => control.container_remove(&actor, &container_id).await?,
        _ => return Err(ControlError::NotFound(format!("unknown container action '{action}'"))),
    };
    done(format!("{action} on container {} done", container.name))
}

async fn rename_container<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path(container_id): Path<String>,
    Json(payload): Json<RenameRequest>,
) -> ApiResult<ContainerView> {
    let container = state
        .control
        .container_rename(&actor, &container_id, &payload.name)
        .await?;
    Ok(Json(ApiResponse::success(ContainerView::new(
        &container,
        state.control.strip_custom_registry(),
    ))))
}

async fn container_logs<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path(container_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<LogsView> {
    let (container, lines) = state
        .control
        .container_logs(&actor, &container_id, query.lines())
        .await?;
    Ok(Json(ApiResponse::success(LogsView {
        name: container.name,
        lines,
    })))
}

async fn get_compose_file<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<ComposeFileView> {
    let file = state.control.compose_file(&actor).await?;
    Ok(Json(ApiResponse::success(ComposeFileView {
        path: file.path,
        project_name: file.project_name,
        file_content: file.file_content,
    })))
}

async fn put_compose_file<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<ComposeFileUpdate>,
) -> ApiResult<String> {
    state
        .control
        .update_compose_file(&actor, &payload.file_content)
        .await?;
    done("compose file updated".to_string())
}

async fn system_command<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
    Extension(actor): Extension<Actor>,
    Path(command): Path<String>,
) -> ApiResult<String> {
    let control = &state.control;
    match command.as_str() {
        "clean_old_images" => control.clean_old_images(&actor).await?,
        "prune" => control.prune(&actor).await?,
        "prune_all" => control.prune_all(&actor).await?,
        _ => return Err(ControlError::NotFound(format!("unknown system command '{command}'"))),
    }
    done(format!("{command} done"))
}

async fn system_status<E: ComposeExecutor, R: ContainerRuntime>(
    State(state): State<AppState<E, R>>,
) -> ApiResult<SystemStatus> {
    Ok(Json(ApiResponse::success(SystemStatus {
        busy: state.control.gate().is_busy(),
    })))
}

pub fn create_app<E: ComposeExecutor, R: ContainerRuntime>(state: AppState<E, R>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/compose_config", get(get_compose_config::<E, R>))
        .route("/permissions", get(get_permissions::<E, R>))
        .route("/projects/managed", get(get_managed_projects::<E, R>))
        .route("/projects/other", get(get_other_projects::<E, R>))
        .route("/containers/standalone", get(get_standalone_containers::<E, R>))
        .route("/project/{project_name}/{action}", post(project_action::<E, R>))
        .route(
            "/project/{project_name}/service/{service_name}/update",
            post(update_service::<E, R>),
        )
        .route(
            "/project/{project_name}/service/{service_name}/rollback",
            post(rollback_service::<E, R>),
        )
        .route(
            "/project/{project_name}/service/{service_name}/scale",
            post(scale_service::<E, R>),
        )
        .route(
            "/project/{project_name}/service/{service_name}/logs",
            get(service_logs::<E, R>),
        )
        .route(
            "/project/{project_name}/service/{service_name}/{action}",
            post(service_action::<E, R>),
        )
        .route("/container/{container_id}/rename", post(rename_container::<E, R>))
        .route("/container/{container_id}/logs", get(container_logs::<E, R>))
        .route("/container/{container_id}/{action}", post(container_action::<E, R>))
        .route("/system/status", get(system_status::<E, R>))
        .route(
            "/system/compose_file",
            get(get_compose_file::<E, R>).put(put_compose_file::<E, R>),
        )
        .route("/system/{command}", post(system_command::<E, R>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware::<E, R>,
        ))
        .with_state(state)
}
