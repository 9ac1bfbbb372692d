use compose_control::cli::configure_cli;
use compose_control::config::load_config;
use compose_control::domain::gate::ConcurrencyGate;
use compose_control::domain::service::ControlCenter;
use compose_control::inbound::server::{AppState, create_app};
use compose_control::outbound::compose_cli::ComposeCli;
use compose_control::outbound::docker::DockerRuntime;
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    #[cfg(target_os = "linux")]
    set_group_id();

    let args = configure_cli();
    let mut config = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }

    let actors = config.actors()?;
    if actors.is_empty() {
        warn!("no users configured in {}, every request will be rejected", args.config.display());
    }

    match &config.compose_file {
        Some(path) if !path.exists() => {
            error!("docker-compose file [{}] not found", path.display());
        }
        Some(path) => info!("managing compose file {}", path.display()),
        None => warn!("no compose file configured, only standalone containers are available"),
    }

    let executor = ComposeCli::new(
        config.compose_command.clone(),
        config.compose_file.clone().unwrap_or_default(),
    )
    .with_compatibility_mode(config.compatibility_mode)
    .with_windows_host(config.windows_host);
    let runtime = DockerRuntime::new()?;

    let control = ControlCenter::new(
        Arc::new(executor),
        Arc::new(runtime),
        ConcurrencyGate::new(),
        config.control_options(),
    );
    let state = AppState {
        control: Arc::new(control),
        actors: Arc::new(actors),
    };

    let shutdown = Arc::new(Notify::new());
    let notify = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, gracefully shutting down...");
        notify.notify_one();
    })?;

    let app = create_app(state);
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    info!("Server running on http://0.0.0.0:{}", config.port);
    info!(
        "Health check: http://0.0.0.0:{}/health (no auth required)",
        config.port
    );
    info!("Protected API endpoints (require Authorization: Bearer <token>):");
    info!("  GET    /projects/managed                          - managed project and its services");
    info!("  GET    /projects/other                            - other compose projects");
    info!("  GET    /containers/standalone                     - containers outside compose");
    info!("  POST   /project/:project/service/:service/update  - update a service");
    info!("  POST   /project/:project/service/:service/rollback - roll a service back");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(target_os = "linux")]
fn set_group_id() {
    let docker_gid = match std::env::var("DOCKER_GID")
        .unwrap_or_else(|_| "999".to_string())
        .parse::<u32>()
    {
        Ok(gid) => gid,
        Err(e) => {
            error!("Invalid DOCKER_GID: {e}");
            return;
        }
    };
    info!("Setting GID to {}", docker_gid);
    // Note: This requires CAP_SETGID capability
    unsafe {
        if libc::setgid(docker_gid) != 0 {
            error!("Failed to set GID to {}", docker_gid);
        }
    }
}
