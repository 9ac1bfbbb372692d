#![allow(dead_code)]

use compose_control::domain::gate::ConcurrencyGate;
use compose_control::domain::models::container::{
    CONFIG_HASH_LABEL, Container, ContainerID, ContainerStatus, Generation, PROJECT_LABEL, SERVICE_LABEL,
};
use compose_control::domain::models::names::ProjectName;
use compose_control::domain::permissions::Actor;
use compose_control::domain::ports::{CommandOutput, ComposeExecutor, ContainerFilter, ContainerRuntime};
use compose_control::domain::service::{ControlCenter, ControlOptions};
use compose_control::error::ControlError;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const PROJECT: &str = "shop";

pub const COMPOSE: &str = r#"services:
  web:
    image: registry.example.com/shop/web:1
    scale: 2
    depends_on:
      - db
  db:
    image: postgres:16
    ports:
      - "5432:5432"
"#;

#[derive(Default)]
struct FakeState {
    containers: Vec<Container>,
    commands: Vec<String>,
    failing: Option<String>,
    holding: Option<(String, Arc<Notify>, Arc<Notify>)>,
    next_id: u32,
}

struct ServiceSpec {
    name: String,
    scale: u32,
    hash: String,
}

/// In-memory docker engine answering both compose commands and runtime calls.
pub struct FakeEngine {
    compose_file: PathBuf,
    project_name: ProjectName,
    state: Mutex<FakeState>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl FakeEngine {
    pub fn new(compose_file: &Path) -> Self {
        Self {
            compose_file: compose_file.to_path_buf(),
            project_name: ProjectName::new(PROJECT),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Every compose invocation and runtime mutation, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    /// Parks the next compose command with this verb until released.
    ///
    /// Returns the notifier signalled once the command is running and the one releasing it.
    pub fn hold_on(&self, verb: &str) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.state.lock().unwrap().holding = Some((verb.to_string(), entered.clone(), release.clone()));
        (entered, release)
    }

    fn take_hold(&self, verb: &str) -> Option<(Arc<Notify>, Arc<Notify>)> {
        let mut state = self.state.lock().unwrap();
        match &state.holding {
            Some((held, _, _)) if held == verb => state.holding.take().map(|(_, entered, release)| (entered, release)),
            _ => None,
        }
    }

    /// Makes every compose command with this verb fail.
    pub fn fail_on(&self, verb: &str) {
        self.state.lock().unwrap().failing = Some(verb.to_string());
    }

    pub fn containers(&self) -> Vec<Container> {
        self.state.lock().unwrap().containers.clone()
    }

    pub fn service_containers(&self, service: &str) -> Vec<Container> {
        let mut containers: Vec<Container> = self
            .containers()
            .into_iter()
            .filter(|c| c.service.as_ref().map(|s| s.as_str()) == Some(service))
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        containers
    }

    pub fn add_container(
        &self,
        name: &str,
        project: Option<&str>,
        service: Option<&str>,
        status: ContainerStatus,
    ) -> ContainerID {
        let mut labels = HashMap::new();
        if let Some(project) = project {
            labels.insert(PROJECT_LABEL.to_string(), project.to_string());
        }
        if let Some(service) = service {
            labels.insert(SERVICE_LABEL.to_string(), service.to_string());
        }
        let mut state = self.state.lock().unwrap();
        let container = new_container(&mut state, name, &labels, status);
        let id = container.id.clone();
        state.containers.push(container);
        id
    }

    fn services(&self) -> Result<Vec<ServiceSpec>, ControlError> {
        let content = std::fs::read_to_string(&self.compose_file)?;
        let document: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| ControlError::CommandFailed {
            command: "config".to_string(),
            output: e.to_string(),
        })?;
        let services = document["services"].as_mapping().cloned().unwrap_or_default();
        Ok(services
            .iter()
            .map(|(name, value)| {
                let mut hasher = DefaultHasher::new();
                serde_yaml::to_string(value).unwrap_or_default().hash(&mut hasher);
                ServiceSpec {
                    name: name.as_str().unwrap_or_default().to_string(),
                    scale: value["scale"].as_u64().unwrap_or(1) as u32,
                    hash: format!("{:016x}", hasher.finish()),
                }
            })
            .collect())
    }

    fn selected(&self, positional: &[String]) -> Result<Vec<ServiceSpec>, ControlError> {
        Ok(self
            .services()?
            .into_iter()
            .filter(|spec| positional.is_empty() || positional.contains(&spec.name))
            .collect())
    }

    fn up(&self, args: &[String]) -> Result<(), ControlError> {
        let mut scale: Option<(String, u32)> = None;
        let mut positional = Vec::new();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            if arg == "--scale" {
                if let Some((service, replicas)) = iter.next().and_then(|value| value.split_once('=')) {
                    scale = Some((service.to_string(), replicas.parse().unwrap_or(1)));
                }
            } else if !arg.starts_with("--") {
                positional.push(arg.clone());
            }
        }
        let no_recreate = args.iter().any(|arg| arg == "--no-recreate");

        for spec in self.selected(&positional)? {
            let desired = match &scale {
                Some((service, replicas)) if *service == spec.name => *replicas,
                _ => spec.scale,
            };
            let mut state = self.state.lock().unwrap();
            let mut existing = 0;
            for container in state.containers.iter_mut() {
                if container.project.as_ref() != Some(&self.project_name)
                    || container.service.as_ref().map(|s| s.as_str()) != Some(spec.name.as_str())
                {
                    continue;
                }
                existing += 1;
                if container.is_rollback_candidate() {
                    continue;
                }
                if !no_recreate && container.config_hash.as_deref() != Some(spec.hash.as_str()) {
                    container.config_hash = Some(spec.hash.clone());
                }
                container.status = ContainerStatus::Running;
            }
            let labels = HashMap::from([
                (PROJECT_LABEL.to_string(), self.project_name.to_string()),
                (SERVICE_LABEL.to_string(), spec.name.clone()),
                (CONFIG_HASH_LABEL.to_string(), spec.hash.clone()),
            ]);
            let mut index = 1;
            while existing < desired {
                let name = format!("{}-{}-{index}", self.project_name, spec.name);
                index += 1;
                if state.containers.iter().any(|c| c.name == name) {
                    continue;
                }
                let container = new_container(&mut state, &name, &labels, ContainerStatus::Running);
                state.containers.push(container);
                existing += 1;
            }
        }
        Ok(())
    }

    fn set_status(&self, positional: &[String], from: &[ContainerStatus], to: ContainerStatus) {
        let mut state = self.state.lock().unwrap();
        for container in state.containers.iter_mut() {
            if self.targets(container, positional) && from.contains(&container.status) {
                container.status = to;
            }
        }
    }

    fn targets(&self, container: &Container, positional: &[String]) -> bool {
        container.project.as_ref() == Some(&self.project_name)
            && (positional.is_empty()
                || container
                    .service
                    .as_ref()
                    .is_some_and(|service| positional.iter().any(|p| p == service.as_str())))
    }

    fn record(&self, command: String) {
        self.state.lock().unwrap().commands.push(command);
    }
}

fn new_container(state: &mut FakeState, name: &str, labels: &HashMap<String, String>, status: ContainerStatus) -> Container {
    state.next_id += 1;
    Container::new(format!("{:064x}", state.next_id), format!("/{name}"), status).with_labels(labels)
}

impl ComposeExecutor for FakeEngine {
    async fn execute(&self, _project_name: &ProjectName, args: &[String]) -> Result<CommandOutput, ControlError> {
        self.record(format!("compose {}", args.join(" ")));
        let verb = args.first().cloned().unwrap_or_default();
        if let Some((entered, release)) = self.take_hold(&verb) {
            entered.notify_one();
            release.notified().await;
        }
        if self.state.lock().unwrap().failing.as_deref() == Some(verb.as_str()) {
            return Err(ControlError::CommandFailed {
                command: args.join(" "),
                output: format!("{verb} exploded"),
            });
        }
        let positional: Vec<String> = args
            .iter()
            .skip(1)
            .filter(|arg| !arg.starts_with("--"))
            .cloned()
            .collect();

        let stdout = match verb.as_str() {
            "config" if args.iter().any(|arg| arg == "--hash=*") => self
                .services()?
                .iter()
                .map(|spec| format!("{} {}\n", spec.name, spec.hash))
                .collect(),
            "config" => {
                self.services()?;
                std::fs::read_to_string(&self.compose_file)?
            }
            "up" => {
                self.up(args)?;
                String::new()
            }
            "stop" => {
                self.set_status(&positional, &[ContainerStatus::Running], ContainerStatus::Exited);
                String::new()
            }
            "start" => {
                self.set_status(&positional, &[ContainerStatus::Exited], ContainerStatus::Running);
                String::new()
            }
            "restart" => {
                self.set_status(
                    &positional,
                    &[ContainerStatus::Running, ContainerStatus::Exited],
                    ContainerStatus::Running,
                );
                String::new()
            }
            "rm" => {
                let mut state = self.state.lock().unwrap();
                let containers = std::mem::take(&mut state.containers);
                state.containers = containers
                    .into_iter()
                    .filter(|c| !(self.targets(c, &positional) && c.is_exited()))
                    .collect();
                String::new()
            }
            "down" => {
                let mut state = self.state.lock().unwrap();
                let containers = std::mem::take(&mut state.containers);
                state.containers = containers
                    .into_iter()
                    .filter(|c| !self.targets(c, &[]))
                    .collect();
                String::new()
            }
            "logs" => {
                let service = positional.last().cloned().unwrap_or_default();
                let names: Vec<String> = self.service_containers(&service).into_iter().map(|c| c.name).collect();
                let mut out = format!("Attaching to {}\n", names.join(", "));
                for name in names {
                    out.push_str(&format!("{name}  | 2024-03-01T10:20:30.123456789Z hello from {name}\n"));
                }
                out
            }
            _ => String::new(),
        };
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

impl FakeEngine {
    fn with_container<T>(
        &self,
        container_id: &ContainerID,
        f: impl FnOnce(&mut Vec<Container>, usize) -> T,
    ) -> Result<T, ControlError> {
        let mut state = self.state.lock().unwrap();
        match state
            .containers
            .iter()
            .position(|c| &c.id == container_id || &c.name == container_id)
        {
            Some(index) => Ok(f(&mut state.containers, index)),
            None => Err(ControlError::NotFound(format!("No such container: {container_id}"))),
        }
    }
}

impl ContainerRuntime for FakeEngine {
    async fn list_containers(&self, filter: ContainerFilter) -> Result<Vec<Container>, ControlError> {
        let mut containers: Vec<Container> = self
            .containers()
            .into_iter()
            .filter(|c| match &filter {
                ContainerFilter::All => true,
                ContainerFilter::AnyProject => c.project.is_some(),
                ContainerFilter::Project(project) => c.project.as_ref() == Some(project),
                ContainerFilter::Service(project, service) => {
                    c.project.as_ref() == Some(project) && c.service.as_ref() == Some(service)
                }
            })
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn get_container(&self, container_id: &ContainerID) -> Result<Container, ControlError> {
        self.with_container(container_id, |containers, index| containers[index].clone())
    }

    async fn stop_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.record(format!("docker stop {container_id}"));
        self.with_container(container_id, |containers, index| {
            containers[index].status = ContainerStatus::Exited
        })
    }

    async fn start_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.record(format!("docker start {container_id}"));
        self.with_container(container_id, |containers, index| {
            containers[index].status = ContainerStatus::Running
        })
    }

    async fn restart_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.record(format!("docker restart {container_id}"));
        self.with_container(container_id, |containers, index| {
            containers[index].status = ContainerStatus::Running
        })
    }

    async fn remove_container(&self, container_id: &ContainerID) -> Result<(), ControlError> {
        self.record(format!("docker rm {container_id}"));
        self.with_container(container_id, |containers, index| {
            containers.remove(index);
        })
    }

    async fn rename_container(&self, container_id: &ContainerID, new_name: &str) -> Result<(), ControlError> {
        self.record(format!("docker rename {container_id} {new_name}"));
        let taken = self.containers().iter().any(|c| c.name == new_name);
        if taken {
            return Err(ControlError::Runtime(format!("Conflict. The container name \"/{new_name}\" is already in use")));
        }
        self.with_container(container_id, |containers, index| {
            let container = &mut containers[index];
            container.name = new_name.to_string();
            container.generation = Generation::of(new_name);
        })
    }

    async fn container_logs(&self, container_id: &ContainerID, _lines: usize) -> Result<String, ControlError> {
        self.with_container(container_id, |_, _| {
            "2024-12-24T23:59:01.000000001Z ready to accept connections\n".to_string()
        })
    }

    async fn remove_dangling_images(&self) -> Result<(), ControlError> {
        self.record("docker image prune".to_string());
        Ok(())
    }

    async fn prune(&self) -> Result<(), ControlError> {
        self.record("docker system prune".to_string());
        Ok(())
    }

    async fn prune_images_and_volumes(&self) -> Result<(), ControlError> {
        self.record("docker system prune --all --volumes".to_string());
        Ok(())
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub compose_file: PathBuf,
    pub engine: Arc<FakeEngine>,
    pub gate: ConcurrencyGate,
    pub control: Arc<ControlCenter<FakeEngine, FakeEngine>>,
}

pub fn harness(compose: &str, configure: impl FnOnce(&mut ControlOptions)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let compose_file = dir.path().join("docker-compose.yml");
    std::fs::write(&compose_file, compose).unwrap();
    let engine = Arc::new(FakeEngine::new(&compose_file));
    let gate = ConcurrencyGate::new();
    let mut options = ControlOptions {
        compose_file: Some(compose_file.clone()),
        project_name: Some(ProjectName::new(PROJECT)),
        ..Default::default()
    };
    configure(&mut options);
    let control = Arc::new(ControlCenter::new(engine.clone(), engine.clone(), gate.clone(), options));
    Harness {
        dir,
        compose_file,
        engine,
        gate,
        control,
    }
}

impl Harness {
    /// Brings every declared service up, as `docker compose up` would.
    pub async fn start_project(&self) {
        self.engine
            .execute(&ProjectName::new(PROJECT), &strings(&["up", "--detach"]))
            .await
            .unwrap();
        self.engine.clear_commands();
    }

    /// Rewrites the compose file with a newer modification time.
    pub async fn rewrite_compose(&self, content: &str) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&self.compose_file, content).unwrap();
    }
}

pub fn admin() -> Actor {
    Actor::new("admin", true, vec![])
}

pub fn user(name: &str, permissions: &[&str]) -> Actor {
    Actor::new(name, false, permissions.iter().map(|p| p.parse().unwrap()))
}
