use crate::adapters::probe;
use crate::adapters::process::ProcessRunner;
use crate::domain::model::{CommandOutput, Container, Protocol, Service};
use crate::domain::ports::{CommandRunner, Engine};
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation::{validate_identifier, validate_positive_number, Validate};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_BINARY: &str = "docker";
pub const DEFAULT_NETWORK_PREFIX: &str = "ollama-pipeline";
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_READY_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub binary: String, // docker, podman, ...
    pub network_prefix: String,
    pub ready_timeout: Duration,
    pub ready_interval: Duration,
    pub keep_intermediate: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            network_prefix: DEFAULT_NETWORK_PREFIX.to_string(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ready_interval: DEFAULT_READY_INTERVAL,
            keep_intermediate: false,
        }
    }
}

impl Validate for EngineSettings {
    fn validate(&self) -> Result<()> {
        validate_identifier("engine.binary", &self.binary)?;
        validate_identifier("engine.network_prefix", &self.network_prefix)?;
        validate_positive_number("engine.ready_timeout_seconds", self.ready_timeout.as_secs(), 1)?;
        validate_positive_number(
            "engine.ready_interval_millis",
            self.ready_interval.as_millis() as u64,
            1,
        )?;
        Ok(())
    }
}

// 觸發後 stdout 回傳 Cancelled，已建立的資源仍會清除
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

// 單次執行期間建立的資源，結束時一併清除
#[derive(Debug)]
struct Session {
    id: String,
    network: Option<String>,
    containers: Vec<String>,
    images: Vec<String>,
    counter: usize,
}

impl Session {
    fn new(prefix: &str) -> Self {
        Self {
            id: format!(
                "{}-{}-{}",
                prefix,
                std::process::id(),
                chrono::Utc::now().timestamp_millis()
            ),
            network: None,
            containers: Vec::new(),
            images: Vec::new(),
            counter: 0,
        }
    }

    fn next_name(&mut self, kind: &str) -> String {
        self.counter += 1;
        format!("{}-{}-{}", self.id, kind, self.counter)
    }
}

#[derive(Debug, Clone, Copy)]
enum Launch<'a> {
    Step { name: &'a str },  // 中間步驟，之後 commit
    Final { name: &'a str }, // 最後一步，取其 stdout
    Service { name: &'a str, alias: &'a str },
}

fn run_args(
    container: &Container,
    image: &str,
    network: Option<&str>,
    launch: Launch<'_>,
    command: &[String],
) -> Vec<String> {
    let mut args = vec!["run".to_string()];

    match launch {
        Launch::Step { name } => {
            args.push("--name".to_string());
            args.push(name.to_string());
        }
        Launch::Final { name } => {
            args.push("--rm".to_string());
            args.push("--name".to_string());
            args.push(name.to_string());
        }
        Launch::Service { name, .. } => {
            args.push("-d".to_string());
            args.push("--name".to_string());
            args.push(name.to_string());
        }
    }

    if let Some(network) = network {
        args.push("--network".to_string());
        args.push(network.to_string());
        if let Launch::Service { alias, .. } = launch {
            args.push("--network-alias".to_string());
            args.push(alias.to_string());
        }
    }

    for (name, value) in container.env_variables() {
        args.push("-e".to_string());
        args.push(format!("{}={}", name, value));
    }

    if container.entrypoint_removed() {
        args.push("--entrypoint".to_string());
        args.push(String::new());
    }

    // 只有 service 需要對外發布 port，用於就緒檢查
    if matches!(launch, Launch::Service { .. }) {
        for port in container.exposed_ports() {
            args.push("-p".to_string());
            args.push(format!("127.0.0.1::{}/{}", port.port, port.protocol.as_str()));
        }
    }

    args.push(image.to_string());
    args.extend(command.iter().cloned());
    args
}

fn exec_failed(command: &[String], output: CommandOutput) -> PipelineError {
    PipelineError::ExecFailed {
        command: command.to_vec(),
        exit_code: output.status,
        stderr: output.stderr.trim().to_string(),
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let stopped = rx.wait_for(|stopped| *stopped).await.is_ok();
    if !stopped {
        // sender gone: nobody can ask for a shutdown any more
        std::future::pending::<()>().await;
    }
}

/// Materializes container definitions through a Docker-compatible CLI.
pub struct DockerEngine<R: CommandRunner> {
    runner: R,
    settings: EngineSettings,
    shutdown: Arc<watch::Sender<bool>>,
}

impl DockerEngine<ProcessRunner> {
    pub fn with_process_runner(settings: EngineSettings) -> Self {
        Self::new(ProcessRunner::new(), settings)
    }
}

impl<R: CommandRunner> DockerEngine<R> {
    pub fn new(runner: R, settings: EngineSettings) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            runner,
            settings,
            shutdown: Arc::new(tx),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    async fn docker(&self, args: &[String]) -> Result<CommandOutput> {
        self.runner.run(&self.settings.binary, args).await
    }

    // 非零結束碼視為引擎錯誤
    async fn checked(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.docker(&args).await?;
        if !output.success() {
            return Err(PipelineError::CommandFailed {
                program: self.settings.binary.clone(),
                args,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn best_effort(&self, args: Vec<String>) {
        match self.docker(&args).await {
            Ok(output) if output.success() => {}
            Ok(output) => tracing::warn!(
                "cleanup `{} {}` exited with {}: {}",
                self.settings.binary,
                args.join(" "),
                output.status,
                output.stderr.trim()
            ),
            Err(e) => tracing::warn!(
                "cleanup `{} {}` failed: {}",
                self.settings.binary,
                args.join(" "),
                e
            ),
        }
    }

    async fn build_layers(
        &self,
        container: &Container,
        setup: &[Vec<String>],
        session: &mut Session,
    ) -> Result<String> {
        let mut image = container
            .image()
            .ok_or_else(|| PipelineError::DefinitionError {
                message: "container has no base image".to_string(),
            })?
            .to_string();

        for command in setup {
            let name = session.next_name("step");
            session.containers.push(name.clone());

            tracing::debug!("exec {:?} on {}", command, image);
            let args = run_args(
                container,
                &image,
                session.network.as_deref(),
                Launch::Step { name: &name },
                command,
            );
            let output = self.docker(&args).await?;
            if !output.success() {
                return Err(exec_failed(command, output));
            }

            let committed = self.checked(vec!["commit".to_string(), name]).await?;
            image = committed.stdout.trim().to_string();
            session.images.push(image.clone());
        }

        Ok(image)
    }

    async fn published_address(&self, name: &str, port: u16) -> Result<SocketAddr> {
        let args = vec!["port".to_string(), name.to_string(), format!("{}/tcp", port)];
        let output = self.checked(args.clone()).await?;

        output
            .stdout
            .lines()
            .find_map(|line| line.trim().parse::<SocketAddr>().ok())
            .ok_or_else(|| PipelineError::CommandFailed {
                program: self.settings.binary.clone(),
                args,
                status: output.status,
                stderr: format!("no host address published: {:?}", output.stdout.trim()),
            })
    }

    async fn start_service(&self, alias: &str, service: &Service, session: &mut Session) -> Result<()> {
        let container = service.container();
        let (serve, setup) = container.execs().split_last().ok_or(PipelineError::NoExec)?;
        let image = self.build_layers(container, setup, session).await?;

        let name = session.next_name("svc");
        let args = run_args(
            container,
            &image,
            session.network.as_deref(),
            Launch::Service {
                name: &name,
                alias,
            },
            serve,
        );
        let output = self.docker(&args).await?;
        // 啟動失敗時容器仍可能已建立
        session.containers.push(name.clone());
        if !output.success() {
            return Err(exec_failed(serve, output));
        }
        tracing::info!("Started service {} as {}", alias, name);

        for port in container.exposed_ports() {
            if port.protocol != Protocol::Tcp {
                continue;
            }
            let addr = self.published_address(&name, port.port).await?;
            let waited = probe::wait_ready(
                service.probe(),
                addr,
                self.settings.ready_timeout,
                self.settings.ready_interval,
            )
            .await?
            .ok_or_else(|| PipelineError::ServiceNotReady {
                alias: alias.to_string(),
                port: port.port,
                waited: self.settings.ready_timeout,
            })?;
            tracing::info!("Service {} ready on port {} after {:?}", alias, port.port, waited);
        }

        for command in service.warmup_execs() {
            tracing::info!("Warming up {}: {}", alias, command.join(" "));
            let mut args = vec!["exec".to_string(), name.clone()];
            args.extend(command.iter().cloned());
            let output = self.docker(&args).await?;
            if !output.success() {
                return Err(exec_failed(command, output));
            }
        }

        Ok(())
    }

    async fn materialize(&self, container: &Container, session: &mut Session) -> Result<String> {
        if container.image().is_none() {
            return Err(PipelineError::DefinitionError {
                message: "container has no base image".to_string(),
            });
        }
        let (last, setup) = container.execs().split_last().ok_or(PipelineError::NoExec)?;

        // 有綁定 service 才建立網路
        let services = container.services_in_start_order();
        if !services.is_empty() {
            let network = session.id.clone();
            self.checked(vec![
                "network".to_string(),
                "create".to_string(),
                network.clone(),
            ])
            .await?;
            session.network = Some(network);
        }

        for (alias, service) in services {
            self.start_service(alias, service, session).await?;
        }

        let image = self.build_layers(container, setup, session).await?;

        let name = session.next_name("run");
        session.containers.push(name.clone());
        tracing::debug!("exec {:?} on {}", last, image);
        let args = run_args(
            container,
            &image,
            session.network.as_deref(),
            Launch::Final { name: &name },
            last,
        );
        let output = self.docker(&args).await?;
        // --rm 已移除此容器；被中斷時才需要清除
        session.containers.retain(|c| *c != name);
        if !output.success() {
            return Err(exec_failed(last, output));
        }

        Ok(output.stdout)
    }

    async fn teardown(&self, session: &mut Session) {
        for name in session.containers.drain(..).rev() {
            self.best_effort(vec!["rm".to_string(), "-f".to_string(), name])
                .await;
        }

        let images: Vec<String> = session.images.drain(..).rev().collect();
        if self.settings.keep_intermediate {
            if !images.is_empty() {
                tracing::info!("Keeping {} intermediate images", images.len());
            }
        } else {
            for image in images {
                self.best_effort(vec!["rmi".to_string(), image]).await;
            }
        }

        if let Some(network) = session.network.take() {
            self.best_effort(vec!["network".to_string(), "rm".to_string(), network])
                .await;
        }
    }
}

#[async_trait]
impl<R: CommandRunner> Engine for DockerEngine<R> {
    async fn stdout(&self, container: &Container) -> Result<String> {
        let mut session = Session::new(&self.settings.network_prefix);
        tracing::info!("Materializing pipeline {}", session.id);

        // 中斷時放棄目前步驟，但仍執行清除
        let id = session.id.clone();
        let result = tokio::select! {
            result = self.materialize(container, &mut session) => result,
            _ = shutdown_requested(self.shutdown.subscribe()) => {
                tracing::warn!("Pipeline {} interrupted, tearing down", id);
                Err(PipelineError::Cancelled)
            }
        };
        self.teardown(&mut session).await;

        if let Err(e) = &result {
            tracing::error!("Pipeline {} failed: {}", session.id, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ExposedPort;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_run_args_for_service() {
        let ctr = Container::new()
            .from("img")
            .without_entrypoint()
            .with_env_variable("OLLAMA_HOST", "0.0.0.0")
            .with_exposed_port(11434)
            .with_exposed_port_opts(ExposedPort {
                port: 53,
                protocol: Protocol::Udp,
                description: None,
            });

        let args = run_args(
            &ctr,
            "img",
            Some("net"),
            Launch::Service {
                name: "net-svc-1",
                alias: "server",
            },
            &strings(&["ollama", "serve"]),
        );

        assert_eq!(
            args,
            strings(&[
                "run",
                "-d",
                "--name",
                "net-svc-1",
                "--network",
                "net",
                "--network-alias",
                "server",
                "-e",
                "OLLAMA_HOST=0.0.0.0",
                "--entrypoint",
                "",
                "-p",
                "127.0.0.1::11434/tcp",
                "-p",
                "127.0.0.1::53/udp",
                "img",
                "ollama",
                "serve",
            ])
        );
    }

    #[test]
    fn test_run_args_final_exec_is_removed_and_unpublished() {
        let ctr = Container::new().from("alpine").with_exposed_port(80);
        let args = run_args(
            &ctr,
            "sha256:abc",
            None,
            Launch::Final { name: "p-run-1" },
            &strings(&["echo", "hi"]),
        );

        assert_eq!(
            args,
            strings(&["run", "--rm", "--name", "p-run-1", "sha256:abc", "echo", "hi"])
        );
    }

    #[test]
    fn test_session_names_are_unique() {
        let mut session = Session::new("p");
        let a = session.next_name("step");
        let b = session.next_name("step");

        assert_ne!(a, b);
        assert!(a.starts_with(&session.id));
    }

    #[test]
    fn test_engine_settings_validation() {
        assert!(EngineSettings::default().validate().is_ok());

        let bad = EngineSettings {
            ready_timeout: Duration::from_millis(10),
            ..EngineSettings::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_skips_everything() {
        // run 永不結束，其他指令立即成功
        struct HangingRun;
        impl CommandRunner for HangingRun {
            async fn run(&self, _program: &str, args: &[String]) -> Result<CommandOutput> {
                if args[0] == "run" {
                    std::future::pending::<()>().await;
                }
                Ok(CommandOutput {
                    status: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
        }

        let engine = DockerEngine::new(HangingRun, EngineSettings::default());
        engine.shutdown_handle().trigger();

        let ctr = Container::new().from("alpine").with_exec(["true"]);
        let result = engine.stdout(&ctr).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
