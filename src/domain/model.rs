use serde::{Deserialize, Serialize};

use crate::domain::ports::Engine;
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: Protocol,
    pub description: Option<String>,
}

impl ExposedPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
            description: None,
        }
    }
}

// 服務就緒檢查方式
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Probe {
    #[default]
    Tcp,
    Http { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceBinding {
    pub alias: String,
    pub service: Service,
}

// 不可變的容器描述；交給 Engine 之前不做任何 I/O
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Container {
    image: Option<String>,
    entrypoint_removed: bool,
    env: Vec<(String, String)>,
    execs: Vec<Vec<String>>,
    exposed_ports: Vec<ExposedPort>,
    service_bindings: Vec<ServiceBinding>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    #[must_use]
    pub fn without_entrypoint(mut self) -> Self {
        self.entrypoint_removed = true;
        self
    }

    // 同名變數原地取代
    #[must_use]
    pub fn with_env_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.env.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.env.push((name, value)),
        }
        self
    }

    #[must_use]
    pub fn with_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execs.push(args.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_exposed_port(self, port: u16) -> Self {
        self.with_exposed_port_opts(ExposedPort::tcp(port))
    }

    #[must_use]
    pub fn with_exposed_port_opts(mut self, port: ExposedPort) -> Self {
        self.exposed_ports
            .retain(|p| !(p.port == port.port && p.protocol == port.protocol));
        self.exposed_ports.push(port);
        self
    }

    #[must_use]
    pub fn with_service_binding(mut self, alias: impl Into<String>, service: Service) -> Self {
        let alias = alias.into();
        self.service_bindings.retain(|b| b.alias != alias);
        self.service_bindings.push(ServiceBinding { alias, service });
        self
    }

    // 最後一個 exec 即服務行程
    #[must_use]
    pub fn as_service(self) -> Service {
        Service {
            container: self,
            probe: Probe::default(),
            warmup: Vec::new(),
        }
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn entrypoint_removed(&self) -> bool {
        self.entrypoint_removed
    }

    pub fn env_variable(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn env_variables(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn execs(&self) -> &[Vec<String>] {
        &self.execs
    }

    pub fn exposed_ports(&self) -> &[ExposedPort] {
        &self.exposed_ports
    }

    pub fn service_bindings(&self) -> &[ServiceBinding] {
        &self.service_bindings
    }

    // 依賴的服務排在前面
    pub fn services_in_start_order(&self) -> Vec<(&str, &Service)> {
        let mut ordered = Vec::new();
        collect_services(self, &mut ordered);
        ordered
    }

    pub async fn stdout<E: Engine + ?Sized>(&self, engine: &E) -> Result<String> {
        engine.stdout(self).await
    }
}

fn collect_services<'a>(container: &'a Container, out: &mut Vec<(&'a str, &'a Service)>) {
    for binding in &container.service_bindings {
        collect_services(&binding.service.container, out);
        out.push((binding.alias.as_str(), &binding.service));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    container: Container,
    probe: Probe,
    warmup: Vec<Vec<String>>,
}

impl Service {
    #[must_use]
    pub fn with_probe(mut self, probe: Probe) -> Self {
        self.probe = probe;
        self
    }

    // 就緒後在服務內執行
    #[must_use]
    pub fn with_warmup_exec<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.warmup.push(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    pub fn warmup_execs(&self) -> &[Vec<String>] {
        &self.warmup
    }

    pub fn serve_command(&self) -> Option<&[String]> {
        self.container.execs.last().map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}
