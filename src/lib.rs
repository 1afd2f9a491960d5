pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::docker::{DockerEngine, EngineSettings, ShutdownHandle};
pub use adapters::process::ProcessRunner;
pub use config::{Settings, TomlConfig};
pub use core::ollama::{Definition, Ollama, OllamaSettings};
pub use domain::model::{CommandOutput, Container, ExposedPort, Probe, Protocol, Service, ServiceBinding};
pub use domain::ports::{CommandRunner, Engine};
pub use utils::error::{PipelineError, Result};
