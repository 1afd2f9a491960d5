use crate::config::{Settings, TomlConfig};
use crate::core::ollama::Definition;
use crate::utils::error::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start an Ollama server, pull the model and print its answer to PROMPT
    Run { prompt: String },

    /// Print a container definition as JSON without running anything
    Describe {
        #[arg(value_enum)]
        definition: Definition,
        /// Required for `prompt`
        prompt: Option<String>,
    },
}

#[derive(Debug, Clone, Parser)]
#[command(name = "ollama-pipeline")]
#[command(about = "Run a prompt against a containerized Ollama server")]
pub struct CliConfig {
    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    #[arg(long, global = true, help = "Docker-compatible CLI to drive (docker, podman)")]
    pub engine: Option<String>,

    #[arg(long, global = true)]
    pub image: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, global = true)]
    pub model: Option<String>,

    #[arg(long, global = true)]
    pub ready_timeout_secs: Option<u64>,

    #[arg(long, global = true, help = "Keep images committed between execs")]
    pub keep_intermediate: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Defaults, overridden by `--config`, overridden by flags.
    pub fn resolve(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => TomlConfig::from_file(path)?.to_settings(),
            None => Settings::default(),
        };

        if let Some(engine) = &self.engine {
            settings.engine.binary = engine.clone();
        }
        if let Some(image) = &self.image {
            settings.ollama.image = image.clone();
        }
        if let Some(port) = self.port {
            settings.ollama.port = port;
        }
        if let Some(model) = &self.model {
            settings.ollama.model = model.clone();
        }
        if let Some(secs) = self.ready_timeout_secs {
            settings.engine.ready_timeout = Duration::from_secs(secs);
        }
        if self.keep_intermediate {
            settings.engine.keep_intermediate = true;
        }

        Ok(settings)
    }
}
