use crate::domain::model::{Container, Probe, Service};
use crate::domain::ports::Engine;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_env_name, validate_identifier, validate_positive_number, validate_required_field, Validate,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_IMAGE: &str = "index.docker.io/ollama/ollama";
pub const DEFAULT_PORT: u16 = 11434;
pub const DEFAULT_MODEL: &str = "llama2";
// serve 讀作監聽位址，CLI 讀作伺服器位址
pub const HOST_ENV: &str = "OLLAMA_HOST";
pub const BIND_ADDRESS: &str = "0.0.0.0";
pub const SERVER_ALIAS: &str = "server";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaSettings {
    pub image: String,
    pub port: u16,
    pub model: String,
    pub host_env: String,
    pub bind_address: String,
    pub server_alias: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: DEFAULT_PORT,
            model: DEFAULT_MODEL.to_string(),
            host_env: HOST_ENV.to_string(),
            bind_address: BIND_ADDRESS.to_string(),
            server_alias: SERVER_ALIAS.to_string(),
        }
    }
}

impl Validate for OllamaSettings {
    fn validate(&self) -> Result<()> {
        validate_identifier("ollama.image", &self.image)?;
        validate_positive_number("ollama.port", u64::from(self.port), 1)?;
        validate_identifier("ollama.model", &self.model)?;
        validate_env_name("ollama.host_env", &self.host_env)?;
        validate_identifier("ollama.bind_address", &self.bind_address)?;
        validate_identifier("ollama.server_alias", &self.server_alias)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Definition {
    Base,
    Server,
    Client,
    Prompt,
}

#[derive(Debug, Clone, Default)]
pub struct Ollama {
    settings: OllamaSettings,
}

impl Ollama {
    pub fn new(settings: OllamaSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OllamaSettings {
        &self.settings
    }

    pub fn base(&self) -> Container {
        Container::new()
            .from(self.settings.image.as_str())
            .without_entrypoint()
    }

    pub fn server(&self, model: Option<&str>) -> Service {
        let service = self
            .base()
            .with_env_variable(self.settings.host_env.as_str(), self.settings.bind_address.as_str())
            .with_exec(["ollama", "serve"])
            .with_exposed_port(self.settings.port)
            .as_service()
            .with_probe(Probe::Http {
                path: "/".to_string(),
            });

        // 伺服器就緒後先下載模型
        match model {
            Some(model) => service.with_warmup_exec(["ollama", "pull", model]),
            None => service,
        }
    }

    pub fn client(&self, model: Option<&str>) -> Container {
        self.base()
            .with_service_binding(self.settings.server_alias.as_str(), self.server(model))
            .with_env_variable(self.settings.host_env.as_str(), self.settings.server_alias.as_str())
    }

    pub fn prompt(&self, model: &str, prompt: &str) -> Container {
        self.client(Some(model))
            .with_exec(["ollama", "pull", model])
            .with_exec(["ollama", "run", model, prompt])
    }

    pub fn llama2(&self, prompt: &str) -> Container {
        self.prompt(&self.settings.model, prompt)
    }

    pub async fn run<E: Engine + ?Sized>(
        &self,
        engine: &E,
        model: Option<&str>,
        prompt: &str,
    ) -> Result<String> {
        let model = model.unwrap_or(self.settings.model.as_str());
        tracing::info!("Running prompt against model {}", model);
        self.prompt(model, prompt).stdout(engine).await
    }

    pub fn describe(
        &self,
        definition: Definition,
        model: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<String> {
        let json = match definition {
            Definition::Base => serde_json::to_string_pretty(&self.base())?,
            Definition::Server => serde_json::to_string_pretty(&self.server(model))?,
            Definition::Client => serde_json::to_string_pretty(&self.client(model))?,
            Definition::Prompt => {
                let prompt = validate_required_field("prompt", &prompt)?;
                let model = model.unwrap_or(self.settings.model.as_str());
                serde_json::to_string_pretty(&self.prompt(model, prompt))?
            }
        };
        Ok(json)
    }
}
