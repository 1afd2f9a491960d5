#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli::CliConfig;
pub use toml_config::TomlConfig;

use crate::adapters::docker::EngineSettings;
use crate::core::ollama::OllamaSettings;
use crate::utils::error::Result;
use crate::utils::validation::Validate;

/// Fully resolved configuration: defaults, then the TOML file, then CLI flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub ollama: OllamaSettings,
    pub engine: EngineSettings,
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.ollama.validate()?;
        self.engine.validate()
    }
}
