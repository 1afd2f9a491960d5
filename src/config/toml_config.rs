use crate::adapters::docker::EngineSettings;
use crate::config::Settings;
use crate::core::ollama::OllamaSettings;
use crate::utils::error::{PipelineError, Result};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub ollama: OllamaSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaSection {
    pub image: Option<String>,
    pub port: Option<u16>,
    pub model: Option<String>,
    pub host_env: Option<String>,
    pub bind_address: Option<String>,
    pub server_alias: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSection {
    pub binary: Option<String>,
    pub network_prefix: Option<String>,
    pub ready_timeout_seconds: Option<u64>,
    pub ready_interval_millis: Option<u64>,
    pub keep_intermediate: Option<bool>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${OLLAMA_IMAGE})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| PipelineError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 以預設值為基礎套用檔案中的設定
    pub fn to_settings(&self) -> Settings {
        let mut settings = Settings::default();
        self.apply_to(&mut settings);
        settings
    }

    pub fn apply_to(&self, settings: &mut Settings) {
        let ollama: &mut OllamaSettings = &mut settings.ollama;
        if let Some(image) = &self.ollama.image {
            ollama.image = image.clone();
        }
        if let Some(port) = self.ollama.port {
            ollama.port = port;
        }
        if let Some(model) = &self.ollama.model {
            ollama.model = model.clone();
        }
        if let Some(host_env) = &self.ollama.host_env {
            ollama.host_env = host_env.clone();
        }
        if let Some(bind_address) = &self.ollama.bind_address {
            ollama.bind_address = bind_address.clone();
        }
        if let Some(server_alias) = &self.ollama.server_alias {
            ollama.server_alias = server_alias.clone();
        }

        let engine: &mut EngineSettings = &mut settings.engine;
        if let Some(binary) = &self.engine.binary {
            engine.binary = binary.clone();
        }
        if let Some(prefix) = &self.engine.network_prefix {
            engine.network_prefix = prefix.clone();
        }
        if let Some(secs) = self.engine.ready_timeout_seconds {
            engine.ready_timeout = Duration::from_secs(secs);
        }
        if let Some(millis) = self.engine.ready_interval_millis {
            engine.ready_interval = Duration::from_millis(millis);
        }
        if let Some(keep) = self.engine.keep_intermediate {
            engine.keep_intermediate = keep;
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.to_settings().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[ollama]
image = "registry.local/ollama:0.1.32"
port = 11500
model = "mistral"
server_alias = "llm"

[engine]
binary = "podman"
ready_timeout_seconds = 60
ready_interval_millis = 250
keep_intermediate = true
"#;

        let settings = TomlConfig::from_toml_str(toml_content).unwrap().to_settings();

        assert_eq!(settings.ollama.image, "registry.local/ollama:0.1.32");
        assert_eq!(settings.ollama.port, 11500);
        assert_eq!(settings.ollama.model, "mistral");
        assert_eq!(settings.ollama.server_alias, "llm");
        assert_eq!(settings.ollama.host_env, "OLLAMA_HOST");
        assert_eq!(settings.engine.binary, "podman");
        assert_eq!(settings.engine.ready_timeout, Duration::from_secs(60));
        assert_eq!(settings.engine.ready_interval, Duration::from_millis(250));
        assert!(settings.engine.keep_intermediate);
    }

    #[test]
    fn test_empty_config_yields_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.to_settings(), Settings::default());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("OLLAMA_PIPELINE_TEST_MODEL", "phi3");

        let toml_content = r#"
[ollama]
model = "${OLLAMA_PIPELINE_TEST_MODEL}"
image = "${OLLAMA_PIPELINE_TEST_UNSET_IMAGE}"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.ollama.model.as_deref(), Some("phi3"));
        assert_eq!(
            config.ollama.image.as_deref(),
            Some("${OLLAMA_PIPELINE_TEST_UNSET_IMAGE}")
        );

        std::env::remove_var("OLLAMA_PIPELINE_TEST_MODEL");
    }

    #[test]
    fn test_config_validation() {
        let config = TomlConfig::from_toml_str(
            r#"
[ollama]
host_env = "NOT-VALID"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = TomlConfig::from_toml_str(
            r#"
[engine]
ready_timeout_seconds = 0
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[ollama\nport = 1").unwrap_err();
        assert!(matches!(err, PipelineError::TomlError(_)));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[ollama]\nmodel = \"gemma\"\n")
            .unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.ollama.model.as_deref(), Some("gemma"));

        assert!(TomlConfig::from_file("/nonexistent/ollama-pipeline.toml").is_err());
    }
}
