use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid container definition: {message}")]
    DefinitionError { message: String },

    #[error("Container has no command to execute")]
    NoExec,

    #[error("`{program} {}` exited with status {status}: {stderr}", .args.join(" "))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        status: i32,
        stderr: String,
    },

    #[error("exec {command:?} exited with status {exit_code}: {stderr}")]
    ExecFailed {
        command: Vec<String>,
        exit_code: i32,
        stderr: String,
    },

    #[error("Service '{alias}' was not ready on port {port} after {waited:?}")]
    ServiceNotReady {
        alias: String,
        port: u16,
        waited: Duration,
    },

    #[error("Pipeline interrupted before it finished")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Definition,
    Engine,
    Execution,
    Network,
    System,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl PipelineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::TomlError(_) => ErrorCategory::Configuration,
            Self::DefinitionError { .. } | Self::NoExec => ErrorCategory::Definition,
            Self::CommandFailed { .. } => ErrorCategory::Engine,
            Self::ExecFailed { .. } => ErrorCategory::Execution,
            Self::HttpError(_) | Self::ServiceNotReady { .. } => ErrorCategory::Network,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
            Self::Cancelled => ErrorCategory::Interrupted,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Configuration
            | ErrorCategory::Definition
            | ErrorCategory::Execution
            | ErrorCategory::Interrupted => ErrorSeverity::High,
            ErrorCategory::Engine | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::ExecFailed {
                command, exit_code, ..
            } => format!(
                "Command '{}' failed inside the container (exit code {})",
                command.join(" "),
                exit_code
            ),
            Self::ServiceNotReady { alias, port, .. } => {
                format!("Service '{}' never started listening on port {}", alias, port)
            }
            Self::CommandFailed { program, .. } => {
                format!("The container engine '{}' rejected a request", program)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => "Check the CLI flags and the TOML configuration file",
            ErrorCategory::Definition => "Make sure the container has a base image and at least one exec",
            ErrorCategory::Engine => "Verify the container engine is installed and its daemon is running",
            ErrorCategory::Execution => "Inspect the command's stderr; the model name may be wrong",
            ErrorCategory::Network => "Retry, or raise --ready-timeout-secs if the image is still pulling",
            ErrorCategory::System => "Check file permissions and that the engine binary is on PATH",
            ErrorCategory::Interrupted => "Run again; containers and networks created so far were removed",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_follows_category() {
        let err = PipelineError::ServiceNotReady {
            alias: "server".to_string(),
            port: 11434,
            waited: Duration::from_secs(5),
        };
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let err = PipelineError::CommandFailed {
            program: "docker".to_string(),
            args: vec!["network".to_string(), "create".to_string()],
            status: 1,
            stderr: "daemon down".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.to_string().contains("docker network create"));
    }

    #[test]
    fn test_exec_failure_message_names_command() {
        let err = PipelineError::ExecFailed {
            command: vec!["ollama".to_string(), "run".to_string(), "nope".to_string()],
            exit_code: 1,
            stderr: "model not found".to_string(),
        };
        assert_eq!(
            err.user_friendly_message(),
            "Command 'ollama run nope' failed inside the container (exit code 1)"
        );
        assert_eq!(err.severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_every_error_is_at_least_medium() {
        let errors = [
            PipelineError::NoExec,
            PipelineError::Cancelled,
            PipelineError::ConfigError {
                message: "bad".to_string(),
            },
            PipelineError::ServiceNotReady {
                alias: "server".to_string(),
                port: 11434,
                waited: Duration::from_secs(1),
            },
        ];
        for err in &errors {
            assert!(err.severity() >= ErrorSeverity::Medium, "{:?}", err);
        }
        assert_eq!(PipelineError::Cancelled.category(), ErrorCategory::Interrupted);
    }
}
