pub mod ollama;

pub use crate::domain::model::{CommandOutput, Container, Probe, Service};
pub use crate::domain::ports::{CommandRunner, Engine};
pub use crate::utils::error::Result;
