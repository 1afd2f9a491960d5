use crate::domain::model::{CommandOutput, Container};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Runs a program to completion and captures its output.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> impl std::future::Future<Output = Result<CommandOutput>> + Send;
}

/// Turns a container description into running processes.
///
/// `stdout` starts every bound service, runs the container's execs in order
/// and returns what the last one printed. Services live only for the duration
/// of the call.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn stdout(&self, container: &Container) -> Result<String>;
}
