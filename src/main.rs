use anyhow::Context;
use clap::Parser;
use std::io::Write;
use ollama_pipeline::config::cli::{Command, LogFormat};
use ollama_pipeline::utils::error::{ErrorSeverity, PipelineError};
use ollama_pipeline::utils::{logger, validation::Validate};
use ollama_pipeline::{CliConfig, DockerEngine, Ollama};

fn exit_code(e: &PipelineError) -> i32 {
    if matches!(e, PipelineError::Cancelled) {
        return 130; // SIGINT
    }
    match e.severity() {
        ErrorSeverity::Medium => 2, // 可重試
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3, // 系統錯誤
    }
}

fn report(e: &PipelineError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(e));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CliConfig::parse();

    // 初始化日誌
    match config.log_format {
        LogFormat::Compact => logger::init_cli_logger(config.verbose),
        LogFormat::Json => logger::init_json_logger(config.verbose),
    }
    tracing::debug!("CLI config: {:?}", config);

    let settings = match config.resolve() {
        Ok(settings) => settings,
        Err(e) => report(&e),
    };
    if let Err(e) = settings.validate() {
        report(&e);
    }

    let ollama = Ollama::new(settings.ollama);

    match &config.command {
        Command::Describe { definition, prompt } => {
            let json = ollama
                .describe(*definition, config.model.as_deref(), prompt.as_deref())
                .unwrap_or_else(|e| report(&e));
            println!("{}", json);
        }
        Command::Run { prompt } => {
            let engine = DockerEngine::with_process_runner(settings.engine);
            tracing::info!("Starting ollama-pipeline with {}", engine.settings().binary);

            // Ctrl-C：停止目前步驟並清除已建立的容器與網路
            let shutdown = engine.shutdown_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Received Ctrl-C, shutting down");
                    shutdown.trigger();
                }
            });

            match ollama.run(&engine, None, prompt).await {
                Ok(answer) => {
                    tracing::info!("✅ Prompt completed");
                    print!("{}", answer);
                    std::io::stdout().flush().context("failed to flush stdout")?;
                }
                Err(e) => report(&e),
            }
        }
    }

    Ok(())
}
