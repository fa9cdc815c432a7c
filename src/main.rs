use std::process::ExitCode;

mod app;
mod commands;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod services;
mod shutdown;
#[cfg(test)]
mod test_helpers;

use app::App;
use commands::CommandRegistry;
use config::Config;
use error::{AppError, Result};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging (warnings and errors, plus our own info events)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,gator=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let registry = CommandRegistry::with_builtin_commands();

    // Parse command line arguments
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!("Commands: {}", registry.names().join(", "));
        return Err(AppError::Usage("gator <command> [args...]"));
    };
    let command_args: Vec<String> = args.collect();

    // Load configuration
    let config = Config::load()?;
    tracing::debug!("Loaded config from {}", config.path().display());

    let (trigger, shutdown) = shutdown::channel();
    shutdown::trigger_on_ctrl_c(trigger);

    let mut app = App::new(config, shutdown).await?;
    registry.execute(&command, &command_args, &mut app).await
}
