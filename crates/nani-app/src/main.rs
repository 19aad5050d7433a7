use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;

mod cli;
mod controller;
mod logging;
mod oneshot;
mod routes;
mod server;
mod settings;
mod state;

#[cfg(test)]
mod tests;

use self::cli::{Cli, Command, ServeArgs};
use self::controller::AppController;
use self::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logging::init();

    let mut config = settings::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => {
            settings::apply_serve_args(&mut config, &args);

            let backend = nani_translator::build_backend(&config.translator)
                .context("Failed to set up the translation backend")?;
            let metadata = backend.metadata();
            tracing::info!("Using {} ({})", metadata.name, metadata.model);

            let state = Arc::new(AppState::new(config, backend));

            // Shutdown future (Ctrl+C)
            let shutdown = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl+c: {e}");
                    std::future::pending::<()>().await;
                }
            };

            AppController::new(state).run(shutdown).await
        }
        Command::Translate(args) => oneshot::translate(&config, args).await,
        Command::History(args) => oneshot::history(&config, &args),
    }
}
