//! distributable-session binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use distributable_session::{
    api, cli, config::Config, logging, DistributableSessionManagerFactory, InMemorySessionStore,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Run with --help for usage.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init_with_filter(config.log_filter()) {
        eprintln!("warning: logging already initialized: {e}");
    }

    info!("distributable-session v{}", env!("CARGO_PKG_VERSION"));

    let server_config = match config.to_server_config() {
        Ok(server_config) => server_config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = Arc::new(InMemorySessionStore::new());
    let factory = DistributableSessionManagerFactory::new(Arc::clone(&store));
    let manager = factory.create_session_manager(config.to_manager_config());

    let sweeper = config
        .expiration_interval()
        .map(|period| store.spawn_expiration_task(period));

    let result = api::serve(server_config, manager, shutdown_signal()).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    match result {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
