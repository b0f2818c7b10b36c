//! Rootline server entry point

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rootline::{
    config::Args,
    server,
    store::{DocumentStore, MemoryStore, MongoStore},
};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rootline={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        return std::process::ExitCode::FAILURE;
    }

    info!("======================================");
    info!("  Rootline - family tree server");
    info!("======================================");
    info!("Listen: {}", args.listen_addr());
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    if !args.dev_mode {
        info!("MongoDB: {}", args.mongodb_uri);
    }
    info!("======================================");

    // Dev mode runs on the in-memory store; production requires MongoDB.
    let store: Arc<dyn DocumentStore> = if args.dev_mode {
        warn!("Development mode: using in-memory store, data is not persisted");
        Arc::new(MemoryStore::new())
    } else {
        match MongoStore::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                return std::process::ExitCode::FAILURE;
            }
        }
    };

    let state = match server::AppState::new(args, store) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        return std::process::ExitCode::FAILURE;
    }

    std::process::ExitCode::SUCCESS
}
