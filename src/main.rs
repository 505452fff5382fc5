use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memeit::api::{self, ApiState};
use memeit::broadcast::{self, BroadcastPublisher};
use memeit::config::EngineConfig;
use memeit::state::AppState;
use memeit::store::{GameRepository, InMemoryGameRepository, JsonFileGameRepository};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memeit=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Meme-It game server...");

    let config = EngineConfig::from_env();

    let repository: Arc<dyn GameRepository> = match &config.data_dir {
        Some(dir) => match JsonFileGameRepository::open(dir).await {
            Ok(repo) => Arc::new(repo),
            Err(e) => {
                tracing::error!("Failed to open data directory {}: {}", dir.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            tracing::info!("MEMEIT_DATA_DIR not set, games are kept in memory only");
            Arc::new(InMemoryGameRepository::new())
        }
    };

    let relay = BroadcastPublisher::new();
    let port = config.port;
    let state = Arc::new(AppState::new(
        config,
        repository,
        Arc::new(relay.clone()),
    ));

    // Spawn background task applying fired phase deadlines
    broadcast::spawn_task_dispatcher(state.clone());

    // Spawn background task deleting idle games
    broadcast::spawn_idle_reaper(state.clone());

    if let Err(e) = state.restore_sessions().await {
        tracing::warn!("Failed to restore running games: {}", e);
    }

    let app = api::router(ApiState {
        engine: state,
        relay,
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
