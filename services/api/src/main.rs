use axum::{Router, routing::get};
use config::Config;
use connection::{AppState, ws_handler};
use docchat_core::ToolRegistry;
use docchat_core::knowledge::{HttpKnowledgeBase, QueryDocumentsTool};
use docchat_realtime::StreamClient;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

mod config;
mod connection;
mod protocol;

async fn health() -> &'static str {
    "ok"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Initialize the tracing subscriber for logging.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let lookup = Arc::new(HttpKnowledgeBase::new(&config.knowledge_base_url));
    let tools = ToolRegistry::new().with_tool(Arc::new(
        QueryDocumentsTool::new(lookup)
            .with_top_k(config.kb_top_k)
            .with_excerpt_chars(config.kb_excerpt_chars),
    ));

    let mut stream_config = docchat_realtime::Config::builder()
        .with_base_url(&config.model_stream_url)
        .with_model(&config.model_id)
        .with_handshake_timeout(config.handshake_timeout);
    if let Some(api_key) = &config.model_api_key {
        stream_config = stream_config.with_api_key(api_key);
    }
    info!(
        "model stream at {}, model {}",
        config.model_stream_url, config.model_id
    );

    let state = Arc::new(AppState {
        client: StreamClient::from_config(stream_config.build()),
        tools: Arc::new(tools),
        settings: config.session_settings(),
        default_voice_id: config.default_voice_id.clone(),
    });

    // Configure a permissive CORS policy to allow connections from any origin.
    // This is necessary for a separate frontend to connect to the WebSocket API.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state);

    info!("Starting WebSocket server, listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
