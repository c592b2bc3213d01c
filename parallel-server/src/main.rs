//! parallel-server — HTTP/WebSocket boundary for the orchestration engine.
//!
//! Exposes the engine over two transports: `POST /chat_completion` returns
//! a Server-Sent Events stream, `GET /ws` upgrades to a WebSocket carrying
//! one JSON event per message.

use axum::body::Body;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use parallel_core::{
    create_provider, load_config, sse_stream, Message, ParallelEngine, SseTransport,
    TransportAdapter, WebSocketTransport,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Parallel: concurrent research over one query
#[derive(Parser, Debug)]
#[command(name = "parallel-server", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind host (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<ParallelEngine>,
}

/// Body accepted by both transports.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<Message>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let mut config = load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    for warning in config.validate() {
        warn!("{warning}");
    }

    let provider =
        create_provider(&config.llm).map_err(|e| anyhow::anyhow!("Provider setup failed: {}", e))?;
    let engine = Arc::new(ParallelEngine::new(provider, config.engine.clone()));
    let app = router(AppState { engine });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr = addr.as_str(), model = config.llm.model.as_str(), "Starting parallel-server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum Router with all routes and middleware.
fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome_handler))
        .route("/health", get(health_handler))
        .route("/chat_completion", post(chat_completion_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn welcome_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "parallel-server",
        "message": "POST /chat_completion for SSE, connect to /ws for WebSocket",
    }))
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// SSE transport: spawn the run, stream framed events back as the body.
async fn chat_completion_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    let (transport, rx) = SseTransport::new(256);
    let transport: Arc<dyn TransportAdapter> = Arc::new(transport);

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.process_query(request.messages, transport).await {
            warn!(error = %e, "chat_completion run failed");
        }
    });

    let body = Body::from_stream(sse_stream(rx).map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.engine.clone()))
}

/// Read one chat request off the socket, run it, forward every event as
/// a text frame, then close.
async fn handle_socket(mut socket: WebSocket, engine: Arc<ParallelEngine>) {
    let request: ChatRequest = loop {
        match socket.recv().await {
            Some(Ok(WsMessage::Text(text))) => match serde_json::from_str(&text) {
                Ok(request) => break request,
                Err(e) => {
                    let err = serde_json::json!({
                        "type": "error",
                        "content": format!("Invalid request: {}", e),
                    });
                    if socket.send(WsMessage::Text(err.to_string().into())).await.is_err() {
                        return;
                    }
                }
            },
            Some(Ok(WsMessage::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(_)) => return,
        }
    };

    let (transport, mut rx) = WebSocketTransport::new(256);
    let transport: Arc<dyn TransportAdapter> = Arc::new(transport);
    let run = tokio::spawn(async move { engine.process_query(request.messages, transport).await });

    while let Some(message) = rx.recv().await {
        if socket.send(WsMessage::Text(message.into())).await.is_err() {
            // Client went away; the run notices on its next send.
            break;
        }
    }

    if let Ok(Err(e)) = run.await {
        warn!(error = %e, "WebSocket run failed");
    }
    let _ = socket.close().await;
}
