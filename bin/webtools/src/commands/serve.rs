use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use webtools_core::Paths;
use webtools_tools::mcp::McpServer;
use webtools_tools::ToolRegistry;

pub async fn run(host: Option<String>, port: Option<u16>, stdio: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = super::load_config(&paths)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let ctx = super::build_context(config, &paths)?;
    let session = ctx.session.clone();
    if !ctx.summarizer.is_configured() {
        info!("Summarization disabled, the summarize tool will report an error");
    }

    let server = Arc::new(McpServer::new(ToolRegistry::with_defaults(), ctx));

    let result = if stdio {
        serve_stdio(server).await
    } else {
        serve_http(server, &host, port).await
    };

    // The browser is process-wide; release it whichever way the transport ended.
    session.close().await;
    info!("Server stopped");
    result
}

async fn serve_stdio(server: Arc<McpServer>) -> anyhow::Result<()> {
    info!("MCP server speaking JSON-RPC on stdio");
    tokio::select! {
        res = server.serve_stdio(tokio::io::stdin(), tokio::io::stdout()) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }
    Ok(())
}

async fn serve_http(server: Arc<McpServer>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(server);

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "MCP server listening (POST /mcp)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

async fn handle_mcp(State(server): State<Arc<McpServer>>, body: String) -> Response {
    match server.handle_message(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn handle_health(State(server): State<Arc<McpServer>>) -> Json<Value> {
    let ctx = server.context();
    Json(json!({
        "status": "ok",
        "browserInitializing": ctx.session.is_initializing(),
        "summarizer": ctx.summarizer.engine_name(),
    }))
}
