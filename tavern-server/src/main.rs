use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use clap::Parser;

use tavern_llm::{LlmService, OllamaClient, OllamaConfig};
use tavern_server::args::Args;
use tavern_server::{ChatApi, ChatService, LlmApi, auth, logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init();

    let config = OllamaConfig::default()
        .with_base_url(&args.ollama_url)
        .with_default_model(&args.model)
        .with_timeout(Duration::from_millis(args.timeout_ms));
    let client = Arc::new(OllamaClient::new(config)?);
    let llm = LlmService::new(client, args.model.clone());

    let status = llm.test_connection().await;
    if status.success {
        tracing::info!(models = status.models.len(), "inference service reachable");
    } else {
        tracing::warn!(error = ?status.error, "inference service unreachable at startup");
    }

    let chats = Arc::new(ChatService::new(llm.clone()));
    let app = Arc::new(LlmApi::new(llm))
        .router()
        .merge(Arc::new(ChatApi::new(chats)).router())
        .route("/api/health", get(|| async { "ok" }))
        .layer(axum::middleware::from_fn(auth::identity_layer));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!(%addr, "serving tavern api");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
