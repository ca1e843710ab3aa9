use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = aigw_gateway::GatewayConfig::from_env().context("loading configuration")?;
    let bind = format!("{}:{}", config.host, config.port);

    let orchestrator = aigw_gateway::facade::initialize(config).await.context("initializing gateway")?;
    let app = aigw_gateway::http::router(orchestrator.clone());

    let listener = tokio::net::TcpListener::bind(&bind).await.with_context(|| format!("binding {bind}"))?;
    tracing::info!(event = "listening", addr = %bind);

    let shutdown_orchestrator = orchestrator.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!(event = "shutdown_signal_received");
            shutdown_orchestrator.shutdown().await;
        })
        .await
        .context("serving http")?;

    Ok(())
}
