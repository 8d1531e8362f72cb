use anyhow::Context;
use clap::Parser;

use tokengate_api::config::{Args, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args).context("failed to load configuration")?;

    tokengate_observability::init(config.log.format);

    let bind_address = config.bind_address();
    let app = tokengate_api::app::build_app(config)?;

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
