mod config;
mod routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let config = config::read().await?;
    tracing::info!(
        db = config.db.as_ref().map(|v| v.database.as_str()),
        export = config.export.service_url.as_deref(),
        "starting diet api",
    );

    let app = routes::make_router(&config).await;

    let listener = tokio::net::TcpListener::bind((config.server.address, config.server.port)).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve::serve(listener, app)
        .with_graceful_shutdown(shutdown())
    .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("could not listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
