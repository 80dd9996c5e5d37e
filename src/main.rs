use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use greeting_cache::app::{App, AppState};
use greeting_cache::config::Settings;
use greeting_cache::server::{Server, shutdown_signal};
use greeting_cache::{cache, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    telemetry::init(&settings.logging).context("failed to initialise logging")?;

    let cache = cache::open(&settings.cache)
        .await
        .context("failed to open the distributed cache")?;
    info!(backend = ?settings.cache.backend, "cache ready");

    let app = Arc::new(App::new(AppState::new(cache, settings.server.route.as_str())));
    let server = Server::bind(&settings.server.listen_addr).await?;
    info!(route = %app.state().route(), "greeting endpoint registered");

    let handler_app = Arc::clone(&app);
    server
        .run(
            move |req| {
                let app = Arc::clone(&handler_app);
                async move { app.handle(req).await }
            },
            shutdown_signal(),
        )
        .await?;

    // Last reference to the cache handle; dropping it closes the connection.
    drop(app);
    info!("cache connection released");
    Ok(())
}
