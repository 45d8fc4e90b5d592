use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use sena_relay::config::RelayConfig;
use sena_relay::server::{self, AppState};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // A missing .env is fine; the variables may come from the real environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("FATAL: invalid configuration: {e}");
            tracing::error!("Set the variable in the environment or in a .env file next to the binary.");
            std::process::exit(1);
        }
    };

    let state = web::Data::new(AppState::from_config(config));
    let config = Arc::clone(&state.config);

    tracing::info!(
        mode = %config.mode,
        upstream = %config.upstream_url,
        model = %config.generation.model,
        timeout_secs = config.upstream_timeout.as_secs(),
        rate_limit = config.rate_limit.max_requests,
        rate_window_secs = config.rate_limit.window.as_secs(),
        "Relay configured"
    );
    if config.mode.is_production() {
        tracing::info!("CORS restricted to: {}", config.allowed_origins.join(", "));
    } else {
        tracing::warn!("Development mode: CORS accepts any origin, errors include upstream details");
    }

    let limiter = Arc::clone(&state.limiter);
    let window = config.rate_limit.window;
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, tracked = limiter.tracked_keys(), "Purged expired rate-limit windows");
            }
        }
    });

    let bind = (config.host.clone(), config.port);
    tracing::info!("Sena relay listening on http://{}:{}", bind.0, bind.1);
    tracing::info!("Ready to receive requests at http://{}:{}/api/chat", bind.0, bind.1);

    let app_config = Arc::clone(&config);
    HttpServer::new(move || {
        let config = Arc::clone(&app_config);
        App::new()
            .app_data(state.clone())
            .wrap(server::cors(&config))
            .configure(|cfg| server::configure(cfg, &config))
    })
    .bind(bind)?
    .shutdown_timeout(config.upstream_timeout.as_secs() + 5)
    .run()
    .await?;

    tracing::info!("Relay stopped");
    Ok(())
}
