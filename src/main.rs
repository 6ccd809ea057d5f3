use anyhow::{Context, Result};
use aurum_api::auth::JwtSecret;
use aurum_api::config::{init_tracing, load_config};
use aurum_api::stripe::{PaymentGateway, StripeClient};
use aurum_api::{db, handlers, openapi, AppState};
use axum::http::{HeaderValue, Method};
use axum::{routing::get, Extension, Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        port = config.port,
        "Starting aurum-api"
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );

    if config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("database migration failed")?;
    }

    let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
        Some(key) => Arc::new(StripeClient::new(key.clone())),
        None => {
            warn!("No Stripe secret key configured; checkout session creation will fail");
            Arc::new(StripeClient::new(String::new()))
        }
    };

    let config = Arc::new(config);
    let state = AppState::new(db, config.clone(), gateway);

    spawn_sweep_task(&state);

    let cors = cors_layer(config.cors_allowed_origins.as_deref());

    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .nest("/api/v1", handlers::api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(Extension(JwtSecret(config.jwt_secret.clone())))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down cleanly");
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Periodic reconciliation sweep. Disabled when the interval is zero; the
/// HTTP trigger remains available either way.
fn spawn_sweep_task(state: &AppState) {
    let interval_secs = state.config.sweep_interval_secs;
    if interval_secs == 0 {
        info!("Scheduled reconciliation sweep disabled");
        return;
    }

    let reconciliation = state.services.reconciliation.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reconciliation.sweep_pending().await {
                Ok(summary) => {
                    if summary.synced > 0 || summary.failed > 0 {
                        info!(
                            synced = summary.synced,
                            failed = summary.failed,
                            "Scheduled sweep applied transitions"
                        );
                    }
                }
                Err(e) => error!(error = %e, "Scheduled sweep failed"),
            }
        }
    });
}

fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

    match allowed_origins {
        Some(origins) if !origins.trim().is_empty() => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(methods)
                .allow_headers(Any)
        }
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
