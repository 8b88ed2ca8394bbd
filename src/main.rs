use axum::{http::HeaderValue, middleware, Extension, Router};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use farmgate_api::auth::AuthService;
use farmgate_api::config;
use farmgate_api::db;
use farmgate_api::events::{self, EventSender};
use farmgate_api::handlers::AppServices;
use farmgate_api::services::carts::CartService;
use farmgate_api::services::checkout::CheckoutService;
use farmgate_api::services::gateway::HostedGateway;
use farmgate_api::services::orders::OrderService;
use farmgate_api::services::pending_payments::{
    InMemoryLedgerStore, LedgerStore, PendingPaymentLedger, RedisLedgerStore,
};
use farmgate_api::{api_v1_routes, health_routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config()?;
    config::init_tracing(&app_config.log_level, app_config.log_json);

    info!(
        "Starting {} v{} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        app_config.environment
    );

    let db_pool = Arc::new(db::establish_connection_from_app_config(&app_config).await?);
    if app_config.auto_migrate {
        info!("Running database migrations");
        db::run_migrations(&db_pool).await?;
    }

    let ledger_store: Arc<dyn LedgerStore> = match redis::Client::open(app_config.redis_url.as_str())
    {
        Ok(client) => Arc::new(RedisLedgerStore::new(client)),
        Err(e) => {
            // Dev fallback only; pending payments will not survive restarts.
            warn!("Redis unavailable ({}), using in-memory ledger", e);
            Arc::new(InMemoryLedgerStore::new())
        }
    };
    let ledger = PendingPaymentLedger::new(ledger_store);

    let (event_tx, event_rx) = mpsc::channel(app_config.event_channel_capacity);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    let gateway = Arc::new(HostedGateway::new(app_config.gateway.clone())?);

    let orders = OrderService::new(db_pool.clone(), Some(event_sender.clone()));
    let carts = CartService::new(db_pool.clone(), Some(event_sender.clone()));
    let checkout = CheckoutService::new(
        orders.clone(),
        carts.clone(),
        gateway,
        ledger.clone(),
        app_config.gateway.currency.clone(),
        Some(event_sender.clone()),
    );

    let services = AppServices {
        orders,
        carts,
        checkout,
        ledger,
    };

    let auth_service = Arc::new(AuthService::new(&app_config.jwt_secret));

    let state = AppState {
        db: db_pool.clone(),
        config: Arc::new(app_config.clone()),
        event_sender,
        services,
    };

    let cors = build_cors_layer(&app_config);

    let app = Router::new()
        .merge(health_routes())
        .nest("/api/v1", api_v1_routes())
        .layer(Extension(auth_service))
        .layer(middleware::from_fn(
            farmgate_api::tracing::request_id_middleware,
        ))
        .layer(farmgate_api::tracing::configure_http_tracing())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete, closing database pool");
    if let Err(e) = db::close_pool((*db_pool).clone()).await {
        error!("Error closing database pool: {}", e);
    }

    Ok(())
}

fn build_cors_layer(config: &config::AppConfig) -> CorsLayer {
    if config.should_allow_permissive_cors() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install ctrl-c handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
