#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, middleware, Extension, Router};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use farmgate_api::auth::{AuthService, Claims};
use farmgate_api::config::AppConfig;
use farmgate_api::errors::ServiceError;
use farmgate_api::events::{self, EventSender};
use farmgate_api::handlers::AppServices;
use farmgate_api::migrator::Migrator;
use farmgate_api::services::carts::CartService;
use farmgate_api::services::checkout::CheckoutService;
use farmgate_api::services::gateway::{GatewayChargeRequest, GatewaySession, PaymentGateway};
use farmgate_api::services::orders::OrderService;
use farmgate_api::services::pending_payments::{InMemoryLedgerStore, PendingPaymentLedger};
use farmgate_api::{api_v1_routes, health_routes, AppState};
use sea_orm_migration::MigratorTrait;

const TEST_JWT_SECRET: &str = "test-secret-test-secret-test-secret!";

/// Scripted stand-in for the hosted gateway. Succeeds by default; flip
/// `fail_next` to script a rejection. Every request is recorded.
pub struct StubGateway {
    pub requests: Mutex<Vec<GatewayChargeRequest>>,
    pub fail_next: Mutex<bool>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
        }
    }

    pub async fn fail_next_session(&self) {
        *self.fail_next.lock().await = true;
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_session(
        &self,
        request: &GatewayChargeRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.requests.lock().await.push(request.clone());
        if std::mem::take(&mut *self.fail_next.lock().await) {
            return Err(ServiceError::GatewayError(
                "Session rejected: scripted failure".to_string(),
            ));
        }
        Ok(GatewaySession {
            session_key: Some("stub-session".to_string()),
            redirect_url: format!("https://pay.test/session/{}", request.tran_id),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<DatabaseConnection>,
    pub ledger: PendingPaymentLedger,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // One pooled connection so every query sees the same in-memory db.
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.expect("connect sqlite");
        Migrator::up(&db, None).await.expect("run migrations");
        let db = Arc::new(db);

        let ledger = PendingPaymentLedger::new(Arc::new(InMemoryLedgerStore::new()));
        let gateway = Arc::new(StubGateway::new());

        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        tokio::spawn(events::process_events(rx));

        let mut config = AppConfig::new(
            "sqlite::memory:",
            "redis://127.0.0.1:6379",
            TEST_JWT_SECRET,
            "127.0.0.1",
            0,
            "development",
        );
        config.gateway.app_return_url = "https://app.test/orders".to_string();
        config.gateway.ipn_secret = Some("test-ipn-secret".to_string());

        let orders = OrderService::new(db.clone(), Some(event_sender.clone()));
        let carts = CartService::new(db.clone(), Some(event_sender.clone()));
        let checkout = CheckoutService::new(
            orders.clone(),
            carts.clone(),
            gateway.clone(),
            ledger.clone(),
            config.gateway.currency.clone(),
            Some(event_sender.clone()),
        );

        let state = AppState {
            db: db.clone(),
            config: Arc::new(config),
            event_sender,
            services: AppServices {
                orders,
                carts,
                checkout,
                ledger: ledger.clone(),
            },
        };

        let auth_service = Arc::new(AuthService::new(TEST_JWT_SECRET));
        let router = Router::new()
            .merge(health_routes())
            .nest("/api/v1", api_v1_routes())
            .layer(Extension(auth_service))
            .layer(middleware::from_fn(
                farmgate_api::tracing::request_id_middleware,
            ))
            .with_state(state);

        Self {
            router,
            db,
            ledger,
            gateway,
        }
    }

    pub fn token_for(&self, customer_id: Uuid) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: customer_id.to_string(),
            exp: (now + 3600) as usize,
            iat: now as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
        )
        .expect("encode token")
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (axum::http::StatusCode, Value, axum::http::HeaderMap) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("send request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json, headers)
    }

    pub async fn request_form(
        &self,
        method: &str,
        uri: &str,
        form_body: &str,
        signature: Option<&str>,
    ) -> (axum::http::StatusCode, Value, axum::http::HeaderMap) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded");
        if let Some(sig) = signature {
            builder = builder.header("x-gateway-signature", sig);
        }
        let request = builder.body(Body::from(form_body.to_string())).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("send request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json, headers)
    }

    /// Seeds the customer's cart through the API.
    pub async fn add_cart_item(
        &self,
        token: &str,
        name: &str,
        unit_price: &str,
        quantity: i32,
    ) -> Value {
        let (status, body, _) = self
            .request(
                "POST",
                "/api/v1/cart/items",
                Some(token),
                Some(serde_json::json!({
                    "product_id": Uuid::new_v4(),
                    "shop_id": Uuid::new_v4(),
                    "farmer_id": Uuid::new_v4(),
                    "name": name,
                    "unit_label": "kg",
                    "unit_price": unit_price,
                    "quantity": quantity,
                })),
            )
            .await;
        assert_eq!(status, axum::http::StatusCode::OK, "add_cart_item: {}", body);
        body
    }

    pub fn sign_ipn(body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let mut mac =
            Hmac::<Sha256>::new_from_slice(b"test-ipn-secret").expect("hmac key");
        mac.update(body.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
