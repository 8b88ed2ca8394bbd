use axum::{
    body::Bytes,
    extract::{Form, Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
    Router,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::{ApiError, ServiceError};
use crate::handlers::common::{map_service_error, no_content_response, success_response};
use crate::services::pending_payments::PendingPaymentKind;
use crate::AppState;

const SIGNATURE_HEADER: &str = "x-gateway-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/callback/success",
            get(success_callback_get).post(success_callback_post),
        )
        .route(
            "/callback/fail",
            get(fail_callback_get).post(fail_callback_post),
        )
        .route(
            "/callback/cancel",
            get(cancel_callback_get).post(cancel_callback_post),
        )
        .route("/ipn", post(ipn))
        .route("/pending", get(list_pending).delete(clear_all_pending))
        .route("/pending/:order_id", delete(clear_pending))
}

// The gateway redirects the customer with GET in some integrations and posts
// a form in others; both carry the same field names.

async fn success_callback_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    handle_success(state, params).await
}

async fn success_callback_post(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    handle_success(state, params).await
}

async fn fail_callback_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_fail(state, params).await
}

async fn fail_callback_post(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_fail(state, params).await
}

async fn cancel_callback_get(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_cancel(state, params).await
}

async fn cancel_callback_post(
    State(state): State<AppState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    handle_cancel(state, params).await
}

/// Settles the order named by `tran_id` after the customer came back from a
/// successful gateway page. The raw callback block is stored on the order for
/// audit; the pending record decides full vs advance settlement.
#[instrument(skip(state, params))]
async fn handle_success(
    state: AppState,
    params: HashMap<String, String>,
) -> Result<Redirect, ApiError> {
    let tran_id = params
        .get("tran_id")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| {
            map_service_error(ServiceError::MissingData(
                "Callback is missing tran_id".to_string(),
            ))
        })?;

    let status = params.get("status").map(String::as_str).unwrap_or("");
    if status != "VALID" {
        warn!(
            "Success callback for {} carried non-VALID status {:?}",
            tran_id, status
        );
        return Err(map_service_error(ServiceError::ValidationError(format!(
            "Unexpected gateway status: {}",
            status
        ))));
    }

    match settle(&state, &tran_id, &params).await {
        Ok(order_number) => Ok(redirect_to_app(
            &state,
            &[("payment", "success"), ("order", &order_number)],
        )),
        Err(ServiceError::NotFound(msg)) => {
            // No order to reconcile against; surface it, never auto-create.
            warn!("Success callback for unknown order {}: {}", tran_id, msg);
            Err(map_service_error(ServiceError::NotFound(msg)))
        }
        Err(e) => {
            // The customer paid; show them their orders rather than an error
            // page and let IPN or support finish the reconciliation.
            error!("Failed to settle order {}: {}", tran_id, e);
            Ok(redirect_to_app(
                &state,
                &[("payment", "error"), ("order", &tran_id)],
            ))
        }
    }
}

async fn settle(
    state: &AppState,
    tran_id: &str,
    params: &HashMap<String, String>,
) -> Result<String, ServiceError> {
    let kind = match state.services.ledger.lookup(tran_id).await? {
        Some(record) => record.kind,
        None => {
            // Record already cleared (redirect raced IPN) or lost; infer the
            // leg from the order itself.
            let order = state.services.orders.get_order_by_number(tran_id).await?;
            match order.payment_status {
                crate::entities::order::PaymentStatus::AdvancePending => {
                    PendingPaymentKind::Advance
                }
                _ => PendingPaymentKind::Full,
            }
        }
    };

    let payload = json!(params);
    let order = state
        .services
        .orders
        .apply_payment_success(tran_id, kind, payload)
        .await?;
    state.services.ledger.clear(tran_id).await?;

    info!(
        "Settled order {} ({:?}) via callback",
        order.order_number, kind
    );
    Ok(order.order_number)
}

/// Presentational: the payment did not go through, but the order (and the
/// customer's cart, on abandonment) stays as the lifecycle left it. Only the
/// pending record is dropped.
#[instrument(skip(state, params))]
async fn handle_fail(state: AppState, params: HashMap<String, String>) -> Redirect {
    let tran_id = params.get("tran_id").cloned().unwrap_or_default();
    let reason = params
        .get("failedreason")
        .or_else(|| params.get("error"))
        .cloned()
        .unwrap_or_else(|| "Payment failed".to_string());

    warn!("Payment failed for {:?}: {}", tran_id, reason);

    if !tran_id.is_empty() {
        if let Err(e) = state.services.ledger.clear(&tran_id).await {
            error!("Failed to clear pending record for {}: {}", tran_id, e);
        }
    }

    redirect_to_app(
        &state,
        &[("payment", "failed"), ("order", &tran_id), ("reason", &reason)],
    )
}

#[instrument(skip(state, params))]
async fn handle_cancel(state: AppState, params: HashMap<String, String>) -> Redirect {
    let tran_id = params.get("tran_id").cloned().unwrap_or_default();
    info!("Payment cancelled by customer for {:?}", tran_id);

    if !tran_id.is_empty() {
        if let Err(e) = state.services.ledger.clear(&tran_id).await {
            error!("Failed to clear pending record for {}: {}", tran_id, e);
        }
    }

    redirect_to_app(&state, &[("payment", "cancelled"), ("order", &tran_id)])
}

/// Server-to-server notification. Authoritative like the success redirect,
/// but also the place where definitive failures are recorded, since the
/// customer may never come back through the browser.
#[instrument(skip(state, headers, body))]
async fn ipn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(secret) = &state.config.gateway.ipn_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                map_service_error(ServiceError::AuthError(
                    "Missing IPN signature".to_string(),
                ))
            })?;
        if !verify_signature(secret, &body, signature) {
            warn!("IPN signature verification failed");
            return Err(map_service_error(ServiceError::AuthError(
                "Invalid IPN signature".to_string(),
            )));
        }
    }

    let params: HashMap<String, String> = serde_urlencoded::from_bytes(&body).map_err(|e| {
        map_service_error(ServiceError::ValidationError(format!(
            "Malformed IPN body: {}",
            e
        )))
    })?;

    let tran_id = params
        .get("tran_id")
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| {
            map_service_error(ServiceError::MissingData(
                "IPN is missing tran_id".to_string(),
            ))
        })?;

    let status = params.get("status").map(String::as_str).unwrap_or("");
    match status {
        "VALID" | "VALIDATED" => {
            settle(&state, &tran_id, &params)
                .await
                .map_err(map_service_error)?;
        }
        "FAILED" | "CANCELLED" => {
            let cancelled = status == "CANCELLED";
            let reason = params.get("failedreason").cloned();
            state
                .services
                .orders
                .mark_payment_failed(&tran_id, cancelled, Some(json!(params)), reason)
                .await
                .map_err(map_service_error)?;
            if let Err(e) = state.services.ledger.clear(&tran_id).await {
                error!("Failed to clear pending record for {}: {}", tran_id, e);
            }
        }
        other => {
            warn!("IPN for {} with unhandled status {:?}", tran_id, other);
        }
    }

    Ok(success_response(json!({ "acknowledged": true })))
}

fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    // Constant-time enough for a hex string comparison of fixed length.
    expected.eq_ignore_ascii_case(signature)
}

fn redirect_to_app(state: &AppState, params: &[(&str, &str)]) -> Redirect {
    let query = serde_urlencoded::to_string(params).unwrap_or_default();
    let base = state.config.gateway.app_return_url.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{}{}{}", base, separator, query))
}

async fn list_pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .services
        .ledger
        .list_for_customer(user.customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({
        "pending": records,
        "total": records.len(),
    })))
}

async fn clear_pending(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let records = state
        .services
        .ledger
        .list_for_customer(user.customer_id)
        .await
        .map_err(map_service_error)?;
    let record = records
        .into_iter()
        .find(|r| r.order_id == order_id)
        .ok_or_else(|| {
            map_service_error(ServiceError::NotFound(format!(
                "No pending payment for order {}",
                order_id
            )))
        })?;

    state
        .services
        .ledger
        .clear(&record.order_number)
        .await
        .map_err(map_service_error)?;
    Ok(no_content_response())
}

async fn clear_all_pending(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .services
        .ledger
        .clear_all_for_customer(user.customer_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_check_accepts_the_matching_hmac() {
        let secret = "ipn-secret";
        let body = b"tran_id=FG-1-aaaa&status=VALID";
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, body, &sig));
        assert!(verify_signature(secret, body, &sig.to_uppercase()));
        assert!(!verify_signature(secret, body, "deadbeef"));
        assert!(!verify_signature("other", body, &sig));
    }
}
