mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::TestApp;

async fn place_online_order(app: &TestApp, token: &str) -> String {
    app.add_cart_item(token, "Tomatoes", "100.00", 10).await;
    let (status, body, _) = app
        .request(
            "POST",
            "/api/v1/checkout",
            Some(token),
            Some(json!({
                "payment_method": "online_payment",
                "delivery_address": "12 Green Road, Dhaka",
                "customer_name": "Anika Rahman",
                "customer_email": "anika@example.com",
                "customer_phone": "01711111111",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["order"]["order_number"].as_str().unwrap().to_string()
}

async fn place_advance_order(app: &TestApp, token: &str) -> String {
    app.add_cart_item(token, "Rice", "100.00", 10).await;
    let (status, body, _) = app
        .request(
            "POST",
            "/api/v1/checkout",
            Some(token),
            Some(json!({
                "payment_method": "cash_on_delivery",
                "pay_advance_online": true,
                "delivery_address": "12 Green Road, Dhaka",
                "customer_name": "Anika Rahman",
                "customer_email": "anika@example.com",
                "customer_phone": "01711111111",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["order"]["order_number"].as_str().unwrap().to_string()
}

async fn fetch_order(app: &TestApp, token: &str, order_number: &str) -> serde_json::Value {
    let (status, body, _) = app
        .request(
            "GET",
            &format!("/api/v1/orders/by-number/{}", order_number),
            Some(token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body
}

#[tokio::test]
async fn success_callback_settles_a_full_payment() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let (status, _, headers) = app
        .request(
            "GET",
            &format!(
                "/api/v1/payments/callback/success?tran_id={}&status=VALID&amount=1000.00&currency=BDT",
                order_number
            ),
            None,
            None,
        )
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = headers["location"].to_str().unwrap();
    assert!(location.starts_with("https://app.test/orders"));
    assert!(location.contains("payment=success"));
    assert!(location.contains(&order_number));

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "success");
    assert_eq!(order["status"], "processing");

    assert!(app.ledger.lookup(&order_number).await.unwrap().is_none());
}

#[tokio::test]
async fn success_callback_settles_an_advance_as_advance_paid() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_advance_order(&app, &token).await;

    let (status, _, _) = app
        .request(
            "GET",
            &format!(
                "/api/v1/payments/callback/success?tran_id={}&status=VALID",
                order_number
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::SEE_OTHER);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "advance_paid");
    assert_eq!(order["advance_amount"], "100.00");
    assert_eq!(order["remaining_amount"], "900.00");
}

#[tokio::test]
async fn success_callback_without_tran_id_is_missing_data() {
    let app = TestApp::spawn().await;
    let (status, body, _) = app
        .request(
            "GET",
            "/api/v1/payments/callback/success?status=VALID",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
}

#[tokio::test]
async fn non_valid_status_never_settles_the_order() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let (status, _, _) = app
        .request(
            "GET",
            &format!(
                "/api/v1/payments/callback/success?tran_id={}&status=FAILED",
                order_number
            ),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "pending");
}

#[tokio::test]
async fn success_callback_for_unknown_order_is_not_found() {
    let app = TestApp::spawn().await;
    let (status, _, _) = app
        .request(
            "GET",
            "/api/v1/payments/callback/success?tran_id=FG-0-none&status=VALID",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settlement_only_touches_the_matching_order() {
    let app = TestApp::spawn().await;
    let alice = app.token_for(Uuid::new_v4());
    let bob = app.token_for(Uuid::new_v4());
    let alice_order = place_online_order(&app, &alice).await;
    let bob_order = place_online_order(&app, &bob).await;

    app.request(
        "GET",
        &format!(
            "/api/v1/payments/callback/success?tran_id={}&status=VALID",
            alice_order
        ),
        None,
        None,
    )
    .await;

    let settled = fetch_order(&app, &alice, &alice_order).await;
    assert_eq!(settled["payment_status"], "success");
    let untouched = fetch_order(&app, &bob, &bob_order).await;
    assert_eq!(untouched["payment_status"], "pending");
    assert!(app.ledger.lookup(&bob_order).await.unwrap().is_some());
}

#[tokio::test]
async fn settlement_is_idempotent_across_repeated_callbacks() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;
    let callback = format!(
        "/api/v1/payments/callback/success?tran_id={}&status=VALID",
        order_number
    );

    let (first, _, _) = app.request("GET", &callback, None, None).await;
    let (second, _, _) = app.request("GET", &callback, None, None).await;
    assert_eq!(first, StatusCode::SEE_OTHER);
    assert_eq!(second, StatusCode::SEE_OTHER);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "success");
    assert_eq!(order["status"], "processing");
}

#[tokio::test]
async fn fail_callback_clears_the_ledger_but_leaves_the_order() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let (status, _, headers) = app
        .request(
            "GET",
            &format!(
                "/api/v1/payments/callback/fail?tran_id={}&failedreason=Insufficient+funds",
                order_number
            ),
            None,
            None,
        )
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    let location = headers["location"].to_str().unwrap();
    assert!(location.contains("payment=failed"));

    // Reconciliation is presentational here; the order stays as placed.
    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "pending");
    assert!(app.ledger.lookup(&order_number).await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_callback_redirects_with_cancelled_context() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let (status, _, headers) = app
        .request(
            "GET",
            &format!("/api/v1/payments/callback/cancel?tran_id={}", order_number),
            None,
            None,
        )
        .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert!(headers["location"]
        .to_str()
        .unwrap()
        .contains("payment=cancelled"));
    assert!(app.ledger.lookup(&order_number).await.unwrap().is_none());
}

#[tokio::test]
async fn signed_ipn_settles_the_order() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let body = format!("tran_id={}&status=VALID&amount=1000.00", order_number);
    let signature = TestApp::sign_ipn(&body);
    let (status, response, _) = app
        .request_form("POST", "/api/v1/payments/ipn", &body, Some(&signature))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", response);
    assert_eq!(response["acknowledged"], true);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "success");
}

#[tokio::test]
async fn ipn_with_bad_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let body = format!("tran_id={}&status=VALID", order_number);
    let (status, _, _) = app
        .request_form("POST", "/api/v1/payments/ipn", &body, Some("deadbeef"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = app
        .request_form("POST", "/api/v1/payments/ipn", &body, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "pending");
}

#[tokio::test]
async fn failed_ipn_marks_the_payment_failed() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;

    let body = format!(
        "tran_id={}&status=FAILED&failedreason=Card+declined",
        order_number
    );
    let signature = TestApp::sign_ipn(&body);
    let (status, _, _) = app
        .request_form("POST", "/api/v1/payments/ipn", &body, Some(&signature))
        .await;
    assert_eq!(status, StatusCode::OK);

    let order = fetch_order(&app, &token, &order_number).await;
    assert_eq!(order["payment_status"], "failed");
    assert!(app.ledger.lookup(&order_number).await.unwrap().is_none());
}

#[tokio::test]
async fn pending_payments_can_be_listed_and_cleared() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let first = place_online_order(&app, &token).await;
    let second = place_online_order(&app, &token).await;

    let (status, body, _) = app
        .request("GET", "/api/v1/payments/pending", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let order_id = body["pending"][0]["order_id"].as_str().unwrap().to_string();
    let (status, _, _) = app
        .request(
            "DELETE",
            &format!("/api/v1/payments/pending/{}", order_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body, _) = app
        .request("GET", "/api/v1/payments/pending", Some(&token), None)
        .await;
    assert_eq!(body["total"], 1);

    let (status, body, _) = app
        .request("DELETE", "/api/v1/payments/pending", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    assert!(app.ledger.lookup(&first).await.unwrap().is_none());
    assert!(app.ledger.lookup(&second).await.unwrap().is_none());
}

#[tokio::test]
async fn order_lifecycle_moves_forward_only() {
    let app = TestApp::spawn().await;
    let token = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &token).await;
    let order = fetch_order(&app, &token, &order_number).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    // Forward: pending -> processing -> confirmed -> completed.
    for next in ["processing", "confirmed", "completed"] {
        let (status, body, _) = app
            .request(
                "PUT",
                &format!("/api/v1/orders/{}/status", order_id),
                Some(&token),
                Some(json!({ "status": next })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{} -> {}", next, body);
        assert_eq!(body["status"], next);
    }

    // Completed orders cannot be cancelled.
    let (status, _, _) = app
        .request(
            "POST",
            &format!("/api/v1/orders/{}/cancel", order_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_are_not_visible_to_other_customers() {
    let app = TestApp::spawn().await;
    let alice = app.token_for(Uuid::new_v4());
    let bob = app.token_for(Uuid::new_v4());
    let order_number = place_online_order(&app, &alice).await;

    let (status, _, _) = app
        .request(
            "GET",
            &format!("/api/v1/orders/by-number/{}", order_number),
            Some(&bob),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
