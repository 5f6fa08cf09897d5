//! PayPal routes: create a CAPTURE-intent order, capture it after
//! approval, and a couple of landing endpoints for the redirect flow.
//!
//! Correlation back to our order rides in `purchase_units[0]
//! .reference_id`, which we set to the order number at create time
//! and read back out of the capture response.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use paygate::store::{
    Actor, NewOrder, Provider, TransactionStatus, TransitionRequest,
};
use paygate::GatewayError;

use super::{fail, ok_with, refresh_open_gauge, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_handler))
        .route("/capture/:paypal_order_id", post(capture_handler))
        .route("/order/:paypal_order_id", get(order_handler))
        .route("/success", get(success_handler))
        .route("/cancel", get(cancel_handler))
        .route("/webhook", post(webhook_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    order_id: Option<String>,
    amount: Option<u64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

/// `POST /api/paypal/create` — open a PayPal order priced in USD at
/// the fixed VND conversion rate and hand back the approve URL.
async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Response {
    let (order_id, amount) = match (body.order_id, body.amount) {
        (Some(o), Some(a)) => (o, a),
        _ => {
            return fail(GatewayError::Validation(
                "Missing required fields: orderId, amount".into(),
            ))
        }
    };
    let description = body
        .description
        .unwrap_or_else(|| format!("Order {order_id}"));

    let order = match state.store.get_or_create(NewOrder {
        order_number: order_id,
        amount,
        currency: None,
        provider: Provider::Paypal,
        customer_name: body.customer_name,
        customer_email: body.customer_email,
        items: None,
        metadata: None,
    }) {
        Ok(order) => order,
        Err(e) => return fail(e),
    };
    if order.status.is_terminal() {
        return fail(GatewayError::Validation(format!(
            "order {} is already {}",
            order.order_number, order.status
        )));
    }

    let created = match state
        .paypal
        .create_order(&order.order_number, amount, &description)
        .await
    {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    if let Err(e) = state.store.merge_metadata(
        &order.id,
        serde_json::json!({ "paypalOrderId": created.paypal_order_id }),
    ) {
        return fail(e);
    }
    if let Err(e) = state.store.transition(
        &order.order_number,
        TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
    ) {
        if !matches!(e, GatewayError::IllegalTransition { .. }) {
            return fail(e);
        }
    }

    state
        .metrics
        .payments_initiated_total
        .with_label_values(&["paypal"])
        .inc();
    refresh_open_gauge(&state);

    ok_with(
        StatusCode::OK,
        "PayPal order created successfully",
        serde_json::json!({
            "orderId": order.order_number,
            "paypalOrderId": created.paypal_order_id,
            "approveUrl": created.approve_url,
            "usdValue": created.usd_value,
        }),
    )
}

/// `POST /api/paypal/capture/:paypal_order_id` — capture after
/// approval and settle the local order.
async fn capture_handler(
    State(state): State<AppState>,
    Path(paypal_order_id): Path<String>,
) -> Response {
    let captured = match state.paypal.capture_order(&paypal_order_id).await {
        Ok(c) => c,
        Err(e) => return fail(e),
    };

    let order_number = captured.raw["purchase_units"][0]["reference_id"]
        .as_str()
        .map(String::from);
    let order_number = match order_number {
        Some(n) => n,
        None => {
            return fail(GatewayError::Protocol {
                provider: "paypal",
                detail: "capture response missing reference_id".into(),
            })
        }
    };

    let target = if captured.completed {
        TransactionStatus::Completed
    } else {
        TransactionStatus::Failed
    };
    let request = TransitionRequest::new(target, Actor::Gateway)
        .with_provider_transaction_id(captured.paypal_order_id.clone())
        .with_note(format!("paypal capture status {}", captured.status));
    match state.store.transition(&order_number, request) {
        Ok(outcome) => {
            if outcome.was_applied() {
                state
                    .metrics
                    .transitions_applied_total
                    .with_label_values(&[target.as_str()])
                    .inc();
            }
            refresh_open_gauge(&state);
        }
        Err(e) => return fail(e),
    }

    ok_with(
        StatusCode::OK,
        if captured.completed {
            "Payment captured successfully"
        } else {
            "Capture did not complete"
        },
        serde_json::json!({
            "orderId": order_number,
            "paypalOrderId": captured.paypal_order_id,
            "status": captured.status,
            "completed": captured.completed,
        }),
    )
}

/// `GET /api/paypal/order/:paypal_order_id` — raw order passthrough.
async fn order_handler(
    State(state): State<AppState>,
    Path(paypal_order_id): Path<String>,
) -> Response {
    match state.paypal.get_order(&paypal_order_id).await {
        Ok(raw) => super::ok(raw),
        Err(e) => fail(e),
    }
}

/// Landing endpoint for the approve redirect; the frontend calls
/// capture afterwards.
async fn success_handler() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "Payment approved. Complete the capture to finish.",
        })),
    )
        .into_response()
}

async fn cancel_handler() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": false,
            "message": "Payment was cancelled.",
        })),
    )
        .into_response()
}

/// `POST /api/paypal/webhook` — log and ack. Settlement happens in
/// the capture flow; the webhook is observability only.
async fn webhook_handler(Json(event): Json<serde_json::Value>) -> Response {
    let event_type = event
        .get("event_type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown");
    tracing::info!(event_type, "paypal webhook received");
    (
        StatusCode::OK,
        Json(serde_json::json!({ "received": true })),
    )
        .into_response()
}
