//! VNPay routes: create a signed redirect URL, handle the browser
//! return (GET /callback), the server-to-server IPN, and status query.
//!
//! The IPN answer is VNPay's own ack dialect (`RspCode`/`Message`),
//! always HTTP 200 — the code carries the outcome, not the status line.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;

use paygate::store::{NewOrder, Provider, TransactionStatus};
use paygate::GatewayError;

use super::{apply_gateway_outcome, fail, ok_with, refresh_open_gauge, AppState};
use paygate::providers::InitiateRequest;
use paygate::store::{Actor, TransitionRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_handler))
        .route("/callback", get(callback_handler))
        .route("/ipn", get(ipn_get_handler).post(ipn_post_handler))
        .route("/query", post(query_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    order_id: Option<String>,
    amount: Option<u64>,
    order_info: Option<String>,
    #[serde(default)]
    bank_code: Option<String>,
    #[serde(default)]
    locale: Option<String>,
    #[serde(default)]
    ip_addr: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

/// `POST /api/vnpay/create` — register the order and return the
/// signed payment URL the customer is redirected to.
async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Response {
    let (order_id, amount, order_info) = match (body.order_id, body.amount, body.order_info) {
        (Some(o), Some(a), Some(i)) => (o, a, i),
        _ => {
            return fail(GatewayError::Validation(
                "Missing required fields: orderId, amount, orderInfo".into(),
            ))
        }
    };

    let order = match state.store.get_or_create(NewOrder {
        order_number: order_id.clone(),
        amount,
        currency: None,
        provider: Provider::Vnpay,
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

    let initiated = match state.vnpay.build_payment_url(&InitiateRequest {
        order_number: order.order_number.clone(),
        amount,
        order_info,
        client_ip: body.ip_addr,
        bank_code: body.bank_code,
        locale: body.locale,
        items: None,
        extra_data: None,
    }) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

    // The customer is now on their way to the gateway.
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
        .with_label_values(&["vnpay"])
        .inc();
    refresh_open_gauge(&state);

    ok_with(
        StatusCode::OK,
        "Payment URL created successfully",
        serde_json::json!({
            "orderId": order.order_number,
            "paymentUrl": initiated.pay_url,
        }),
    )
}

/// `GET /api/vnpay/callback` — browser return. Verifies, applies the
/// outcome, answers the frontend in the shared envelope.
async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    let verified = match state.vnpay.verify_callback(&params) {
        Ok(v) => v,
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["vnpay"])
                .inc();
            return fail(e);
        }
    };
    state
        .metrics
        .callbacks_verified_total
        .with_label_values(&["vnpay"])
        .inc();

    if let Err(e) = apply_gateway_outcome(&state, "vnpay", &verified) {
        state
            .metrics
            .callbacks_rejected_total
            .with_label_values(&["vnpay"])
            .inc();
        return fail(e);
    }

    let payload = serde_json::json!({
        "orderId": verified.order_number,
        "amount": verified.amount,
        "transactionNo": verified.provider_transaction_id,
        "responseCode": verified.result_code,
    });
    if verified.success {
        ok_with(StatusCode::OK, "Payment successful", payload)
    } else {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": false,
                "message": "Payment failed",
                "data": payload,
            })),
        )
            .into_response()
    }
}

/// VNPay IPN ack body.
fn ipn_ack(code: &str, message: &str) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "RspCode": code, "Message": message })),
    )
        .into_response()
}

/// `GET|POST /api/vnpay/ipn` — server-to-server confirmation.
///
/// Always 200; the `RspCode` tells VNPay whether to retry: `00`
/// confirmed (including duplicate deliveries), `01` order unknown,
/// `04` amount mismatch, `97` bad signature, `99` anything else.
async fn ipn_get_handler(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Response {
    handle_ipn(state, params)
}

async fn ipn_post_handler(
    State(state): State<AppState>,
    Form(params): Form<BTreeMap<String, String>>,
) -> Response {
    handle_ipn(state, params)
}

fn handle_ipn(state: AppState, params: BTreeMap<String, String>) -> Response {
    let verified = match state.vnpay.verify_callback(&params) {
        Ok(v) => v,
        Err(GatewayError::SignatureInvalid { .. }) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["vnpay"])
                .inc();
            return ipn_ack("97", "Invalid signature");
        }
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["vnpay"])
                .inc();
            tracing::warn!(error = %e, "vnpay ipn rejected");
            return ipn_ack("99", "Unknown error");
        }
    };
    state
        .metrics
        .callbacks_verified_total
        .with_label_values(&["vnpay"])
        .inc();

    match apply_gateway_outcome(&state, "vnpay", &verified) {
        Ok(_) => ipn_ack("00", "Confirm Success"),
        Err(GatewayError::NotFound(_)) => ipn_ack("01", "Order not found"),
        Err(GatewayError::AmountMismatch { .. }) => ipn_ack("04", "Invalid amount"),
        Err(e) => {
            tracing::warn!(error = %e, order_number = %verified.order_number, "vnpay ipn not applied");
            ipn_ack("99", "Unknown error")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    order_id: Option<String>,
    transaction_date: Option<String>,
    #[serde(default)]
    ip_addr: Option<String>,
}

/// `POST /api/vnpay/query` — build the signed `querydr` parameter set.
async fn query_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let (order_id, transaction_date) = match (body.order_id, body.transaction_date) {
        (Some(o), Some(d)) => (o, d),
        _ => {
            return fail(GatewayError::Validation(
                "Missing required fields: orderId, transactionDate".into(),
            ))
        }
    };

    let params = state.vnpay.build_query_request(
        &order_id,
        &transaction_date,
        body.ip_addr.as_deref().unwrap_or("127.0.0.1"),
    );
    super::ok(serde_json::to_value(params).unwrap_or_default())
}
