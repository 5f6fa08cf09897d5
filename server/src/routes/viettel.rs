//! Viettel Money routes.
//!
//! The status query answers from the local store: the upstream
//! sandbox has no reliable query endpoint, and the store already
//! holds the confirmed outcome once the callback lands.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use paygate::providers::viettel::ViettelCallback;
use paygate::providers::InitiateRequest;
use paygate::store::{Actor, NewOrder, Provider, TransactionStatus, TransitionRequest};
use paygate::GatewayError;

use super::{apply_gateway_outcome, fail, ok_with, refresh_open_gauge, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_handler))
        .route("/callback", post(callback_handler))
        .route("/query", post(query_handler))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    order_id: Option<String>,
    amount: Option<u64>,
    order_info: Option<String>,
    #[serde(default)]
    extra_data: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

/// `POST /api/viettelmoney/create`
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
        order_number: order_id,
        amount,
        currency: None,
        provider: Provider::ViettelMoney,
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

    let initiated = match state
        .viettel
        .create_payment(&InitiateRequest {
            order_number: order.order_number.clone(),
            amount,
            order_info,
            client_ip: None,
            bank_code: None,
            locale: None,
            items: None,
            extra_data: body.extra_data,
        })
        .await
    {
        Ok(p) => p,
        Err(e) => return fail(e),
    };

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
        .with_label_values(&["viettel"])
        .inc();
    refresh_open_gauge(&state);

    ok_with(
        StatusCode::OK,
        "Payment created successfully",
        serde_json::json!({
            "orderId": order.order_number,
            "paymentUrl": initiated.pay_url,
            "qrCodeUrl": initiated.qr_payload,
        }),
    )
}

/// `POST /api/viettelmoney/callback` — signed outcome notification.
async fn callback_handler(
    State(state): State<AppState>,
    Json(callback): Json<ViettelCallback>,
) -> Response {
    let verified = match state.viettel.verify_callback(&callback) {
        Ok(v) => v,
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["viettel"])
                .inc();
            return fail(e);
        }
    };
    state
        .metrics
        .callbacks_verified_total
        .with_label_values(&["viettel"])
        .inc();

    if let Err(e) = apply_gateway_outcome(&state, "viettel", &verified) {
        state
            .metrics
            .callbacks_rejected_total
            .with_label_values(&["viettel"])
            .inc();
        return fail(e);
    }

    let payload = serde_json::json!({
        "orderId": verified.order_number,
        "resultCode": verified.result_code,
        "transId": verified.provider_transaction_id,
    });
    if verified.success {
        ok_with(StatusCode::OK, "Payment confirmed", payload)
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    order_id: Option<String>,
}

/// `POST /api/viettelmoney/query` — local status lookup by order number.
async fn query_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let order_id = match body.order_id {
        Some(o) => o,
        None => {
            return fail(GatewayError::Validation(
                "Missing required field: orderId".into(),
            ))
        }
    };

    match state.store.get_by_order_number(&order_id) {
        Some(order) => super::ok(serde_json::json!({
            "orderId": order.order_number,
            "status": order.status.as_str(),
            "amount": order.amount,
            "transId": order.provider_transaction_id,
        })),
        None => fail(GatewayError::NotFound(format!("order {order_id}"))),
    }
}
