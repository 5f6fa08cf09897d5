//! Momo wallet routes.
//!
//! `POST /notify` is Momo's IPN: per their contract the only sane
//! answer is `204 No Content`, whatever we think of the payload —
//! anything else makes their delivery queue retry forever. Rejections
//! are logged and counted instead.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use paygate::providers::momo::MomoCallback;
use paygate::providers::InitiateRequest;
use paygate::store::{Actor, NewOrder, Provider, TransactionStatus, TransitionRequest};
use paygate::GatewayError;

use super::{apply_gateway_outcome, fail, ok_with, refresh_open_gauge, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_handler))
        .route("/callback", get(callback_handler))
        .route("/notify", post(notify_handler))
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

/// `POST /api/momo/create` — register the order, then ask Momo for a
/// `payUrl`/`deeplink`/QR trio.
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
        provider: Provider::Momo,
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
        .momo
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
        .with_label_values(&["momo"])
        .inc();
    refresh_open_gauge(&state);

    ok_with(
        StatusCode::OK,
        "Payment created successfully",
        serde_json::json!({
            "orderId": order.order_number,
            "requestId": initiated.provider_request_id,
            "payUrl": initiated.pay_url,
            "deeplink": initiated.deeplink,
            "qrCodeUrl": initiated.qr_payload,
        }),
    )
}

/// `GET /api/momo/callback` — browser return after the wallet flow.
async fn callback_handler(
    State(state): State<AppState>,
    Query(callback): Query<MomoCallback>,
) -> Response {
    let verified = match state.momo.verify_callback(&callback) {
        Ok(v) => v,
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["momo"])
                .inc();
            return fail(e);
        }
    };
    state
        .metrics
        .callbacks_verified_total
        .with_label_values(&["momo"])
        .inc();

    if let Err(e) = apply_gateway_outcome(&state, "momo", &verified) {
        state
            .metrics
            .callbacks_rejected_total
            .with_label_values(&["momo"])
            .inc();
        return fail(e);
    }

    let payload = serde_json::json!({
        "orderId": verified.order_number,
        "amount": verified.amount,
        "transId": verified.provider_transaction_id,
        "resultCode": verified.result_code,
        "message": verified.message,
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

/// `POST /api/momo/notify` — server-to-server IPN. Always `204`.
///
/// Takes the raw body so a payload the wallet mangles still gets its
/// `204`; the `Json` extractor would answer `422` first and Momo would
/// keep redelivering.
async fn notify_handler(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let callback: MomoCallback = match serde_json::from_slice(&body) {
        Ok(cb) => cb,
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["momo"])
                .inc();
            tracing::warn!(error = %e, "momo ipn body not parseable");
            return StatusCode::NO_CONTENT;
        }
    };
    match state.momo.verify_callback(&callback) {
        Ok(verified) => {
            state
                .metrics
                .callbacks_verified_total
                .with_label_values(&["momo"])
                .inc();
            if let Err(e) = apply_gateway_outcome(&state, "momo", &verified) {
                state
                    .metrics
                    .callbacks_rejected_total
                    .with_label_values(&["momo"])
                    .inc();
                tracing::warn!(
                    error = %e,
                    order_number = %verified.order_number,
                    "momo ipn not applied"
                );
            }
        }
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["momo"])
                .inc();
            tracing::warn!(error = %e, "momo ipn rejected");
        }
    }
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    order_id: Option<String>,
    request_id: Option<String>,
}

/// `POST /api/momo/query` — proxy a signed status query to Momo.
async fn query_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let (order_id, request_id) = match (body.order_id, body.request_id) {
        (Some(o), Some(r)) => (o, r),
        _ => {
            return fail(GatewayError::Validation(
                "Missing required fields: orderId, requestId".into(),
            ))
        }
    };

    match state.momo.query(&order_id, &request_id).await {
        Ok(result) => super::ok(result),
        Err(e) => fail(e),
    }
}
