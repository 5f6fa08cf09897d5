//! ZaloPay routes.
//!
//! The callback ack is ZaloPay's `{return_code, return_message}`
//! dialect: `1` stop retrying, `-1` bad mac, `0` transient failure
//! (their queue redelivers). Always HTTP 200.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use paygate::providers::zalopay::ZaloPayCallback;
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
    items: Option<serde_json::Value>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
}

/// `POST /api/zalopay/create` — register the order and open a ZaloPay
/// order under a day-scoped `app_trans_id`.
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
        provider: Provider::Zalopay,
        customer_name: body.customer_name,
        customer_email: body.customer_email,
        items: body.items.clone(),
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
        .zalopay
        .create_order(&InitiateRequest {
            order_number: order.order_number.clone(),
            amount,
            order_info,
            client_ip: None,
            bank_code: None,
            locale: None,
            items: body.items,
            extra_data: None,
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
        .with_label_values(&["zalopay"])
        .inc();
    refresh_open_gauge(&state);

    ok_with(
        StatusCode::OK,
        "Payment created successfully",
        serde_json::json!({
            "orderId": order.order_number,
            "appTransId": initiated.provider_request_id,
            "orderUrl": initiated.pay_url,
            "qrCode": initiated.qr_payload,
        }),
    )
}

fn zalopay_ack(return_code: i64, return_message: &str) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "return_code": return_code,
            "return_message": return_message,
        })),
    )
        .into_response()
}

/// `POST /api/zalopay/callback` — key2-mac'd IPN.
async fn callback_handler(
    State(state): State<AppState>,
    Json(callback): Json<ZaloPayCallback>,
) -> Response {
    let verified = match state.zalopay.verify_callback(&callback) {
        Ok(v) => v,
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["zalopay"])
                .inc();
            let code = match e {
                GatewayError::SignatureInvalid { .. } => -1,
                _ => 0,
            };
            tracing::warn!(error = %e, "zalopay callback rejected");
            return zalopay_ack(code, "mac not equal");
        }
    };
    state
        .metrics
        .callbacks_verified_total
        .with_label_values(&["zalopay"])
        .inc();

    match apply_gateway_outcome(&state, "zalopay", &verified) {
        Ok(_) => zalopay_ack(1, "success"),
        Err(e) => {
            state
                .metrics
                .callbacks_rejected_total
                .with_label_values(&["zalopay"])
                .inc();
            tracing::warn!(
                error = %e,
                order_number = %verified.order_number,
                "zalopay callback not applied"
            );
            zalopay_ack(0, "order update failed")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    app_trans_id: Option<String>,
}

/// `POST /api/zalopay/query` — proxy a key1-mac'd status query.
async fn query_handler(State(state): State<AppState>, Json(body): Json<QueryBody>) -> Response {
    let app_trans_id = match body.app_trans_id {
        Some(id) => id,
        None => {
            return fail(GatewayError::Validation(
                "Missing required field: appTransId".into(),
            ))
        }
    };

    match state.zalopay.query(&app_trans_id).await {
        Ok(result) => super::ok(result),
        Err(e) => fail(e),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::testing::*;
    use super::super::{create_router, AppState};
    use paygate::signing::{self, HmacAlgorithm};
    use paygate::store::{Provider, TransactionStatus};

    fn signed_callback_body(
        state: &AppState,
        order_number: &str,
        amount: u64,
        status: i64,
    ) -> serde_json::Value {
        let app_trans_id = state.zalopay.app_trans_id(order_number);
        let data = serde_json::json!({
            "app_id": 2553,
            "app_trans_id": app_trans_id,
            "app_user": "customer",
            "amount": amount,
            "zp_trans_id": 240912000000123_i64,
            "status": status,
        })
        .to_string();
        let mac = signing::sign_hex(
            HmacAlgorithm::Sha256,
            ZALOPAY_KEY2.as_bytes(),
            data.as_bytes(),
        );
        serde_json::json!({ "data": data, "mac": mac, "type": 1 })
    }

    // -- 1. Valid callback completes the order and acks return_code 1 ---------

    #[tokio::test]
    async fn callback_completes_order_and_acks_success() {
        let state = test_app_state();
        seed_processing_order(&state, "HD300001", 250_000, Provider::Zalopay);
        let router = create_router(state.clone());

        let body = signed_callback_body(&state, "HD300001", 250_000, 1);
        let (status, resp) = post_json(&router, "/api/zalopay/callback", body).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["return_code"], 1);
        assert_eq!(
            state
                .store
                .get_by_order_number("HD300001")
                .unwrap()
                .status,
            TransactionStatus::Completed
        );
    }

    // -- 2. key1-signed callback is a mac failure (-1) ------------------------

    #[tokio::test]
    async fn callback_with_wrong_key_is_rejected() {
        let state = test_app_state();
        seed_processing_order(&state, "HD300002", 250_000, Provider::Zalopay);
        let router = create_router(state.clone());

        let mut body = signed_callback_body(&state, "HD300002", 250_000, 1);
        let data = body["data"].as_str().unwrap();
        body["mac"] = serde_json::json!(signing::sign_hex(
            HmacAlgorithm::Sha256,
            ZALOPAY_KEY1.as_bytes(),
            data.as_bytes(),
        ));
        let (status, resp) = post_json(&router, "/api/zalopay/callback", body).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["return_code"], -1);
        assert_eq!(
            state
                .store
                .get_by_order_number("HD300002")
                .unwrap()
                .status,
            TransactionStatus::Processing
        );
    }

    // -- 3. Unknown order is a transient failure (0), so ZaloPay retries ------

    #[tokio::test]
    async fn callback_for_unknown_order_asks_for_retry() {
        let state = test_app_state();
        let router = create_router(state.clone());
        let body = signed_callback_body(&state, "HD_NOPE", 250_000, 1);
        let (status, resp) = post_json(&router, "/api/zalopay/callback", body).await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["return_code"], 0);
    }

    // -- 4. Duplicate delivery still acks success -----------------------------

    #[tokio::test]
    async fn duplicate_callback_still_acks_success() {
        let state = test_app_state();
        seed_processing_order(&state, "HD300003", 250_000, Provider::Zalopay);
        let router = create_router(state.clone());

        let body = signed_callback_body(&state, "HD300003", 250_000, 1);
        let (_, resp) = post_json(&router, "/api/zalopay/callback", body.clone()).await;
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["return_code"], 1);

        let (_, resp) = post_json(&router, "/api/zalopay/callback", body).await;
        let json: serde_json::Value = serde_json::from_slice(&resp).unwrap();
        assert_eq!(json["return_code"], 1);
        assert_eq!(
            state
                .store
                .get_by_order_number("HD300003")
                .unwrap()
                .audit
                .len(),
            2
        );
    }

    // -- 5. Create without required fields is a 400 ---------------------------

    #[tokio::test]
    async fn create_missing_fields_is_rejected() {
        let router = create_router(test_app_state());
        let (status, _) = post_json(
            &router,
            "/api/zalopay/create",
            serde_json::json!({ "amount": 250_000 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
