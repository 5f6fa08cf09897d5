//! Transaction CRUD and admin surface over the store.
//!
//! `POST /` is how non-gateway methods (bank transfer, COD) enter the
//! system; gateway methods normally arrive through their own `create`
//! endpoints. `PATCH /:id` is the admin lever: confirm a transfer,
//! refund a completed order. The state machine decides what an admin
//! may do, not this module.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use paygate::providers::local;
use paygate::providers::InitiateRequest;
use paygate::store::{
    Actor, ListFilter, NewOrder, Provider, TransactionStatus, TransitionRequest,
};
use paygate::GatewayError;

use super::{fail, ok, ok_with, refresh_open_gauge, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_handler).post(create_handler))
        .route(
            "/:id",
            get(get_handler).patch(update_handler).delete(delete_handler),
        )
        .route("/stats/summary", get(stats_handler))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    status: Option<TransactionStatus>,
    payment_method: Option<Provider>,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
}

/// `GET /api/transactions` — filtered list, oldest first.
async fn list_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let orders = state.store.list(&ListFilter {
        status: query.status,
        provider: query.payment_method,
        start_date: query.start_date,
        end_date: query.end_date,
    });
    let data = serde_json::to_value(&orders).unwrap_or_default();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "count": orders.len(),
            "data": data,
        })),
    )
        .into_response()
}

/// `GET /api/transactions/:id`
async fn get_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id) {
        Some(order) => ok(serde_json::to_value(&order).unwrap_or_default()),
        None => fail(GatewayError::NotFound(format!("transaction {id}"))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    order_id: Option<String>,
    amount: Option<u64>,
    payment_method: Option<Provider>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer_name: Option<String>,
    #[serde(default)]
    customer_email: Option<String>,
    #[serde(default)]
    items: Option<serde_json::Value>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

/// `POST /api/transactions` — record a new order. Bank transfer
/// responses carry the manual-payment instructions and QR payload.
async fn create_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateBody>,
) -> Response {
    let (order_id, amount, method) = match (body.order_id, body.amount, body.payment_method) {
        (Some(o), Some(a), Some(m)) => (o, a, m),
        _ => {
            return fail(GatewayError::Validation(
                "Missing required fields: orderId, amount, paymentMethod".into(),
            ))
        }
    };

    let order = match state.store.create(NewOrder {
        order_number: order_id,
        amount,
        currency: body.currency,
        provider: method,
        customer_name: body.customer_name,
        customer_email: body.customer_email,
        items: body.items,
        metadata: body.metadata,
    }) {
        Ok(order) => order,
        Err(e) => return fail(e),
    };
    refresh_open_gauge(&state);

    let mut data = serde_json::to_value(&order).unwrap_or_default();
    let initiate = InitiateRequest {
        order_number: order.order_number.clone(),
        amount,
        order_info: format!("Thanh toan don hang {}", order.order_number),
        client_ip: None,
        bank_code: None,
        locale: None,
        items: None,
        extra_data: None,
    };
    match method {
        Provider::BankTransfer => {
            let initiated = local::bank_transfer(&state.bank_transfer, &initiate);
            data["payment"] = serde_json::json!({
                "qrPayload": initiated.qr_payload,
                "instructions": initiated.raw["instructions"],
            });
        }
        Provider::Cod => {
            data["payment"] = local::cod(&initiate).raw;
        }
        _ => {}
    }

    ok_with(
        StatusCode::CREATED,
        "Transaction created successfully",
        data,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    status: Option<TransactionStatus>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    payment_details: Option<serde_json::Value>,
}

/// `PATCH /api/transactions/:id` — admin status change and/or
/// metadata merge. Disallowed edges come back as `409`.
async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> Response {
    if body.status.is_none() && body.payment_details.is_none() {
        return fail(GatewayError::Validation(
            "Nothing to update: supply status or paymentDetails".into(),
        ));
    }

    if let Some(details) = body.payment_details {
        if let Err(e) = state.store.merge_metadata(&id, details) {
            return fail(e);
        }
    }

    if let Some(status) = body.status {
        let mut request = TransitionRequest::new(status, Actor::Admin);
        if let Some(note) = body.note {
            request = request.with_note(note);
        }
        match state.store.transition_by_id(&id, request) {
            Ok(outcome) => {
                if outcome.was_applied() {
                    state
                        .metrics
                        .transitions_applied_total
                        .with_label_values(&[status.as_str()])
                        .inc();
                }
                refresh_open_gauge(&state);
            }
            Err(e) => return fail(e),
        }
    }

    match state.store.get(&id) {
        Some(order) => ok_with(
            StatusCode::OK,
            "Transaction updated successfully",
            serde_json::to_value(&order).unwrap_or_default(),
        ),
        None => fail(GatewayError::NotFound(format!("transaction {id}"))),
    }
}

/// `DELETE /api/transactions/:id`
async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete(&id) {
        Ok(()) => {
            refresh_open_gauge(&state);
            ok_with(
                StatusCode::OK,
                "Transaction deleted successfully",
                serde_json::Value::Null,
            )
        }
        Err(e) => fail(e),
    }
}

/// `GET /api/transactions/stats/summary`
async fn stats_handler(State(state): State<AppState>) -> Response {
    ok(serde_json::to_value(state.store.stats()).unwrap_or_default())
}
