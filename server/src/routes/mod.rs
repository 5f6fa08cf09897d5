//! # HTTP Surface
//!
//! Builds the axum router for the payment API. All endpoints share
//! application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Liveness probe |
//! | * | `/api/vnpay/*` | VNPay create / callback / IPN / query |
//! | * | `/api/momo/*` | Momo create / callback / notify / query |
//! | * | `/api/zalopay/*` | ZaloPay create / callback / query |
//! | * | `/api/viettelmoney/*` | Viettel Money create / callback / query |
//! | * | `/api/paypal/*` | PayPal create / capture / order / webhook |
//! | * | `/api/transactions/*` | Transaction CRUD and stats |
//!
//! Response envelope is `{ "success": bool, "message": …, "data": … }`
//! everywhere except the gateway ack endpoints, which speak each
//! provider's own ack dialect (VNPay `RspCode`, ZaloPay `return_code`,
//! Momo 204).

pub mod momo;
pub mod paypal;
pub mod transactions;
pub mod viettel;
pub mod vnpay;
pub mod zalopay;

use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use paygate::config::{BankTransferConfig, GatewaySettings};
use paygate::providers::momo::MomoClient;
use paygate::providers::paypal::PayPalClient;
use paygate::providers::viettel::ViettelClient;
use paygate::providers::vnpay::VnpayClient;
use paygate::providers::zalopay::ZaloPayClient;
use paygate::providers::VerifiedCallback;
use paygate::store::{
    Actor, NotificationEvent, NotificationSink, TransactionStatus, TransactionStore,
    TransitionOutcome, TransitionRequest,
};
use paygate::GatewayError;

use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone — everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The keyed transaction store.
    pub store: Arc<TransactionStore>,
    pub vnpay: Arc<VnpayClient>,
    pub momo: Arc<MomoClient>,
    pub zalopay: Arc<ZaloPayClient>,
    pub viettel: Arc<ViettelClient>,
    pub paypal: Arc<PayPalClient>,
    pub bank_transfer: BankTransferConfig,
    /// Prometheus metrics for in-handler recording.
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Wire up provider clients from settings. The outbound HTTP
    /// client is shared across providers.
    pub fn new(
        settings: GatewaySettings,
        store: Arc<TransactionStore>,
        metrics: SharedMetrics,
    ) -> Result<Self, GatewayError> {
        let http = paygate::providers::http_client()?;
        Ok(Self {
            store,
            vnpay: Arc::new(VnpayClient::new(settings.vnpay)),
            momo: Arc::new(MomoClient::new(settings.momo, http.clone())),
            zalopay: Arc::new(ZaloPayClient::new(settings.zalopay, http.clone())),
            viettel: Arc::new(ViettelClient::new(settings.viettel, http.clone())),
            paypal: Arc::new(PayPalClient::new(settings.paypal, http)),
            bank_transfer: settings.bank_transfer,
            metrics,
        })
    }
}

/// Notification sink that logs and counts terminal-transition events.
pub struct MetricsNotifier {
    metrics: SharedMetrics,
}

impl MetricsNotifier {
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl NotificationSink for MetricsNotifier {
    fn notify(&self, event: &NotificationEvent) {
        self.metrics.notifications_emitted_total.inc();
        tracing::info!(
            order_number = %event.order_number,
            status = %event.new_status,
            email = event.customer_email.as_deref().unwrap_or("-"),
            "order reached terminal status"
        );
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/vnpay", vnpay::router())
        .nest("/api/momo", momo::router())
        .nest("/api/zalopay", zalopay::router())
        .nest("/api/viettelmoney", viettel::router())
        .nest("/api/paypal", paypal::router())
        .nest("/api/transactions", transactions::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /health` — returns 200 if the server is alive.
///
/// Liveness only; it does not probe the gateways.
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "ok", "service": "paygate" })),
    )
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// `{ "success": true, "data": … }`
pub(crate) fn ok(data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "success": true, "data": data })),
    )
        .into_response()
}

/// `{ "success": true, "message": …, "data": … }` with a chosen status.
pub(crate) fn ok_with(status: StatusCode, message: &str, data: serde_json::Value) -> Response {
    (
        status,
        Json(serde_json::json!({ "success": true, "message": message, "data": data })),
    )
        .into_response()
}

/// Map a [`GatewayError`] onto an HTTP status and envelope.
///
/// Internal faults (I/O, serialization, provider protocol breakage)
/// are logged with detail but answered with a generic message.
pub(crate) fn fail(err: GatewayError) -> Response {
    let (status, message) = match &err {
        GatewayError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        GatewayError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
        GatewayError::SignatureInvalid { .. } => {
            (StatusCode::BAD_REQUEST, "Invalid signature".to_string())
        }
        GatewayError::AmountMismatch { order_number, .. } => (
            StatusCode::BAD_REQUEST,
            format!("amount mismatch for order {order_number}"),
        ),
        GatewayError::IllegalTransition { order_number, from, to } => (
            StatusCode::CONFLICT,
            format!("order {order_number} cannot move from {from} to {to}"),
        ),
        GatewayError::PaymentDeclined { provider, code, message } => (
            StatusCode::PAYMENT_REQUIRED,
            format!(
                "{provider} declined the payment (code {code}){}",
                message
                    .as_deref()
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            ),
        ),
        GatewayError::GatewayUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Payment gateway unavailable, try again".to_string(),
        ),
        GatewayError::Protocol { .. }
        | GatewayError::Configuration(_)
        | GatewayError::Io(_)
        | GatewayError::Serialization(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error".to_string(),
        ),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    } else {
        tracing::warn!(error = %err, "request rejected");
    }

    (
        status,
        Json(serde_json::json!({ "success": false, "message": message })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Shared callback handling
// ---------------------------------------------------------------------------

/// Drive the store from a verified gateway callback: cross-check the
/// amount, then apply the success/failure transition as the gateway
/// actor. Duplicate terminal deliveries come back as `NoOp`.
pub(crate) fn apply_gateway_outcome(
    state: &AppState,
    provider: &str,
    verified: &VerifiedCallback,
) -> Result<TransitionOutcome, GatewayError> {
    if let Some(amount) = verified.amount {
        state.store.verify_amount(&verified.order_number, amount)?;
    }

    let target = if verified.success {
        TransactionStatus::Completed
    } else {
        TransactionStatus::Failed
    };

    let mut request = TransitionRequest::new(target, Actor::Gateway)
        .with_note(format!("{provider} result code {}", verified.result_code));
    if let Some(ptid) = &verified.provider_transaction_id {
        request = request.with_provider_transaction_id(ptid.clone());
    }

    let outcome = state.store.transition(&verified.order_number, request)?;
    if outcome.was_applied() {
        state
            .metrics
            .transitions_applied_total
            .with_label_values(&[target.as_str()])
            .inc();
    }
    refresh_open_gauge(state);
    Ok(outcome)
}

/// Recompute the open-orders gauge from store stats.
pub(crate) fn refresh_open_gauge(state: &AppState) {
    let stats = state.store.stats();
    state
        .metrics
        .orders_open
        .set((stats.pending + stats.processing) as i64);
}

// ---------------------------------------------------------------------------
// Test scaffolding
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use paygate::config::{
        MomoConfig, PayPalConfig, PayPalMode, ViettelConfig, VnpayConfig, ZaloPayConfig,
    };
    use paygate::providers::InitiateRequest;
    use paygate::store::{NewOrder, PaymentOrder, Provider};
    use secrecy::SecretString;
    use tower::ServiceExt;

    use crate::metrics::GatewayMetrics;

    pub(crate) const VNPAY_SECRET: &str = "VNPAYTESTSECRETXXXXXXXXXXXXXXXXX";
    pub(crate) const MOMO_SECRET: &str = "momotestsecretkey000000000000000";
    pub(crate) const ZALOPAY_KEY1: &str = "zalopaytestkey1aaaaaaaaaaaaaaaaa";
    pub(crate) const ZALOPAY_KEY2: &str = "zalopaytestkey2bbbbbbbbbbbbbbbbb";
    pub(crate) const VIETTEL_SECRET: &str = "vttestsecret00000000000000000000";

    pub(crate) fn test_settings() -> GatewaySettings {
        GatewaySettings {
            vnpay: VnpayConfig {
                tmn_code: "TESTTMN1".into(),
                hash_secret: SecretString::new(VNPAY_SECRET.into()),
                pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
                return_url: "http://localhost:3000/payment/vnpay/callback".into(),
            },
            momo: MomoConfig {
                partner_code: "MOMOTEST".into(),
                access_key: "testaccesskey".into(),
                secret_key: SecretString::new(MOMO_SECRET.into()),
                endpoint: "http://127.0.0.1:1/momo/create".into(),
                query_endpoint: "http://127.0.0.1:1/momo/query".into(),
                return_url: "http://localhost:3000/payment/momo/callback".into(),
                notify_url: "http://localhost:5000/api/momo/notify".into(),
            },
            zalopay: ZaloPayConfig {
                app_id: "2553".into(),
                key1: SecretString::new(ZALOPAY_KEY1.into()),
                key2: SecretString::new(ZALOPAY_KEY2.into()),
                endpoint: "http://127.0.0.1:1/zalopay/create".into(),
                query_endpoint: "http://127.0.0.1:1/zalopay/query".into(),
                callback_url: "http://localhost:3000/payment/zalopay/callback".into(),
            },
            viettel: ViettelConfig {
                partner_code: "VTPARTNER".into(),
                access_key: "vtaccesskey".into(),
                secret_key: SecretString::new(VIETTEL_SECRET.into()),
                endpoint: "http://127.0.0.1:1/viettel/create".into(),
                callback_url: "http://localhost:5000/api/viettelmoney/callback".into(),
            },
            paypal: PayPalConfig {
                client_id: "test-client-id".into(),
                client_secret: SecretString::new("test-client-secret".into()),
                mode: PayPalMode::Sandbox,
                return_url: "http://localhost:3000/payment/paypal/success".into(),
                cancel_url: "http://localhost:3000/payment/paypal/cancel".into(),
            },
            bank_transfer: BankTransferConfig {
                bank_name: "Vietcombank".into(),
                account_number: "0011004433221".into(),
                account_name: "CONG TY TNHH DEMO".into(),
            },
        }
    }

    pub(crate) fn test_app_state() -> AppState {
        let metrics: SharedMetrics = Arc::new(GatewayMetrics::new());
        let sink = Arc::new(MetricsNotifier::new(Arc::clone(&metrics)));
        let store = Arc::new(TransactionStore::in_memory(sink));
        AppState::new(test_settings(), store, metrics).expect("test app state")
    }

    /// Seed an order and move it to `processing`, the state callbacks
    /// normally find it in.
    pub(crate) fn seed_processing_order(
        state: &AppState,
        order_number: &str,
        amount: u64,
        provider: Provider,
    ) -> PaymentOrder {
        let order = state
            .store
            .create(NewOrder {
                order_number: order_number.into(),
                amount,
                currency: None,
                provider,
                customer_name: Some("Test Customer".into()),
                customer_email: Some("customer@example.com".into()),
                items: None,
                metadata: None,
            })
            .expect("seed order");
        state
            .store
            .transition(
                order_number,
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .expect("seed transition");
        order
    }

    pub(crate) fn initiate_request(order_number: &str, amount: u64) -> InitiateRequest {
        InitiateRequest {
            order_number: order_number.into(),
            amount,
            order_info: format!("Thanh toan don hang {order_number}"),
            client_ip: Some("203.0.113.7".into()),
            bank_code: None,
            locale: None,
            items: None,
            extra_data: None,
        }
    }

    /// Sends a GET request and returns (status, body_bytes).
    pub(crate) async fn get(router: &Router, path: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST request with JSON body and returns (status, body_bytes).
    pub(crate) async fn post_json(
        router: &Router,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a POST with a urlencoded form body.
    pub(crate) async fn post_form(
        router: &Router,
        path: &str,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }

    /// Sends a request with an arbitrary method and JSON body.
    pub(crate) async fn send_json(
        router: &Router,
        method: &str,
        path: &str,
        body: serde_json::Value,
    ) -> (StatusCode, Vec<u8>) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec();
        (status, body)
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::create_router;
    use super::testing::*;

    // -- 1. Health endpoint -------------------------------------------------

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    // -- 2. Error envelope for unknown transaction --------------------------

    #[tokio::test]
    async fn not_found_uses_the_error_envelope() {
        let router = create_router(test_app_state());
        let (status, body) = get(&router, "/api/transactions/TXN_missing").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
    }
}
