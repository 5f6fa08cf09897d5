//! # Keyed Transaction Store
//!
//! Concurrent, order-keyed storage for [`PaymentOrder`] records with
//! a JSON-array snapshot on disk.
//!
//! ## Design
//!
//! - `DashMap` holds the records. A transition is read-validate-write
//!   inside a single `get_mut` entry guard, so two near-simultaneous
//!   callbacks for the same order serialize against each other while
//!   unrelated orders proceed in parallel. No global lock, and the
//!   guard is never held across network I/O — gateway calls finish
//!   before the store is touched.
//! - A secondary map indexes `order_number -> id`, since callbacks
//!   identify orders by the merchant reference, not the store key.
//! - The snapshot file keeps the original backend's JSON-array record
//!   shape. It is written under a `parking_lot::Mutex` after each
//!   mutation, to a temp file first, then renamed — closing the
//!   original's concurrent read-modify-write race without giving up
//!   file compatibility.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::GatewayError;
use crate::store::notify::{NotificationEvent, NotificationSink};
use crate::store::record::{Actor, NewOrder, PaymentOrder, Provider, TransactionStatus};
use crate::store::state::{self, TransitionOutcome};
use crate::store::record::AuditEntry;

// ---------------------------------------------------------------------------
// Request / filter / stats types
// ---------------------------------------------------------------------------

/// Everything a caller supplies to request a status transition.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub to: TransactionStatus,
    pub actor: Actor,
    /// Gateway-side transaction reference, recorded on first arrival.
    pub provider_transaction_id: Option<String>,
    /// Audit context: result code, decline reason, sweep note.
    pub note: Option<String>,
}

impl TransitionRequest {
    pub fn new(to: TransactionStatus, actor: Actor) -> Self {
        Self {
            to,
            actor,
            provider_transaction_id: None,
            note: None,
        }
    }

    pub fn with_provider_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.provider_transaction_id = Some(id.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Filters for `list`. All optional; absent means "don't filter".
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<TransactionStatus>,
    pub provider: Option<Provider>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Per-provider aggregation inside [`StoreStats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct MethodStats {
    pub count: u64,
    /// Sum of completed amounts only, matching the original summary.
    pub amount: u64,
}

/// Aggregate counts and sums for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub refunded: u64,
    /// Sum of amounts across completed orders.
    pub total_amount: u64,
    pub by_payment_method: BTreeMap<String, MethodStats>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Concurrent keyed store over all payment orders.
pub struct TransactionStore {
    orders: DashMap<String, PaymentOrder>,
    /// order_number -> id. Order numbers are unique by invariant.
    by_order_number: DashMap<String, String>,
    /// Snapshot path; `None` runs purely in memory (tests).
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot writes. Mutations race on the maps freely;
    /// only the file write is single-file.
    snapshot_lock: Mutex<()>,
    sink: Arc<dyn NotificationSink>,
}

impl TransactionStore {
    /// In-memory store with the given notification sink.
    pub fn in_memory(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            orders: DashMap::new(),
            by_order_number: DashMap::new(),
            snapshot_path: None,
            snapshot_lock: Mutex::new(()),
            sink,
        }
    }

    /// Store backed by a JSON-array snapshot file. Loads existing
    /// records if the file is present; a missing file is an empty
    /// store, matching the original backend.
    pub fn with_snapshot(
        path: impl AsRef<Path>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, GatewayError> {
        let path = path.as_ref().to_path_buf();
        let store = Self {
            orders: DashMap::new(),
            by_order_number: DashMap::new(),
            snapshot_path: Some(path.clone()),
            snapshot_lock: Mutex::new(()),
            sink,
        };

        if path.exists() {
            let raw = std::fs::read(&path)?;
            let records: Vec<PaymentOrder> = serde_json::from_slice(&raw)?;
            for order in records {
                store
                    .by_order_number
                    .insert(order.order_number.clone(), order.id.clone());
                store.orders.insert(order.id.clone(), order);
            }
            tracing::info!(
                path = %path.display(),
                count = store.orders.len(),
                "transaction snapshot loaded"
            );
        }

        Ok(store)
    }

    // -- Creation ----------------------------------------------------------

    /// Create a new order in `pending`.
    ///
    /// Rejects a zero amount and a duplicate order number — the order
    /// number is generated once per checkout attempt and must stay
    /// unique for the lifetime of the store.
    pub fn create(&self, new: NewOrder) -> Result<PaymentOrder, GatewayError> {
        if new.amount == 0 {
            return Err(GatewayError::Validation(
                "amount must be a positive integer".into(),
            ));
        }
        if new.order_number.trim().is_empty() {
            return Err(GatewayError::Validation("orderId must not be empty".into()));
        }
        if self.by_order_number.contains_key(&new.order_number) {
            return Err(GatewayError::Validation(format!(
                "duplicate orderId: {}",
                new.order_number
            )));
        }

        let order = PaymentOrder::create(new);
        self.by_order_number
            .insert(order.order_number.clone(), order.id.clone());
        self.orders.insert(order.id.clone(), order.clone());
        self.persist()?;
        Ok(order)
    }

    /// Fetch the existing order for an order number, or create one.
    ///
    /// The checkout-initiation path: retries reuse the same order
    /// number, so the record must survive across attempts. A stored
    /// amount that disagrees with the retry's amount is a hard
    /// validation failure — retrying with a different amount is a new
    /// checkout, not a retry.
    pub fn get_or_create(&self, new: NewOrder) -> Result<PaymentOrder, GatewayError> {
        if let Some(existing) = self.get_by_order_number(&new.order_number) {
            if existing.amount != new.amount {
                return Err(GatewayError::Validation(format!(
                    "orderId {} already exists with amount {}, got {}",
                    existing.order_number, existing.amount, new.amount
                )));
            }
            return Ok(existing);
        }
        self.create(new)
    }

    // -- Lookup ------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<PaymentOrder> {
        self.orders.get(id).map(|r| r.clone())
    }

    pub fn get_by_order_number(&self, order_number: &str) -> Option<PaymentOrder> {
        let id = self.by_order_number.get(order_number)?.clone();
        self.get(&id)
    }

    /// All orders matching the filter, oldest first (file order in the
    /// original backend).
    pub fn list(&self, filter: &ListFilter) -> Vec<PaymentOrder> {
        let mut out: Vec<PaymentOrder> = self
            .orders
            .iter()
            .map(|r| r.clone())
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| filter.provider.map_or(true, |p| o.provider == p))
            .filter(|o| filter.start_date.map_or(true, |d| o.created_at >= d))
            .filter(|o| filter.end_date.map_or(true, |d| o.created_at <= d))
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    // -- Mutation ----------------------------------------------------------

    /// Apply a status transition atomically with respect to this order.
    ///
    /// The read-validate-write happens inside the map entry guard;
    /// concurrent transitions on the same order number serialize here.
    /// On an applied terminal transition, the notification fires
    /// exactly once, after the guard is released — sink failures do
    /// not roll anything back. A duplicate terminal outcome returns
    /// `NoOp` so the caller can still ack the provider.
    pub fn transition(
        &self,
        order_number: &str,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, GatewayError> {
        let id = self
            .by_order_number
            .get(order_number)
            .map(|r| r.clone())
            .ok_or_else(|| GatewayError::NotFound(order_number.to_string()))?;

        // Critical section: everything between get_mut and the guard
        // drop is atomic per order.
        let (outcome, event) = {
            let mut entry = self
                .orders
                .get_mut(&id)
                .ok_or_else(|| GatewayError::NotFound(order_number.to_string()))?;

            let outcome = state::evaluate(order_number, entry.status, request.to, request.actor)?;

            match outcome {
                TransitionOutcome::Applied { from, to } => {
                    let now = Utc::now();
                    entry.status = to;
                    entry.updated_at = now;
                    if let Some(ptid) = request.provider_transaction_id {
                        entry.provider_transaction_id = Some(ptid);
                    }
                    entry.audit.push(AuditEntry {
                        from,
                        to,
                        actor: request.actor,
                        at: now,
                        note: request.note,
                    });

                    let event = to.is_terminal().then(|| NotificationEvent {
                        order_number: entry.order_number.clone(),
                        new_status: to,
                        customer_email: entry.customer_email.clone(),
                    });
                    (TransitionOutcome::Applied { from, to }, event)
                }
                TransitionOutcome::NoOp { status } => {
                    tracing::debug!(
                        order_number,
                        status = %status,
                        "duplicate transition delivery, no-op"
                    );
                    (outcome, None)
                }
            }
        };

        if outcome.was_applied() {
            self.persist()?;
            if let Some(event) = event {
                self.sink.notify(&event);
            }
        }
        Ok(outcome)
    }

    /// Transition addressed by store id (admin API path).
    pub fn transition_by_id(
        &self,
        id: &str,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, GatewayError> {
        let order_number = self
            .get(id)
            .map(|o| o.order_number)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        self.transition(&order_number, request)
    }

    /// Merge admin-supplied payment details into an order's metadata.
    pub fn merge_metadata(
        &self,
        id: &str,
        details: serde_json::Value,
    ) -> Result<PaymentOrder, GatewayError> {
        let updated = {
            let mut entry = self
                .orders
                .get_mut(id)
                .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
            if let (Some(meta), Some(patch)) = (entry.metadata.as_object_mut(), details.as_object())
            {
                for (k, v) in patch {
                    meta.insert(k.clone(), v.clone());
                }
            } else {
                entry.metadata = details;
            }
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.persist()?;
        Ok(updated)
    }

    /// Remove an order entirely (administrative purge).
    pub fn delete(&self, id: &str) -> Result<(), GatewayError> {
        let (_, order) = self
            .orders
            .remove(id)
            .ok_or_else(|| GatewayError::NotFound(id.to_string()))?;
        self.by_order_number.remove(&order.order_number);
        self.persist()
    }

    // -- Verification helpers ---------------------------------------------

    /// Cross-check a callback-reported amount against the stored order.
    ///
    /// The reported amount must be bit-identical after unit
    /// conversion; a mismatch is a hard verification failure even when
    /// the signature over the callback fields is valid.
    pub fn verify_amount(&self, order_number: &str, reported: u64) -> Result<(), GatewayError> {
        let order = self
            .get_by_order_number(order_number)
            .ok_or_else(|| GatewayError::NotFound(order_number.to_string()))?;
        if order.amount != reported {
            return Err(GatewayError::AmountMismatch {
                order_number: order_number.to_string(),
                reported,
                stored: order.amount,
            });
        }
        Ok(())
    }

    // -- Maintenance -------------------------------------------------------

    /// Fail orders stuck in `pending`/`processing` longer than `window`.
    ///
    /// Only providers that expect an asynchronous gateway
    /// confirmation are swept; bank-transfer and COD orders stay
    /// pending until an admin settles them, however long that takes.
    /// Returns the order numbers that were actually transitioned.
    /// Candidates are collected first, then transitioned through the
    /// normal guarded path — the sweep never bypasses the state
    /// machine, and a callback racing the sweep simply wins or loses
    /// the per-order critical section.
    pub fn expire_stale(&self, window: std::time::Duration) -> Vec<String> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::seconds(600));

        let candidates: Vec<String> = self
            .orders
            .iter()
            .filter(|o| {
                o.provider.expects_gateway_callback()
                    && matches!(
                        o.status,
                        TransactionStatus::Pending | TransactionStatus::Processing
                    )
                    && o.updated_at < cutoff
            })
            .map(|o| o.order_number.clone())
            .collect();

        let mut expired = Vec::new();
        for order_number in candidates {
            let request = TransitionRequest::new(TransactionStatus::Failed, Actor::System)
                .with_note("no gateway confirmation within the timeout window");
            match self.transition(&order_number, request) {
                Ok(outcome) if outcome.was_applied() => {
                    tracing::warn!(order_number = %order_number, "stale order failed by sweeper");
                    expired.push(order_number);
                }
                Ok(_) => {}
                Err(e) => {
                    // Lost the race to a real callback — that's fine.
                    tracing::debug!(order_number = %order_number, error = %e, "sweep skipped");
                }
            }
        }
        expired
    }

    /// Aggregate counts and sums, grouped by status and by provider.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            total: 0,
            pending: 0,
            processing: 0,
            completed: 0,
            failed: 0,
            refunded: 0,
            total_amount: 0,
            by_payment_method: BTreeMap::new(),
        };

        for order in self.orders.iter() {
            stats.total += 1;
            match order.status {
                TransactionStatus::Pending => stats.pending += 1,
                TransactionStatus::Processing => stats.processing += 1,
                TransactionStatus::Completed => stats.completed += 1,
                TransactionStatus::Failed => stats.failed += 1,
                TransactionStatus::Refunded => stats.refunded += 1,
            }

            let entry = stats
                .by_payment_method
                .entry(order.provider.as_str().to_string())
                .or_default();
            entry.count += 1;
            if order.status == TransactionStatus::Completed {
                entry.amount += order.amount;
                stats.total_amount += order.amount;
            }
        }
        stats
    }

    // -- Persistence -------------------------------------------------------

    /// Write the full snapshot: temp file, then atomic rename.
    ///
    /// Must not be called while holding a map entry guard — it
    /// iterates the map.
    fn persist(&self) -> Result<(), GatewayError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let _guard = self.snapshot_lock.lock();

        let mut records: Vec<PaymentOrder> = self.orders.iter().map(|r| r.clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let body = serde_json::to_vec_pretty(&records)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::notify::testing::RecordingSink;

    fn new_order(order_number: &str, amount: u64, provider: Provider) -> NewOrder {
        NewOrder {
            order_number: order_number.into(),
            amount,
            currency: None,
            provider,
            customer_name: Some("Test Customer".into()),
            customer_email: Some("customer@example.com".into()),
            items: None,
            metadata: None,
        }
    }

    fn store_with_sink() -> (TransactionStore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let store = TransactionStore::in_memory(sink.clone());
        (store, sink)
    }

    #[test]
    fn create_and_lookup() {
        let (store, _) = store_with_sink();
        let order = store
            .create(new_order("HD00000001", 1_000_000, Provider::Vnpay))
            .unwrap();

        assert_eq!(store.get(&order.id).unwrap().order_number, "HD00000001");
        assert_eq!(
            store.get_by_order_number("HD00000001").unwrap().id,
            order.id
        );
    }

    #[test]
    fn duplicate_order_number_rejected() {
        let (store, _) = store_with_sink();
        store
            .create(new_order("HD00000001", 1_000, Provider::Momo))
            .unwrap();
        let err = store
            .create(new_order("HD00000001", 1_000, Provider::Momo))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn zero_amount_rejected() {
        let (store, _) = store_with_sink();
        let err = store
            .create(new_order("HD00000001", 0, Provider::Momo))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn get_or_create_reuses_record_across_retries() {
        let (store, _) = store_with_sink();
        let first = store
            .get_or_create(new_order("HD00000001", 50_000, Provider::Zalopay))
            .unwrap();
        let second = store
            .get_or_create(new_order("HD00000001", 50_000, Provider::Zalopay))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_or_create_rejects_amount_drift() {
        let (store, _) = store_with_sink();
        store
            .get_or_create(new_order("HD00000001", 50_000, Provider::Zalopay))
            .unwrap();
        let err = store
            .get_or_create(new_order("HD00000001", 60_000, Provider::Zalopay))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn successful_flow_notifies_once() {
        let (store, sink) = store_with_sink();
        store
            .create(new_order("HD00000001", 1_000_000, Provider::Momo))
            .unwrap();

        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();
        assert_eq!(sink.count(), 0); // processing is not terminal

        let outcome = store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway)
                    .with_provider_transaction_id("2547890123"),
            )
            .unwrap();
        assert!(outcome.was_applied());
        assert_eq!(sink.count(), 1);

        let order = store.get_by_order_number("HD00000001").unwrap();
        assert_eq!(order.status, TransactionStatus::Completed);
        assert_eq!(order.provider_transaction_id.as_deref(), Some("2547890123"));
        assert_eq!(order.audit.len(), 2);
    }

    #[test]
    fn duplicate_callback_is_noop_and_does_not_renotify() {
        let (store, sink) = store_with_sink();
        store
            .create(new_order("HD00000001", 1_000_000, Provider::Vnpay))
            .unwrap();
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway),
            )
            .unwrap();

        // Second arrival of the same outcome: no-op, still one event.
        let outcome = store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway),
            )
            .unwrap();
        assert!(!outcome.was_applied());
        assert_eq!(sink.count(), 1);
    }

    #[test]
    fn illegal_transition_leaves_status_unchanged() {
        let (store, _) = store_with_sink();
        store
            .create(new_order("HD00000001", 1_000, Provider::Momo))
            .unwrap();
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Failed, Actor::Gateway),
            )
            .unwrap();

        let err = store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway),
            )
            .unwrap_err();
        assert!(matches!(err, GatewayError::IllegalTransition { .. }));
        assert_eq!(
            store.get_by_order_number("HD00000001").unwrap().status,
            TransactionStatus::Failed
        );
    }

    #[test]
    fn amount_verification() {
        let (store, _) = store_with_sink();
        store
            .create(new_order("HD00000001", 1_000_000, Provider::Vnpay))
            .unwrap();

        assert!(store.verify_amount("HD00000001", 1_000_000).is_ok());
        let err = store.verify_amount("HD00000001", 999_999).unwrap_err();
        assert!(matches!(err, GatewayError::AmountMismatch { .. }));
        assert!(matches!(
            store.verify_amount("HD_MISSING", 1).unwrap_err(),
            GatewayError::NotFound(_)
        ));
    }

    #[test]
    fn list_filters() {
        let (store, _) = store_with_sink();
        store
            .create(new_order("HD00000001", 100, Provider::Vnpay))
            .unwrap();
        store
            .create(new_order("HD00000002", 200, Provider::Momo))
            .unwrap();
        store
            .transition(
                "HD00000002",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();

        let all = store.list(&ListFilter::default());
        assert_eq!(all.len(), 2);

        let momo_only = store.list(&ListFilter {
            provider: Some(Provider::Momo),
            ..Default::default()
        });
        assert_eq!(momo_only.len(), 1);
        assert_eq!(momo_only[0].order_number, "HD00000002");

        let pending_only = store.list(&ListFilter {
            status: Some(TransactionStatus::Pending),
            ..Default::default()
        });
        assert_eq!(pending_only.len(), 1);
        assert_eq!(pending_only[0].order_number, "HD00000001");
    }

    #[test]
    fn stats_aggregation() {
        let (store, _) = store_with_sink();
        store
            .create(new_order("HD00000001", 100, Provider::Vnpay))
            .unwrap();
        store
            .create(new_order("HD00000002", 200, Provider::Vnpay))
            .unwrap();
        store
            .create(new_order("HD00000003", 300, Provider::Momo))
            .unwrap();

        for on in ["HD00000001", "HD00000003"] {
            store
                .transition(
                    on,
                    TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
                )
                .unwrap();
            store
                .transition(
                    on,
                    TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway),
                )
                .unwrap();
        }

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total_amount, 400);
        assert_eq!(stats.by_payment_method["vnpay"].count, 2);
        assert_eq!(stats.by_payment_method["vnpay"].amount, 100);
        assert_eq!(stats.by_payment_method["momo"].amount, 300);
    }

    #[test]
    fn expire_stale_fails_old_orders_through_the_state_machine() {
        let (store, sink) = store_with_sink();
        store
            .create(new_order("HD00000001", 100, Provider::Vnpay))
            .unwrap();
        store
            .create(new_order("HD00000002", 200, Provider::Momo))
            .unwrap();
        store
            .transition(
                "HD00000002",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();

        // Zero window: everything non-terminal is stale immediately.
        let expired = store.expire_stale(std::time::Duration::from_secs(0));
        assert_eq!(expired.len(), 2);
        assert_eq!(
            store.get_by_order_number("HD00000001").unwrap().status,
            TransactionStatus::Failed
        );
        // Two terminal transitions, two notifications.
        assert_eq!(sink.count(), 2);

        // Second sweep: nothing left to expire.
        assert!(store.expire_stale(std::time::Duration::from_secs(0)).is_empty());
    }

    #[test]
    fn expire_stale_leaves_manual_settlement_orders_alone() {
        // Bank transfers wait for an admin to sight the statement and
        // COD waits for delivery — neither has a callback window, so
        // the sweeper must never fail them.
        let (store, sink) = store_with_sink();
        store
            .create(new_order("HD00000001", 100, Provider::BankTransfer))
            .unwrap();
        store
            .create(new_order("HD00000002", 200, Provider::Cod))
            .unwrap();
        store
            .create(new_order("HD00000003", 300, Provider::Zalopay))
            .unwrap();

        let expired = store.expire_stale(std::time::Duration::from_secs(0));
        assert_eq!(expired, vec!["HD00000003".to_string()]);
        assert_eq!(
            store.get_by_order_number("HD00000001").unwrap().status,
            TransactionStatus::Pending
        );
        assert_eq!(
            store.get_by_order_number("HD00000002").unwrap().status,
            TransactionStatus::Pending
        );
        assert_eq!(sink.count(), 1);

        // The pending->completed admin edge still works afterwards.
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Completed, Actor::Admin),
            )
            .unwrap();
        assert_eq!(
            store.get_by_order_number("HD00000001").unwrap().status,
            TransactionStatus::Completed
        );
    }

    #[test]
    fn snapshot_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.json");
        let sink = Arc::new(RecordingSink::default());

        {
            let store = TransactionStore::with_snapshot(&path, sink.clone()).unwrap();
            store
                .create(new_order("HD00000001", 1_000, Provider::Zalopay))
                .unwrap();
            store
                .transition(
                    "HD00000001",
                    TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
                )
                .unwrap();
        }

        // Reopen: the record and its status survive.
        let reopened = TransactionStore::with_snapshot(&path, sink).unwrap();
        assert_eq!(reopened.len(), 1);
        let order = reopened.get_by_order_number("HD00000001").unwrap();
        assert_eq!(order.status, TransactionStatus::Processing);
        assert_eq!(order.audit.len(), 1);
    }

    #[test]
    fn snapshot_file_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transactions.json");
        let sink = Arc::new(RecordingSink::default());
        let store = TransactionStore::with_snapshot(&path, sink).unwrap();
        store
            .create(new_order("HD00000001", 1_000, Provider::Cod))
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(parsed.is_array());
        assert_eq!(parsed[0]["orderId"], "HD00000001");
    }

    #[test]
    fn delete_removes_both_indexes() {
        let (store, _) = store_with_sink();
        let order = store
            .create(new_order("HD00000001", 1_000, Provider::Cod))
            .unwrap();
        store.delete(&order.id).unwrap();
        assert!(store.get(&order.id).is_none());
        assert!(store.get_by_order_number("HD00000001").is_none());
        assert!(matches!(
            store.delete(&order.id).unwrap_err(),
            GatewayError::NotFound(_)
        ));
    }

    #[test]
    fn concurrent_transitions_apply_exactly_once() {
        use std::thread;

        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(TransactionStore::in_memory(sink.clone()));
        store
            .create(new_order("HD00000001", 1_000, Provider::Momo))
            .unwrap();
        store
            .transition(
                "HD00000001",
                TransitionRequest::new(TransactionStatus::Processing, Actor::Customer),
            )
            .unwrap();

        // Callback and IPN arriving near-simultaneously.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.transition(
                        "HD00000001",
                        TransitionRequest::new(TransactionStatus::Completed, Actor::Gateway),
                    )
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let applied = outcomes
            .iter()
            .filter(|r| matches!(r, Ok(o) if o.was_applied()))
            .count();
        let noops = outcomes
            .iter()
            .filter(|r| matches!(r, Ok(o) if !o.was_applied()))
            .count();

        assert_eq!(applied, 1);
        assert_eq!(noops, 7);
        assert_eq!(sink.count(), 1);
    }
}
