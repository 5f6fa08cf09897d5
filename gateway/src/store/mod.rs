//! # Transaction Store
//!
//! Order records, the status state machine, the concurrent keyed
//! store, and post-transition notifications.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `record` | `PaymentOrder` and its JSON contract |
//! | `state` | Pure transition rules, no storage access |
//! | `keyed` | `DashMap`-backed store with JSON snapshot |
//! | `notify` | Terminal-transition notification sink |

pub mod keyed;
pub mod notify;
pub mod record;
pub mod state;

pub use keyed::{ListFilter, MethodStats, StoreStats, TransactionStore, TransitionRequest};
pub use notify::{LogNotifier, NotificationEvent, NotificationSink};
pub use record::{Actor, AuditEntry, NewOrder, PaymentOrder, Provider, TransactionStatus};
pub use state::TransitionOutcome;
