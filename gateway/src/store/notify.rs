//! Notification sink for terminal transitions.
//!
//! The state machine emits one event per applied terminal transition
//! (`completed`, `failed`, `refunded`). Delivery is best-effort: a
//! sink failure is logged and swallowed, never rolled back into the
//! transition. Real email delivery lives outside this repository; the
//! shipped sink writes structured log lines.

use serde::Serialize;

use crate::store::record::TransactionStatus;

/// What the sink receives for each terminal transition.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub order_number: String,
    pub new_status: TransactionStatus,
    pub customer_email: Option<String>,
}

/// Abstract delivery target. Implementations must be cheap and must
/// not block the transition path for long — they run after the order
/// lock is released, but still inline with request handling.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &NotificationEvent);
}

/// Default sink: structured log lines. What the original backend did
/// with its console "email service", minus the pretense.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, event: &NotificationEvent) {
        tracing::info!(
            order_number = %event.order_number,
            new_status = %event.new_status,
            customer_email = event.customer_email.as_deref().unwrap_or("-"),
            "payment notification"
        );
    }
}

#[cfg(test)]
pub mod testing {
    //! A sink that records events for assertions.

    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().clone()
        }

        pub fn count(&self) -> usize {
            self.events.lock().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn notify(&self, event: &NotificationEvent) {
            self.events.lock().push(event.clone());
        }
    }
}
