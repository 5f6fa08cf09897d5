//! # Transaction State Machine
//!
//! Pure transition rules — no I/O, no locks, no clock. The store
//! applies these rules inside its per-order critical section; this
//! module only answers "may `from` become `to`, requested by whom?".
//!
//! ## Legal edges
//!
//! | From       | To        | Guard                                     |
//! |------------|-----------|-------------------------------------------|
//! | pending    | processing| none (purely local, checkout produced URL)|
//! | pending    | completed | Admin only (bank-transfer confirmation)   |
//! | pending    | failed    | Admin or System (review / timeout)        |
//! | processing | completed | Gateway (verified success) or Admin       |
//! | processing | failed    | any (decline, bad signature, timeout)     |
//! | completed  | refunded  | Admin only — never automatic              |
//!
//! Everything else is rejected. In particular `failed -> completed`
//! has no path, and terminal states ignore duplicate callbacks: a
//! re-delivery of an outcome the order already holds is a
//! distinguished no-op so the HTTP layer can still ack the provider.

use crate::error::GatewayError;
use crate::store::record::{Actor, TransactionStatus};

/// Result of asking the state machine about a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition is legal and should be written.
    Applied {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// The order already holds the requested status. Idempotent
    /// duplicate — write nothing, emit nothing, ack the provider.
    NoOp { status: TransactionStatus },
}

impl TransitionOutcome {
    /// `true` when a write (and possibly a notification) must follow.
    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }
}

/// Decide whether `from -> to` is legal for `actor`.
///
/// Pure function; callers own atomicity. Duplicate terminal outcomes
/// return `Ok(NoOp)`; any other disallowed edge is
/// [`GatewayError::IllegalTransition`].
pub fn evaluate(
    order_number: &str,
    from: TransactionStatus,
    to: TransactionStatus,
    actor: Actor,
) -> Result<TransitionOutcome, GatewayError> {
    use TransactionStatus::*;

    // Idempotency first: re-delivering the status we already hold is
    // a no-op for terminal states. (pending -> pending and
    // processing -> processing are rejected below — re-initiating
    // must go through the retry path, not a self-edge.)
    if from == to && from.is_terminal() {
        return Ok(TransitionOutcome::NoOp { status: from });
    }

    let allowed = match (from, to) {
        (Pending, Processing) => true,
        (Pending, Completed) => actor == Actor::Admin,
        (Pending, Failed) => matches!(actor, Actor::Admin | Actor::System),
        (Processing, Completed) => matches!(actor, Actor::Gateway | Actor::Admin),
        (Processing, Failed) => true,
        (Completed, Refunded) => actor == Actor::Admin,
        _ => false,
    };

    if allowed {
        Ok(TransitionOutcome::Applied { from, to })
    } else {
        Err(GatewayError::IllegalTransition {
            order_number: order_number.to_string(),
            from,
            to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransactionStatus::*;

    fn eval(from: TransactionStatus, to: TransactionStatus, actor: Actor) -> bool {
        evaluate("HD1", from, to, actor)
            .map(|o| o.was_applied())
            .unwrap_or(false)
    }

    #[test]
    fn checkout_path_is_open() {
        assert!(eval(Pending, Processing, Actor::Customer));
        assert!(eval(Processing, Completed, Actor::Gateway));
        assert!(eval(Processing, Failed, Actor::Gateway));
    }

    #[test]
    fn refund_is_admin_only() {
        assert!(eval(Completed, Refunded, Actor::Admin));
        assert!(!eval(Completed, Refunded, Actor::Gateway));
        assert!(!eval(Completed, Refunded, Actor::Customer));
        assert!(!eval(Completed, Refunded, Actor::System));
    }

    #[test]
    fn failed_never_becomes_completed() {
        for actor in [Actor::Customer, Actor::Gateway, Actor::Admin, Actor::System] {
            assert!(evaluate("HD1", Failed, Completed, actor).is_err());
        }
    }

    #[test]
    fn completed_never_reprocesses() {
        assert!(evaluate("HD1", Completed, Processing, Actor::Gateway).is_err());
        assert!(evaluate("HD1", Completed, Pending, Actor::Admin).is_err());
    }

    #[test]
    fn duplicate_terminal_outcome_is_noop() {
        let outcome = evaluate("HD1", Completed, Completed, Actor::Gateway).unwrap();
        assert_eq!(outcome, TransitionOutcome::NoOp { status: Completed });
        assert!(!outcome.was_applied());

        let outcome = evaluate("HD1", Failed, Failed, Actor::Gateway).unwrap();
        assert!(!outcome.was_applied());
    }

    #[test]
    fn non_terminal_self_edge_is_rejected() {
        assert!(evaluate("HD1", Processing, Processing, Actor::Gateway).is_err());
        assert!(evaluate("HD1", Pending, Pending, Actor::Customer).is_err());
    }

    #[test]
    fn gateway_cannot_complete_a_pending_order() {
        // A gateway callback only makes sense once initiation moved
        // the order to processing.
        assert!(!eval(Pending, Completed, Actor::Gateway));
    }

    #[test]
    fn admin_bank_transfer_review() {
        assert!(eval(Pending, Completed, Actor::Admin));
        assert!(eval(Pending, Failed, Actor::Admin));
        assert!(eval(Pending, Failed, Actor::System)); // sweeper
        assert!(!eval(Pending, Failed, Actor::Customer));
    }

    #[test]
    fn refunded_is_fully_terminal() {
        for to in [Pending, Processing, Completed, Failed] {
            assert!(evaluate("HD1", Refunded, to, Actor::Admin).is_err());
        }
    }

    #[test]
    fn illegal_transition_error_carries_context() {
        let err = evaluate("HD42", Failed, Completed, Actor::Admin).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("HD42"));
        assert!(msg.contains("failed"));
        assert!(msg.contains("completed"));
    }
}
