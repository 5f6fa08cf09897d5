// Copyright (c) 2026 Paygate Contributors. MIT License.
// See LICENSE for details.

//! # Paygate — Core Library
//!
//! Payment plumbing for a Vietnamese storefront: the gateway protocol
//! layer (VNPay, Momo, ZaloPay, Viettel Money, PayPal) and the
//! transaction lifecycle behind it.
//!
//! Every Vietnamese gateway speaks its own dialect of the same idea:
//! build a canonical string, HMAC it, compare hex digests. The
//! dialects disagree on everything that matters — hash function, field
//! order, encoding, which key signs which direction — so each one gets
//! its own client and none of them get to improvise.
//!
//! ## Architecture
//!
//! - **signing** — HMAC primitives and the three canonical string
//!   forms. Constant-time comparison, always.
//! - **providers** — One client per gateway. Verified callbacks are
//!   the only thing that leaves this layer.
//! - **store** — Order records, the status state machine, and the
//!   concurrent keyed store. Money state changes go through the state
//!   machine or not at all.
//! - **config** — Environment-driven settings. Secrets never Display.
//! - **error** — The one error taxonomy every layer maps into.
//!
//! ## Design Philosophy
//!
//! 1. Verify, then parse. Unverified bytes stay opaque.
//! 2. A declined payment is a result, not an error. A transport
//!    failure is an error, not a result.
//! 3. If it touches money, it has tests. Plural.

pub mod config;
pub mod error;
pub mod providers;
pub mod signing;
pub mod store;

pub use error::GatewayError;
