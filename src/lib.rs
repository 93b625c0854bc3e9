//! Checkout and payment orchestration for a delivery marketplace.
//!
//! The flow is split into cart revalidation, authoritative pricing, payment
//! method selection, order submission and settlement resumption after a
//! gateway round-trip. External services are reached through the traits in
//! [`ports`]; [`infrastructure`] holds the HTTP, file and logging adapters.

pub mod api;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;
