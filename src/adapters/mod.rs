//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `postgres` - Billing store, ledger, outbox and dead letters (source of truth)
//! - `firestore` - User document projection target
//! - `projection` - Outbox relay into the document store
//! - `stripe` - Stripe REST lookups
//! - `google` - Service account auth and Meet links
//! - `http` - axum endpoints
//! - `memory` - In-memory implementations for tests and local runs

pub mod firestore;
pub mod google;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod projection;
pub mod stripe;

pub use projection::{ProjectionRelay, ProjectionRelayConfig};
