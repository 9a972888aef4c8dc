//! inrooms-sync - Stripe subscription state synchronizer
//!
//! Verifies Stripe webhooks, resolves each event to an internal user and
//! commits the subscription state to Postgres. A transactional outbox feeds
//! the user documents the front-end reads from Firestore.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;
