//! Projection adapters - keeps the user documents in step with Postgres.

mod outbox_relay;

pub use outbox_relay::{ProjectionRelay, ProjectionRelayConfig, RelayCycle};
