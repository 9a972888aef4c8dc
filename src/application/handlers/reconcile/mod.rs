//! Reconciliation handlers.
//!
//! Compares every user document with the relational summary and repairs
//! drift the relay could not (exhausted retries, manual edits, restores).

mod reconcile_documents;

pub use reconcile_documents::{
    ReconcileDocumentsCommand, ReconcileDocumentsHandler, ReconcileReport,
};
