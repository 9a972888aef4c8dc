//! Billing domain module.
//!
//! Stripe webhook vocabulary and the rules for projecting billing events onto
//! the user's subscription summary.
//!
//! # Module Structure
//!
//! - `stripe_event` / `stripe_objects` - Webhook envelope and payload objects
//! - `webhook_verifier` - HMAC signature verification
//! - `webhook_processor` - Idempotent dispatch with dead-lettering
//! - `identity` - Identity hints and resolution errors
//! - `plan` - Price id to plan tier and quota
//! - `status` - Provider and access statuses
//! - `changes` / `summary` - Change sets and the guarded user summary

mod changes;
mod identity;
mod plan;
mod status;
mod stripe_event;
mod stripe_objects;
mod summary;
mod webhook_errors;
mod webhook_processor;
mod webhook_verifier;

pub use changes::{
    BillingChange, ChangeSet, CheckoutSessionRecord, CommitOutcome, CustomerRecord,
    InvoiceRecord, PaymentMethodRecord, SubscriptionRecord, SubscriptionSummaryUpdate,
};
pub use identity::{
    IdentityHints, ResolutionError, ResolvedBy, ResolvedIdentity, USER_ID_METADATA_KEYS,
};
pub use plan::{PlanCatalog, PlanEntry, PlanError, PlanTier};
pub use status::{AccessStatus, SubscriptionStatus};
pub use stripe_event::{StripeEvent, StripeEventData, StripeEventType};
pub use stripe_objects::{
    from_unix, Expandable, StripeCheckoutSession, StripeCustomer, StripeInvoice,
    StripePaymentMethod, StripeSubscription,
};
pub use summary::{Applied, SubscriptionDoc, SubscriptionSummary, UserAccount, UserDocument};
pub use webhook_errors::WebhookError;
pub use webhook_processor::{IdempotentWebhookProcessor, WebhookDispatcher, WebhookEventHandler};
pub use webhook_verifier::{SignatureHeader, StripeWebhookVerifier, DEFAULT_TOLERANCE_SECS};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
#[cfg(test)]
pub use webhook_verifier::sign_payload;
