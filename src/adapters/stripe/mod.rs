//! Stripe adapter - read access to the Stripe REST API.
//!
//! Webhook verification lives in the domain (`StripeWebhookVerifier`); this
//! adapter only fetches objects a webhook payload does not carry, such as the
//! email of a customer.

mod stripe_api;

pub use stripe_api::{StripeApiClient, StripeApiConfig, StripeApiError};
