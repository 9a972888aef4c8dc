//! inrooms-sync server binary.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use inrooms_sync::adapters::firestore::FirestoreClient;
use inrooms_sync::adapters::google::{
    GoogleMeetProvider, MockMeetingProvider, ServiceAccountKey, ServiceAccountTokenSource,
    CALENDAR_SCOPE, FIRESTORE_SCOPE,
};
use inrooms_sync::adapters::http::{app_router, ReconcileSettings, SyncAppState};
use inrooms_sync::adapters::postgres::{
    self, PostgresBillingStore, PostgresDeadLetterQueue, PostgresProjectionOutbox,
    PostgresWebhookEventRepository,
};
use inrooms_sync::adapters::projection::{ProjectionRelay, ProjectionRelayConfig};
use inrooms_sync::adapters::stripe::{StripeApiClient, StripeApiConfig};
use inrooms_sync::application::handlers::meeting::CreateMeetingLinkHandler;
use inrooms_sync::application::handlers::sync::BillingEventDispatcher;
use inrooms_sync::config::AppConfig;
use inrooms_sync::domain::billing::{
    IdempotentWebhookProcessor, PlanCatalog, StripeWebhookVerifier,
};
use inrooms_sync::ports::{DocumentStore, MeetingProvider};
use inrooms_sync::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init_tracing(&config.server);
    config.validate().context("invalid configuration")?;

    let pool = postgres::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;

    let catalog = match &config.sync.plan_catalog_path {
        Some(path) => PlanCatalog::load(path).context("failed to load plan catalog")?,
        None => PlanCatalog::default(),
    };
    info!(plans = catalog.len(), "Plan catalog loaded");

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.meeting.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let stripe_config = StripeApiConfig::new(config.payment.stripe_api_key.clone())
        .with_base_url(config.payment.stripe_api_base.clone());
    let gateway = Arc::new(StripeApiClient::new(stripe_config)?);

    let billing = Arc::new(PostgresBillingStore::new(pool.clone()));
    let ledger = Arc::new(PostgresWebhookEventRepository::new(pool.clone()));
    let dead_letters = Arc::new(PostgresDeadLetterQueue::new(pool.clone()));
    let outbox = Arc::new(PostgresProjectionOutbox::new(pool.clone()));

    let documents: Arc<dyn DocumentStore> = {
        let tokens = match (&config.firestore.service_account, config.firestore.uses_emulator()) {
            (_, true) => None,
            (Some(raw), false) => Some(Arc::new(ServiceAccountTokenSource::new(
                ServiceAccountKey::parse(raw)?,
                FIRESTORE_SCOPE,
                http_client.clone(),
            ))),
            (None, false) => {
                warn!("No Firestore credentials configured; requests are unauthenticated");
                None
            }
        };
        Arc::new(FirestoreClient::new(
            &config.firestore.effective_base_url(),
            &config.firestore.project_id,
            &config.firestore.database_id,
            config.firestore.users_collection.clone(),
            tokens,
            Duration::from_secs(config.firestore.timeout_secs),
        )?)
    };

    let meeting_provider: Option<Arc<dyn MeetingProvider>> = match &config.meeting.service_account
    {
        Some(raw) => {
            let tokens = ServiceAccountTokenSource::new(
                ServiceAccountKey::parse(raw)?,
                CALENDAR_SCOPE,
                http_client.clone(),
            )
            .with_subject(config.meeting.delegated_user.clone());
            Some(Arc::new(GoogleMeetProvider::new(
                Arc::new(tokens),
                http_client.clone(),
                config.meeting.api_base.clone(),
                config.meeting.calendar_id.clone(),
            )))
        }
        None => None,
    };
    let mut meetings = CreateMeetingLinkHandler::new(meeting_provider);
    if config.server.is_development() {
        meetings = meetings.with_fallback(Arc::new(MockMeetingProvider::new()));
    }

    let dispatcher =
        BillingEventDispatcher::with_sync_handlers(billing.clone(), gateway, Arc::new(catalog));
    info!(event_types = ?dispatcher.handled_types(), "Webhook handlers registered");
    let processor = Arc::new(IdempotentWebhookProcessor::new(
        ledger.clone(),
        dead_letters.clone(),
        Arc::new(dispatcher),
    ));

    let verifier = StripeWebhookVerifier::new(SecretString::new(
        config.payment.stripe_webhook_secret.clone(),
    ))
    .with_tolerance(config.payment.webhook_tolerance_secs)
    .with_require_livemode(config.payment.require_livemode);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = ProjectionRelay::new(outbox, billing.clone(), documents.clone())
        .with_config(ProjectionRelayConfig::from_sync(&config.sync))
        .with_ledger(ledger);
    let relay_task = tokio::spawn(async move { relay.run(shutdown_rx).await });

    let state = SyncAppState {
        verifier: Arc::new(verifier),
        processor,
        billing,
        documents,
        dead_letters,
        meetings: Arc::new(meetings),
        reconcile: ReconcileSettings {
            page_size: config.sync.reconcile_page_size,
            concurrency: config.sync.reconcile_concurrency,
        },
        admin_token: config
            .admin
            .token
            .clone()
            .map(|token| Arc::new(SecretString::new(token))),
    };
    if state.admin_token.is_none() {
        warn!("No admin token configured; admin API disabled");
    }

    let app = app_router(state, &config.server);
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, environment = ?config.server.environment, "Server is running");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    match relay_task.await {
        Ok(Ok(())) => info!("Projection relay stopped"),
        Ok(Err(e)) => warn!(error = %e, "Projection relay stopped with error"),
        Err(e) => warn!(error = %e, "Projection relay task panicked"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
