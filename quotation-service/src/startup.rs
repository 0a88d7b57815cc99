//! Application startup and lifecycle management.

use crate::config::QuotationConfig;
use crate::handlers::{health, portal, quotations, tax_config};
use crate::scheduler::{
    ApprovalEscalationSweep, ExpirationSweep, PendingResponseFollowUpSweep, SchedulerRunner,
    Sweep, UnviewedReminderSweep,
};
use crate::services::approvals::{ApprovalGateway, DiscountThresholdGateway};
use crate::services::notifier::{MockNotifier, Notifier, SmtpNotifier};
use crate::services::{metrics, PgStore, QuotationService, QuotationStore, TaxConfigService};
use axum::{
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub quotations: QuotationService,
    pub tax_config: TaxConfigService,
    pub pg: Option<PgStore>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Client portal: token-authenticated, no actor headers.
        .route("/portal/quotations/:id", get(portal::view_quotation))
        .route(
            "/portal/quotations/:id/response",
            post(portal::submit_response),
        )
        // Internal quotation API.
        .route("/quotations", post(quotations::create_quotation))
        .route(
            "/quotations/:id",
            get(quotations::get_quotation)
                .put(quotations::update_quotation)
                .delete(quotations::delete_quotation),
        )
        .route("/quotations/:id/send", post(quotations::send_quotation))
        .route("/quotations/:id/resend", post(quotations::resend_quotation))
        .route("/quotations/:id/history", get(quotations::get_history))
        .route("/quotations/:id/links", get(quotations::get_links))
        // Tax configuration.
        .route(
            "/tax/countries",
            post(tax_config::create_country).get(tax_config::list_countries),
        )
        .route("/tax/frameworks", post(tax_config::create_framework))
        .route("/tax/frameworks/:id", get(tax_config::get_framework))
        .route(
            "/tax/frameworks/:id/rates",
            get(tax_config::list_framework_rates),
        )
        .route(
            "/tax/jurisdictions",
            post(tax_config::create_jurisdiction).get(tax_config::list_jurisdictions),
        )
        .route(
            "/tax/categories",
            post(tax_config::create_category).get(tax_config::list_categories),
        )
        .route("/tax/rates", post(tax_config::create_tax_rate))
        .route("/tax/rates/:id", get(tax_config::get_tax_rate))
        // Operational endpoints.
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(health::metrics_endpoint))
        .layer(axum::middleware::from_fn(
            crate::middleware::metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
    scheduler: SchedulerRunner,
    scheduler_enabled: bool,
}

impl Application {
    /// Build the application: database, services, scheduler, listener.
    pub async fn build(config: QuotationConfig) -> Result<Self, AppError> {
        metrics::init_metrics();

        let pg = PgStore::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        pg.run_migrations().await?;

        let store: Arc<dyn QuotationStore> = Arc::new(pg.clone());

        let notifier: Arc<dyn Notifier> = if config.smtp.enabled {
            match SmtpNotifier::new(config.smtp.clone()) {
                Ok(n) => {
                    tracing::info!("SMTP notifier initialized");
                    Arc::new(n)
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}. Using mock.", e);
                    Arc::new(MockNotifier::new())
                }
            }
        } else {
            tracing::info!("SMTP disabled, using mock notifier");
            Arc::new(MockNotifier::new())
        };

        let approvals: Arc<dyn ApprovalGateway> = Arc::new(DiscountThresholdGateway::new(
            config.approvals.max_unapproved_discount,
        ));

        let quotation_service = QuotationService::new(
            store.clone(),
            approvals.clone(),
            notifier.clone(),
            config.links.ttl_days,
            config.links.portal_base_url.clone(),
        );
        let tax_config_service = TaxConfigService::new(store.clone());

        let sweeps: Vec<Arc<dyn Sweep>> = vec![
            Arc::new(ExpirationSweep::new(
                store.clone(),
                config.scheduler.daily_hour,
            )),
            Arc::new(UnviewedReminderSweep::new(
                store.clone(),
                notifier.clone(),
                config.scheduler.reminder_threshold_days,
                config.scheduler.daily_hour,
            )),
            Arc::new(PendingResponseFollowUpSweep::new(
                store.clone(),
                notifier.clone(),
                config.scheduler.follow_up_threshold_days,
                config.scheduler.daily_hour,
            )),
            Arc::new(ApprovalEscalationSweep::new(
                store.clone(),
                approvals,
                config.scheduler.escalation_threshold_hours,
            )),
        ];
        let scheduler = SchedulerRunner::new(sweeps);

        let state = AppState {
            quotations: quotation_service,
            tax_config: tax_config_service,
            pg: Some(pg),
        };

        // Port 0 gives a random port for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "quotation-service listening");

        Ok(Self {
            port,
            listener,
            state,
            scheduler,
            scheduler_enabled: config.scheduler.enabled,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run until the process receives SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        if self.scheduler_enabled {
            self.scheduler.start();
        } else {
            tracing::info!("Scheduler disabled by configuration");
        }

        let shutdown_token = self.scheduler.shutdown_token();
        let router = build_router(self.state);

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        shutdown_token.cancel();

        if let Err(e) = result {
            tracing::error!("HTTP server error: {}", e);
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
