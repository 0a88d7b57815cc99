use quotation_service::config::QuotationConfig;
use quotation_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = QuotationConfig::load()?;

    init_tracing("quotation-service", &config.common.log_level);

    tracing::info!(
        port = config.common.port,
        scheduler_enabled = config.scheduler.enabled,
        "Starting quotation-service"
    );

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    Ok(())
}
