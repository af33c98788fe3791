use rusty_subscriptions_ddd::{
    adapters::mock::{
        installment_fulfillment::InstallmentFulfillment as MockInstallmentFulfillment,
        order_service::OrderService as MockOrderService,
    },
    adapters::policy::DefaultSubscriptionPolicy,
    adapters::postgres::PostgresSubscriptionRepository,
    application::subscription::{ServiceDependencies, process_actionable_subscriptions},
    config::AppConfig,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rusty_subscriptions_ddd=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().expect("Invalid configuration");

    tracing::info!(
        max_connections = config.database_max_connections,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Starting subscription worker"
    );

    // Initialize database connection pool
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    // Initialize adapters
    let service_deps = ServiceDependencies {
        subscription_repository: Arc::new(PostgresSubscriptionRepository::new(pool)),
        order_service: Arc::new(MockOrderService::new()),
        policy: Arc::new(DefaultSubscriptionPolicy::new(
            config.minimum_cancellation_notice_days,
        )),
        fulfillment: Arc::new(MockInstallmentFulfillment::new()),
    };

    // Run the actionable sweep until shutdown
    let mut ticker = tokio::time::interval(config.sweep_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let today = chrono::Local::now().date_naive();
                if let Err(e) = process_actionable_subscriptions(&service_deps, today).await {
                    tracing::error!(error = ?e, "Actionable sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }
}
