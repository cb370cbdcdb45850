use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payment_core::cli::{self, Cli, Commands, DbCommands, TxCommands};
use payment_core::config::{Config, LogFormat};
use payment_core::gateway::{OmiseClient, PaymentGateway};
use payment_core::services::PaymentService;
use payment_core::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config),
        Commands::Tx(TxCommands::Reconcile { charge_id }) => {
            let payments = build_payments(&config).await?.1;
            cli::handle_tx_reconcile(&payments, &charge_id).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_payments(config: &Config) -> anyhow::Result<(sqlx::PgPool, PaymentService)> {
    config.validate()?;
    let pool = db::create_pool(config).await?;

    let gateway: Arc<dyn PaymentGateway> = Arc::new(OmiseClient::new(config.omise_settings())?);
    tracing::info!(api_url = %config.omise_api_url, "Payment gateway client initialized");

    let payments = PaymentService::new(pool.clone(), gateway, config.payments.clone());
    Ok((pool, payments))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let (pool, payments) = build_payments(&config).await?;
    db::run_migrations(&pool).await?;

    let app = create_app(AppState { db: pool, payments });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
