use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pix_settlement::adapters::{
    InMemoryBookingLedger, InMemoryTransactionStore, PostgresBookingLedger,
    PostgresTransactionStore,
};
use pix_settlement::cli::{self, Cli, CodeCommands, Commands, DbCommands, TxCommands};
use pix_settlement::config::{Config, LogFormat};
use pix_settlement::services::run_sweeper;
use pix_settlement::{create_app, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve { in_memory: false }) {
        Commands::Serve { in_memory } => serve(config, in_memory).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config { check } => cli::handle_config(&config, check).await,
        Commands::Sweep { window_minutes } => {
            let state = cli::connect_state(config).await?;
            cli::handle_sweep(&state, window_minutes).await
        }
        Commands::Tx(TxCommands::Status { tx_id }) => {
            let state = cli::connect_state(config).await?;
            cli::handle_tx_status(&state, tx_id).await
        }
        Commands::Tx(TxCommands::Confirm {
            tx_id,
            bank_tx_id,
            operator,
        }) => {
            let state = cli::connect_state(config).await?;
            cli::handle_tx_confirm(&state, tx_id, &bank_tx_id, &operator).await
        }
        Commands::Code(CodeCommands::Encode {
            amount,
            reference,
            description,
        }) => cli::handle_code_encode(
            &config,
            &amount,
            reference.as_deref(),
            description.as_deref(),
        ),
        Commands::Code(CodeCommands::Decode { payload }) => cli::handle_code_decode(&payload),
    }
}

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
    );

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(config: Config, in_memory: bool) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let sweep_interval = config.sweep.interval_secs;

    let state = if in_memory {
        tracing::warn!("Running with in-memory storage; state is lost on exit");
        AppState::new(
            config,
            Arc::new(InMemoryTransactionStore::new()),
            Arc::new(InMemoryBookingLedger::new()),
        )
    } else {
        let pool = db::create_pool(&config).await?;
        db::run_migrations(&pool).await?;
        AppState::new(
            config,
            Arc::new(PostgresTransactionStore::new(pool.clone())),
            Arc::new(PostgresBookingLedger::new(pool)),
        )
    };

    if state.config.webhook.secret.is_none() {
        tracing::warn!("PIX_WEBHOOK_SECRET is not set; bank webhooks will be rejected");
    }
    match state.poller.bank_client() {
        Some(client) => tracing::info!(base_url = %client.base_url(), "Bank API polling enabled"),
        None => tracing::info!("PIX_BANK_API_URL not set; status checks use local state only"),
    }

    if sweep_interval > 0 {
        tracing::info!(interval_secs = sweep_interval, "Starting reconciliation sweeper");
        tokio::spawn(run_sweeper(
            state.sweeper.clone(),
            Duration::from_secs(sweep_interval),
        ));
    }

    let app = create_app(state);

    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
