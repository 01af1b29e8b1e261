mod models;
mod service;
mod config;
mod dtos;
mod error;
mod db;
mod utils;
mod middleware;
mod handler;
mod routes;

use std::{str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use db::{db::DBClient, SettlementStore};
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{
    background_jobs::start_transfer_reconciliation_job,
    contract_graph::ContractGraph,
    escrow_service::EscrowLedger,
    inspection_service::InspectionGate,
    payment_provider::StripeTransferProvider,
    payout_service::PayoutEngine,
    wallet_ledger::WalletLedger,
};
use utils::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<dyn SettlementStore>,
    // Services
    pub escrow_ledger: Arc<EscrowLedger>,
    pub inspection_gate: Arc<InspectionGate>,
    pub contract_graph: Arc<ContractGraph>,
    pub payout_engine: Arc<PayoutEngine>,
    pub wallet_ledger: Arc<WalletLedger>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);
        let store: Arc<dyn SettlementStore> = db_client.clone();

        let retry_policy = RetryPolicy::new(
            config.db_retry_max_attempts,
            Duration::from_millis(config.db_retry_base_delay_ms),
        );
        let payout_engine = PayoutEngine::new(
            store.clone(),
            Arc::new(StripeTransferProvider::new(&config)),
            db_client,
            retry_policy,
        );

        Self {
            escrow_ledger: Arc::new(EscrowLedger::new(store.clone())),
            inspection_gate: Arc::new(InspectionGate::new(store.clone())),
            contract_graph: Arc::new(ContractGraph::new(store.clone())),
            payout_engine: Arc::new(payout_engine),
            wallet_ledger: Arc::new(WalletLedger::new(store.clone())),
            db_client: store,
            env: config,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from_str(&config.rust_log_level).unwrap_or(LevelFilter::DEBUG))
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;
    tracing::info!("Connection to the database is successful");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let allowed_origins = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST]);

    let app_state = Arc::new(AppState::new(DBClient::new(pool), config.clone()));

    tokio::spawn(start_transfer_reconciliation_job(app_state.clone()));

    let app = create_router(app_state).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .context("Failed to bind listener")?;

    axum::serve(listener, app).await?;

    Ok(())
}
