//! Admin API entry point (C4): loads configuration, builds the concrete
//! Postgres/AMQP/JWT collaborators, erases them behind their trait objects,
//! and serves until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sda_api::{auth::JwtVerifier, server::Server, AppState};
use sda_broker::AmqpBroker;
use sda_core::config::{self, ApiConfig, BrokerConfig, DatabaseConfig, SchemaConfig};
use sda_db::{DatabasePool, PostgresStore};
use sda_schema::SchemaValidator;

#[derive(Parser)]
#[command(name = "sda-admin-api", about = "Sensitive Data Archive admin API")]
struct Cli {
    /// Path to a TOML config file; falls back to per-component env vars.
    #[arg(short, long, env = "SDA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!(%err, "❌ admin API exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> sda_core::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let db_config: DatabaseConfig = config::load(config_path, "DB_")?;
    db_config.validate()?;
    let broker_config: BrokerConfig = config::load(config_path, "BROKER_")?;
    broker_config.validate()?;
    let api_config: ApiConfig = config::load(config_path, "API_")?;
    api_config.validate()?;
    let schema_config: SchemaConfig = config::load(config_path, "SCHEMA_")?;

    info!("🔧 loading schema set");
    let validator = Arc::new(SchemaValidator::load(
        std::path::Path::new(&schema_config.dir),
        schema_config.profile,
    )?);

    info!("🔧 connecting to database");
    let db_pool = DatabasePool::new(&db_config).await?;
    let store: Arc<dyn sda_core::traits::FileStore> = Arc::new(PostgresStore::new(db_pool.clone()).await?);

    info!("🔧 connecting to broker");
    let broker = Arc::new(AmqpBroker::connect(broker_config, validator).await?);
    let broker_transport: Arc<dyn sda_broker::BrokerTransport> = broker.clone();

    info!("🔧 loading JWT verifier");
    let verifier = JwtVerifier::load(&api_config).await?;

    let state = AppState::new(api_config.clone(), store, broker_transport, verifier);
    let server = Server::bind(&api_config, state).await?;

    info!("🚀 admin API ready");
    server.serve().await?;

    info!("closing broker connection and database pool");
    drop(broker);
    db_pool.pool().close().await;

    Ok(())
}
