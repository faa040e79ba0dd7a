//! Ingest stage worker binary (§4.3): reads inbox objects, archives them,
//! and publishes a verification message for [`sda_worker::VerifyHandler`].

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sda_broker::AmqpBroker;
use sda_core::config::{self, BrokerConfig, DatabaseConfig, SchemaConfig, StorageConfig};
use sda_db::{DatabasePool, PostgresStore};
use sda_schema::SchemaValidator;
use sda_worker::{handlers::IngestHandler, run_worker, LocalObjectStore, NoopReencryptor};

#[derive(Parser)]
#[command(name = "sda-ingest-worker", about = "Sensitive Data Archive ingest worker")]
struct Cli {
    #[arg(short, long, env = "SDA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!(%err, "❌ ingest worker exited with an error");
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
    let schema_config: SchemaConfig = config::load(config_path, "SCHEMA_")?;
    let storage_config: StorageConfig = config::load(config_path, "STORAGE_")?;
    storage_config.validate()?;

    let validator = Arc::new(SchemaValidator::load(
        std::path::Path::new(&schema_config.dir),
        schema_config.profile,
    )?);

    let db_pool = DatabasePool::new(&db_config).await?;
    let store = PostgresStore::new(db_pool).await?;

    let broker = AmqpBroker::connect(broker_config, validator.clone()).await?;

    let objects = Arc::new(LocalObjectStore::new(storage_config.root.clone()));
    let reencryptor = Arc::new(NoopReencryptor);
    let handler = IngestHandler::new(objects, reencryptor, format!("{}/archive", storage_config.root));

    info!("🚀 ingest worker ready, consuming from queue \"ingest\"");
    run_worker(&handler, &broker, &store, &validator).await
}
