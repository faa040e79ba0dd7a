//! Release stage worker binary (§4.3, §4.4 `POST /dataset/release/*dataset`):
//! consumes `release` messages and appends the `released` dataset event.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sda_broker::AmqpBroker;
use sda_core::config::{self, BrokerConfig, DatabaseConfig, SchemaConfig};
use sda_db::{DatabasePool, PostgresStore};
use sda_schema::SchemaValidator;
use sda_worker::{handlers::ReleaseHandler, run_worker};

#[derive(Parser)]
#[command(name = "sda-release-worker", about = "Sensitive Data Archive release worker")]
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
        error!(%err, "❌ release worker exited with an error");
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

    let validator = Arc::new(SchemaValidator::load(
        std::path::Path::new(&schema_config.dir),
        schema_config.profile,
    )?);

    let db_pool = DatabasePool::new(&db_config).await?;
    let store = PostgresStore::new(db_pool).await?;

    let broker = AmqpBroker::connect(broker_config, validator.clone()).await?;

    let handler = ReleaseHandler::new();

    info!("🚀 release worker ready, consuming from queue \"release\"");
    run_worker(&handler, &broker, &store, &validator).await
}
