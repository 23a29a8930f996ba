//! Walks through inserts, queries, updates, deletes and aggregation pipelines against
//! the database selected by `DOCSHIM_URI` (MongoDB by default, `memory://` for the
//! in-memory store).

mod records;
mod walkthrough;

use log::{error, info};
use std::process::ExitCode;

use docshim::{
    backend::{DynStoreBackend, StoreBackendBuilder},
    client::{DatabaseClient, DynDatabaseClient},
    config::ClientConfig,
    error::DocumentStoreResult,
    memory::InMemoryStore,
};

async fn build_backend(config: &ClientConfig) -> DocumentStoreResult<Box<dyn DynStoreBackend>> {
    if config.is_memory() {
        info!("using the in-memory document store");
        return Ok(Box::new(InMemoryStore::builder().build().await?));
    }

    #[cfg(feature = "mongodb")]
    {
        info!("using MongoDB database '{}'", config.database);
        return Ok(Box::new(docshim::mongodb::MongoDbStore::builder(config.clone()).build().await?));
    }

    #[cfg(not(feature = "mongodb"))]
    {
        return Err(docshim::error::DocumentStoreError::Initialization(format!(
            "'{}' needs the mongodb feature",
            config.uri
        )));
    }
}

async fn walk_through(client: &DynDatabaseClient) -> DocumentStoreResult<()> {
    walkthrough::insert_and_read(client).await?;
    walkthrough::update(client).await?;
    walkthrough::delete(client).await?;
    walkthrough::aggregate(client).await?;
    walkthrough::lookup(client).await
}

async fn run() -> DocumentStoreResult<()> {
    let config = ClientConfig::from_env()?;
    let client: DynDatabaseClient = DatabaseClient::connect(build_backend(&config).await?).await?;
    println!("Successfully connected to the document store.");

    let outcome = walk_through(&client).await;
    let closed = client.disconnect().await;
    println!("\nConnection closed.");

    outcome.and(closed)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("demo aborted: {err}");
            eprintln!("Operation failed: {err}");
            ExitCode::FAILURE
        }
    }
}
