mod config;
mod services;

use clap::Parser;
use config::{AgentConfig, StoreKind};
use futures::Future;
use joblib::store::{ExecutionStore, MemoryStore, SqliteStore};
use joblib::JobCoordinator;
use protobuf::agent_server::AgentServer;
use services::jobservice::AgentService;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::parse();
    let listener = TcpListener::bind(config.listen_addr).await?;
    serve(config, listener, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        futures::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

fn open_store(
    config: &AgentConfig,
) -> Result<Arc<dyn ExecutionStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn ExecutionStore> = match config.store {
        StoreKind::Sqlite => Arc::new(SqliteStore::open(&config.db_path)?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    store.migrate()?;
    Ok(store)
}

async fn serve(
    config: AgentConfig,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&config)?;
    tokio::fs::create_dir_all(&config.output_dir).await?;
    let coordinator = JobCoordinator::spawn(store, config.output_dir.clone());

    let mut server = Server::builder();
    if let Some(tls_config) = config.tls_config().await? {
        tracing::info!("mutual TLS enabled");
        server = server.tls_config(tls_config)?;
    }

    tracing::info!(addr = %listener.local_addr()?, store = ?config.store, "agent listening");
    server
        .add_service(AgentServer::new(AgentService::new(coordinator)))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    Ok(())
}
