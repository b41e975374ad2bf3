use clap::{ArgEnum, Parser};
use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

/// Run the remote command execution agent
#[derive(Debug, Parser)]
#[clap(name = "agent")]
pub struct AgentConfig {
    /// Address to serve gRPC on
    #[clap(long = "listen", env = "AGENT_LISTEN", default_value = "[::1]:50051")]
    pub listen_addr: SocketAddr,

    /// Where execution records are kept
    #[clap(long, arg_enum, env = "AGENT_STORE", default_value = "sqlite")]
    pub store: StoreKind,

    /// SQLite database file, used with `--store sqlite`
    #[clap(long, env = "AGENT_DB_PATH", default_value = "executions.db")]
    pub db_path: PathBuf,

    /// Directory for captured job output, created if missing
    #[clap(long, env = "AGENT_OUTPUT_DIR", default_value = "jobs")]
    pub output_dir: PathBuf,

    /// Server certificate (PEM) for mutual TLS
    #[clap(long, env = "AGENT_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// Server private key (PEM) for mutual TLS
    #[clap(long, env = "AGENT_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// CA certificate (PEM) that client certificates must chain to
    #[clap(long, env = "AGENT_TLS_CA")]
    pub tls_ca: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ArgEnum)]
pub enum StoreKind {
    /// persist records in a SQLite file
    Sqlite,
    /// keep records in memory only
    Memory,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("--tls-cert, --tls-key and --tls-ca must be given together")]
    IncompleteTls,
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AgentConfig {
    /// The mutual TLS settings, or `None` to serve plaintext.
    pub async fn tls_config(&self) -> Result<Option<ServerTlsConfig>, ConfigError> {
        let (cert, key, ca) = match (&self.tls_cert, &self.tls_key, &self.tls_ca) {
            (None, None, None) => return Ok(None),
            (Some(cert), Some(key), Some(ca)) => (cert, key, ca),
            _ => return Err(ConfigError::IncompleteTls),
        };

        let server_identity = Identity::from_pem(read(cert).await?, read(key).await?);
        let ca_cert = Certificate::from_pem(read(ca).await?);
        Ok(Some(
            ServerTlsConfig::new()
                .identity(server_identity)
                .client_ca_root(ca_cert),
        ))
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, ConfigError> {
    tokio::fs::read(path).await.map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
