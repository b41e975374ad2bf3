use protobuf::{
    agent_client::AgentClient, OutputRequest, OutputResponse, StartRequest, State,
    StatusRequest, StopRequest,
};
use std::{error, path::PathBuf};
use tokio::io::{self, AsyncWriteExt};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

/// Paths to the PEM files used for TLS.
pub struct TlsPaths {
    pub ca_cert: PathBuf,
    pub identity: Option<(PathBuf, PathBuf)>,
}

pub struct ClientCli {
    inner: AgentClient<Channel>,
}

impl ClientCli {
    pub async fn connect(
        server_addr: &str,
        tls: Option<TlsPaths>,
    ) -> Result<Self, Box<dyn error::Error>> {
        let mut endpoint = Channel::from_shared(server_addr.to_string())?;
        if let Some(tls) = tls {
            let ca_cert = Certificate::from_pem(tokio::fs::read(&tls.ca_cert).await?);
            let mut tls_config = ClientTlsConfig::new().ca_certificate(ca_cert);
            if let Some((cert, key)) = tls.identity {
                let cert = tokio::fs::read(cert).await?;
                let key = tokio::fs::read(key).await?;
                tls_config = tls_config.identity(Identity::from_pem(cert, key));
            }
            endpoint = endpoint.tls_config(tls_config)?;
        }
        let channel = endpoint.connect().await?;
        Ok(Self {
            inner: AgentClient::new(channel),
        })
    }

    pub async fn start_job(
        &mut self,
        command: String,
        args: Vec<String>,
    ) -> Result<(), tonic::Status> {
        let response = self.inner.start(StartRequest { command, args }).await?;
        println!("Started job id: {}", response.into_inner().id);
        Ok(())
    }

    pub async fn stop_job(&mut self, id: String) -> Result<(), tonic::Status> {
        let response = self.inner.stop(StopRequest { id }).await?;
        println!("Stopped job id: {}", response.into_inner().id);
        Ok(())
    }

    pub async fn query_status(&mut self, id: String) -> Result<(), tonic::Status> {
        let status = self.inner.status(StatusRequest { id }).await?.into_inner();
        println!("Job:     {}", status.id);
        println!("Command: {} {}", status.command, status.args.join(" "));
        match status.state() {
            State::Running => println!("State:   RUNNING"),
            State::Complete => println!("State:   COMPLETE (exit code {})", status.exit_code),
            State::Stopped => println!("State:   STOPPED"),
            State::Error => println!("State:   ERROR (exit code {})", status.exit_code),
            State::Unknown => println!("State:   UNKNOWN"),
        }
        Ok(())
    }

    /// Print every line captured so far; ends at the current end of the job's output.
    pub async fn stream_output(&mut self, id: String) -> Result<(), Box<dyn error::Error>> {
        let mut stream = self.inner.output(OutputRequest { id }).await?.into_inner();
        let mut stdout = io::stdout();
        while let Some(OutputResponse { output }) = stream.message().await? {
            stdout.write_all(&output).await?;
            stdout.write_all(b"\n").await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}
