use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run commands on a remote agent
#[derive(Debug, Parser)]
pub struct ArgParser {
    /// The address of the agent
    #[clap(
        short = 's',
        long = "server",
        env = "AGENT_SERVER",
        default_value = "http://[::1]:50051"
    )]
    pub server: String,

    /// CA certificate (PEM) to verify the agent with; enables TLS
    #[clap(long, env = "AGENT_CA_CERT")]
    pub ca_cert: Option<PathBuf>,

    /// Client certificate (PEM) for mutual TLS
    #[clap(long, env = "AGENT_CLIENT_CERT", requires_all = &["key", "ca-cert"])]
    pub cert: Option<PathBuf>,

    /// Client private key (PEM) for mutual TLS
    #[clap(long, env = "AGENT_CLIENT_KEY", requires = "cert")]
    pub key: Option<PathBuf>,

    /// The sub-command to use
    #[clap(subcommand)]
    pub sub_command: SubCommand,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Subcommand)]
pub enum SubCommand {
    /// start a new job
    Start {
        /// name of the command to run
        command: String,

        /// arguments to the command; put them after `--` if any start with a dash
        #[clap(multiple_values = true)]
        args: Vec<String>,
    },
    /// stop a job
    Stop {
        /// job id
        id: String,
    },
    /// get a job's status
    Status {
        /// job id
        id: String,
    },
    /// print a job's output captured so far
    Output {
        /// job id
        id: String,
    },
}
