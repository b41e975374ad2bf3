mod arg_parser;
mod client_cli;

use arg_parser::{ArgParser, SubCommand};
use client_cli::{ClientCli, TlsPaths};

use clap::Parser;
use std::error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    let args = ArgParser::parse();
    let tls = args.ca_cert.map(|ca_cert| TlsPaths {
        ca_cert,
        identity: args.cert.zip(args.key),
    });
    let mut client = ClientCli::connect(&args.server, tls).await?;

    match args.sub_command {
        SubCommand::Start { command, args } => {
            client.start_job(command, args).await?;
        }
        SubCommand::Stop { id } => {
            client.stop_job(id).await?;
        }
        SubCommand::Status { id } => {
            client.query_status(id).await?;
        }
        SubCommand::Output { id } => {
            client.stream_output(id).await?;
        }
    }

    Ok(())
}
