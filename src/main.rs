#[macro_use]
extern crate log;

use clap::{CommandFactory, Parser};
use colored::*;
use eyre::Result;
use tokio::time::Instant;

use eth_depositdata::{
    account::WalletStore,
    config::{self, *},
    logger::Logger,
    rpc::BeaconClient,
    validator,
};

#[tokio::main]
async fn main() {
    // Parse args with clap
    let args = Cli::parse();

    // Load config file & shellexpand datadir so we can use "~/...", etc
    let config = match config::load(args.config, args.config_path) {
        Ok(config) => config,
        Err((quiet, e)) => fail(quiet, e),
    };

    // Setup our global logger
    let logger = Logger::new(config.log_level.unwrap_or(3u8));
    if let Err(e) = logger.set_global() {
        fail(config.quiet, e);
    }

    if let Err(e) = cmd_dispatch(&Cli::command(), &args.command, &config).await {
        fail(config.quiet, e);
    }
}

fn fail(quiet: bool, e: eyre::Report) -> ! {
    if !quiet {
        eprintln!("{}", format!("Error: {}", e).red());
    }
    std::process::exit(1)
}

async fn cmd_dispatch(app: &clap::Command, cmd: &CliCmd, config: &CliArgs) -> Result<()> {
    match cmd {
        CliCmd::Version {} => {
            let mut ver = app.render_version();
            ver.pop(); // remove "\n"
            if !config.quiet {
                println!("version: {}", ver);
            }
        }
        CliCmd::Validator { command } => match command {
            CmdValidator::DepositData(args) => {
                let deadline = config.deadline(Instant::now())?;
                let dd_config = DepositDataConfig::new(args, config.passphrase.clone())?;
                let datadir = config.datadir.clone().unwrap_or_default();
                debug!("Wallets are read from {}", datadir.display());
                let wallets = WalletStore::new(&datadir);
                let client = BeaconClient::new(config.connection.as_deref())?;
                let output = validator::depositdata(&dd_config, &wallets, &client, deadline).await?;
                if !config.quiet {
                    println!("{}", output);
                }
            }
        },
    };
    Ok(())
}
