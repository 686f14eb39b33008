use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs::File, io::BufReader};
use tokio::time::Instant;

use eyre::{Result, WrapErr, bail};
use serde_derive::Deserialize;

use clap_serde_derive::{
    ClapSerde,
    clap::{self, Args, Parser, Subcommand},
};

use crate::{
    chains,
    error::DepositError,
    helpers::{
        self,
        depositdata::{ForkVersion, PublicKey},
    },
    validator,
};

#[allow(deprecated)]
fn home_dir() -> PathBuf {
    std::env::home_dir().unwrap_or_default()
}

fn datadir() -> PathBuf {
    home_dir().join(".eth-depositdata")
}

fn config_file() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
        .join("eth-depositdata")
        .join("config.toml")
}

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Config file
    #[arg(short, long = "config", default_value = config_file().into_os_string())]
    pub config_path: Option<PathBuf>,

    /// Global arguments
    #[command(flatten)]
    pub config: <CliArgs as ClapSerde>::Opt,

    // Subcommands
    #[command(subcommand)]
    pub command: CliCmd,
}

// Make sure all values are optional or parsing fails if a value
// is missing in the config file
#[derive(Debug, Clone, ClapSerde, Deserialize)]
pub struct CliArgs {
    /// Logging level (0: critical .. 5: trace)
    #[arg(short, long = "log-level", required = false, default_value = "3")]
    pub log_level: Option<u8>,

    /// Data directory, wallets are read from "<datadir>/wallets"
    #[arg(long = "datadir", default_value = datadir().into_os_string())]
    pub datadir: Option<PathBuf>,

    /// Beacon node REST URL
    #[arg(long = "connection", required = false)]
    pub connection: Option<String>,

    /// Operation timeout in seconds
    #[arg(long, required = false, default_value = "10")]
    pub timeout: Option<u64>,

    /// Passphrase used to unlock the validator accounts
    #[arg(long, required = false)]
    pub passphrase: Option<String>,

    /// No output, success or failure is reported by the exit status
    #[arg(short, long, required = false, action = clap::ArgAction::SetTrue)]
    pub quiet: bool,
}

impl CliArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(10))
    }

    /// Deadline of the whole operation, `timeout` seconds from `now`
    pub fn deadline(&self, now: Instant) -> std::result::Result<Instant, DepositError> {
        now.checked_add(self.timeout()).ok_or_else(|| {
            DepositError::invalid(format!(
                "timeout of {} seconds is out of range",
                self.timeout().as_secs()
            ))
        })
    }
}

/// Merges the config file into the command line arguments and expands
/// the datadir; quiet mode forces the log level to 0.
///
/// Errors carry the command line `--quiet` flag since the merged config
/// is not available to tell.
pub fn load(
    args: <CliArgs as ClapSerde>::Opt,
    config_path: Option<PathBuf>,
) -> std::result::Result<CliArgs, (bool, eyre::Report)> {
    let quiet = args.quiet == Some(true);
    merge_args_from_file::<CliArgs>(args, config_path)
        .and_then(|mut config| {
            config.datadir = Some(expand_datadir(config.datadir.take())?);
            if config.quiet {
                config.log_level = Some(0);
            }
            Ok(config)
        })
        .map_err(|e| (quiet, e))
}

// Command line cmds
#[derive(Subcommand)]
pub enum CliCmd {
    /// Print version information
    #[clap(visible_alias = "ver")]
    Version {},
    /// Validator commands
    #[clap(visible_aliases = &["v"])]
    Validator {
        #[command(subcommand)]
        command: CmdValidator,
    },
}

#[derive(Subcommand)]
pub enum CmdValidator {
    /// Generate deposit data for one or more validators
    #[command(name = "depositdata", visible_aliases = &["dd"])]
    DepositData(DepositDataArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct DepositDataArgs {
    /// Validator account(s), "<wallet>/<account regex>"
    #[arg(long, visible_alias = "validatoraccount", required = false)]
    pub validator_account: Option<String>,
    /// Account to which the validator funds will be withdrawn
    #[arg(
        long,
        visible_alias = "withdrawalaccount",
        required = false,
        conflicts_with = "withdrawal_pubkey"
    )]
    pub withdrawal_account: Option<String>,
    /// Public key to which the validator funds will be withdrawn
    #[arg(long, visible_alias = "withdrawalpubkey", required = false)]
    pub withdrawal_pubkey: Option<String>,
    /// Value to deposit, e.g. "32 Ether"
    #[arg(long, visible_alias = "depositvalue", required = false)]
    pub deposit_value: Option<String>,
    /// Use a hard-coded fork version (default is to fetch it from the node)
    #[arg(
        long,
        visible_alias = "forkversion",
        required = false,
        conflicts_with = "network"
    )]
    pub fork_version: Option<String>,
    /// Use the genesis fork version of a known network
    #[arg(long, required = false)]
    pub network: Option<String>,
    /// Print raw deposit contract transaction data
    #[arg(long, required = false, action = clap::ArgAction::SetTrue, conflicts_with = "launchpad")]
    pub raw: bool,
    /// Print launchpad-compatible JSON
    #[arg(long, required = false, action = clap::ArgAction::SetTrue)]
    pub launchpad: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Default,
    Raw,
    Launchpad,
}

impl OutputMode {
    pub fn from_flags(raw: bool, launchpad: bool) -> std::result::Result<Self, DepositError> {
        match (raw, launchpad) {
            (false, false) => Ok(OutputMode::Default),
            (true, false) => Ok(OutputMode::Raw),
            (false, true) => Ok(OutputMode::Launchpad),
            (true, true) => Err(DepositError::invalid(
                "raw and launchpad output are mutually exclusive",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalSource {
    /// `<wallet>/<account>` resolving to a single account
    Account(String),
    PublicKey(PublicKey),
}

/// Validated, immutable inputs of a deposit data run
#[derive(Debug, Clone, PartialEq)]
pub struct DepositDataConfig {
    pub validator_account: String,
    pub withdrawal: WithdrawalSource,
    /// gwei
    pub amount: u64,
    /// `None` means fetch from the beacon node
    pub fork_version: Option<ForkVersion>,
    pub output: OutputMode,
    pub passphrase: Option<String>,
}

impl DepositDataConfig {
    pub fn new(
        args: &DepositDataArgs,
        passphrase: Option<String>,
    ) -> std::result::Result<Self, DepositError> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        let validator_account = non_empty(&args.validator_account)
            .ok_or_else(|| DepositError::invalid("--validator-account is required"))?
            .to_string();

        let withdrawal = match (
            non_empty(&args.withdrawal_account),
            non_empty(&args.withdrawal_pubkey),
        ) {
            (Some(account), None) => WithdrawalSource::Account(account.to_string()),
            (None, Some(pubkey)) => WithdrawalSource::PublicKey(helpers::parse_fixed_hex::<48>(
                pubkey,
                "withdrawal public key",
            )?),
            (None, None) => {
                return Err(DepositError::invalid(
                    "--withdrawal-account or --withdrawal-pubkey is required",
                ));
            }
            (Some(_), Some(_)) => {
                return Err(DepositError::invalid(
                    "--withdrawal-account and --withdrawal-pubkey are mutually exclusive",
                ));
            }
        };

        let amount = validator::deposit_amount(
            non_empty(&args.deposit_value)
                .ok_or_else(|| DepositError::invalid("--deposit-value is required"))?,
        )?;

        let fork_version = match (non_empty(&args.fork_version), non_empty(&args.network)) {
            (Some(fork_version), _) => Some(helpers::parse_fixed_hex::<4>(
                fork_version,
                "fork version",
            )?),
            (None, Some(network)) => Some(chains::fork_version(network)?),
            (None, None) => None,
        };

        Ok(DepositDataConfig {
            validator_account,
            withdrawal,
            amount,
            fork_version,
            output: OutputMode::from_flags(args.raw, args.launchpad)?,
            passphrase,
        })
    }
}

pub fn merge_args_from_file<T>(
    args: <T as ClapSerde>::Opt,
    maybe_path: Option<PathBuf>,
) -> Result<T>
where
    T: ClapSerde + serde::de::DeserializeOwned,
{
    let Some(path) = maybe_path.filter(|path| path.exists()) else {
        return Ok(T::from(args));
    };
    let config = match path.extension().and_then(OsStr::to_str) {
        Some("toml") => read_toml_config::<T>(&path),
        Some("json") => read_json_config::<T>(&path),
        Some("jsonc") => read_jsonc_config::<T>(&path),
        _ => bail!("Unsupported config file type: {:?}", path),
    }?;
    // Values present in the config file take precedence over the command
    // line, including clap defaults
    Ok(T::from(args).merge(config))
}

fn read_toml_config<T>(path: &Path) -> Result<<T as ClapSerde>::Opt>
where
    T: ClapSerde + serde::de::DeserializeOwned,
{
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("{:?}", path))?;
    toml::from_str(&content).wrap_err_with(|| format!("{:?}", path))
}

fn read_json_config<T: ClapSerde>(path: &Path) -> Result<<T as ClapSerde>::Opt> {
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    serde_json::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))
        .wrap_err_with(|| format!("{:?}", path))
}

fn read_jsonc_config<T: ClapSerde>(path: &Path) -> Result<<T as ClapSerde>::Opt> {
    let f = File::open(path).wrap_err_with(|| format!("{:?}", path))?;
    serde_jsonc::from_reader::<_, <T as ClapSerde>::Opt>(BufReader::new(f))
        .wrap_err_with(|| format!("{:?}", path))
}

/// Expands "~" and environment variables in the data directory
pub fn expand_datadir(path: Option<PathBuf>) -> Result<PathBuf> {
    let path: OsString = path.unwrap_or_else(datadir).into_os_string();
    let path = path
        .into_string()
        .map_err(|s| eyre::eyre!("datadir is not valid UTF-8: {:?}", s))?;
    Ok(shellexpand::full(&path)?.to_string().into())
}
