use alloy::primitives::{B256, hex};
use colored::*;
use log::*;
use serde::Serializer;
use serde_derive::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::{
    account::WalletStore,
    config::{DepositDataConfig, OutputMode, WithdrawalSource},
    error::{DepositError, Result},
    helpers::{
        self, abi,
        depositdata::{
            DepositData, DepositMessage, ForkVersion, MIN_DEPOSIT_AMOUNT, PublicKey, Signature,
            deposit_domain, withdrawal_credentials,
        },
    },
    rpc::{self, ChainConfigSource},
};

/// Version of the default output format understood by downstream tooling
pub const DEPOSIT_DATA_VERSION: u64 = 2;

/// A key able to sign deposit messages, e.g. an unlocked keystore account
pub trait DepositSigner {
    /// `<wallet>/<account>`
    fn name(&self) -> String;
    fn public_key(&self) -> PublicKey;
    /// Signs `object_root` under `domain`, the signing root construction
    /// is up to the implementation
    fn sign(&self, object_root: B256, domain: B256) -> Result<Signature>;
}

impl<T: DepositSigner + ?Sized> DepositSigner for Arc<T> {
    fn name(&self) -> String {
        (**self).name()
    }

    fn public_key(&self) -> PublicKey {
        (**self).public_key()
    }

    fn sign(&self, object_root: B256, domain: B256) -> Result<Signature> {
        (**self).sign(object_root, domain)
    }
}

/// Values shared by every validator of a batch, computed once
#[derive(Debug, Clone, PartialEq)]
pub struct DepositParams {
    pub withdrawal_credentials: B256,
    pub amount: u64,
    pub fork_version: ForkVersion,
    pub domain: B256,
}

impl DepositParams {
    pub fn new(withdrawal_pubkey: &PublicKey, amount: u64, fork_version: ForkVersion) -> Self {
        let withdrawal_credentials = withdrawal_credentials(withdrawal_pubkey);
        let domain = deposit_domain(fork_version);
        debug!("Withdrawal credentials are {}", withdrawal_credentials.to_string().blue());
        debug!("Fork version is {}", fork_version.to_string().blue());
        debug!("Domain is {}", domain.to_string().blue());
        Self {
            withdrawal_credentials,
            amount,
            fork_version,
            domain,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedDeposit {
    pub account: String,
    pub data: DepositData,
    pub deposit_message_root: B256,
    pub deposit_data_root: B256,
    pub fork_version: ForkVersion,
}

/// Parses a human deposit value into gwei, enforcing the minimum deposit
pub fn deposit_amount(value: &str) -> Result<u64> {
    let gwei = helpers::parse_gwei(value)?;
    match gwei >= MIN_DEPOSIT_AMOUNT {
        true => Ok(gwei),
        false => Err(DepositError::invalid(format!(
            "deposit value must be at least 1 Ether, got {} gwei",
            gwei
        ))),
    }
}

pub fn sign_deposit<S: DepositSigner>(signer: &S, params: &DepositParams) -> Result<SignedDeposit> {
    let message = DepositMessage::new(
        signer.public_key(),
        params.withdrawal_credentials,
        params.amount,
    );
    let deposit_message_root = message.root();
    trace!("{:#?}", message);
    debug!(
        "Deposit message root is {}",
        deposit_message_root.to_string().blue()
    );

    let signature = signer.sign(deposit_message_root, params.domain)?;
    let data = message.into_signed(signature);
    let deposit_data_root = data.root();
    debug!(
        "Signed deposit data:\n Public key: {}\n Withdrawal credentials: {}\n Value: {}\n Signature: {}",
        data.pubkey,
        data.withdrawal_credentials,
        data.amount,
        data.signature
    );
    debug!("Deposit data root is {}", deposit_data_root.to_string().green());

    Ok(SignedDeposit {
        account: signer.name(),
        data,
        deposit_message_root,
        deposit_data_root,
        fork_version: params.fork_version,
    })
}

fn plain_hex<T, S>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(value))
}

#[derive(Serialize)]
struct LaunchpadDeposit<'a> {
    #[serde(serialize_with = "plain_hex")]
    pubkey: &'a PublicKey,
    #[serde(serialize_with = "plain_hex")]
    withdrawal_credentials: &'a B256,
    amount: u64,
    #[serde(serialize_with = "plain_hex")]
    signature: &'a Signature,
    #[serde(serialize_with = "plain_hex")]
    deposit_message_root: &'a B256,
    #[serde(serialize_with = "plain_hex")]
    deposit_data_root: &'a B256,
    #[serde(serialize_with = "plain_hex")]
    fork_version: &'a ForkVersion,
}

// FixedBytes serialize as 0x-prefixed hex
#[derive(Serialize)]
struct DefaultDeposit<'a> {
    name: String,
    account: &'a str,
    pubkey: &'a PublicKey,
    withdrawal_credentials: &'a B256,
    signature: &'a Signature,
    value: u64,
    deposit_data_root: &'a B256,
    version: u64,
}

pub fn render(deposit: &SignedDeposit, mode: OutputMode) -> Result<String> {
    let data = &deposit.data;
    match mode {
        OutputMode::Raw => {
            let call = abi::encode_deposit_call(data, &deposit.deposit_data_root)?;
            Ok(hex::encode_prefixed(call))
        }
        OutputMode::Launchpad => Ok(serde_json::to_string(&[LaunchpadDeposit {
            pubkey: &data.pubkey,
            withdrawal_credentials: &data.withdrawal_credentials,
            amount: data.amount,
            signature: &data.signature,
            deposit_message_root: &deposit.deposit_message_root,
            deposit_data_root: &deposit.deposit_data_root,
            fork_version: &deposit.fork_version,
        }])?),
        OutputMode::Default => Ok(serde_json::to_string(&DefaultDeposit {
            name: format!("Deposit for {}", deposit.account),
            account: &deposit.account,
            pubkey: &data.pubkey,
            withdrawal_credentials: &data.withdrawal_credentials,
            signature: &data.signature,
            value: data.amount,
            deposit_data_root: &deposit.deposit_data_root,
            version: DEPOSIT_DATA_VERSION,
        })?),
    }
}

/// A single output is emitted as is, several are joined into an array
pub fn combine(outputs: &[String]) -> String {
    match outputs {
        [single] => single.clone(),
        _ => format!("[{}]", outputs.join(",")),
    }
}

fn check_deadline(deadline: Instant, what: &str) -> Result<()> {
    match Instant::now() >= deadline {
        true => Err(DepositError::Timeout(what.to_string())),
        false => Ok(()),
    }
}

/// Signs and renders one deposit per signer, in order; the first
/// failure or an expired deadline aborts the batch
pub fn generate<S: DepositSigner>(
    signers: &[S],
    params: &DepositParams,
    mode: OutputMode,
    deadline: Instant,
) -> Result<Vec<String>> {
    signers
        .iter()
        .map(|signer| {
            check_deadline(deadline, &format!("signing deposit for {}", signer.name()))?;
            debug!("Creating deposit for {}", signer.name().white().bold());
            sign_deposit(signer, params).and_then(|deposit| render(&deposit, mode))
        })
        .collect()
}

/// Resolves the fork version, asking the beacon node only when the
/// configuration carries none
pub async fn fork_version<C: ChainConfigSource>(
    config: &DepositDataConfig,
    chain: &C,
    deadline: Instant,
) -> Result<ForkVersion> {
    match config.fork_version {
        Some(fork_version) => Ok(fork_version),
        None => rpc::genesis_fork_version(chain, deadline).await,
    }
}

/// Generates deposit data for every validator account matched by the
/// configuration and returns the combined output
pub async fn depositdata<C: ChainConfigSource>(
    config: &DepositDataConfig,
    wallets: &WalletStore,
    chain: &C,
    deadline: Instant,
) -> Result<String> {
    let (_wallet, validators) = wallets.resolve(&config.validator_account)?;
    for validator in validators.iter() {
        debug!(
            "Validator {} public key is {}",
            validator.path().white().bold(),
            validator.pubkey.to_string().blue()
        );
    }

    let withdrawal_pubkey = match &config.withdrawal {
        WithdrawalSource::Account(path) => {
            let (_, account) = wallets.resolve_one(path)?;
            account.pubkey
        }
        WithdrawalSource::PublicKey(pubkey) => *pubkey,
    };
    debug!("Withdrawal public key is {}", withdrawal_pubkey.to_string().blue());

    let fork_version = fork_version(config, chain, deadline).await?;
    let params = DepositParams::new(&withdrawal_pubkey, config.amount, fork_version);

    for validator in validators.iter() {
        check_deadline(deadline, &format!("unlocking {}", validator.path()))?;
        validator.try_unlock(config.passphrase.as_deref())?;
    }
    let outputs = generate(&validators, &params, config.output, deadline)?;
    Ok(combine(&outputs))
}
