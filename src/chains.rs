use alloy::primitives::{FixedBytes, hex};
use log::*;
use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::{
    error::{DepositError, Result},
    helpers::depositdata::ForkVersion,
};

#[derive(Debug, Clone)]
pub struct ChainData {
    pub name: &'static str,
    pub genesis_fork_version: ForkVersion,
}

pub static CHAINDATA: Lazy<HashMap<&'static str, ChainData>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for chain in [
        &*CHAIN_ETH_MAINNET,
        &*CHAIN_ETH_SEPOLIA,
        &*CHAIN_ETH_HOLESKY,
        &*CHAIN_ETH_HOODI,
    ] {
        m.insert(chain.name, chain.clone());
    }
    m
});

/// Genesis fork version of a known network, by name
pub fn fork_version(network: &str) -> Result<ForkVersion> {
    let name = network.trim().to_lowercase();
    match CHAINDATA.get(name.as_str()) {
        Some(chain) => {
            trace!("{:#?}", chain);
            Ok(chain.genesis_fork_version)
        }
        None => {
            let mut known: Vec<&str> = CHAINDATA.keys().copied().collect();
            known.sort();
            Err(DepositError::invalid(format!(
                "unknown network \"{}\" (known: {})",
                network,
                known.join(", ")
            )))
        }
    }
}

static CHAIN_ETH_MAINNET: Lazy<ChainData> = Lazy::new(|| ChainData {
    name: "mainnet",
    genesis_fork_version: FixedBytes(hex!("00000000")),
});

static CHAIN_ETH_SEPOLIA: Lazy<ChainData> = Lazy::new(|| ChainData {
    name: "sepolia",
    genesis_fork_version: FixedBytes(hex!("90000069")),
});

static CHAIN_ETH_HOLESKY: Lazy<ChainData> = Lazy::new(|| ChainData {
    name: "holesky",
    genesis_fork_version: FixedBytes(hex!("01017000")),
});

static CHAIN_ETH_HOODI: Lazy<ChainData> = Lazy::new(|| ChainData {
    name: "hoodi",
    genesis_fork_version: FixedBytes(hex!("10000910")),
});
