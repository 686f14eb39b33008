use alloy::transports::http::reqwest::{self, Url};
use colored::*;
use log::*;
use serde_derive::Deserialize;
use std::collections::HashMap;
use tokio::time::Instant;

use crate::{
    error::{DepositError, Result},
    helpers::{self, depositdata::ForkVersion},
};

pub const GENESIS_FORK_VERSION: &str = "GENESIS_FORK_VERSION";
const SPEC_ENDPOINT: &str = "eth/v1/config/spec";

/// Anything able to hand out the chain configuration as key/value strings
#[allow(async_fn_in_trait)]
pub trait ChainConfigSource {
    async fn fetch_config(&self) -> Result<HashMap<String, String>>;
}

#[derive(Deserialize)]
struct SpecResponse {
    data: HashMap<String, serde_json::Value>,
}

/// Beacon node REST client, only the config endpoint is used
pub struct BeaconClient {
    pub url: Option<Url>,
    http: reqwest::Client,
}

impl Default for BeaconClient {
    fn default() -> Self {
        Self {
            url: None,
            http: reqwest::Client::new(),
        }
    }
}

impl BeaconClient {
    pub fn new(url: Option<&str>) -> Result<BeaconClient> {
        let url = match url.map(str::trim) {
            None | Some("") => None,
            Some(url) => Some(Url::parse(url).map_err(|e| {
                DepositError::invalid(format!("invalid beacon node connection '{}': {}", url, e))
            })?),
        };
        Ok(BeaconClient {
            url,
            ..Default::default()
        })
    }

    fn spec_url(&self) -> Result<String> {
        match &self.url {
            Some(url) => Ok(format!(
                "{}/{}",
                url.as_str().trim_end_matches('/'),
                SPEC_ENDPOINT
            )),
            None => Err(DepositError::ConfigurationUnavailable(
                "no beacon node connection; supply one with --connection or \
                 provide a fork version with --fork-version"
                    .to_string(),
            )),
        }
    }
}

impl ChainConfigSource for BeaconClient {
    async fn fetch_config(&self) -> Result<HashMap<String, String>> {
        let endpoint = self.spec_url()?;
        debug!("Fetching chain config from {}", endpoint.blue());
        let unavailable = |e: reqwest::Error| {
            DepositError::ConfigurationUnavailable(format!(
                "could not obtain config from beacon node: {}",
                e
            ))
        };
        let body = self
            .http
            .get(endpoint.as_str())
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .text()
            .await
            .map_err(unavailable)?;
        parse_spec(&body)
    }
}

/// Flattens the `/eth/v1/config/spec` response, non string values are skipped
pub fn parse_spec(body: &str) -> Result<HashMap<String, String>> {
    let spec: SpecResponse = serde_json::from_str(body).map_err(|e| {
        DepositError::ConfigurationUnavailable(format!("malformed chain config response: {}", e))
    })?;
    Ok(spec
        .data
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

/// Fetches the genesis fork version, bounded by `deadline`
pub async fn genesis_fork_version<S: ChainConfigSource>(
    source: &S,
    deadline: Instant,
) -> Result<ForkVersion> {
    let config = tokio::time::timeout_at(deadline, source.fetch_config())
        .await
        .map_err(|_| DepositError::Timeout("fetching chain configuration".to_string()))??;
    let value = config.get(GENESIS_FORK_VERSION).ok_or_else(|| {
        DepositError::ConfigurationUnavailable(format!(
            "{} missing from chain config",
            GENESIS_FORK_VERSION
        ))
    })?;
    helpers::parse_fixed_hex::<4>(value, "genesis fork version")
        .map_err(|e| DepositError::ConfigurationUnavailable(e.to_string()))
}
