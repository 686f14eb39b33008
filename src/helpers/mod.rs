pub mod abi;
pub mod depositdata;

use alloy::primitives::{
    FixedBytes, U256, hex,
    utils::{ParseUnits, Unit, parse_units},
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DepositError, Result};

static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?[0-9]*\.?[0-9]+)\s*([A-Za-z]*)\s*$").expect("static regex")
});

/// Decodes a `0x`-optional hex string into exactly `N` bytes
pub fn parse_fixed_hex<const N: usize>(input: &str, what: &str) -> Result<FixedBytes<N>> {
    let input = input.trim();
    let bytes = hex::decode(input.strip_prefix("0x").unwrap_or(input))
        .map_err(|e| DepositError::invalid(format!("{what} is not valid hex: {e}")))?;
    match bytes.len() == N {
        true => Ok(FixedBytes::from_slice(&bytes)),
        false => Err(DepositError::invalid(format!(
            "{what} must be exactly {N} bytes, got {}",
            bytes.len()
        ))),
    }
}

/// Converts a human value such as "32 Ether" or "1500000000 gwei" to gwei,
/// a missing unit means wei
pub fn parse_gwei(value: &str) -> Result<u64> {
    let caps = VALUE_RE
        .captures(value)
        .ok_or_else(|| DepositError::invalid(format!("malformed value \"{value}\"")))?;
    let amount = &caps[1];
    let unit = match caps[2].to_lowercase() {
        u if u.is_empty() => "wei".to_string(),
        u => u,
    };
    let wei: U256 = match parse_units(amount, unit.as_str())
        .map_err(|e| DepositError::invalid(format!("malformed value \"{value}\": {e}")))?
    {
        ParseUnits::U256(wei) => wei,
        ParseUnits::I256(_) => {
            return Err(DepositError::invalid(format!("negative value \"{value}\"")));
        }
    };
    let gwei_unit = Unit::GWEI.wei();
    if wei % gwei_unit != U256::ZERO {
        return Err(DepositError::invalid(format!(
            "value \"{value}\" is not a whole number of gwei"
        )));
    }
    u64::try_from(wei / gwei_unit)
        .map_err(|_| DepositError::invalid(format!("value \"{value}\" is too large")))
}
