/// Failures surfaced by the deposit data pipeline.
///
/// Every variant aborts the whole operation, batches included.
#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    /// Malformed hex, wrong-length key, bad amount, missing selector
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Fork version neither supplied nor obtainable from the beacon node
    #[error("configuration unavailable: {0}")]
    ConfigurationUnavailable(String),
    /// Account locked, key unavailable or the signing primitive failed
    #[error("signing failed: {0}")]
    Signing(String),
    /// Root computation or output encoding failed
    #[error("encoding failed: {0}")]
    Encoding(String),
    /// The operation deadline passed while waiting on a collaborator
    #[error("timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, DepositError>;

impl DepositError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DepositError::InvalidInput(msg.into())
    }
}

impl From<serde_json::Error> for DepositError {
    fn from(e: serde_json::Error) -> Self {
        DepositError::Encoding(e.to_string())
    }
}
