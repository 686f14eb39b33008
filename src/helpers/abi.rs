//! Fixed-layout ABI encoding of the deposit contract call
//!
//! `deposit(bytes pubkey, bytes withdrawal_credentials, bytes signature, bytes32 deposit_data_root)`
//!
//! ```text
//! selector                                     4
//! head: pubkey offset, credentials offset,
//!       signature offset, deposit_data_root   4 * 32
//! tail: len(48)  pubkey      + 16 pad         32 + 64
//!       len(32)  credentials                  32 + 32
//!       len(96)  signature                    32 + 96
//! ```
//! Offsets are relative to the first head word.

use alloy::primitives::{B256, U256};

use crate::error::{DepositError, Result};
use crate::helpers::depositdata::{DepositData, PublicKey, Signature};

/// `bytes4(keccak256("deposit(bytes,bytes,bytes,bytes32)"))`
pub const DEPOSIT_SELECTOR: [u8; 4] = [0x22, 0x89, 0x51, 0x18];

const WORD: usize = 32;
const SELECTOR_LEN: usize = DEPOSIT_SELECTOR.len();
const HEAD_WORDS: usize = 4;

const PUBKEY_LEN: usize = 48;
const CREDENTIALS_LEN: usize = 32;
const SIGNATURE_LEN: usize = 96;

pub const PUBKEY_OFFSET: usize = HEAD_WORDS * WORD;
pub const WITHDRAWAL_CREDENTIALS_OFFSET: usize = PUBKEY_OFFSET + tail_len(PUBKEY_LEN);
pub const SIGNATURE_OFFSET: usize =
    WITHDRAWAL_CREDENTIALS_OFFSET + tail_len(CREDENTIALS_LEN);
pub const DEPOSIT_DATA_ROOT_POS: usize = SELECTOR_LEN + 3 * WORD;

/// Total call data length, 420 bytes
pub const DEPOSIT_CALL_LEN: usize = SELECTOR_LEN + SIGNATURE_OFFSET + tail_len(SIGNATURE_LEN);

const _: () = assert!(PUBKEY_OFFSET == 0x80);
const _: () = assert!(WITHDRAWAL_CREDENTIALS_OFFSET == 0xe0);
const _: () = assert!(SIGNATURE_OFFSET == 0x120);
const _: () = assert!(DEPOSIT_CALL_LEN == 420);

const fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Length word plus the right padded value
const fn tail_len(len: usize) -> usize {
    WORD + padded_len(len)
}

/// Arguments recovered from deposit call data; the amount travels as
/// the transaction value and is not part of the encoding
#[derive(Debug, Clone, PartialEq)]
pub struct DepositCall {
    pub pubkey: PublicKey,
    pub withdrawal_credentials: B256,
    pub signature: Signature,
    pub deposit_data_root: B256,
}

/// Append-only builder that knows its target length up front
struct FixedLayout {
    buf: Vec<u8>,
    expected: usize,
}

impl FixedLayout {
    fn new(selector: [u8; 4], expected: usize) -> Self {
        let mut buf = Vec::with_capacity(expected);
        buf.extend_from_slice(&selector);
        Self { buf, expected }
    }

    fn word(mut self, value: usize) -> Self {
        self.buf
            .extend_from_slice(&U256::from(value).to_be_bytes::<WORD>());
        self
    }

    fn bytes32(mut self, value: &B256) -> Self {
        self.buf.extend_from_slice(value.as_slice());
        self
    }

    /// Length prefix followed by the value right padded to a word boundary
    fn dynamic(self, value: &[u8]) -> Self {
        let mut this = self.word(value.len());
        this.buf.extend_from_slice(value);
        this.buf
            .resize(this.buf.len() + padded_len(value.len()) - value.len(), 0);
        this
    }

    fn finish(self) -> Result<Vec<u8>> {
        match self.buf.len() == self.expected {
            true => Ok(self.buf),
            false => Err(DepositError::Encoding(format!(
                "deposit call data is {} bytes, expected {}",
                self.buf.len(),
                self.expected
            ))),
        }
    }
}

pub fn encode_deposit_call(data: &DepositData, deposit_data_root: &B256) -> Result<Vec<u8>> {
    FixedLayout::new(DEPOSIT_SELECTOR, DEPOSIT_CALL_LEN)
        .word(PUBKEY_OFFSET)
        .word(WITHDRAWAL_CREDENTIALS_OFFSET)
        .word(SIGNATURE_OFFSET)
        .bytes32(deposit_data_root)
        .dynamic(data.pubkey.as_slice())
        .dynamic(data.withdrawal_credentials.as_slice())
        .dynamic(data.signature.as_slice())
        .finish()
}

/// Parses call data produced by [`encode_deposit_call`], rejecting anything
/// that deviates from the fixed layout
pub fn decode_deposit_call(input: &[u8]) -> Result<DepositCall> {
    if input.len() != DEPOSIT_CALL_LEN {
        return Err(DepositError::invalid(format!(
            "deposit call data must be {} bytes, got {}",
            DEPOSIT_CALL_LEN,
            input.len()
        )));
    }
    if input[..SELECTOR_LEN] != DEPOSIT_SELECTOR {
        return Err(DepositError::invalid("unexpected function selector"));
    }
    let args = &input[SELECTOR_LEN..];
    let word_at = |pos: usize| -> U256 { U256::from_be_slice(&args[pos..pos + WORD]) };

    let heads = [
        (0, PUBKEY_OFFSET, PUBKEY_LEN, "pubkey"),
        (WORD, WITHDRAWAL_CREDENTIALS_OFFSET, CREDENTIALS_LEN, "withdrawal credentials"),
        (2 * WORD, SIGNATURE_OFFSET, SIGNATURE_LEN, "signature"),
    ];
    for (head, offset, len, what) in heads {
        if word_at(head) != U256::from(offset) {
            return Err(DepositError::invalid(format!("bad {what} offset")));
        }
        if word_at(offset) != U256::from(len) {
            return Err(DepositError::invalid(format!("bad {what} length")));
        }
    }

    let value = |offset: usize, len: usize| &args[offset + WORD..offset + WORD + len];
    Ok(DepositCall {
        pubkey: PublicKey::from_slice(value(PUBKEY_OFFSET, PUBKEY_LEN)),
        withdrawal_credentials: B256::from_slice(value(
            WITHDRAWAL_CREDENTIALS_OFFSET,
            CREDENTIALS_LEN,
        )),
        signature: Signature::from_slice(value(SIGNATURE_OFFSET, SIGNATURE_LEN)),
        deposit_data_root: B256::from_slice(
            &input[DEPOSIT_DATA_ROOT_POS..DEPOSIT_DATA_ROOT_POS + WORD],
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;
    use alloy::sol_types::SolCall;

    use crate::helpers::depositdata::{DepositMessage, withdrawal_credentials};

    // https://github.com/ethereum/consensus-specs/blob/dev/solidity_deposit_contract/deposit_contract.sol
    alloy::sol! {
        interface IDepositContract {
            function deposit(
                bytes calldata pubkey,
                bytes calldata withdrawal_credentials,
                bytes calldata signature,
                bytes32 deposit_data_root
            ) external payable;
        }
    }

    fn sample() -> (DepositData, B256) {
        let data = DepositMessage::new(
            PublicKey::repeat_byte(0xaa),
            withdrawal_credentials(&PublicKey::repeat_byte(0xbb)),
            32_000_000_000,
        )
        .into_signed(Signature::repeat_byte(0xcc));
        let root = data.root();
        (data, root)
    }

    #[test]
    fn call_data_length() {
        let (data, root) = sample();
        let encoded = encode_deposit_call(&data, &root).unwrap();
        assert_eq!(
            encoded.len(),
            4 + 3 * 32 + 32 + 32 + 48 + 16 + 32 + 32 + 32 + 96
        );
    }

    #[test]
    fn matches_sol_abi_encoding() {
        let (data, root) = sample();
        let expected = IDepositContract::depositCall {
            pubkey: Bytes::copy_from_slice(data.pubkey.as_slice()),
            withdrawal_credentials: Bytes::copy_from_slice(data.withdrawal_credentials.as_slice()),
            signature: Bytes::copy_from_slice(data.signature.as_slice()),
            deposit_data_root: root,
        }
        .abi_encode();
        assert_eq!(IDepositContract::depositCall::SELECTOR, DEPOSIT_SELECTOR);
        assert_eq!(encode_deposit_call(&data, &root).unwrap(), expected);
    }

    #[test]
    fn fixed_offsets() {
        let (data, root) = sample();
        let encoded = encode_deposit_call(&data, &root).unwrap();
        assert_eq!(&encoded[..4], &[0x22, 0x89, 0x51, 0x18]);
        assert_eq!(encoded[4 + 31], 0x80);
        assert_eq!(encoded[4 + 63], 0xe0);
        assert_eq!(&encoded[4 + 94..4 + 96], &[0x01, 0x20]);
        assert_eq!(&encoded[DEPOSIT_DATA_ROOT_POS..DEPOSIT_DATA_ROOT_POS + 32], root.as_slice());
        // pubkey padding
        let pad = 4 + PUBKEY_OFFSET + 32 + 48;
        assert!(encoded[pad..pad + 16].iter().all(|b| *b == 0));
    }

    #[test]
    fn decode_round_trip() {
        let (data, root) = sample();
        let encoded = encode_deposit_call(&data, &root).unwrap();
        let call = decode_deposit_call(&encoded).unwrap();
        assert_eq!(call.pubkey, data.pubkey);
        assert_eq!(call.withdrawal_credentials, data.withdrawal_credentials);
        assert_eq!(call.signature, data.signature);
        assert_eq!(call.deposit_data_root, root);
    }

    #[test]
    fn decode_rejects_malformed() {
        let (data, root) = sample();
        let encoded = encode_deposit_call(&data, &root).unwrap();

        assert!(matches!(
            decode_deposit_call(&encoded[..419]),
            Err(DepositError::InvalidInput(_))
        ));

        let mut bad_selector = encoded.clone();
        bad_selector[0] = 0;
        assert!(matches!(
            decode_deposit_call(&bad_selector),
            Err(DepositError::InvalidInput(_))
        ));

        let mut bad_offset = encoded.clone();
        bad_offset[4 + 31] = 0xa0;
        assert!(matches!(
            decode_deposit_call(&bad_offset),
            Err(DepositError::InvalidInput(_))
        ));
    }
}
