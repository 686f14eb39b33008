use alloy::primitives::{B256, FixedBytes, hex};
use sha2::{Digest, Sha256};
use tree_hash::TreeHash;

/// BLS12-381 validator public key
pub type PublicKey = FixedBytes<48>;
/// BLS12-381 signature
pub type Signature = FixedBytes<96>;
pub type ForkVersion = FixedBytes<4>;
pub type DomainType = FixedBytes<4>;

pub const DOMAIN_DEPOSIT: DomainType = FixedBytes(hex!("03000000"));
pub const BLS_WITHDRAWAL_PREFIX: u8 = 0x00;
/// MIN_DEPOSIT_AMOUNT, gwei
pub const MIN_DEPOSIT_AMOUNT: u64 = 1_000_000_000;
/// Deposits are signed before genesis is known
pub const ZERO_GENESIS_VALIDATORS_ROOT: B256 = B256::ZERO;

/// The unsigned message a validator commits to
#[derive(Debug, Clone, PartialEq, tree_hash_derive::TreeHash)]
pub struct DepositMessage {
    pub pubkey: PublicKey,
    pub withdrawal_credentials: B256,
    /// Amount of ether deposited in gwei
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, tree_hash_derive::TreeHash)]
pub struct DepositData {
    /// Validator public key
    pub pubkey: PublicKey,
    /// Withdrawal credentials
    pub withdrawal_credentials: B256,
    /// Amount of ether deposited in gwei
    pub amount: u64,
    /// Deposit signature
    pub signature: Signature,
}

#[derive(Debug, Clone, Copy, PartialEq, tree_hash_derive::TreeHash)]
pub struct ForkData {
    pub current_version: ForkVersion,
    pub genesis_validators_root: B256,
}

#[derive(Debug, Clone, Copy, PartialEq, tree_hash_derive::TreeHash)]
pub struct SigningData {
    pub object_root: B256,
    pub domain: B256,
}

impl DepositMessage {
    pub fn new(pubkey: PublicKey, withdrawal_credentials: B256, amount: u64) -> Self {
        Self {
            pubkey,
            withdrawal_credentials,
            amount,
        }
    }

    pub fn root(&self) -> B256 {
        self.tree_hash_root()
    }

    pub fn into_signed(self, signature: Signature) -> DepositData {
        DepositData {
            pubkey: self.pubkey,
            withdrawal_credentials: self.withdrawal_credentials,
            amount: self.amount,
            signature,
        }
    }
}

impl DepositData {
    /// The deposit data root expected by the deposit contract
    pub fn root(&self) -> B256 {
        self.tree_hash_root()
    }
}

/// `0x00 || sha256(pubkey)[1..]`
pub fn withdrawal_credentials(withdrawal_pubkey: &PublicKey) -> B256 {
    let mut credentials: [u8; 32] = Sha256::digest(withdrawal_pubkey.as_slice()).into();
    credentials[0] = BLS_WITHDRAWAL_PREFIX;
    B256::from(credentials)
}

pub fn compute_domain(
    domain_type: DomainType,
    fork_version: ForkVersion,
    genesis_validators_root: B256,
) -> B256 {
    let fork_data_root = ForkData {
        current_version: fork_version,
        genesis_validators_root,
    }
    .tree_hash_root();
    let mut domain = [0u8; 32];
    domain[..4].copy_from_slice(domain_type.as_slice());
    domain[4..].copy_from_slice(&fork_data_root[..28]);
    B256::from(domain)
}

pub fn deposit_domain(fork_version: ForkVersion) -> B256 {
    compute_domain(DOMAIN_DEPOSIT, fork_version, ZERO_GENESIS_VALIDATORS_ROOT)
}

pub fn compute_signing_root(object_root: B256, domain: B256) -> B256 {
    SigningData {
        object_root,
        domain,
    }
    .tree_hash_root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::b256;

    fn sample_message() -> DepositMessage {
        DepositMessage::new(
            PublicKey::repeat_byte(0xaa),
            withdrawal_credentials(&PublicKey::repeat_byte(0xbb)),
            32_000_000_000,
        )
    }

    #[test]
    fn credentials_prefix_is_always_zero() {
        for byte in [0x00u8, 0x01, 0x7f, 0xbb, 0xff] {
            let pubkey = PublicKey::repeat_byte(byte);
            let creds = withdrawal_credentials(&pubkey);
            let digest = Sha256::digest(pubkey.as_slice());
            assert_eq!(creds[0], 0x00);
            assert_eq!(&creds[1..], &digest[1..], "hash tail mismatch");
        }
    }

    #[test]
    fn mainnet_deposit_domain() {
        assert_eq!(
            deposit_domain(ForkVersion::ZERO),
            b256!("03000000f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a9")
        );
    }

    #[test]
    fn domain_depends_on_fork_version() {
        let a = deposit_domain(FixedBytes(hex!("00000000")));
        let b = deposit_domain(FixedBytes(hex!("00000001")));
        assert_ne!(a, b);
        assert_eq!(&a[..4], &b[..4]);
        assert_eq!(&b[..4], DOMAIN_DEPOSIT.as_slice());
    }

    #[test]
    fn deposit_data_root_is_deterministic() {
        let data = sample_message().into_signed(Signature::repeat_byte(0x11));
        assert_eq!(data.root(), data.clone().root());
        assert_ne!(data.root(), B256::ZERO);
    }

    #[test]
    fn roots_are_field_order_sensitive() {
        let message = sample_message();
        let data = message.clone().into_signed(Signature::ZERO);
        // Different containers, different roots
        assert_ne!(message.root(), data.root());

        let mut other = message.clone();
        other.amount += 1;
        assert_ne!(message.root(), other.root());
    }

    #[test]
    fn signing_root_mixes_in_domain() {
        let root = sample_message().root();
        let d0 = deposit_domain(ForkVersion::ZERO);
        let d1 = deposit_domain(FixedBytes(hex!("00000001")));
        assert_ne!(compute_signing_root(root, d0), compute_signing_root(root, d1));
    }
}
