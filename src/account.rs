use alloy::primitives::B256;
use colored::*;
use log::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::{
    error::{DepositError, Result},
    helpers::{
        self,
        depositdata::{PublicKey, Signature, compute_signing_root},
    },
    validator::DepositSigner,
};

/// Proof-of-possession ciphersuite used by the beacon chain
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// A directory of EIP-2335 keystores
#[derive(Debug, Clone)]
pub struct Wallet {
    pub name: String,
    pub dir: PathBuf,
}

#[derive(Debug)]
pub struct Account {
    pub created: u64,
    pub wallet: String,
    pub name: String,
    pub pubkey: PublicKey,
    pub secret: Mutex<Vec<u8>>,
    pub keypath: PathBuf,
}

/// Resolves `<wallet>/<account>` paths under `<datadir>/wallets`
#[derive(Debug, Clone)]
pub struct WalletStore {
    pub root: PathBuf,
}

fn wallet_error(what: &str, path: &Path, e: impl std::fmt::Display) -> DepositError {
    DepositError::invalid(format!("{} {}: {}", what, path.display(), e))
}

impl Account {
    pub fn from_keystore(wallet: &str, keypath: PathBuf) -> Result<Account> {
        trace!("Reading keystore {}", keypath.display());
        let file =
            std::fs::File::open(&keypath).map_err(|e| wallet_error("keystore", &keypath, e))?;
        let json = serde_json::from_reader::<_, serde_json::Value>(&file)
            .map_err(|e| wallet_error("keystore", &keypath, e))?;
        let created: u64 = json
            .get("created")
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        // name is optional, fallback to the keystore filename
        let name = match json.get("name").and_then(|value| value.as_str()) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => keypath
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        let pubkey = json
            .get("pubkey")
            .and_then(|value| value.as_str())
            .ok_or_else(|| wallet_error("keystore", &keypath, "missing pubkey"))?;
        let pubkey = helpers::parse_fixed_hex::<48>(pubkey, "keystore pubkey")?;
        trace!("Loading account {}\n  pubkey: {}", name, pubkey);
        Ok(Account {
            created,
            wallet: wallet.to_string(),
            name,
            pubkey,
            secret: Mutex::new(Vec::new()),
            keypath,
        })
    }

    /// `<wallet>/<account>`
    pub fn path(&self) -> String {
        format!("{}/{}", self.wallet, self.name)
    }

    pub fn unlock(&self, passphrase: &str) -> Result<&Self> {
        let key = eth_keystore::decrypt_key(&self.keypath, passphrase).map_err(|e| {
            DepositError::Signing(format!("failed to unlock account {}: {}", self.path(), e))
        })?;
        let bls_sk = blst::min_pk::SecretKey::from_bytes(&key).map_err(|e| {
            DepositError::Signing(format!("invalid secret key for {}: {:?}", self.path(), e))
        })?;
        if bls_sk.sk_to_pk().compress() != self.pubkey.0 {
            return Err(DepositError::Signing(format!(
                "keystore secret does not match pubkey of {}",
                self.path()
            )));
        }
        debug!("unlocked account: {}", self.path().green());
        *self.secret.lock().unwrap() = key;
        Ok(self)
    }

    /// Unlocks with `passphrase` unless already unlocked
    pub fn try_unlock(&self, passphrase: Option<&str>) -> Result<&Self> {
        match (self.is_unlocked(), passphrase) {
            (true, _) => Ok(self),
            (false, Some(passphrase)) => self.unlock(passphrase),
            (false, None) => Err(DepositError::Signing(format!(
                "account {} is locked and no passphrase was supplied",
                self.path()
            ))),
        }
    }

    pub fn lock(&self) {
        let mut secret = self.secret.lock().unwrap();
        *secret = Vec::<u8>::new()
    }

    pub fn is_unlocked(&self) -> bool {
        self.secret.lock().unwrap().len() > 0
    }
}

/// BLS signature over `message` with the beacon chain DST
pub fn bls_sign(secret: &[u8], message: &B256) -> Result<Signature> {
    let sk = blst::min_pk::SecretKey::from_bytes(secret)
        .map_err(|e| DepositError::Signing(format!("invalid secret key: {:?}", e)))?;
    Ok(Signature::from(
        sk.sign(message.as_slice(), BLS_DST, &[]).compress(),
    ))
}

impl DepositSigner for Account {
    fn name(&self) -> String {
        self.path()
    }

    fn public_key(&self) -> PublicKey {
        self.pubkey
    }

    fn sign(&self, object_root: B256, domain: B256) -> Result<Signature> {
        let secret = self.secret.lock().unwrap();
        if secret.is_empty() {
            return Err(DepositError::Signing(format!(
                "account {} is locked",
                self.path()
            )));
        }
        let signing_root = compute_signing_root(object_root, domain);
        trace!("Signing root is {}", signing_root);
        bls_sign(&secret, &signing_root)
    }
}

impl Wallet {
    /// Accounts sorted by creation time, then name
    pub fn accounts(&self) -> Result<Vec<Arc<Account>>> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| wallet_error("wallet", &self.dir, e))?;
        let mut accounts = Vec::new();
        for entry in entries {
            let keypath = entry.map_err(|e| wallet_error("wallet", &self.dir, e))?.path();
            if !keypath.is_file() || keypath.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            // v3 (secp256k1) keystores and stray json carry no BLS pubkey
            match Account::from_keystore(&self.name, keypath) {
                Ok(account) => accounts.push(Arc::new(account)),
                Err(e) => warn!("Skipping {}", e),
            }
        }
        accounts.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.name.cmp(&b.name)));
        Ok(accounts)
    }
}

impl WalletStore {
    pub fn new(datadir: &Path) -> Self {
        Self {
            root: datadir.join("wallets"),
        }
    }

    pub fn wallet(&self, name: &str) -> Result<Wallet> {
        let dir = self.root.join(name);
        match dir.is_dir() {
            true => Ok(Wallet {
                name: name.to_string(),
                dir,
            }),
            false => Err(DepositError::invalid(format!(
                "wallet \"{}\" not found in {}",
                name,
                self.root.display()
            ))),
        }
    }

    /// Resolves `<wallet>/<pattern>` where pattern is an anchored regular
    /// expression over account names, `<wallet>` alone matches all accounts
    pub fn resolve(&self, path: &str) -> Result<(Wallet, Vec<Arc<Account>>)> {
        let (wallet_name, pattern) = match path.trim().split_once('/') {
            Some((wallet, pattern)) => (wallet, pattern),
            None => (path.trim(), ".*"),
        };
        if wallet_name.is_empty() || pattern.is_empty() {
            return Err(DepositError::invalid(format!(
                "invalid account path \"{}\"",
                path
            )));
        }
        let re = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            DepositError::invalid(format!("invalid account pattern \"{}\": {}", pattern, e))
        })?;

        let wallet = self.wallet(wallet_name)?;
        let accounts: Vec<Arc<Account>> = wallet
            .accounts()?
            .into_iter()
            .filter(|account| re.is_match(&account.name))
            .collect();
        if accounts.is_empty() {
            return Err(DepositError::invalid(format!(
                "no accounts match \"{}\"",
                path
            )));
        }
        Ok((wallet, accounts))
    }

    /// Like [`WalletStore::resolve`] but the path must match a single account
    pub fn resolve_one(&self, path: &str) -> Result<(Wallet, Arc<Account>)> {
        let (wallet, mut accounts) = self.resolve(path)?;
        match accounts.len() {
            1 => Ok((wallet, accounts.remove(0))),
            n => Err(DepositError::invalid(format!(
                "account path \"{}\" matches {} accounts, expected one",
                path, n
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::hex;
    use blst::BLST_ERROR;
    use std::fs;

    use crate::helpers::depositdata::deposit_domain;

    pub(crate) fn bls_key(seed: u8) -> blst::min_pk::SecretKey {
        blst::min_pk::SecretKey::key_gen(&[seed; 32], &[]).unwrap()
    }

    /// Keystore stub carrying only the public fields
    pub(crate) fn write_keystore(dir: &Path, file: &str, name: &str, created: u64, pubkey: &[u8]) {
        fs::create_dir_all(dir).unwrap();
        let json = serde_json::json!({
            "uuid": format!("uuid-{}", name),
            "name": name,
            "created": created,
            "pubkey": hex::encode(pubkey),
            "version": 4,
        });
        fs::write(dir.join(file), json.to_string()).unwrap();
    }

    fn store() -> (tempfile::TempDir, WalletStore) {
        let datadir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(datadir.path());
        let wallet = store.root.join("primary");
        write_keystore(&wallet, "k2.json", "validator-2", 20, &[0x02; 48]);
        write_keystore(&wallet, "k1.json", "validator-1", 10, &[0x01; 48]);
        write_keystore(&wallet, "k10.json", "validator-10", 30, &[0x0a; 48]);
        write_keystore(&wallet, "w.json", "withdrawal", 5, &[0xbb; 48]);
        fs::write(wallet.join("README"), "not a keystore").unwrap();
        (datadir, store)
    }

    #[test]
    fn resolves_pattern_in_creation_order() {
        let (_dir, store) = store();
        let (wallet, accounts) = store.resolve("primary/validator-.*").unwrap();
        assert_eq!(wallet.name, "primary");
        let names: Vec<String> = accounts.iter().map(|a| a.path()).collect();
        assert_eq!(
            names,
            vec!["primary/validator-1", "primary/validator-2", "primary/validator-10"]
        );
        assert_eq!(accounts[0].pubkey, PublicKey::repeat_byte(0x01));

        let (_, all) = store.resolve("primary").unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].name, "withdrawal");
    }

    #[test]
    fn resolve_one_requires_single_match() {
        let (_dir, store) = store();
        let (_, account) = store.resolve_one("primary/withdrawal").unwrap();
        assert_eq!(account.pubkey, PublicKey::repeat_byte(0xbb));
        // anchored, "validator-1" does not match "validator-10"
        assert!(store.resolve_one("primary/validator-1").is_ok());
        assert!(matches!(
            store.resolve_one("primary/validator-.*"),
            Err(DepositError::InvalidInput(_))
        ));
    }

    #[test]
    fn resolve_errors() {
        let (_dir, store) = store();
        for path in ["", "/x", "primary/", "missing/validator", "primary/nobody", "primary/(["] {
            assert!(
                matches!(store.resolve(path), Err(DepositError::InvalidInput(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn skips_non_bls_keystores() {
        let (_dir, store) = store();
        let wallet = store.root.join("primary");
        let v3 = serde_json::json!({
            "address": "0x0000000000000000000000000000000000000001",
            "crypto": {},
            "id": "uuid-eoa",
            "version": 3,
        });
        fs::write(wallet.join("eoa.json"), v3.to_string()).unwrap();
        fs::write(wallet.join("broken.json"), "{").unwrap();

        let (_, all) = store.resolve("primary").unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|a| a.name != "eoa" && a.name != "broken"));
        assert!(matches!(
            store.resolve("primary/eoa"),
            Err(DepositError::InvalidInput(_))
        ));
    }

    #[test]
    fn locked_account_cannot_sign() {
        let (_dir, store) = store();
        let (_, account) = store.resolve_one("primary/validator-1").unwrap();
        assert!(!account.is_unlocked());
        assert!(matches!(
            account.sign(B256::ZERO, B256::ZERO),
            Err(DepositError::Signing(_))
        ));
        assert!(matches!(
            account.try_unlock(None),
            Err(DepositError::Signing(_))
        ));
        // stub keystore has no crypto section
        assert!(matches!(
            account.try_unlock(Some("secret")),
            Err(DepositError::Signing(_))
        ));
    }

    #[test]
    fn bls_signature_verifies() {
        let sk = bls_key(7);
        let pk = sk.sk_to_pk();
        let domain = deposit_domain(Default::default());
        let root = compute_signing_root(B256::repeat_byte(0x42), domain);
        let sig = bls_sign(&sk.to_bytes(), &root).unwrap();

        let sig = blst::min_pk::Signature::from_bytes(sig.as_slice()).unwrap();
        assert_eq!(
            sig.verify(true, root.as_slice(), BLS_DST, &[], &pk, true),
            BLST_ERROR::BLST_SUCCESS
        );
        assert!(bls_sign(&[0u8; 7], &root).is_err());
    }

    /// Encrypted v4 keystore with the public fields we read patched in
    pub(crate) fn write_encrypted_keystore(
        dir: &Path,
        file: &str,
        name: &str,
        created: u64,
        sk: &blst::min_pk::SecretKey,
        passphrase: &str,
    ) {
        fs::create_dir_all(dir).unwrap();
        let mut rng = rand::thread_rng();
        eth_keystore::v4::encrypt_key(dir, &mut rng, &sk.to_bytes(), passphrase, Some(file))
            .unwrap();
        let keypath = dir.join(file);
        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&keypath).unwrap()).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.insert("name".into(), name.into());
        obj.insert("created".into(), created.into());
        obj.insert("pubkey".into(), hex::encode(sk.sk_to_pk().compress()).into());
        fs::write(&keypath, json.to_string()).unwrap();
    }

    #[test]
    fn unlocks_encrypted_keystore() {
        let datadir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(datadir.path());
        let sk = bls_key(9);
        write_encrypted_keystore(
            &store.root.join("primary"),
            "validator.json",
            "validator",
            1,
            &sk,
            "passphrase",
        );

        let (_, account) = store.resolve_one("primary/validator").unwrap();
        assert!(matches!(
            account.unlock("wrong"),
            Err(DepositError::Signing(_))
        ));
        account.try_unlock(Some("passphrase")).unwrap();
        assert!(account.is_unlocked());

        let domain = deposit_domain(Default::default());
        let object_root = B256::repeat_byte(0x42);
        let sig = account.sign(object_root, domain).unwrap();
        let sig = blst::min_pk::Signature::from_bytes(sig.as_slice()).unwrap();
        let signing_root = compute_signing_root(object_root, domain);
        assert_eq!(
            sig.verify(
                true,
                signing_root.as_slice(),
                BLS_DST,
                &[],
                &sk.sk_to_pk(),
                true
            ),
            BLST_ERROR::BLST_SUCCESS
        );

        account.lock();
        assert!(!account.is_unlocked());
    }
}
