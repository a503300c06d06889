use std::fmt;

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::{MnemonicBuilder, PrivateKeySigner};
use tracing::debug;
use uniprice_core::{Accounts, MnemonicAccounts, UnipriceError};

/// The ordered signers of a network. Index 0 is the admin/deployer.
#[derive(Clone)]
pub struct Signers {
    signers: Vec<PrivateKeySigner>,
}

impl Signers {
    /// Build signers from a resolved (already interpolated) account source.
    pub fn from_accounts(accounts: &Accounts) -> Result<Self, UnipriceError> {
        match accounts {
            Accounts::Mnemonic(m) => Self::from_mnemonic(m),
            Accounts::PrivateKeys(keys) => Self::from_private_keys(keys),
        }
    }

    /// Derive `count` signers along `<path>/<initial_index + i>`.
    pub fn from_mnemonic(accounts: &MnemonicAccounts) -> Result<Self, UnipriceError> {
        if accounts.count == 0 {
            return Err(UnipriceError::Signer(
                "mnemonic account count must be at least 1".into(),
            ));
        }

        let base = accounts.path.trim_end_matches('/');
        let phrase = accounts.mnemonic.trim();
        let mut signers = Vec::with_capacity(accounts.count as usize);
        for offset in 0..accounts.count {
            let index = accounts.initial_index + offset;
            let path = format!("{base}/{index}");
            let signer = MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .derivation_path(&path)
                .and_then(|builder| builder.build())
                .map_err(|e| UnipriceError::Signer(format!("derivation at {path} failed: {e}")))?;
            signers.push(signer);
        }

        debug!(count = signers.len(), "derived mnemonic signers");
        Ok(Self { signers })
    }

    /// Parse hex private keys, with or without a `0x` prefix.
    pub fn from_private_keys(keys: &[String]) -> Result<Self, UnipriceError> {
        if keys.is_empty() {
            return Err(UnipriceError::Signer("no accounts configured".into()));
        }

        let signers = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let key = key.trim();
                let key = key.strip_prefix("0x").unwrap_or(key);
                key.parse::<PrivateKeySigner>()
                    .map_err(|e| UnipriceError::Signer(format!("private key #{i} is invalid: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { signers })
    }

    /// The deployer account.
    pub fn admin(&self) -> &PrivateKeySigner {
        &self.signers[0]
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|s| s.address()).collect()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// A wallet holding every signer; the admin is the default sender.
    pub fn wallet(&self) -> EthereumWallet {
        let mut wallet = EthereumWallet::new(self.admin().clone());
        for signer in self.signers.iter().skip(1) {
            wallet.register_signer(signer.clone());
        }
        wallet
    }
}

impl fmt::Debug for Signers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signers")
            .field("addresses", &self.addresses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const FIRST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn mnemonic(count: u32, initial_index: u32) -> MnemonicAccounts {
        MnemonicAccounts {
            mnemonic: TEST_MNEMONIC.into(),
            count,
            initial_index,
            path: "m/44'/60'/0'/0".into(),
        }
    }

    #[test]
    fn derives_well_known_dev_accounts() {
        let signers = Signers::from_mnemonic(&mnemonic(2, 0)).unwrap();
        assert_eq!(signers.len(), 2);
        assert_eq!(
            signers.addresses(),
            vec![
                addr("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
                addr("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"),
            ]
        );
    }

    #[test]
    fn initial_index_shifts_derivation() {
        let signers = Signers::from_mnemonic(&mnemonic(1, 1)).unwrap();
        assert_eq!(
            signers.admin().address(),
            addr("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")
        );
    }

    #[test]
    fn trailing_slash_in_path_is_ignored() {
        let mut accounts = mnemonic(1, 0);
        accounts.path = "m/44'/60'/0'/0/".into();
        let signers = Signers::from_mnemonic(&accounts).unwrap();
        assert_eq!(
            signers.admin().address(),
            addr("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(Signers::from_mnemonic(&mnemonic(0, 0)).is_err());
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        let mut accounts = mnemonic(1, 0);
        accounts.mnemonic = "not a real phrase".into();
        let err = Signers::from_mnemonic(&accounts).unwrap_err();
        assert!(matches!(err, UnipriceError::Signer(_)));
    }

    #[test]
    fn private_keys_with_and_without_prefix() {
        let keys = vec![format!("0x{FIRST_KEY}"), FIRST_KEY.to_string()];
        let signers = Signers::from_private_keys(&keys).unwrap();
        let expected = addr("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(signers.addresses(), vec![expected, expected]);
    }

    #[test]
    fn empty_or_bad_private_keys_are_rejected() {
        assert!(Signers::from_private_keys(&[]).is_err());
        let err = Signers::from_private_keys(&["0xzz".to_string()]).unwrap_err();
        assert!(err.to_string().contains("#0"));
    }

    #[test]
    fn from_accounts_dispatches() {
        let signers =
            Signers::from_accounts(&Accounts::PrivateKeys(vec![FIRST_KEY.to_string()])).unwrap();
        assert_eq!(signers.len(), 1);
        let signers = Signers::from_accounts(&Accounts::Mnemonic(mnemonic(3, 0))).unwrap();
        assert_eq!(signers.len(), 3);
    }

    #[test]
    fn debug_shows_addresses_only() {
        let signers = Signers::from_private_keys(&[FIRST_KEY.to_string()]).unwrap();
        let out = format!("{signers:?}");
        assert!(!out.contains(FIRST_KEY));
        assert!(out.to_lowercase().contains("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"));
    }
}
