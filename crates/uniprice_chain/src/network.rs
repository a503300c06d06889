use std::collections::HashMap;

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::{Http, reqwest};
use anyhow::{Context, Result};
use tracing::info;
use uniprice_core::{ResolvedNetwork, UnipriceError};

use crate::signer::Signers;

/// Display metadata for a well-known chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub name: &'static str,
    pub chain_id: u64,
    pub explorer_url: &'static str,
}

/// Chains with a known public block explorer, keyed by chain id.
fn known_chains() -> HashMap<u64, ChainInfo> {
    [
        ChainInfo {
            name: "Ethereum Mainnet",
            chain_id: 1,
            explorer_url: "https://etherscan.io",
        },
        ChainInfo {
            name: "Goerli",
            chain_id: 5,
            explorer_url: "https://goerli.etherscan.io",
        },
        ChainInfo {
            name: "Sepolia",
            chain_id: 11_155_111,
            explorer_url: "https://sepolia.etherscan.io",
        },
        ChainInfo {
            name: "Base Mainnet",
            chain_id: 8453,
            explorer_url: "https://basescan.org",
        },
    ]
    .into_iter()
    .map(|info| (info.chain_id, info))
    .collect()
}

/// Browser link for an address on a known chain.
pub fn explorer_address_url(chain_id: u64, address: Address) -> Option<String> {
    known_chains()
        .get(&chain_id)
        .map(|info| format!("{}/address/{address}", info.explorer_url))
}

/// Fail when the node reports a different chain than the one configured.
pub fn check_chain_id(expected: Option<u64>, actual: u64) -> Result<(), UnipriceError> {
    match expected {
        Some(expected) if expected != actual => Err(UnipriceError::Config(format!(
            "configured chain id {expected} does not match the node's chain id {actual}"
        ))),
        _ => Ok(()),
    }
}

/// A connected network: provider, signers and the confirmed chain id.
pub struct Session {
    pub network: ResolvedNetwork,
    pub signers: Signers,
    pub provider: DynProvider,
    pub chain_id: u64,
}

impl Session {
    /// Build the signers and the HTTP provider for `network` and confirm the
    /// node is reachable and on the expected chain.
    pub async fn connect(network: ResolvedNetwork) -> Result<Self> {
        let signers = Signers::from_accounts(&network.accounts)?;

        let client = reqwest::Client::builder()
            .timeout(network.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let transport = Http::with_client(client, network.url.clone());
        let is_local = transport.guess_local();
        let rpc = RpcClient::new(transport, is_local);

        let provider = ProviderBuilder::new()
            .wallet(signers.wallet())
            .connect_client(rpc)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .with_context(|| format!("failed to reach {} at {}", network.name, network.url))?;
        check_chain_id(network.chain_id, chain_id)?;

        info!(
            network = %network.name,
            chain_id,
            accounts = signers.len(),
            "connected"
        );

        Ok(Self {
            network,
            signers,
            provider,
            chain_id,
        })
    }

    /// Address of the deployer account.
    pub fn admin(&self) -> Address {
        self.signers.admin().address()
    }

    /// Native balance of `address` in wei.
    pub async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .with_context(|| format!("failed to query balance of {address}"))
    }
}
