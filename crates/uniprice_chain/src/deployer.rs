use std::time::Duration;

use alloy::dyn_abi::DynSolValue;
use alloy::network::{Ethereum, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{PendingTransactionBuilder, Provider};
use alloy::rpc::types::TransactionReceipt;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uniprice_core::UnipriceError;

use crate::factory::ContractFactory;
use crate::network::Session;

/// Options for waiting on a deployment transaction.
#[derive(Debug, Clone)]
pub struct ConfirmOptions {
    pub confirmations: u64,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            confirmations: 1,
            timeout: None,
        }
    }
}

/// The parts of a receipt a deployment cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub transaction_hash: TxHash,
    pub success: bool,
    pub contract_address: Option<Address>,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl From<&TransactionReceipt> for ReceiptSummary {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            success: receipt.status(),
            contract_address: receipt.contract_address,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        }
    }
}

/// A confirmed contract deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub contract: String,
    pub address: Address,
    pub tx_hash: TxHash,
    pub deployer: Address,
    pub args: Vec<String>,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl Deployment {
    /// Build a deployment from its receipt. A reverted transaction or a
    /// receipt without a created address is an error.
    pub fn from_receipt(
        contract: String,
        deployer: Address,
        args: Vec<String>,
        receipt: &ReceiptSummary,
    ) -> Result<Self, UnipriceError> {
        if !receipt.success {
            return Err(UnipriceError::Deployment(format!(
                "{contract} deployment transaction {} reverted",
                receipt.transaction_hash
            )));
        }
        let address = receipt.contract_address.ok_or_else(|| {
            UnipriceError::Deployment(format!(
                "receipt of {} has no contract address",
                receipt.transaction_hash
            ))
        })?;

        Ok(Self {
            contract,
            address,
            tx_hash: receipt.transaction_hash,
            deployer,
            args,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        })
    }

    /// Total fee paid, in wei.
    pub fn fee(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

/// A deployment transaction that has been accepted by the node but is not
/// yet confirmed.
pub struct PendingDeployment {
    contract: String,
    deployer: Address,
    args: Vec<String>,
    pending: PendingTransactionBuilder<Ethereum>,
}

impl PendingDeployment {
    pub fn tx_hash(&self) -> TxHash {
        *self.pending.tx_hash()
    }

    /// Wait for the receipt and check it created a contract.
    pub async fn confirm(self, options: &ConfirmOptions) -> Result<Deployment> {
        let PendingDeployment {
            contract,
            deployer,
            args,
            pending,
        } = self;
        let tx_hash = *pending.tx_hash();

        debug!(%tx_hash, confirmations = options.confirmations, "waiting for receipt");
        let receipt = pending
            .with_required_confirmations(options.confirmations)
            .with_timeout(options.timeout)
            .get_receipt()
            .await
            .with_context(|| format!("{contract} deployment {tx_hash} was not confirmed"))?;

        let deployment =
            Deployment::from_receipt(contract, deployer, args, &ReceiptSummary::from(&receipt))?;
        info!(
            contract = %deployment.contract,
            address = %deployment.address,
            gas_used = deployment.gas_used,
            "contract deployed"
        );
        Ok(deployment)
    }
}

/// Submit the creation transaction of `factory` from the session's admin.
///
/// `display_args` are the arguments as the operator wrote them; they are kept
/// for the deployment record and explorer verification.
pub async fn send_deployment(
    session: &Session,
    factory: &ContractFactory,
    args: &[DynSolValue],
    display_args: Vec<String>,
) -> Result<PendingDeployment> {
    let deployer = session.admin();
    let tx = factory.deploy_tx(args)?.with_from(deployer);

    let pending = session
        .provider
        .send_transaction(tx)
        .await
        .with_context(|| format!("failed to send {} deployment", factory.name()))?;
    debug!(contract = factory.name(), tx_hash = %pending.tx_hash(), "deployment sent");

    Ok(PendingDeployment {
        contract: factory.name().to_string(),
        deployer,
        args: display_args,
        pending,
    })
}
