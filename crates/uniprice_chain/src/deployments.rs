use std::path::{Path, PathBuf};

use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, TxHash};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uniprice_core::UnipriceError;

use crate::deployer::Deployment;

const CHAIN_ID_FILE: &str = ".chainId";

/// A deployment as persisted under `<deployments>/<network>/<Name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub address: Address,
    pub abi: JsonAbi,
    pub transaction_hash: TxHash,
    pub args: Vec<String>,
    pub deployer: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
    pub fn new(deployment: &Deployment, abi: JsonAbi) -> Self {
        Self {
            address: deployment.address,
            abi,
            transaction_hash: deployment.tx_hash,
            args: deployment.args.clone(),
            deployer: deployment.deployer,
            block_number: deployment.block_number,
            gas_used: deployment.gas_used,
            deployed_at: Utc::now(),
        }
    }
}

/// Per-network directory of deployment records.
#[derive(Debug, Clone)]
pub struct DeploymentStore {
    dir: PathBuf,
}

impl DeploymentStore {
    /// Store for `network` under the deployments root.
    pub fn new(root: &Path, network: &str) -> Self {
        Self {
            dir: root.join(network),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, contract: &str) -> PathBuf {
        self.dir.join(format!("{contract}.json"))
    }

    /// Write the record for `contract` and the network's `.chainId` marker.
    pub fn save(&self, contract: &str, record: &DeploymentRecord, chain_id: u64) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let path = self.record_path(contract);
        let json =
            serde_json::to_string_pretty(record).context("failed to serialize deployment record")?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        std::fs::write(self.dir.join(CHAIN_ID_FILE), chain_id.to_string())
            .context("failed to write chain id marker")?;

        info!(path = %path.display(), address = %record.address, "deployment saved");
        Ok(path)
    }

    /// Load the record for `contract`. Returns `None` if it was never saved.
    pub fn load(&self, contract: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.record_path(contract);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let record = serde_json::from_str(&json)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(record))
    }

    /// Load the record for `contract`, refusing records that were written for
    /// a different chain than `chain_id`.
    pub fn load_for_chain(&self, contract: &str, chain_id: u64) -> Result<Option<DeploymentRecord>> {
        match self.chain_id()? {
            Some(recorded) if recorded != chain_id => Err(UnipriceError::Deployment(format!(
                "records in {} belong to chain {recorded}, but the node is on chain {chain_id}",
                self.dir.display()
            ))
            .into()),
            _ => self.load(contract),
        }
    }

    /// Chain id the records were written for, if any were written.
    pub fn chain_id(&self) -> Result<Option<u64>> {
        let path = self.dir.join(CHAIN_ID_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("failed to read chain id marker")?;
        let id = raw
            .trim()
            .parse()
            .with_context(|| format!("invalid chain id in {}", path.display()))?;
        Ok(Some(id))
    }

    /// All records, sorted by contract name.
    pub fn list(&self) -> Result<Vec<(String, DeploymentRecord)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if let Some(record) = self.load(stem)? {
                records.push((stem.to_string(), record));
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }
}
