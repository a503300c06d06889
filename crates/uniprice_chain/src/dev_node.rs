//! Time and block helpers for local development nodes (Hardhat, Anvil).

use alloy::providers::Provider;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;
use uniprice_core::{ResolvedNetwork, UnipriceError};

use crate::network::Session;

/// Refuse node-manipulation RPCs on live networks.
pub fn ensure_dev(network: &ResolvedNetwork) -> Result<(), UnipriceError> {
    if network.live {
        return Err(UnipriceError::Rpc(format!(
            "{} is a live network; time and mining helpers only work on development nodes",
            network.name
        )));
    }
    Ok(())
}

async fn mine_one(session: &Session) -> Result<()> {
    session
        .provider
        .raw_request::<_, Value>("evm_mine".into(), Vec::<Value>::new())
        .await
        .context("evm_mine failed")?;
    Ok(())
}

/// Advance the node clock by `seconds` and mine a block so the new
/// timestamp takes effect. Returns the latest block number.
pub async fn increase_time(session: &Session, seconds: u64) -> Result<u64> {
    ensure_dev(&session.network)?;

    session
        .provider
        .raw_request::<_, Value>("evm_increaseTime".into(), (seconds,))
        .await
        .context("evm_increaseTime failed")?;
    debug!(seconds, "node time advanced");
    mine_one(session).await?;

    session
        .provider
        .get_block_number()
        .await
        .context("failed to read block number")
}

/// Mine `blocks` empty blocks. Returns the latest block number.
pub async fn mine(session: &Session, blocks: u64) -> Result<u64> {
    ensure_dev(&session.network)?;

    for _ in 0..blocks {
        mine_one(session).await?;
    }
    debug!(blocks, "blocks mined");

    session
        .provider
        .get_block_number()
        .await
        .context("failed to read block number")
}
