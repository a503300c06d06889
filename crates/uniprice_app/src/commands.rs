use alloy::primitives::Address;
use alloy::primitives::utils::format_ether;
use anyhow::{Context, Result};
use tracing::{info, warn};
use uniprice_chain::{
    ArtifactStore, ConfirmOptions, ContractFactory, DeploymentRecord, DeploymentStore,
    EtherscanClient, PollPolicy, Session, VerifyOutcome, VerifyRequest, dev_node,
    ensure_deployed, explorer_address_url, send_deployment, verify_contract,
};
use uniprice_core::{
    Project, ProjectConfig, ResolvedNetwork, UnipriceError, VerifyTargetConfig, process_env,
};

use crate::cli::{Commands, DevCommands, FETCHER_CONTRACT, TOKEN_CONTRACT};

const DONE_BANNER: &str = "\n===== DONE =====";

/// A loaded project plus the network the command runs against.
pub struct App {
    pub project: Project,
    pub network: String,
}

impl App {
    pub fn new(project: Project, network: impl Into<String>) -> Self {
        Self {
            project,
            network: network.into(),
        }
    }

    fn resolve_network(&self) -> Result<ResolvedNetwork> {
        Ok(self
            .project
            .config
            .resolve_network(&self.network, process_env)?)
    }

    async fn connect(&self) -> Result<Session> {
        Session::connect(self.resolve_network()?).await
    }

    fn deployment_store(&self) -> DeploymentStore {
        DeploymentStore::new(&self.project.paths.deployments, &self.network)
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::DeployFetcher => self.deploy(FETCHER_CONTRACT, Vec::new()).await,
            Commands::DeployToken {
                decimals,
                name,
                symbol,
            } => {
                self.deploy(TOKEN_CONTRACT, vec![decimals.to_string(), name, symbol])
                    .await
            }
            Commands::Verify {
                contract,
                address,
                args,
            } => self.verify(contract, address, args).await,
            Commands::Accounts => self.accounts().await,
            Commands::Deployments => self.deployments(),
            Commands::Init => self.init(),
            Commands::Dev { command } => self.dev(command).await,
        }
    }

    // -----------------------------------------------------------------------
    // Deploy
    // -----------------------------------------------------------------------

    async fn deploy(&self, contract: &str, raw_args: Vec<String>) -> Result<()> {
        let session = self.connect().await?;
        let admin = session.admin();
        println!("Admin account: {admin}");
        println!("Account balance: {}", session.balance(admin).await?);

        println!("Deploy {contract} Contract .........");
        let artifact = ArtifactStore::new(&self.project.paths.artifacts).find(contract)?;
        let factory = ContractFactory::from_artifact(&artifact)?;
        let args = factory.parse_args(&raw_args)?;

        let pending = send_deployment(&session, &factory, &args, raw_args).await?;
        println!("Tx Hash {}", pending.tx_hash());

        let options = ConfirmOptions {
            confirmations: session.network.confirmations,
            timeout: session.network.confirm_timeout,
        };
        let deployment = pending.confirm(&options).await?;
        println!("{contract} Contract: {}", deployment.address);

        if self.project.config.gas_reporter.enabled {
            println!(
                "Gas used: {} (fee {} ETH)",
                deployment.gas_used,
                format_ether(deployment.fee())
            );
        }

        if session.network.save_deployments {
            let record = DeploymentRecord::new(&deployment, factory.abi().clone());
            self.deployment_store()
                .save(contract, &record, session.chain_id)?;
        }
        if let Some(url) = explorer_address_url(session.chain_id, deployment.address) {
            info!(%url, "explorer");
        }

        println!("{DONE_BANNER}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Verify
    // -----------------------------------------------------------------------

    async fn verify(
        &self,
        contract: Option<String>,
        address: Option<String>,
        args: Vec<String>,
    ) -> Result<()> {
        let config = &self.project.config;
        let target = select_target(config, contract, args)?;
        let name = bare_name(&target.contract).to_string();
        println!("Verify {name} Contract ......");

        let api_key = config.etherscan_api_key(process_env)?;

        let store = ArtifactStore::new(&self.project.paths.artifacts);
        let artifact = store.find(&target.contract)?;
        let build_info = store.build_info(&artifact)?;
        if build_info.solc_version != config.solidity.version {
            warn!(
                configured = %config.solidity.version,
                compiled = %build_info.solc_version,
                "artifact was built with a different compiler version"
            );
        }
        let factory = ContractFactory::from_artifact(&artifact)?;

        let session = self.connect().await?;
        let records = self.deployment_store();
        let plan = plan_verification(target, address.as_deref(), factory.takes_args(), || {
            records.load_for_chain(&name, session.chain_id)
        })?;
        let address = plan.address;
        let constructor_args = factory.encode_args(&factory.parse_args(&plan.args)?)?;

        ensure_deployed(&session, address).await?;

        let explorer = match &session.network.explorer_api_url {
            Some(url) => EtherscanClient::with_base_url(api_key, session.chain_id, url.as_str())?,
            None => EtherscanClient::new(api_key, session.chain_id)?,
        };
        let request = VerifyRequest {
            address,
            contract_name: artifact.qualified_name(),
            compiler_version: build_info.compiler_version(),
            source: build_info.input,
            constructor_args,
        };

        match verify_contract(&explorer, &request, PollPolicy::default()).await? {
            VerifyOutcome::Verified => println!("Successfully verified {name} at {address}"),
            VerifyOutcome::AlreadyVerified => println!("{name} at {address} is already verified"),
        }
        if let Some(url) = explorer_address_url(session.chain_id, address) {
            println!("{url}#code");
        }

        println!("{DONE_BANNER}");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    async fn accounts(&self) -> Result<()> {
        let session = self.connect().await?;
        for (i, address) in session.signers.addresses().into_iter().enumerate() {
            let balance = session.balance(address).await?;
            println!("{i:>3}: {address} {} ETH", format_ether(balance));
        }
        Ok(())
    }

    fn deployments(&self) -> Result<()> {
        self.project.config.network(&self.network)?;
        let store = self.deployment_store();
        let records = store.list()?;
        if records.is_empty() {
            println!("No deployments recorded for {}", self.network);
            return Ok(());
        }
        for (name, record) in records {
            println!("{name}: {} (tx {})", record.address, record.transaction_hash);
        }
        Ok(())
    }

    fn init(&self) -> Result<()> {
        let path = &self.project.config_path;
        ProjectConfig::default()
            .save_to_path(path)
            .with_context(|| format!("cannot initialize {}", path.display()))?;
        println!("Wrote {}", path.display());
        Ok(())
    }

    async fn dev(&self, command: DevCommands) -> Result<()> {
        let network = self.resolve_network()?;
        dev_node::ensure_dev(&network)?;
        let session = Session::connect(network).await?;

        match command {
            DevCommands::IncreaseTime { seconds } => {
                let block = dev_node::increase_time(&session, seconds).await?;
                println!("Advanced time by {seconds}s, now at block {block}");
            }
            DevCommands::Mine { blocks } => {
                let block = dev_node::mine(&session, blocks).await?;
                println!("Mined {blocks} block(s), now at block {block}");
            }
        }
        Ok(())
    }
}

/// Contract name without its source path.
fn bare_name(contract: &str) -> &str {
    contract.rsplit(':').next().unwrap_or(contract)
}

/// Pick the verify target: the named contract (merged with its configured
/// entry, if any) or else the first configured target. Arguments given on the
/// command line replace the configured ones.
fn select_target(
    config: &ProjectConfig,
    contract: Option<String>,
    args: Vec<String>,
) -> Result<VerifyTargetConfig, UnipriceError> {
    let mut target = match contract {
        Some(contract) => config
            .verify_target(&contract)
            .or_else(|| config.verify_target(bare_name(&contract)))
            .cloned()
            .map(|configured| VerifyTargetConfig {
                contract: contract.clone(),
                ..configured
            })
            .unwrap_or(VerifyTargetConfig {
                contract,
                address: None,
                args: Vec::new(),
            }),
        None => config.verify.first().cloned().ok_or_else(|| {
            UnipriceError::Config("no contract given and no [[verify]] target configured".into())
        })?,
    };
    if !args.is_empty() {
        target.args = args;
    }
    Ok(target)
}

/// What `verify` submits once the target is pinned down.
#[derive(Debug)]
struct VerifyPlan {
    address: Address,
    args: Vec<String>,
}

/// Resolve the address and constructor arguments to verify.
///
/// The address is the explicit flag, else the configured target address,
/// else the recorded deployment. Arguments come from the command line or the
/// configured target, else from the record. `load_record` runs only when one
/// of the two still has to come from the record.
fn plan_verification<F>(
    target: VerifyTargetConfig,
    flag: Option<&str>,
    needs_args: bool,
    load_record: F,
) -> Result<VerifyPlan>
where
    F: FnOnce() -> Result<Option<DeploymentRecord>>,
{
    let explicit = flag
        .or(target.address.as_deref())
        .map(|raw| {
            raw.trim()
                .parse::<Address>()
                .map_err(|e| UnipriceError::Config(format!("invalid address {raw:?}: {e}")))
        })
        .transpose()?;

    let needs_record = explicit.is_none() || (needs_args && target.args.is_empty());
    let record = if needs_record { load_record()? } else { None };
    // A record for some other address says nothing about these arguments.
    let record = record.filter(|r| explicit.is_none_or(|address| r.address == address));

    let address = match (explicit, &record) {
        (Some(address), _) => address,
        (None, Some(record)) => record.address,
        (None, None) => {
            return Err(UnipriceError::Config(format!(
                "no address for {}: pass --address, configure one, or deploy it first",
                target.contract
            ))
            .into());
        }
    };
    let args = match record {
        Some(record) if target.args.is_empty() => record.args,
        _ => target.args,
    };
    Ok(VerifyPlan { address, args })
}
