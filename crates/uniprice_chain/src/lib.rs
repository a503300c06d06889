pub mod artifacts;
pub mod deployer;
pub mod deployments;
pub mod dev_node;
pub mod factory;
pub mod network;
pub mod signer;
pub mod verify;

// Re-export primary types for convenient access.
pub use artifacts::{Artifact, ArtifactStore, BuildInfo};
pub use deployer::{ConfirmOptions, Deployment, PendingDeployment, ReceiptSummary, send_deployment};
pub use deployments::{DeploymentRecord, DeploymentStore};
pub use factory::ContractFactory;
pub use network::{Session, check_chain_id, explorer_address_url};
pub use signer::Signers;
pub use verify::{
    EtherscanClient, Explorer, PollPolicy, SubmitOutcome, VerificationStatus, VerifyOutcome,
    VerifyRequest, ensure_deployed, verify_contract,
};
