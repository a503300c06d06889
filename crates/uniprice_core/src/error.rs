use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type raised by library code.
#[derive(Error, Debug)]
pub enum UnipriceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {var} is not set (required by {field})")]
    MissingEnv { var: String, field: String },

    #[error("Unknown network '{name}' (configured: {known})")]
    UnknownNetwork { name: String, known: String },

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Deployment failed: {0}")]
    Deployment(String),

    #[error("Verification failed: {0}")]
    Verification(String),
}

/// Broad classification of [`UnipriceError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Invalid or missing configuration or environment.
    ConfigError,
    /// Key material could not be turned into a signer.
    SignerError,
    /// Build output is missing or unusable.
    BuildError,
    /// The node or explorer could not be reached or rejected a request.
    RemoteError,
}

impl UnipriceError {
    /// Returns the broad error category for routing and display purposes.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::MissingEnv { .. } | Self::UnknownNetwork { .. } => {
                ErrorCategory::ConfigError
            }
            Self::Signer(_) => ErrorCategory::SignerError,
            Self::Artifact(_) => ErrorCategory::BuildError,
            Self::Rpc(_) | Self::Deployment(_) | Self::Verification(_) => {
                ErrorCategory::RemoteError
            }
        }
    }

    /// What the operator should do about this error. Never echoes key material.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(_) => "Check uniprice.toml.".into(),
            Self::MissingEnv { var, .. } => format!("Set {var} in the environment or in .env."),
            Self::UnknownNetwork { known, .. } => format!("Choose one of: {known}."),
            Self::Signer(_) => {
                "Check the mnemonic or private keys configured for this network.".into()
            }
            Self::Artifact(_) => "Compile the contracts so the build artifacts are current.".into(),
            Self::Rpc(_) => "Check the RPC URL and that the node is reachable.".into(),
            Self::Deployment(_) => "Inspect the deployment transaction on the node.".into(),
            Self::Verification(_) => {
                "Check the contract address, constructor arguments and compiler settings.".into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error classification for anyhow::Error
// ---------------------------------------------------------------------------

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Informational, nothing to fix.
    Low,
    /// Fixable by the operator.
    Medium,
    /// Operation failed.
    High,
}

/// Fine-grained error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifiedCategory {
    Funds,
    Nonce,
    AlreadyVerified,
    Authentication,
    RateLimit,
    Network,
    Artifact,
    Environment,
    Configuration,
    Signer,
    Remote,
    FileSystem,
    Internal,
}

/// Classified error with context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub severity: ErrorSeverity,
    pub category: ClassifiedCategory,
    pub message: String,
    pub hint: String,
}

/// Classify an `anyhow::Error` into severity, category and an operator hint.
///
/// A [`UnipriceError`] anywhere in the chain decides the category. Remote
/// errors and untyped errors are refined by known message patterns.
pub fn classify_error(error: &anyhow::Error) -> ClassifiedError {
    let message = format!("{error:#}");
    let typed = error.chain().find_map(|e| e.downcast_ref::<UnipriceError>());

    let (category, severity, hint) = match typed {
        Some(err) => match err.category() {
            ErrorCategory::ConfigError => {
                let category = if matches!(err, UnipriceError::MissingEnv { .. }) {
                    ClassifiedCategory::Environment
                } else {
                    ClassifiedCategory::Configuration
                };
                (category, ErrorSeverity::Medium, err.user_message())
            }
            ErrorCategory::SignerError => {
                (ClassifiedCategory::Signer, ErrorSeverity::High, err.user_message())
            }
            ErrorCategory::BuildError => {
                (ClassifiedCategory::Artifact, ErrorSeverity::High, err.user_message())
            }
            ErrorCategory::RemoteError => match classify_message(&message) {
                Some((category, severity, hint)) => (category, severity, hint.to_string()),
                None => (ClassifiedCategory::Remote, ErrorSeverity::High, err.user_message()),
            },
        },
        None => match classify_message(&message) {
            Some((category, severity, hint)) => (category, severity, hint.to_string()),
            None => (
                ClassifiedCategory::Internal,
                ErrorSeverity::High,
                "An unexpected error occurred.".to_string(),
            ),
        },
    };

    ClassifiedError {
        severity,
        category,
        message,
        hint,
    }
}

/// Known failure patterns of nodes, explorers and the HTTP stack. Status
/// codes only match in their `(401 Unauthorized)` rendering so that hex
/// addresses and hashes never do.
fn classify_message(message: &str) -> Option<(ClassifiedCategory, ErrorSeverity, &'static str)> {
    let msg = message.to_lowercase();

    let found = if msg.contains("insufficient funds") {
        (
            ClassifiedCategory::Funds,
            ErrorSeverity::High,
            "The deployer account cannot pay for gas. Fund it and run again.",
        )
    } else if msg.contains("nonce too low") || msg.contains("replacement transaction underpriced")
    {
        (
            ClassifiedCategory::Nonce,
            ErrorSeverity::Medium,
            "A pending transaction from this account conflicts. Wait for it to confirm.",
        )
    } else if msg.contains("already verified") {
        (
            ClassifiedCategory::AlreadyVerified,
            ErrorSeverity::Low,
            "The contract source is already verified on the explorer.",
        )
    } else if msg.contains("invalid api key")
        || msg.contains("unauthorized")
        || msg.contains("(401 ")
        || msg.contains("status 401")
    {
        (
            ClassifiedCategory::Authentication,
            ErrorSeverity::High,
            "The explorer rejected the API key. Check ETHERSCAN_API_KEY.",
        )
    } else if msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("(429 ")
        || msg.contains("status 429")
    {
        (
            ClassifiedCategory::RateLimit,
            ErrorSeverity::Medium,
            "Rate limited by the remote service. Try again shortly.",
        )
    } else if msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("dns error")
        || msg.contains("error sending request")
    {
        (
            ClassifiedCategory::Network,
            ErrorSeverity::Medium,
            "Network error. Check the RPC URL and that the node is reachable.",
        )
    } else if msg.contains("config") {
        (
            ClassifiedCategory::Configuration,
            ErrorSeverity::Medium,
            "Configuration error. Check uniprice.toml.",
        )
    } else if msg.contains("no such file") {
        (
            ClassifiedCategory::FileSystem,
            ErrorSeverity::Medium,
            "File not found.",
        )
    } else {
        return None;
    };
    Some(found)
}
