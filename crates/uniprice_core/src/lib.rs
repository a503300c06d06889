pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Accounts, MnemonicAccounts, NetworkConfig, PathsConfig, Project, ProjectConfig,
    ResolvedNetwork, VerifyTargetConfig, interpolate, process_env, validate_url,
};
pub use error::{
    ClassifiedCategory, ClassifiedError, ErrorCategory, ErrorSeverity, UnipriceError,
    classify_error,
};
