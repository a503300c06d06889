use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::UnipriceError;

/// File name looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "uniprice.toml";

/// Network used when none is selected on the command line.
pub const DEFAULT_NETWORK: &str = "development";

/// HTTP request timeout applied when a network does not set one.
const DEFAULT_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_ACCOUNT_COUNT: u32 = 20;
const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0";
const DEFAULT_CONFIRMATIONS: u64 = 1;

static ENV_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env reference pattern"));

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolidityConfig {
    /// Compiler version the artifacts were built with.
    pub version: String,
}

impl Default for SolidityConfig {
    fn default() -> Self {
        Self {
            version: "0.8.9".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasReporterConfig {
    pub enabled: bool,
}

impl Default for GasReporterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Project directory layout, relative to the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub sources: PathBuf,
    pub tests: PathBuf,
    pub cache: PathBuf,
    pub artifacts: PathBuf,
    pub deployments: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sources: "./contracts".into(),
            tests: "./test".into(),
            cache: "./build/cache".into(),
            artifacts: "./build/artifacts".into(),
            deployments: "./deployments".into(),
        }
    }
}

impl PathsConfig {
    /// Resolve every path against `root`. Absolute paths are kept as is.
    pub fn resolve(&self, root: &Path) -> PathsConfig {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                root.join(p)
            }
        };
        PathsConfig {
            sources: join(&self.sources),
            tests: join(&self.tests),
            cache: join(&self.cache),
            artifacts: join(&self.artifacts),
            deployments: join(&self.deployments),
        }
    }

    /// Directory for rolling log files: `<cache>/logs`.
    pub fn logs_dir(&self) -> PathBuf {
        self.cache.join("logs")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtherscanConfig {
    pub api_key: String,
}

impl Default for EtherscanConfig {
    fn default() -> Self {
        Self {
            api_key: "${ETHERSCAN_API_KEY}".into(),
        }
    }
}

/// A contract to submit for explorer verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyTargetConfig {
    pub contract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Mnemonic-derived accounts (BIP-44).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MnemonicAccounts {
    pub mnemonic: String,
    #[serde(default = "default_account_count")]
    pub count: u32,
    #[serde(default)]
    pub initial_index: u32,
    #[serde(default = "default_derivation_path")]
    pub path: String,
}

fn default_account_count() -> u32 {
    DEFAULT_ACCOUNT_COUNT
}

fn default_derivation_path() -> String {
    DEFAULT_DERIVATION_PATH.into()
}

/// Where the signers of a network come from.
///
/// `PrivateKeys` is listed first: a struct also deserializes from a sequence,
/// so the mnemonic form must only be tried for tables.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Accounts {
    PrivateKeys(Vec<String>),
    Mnemonic(MnemonicAccounts),
}

impl Default for Accounts {
    fn default() -> Self {
        Accounts::PrivateKeys(Vec::new())
    }
}

// Key material never reaches logs.
impl fmt::Debug for Accounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accounts::Mnemonic(m) => f
                .debug_struct("Mnemonic")
                .field("mnemonic", &"<redacted>")
                .field("count", &m.count)
                .field("initial_index", &m.initial_index)
                .field("path", &m.path)
                .finish(),
            Accounts::PrivateKeys(keys) => f
                .debug_tuple("PrivateKeys")
                .field(&format!("<{} redacted>", keys.len()))
                .finish(),
        }
    }
}

impl fmt::Debug for MnemonicAccounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Accounts::Mnemonic(self.clone()), f)
    }
}

/// One entry of the `[networks]` table, before environment interpolation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default = "default_true")]
    pub live: bool,
    #[serde(default = "default_true")]
    pub save_deployments: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    /// How long to wait for a deployment receipt, in milliseconds. Unset
    /// waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_timeout: Option<u64>,
    /// Explorer API endpoint; Etherscan's multichain endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_api_url: Option<String>,
    #[serde(default)]
    pub accounts: Accounts,
}

fn default_true() -> bool {
    true
}

/// A network with every `${VAR}` substituted and every value validated.
#[derive(Debug, Clone)]
pub struct ResolvedNetwork {
    pub name: String,
    pub url: Url,
    pub chain_id: Option<u64>,
    pub timeout: Duration,
    pub live: bool,
    pub save_deployments: bool,
    pub confirmations: u64,
    pub confirm_timeout: Option<Duration>,
    pub explorer_api_url: Option<String>,
    pub accounts: Accounts,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// Project configuration stored at `uniprice.toml`.
///
/// Secrets are not written to the file; values such as `${MNEMONIC}` are
/// substituted from the environment (and `.env`) when a network is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub solidity: SolidityConfig,
    pub gas_reporter: GasReporterConfig,
    pub paths: PathsConfig,
    pub etherscan: EtherscanConfig,
    pub networks: BTreeMap<String, NetworkConfig>,
    pub verify: Vec<VerifyTargetConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "development".to_string(),
            NetworkConfig {
                url: "http://127.0.0.1:8545".into(),
                chain_id: None,
                timeout: None,
                live: false,
                save_deployments: true,
                confirmations: None,
                confirm_timeout: None,
                explorer_api_url: None,
                accounts: Accounts::Mnemonic(MnemonicAccounts {
                    mnemonic: "${MNEMONIC}".into(),
                    count: 10,
                    initial_index: 0,
                    path: DEFAULT_DERIVATION_PATH.into(),
                }),
            },
        );
        networks.insert(
            "mainnet".to_string(),
            NetworkConfig {
                url: "${MAINNET_PROVIDER}".into(),
                chain_id: Some(1),
                timeout: Some(900_000),
                live: true,
                save_deployments: true,
                confirmations: None,
                confirm_timeout: None,
                explorer_api_url: None,
                accounts: Accounts::PrivateKeys(vec!["${MAINNET_DEPLOYER}".into()]),
            },
        );
        networks.insert(
            "testnet".to_string(),
            NetworkConfig {
                url: "${GOERLI_PROVIDER}".into(),
                chain_id: Some(5),
                timeout: Some(20_000),
                live: true,
                save_deployments: true,
                confirmations: None,
                confirm_timeout: None,
                explorer_api_url: None,
                accounts: Accounts::PrivateKeys(vec!["${TESTNET_DEPLOYER}".into()]),
            },
        );

        Self {
            solidity: SolidityConfig::default(),
            gas_reporter: GasReporterConfig::default(),
            paths: PathsConfig::default(),
            etherscan: EtherscanConfig::default(),
            networks,
            verify: vec![VerifyTargetConfig {
                contract: "FetchPriceUniswapV2".into(),
                address: Some("0x533e331098ce304c8620270dC460EF57051C6147".into()),
                args: Vec::new(),
            }],
        }
    }
}

impl ProjectConfig {
    /// Load config from a TOML file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Write config to `path`. Refuses to replace an existing file.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config already exists: {}", path.display());
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Comma separated list of configured network names.
    pub fn network_names(&self) -> String {
        self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
    }

    pub fn network(&self, name: &str) -> Result<&NetworkConfig, UnipriceError> {
        self.networks
            .get(name)
            .ok_or_else(|| UnipriceError::UnknownNetwork {
                name: name.to_string(),
                known: self.network_names(),
            })
    }

    /// Resolve a network by substituting `${VAR}` references via `lookup`.
    pub fn resolve_network<F>(&self, name: &str, lookup: F) -> Result<ResolvedNetwork, UnipriceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = self.network(name)?;
        let field = |suffix: &str| format!("networks.{name}.{suffix}");

        let raw_url = interpolate(&network.url, &field("url"), &lookup)?;
        if !validate_url(&raw_url) {
            return Err(UnipriceError::Config(format!(
                "networks.{name}.url is not an http(s) URL: {raw_url}"
            )));
        }
        let url = Url::parse(&raw_url)
            .map_err(|e| UnipriceError::Config(format!("networks.{name}.url: {e}")))?;

        let accounts = match &network.accounts {
            Accounts::Mnemonic(m) => Accounts::Mnemonic(MnemonicAccounts {
                mnemonic: interpolate(&m.mnemonic, &field("accounts.mnemonic"), &lookup)?,
                ..m.clone()
            }),
            Accounts::PrivateKeys(keys) => Accounts::PrivateKeys(
                keys.iter()
                    .enumerate()
                    .map(|(i, k)| interpolate(k, &field(&format!("accounts[{i}]")), &lookup))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        let explorer_api_url = network
            .explorer_api_url
            .as_deref()
            .map(|u| interpolate(u, &field("explorer_api_url"), &lookup))
            .transpose()?;

        let resolved = ResolvedNetwork {
            name: name.to_string(),
            url,
            chain_id: network.chain_id,
            timeout: Duration::from_millis(network.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)),
            live: network.live,
            save_deployments: network.save_deployments,
            confirmations: network.confirmations.unwrap_or(DEFAULT_CONFIRMATIONS),
            confirm_timeout: network.confirm_timeout.map(Duration::from_millis),
            explorer_api_url,
            accounts,
        };
        debug!(network = %name, url = %resolved.url, "network resolved");
        Ok(resolved)
    }

    /// The explorer API key with `${VAR}` references substituted.
    pub fn etherscan_api_key<F>(&self, lookup: F) -> Result<String, UnipriceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        interpolate(&self.etherscan.api_key, "etherscan.api_key", &lookup)
    }

    /// Configured verify target for `contract`, if any.
    pub fn verify_target(&self, contract: &str) -> Option<&VerifyTargetConfig> {
        self.verify.iter().find(|t| t.contract == contract)
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A loaded config together with the directory it lives in.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: ProjectConfig,
    pub paths: PathsConfig,
    /// Whether `config_path` existed; defaults are used otherwise.
    pub config_found: bool,
    /// The `.env` file that was loaded, if any.
    pub env_file: Option<PathBuf>,
}

impl Project {
    /// Open the project at `config_path` (or `./uniprice.toml`), loading the
    /// sibling `.env` first so that interpolation can see it.
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let root = match config_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let env_file = load_dotenv(&root)?;
        let config_found = config_path.exists();
        let config = ProjectConfig::load_from_path(&config_path)?;
        let paths = config.paths.resolve(&root);

        Ok(Self {
            root,
            config_path,
            config,
            paths,
            config_found,
            env_file,
        })
    }
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

/// Load `<dir>/.env` into the process environment. Returns the path when a
/// file was found; a missing file is not an error.
pub fn load_dotenv(dir: &Path) -> Result<Option<PathBuf>> {
    let path = dir.join(".env");
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(Some(path)),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to load {}", path.display())),
    }
}

/// Lookup function backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Substitute every `${VAR}` in `value`. An unset or empty variable is a
/// [`UnipriceError::MissingEnv`] naming `field`.
pub fn interpolate<F>(value: &str, field: &str, lookup: F) -> Result<String, UnipriceError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in ENV_REF.captures_iter(value) {
        let (Some(whole), Some(var)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let var = var.as_str();
        let replacement = lookup(var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| UnipriceError::MissingEnv {
                var: var.to_string(),
                field: field.to_string(),
            })?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(replacement.trim());
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

/// Validate that a URL is well-formed and uses HTTP or HTTPS.
pub fn validate_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host().is_some()
        }
        Err(_) => false,
    }
}
