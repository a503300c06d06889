use std::time::Duration;

use alloy::primitives::{Address, Bytes, hex};
use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uniprice_core::UnipriceError;

use crate::network::Session;

/// Etherscan's multichain API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/v2/api";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything an explorer needs to verify one deployed contract.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub address: Address,
    /// `<source>:<contract>`
    pub contract_name: String,
    /// `v<solcLongVersion>`
    pub compiler_version: String,
    /// Solidity standard JSON input.
    pub source: Value,
    pub constructor_args: Bytes,
}

impl VerifyRequest {
    /// Form fields of a `verifysourcecode` submission (without the API key).
    pub fn form_params(&self) -> Result<Vec<(&'static str, String)>> {
        let source =
            serde_json::to_string(&self.source).context("failed to serialize standard JSON input")?;
        Ok(vec![
            ("module", "contract".into()),
            ("action", "verifysourcecode".into()),
            ("contractaddress", self.address.to_string()),
            ("sourceCode", source),
            ("codeformat", "solidity-standard-json-input".into()),
            ("contractname", self.contract_name.clone()),
            ("compilerversion", self.compiler_version.clone()),
            // Etherscan's own spelling.
            ("constructorArguements", hex::encode(&self.constructor_args)),
        ])
    }
}

/// Result of submitting a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued; poll with this GUID.
    Queued(String),
    AlreadyVerified,
    /// The explorer has not indexed the contract's code yet.
    NotIndexed,
}

/// Status of a queued verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Pass,
    AlreadyVerified,
    Fail(String),
}

/// Final outcome of [`verify_contract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

/// How often and how long to poll the explorer.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            attempts: 40,
        }
    }
}

// ---------------------------------------------------------------------------
// Explorer trait
// ---------------------------------------------------------------------------

/// A block explorer that verifies contract sources.
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Whether the explorer already has verified source for `address`.
    async fn is_verified(&self, address: Address) -> Result<bool>;

    /// Submit a verification request.
    async fn submit(&self, request: &VerifyRequest) -> Result<SubmitOutcome>;

    /// Status of a previously queued request.
    async fn check_status(&self, guid: &str) -> Result<VerificationStatus>;
}

/// Submit `request` and wait for the explorer's verdict.
pub async fn verify_contract(
    explorer: &dyn Explorer,
    request: &VerifyRequest,
    poll: PollPolicy,
) -> Result<VerifyOutcome> {
    if explorer.is_verified(request.address).await? {
        info!(address = %request.address, "source already verified");
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    let mut guid = None;
    for attempt in 1..=poll.attempts {
        match explorer.submit(request).await? {
            SubmitOutcome::Queued(id) => {
                guid = Some(id);
                break;
            }
            SubmitOutcome::AlreadyVerified => return Ok(VerifyOutcome::AlreadyVerified),
            SubmitOutcome::NotIndexed => {
                debug!(attempt, "explorer has not indexed the bytecode yet");
                tokio::time::sleep(poll.interval).await;
            }
        }
    }
    let guid = guid.ok_or_else(|| {
        UnipriceError::Verification(format!(
            "explorer never indexed the bytecode at {}",
            request.address
        ))
    })?;
    info!(%guid, contract = %request.contract_name, "verification queued");

    for attempt in 1..=poll.attempts {
        tokio::time::sleep(poll.interval).await;
        match explorer.check_status(&guid).await? {
            VerificationStatus::Pending => debug!(attempt, "verification pending"),
            VerificationStatus::Pass => return Ok(VerifyOutcome::Verified),
            VerificationStatus::AlreadyVerified => return Ok(VerifyOutcome::AlreadyVerified),
            VerificationStatus::Fail(reason) => {
                return Err(UnipriceError::Verification(reason).into());
            }
        }
    }

    Err(UnipriceError::Verification(format!(
        "no verdict for {} after {} checks",
        request.contract_name, poll.attempts
    ))
    .into())
}

/// Fail unless `address` holds contract code on the session's network.
pub async fn ensure_deployed(session: &Session, address: Address) -> Result<()> {
    let code = session
        .provider
        .get_code_at(address)
        .await
        .with_context(|| format!("failed to read code at {address}"))?;
    if code.is_empty() {
        return Err(UnipriceError::Verification(format!(
            "{address} has no bytecode on {}; is the contract deployed to this network?",
            session.network.name
        ))
        .into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Etherscan
// ---------------------------------------------------------------------------

/// Envelope of every Etherscan API response.
#[derive(Debug, Clone, Deserialize)]
pub struct EtherscanResponse {
    pub status: String,
    pub message: String,
    pub result: Value,
}

impl EtherscanResponse {
    fn ok(&self) -> bool {
        self.status == "1"
    }

    fn result_text(&self) -> String {
        match &self.result {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn error(&self) -> anyhow::Error {
        UnipriceError::Verification(format!(
            "explorer responded {}: {}",
            self.message,
            self.result_text()
        ))
        .into()
    }
}

/// Interpret a `getsourcecode` response.
pub fn parse_is_verified(response: &EtherscanResponse) -> Result<bool> {
    if !response.ok() {
        return Err(response.error());
    }
    let verified = response
        .result
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("SourceCode"))
        .and_then(Value::as_str)
        .is_some_and(|source| !source.is_empty());
    Ok(verified)
}

/// Interpret a `verifysourcecode` response.
pub fn parse_submit(response: &EtherscanResponse) -> Result<SubmitOutcome> {
    let text = response.result_text();
    if response.ok() {
        return Ok(SubmitOutcome::Queued(text));
    }
    let lower = text.to_lowercase();
    if lower.contains("already verified") {
        Ok(SubmitOutcome::AlreadyVerified)
    } else if lower.contains("unable to locate contractcode") {
        Ok(SubmitOutcome::NotIndexed)
    } else {
        Err(response.error())
    }
}

/// Interpret a `checkverifystatus` response.
pub fn parse_status(response: &EtherscanResponse) -> Result<VerificationStatus> {
    let text = response.result_text();
    let lower = text.to_lowercase();
    if lower.starts_with("pending") {
        Ok(VerificationStatus::Pending)
    } else if lower.starts_with("pass") {
        Ok(VerificationStatus::Pass)
    } else if lower.contains("already verified") {
        Ok(VerificationStatus::AlreadyVerified)
    } else if lower.starts_with("fail") {
        Ok(VerificationStatus::Fail(text))
    } else {
        Err(response.error())
    }
}

/// Client for the Etherscan contract verification API.
pub struct EtherscanClient {
    api_key: String,
    base_url: String,
    chain_id: u64,
    client: Client,
}

impl EtherscanClient {
    /// Create a client for `chain_id` on the default endpoint.
    pub fn new(api_key: impl Into<String>, chain_id: u64) -> Result<Self> {
        Self::with_base_url(api_key, chain_id, DEFAULT_API_URL)
    }

    /// Create a client with a custom endpoint (Etherscan-compatible explorers).
    pub fn with_base_url(
        api_key: impl Into<String>,
        chain_id: u64,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            api_key: api_key.into(),
            base_url,
            chain_id,
            client,
        })
    }

    fn common_query(&self) -> [(&'static str, String); 2] {
        [
            ("chainid", self.chain_id.to_string()),
            ("apikey", self.api_key.clone()),
        ]
    }

    async fn get(&self, params: &[(&str, String)]) -> Result<EtherscanResponse> {
        debug!(url = %self.base_url, "explorer GET");
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.common_query())
            .query(params)
            .send()
            .await
            .context("explorer GET request failed")?;
        Self::decode(response).await
    }

    async fn post_form(&self, params: &[(&str, String)]) -> Result<EtherscanResponse> {
        debug!(url = %self.base_url, "explorer POST");
        let response = self
            .client
            .post(&self.base_url)
            .query(&self.common_query())
            .form(params)
            .send()
            .await
            .context("explorer POST request failed")?;
        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<EtherscanResponse> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("explorer HTTP error ({status}): {body}");
        }
        response
            .json()
            .await
            .context("failed to parse explorer response as JSON")
    }
}

#[async_trait]
impl Explorer for EtherscanClient {
    async fn is_verified(&self, address: Address) -> Result<bool> {
        let response = self
            .get(&[
                ("module", "contract".into()),
                ("action", "getsourcecode".into()),
                ("address", address.to_string()),
            ])
            .await?;
        parse_is_verified(&response)
    }

    async fn submit(&self, request: &VerifyRequest) -> Result<SubmitOutcome> {
        let response = self.post_form(&request.form_params()?).await?;
        let outcome = parse_submit(&response)?;
        if outcome == SubmitOutcome::NotIndexed {
            warn!(address = %request.address, "explorer has not indexed the contract yet, retrying");
        }
        Ok(outcome)
    }

    async fn check_status(&self, guid: &str) -> Result<VerificationStatus> {
        let response = self
            .get(&[
                ("module", "contract".into()),
                ("action", "checkverifystatus".into()),
                ("guid", guid.to_string()),
            ])
            .await?;
        parse_status(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn response(status: &str, message: &str, result: Value) -> EtherscanResponse {
        EtherscanResponse {
            status: status.into(),
            message: message.into(),
            result,
        }
    }

    fn request() -> VerifyRequest {
        VerifyRequest {
            address: "0x533e331098ce304c8620270dC460EF57051C6147".parse().unwrap(),
            contract_name: "contracts/FetchPriceUniswapV2.sol:FetchPriceUniswapV2".into(),
            compiler_version: "v0.8.9+commit.e5eed63a".into(),
            source: serde_json::json!({ "language": "Solidity", "sources": {} }),
            constructor_args: Bytes::new(),
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            attempts: 3,
        }
    }

    // -----------------------------------------------------------------------
    // Response parsing
    // -----------------------------------------------------------------------

    #[test]
    fn is_verified_checks_source_code() {
        let verified = response(
            "1",
            "OK",
            serde_json::json!([{ "SourceCode": "pragma solidity 0.8.9;" }]),
        );
        assert!(parse_is_verified(&verified).unwrap());

        let unverified = response("1", "OK", serde_json::json!([{ "SourceCode": "" }]));
        assert!(!parse_is_verified(&unverified).unwrap());

        let bad_key = response("0", "NOTOK", Value::String("Invalid API Key".into()));
        let msg = parse_is_verified(&bad_key).unwrap_err().to_string();
        assert!(msg.contains("Invalid API Key"));
    }

    #[test]
    fn submit_outcomes() {
        let queued = response("1", "OK", Value::String("abc123guid".into()));
        assert_eq!(
            parse_submit(&queued).unwrap(),
            SubmitOutcome::Queued("abc123guid".into())
        );

        let already = response(
            "0",
            "NOTOK",
            Value::String("Contract source code already verified".into()),
        );
        assert_eq!(parse_submit(&already).unwrap(), SubmitOutcome::AlreadyVerified);

        let not_indexed = response(
            "0",
            "NOTOK",
            Value::String("Unable to locate ContractCode at 0x533e".into()),
        );
        assert_eq!(parse_submit(&not_indexed).unwrap(), SubmitOutcome::NotIndexed);

        let invalid = response("0", "NOTOK", Value::String("Invalid constructor arguments".into()));
        assert!(parse_submit(&invalid).is_err());
    }

    #[test]
    fn status_outcomes() {
        let cases = [
            ("0", "Pending in queue", VerificationStatus::Pending),
            ("1", "Pass - Verified", VerificationStatus::Pass),
            ("1", "Already Verified", VerificationStatus::AlreadyVerified),
            (
                "0",
                "Fail - Unable to verify",
                VerificationStatus::Fail("Fail - Unable to verify".into()),
            ),
        ];
        for (status, text, expected) in cases {
            let parsed = parse_status(&response(status, "OK", Value::String(text.into()))).unwrap();
            assert_eq!(parsed, expected, "for {text}");
        }

        let unknown = response("0", "NOTOK", Value::String("Max rate limit reached".into()));
        assert!(parse_status(&unknown).is_err());
    }

    #[test]
    fn form_params_use_standard_json_input() {
        let mut req = request();
        req.constructor_args = Bytes::from_static(&[0x00, 0x12]);
        let params = req.form_params().unwrap();
        let get = |k: &str| params.iter().find(|(key, _)| *key == k).map(|(_, v)| v.clone());

        assert_eq!(get("action").as_deref(), Some("verifysourcecode"));
        assert_eq!(get("codeformat").as_deref(), Some("solidity-standard-json-input"));
        assert_eq!(get("compilerversion").as_deref(), Some("v0.8.9+commit.e5eed63a"));
        assert_eq!(get("constructorArguements").as_deref(), Some("0012"));
        assert!(get("sourceCode").unwrap().contains("\"language\":\"Solidity\""));
        assert!(get("apikey").is_none());
    }

    #[test]
    fn client_base_url_strips_slash() {
        let client = EtherscanClient::with_base_url("key", 5, "https://explorer.test/api/").unwrap();
        assert_eq!(client.base_url, "https://explorer.test/api");
        assert_eq!(client.common_query()[0], ("chainid", "5".to_string()));

        let client = EtherscanClient::new("key", 1).unwrap();
        assert_eq!(client.base_url, DEFAULT_API_URL);
    }

    // -----------------------------------------------------------------------
    // verify_contract workflow against a scripted explorer
    // -----------------------------------------------------------------------

    struct ScriptedExplorer {
        verified: bool,
        submits: Mutex<VecDeque<SubmitOutcome>>,
        statuses: Mutex<VecDeque<VerificationStatus>>,
        submit_calls: Mutex<u32>,
    }

    impl ScriptedExplorer {
        fn new(
            verified: bool,
            submits: Vec<SubmitOutcome>,
            statuses: Vec<VerificationStatus>,
        ) -> Self {
            Self {
                verified,
                submits: Mutex::new(submits.into()),
                statuses: Mutex::new(statuses.into()),
                submit_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Explorer for ScriptedExplorer {
        async fn is_verified(&self, _address: Address) -> Result<bool> {
            Ok(self.verified)
        }

        async fn submit(&self, _request: &VerifyRequest) -> Result<SubmitOutcome> {
            *self.submit_calls.lock().unwrap() += 1;
            Ok(self
                .submits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SubmitOutcome::NotIndexed))
        }

        async fn check_status(&self, _guid: &str) -> Result<VerificationStatus> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(VerificationStatus::Pending))
        }
    }

    #[tokio::test]
    async fn skips_already_verified_contract() {
        let explorer = ScriptedExplorer::new(true, vec![], vec![]);
        let outcome = verify_contract(&explorer, &request(), fast()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadyVerified);
        assert_eq!(*explorer.submit_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn polls_until_pass() {
        let explorer = ScriptedExplorer::new(
            false,
            vec![SubmitOutcome::Queued("guid".into())],
            vec![VerificationStatus::Pending, VerificationStatus::Pass],
        );
        let outcome = verify_contract(&explorer, &request(), fast()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
    }

    #[tokio::test]
    async fn resubmits_until_indexed() {
        let explorer = ScriptedExplorer::new(
            false,
            vec![SubmitOutcome::NotIndexed, SubmitOutcome::Queued("guid".into())],
            vec![VerificationStatus::Pass],
        );
        let outcome = verify_contract(&explorer, &request(), fast()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::Verified);
        assert_eq!(*explorer.submit_calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn gives_up_when_never_indexed() {
        let explorer = ScriptedExplorer::new(false, vec![], vec![]);
        let err = verify_contract(&explorer, &request(), fast()).await.unwrap_err();
        assert!(err.to_string().contains("never indexed"));
        assert_eq!(*explorer.submit_calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failure_reason_is_reported() {
        let explorer = ScriptedExplorer::new(
            false,
            vec![SubmitOutcome::Queued("guid".into())],
            vec![VerificationStatus::Fail("Fail - Unable to verify".into())],
        );
        let err = verify_contract(&explorer, &request(), fast()).await.unwrap_err();
        assert!(err.to_string().contains("Unable to verify"));
    }

    #[tokio::test]
    async fn pending_forever_times_out() {
        let explorer = ScriptedExplorer::new(
            false,
            vec![SubmitOutcome::Queued("guid".into())],
            vec![],
        );
        let err = verify_contract(&explorer, &request(), fast()).await.unwrap_err();
        assert!(err.to_string().contains("no verdict"));
    }

    #[tokio::test]
    async fn already_verified_on_submit() {
        let explorer = ScriptedExplorer::new(false, vec![SubmitOutcome::AlreadyVerified], vec![]);
        let outcome = verify_contract(&explorer, &request(), fast()).await.unwrap();
        assert_eq!(outcome, VerifyOutcome::AlreadyVerified);
    }
}
