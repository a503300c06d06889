use alloy::dyn_abi::{DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::JsonAbi;
use alloy::network::TransactionBuilder;
use alloy::primitives::Bytes;
use alloy::rpc::types::TransactionRequest;
use uniprice_core::UnipriceError;

use crate::artifacts::Artifact;

/// Creation bytecode plus ABI; turns constructor arguments into a deployment
/// transaction.
#[derive(Debug, Clone)]
pub struct ContractFactory {
    name: String,
    abi: JsonAbi,
    bytecode: Bytes,
}

impl ContractFactory {
    pub fn new(name: impl Into<String>, abi: JsonAbi, bytecode: Bytes) -> Self {
        Self {
            name: name.into(),
            abi,
            bytecode,
        }
    }

    /// Build a factory from an artifact. Abstract contracts (no bytecode) and
    /// artifacts with unlinked libraries cannot be deployed.
    pub fn from_artifact(artifact: &Artifact) -> Result<Self, UnipriceError> {
        if artifact.bytecode.is_empty() {
            return Err(UnipriceError::Artifact(format!(
                "{} has no creation bytecode (abstract contract or interface?)",
                artifact.contract_name
            )));
        }
        let libraries = artifact.unlinked_libraries();
        if !libraries.is_empty() {
            return Err(UnipriceError::Artifact(format!(
                "{} needs linked libraries, deploy and link these first: {}",
                artifact.contract_name,
                libraries.join(", ")
            )));
        }
        Ok(Self::new(
            artifact.contract_name.clone(),
            artifact.abi.clone(),
            artifact.bytecode.clone(),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Human-readable constructor signature, e.g. `constructor(uint8,string,string)`.
    pub fn constructor_signature(&self) -> String {
        let types = self
            .abi
            .constructor()
            .map(|c| {
                c.inputs
                    .iter()
                    .map(|p| p.ty.clone())
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default();
        format!("constructor({types})")
    }

    /// Whether the constructor declares any parameters.
    pub fn takes_args(&self) -> bool {
        self.abi.constructor().is_some_and(|c| !c.inputs.is_empty())
    }

    /// Coerce command-line strings into values of the constructor's types.
    pub fn parse_args(&self, raw: &[String]) -> Result<Vec<DynSolValue>, UnipriceError> {
        let Some(constructor) = self.abi.constructor() else {
            if raw.is_empty() {
                return Ok(Vec::new());
            }
            return Err(UnipriceError::Deployment(format!(
                "{} has no constructor but {} arguments were given",
                self.name,
                raw.len()
            )));
        };

        if constructor.inputs.len() != raw.len() {
            return Err(UnipriceError::Deployment(format!(
                "{} expects {} constructor arguments ({}), got {}",
                self.name,
                constructor.inputs.len(),
                self.constructor_signature(),
                raw.len()
            )));
        }

        constructor
            .inputs
            .iter()
            .zip(raw)
            .map(|(param, value)| {
                let ty = param.resolve().map_err(|e| {
                    UnipriceError::Artifact(format!("cannot resolve type of {}: {e}", param.name))
                })?;
                ty.coerce_str(value).map_err(|e| {
                    UnipriceError::Deployment(format!(
                        "argument {} ({}) = {value:?}: {e}",
                        param.name, param.ty
                    ))
                })
            })
            .collect()
    }

    /// ABI-encoded constructor arguments (empty without a constructor).
    pub fn encode_args(&self, args: &[DynSolValue]) -> Result<Bytes, UnipriceError> {
        match (self.abi.constructor(), args.is_empty()) {
            (None, true) => Ok(Bytes::new()),
            (None, false) => Err(UnipriceError::Deployment(format!(
                "{} has no constructor but {} arguments were given",
                self.name,
                args.len()
            ))),
            (Some(constructor), _) => constructor
                .abi_encode_input(args)
                .map(Bytes::from)
                .map_err(|e| {
                    UnipriceError::Deployment(format!(
                        "{} arguments do not match {}: {e}",
                        self.name,
                        self.constructor_signature()
                    ))
                }),
        }
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn deploy_code(&self, args: &[DynSolValue]) -> Result<Bytes, UnipriceError> {
        let encoded = self.encode_args(args)?;
        Ok(self.bytecode.iter().copied().chain(encoded).collect())
    }

    /// The contract-creation transaction (no `to`).
    pub fn deploy_tx(&self, args: &[DynSolValue]) -> Result<TransactionRequest, UnipriceError> {
        Ok(TransactionRequest::default().with_deploy_code(self.deploy_code(args)?))
    }
}
