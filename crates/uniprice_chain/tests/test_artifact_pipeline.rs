use std::fs;
use std::path::Path;

use alloy::primitives::{Address, TxHash};
use uniprice_chain::*;

const SOURCE: &str = "contracts/Token20.sol";

fn write_project(artifacts: &Path, with_dbg: bool) {
    let dir = artifacts.join(SOURCE);
    fs::create_dir_all(&dir).unwrap();
    fs::create_dir_all(artifacts.join("build-info")).unwrap();

    let artifact = serde_json::json!({
        "_format": "hh-sol-artifact-1",
        "contractName": "Token20",
        "sourceName": SOURCE,
        "abi": [{
            "type": "constructor",
            "stateMutability": "nonpayable",
            "inputs": [
                { "name": "decimals_", "type": "uint8", "internalType": "uint8" },
                { "name": "name_", "type": "string", "internalType": "string" },
                { "name": "symbol_", "type": "string", "internalType": "string" }
            ]
        }],
        "bytecode": "0x608060405234801561001057600080fd5b50",
        "deployedBytecode": "0x6080604052",
        "linkReferences": {},
        "deployedLinkReferences": {}
    });
    fs::write(dir.join("Token20.json"), artifact.to_string()).unwrap();

    if with_dbg {
        let dbg = serde_json::json!({
            "_format": "hh-sol-dbg-1",
            "buildInfo": "../../build-info/5f3c.json"
        });
        fs::write(dir.join("Token20.dbg.json"), dbg.to_string()).unwrap();
    }

    let build_info = serde_json::json!({
        "id": "5f3c",
        "_format": "hh-sol-build-info-1",
        "solcVersion": "0.8.9",
        "solcLongVersion": "0.8.9+commit.e5eed63a",
        "input": {
            "language": "Solidity",
            "sources": { "contracts/Token20.sol": { "content": "pragma solidity 0.8.9;" } },
            "settings": { "optimizer": { "enabled": false, "runs": 200 } }
        },
        "output": {}
    });
    fs::write(
        artifacts.join("build-info").join("5f3c.json"),
        build_info.to_string(),
    )
    .unwrap();
}

#[test]
fn test_artifact_to_deploy_code() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), true);

    let store = ArtifactStore::new(tmp.path());
    let artifact = store.find("Token20").unwrap();
    let factory = ContractFactory::from_artifact(&artifact).unwrap();
    assert_eq!(factory.constructor_signature(), "constructor(uint8,string,string)");

    let raw = vec!["18".to_string(), "DAI".into(), "DAI".into()];
    let args = factory.parse_args(&raw).unwrap();
    let code = factory.deploy_code(&args).unwrap();
    assert!(code.starts_with(artifact.bytecode.as_ref()));
    assert_eq!(code.len(), artifact.bytecode.len() + 7 * 32);
}

#[test]
fn test_build_info_via_debug_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), true);

    let store = ArtifactStore::new(tmp.path());
    let artifact = store.find("Token20").unwrap();
    let info = store.build_info(&artifact).unwrap();
    assert_eq!(info.compiler_version(), "v0.8.9+commit.e5eed63a");
    assert!(info.has_source(SOURCE));
}

#[test]
fn test_build_info_scan_without_debug_file() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), false);

    let store = ArtifactStore::new(tmp.path());
    let artifact = store.find("contracts/Token20.sol:Token20").unwrap();
    let info = store.build_info(&artifact).unwrap();
    assert_eq!(info.solc_version, "0.8.9");
}

#[test]
fn test_verify_request_from_artifact() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(tmp.path(), true);

    let store = ArtifactStore::new(tmp.path());
    let artifact = store.find("Token20").unwrap();
    let info = store.build_info(&artifact).unwrap();
    let factory = ContractFactory::from_artifact(&artifact).unwrap();
    let args = factory
        .parse_args(&["18".into(), "DAI".into(), "DAI".into()])
        .unwrap();

    let request = VerifyRequest {
        address: Address::repeat_byte(0x53),
        contract_name: artifact.qualified_name(),
        compiler_version: info.compiler_version(),
        source: info.input.clone(),
        constructor_args: factory.encode_args(&args).unwrap(),
    };
    let params = request.form_params().unwrap();
    let contract_name = params.iter().find(|(k, _)| *k == "contractname").unwrap();
    assert_eq!(contract_name.1, "contracts/Token20.sol:Token20");
    let ctor = params
        .iter()
        .find(|(k, _)| *k == "constructorArguements")
        .unwrap();
    assert_eq!(ctor.1.len(), 7 * 32 * 2);
    assert!(!ctor.1.starts_with("0x"));
}

#[test]
fn test_receipt_to_saved_record() {
    let tmp = tempfile::tempdir().unwrap();
    write_project(&tmp.path().join("artifacts"), true);

    let store = ArtifactStore::new(tmp.path().join("artifacts"));
    let artifact = store.find("Token20").unwrap();

    let receipt = ReceiptSummary {
        transaction_hash: TxHash::repeat_byte(0x0d),
        success: true,
        contract_address: Some(Address::repeat_byte(0xc0)),
        block_number: Some(1),
        gas_used: 650_000,
        effective_gas_price: 1_875_000_000,
    };
    let deployment = Deployment::from_receipt(
        "Token20".into(),
        Address::repeat_byte(0xad),
        vec!["18".into(), "DAI".into(), "DAI".into()],
        &receipt,
    )
    .unwrap();

    let deployments = DeploymentStore::new(&tmp.path().join("deployments"), "development");
    let record = DeploymentRecord::new(&deployment, artifact.abi.clone());
    deployments.save("Token20", &record, 31_337).unwrap();

    let loaded = deployments.load("Token20").unwrap().unwrap();
    assert_eq!(loaded.address, Address::repeat_byte(0xc0));
    assert_eq!(loaded.args, vec!["18", "DAI", "DAI"]);
    assert!(loaded.abi.constructor().is_some());
    assert_eq!(deployments.chain_id().unwrap(), Some(31_337));
}
