use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde::Deserialize;
use tracing::{debug, warn};
use uniprice_core::UnipriceError;

const BUILD_INFO_DIR: &str = "build-info";

/// Unresolved library placeholders: source file -> library name -> offsets.
pub type LinkReferences = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A Hardhat compiler artifact (`hh-sol-artifact-1`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    #[serde(default)]
    pub deployed_bytecode: Bytes,
    #[serde(default)]
    pub link_references: LinkReferences,
    /// Location the artifact was read from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Artifact {
    /// Fully qualified name, as explorers expect it: `<source>:<contract>`.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Library names that must be linked before deployment.
    pub fn unlinked_libraries(&self) -> Vec<String> {
        self.link_references
            .iter()
            .flat_map(|(path, libs)| libs.keys().map(move |lib| format!("{path}:{lib}")))
            .collect()
    }
}

/// Hardhat build info (`hh-sol-build-info-1`): compiler version and the
/// standard JSON input of one compilation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_version: String,
    pub solc_long_version: String,
    pub input: serde_json::Value,
}

impl BuildInfo {
    /// Explorer compiler version string, e.g. `v0.8.9+commit.e5eed63a`.
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }

    /// Whether the compilation input contains `source_name`.
    pub fn has_source(&self, source_name: &str) -> bool {
        self.input
            .get("sources")
            .and_then(|s| s.get(source_name))
            .is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

/// Read-only view of the artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find the artifact of `name`, either a bare contract name or a fully
    /// qualified `path/File.sol:Name`.
    pub fn find(&self, name: &str) -> Result<Artifact> {
        if let Some((source, contract)) = name.rsplit_once(':') {
            let path = self.root.join(source).join(format!("{contract}.json"));
            if !path.exists() {
                return Err(UnipriceError::Artifact(format!(
                    "no artifact for {name} at {}",
                    path.display()
                ))
                .into());
            }
            return Self::load(&path);
        }

        let mut matches = Vec::new();
        for path in self.candidates(name)? {
            let artifact = Self::load(&path)?;
            if artifact.contract_name == name {
                matches.push(artifact);
            }
        }

        match matches.len() {
            0 => Err(UnipriceError::Artifact(format!(
                "no artifact named {name} under {}",
                self.root.display()
            ))
            .into()),
            1 => Ok(matches.remove(0)),
            _ => {
                let names: Vec<String> = matches.iter().map(Artifact::qualified_name).collect();
                Err(UnipriceError::Artifact(format!(
                    "{name} is ambiguous, use one of: {}",
                    names.join(", ")
                ))
                .into())
            }
        }
    }

    /// Read a single artifact file.
    pub fn load(path: &Path) -> Result<Artifact> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        let mut artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse artifact {}", path.display()))?;
        artifact.path = path.to_path_buf();
        Ok(artifact)
    }

    /// Load the build info that produced `artifact`. Follows the sibling
    /// `<Name>.dbg.json` and falls back to scanning `build-info/`.
    pub fn build_info(&self, artifact: &Artifact) -> Result<BuildInfo> {
        let dbg_path = artifact
            .path
            .with_file_name(format!("{}.dbg.json", artifact.contract_name));

        if dbg_path.exists() {
            let content = std::fs::read_to_string(&dbg_path)
                .with_context(|| format!("failed to read {}", dbg_path.display()))?;
            let dbg: DebugFile = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {}", dbg_path.display()))?;
            let base = dbg_path.parent().unwrap_or(self.root.as_path());
            let path = base.join(&dbg.build_info);
            if path.exists() {
                return Self::load_build_info(&path);
            }
            warn!(path = %path.display(), "build info referenced by debug file is missing");
        }

        let dir = self.root.join(BUILD_INFO_DIR);
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("no build info directory at {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let info = Self::load_build_info(&path)?;
                if info.has_source(&artifact.source_name) {
                    return Ok(info);
                }
            }
        }

        Err(UnipriceError::Artifact(format!(
            "no build info contains {}",
            artifact.source_name
        ))
        .into())
    }

    fn load_build_info(path: &Path) -> Result<BuildInfo> {
        debug!(path = %path.display(), "loading build info");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read build info {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse build info {}", path.display()))
    }

    /// Every `<name>.json` outside `build-info/`. Ignore files are not
    /// honored: build output is usually git-ignored.
    fn candidates(&self, name: &str) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(UnipriceError::Artifact(format!(
                "artifacts directory {} does not exist; compile the contracts first",
                self.root.display()
            ))
            .into());
        }

        let file_name = format!("{name}.json");
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .filter_entry(|entry| entry.file_name() != BUILD_INFO_DIR)
            .build();

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if path.is_file() && entry.file_name() == file_name.as_str() {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();
        Ok(paths)
    }
}
