// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{
    context::RuntimeContext,
    contract::ContractName,
    error::{
        ArtifactError, ArtifactGlobSnafu, ConfigError, InvalidAbiSnafu, InvalidBytecodeSnafu,
        MissingAbiSnafu, NotFoundSnafu, ParseArtifactSnafu, ReadArtifactSnafu,
    },
};
use async_std::sync::Mutex;
use ethers::{
    abi::Abi,
    types::Bytes,
    utils::hex,
};
use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Compiler output of one contract.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ContractArtifact {
    /// The ABI exactly as the compiler wrote it, key order included.
    pub abi: Value,
    #[serde(default)]
    pub bytecode: String,
}

impl ContractArtifact {
    /// The ABI in the form the chain client needs.
    pub fn typed_abi(&self, contract: ContractName) -> Result<Abi, ArtifactError> {
        serde_json::from_value(self.abi.clone()).context(InvalidAbiSnafu { contract })
    }

    /// Creation bytecode. Interfaces have none, in which case this is empty.
    pub fn bytecode(&self, contract: ContractName) -> Result<Bytes, ArtifactError> {
        let digits = self.bytecode.strip_prefix("0x").unwrap_or(&self.bytecode);
        let bytes = hex::decode(digits).context(InvalidBytecodeSnafu { contract })?;
        Ok(bytes.into())
    }
}

/// Loads and caches build artifacts by contract name.
#[derive(Debug)]
pub struct ArtifactLoader {
    paths: BTreeMap<ContractName, PathBuf>,
    cache: Mutex<HashMap<ContractName, Arc<ContractArtifact>>>,
}

impl ArtifactLoader {
    pub fn new(ctx: &RuntimeContext) -> Self {
        Self::from_paths(ctx.artifacts.clone())
    }

    pub fn from_paths(paths: BTreeMap<ContractName, PathBuf>) -> Self {
        Self {
            paths,
            cache: Default::default(),
        }
    }

    /// Contracts with a configured artifact.
    pub fn contracts(&self) -> impl Iterator<Item = ContractName> + '_ {
        self.paths.keys().copied()
    }

    pub fn path(&self, contract: ContractName) -> Option<&Path> {
        self.paths.get(&contract).map(PathBuf::as_path)
    }

    pub async fn load(&self, contract: ContractName) -> Result<Arc<ContractArtifact>, ArtifactError> {
        if let Some(artifact) = self.cache.lock().await.get(&contract) {
            return Ok(artifact.clone());
        }

        let path = self.paths.get(&contract).context(NotFoundSnafu { contract })?;
        let text = match async_std::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return NotFoundSnafu { contract }.fail()
            }
            Err(err) => return Err(err).context(ReadArtifactSnafu { path }),
        };
        let artifact: ContractArtifact =
            serde_json::from_str(&text).context(ParseArtifactSnafu { path })?;
        if !artifact.abi.is_array() {
            return MissingAbiSnafu { path }.fail();
        }
        tracing::debug!("Loaded {contract} artifact from {}", path.display());

        let artifact = Arc::new(artifact);
        self.cache
            .lock()
            .await
            .insert(contract, artifact.clone());
        Ok(artifact)
    }
}

/// Find `<Name>.json` artifacts of known contracts in a Hardhat artifacts tree.
///
/// Hardhat's `.dbg.json` debug files sit next to the artifacts and are skipped.
pub fn discover_artifacts(dir: &Path) -> Result<BTreeMap<ContractName, PathBuf>, ConfigError> {
    let pattern = format!("{}/**/*.json", dir.display());
    let mut found = BTreeMap::new();
    for path in glob::glob(&pattern)
        .context(ArtifactGlobSnafu { pattern: &pattern })?
        .filter_map(Result::ok)
    {
        if path.to_string_lossy().ends_with(".dbg.json") {
            continue;
        }
        let Some(name) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<ContractName>().ok())
        else {
            continue;
        };
        found.entry(name).or_insert(path);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_artifact(dir: &Path, rel: &str, abi: Value) -> PathBuf {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let artifact = json!({
            "_format": "hh-sol-artifact-1",
            "contractName": "RoleControl",
            "abi": abi,
            "bytecode": "0x6080",
        });
        std::fs::write(&path, artifact.to_string()).unwrap();
        path
    }

    #[async_std::test]
    async fn test_load_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let abi = json!([{ "type": "function", "name": "addMember", "inputs": [], "outputs": [], "stateMutability": "nonpayable" }]);
        let path = write_artifact(dir.path(), "RoleControl.json", abi.clone());
        let loader =
            ArtifactLoader::from_paths([(ContractName::RoleControl, path.clone())].into());

        let artifact = loader.load(ContractName::RoleControl).await.unwrap();
        assert_eq!(artifact.abi, abi);
        assert_eq!(
            artifact.bytecode(ContractName::RoleControl).unwrap().to_vec(),
            vec![0x60, 0x80]
        );
        assert_eq!(
            artifact
                .typed_abi(ContractName::RoleControl)
                .unwrap()
                .function("addMember")
                .unwrap()
                .name,
            "addMember"
        );

        // Served from the cache even after the file is gone.
        std::fs::remove_file(&path).unwrap();
        let again = loader.load(ContractName::RoleControl).await.unwrap();
        assert!(Arc::ptr_eq(&artifact, &again));
    }

    #[async_std::test]
    async fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ArtifactLoader::from_paths(
            [(ContractName::Treasury, dir.path().join("Treasury.json"))].into(),
        );
        assert!(matches!(
            loader.load(ContractName::Treasury).await,
            Err(ArtifactError::NotFound { .. })
        ));
        assert!(matches!(
            loader.load(ContractName::SsLottery).await,
            Err(ArtifactError::NotFound { .. })
        ));
    }

    #[test]
    fn test_discover_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        write_artifact(
            dir.path(),
            "contracts/RoleControl/index.sol/RoleControl.json",
            json!([]),
        );
        write_artifact(
            dir.path(),
            "contracts/RoleControl/index.sol/RoleControl.dbg.json",
            json!([]),
        );
        write_artifact(dir.path(), "contracts/Other.sol/Other.json", json!([]));

        let found = discover_artifacts(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[&ContractName::RoleControl].ends_with("RoleControl.json"));
    }
}
