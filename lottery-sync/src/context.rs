// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Explicit runtime state shared by the registry, the artifact loader, the
//! orchestrator and the deployment bootstrapper.

use crate::{
    artifacts::discover_artifacts,
    contract::{ContractName, Deployments},
    error::{ConfigError, ParseConfigSnafu, ReadConfigSnafu},
};
use serde::Deserialize;
use snafu::ResultExt;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Contents of `sync.toml`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Directory containing the frontend, server and subgraph checkouts,
    /// relative to the config file.
    pub workspace_root: PathBuf,
    /// Where the canonical `<Name>.ts` ABI modules go, relative to the
    /// workspace root.
    pub abi_export_dir: PathBuf,
    /// Optional canonical manifest, relative to the workspace root.
    #[serde(default)]
    pub manifest: Option<PathBuf>,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub dependents: BTreeMap<ContractName, DependentsConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactsConfig {
    /// A Hardhat `artifacts/` tree searched for `<Name>.json`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Explicit artifact files, these take precedence over discovered ones.
    #[serde(default)]
    pub paths: BTreeMap<ContractName, PathBuf>,
}

/// Downstream files of one contract as written in the config file. Paths are
/// relative to the workspace root and patterns are not compiled yet.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependentsConfig {
    #[serde(default)]
    pub abi: Vec<PathBuf>,
    #[serde(default)]
    pub address: Vec<(PathBuf, String)>,
    #[serde(default, alias = "startBlock")]
    pub start_block: Vec<(PathBuf, String)>,
}

#[derive(Clone, Debug)]
pub struct RuntimeContext {
    pub workspace_root: PathBuf,
    pub abi_export_dir: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub artifacts: BTreeMap<ContractName, PathBuf>,
    pub dependents: BTreeMap<ContractName, DependentsConfig>,
    pub deployments: Deployments,
}

impl RuntimeContext {
    /// Read `sync.toml` and resolve all relative paths in it.
    pub fn load(config_path: &Path, deployments: Deployments) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(config_path).context(ReadConfigSnafu {
            path: config_path,
        })?;
        let config: SyncConfig = toml::from_str(&text).context(ParseConfigSnafu {
            path: config_path,
        })?;
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_config(config, base, deployments)
    }

    pub fn from_config(
        config: SyncConfig,
        base: &Path,
        deployments: Deployments,
    ) -> Result<Self, ConfigError> {
        let workspace_root = base.join(&config.workspace_root);

        let mut artifacts = match &config.artifacts.dir {
            Some(dir) => discover_artifacts(&base.join(dir))?,
            None => BTreeMap::new(),
        };
        for (name, path) in config.artifacts.paths {
            artifacts.insert(name, base.join(path));
        }

        Ok(Self {
            abi_export_dir: workspace_root.join(&config.abi_export_dir),
            manifest_path: config.manifest.map(|path| workspace_root.join(path)),
            workspace_root,
            artifacts,
            dependents: config.dependents,
            deployments,
        })
    }

    /// The same context with updated deployment records.
    pub fn with_deployments(&self, deployments: Deployments) -> Self {
        Self {
            deployments,
            ..self.clone()
        }
    }

    /// Path of the generated ABI module of `name`.
    pub fn abi_export_path(&self, name: ContractName) -> PathBuf {
        self.abi_export_dir.join(format!("{name}.ts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config: SyncConfig = toml::from_str(
            r#"
            workspace_root = "../.."
            abi_export_dir = "contracts/lottery/abis"
            manifest = "contracts/lottery/deployments.json"

            [artifacts.paths]
            SSLottery = "artifacts/contracts/SSLottery/Test.sol/TestSSLottery.json"

            [dependents.SSLottery]
            abi = ["server/src/constants/contracts/Lottery/abi.ts"]
            address = [["server/env/test.env", "LOTTERY_ADDRESS={address}"]]
            startBlock = [["subgraph/subgraphs/lottery/subgraph.yaml", '\s+startBlock: {block}']]
            "#,
        )
        .unwrap();
        let ctx =
            RuntimeContext::from_config(config, Path::new("lottery"), Deployments::default())
                .unwrap();

        assert_eq!(ctx.workspace_root, Path::new("lottery/../.."));
        assert_eq!(
            ctx.abi_export_path(ContractName::SsLottery),
            Path::new("lottery/../../contracts/lottery/abis/SSLottery.ts")
        );
        assert_eq!(
            ctx.artifacts[&ContractName::SsLottery],
            Path::new("lottery/artifacts/contracts/SSLottery/Test.sol/TestSSLottery.json")
        );
        let dependents = &ctx.dependents[&ContractName::SsLottery];
        assert_eq!(dependents.abi.len(), 1);
        assert_eq!(dependents.address.len(), 1);
        assert_eq!(dependents.start_block.len(), 1);
    }

    #[test]
    fn test_unknown_contract_rejected() {
        let res = toml::from_str::<SyncConfig>(
            r#"
            workspace_root = "."
            abi_export_dir = "abis"

            [dependents.Lottery]
            abi = ["abi.json"]
            "#,
        );
        assert!(res.is_err());
    }
}
