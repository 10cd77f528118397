// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Which downstream files mirror which piece of contract metadata.

use crate::{
    context::{DependentsConfig, RuntimeContext},
    contract::{ContractName, DeploymentRecord},
    error::{CaptureGroupsSnafu, ConfigError, InvalidPatternSnafu, UnsupportedAbiFormatSnafu},
};
use regex::Regex;
use snafu::{ensure, ResultExt};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

/// Captures a contract address.
pub const ADDRESS_PATTERN: &str = r"(0x[0-9a-fA-F]{40})";
/// Captures a block number.
pub const START_BLOCK_PATTERN: &str = r"(\d+)";

/// How an ABI is written to a dependent file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbiFormat {
    /// The whole file is the ABI JSON.
    Json,
    /// The whole file is a generated TypeScript module.
    Module,
}

impl AbiFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(AbiFormat::Json),
            "ts" => Some(AbiFormat::Module),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AbiDependent {
    pub path: PathBuf,
    pub format: AbiFormat,
}

/// A file and the pattern locating the value to replace in it.
#[derive(Clone, Debug)]
pub struct PatternTarget {
    pub path: PathBuf,
    pub pattern: Regex,
}

#[derive(Clone, Debug, Default)]
pub struct DependentArtifactEntry {
    pub abi: Vec<AbiDependent>,
    pub address: Vec<PatternTarget>,
    pub start_block: Vec<PatternTarget>,
}

/// The piece of contract metadata a target mirrors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    /// The canonical generated module in the ABI export directory.
    AbiExport,
    Abi,
    Address,
    StartBlock,
    Manifest,
}

impl Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::AbiExport => "abi export",
            TargetKind::Abi => "abi",
            TargetKind::Address => "address",
            TargetKind::StartBlock => "start block",
            TargetKind::Manifest => "manifest",
        })
    }
}

/// A resolved pattern substitution for one sync run.
///
/// `value` is `None` when the contract has no deployed address yet.
#[derive(Clone, Debug)]
pub struct SyncTarget {
    pub contract: ContractName,
    pub kind: TargetKind,
    pub path: PathBuf,
    pub pattern: Regex,
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PatternRegistry {
    entries: BTreeMap<ContractName, DependentArtifactEntry>,
}

impl PatternRegistry {
    pub fn new(ctx: &RuntimeContext) -> Result<Self, ConfigError> {
        Self::from_config(&ctx.workspace_root, &ctx.dependents)
    }

    /// Compile and validate all entries. Paths are resolved against
    /// `workspace_root`.
    pub fn from_config(
        workspace_root: &Path,
        dependents: &BTreeMap<ContractName, DependentsConfig>,
    ) -> Result<Self, ConfigError> {
        let mut entries = BTreeMap::new();
        for (&contract, config) in dependents {
            let abi = config
                .abi
                .iter()
                .map(|path| {
                    let format = AbiFormat::from_path(path).ok_or_else(|| {
                        UnsupportedAbiFormatSnafu { contract, path }.build()
                    })?;
                    Ok(AbiDependent {
                        path: workspace_root.join(path),
                        format,
                    })
                })
                .collect::<Result<_, ConfigError>>()?;
            let compile_all = |targets: &[(PathBuf, String)]| {
                targets
                    .iter()
                    .map(|(path, template)| {
                        Ok(PatternTarget {
                            path: workspace_root.join(path),
                            pattern: compile(contract, path, template)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ConfigError>>()
            };
            let entry = DependentArtifactEntry {
                abi,
                address: compile_all(&config.address)?,
                start_block: compile_all(&config.start_block)?,
            };
            entries.insert(contract, entry);
        }
        Ok(Self { entries })
    }

    pub fn get(&self, contract: ContractName) -> Option<&DependentArtifactEntry> {
        self.entries.get(&contract)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContractName, &DependentArtifactEntry)> {
        self.entries.iter().map(|(name, entry)| (*name, entry))
    }

    /// Join the address and start block dependents of `contract` with its
    /// deployment record.
    pub fn targets(
        &self,
        contract: ContractName,
        record: Option<&DeploymentRecord>,
    ) -> Vec<SyncTarget> {
        let Some(entry) = self.get(contract) else {
            return vec![];
        };
        let address = record.and_then(|record| record.address.as_ref());
        let address_value = address.map(|address| address.to_string());
        let block_value = address
            .and(record)
            .map(|record| record.start_block.to_string());

        let resolve = |targets: &[PatternTarget], kind, value: &Option<String>| {
            targets
                .iter()
                .map(|target| SyncTarget {
                    contract,
                    kind,
                    path: target.path.clone(),
                    pattern: target.pattern.clone(),
                    value: value.clone(),
                })
                .collect::<Vec<_>>()
        };
        let mut targets = resolve(&entry.address, TargetKind::Address, &address_value);
        targets.extend(resolve(
            &entry.start_block,
            TargetKind::StartBlock,
            &block_value,
        ));
        targets
    }
}

/// Expand `{address}` and `{block}` placeholders and compile the pattern.
fn compile(contract: ContractName, path: &Path, template: &str) -> Result<Regex, ConfigError> {
    let pattern = template
        .replace("{address}", ADDRESS_PATTERN)
        .replace("{block}", START_BLOCK_PATTERN);
    let regex = Regex::new(&pattern).context(InvalidPatternSnafu { contract, path })?;
    let found = regex.captures_len() - 1;
    ensure!(
        found == 1,
        CaptureGroupsSnafu {
            contract,
            pattern,
            found
        }
    );
    Ok(regex)
}
