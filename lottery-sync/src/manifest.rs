// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! A machine-readable copy of the deployment state.
//!
//! Consumers that can read JSON should prefer this file over the values
//! patched into their sources.

use crate::{
    context::RuntimeContext,
    contract::{ContractName, HexAddress},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub address: HexAddress,
    pub start_block: u64,
    /// Generated ABI module, relative to the workspace root.
    pub abi_path: PathBuf,
}

pub type Manifest = BTreeMap<ContractName, ManifestEntry>;

/// Entries for every deployed contract in `ctx`.
pub fn build_manifest(ctx: &RuntimeContext) -> Manifest {
    ctx.deployments
        .iter()
        .filter_map(|(name, record)| {
            let address = record.address.clone()?;
            let abi_path = ctx.abi_export_path(name);
            let abi_path = abi_path
                .strip_prefix(&ctx.workspace_root)
                .map(PathBuf::from)
                .unwrap_or(abi_path);
            Some((
                name,
                ManifestEntry {
                    address,
                    start_block: record.start_block,
                    abi_path,
                },
            ))
        })
        .collect()
}

pub fn render_manifest(manifest: &Manifest) -> Result<String, serde_json::Error> {
    let mut text = serde_json::to_string_pretty(manifest)?;
    text.push('\n');
    Ok(text)
}
