// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::contract::ContractName;
use snafu::Snafu;
use std::path::PathBuf;

/// Problems with static configuration. These are fatal and reported before
/// any file is touched.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("failed to save deployment records: {source}"))]
    WriteRecords { source: RewriteError },

    #[snafu(display("failed to serialize deployment records: {source}"))]
    SerializeRecords { source: toml::ser::Error },

    #[snafu(display("unknown contract name `{name}`"))]
    UnknownContract { name: String },

    #[snafu(display("invalid address `{value}`, expected 0x followed by 40 hex digits"))]
    InvalidAddress { value: String },

    #[snafu(display("invalid pattern for {contract} in {}: {source}", path.display()))]
    InvalidPattern {
        contract: ContractName,
        path: PathBuf,
        source: regex::Error,
    },

    #[snafu(display(
        "pattern `{pattern}` for {contract} must have exactly one capture group, found {found}"
    ))]
    CaptureGroups {
        contract: ContractName,
        pattern: String,
        found: usize,
    },

    #[snafu(display(
        "ABI dependent {} of {contract} must be a .json or .ts file",
        path.display()
    ))]
    UnsupportedAbiFormat {
        contract: ContractName,
        path: PathBuf,
    },

    #[snafu(display("invalid artifact glob `{pattern}`: {source}"))]
    ArtifactGlob {
        pattern: String,
        source: glob::PatternError,
    },
}

/// Failure to produce the compiled artifact of a contract.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ArtifactError {
    #[snafu(display("no build artifact for {contract}"))]
    NotFound { contract: ContractName },

    #[snafu(display("failed to read artifact {}: {source}", path.display()))]
    ReadArtifact {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse artifact {}: {source}", path.display()))]
    ParseArtifact {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("artifact {} has no ABI array", path.display()))]
    MissingAbi { path: PathBuf },

    #[snafu(display("ABI of {contract} is not valid: {source}"))]
    InvalidAbi {
        contract: ContractName,
        source: serde_json::Error,
    },

    #[snafu(display("bytecode of {contract} is not valid hex: {source}"))]
    InvalidBytecode {
        contract: ContractName,
        source: ethers::utils::hex::FromHexError,
    },
}

/// Failure of a single text rewrite.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RewriteError {
    #[snafu(display("I/O error on {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "pattern matches more than one line of {} (lines {lines:?})",
        path.display()
    ))]
    AmbiguousMatch { path: PathBuf, lines: Vec<usize> },
}

/// A generated ABI module could not be read back.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AbiModuleError {
    #[snafu(display("not a generated ABI module"))]
    Malformed,

    #[snafu(display("{source}"))]
    ModuleContract { source: ConfigError },

    #[snafu(display("ABI value is not valid JSON: {source}"))]
    ModuleJson { source: serde_json::Error },
}
