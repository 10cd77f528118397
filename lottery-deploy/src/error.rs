// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{revert::DecodedRevert, wallets::WalletName};
use ethers::types::H256;
use lottery_sync::{ArtifactError, ConfigError, ContractName};
use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NetworkConfigError {
    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadNetworkConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseNetworkConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("invalid private key for wallet {wallet}: {source}"))]
    InvalidKey {
        wallet: WalletName,
        source: ethers::signers::WalletError,
    },

    #[snafu(display("invalid RPC URL {url}: {source}"))]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
}

/// Failure of a single interaction with the chain.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChainError {
    #[snafu(display("no private key configured for wallet {wallet}"))]
    MissingWallet { wallet: WalletName },

    #[snafu(display("failed to encode call {contract}.{function}: {source}"))]
    Encode {
        contract: ContractName,
        function: String,
        source: ethers::abi::Error,
    },

    #[snafu(display("failed to build creation transaction of {contract}: {message}"))]
    DeployTx {
        contract: ContractName,
        message: String,
    },

    #[snafu(display("failed to decode result of {contract}.{function}: {source}"))]
    Decode {
        contract: ContractName,
        function: String,
        source: ethers::abi::Error,
    },

    #[snafu(display("{contract}: {message}{}", fmt_revert(revert)))]
    Rpc {
        contract: ContractName,
        message: String,
        revert: Option<DecodedRevert>,
    },

    #[snafu(display("{contract}: gave up waiting for the chain after {seconds}s"))]
    Timeout { contract: ContractName, seconds: u64 },

    #[snafu(display("{contract}: no receipt for transaction {hash:?}"))]
    MissingReceipt { contract: ContractName, hash: H256 },

    #[snafu(display("{contract}: creation receipt {hash:?} has no contract address"))]
    MissingContractAddress { contract: ContractName, hash: H256 },

    #[snafu(display(
        "{contract}: transaction {hash:?} was cancelled by {replacement:?}"
    ))]
    Replaced {
        contract: ContractName,
        hash: H256,
        replacement: H256,
    },

    #[snafu(display("{contract}: transaction {hash:?} reverted{}", fmt_revert(revert)))]
    Reverted {
        contract: ContractName,
        hash: H256,
        revert: Option<DecodedRevert>,
    },
}

fn fmt_revert(revert: &Option<DecodedRevert>) -> String {
    revert
        .as_ref()
        .map(|revert| format!(" ({revert})"))
        .unwrap_or_default()
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BootstrapError {
    #[snafu(display("{source}"))]
    Chain { source: ChainError },

    #[snafu(display("{source}"))]
    Artifact { source: ArtifactError },

    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("{contract}.{function} returned {output}, expected a single uint"))]
    UnexpectedOutput {
        contract: ContractName,
        function: String,
        output: String,
    },

    #[snafu(display("{contract} must be resolved before it is used"))]
    Unresolved { contract: ContractName },
}

impl From<ChainError> for BootstrapError {
    fn from(source: ChainError) -> Self {
        Self::Chain { source }
    }
}

impl From<ArtifactError> for BootstrapError {
    fn from(source: ArtifactError) -> Self {
        Self::Artifact { source }
    }
}

impl From<ConfigError> for BootstrapError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}
