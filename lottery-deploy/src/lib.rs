// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Deployment of the lottery contracts to Klaytn.

pub mod bootstrap;
pub mod chain;
pub mod config;
pub mod error;
pub mod revert;
pub mod wallets;

pub use bootstrap::{BootstrapOutcome, Bootstrapper, ContractState, Role};
pub use chain::{ContractCall, Deployment, LotteryChain, RpcChain};
pub use config::{Network, NetworkConfig, PrivateConfig};
pub use error::{BootstrapError, ChainError, NetworkConfigError};
pub use revert::{decode_revert, DecodedRevert};
pub use wallets::{WalletName, Wallets};
