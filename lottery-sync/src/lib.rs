// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Keeps the lottery frontend, server and subgraph in sync with the compiled
//! and deployed contracts.
//!
//! A sync run reads the build artifacts and the deployment records of one
//! network, then rewrites every downstream file that mirrors an ABI, an
//! address or a start block. See [`Orchestrator::sync`].

pub mod abi_module;
pub mod artifacts;
pub mod context;
pub mod contract;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod registry;
pub mod report;
pub mod rewriter;

pub use abi_module::AbiModule;
pub use artifacts::{ArtifactLoader, ContractArtifact};
pub use context::{RuntimeContext, SyncConfig};
pub use contract::{ContractName, DeploymentRecord, Deployments, HexAddress};
pub use error::{ArtifactError, ConfigError, RewriteError};
pub use orchestrator::Orchestrator;
pub use registry::PatternRegistry;
pub use report::{RunReport, SkipReason, TargetReport, TargetStatus};
