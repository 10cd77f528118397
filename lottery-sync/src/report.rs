// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{contract::ContractName, registry::TargetKind};
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The pattern matched no line of the file.
    NoMatch,
    /// The contract has no recorded address.
    NotDeployed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Written,
    /// The file already held the value.
    Unchanged,
    Skipped(SkipReason),
    Failed(String),
}

impl TargetStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TargetStatus::Written | TargetStatus::Unchanged)
    }
}

impl Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Written => f.write_str("written"),
            TargetStatus::Unchanged => f.write_str("unchanged"),
            TargetStatus::Skipped(SkipReason::NoMatch) => f.write_str("skipped, no matching line"),
            TargetStatus::Skipped(SkipReason::NotDeployed) => {
                f.write_str("skipped, contract not deployed")
            }
            TargetStatus::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

/// Result of syncing one downstream file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetReport {
    /// `None` for targets covering all contracts, like the manifest.
    pub contract: Option<ContractName>,
    pub kind: TargetKind,
    pub path: PathBuf,
    pub status: TargetStatus,
}

/// Outcome of a whole sync run. A run never stops at the first failure, so
/// this lists every target that was attempted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn push(&mut self, report: TargetReport) {
        self.targets.push(report);
    }

    pub fn contract(&self, name: ContractName) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(move |target| target.contract == Some(name))
    }

    pub fn successes(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|target| target.status.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|target| matches!(target.status, TargetStatus::Failed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets
            .iter()
            .filter(|target| matches!(target.status, TargetStatus::Skipped(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn log(&self) {
        for target in &self.targets {
            let contract = target
                .contract
                .map(|name| name.to_string())
                .unwrap_or_else(|| "all contracts".into());
            let path = target.path.display();
            match &target.status {
                TargetStatus::Failed(_) => {
                    tracing::error!("{contract} {} -> {path}: {}", target.kind, target.status)
                }
                TargetStatus::Skipped(_) => {
                    tracing::warn!("{contract} {} -> {path}: {}", target.kind, target.status)
                }
                _ => tracing::info!("{contract} {} -> {path}: {}", target.kind, target.status),
            }
        }
        tracing::info!(
            "Synced {} targets: {} ok, {} skipped, {} failed",
            self.targets.len(),
            self.successes().count(),
            self.skipped().count(),
            self.failures().count()
        );
    }
}
