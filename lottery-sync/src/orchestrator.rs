// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Propagates ABIs, addresses and start blocks to every downstream file.

use crate::{
    abi_module::{pretty_json, AbiModule},
    artifacts::{ArtifactLoader, ContractArtifact},
    context::RuntimeContext,
    contract::ContractName,
    error::ConfigError,
    manifest::{build_manifest, render_manifest},
    registry::{AbiDependent, AbiFormat, PatternRegistry, TargetKind},
    report::{RunReport, SkipReason, TargetReport, TargetStatus},
    rewriter::{rewrite, write_atomic, RewriteOutcome},
};
use futures::future::join_all;
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug)]
pub struct Orchestrator {
    ctx: RuntimeContext,
    registry: PatternRegistry,
    loader: ArtifactLoader,
}

/// What to do to one file.
#[derive(Clone, Debug)]
enum Action {
    /// Replace the whole file.
    Write { contents: String, create_dir: bool },
    /// Replace a single value located by a pattern.
    Rewrite { pattern: Regex, value: String },
    /// The contents could not be produced, report the target as failed.
    Fail { message: String },
}

#[derive(Clone, Debug)]
struct Job {
    contract: Option<ContractName>,
    kind: TargetKind,
    path: PathBuf,
    action: Action,
}

impl Orchestrator {
    /// Fails if any configured pattern or ABI dependent is invalid, before a
    /// single file is touched.
    pub fn new(ctx: &RuntimeContext) -> Result<Self, ConfigError> {
        Ok(Self {
            registry: PatternRegistry::new(ctx)?,
            loader: ArtifactLoader::new(ctx),
            ctx: ctx.clone(),
        })
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &ArtifactLoader {
        &self.loader
    }

    /// Run every sync target. Failures are collected in the report, one bad
    /// target never prevents the others from being written.
    pub async fn sync(&self) -> RunReport {
        let mut report = RunReport::default();
        let artifacts = self.load_artifacts().await;

        let mut jobs = vec![];
        for (&contract, artifact) in &artifacts {
            let artifact = match artifact {
                Ok(artifact) => artifact,
                Err(msg) => {
                    self.fail_abi_targets(&mut report, contract, msg);
                    continue;
                }
            };
            jobs.extend(self.abi_jobs(contract, artifact));
        }

        for (contract, _) in self.registry.iter() {
            for target in self
                .registry
                .targets(contract, self.ctx.deployments.get(contract))
            {
                match target.value {
                    Some(value) => jobs.push(Job {
                        contract: Some(contract),
                        kind: target.kind,
                        path: target.path,
                        action: Action::Rewrite {
                            pattern: target.pattern,
                            value,
                        },
                    }),
                    None => report.push(TargetReport {
                        contract: Some(contract),
                        kind: target.kind,
                        path: target.path,
                        status: TargetStatus::Skipped(SkipReason::NotDeployed),
                    }),
                }
            }
        }

        if let Some(path) = &self.ctx.manifest_path {
            match render_manifest(&build_manifest(&self.ctx)) {
                Ok(contents) => jobs.push(Job {
                    contract: None,
                    kind: TargetKind::Manifest,
                    path: path.clone(),
                    action: Action::Write {
                        contents,
                        create_dir: true,
                    },
                }),
                Err(err) => report.push(TargetReport {
                    contract: None,
                    kind: TargetKind::Manifest,
                    path: path.clone(),
                    status: TargetStatus::Failed(err.to_string()),
                }),
            }
        }

        // Jobs on the same file run one after the other so that a later
        // rewrite sees the result of an earlier one.
        let mut by_path: BTreeMap<PathBuf, Vec<Job>> = BTreeMap::new();
        for job in jobs {
            by_path.entry(job.path.clone()).or_default().push(job);
        }
        tracing::info!(
            "Syncing {} targets in {} files",
            by_path.values().map(Vec::len).sum::<usize>(),
            by_path.len()
        );

        let results = join_all(by_path.into_values().map(|jobs| async move {
            let mut reports = vec![];
            for job in jobs {
                let status = run(&job).await;
                reports.push(TargetReport {
                    contract: job.contract,
                    kind: job.kind,
                    path: job.path,
                    status,
                });
            }
            reports
        }))
        .await;
        for target in results.into_iter().flatten() {
            report.push(target);
        }
        report
    }

    /// Load the artifact of every contract that needs one, concurrently.
    async fn load_artifacts(&self) -> BTreeMap<ContractName, Result<Arc<ContractArtifact>, String>> {
        let contracts: BTreeSet<ContractName> = self
            .loader
            .contracts()
            .chain(
                self.registry
                    .iter()
                    .filter(|(_, entry)| !entry.abi.is_empty())
                    .map(|(name, _)| name),
            )
            .collect();
        join_all(contracts.into_iter().map(|contract| async move {
            let artifact = self.loader.load(contract).await.map_err(|err| {
                tracing::error!("{err}");
                err.to_string()
            });
            (contract, artifact)
        }))
        .await
        .into_iter()
        .collect()
    }

    fn abi_jobs(&self, contract: ContractName, artifact: &ContractArtifact) -> Vec<Job> {
        let module = AbiModule::new(contract, artifact.abi.clone()).to_string();
        let mut jobs = vec![];
        if self.loader.path(contract).is_some() {
            jobs.push(Job {
                contract: Some(contract),
                kind: TargetKind::AbiExport,
                path: self.ctx.abi_export_path(contract),
                action: Action::Write {
                    contents: module.clone(),
                    create_dir: true,
                },
            });
        }
        let dependents = self
            .registry
            .get(contract)
            .map(|entry| entry.abi.as_slice())
            .unwrap_or_default();
        let json = pretty_json(&artifact.abi)
            .map_err(|err| format!("failed to render ABI of {contract}: {err}"));
        jobs.extend(
            dependents
                .iter()
                .map(|dependent| abi_dependent_job(contract, dependent, &module, &json)),
        );
        jobs
    }

    fn fail_abi_targets(&self, report: &mut RunReport, contract: ContractName, msg: &str) {
        let mut fail = |kind, path: PathBuf| {
            report.push(TargetReport {
                contract: Some(contract),
                kind,
                path,
                status: TargetStatus::Failed(msg.to_string()),
            })
        };
        if self.loader.path(contract).is_some() {
            fail(TargetKind::AbiExport, self.ctx.abi_export_path(contract));
        }
        if let Some(entry) = self.registry.get(contract) {
            for dependent in &entry.abi {
                fail(TargetKind::Abi, dependent.path.clone());
            }
        }
    }
}

fn abi_dependent_job(
    contract: ContractName,
    dependent: &AbiDependent,
    module: &str,
    json: &Result<String, String>,
) -> Job {
    let action = match (dependent.format, json) {
        (AbiFormat::Module, _) => Action::Write {
            contents: module.to_string(),
            create_dir: false,
        },
        (AbiFormat::Json, Ok(json)) => Action::Write {
            contents: json.clone(),
            create_dir: false,
        },
        (AbiFormat::Json, Err(message)) => Action::Fail {
            message: message.clone(),
        },
    };
    Job {
        contract: Some(contract),
        kind: TargetKind::Abi,
        path: dependent.path.clone(),
        action,
    }
}

async fn run(job: &Job) -> TargetStatus {
    let res = match &job.action {
        Action::Write {
            contents,
            create_dir,
        } => write_file(&job.path, contents, *create_dir).await,
        Action::Rewrite { pattern, value } => rewrite(&job.path, pattern, value)
            .await
            .map(|outcome| match outcome {
                RewriteOutcome::Updated { .. } => TargetStatus::Written,
                RewriteOutcome::Unchanged { .. } => TargetStatus::Unchanged,
                RewriteOutcome::NoMatch => TargetStatus::Skipped(SkipReason::NoMatch),
            })
            .map_err(|err| err.to_string()),
        Action::Fail { message } => Err(message.clone()),
    };
    res.unwrap_or_else(|msg| {
        tracing::error!("Failed to sync {}: {msg}", job.path.display());
        TargetStatus::Failed(msg)
    })
}

async fn write_file(path: &Path, contents: &str, create_dir: bool) -> Result<TargetStatus, String> {
    if let Ok(existing) = async_std::fs::read_to_string(path).await {
        if existing == contents {
            return Ok(TargetStatus::Unchanged);
        }
    }
    if create_dir {
        if let Some(dir) = path.parent() {
            async_std::fs::create_dir_all(dir)
                .await
                .map_err(|err| format!("failed to create {}: {err}", dir.display()))?;
        }
    }
    write_atomic(path, contents)
        .await
        .map_err(|err| err.to_string())?;
    Ok(TargetStatus::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::SyncConfig,
        contract::{DeploymentRecord, Deployments},
    };
    use serde_json::json;

    const ADDRESS: &str = "0x00000000000000000000000000000000000000aA";

    fn context(root: &Path, deployments: Deployments) -> RuntimeContext {
        let config: SyncConfig = toml::from_str(
            r#"
            workspace_root = "."
            abi_export_dir = "abis"

            [artifacts.paths]
            SSLottery = "SSLottery.json"

            [dependents.SSLottery]
            abi = ["server/abi.ts", "subgraph/SSLottery.json"]
            address = [["subgraph.yaml", "address: '{address}'"]]
            start_block = [["subgraph.yaml", "startBlock: {block}"]]
            "#,
        )
        .unwrap();
        RuntimeContext::from_config(config, root, deployments).unwrap()
    }

    fn setup(root: &Path) {
        std::fs::write(
            root.join("SSLottery.json"),
            json!({ "abi": [{ "type": "fallback" }], "bytecode": "0x" }).to_string(),
        )
        .unwrap();
        std::fs::create_dir_all(root.join("server")).unwrap();
        std::fs::create_dir_all(root.join("subgraph")).unwrap();
        std::fs::write(
            root.join("subgraph.yaml"),
            "source:\n  address: '0x0000000000000000000000000000000000000000'\n  startBlock: 0\n",
        )
        .unwrap();
    }

    #[async_std::test]
    async fn test_same_file_targets_do_not_race() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let deployments = [(
            ContractName::SsLottery,
            DeploymentRecord::deployed(ADDRESS.parse().unwrap(), 99),
        )]
        .into_iter()
        .collect();
        let orchestrator = Orchestrator::new(&context(dir.path(), deployments)).unwrap();

        let report = orchestrator.sync().await;
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.successes().count(), 5);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("subgraph.yaml")).unwrap(),
            format!("source:\n  address: '{ADDRESS}'\n  startBlock: 99\n")
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("subgraph/SSLottery.json")).unwrap(),
            "[\n  {\n    \"type\": \"fallback\"\n  }\n]"
        );
        let module = std::fs::read_to_string(dir.path().join("abis/SSLottery.ts")).unwrap();
        assert_eq!(
            AbiModule::parse(&module).unwrap(),
            AbiModule::new(ContractName::SsLottery, json!([{ "type": "fallback" }]))
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("server/abi.ts")).unwrap(),
            module
        );

        // Nothing left to do the second time around.
        let report = orchestrator.sync().await;
        assert!(report
            .targets
            .iter()
            .all(|target| target.status == TargetStatus::Unchanged));
    }

    #[async_std::test]
    async fn test_not_deployed_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        let orchestrator =
            Orchestrator::new(&context(dir.path(), Deployments::default())).unwrap();

        let report = orchestrator.sync().await;
        assert!(report.is_success());
        assert_eq!(report.skipped().count(), 2);
        assert!(report.skipped().all(|target| target.status
            == TargetStatus::Skipped(SkipReason::NotDeployed)));
        // ABIs are still synced.
        assert!(dir.path().join("abis/SSLottery.ts").exists());
    }

    #[async_std::test]
    async fn test_missing_artifact_fails_abi_targets_only() {
        let dir = tempfile::tempdir().unwrap();
        setup(dir.path());
        std::fs::remove_file(dir.path().join("SSLottery.json")).unwrap();
        let deployments = [(
            ContractName::SsLottery,
            DeploymentRecord::deployed(ADDRESS.parse().unwrap(), 99),
        )]
        .into_iter()
        .collect();
        let orchestrator = Orchestrator::new(&context(dir.path(), deployments)).unwrap();

        let report = orchestrator.sync().await;
        assert_eq!(report.failures().count(), 3);
        assert!(report
            .failures()
            .all(|target| matches!(target.kind, TargetKind::Abi | TargetKind::AbiExport)));
        assert_eq!(report.successes().count(), 2);
    }

    #[async_std::test]
    async fn test_unrenderable_abi_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("SSLottery.json");
        let module_path = dir.path().join("abi.ts");
        let rendered: Result<String, String> = Err("cannot render".into());

        let job = abi_dependent_job(
            ContractName::SsLottery,
            &AbiDependent {
                path: json_path.clone(),
                format: AbiFormat::Json,
            },
            "export const abi = [];\n",
            &rendered,
        );
        assert_eq!(job.kind, TargetKind::Abi);
        assert_eq!(job.path, json_path);
        assert_eq!(
            run(&job).await,
            TargetStatus::Failed("cannot render".into())
        );
        assert!(!json_path.exists());

        // Module dependents do not need the JSON rendering.
        let job = abi_dependent_job(
            ContractName::SsLottery,
            &AbiDependent {
                path: module_path.clone(),
                format: AbiFormat::Module,
            },
            "export const abi = [];\n",
            &rendered,
        );
        assert_eq!(run(&job).await, TargetStatus::Written);
        assert_eq!(
            std::fs::read_to_string(&module_path).unwrap(),
            "export const abi = [];\n"
        );
    }
}
