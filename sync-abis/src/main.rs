// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Result};
use async_compatibility_layer::logging::{setup_backtrace, setup_logging};
use clap::Parser;
use lottery_sync::{Deployments, Orchestrator, RuntimeContext};
use std::path::PathBuf;

/// Copy the lottery ABIs, addresses and start blocks from the contract build
/// into the frontend, server and subgraph.
#[derive(Parser, Debug, Clone)]
struct Options {
    /// The sync configuration.
    #[arg(long, env = "LOTTERY_SYNC_CONFIG", default_value = "config/sync.toml")]
    config: PathBuf,

    /// Deployment records of the network whose addresses are propagated.
    #[arg(
        long,
        env = "LOTTERY_DEPLOYMENTS",
        default_value = "deployments/testnet.toml"
    )]
    deployments: PathBuf,
}

async fn sync(opts: Options) -> Result<()> {
    let deployments = Deployments::load(&opts.deployments)?;
    let ctx = RuntimeContext::load(&opts.config, deployments)?;
    let orchestrator = Orchestrator::new(&ctx)?;

    let report = orchestrator.sync().await;
    report.log();
    if !report.is_success() {
        bail!(
            "{} of {} targets failed",
            report.failures().count(),
            report.targets.len()
        );
    }
    tracing::info!(
        "Synced {} targets, {} skipped",
        report.successes().count(),
        report.skipped().count()
    );
    Ok(())
}

#[async_std::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();
    setup_backtrace();

    sync(Options::parse()).await
}

#[cfg(test)]
mod test {
    use super::*;

    #[async_std::test]
    async fn test_sync_command() -> Result<()> {
        setup_logging();
        setup_backtrace();

        let dir = tempfile::tempdir()?;
        let config = dir.path().join("sync.toml");
        std::fs::write(
            &config,
            r#"
            workspace_root = "."
            abi_export_dir = "abis"

            [dependents.SSLottery]
            address = [["server.env", "LOTTERY_ADDRESS={address}"]]
            "#,
        )?;
        std::fs::write(
            dir.path().join("server.env"),
            "LOTTERY_ADDRESS=0x0000000000000000000000000000000000000000\n",
        )?;
        std::fs::write(
            dir.path().join("testnet.toml"),
            "[SSLottery]\naddress = \"0x00000000000000000000000000000000000000aa\"\nstart_block = 7\n",
        )?;

        let opts = Options::parse_from([
            "",
            "--config",
            config.to_str().unwrap(),
            "--deployments",
            dir.path().join("testnet.toml").to_str().unwrap(),
        ]);
        sync(opts).await?;
        assert_eq!(
            std::fs::read_to_string(dir.path().join("server.env"))?,
            "LOTTERY_ADDRESS=0x00000000000000000000000000000000000000aa\n"
        );

        // A dependent that no longer exists fails the run.
        std::fs::remove_file(dir.path().join("server.env"))?;
        let opts = Options::parse_from([
            "",
            "--config",
            config.to_str().unwrap(),
            "--deployments",
            dir.path().join("testnet.toml").to_str().unwrap(),
        ]);
        assert!(sync(opts).await.is_err());
        Ok(())
    }
}
