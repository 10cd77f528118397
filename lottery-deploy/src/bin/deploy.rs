// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{bail, Context, Result};
use async_compatibility_layer::logging::{setup_backtrace, setup_logging};
use clap::Parser;
use lottery_deploy::{Bootstrapper, Network, NetworkConfig, PrivateConfig, RpcChain};
use lottery_sync::{Deployments, RuntimeContext};
use std::{path::PathBuf, time::Duration};
use url::Url;

/// Deploy the lottery contracts to a Klaytn network and propagate the
/// resulting addresses and ABIs to the frontend, server and subgraph.
///
/// Contracts with a recorded address are reused unless their record sets
/// `redeploy = true`.
#[derive(Parser, Debug, Clone)]
pub struct Options {
    /// The network to deploy to.
    #[arg(long, env = "LOTTERY_NETWORK", value_enum, default_value = "testnet")]
    pub network: Network,

    /// Directory with the public `<network>.toml` configs and `sync.toml`.
    #[arg(long, env = "LOTTERY_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Private keys of the deployment wallets.
    #[arg(long, env = "LOTTERY_PRIVATE_CONFIG", default_value = "config/private.toml")]
    pub private_config: PathBuf,

    /// Directory with the `<network>.toml` deployment records.
    #[arg(long, env = "LOTTERY_DEPLOYMENTS_DIR", default_value = "deployments")]
    pub deployments_dir: PathBuf,

    /// Use this RPC instead of the one in the network config.
    #[arg(long, env = "LOTTERY_PROVIDER_URL")]
    pub provider_url: Option<Url>,

    /// How long to wait for any single RPC interaction, in seconds.
    #[arg(long, env = "LOTTERY_RPC_TIMEOUT", default_value = "120")]
    pub timeout: u64,

    /// Receipt polling interval, in milliseconds.
    #[arg(long, env = "LOTTERY_POLL_INTERVAL", default_value = "1000")]
    pub poll_interval: u64,

    /// Only deploy, do not touch downstream files.
    #[arg(long, env = "LOTTERY_SKIP_SYNC")]
    pub skip_sync: bool,
}

async fn deploy(opts: Options) -> Result<()> {
    let network = NetworkConfig::load(&opts.network.config_path(&opts.config_dir))?;
    let keys = PrivateConfig::load(&opts.private_config)?;
    let deployments_path = opts.network.deployments_path(&opts.deployments_dir);
    let deployments = Deployments::load(&deployments_path)?;
    let ctx = RuntimeContext::load(&opts.config_dir.join("sync.toml"), deployments)?;

    let chain = RpcChain::connect(
        &network,
        opts.provider_url.as_ref(),
        &keys,
        Duration::from_millis(opts.poll_interval),
        Duration::from_secs(opts.timeout),
    )?;
    tracing::info!("Deploying lottery to {}", opts.network);
    let mut bootstrapper = Bootstrapper::new(&ctx, network, chain).persist_to(&deployments_path);

    if opts.skip_sync {
        let outcome = bootstrapper.run().await?;
        outcome
            .deployments
            .save(&deployments_path)
            .await
            .context("saving deployment records")?;
        tracing::info!("Saved deployment records to {}", deployments_path.display());
        return Ok(());
    }

    let (outcome, report) = bootstrapper.deploy_and_sync(&deployments_path).await?;
    tracing::info!(
        "Lottery deployed with ticket price {} USD",
        outcome.ticket_price_in_usd
    );
    report.log();
    if !report.is_success() {
        bail!(
            "{} downstream targets could not be updated",
            report.failures().count()
        );
    }
    Ok(())
}

#[async_std::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();
    setup_backtrace();

    let opts = Options::parse();
    deploy(opts).await
}
