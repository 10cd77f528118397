// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Brings a network to a fully deployed and configured lottery.
//!
//! Contracts with a reusable record are picked up as they are, everything
//! else is deployed in dependency order:
//!
//! 1. `RoleControl`
//! 2. `ContractControl(roleControl)`
//! 3. `VRFConsumer(roleControl, contractControl, coordinator, keyHash, callbackGasLimit)`
//!    and `DataFeedConsumer(roleControl, contractControl, aggregatorProxy)`, concurrently
//! 4. operator, injector and querier roles are granted by the owner
//! 5. `SSLottery(roleControl, contractControl, minTicketPriceInUsd)`, with the
//!    price derived from the data feed
//! 6. `SSLottery.reset()` by the owner

use crate::{
    chain::{ContractCall, Deployment, LotteryChain},
    config::NetworkConfig,
    error::{BootstrapError, UnexpectedOutputSnafu, UnresolvedSnafu},
    wallets::WalletName,
};
use ethers::{
    abi::Token,
    types::{Address, U256},
};
use futures::try_join;
use lottery_sync::{
    ArtifactLoader, ContractName, DeploymentRecord, Deployments, Orchestrator, RunReport,
    RuntimeContext,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Roles of `RoleControl`, in the order of the on-chain enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    Owner = 0,
    Operator = 1,
    Injector = 2,
    Querier = 3,
}

impl Role {
    /// The wallet holding this role.
    pub fn wallet(self) -> WalletName {
        match self {
            Role::Owner => WalletName::Owner,
            Role::Operator => WalletName::Operator,
            Role::Injector => WalletName::Injector,
            Role::Querier => WalletName::Querier,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContractState {
    #[default]
    Unresolved,
    /// A reusable record exists, no transaction was sent.
    Found { address: Address },
    /// The creation transaction was mined.
    Deployed(Deployment),
    /// The address is known to the rest of the deployment.
    Registered { address: Address, deployed: bool },
}

impl ContractState {
    pub fn address(&self) -> Option<Address> {
        match self {
            ContractState::Unresolved => None,
            ContractState::Found { address } | ContractState::Registered { address, .. } => {
                Some(*address)
            }
            ContractState::Deployed(deployment) => Some(deployment.address),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub deployments: Deployments,
    pub states: BTreeMap<ContractName, ContractState>,
    pub base_usd: U256,
    pub min_ticket_price_in_usd: U256,
    /// Ticket price for starting a lottery round.
    pub ticket_price_in_usd: U256,
}

/// `round(0.005 * base_usd)` and `round(0.1 * base_usd)`, rounding halves up.
pub fn ticket_prices(base_usd: U256) -> (U256, U256) {
    let min = base_usd.saturating_add(100.into()) / 200;
    let ticket = base_usd.saturating_add(5.into()) / 10;
    (min, ticket)
}

pub struct Bootstrapper<C> {
    ctx: RuntimeContext,
    network: NetworkConfig,
    chain: C,
    loader: ArtifactLoader,
    deployments: Deployments,
    states: BTreeMap<ContractName, ContractState>,
    records_path: Option<PathBuf>,
}

impl<C: LotteryChain> Bootstrapper<C> {
    pub fn new(ctx: &RuntimeContext, network: NetworkConfig, chain: C) -> Self {
        Self {
            loader: ArtifactLoader::new(ctx),
            deployments: ctx.deployments.clone(),
            ctx: ctx.clone(),
            network,
            chain,
            states: Default::default(),
            records_path: None,
        }
    }

    /// Save the deployment records to `path` as soon as each contract is
    /// mined, so a later failure does not lose them.
    pub fn persist_to(mut self, path: &Path) -> Self {
        self.records_path = Some(path.to_path_buf());
        self
    }

    pub fn state(&self, contract: ContractName) -> ContractState {
        self.states.get(&contract).copied().unwrap_or_default()
    }

    pub async fn run(&mut self) -> Result<BootstrapOutcome, BootstrapError> {
        let role_control = self.resolve(ContractName::RoleControl, vec![]).await?;
        let role_control = self.register(ContractName::RoleControl, role_control).await?;
        let contract_control = self
            .resolve(
                ContractName::ContractControl,
                vec![Token::Address(role_control)],
            )
            .await?;
        let contract_control = self.register(ContractName::ContractControl, contract_control).await?;

        let controls = [
            Token::Address(role_control),
            Token::Address(contract_control),
        ];
        let vrf = &self.network.vrf_consumer;
        let mut vrf_args = controls.to_vec();
        vrf_args.extend([
            Token::Address(vrf.coordinator_address.address()),
            Token::FixedBytes(vrf.key_hash.as_bytes().to_vec()),
            Token::Uint(vrf.callback_gas_limit.into()),
        ]);
        let mut feed_args = controls.to_vec();
        feed_args.push(Token::Address(
            self.network
                .data_feed_consumer
                .aggregator_proxy_address
                .address(),
        ));
        let (vrf_consumer, data_feed_consumer) = try_join!(
            self.resolve(ContractName::VrfConsumer, vrf_args),
            self.resolve(ContractName::DataFeedConsumer, feed_args),
        )?;
        self.register(ContractName::VrfConsumer, vrf_consumer).await?;
        let data_feed_consumer = self.register(ContractName::DataFeedConsumer, data_feed_consumer).await?;

        for role in [Role::Operator, Role::Injector, Role::Querier] {
            let member = self.chain.address_of(role.wallet())?;
            let call = self
                .call(
                    ContractName::RoleControl,
                    role_control,
                    "addMember",
                    vec![Token::Uint((role as u8).into()), Token::Address(member)],
                )
                .await?;
            self.chain.send(WalletName::Owner, &call).await?;
            tracing::info!("Granted {role:?} role to {member:?}");
        }

        let base_usd = self.query_base_usd(data_feed_consumer).await?;
        let (min_ticket_price_in_usd, ticket_price_in_usd) = ticket_prices(base_usd);
        tracing::info!(
            "Base USD {base_usd}, minimum ticket price {min_ticket_price_in_usd}, ticket price {ticket_price_in_usd}"
        );

        let lottery = self
            .resolve(
                ContractName::SsLottery,
                vec![
                    Token::Address(role_control),
                    Token::Address(contract_control),
                    Token::Uint(min_ticket_price_in_usd),
                ],
            )
            .await?;
        let lottery = self.register(ContractName::SsLottery, lottery).await?;
        let reset = self
            .call(ContractName::SsLottery, lottery, "reset", vec![])
            .await?;
        self.chain.send(WalletName::Owner, &reset).await?;

        Ok(BootstrapOutcome {
            deployments: self.deployments.clone(),
            states: self.states.clone(),
            base_usd,
            min_ticket_price_in_usd,
            ticket_price_in_usd,
        })
    }

    /// Run the deployment, persist the records to `deployments_path` and
    /// propagate the result to all dependents.
    pub async fn deploy_and_sync(
        &mut self,
        deployments_path: &Path,
    ) -> Result<(BootstrapOutcome, RunReport), BootstrapError> {
        self.records_path = Some(deployments_path.to_path_buf());
        let outcome = self.run().await?;
        outcome.deployments.save(deployments_path).await?;
        tracing::info!(
            "Saved deployment records to {}",
            deployments_path.display()
        );

        let ctx = self.ctx.with_deployments(self.sync_records(&outcome.deployments));
        let report = Orchestrator::new(&ctx)?.sync().await;
        Ok((outcome, report))
    }

    /// Records to sync: the private deployments plus the configured external
    /// contracts.
    fn sync_records(&self, deployments: &Deployments) -> Deployments {
        let mut records = deployments.clone();
        for (&name, address) in &self.network.external {
            if records.get(name).is_none() {
                records.insert(name, DeploymentRecord::deployed(address.clone(), 0));
            }
        }
        records
    }

    async fn resolve(
        &self,
        contract: ContractName,
        args: Vec<Token>,
    ) -> Result<ContractState, BootstrapError> {
        if let Some(address) = self
            .deployments
            .get(contract)
            .and_then(DeploymentRecord::reusable_address)
        {
            tracing::info!("{contract} found: {address}");
            return Ok(ContractState::Found {
                address: address.address(),
            });
        }

        let artifact = self.loader.load(contract).await?;
        let abi = Arc::new(artifact.typed_abi(contract)?);
        let bytecode = artifact.bytecode(contract)?;
        tracing::info!("Deploying {contract}");
        let deployment = self
            .chain
            .deploy(WalletName::Owner, contract, abi, bytecode, args)
            .await?;
        tracing::info!(
            "{contract} deployed: {:?} in block {}",
            deployment.address,
            deployment.block_number
        );
        Ok(ContractState::Deployed(deployment))
    }

    async fn register(
        &mut self,
        contract: ContractName,
        state: ContractState,
    ) -> Result<Address, BootstrapError> {
        let (address, deployed) = match state {
            ContractState::Found { address } => (address, false),
            ContractState::Deployed(deployment) => {
                self.deployments.insert(
                    contract,
                    DeploymentRecord::deployed(deployment.address.into(), deployment.block_number),
                );
                if let Some(path) = &self.records_path {
                    self.deployments.save(path).await?;
                    tracing::debug!("Recorded {contract} in {}", path.display());
                }
                (deployment.address, true)
            }
            ContractState::Unresolved | ContractState::Registered { .. } => {
                return UnresolvedSnafu { contract }.fail()
            }
        };
        self.states
            .insert(contract, ContractState::Registered { address, deployed });
        Ok(address)
    }

    async fn call(
        &self,
        contract: ContractName,
        address: Address,
        function: &str,
        args: Vec<Token>,
    ) -> Result<ContractCall, BootstrapError> {
        let abi = self.loader.load(contract).await?.typed_abi(contract)?;
        Ok(ContractCall::new(
            contract,
            address,
            Arc::new(abi),
            function,
            args,
        ))
    }

    async fn query_base_usd(&self, data_feed_consumer: Address) -> Result<U256, BootstrapError> {
        let call = self
            .call(
                ContractName::DataFeedConsumer,
                data_feed_consumer,
                "queryBaseUsd",
                vec![],
            )
            .await?;
        let output = self.chain.read(WalletName::Querier, &call).await?;
        match output.as_slice() {
            [Token::Uint(value)] => Ok(*value),
            _ => UnexpectedOutputSnafu {
                contract: ContractName::DataFeedConsumer,
                function: "queryBaseUsd",
                output: format!("{output:?}"),
            }
            .fail(),
        }
    }
}
