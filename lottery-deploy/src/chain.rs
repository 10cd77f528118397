// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Access to the lottery contracts on chain.
//!
//! Contracts are only known through the ABIs in their build artifacts, so all
//! calls are encoded dynamically. The [`LotteryChain`] trait is the seam
//! between the deployment logic and the network.

use crate::{
    config::{NetworkConfig, PrivateConfig},
    error::{
        ChainError, DecodeSnafu, DeployTxSnafu, EncodeSnafu, InvalidUrlSnafu,
        MissingContractAddressSnafu, MissingReceiptSnafu, NetworkConfigError, ReplacedSnafu,
        RevertedSnafu, RpcSnafu, TimeoutSnafu,
    },
    revert::{decode_revert, DecodedRevert},
    wallets::{WalletName, Wallets},
};
use async_std::{future::timeout, task::sleep};
use async_trait::async_trait;
use ethers::{
    abi::{Abi, Token},
    contract::ContractFactory,
    providers::{Http, JsonRpcClient, Middleware, MiddlewareError, Provider, ProviderError},
    types::{
        transaction::eip2718::TypedTransaction, Address, BlockId, BlockNumber, Bytes,
        Transaction, TransactionReceipt, TransactionRequest, H256, U256, U64,
    },
};
use lottery_sync::ContractName;
use snafu::{OptionExt, ResultExt};
use std::{future::Future, sync::Arc, time::Duration};

/// A call to a function of a deployed contract.
#[derive(Clone, Debug)]
pub struct ContractCall {
    pub contract: ContractName,
    pub address: Address,
    pub abi: Arc<Abi>,
    pub function: String,
    pub args: Vec<Token>,
}

impl ContractCall {
    pub fn new(
        contract: ContractName,
        address: Address,
        abi: Arc<Abi>,
        function: impl Into<String>,
        args: Vec<Token>,
    ) -> Self {
        Self {
            contract,
            address,
            abi,
            function: function.into(),
            args,
        }
    }

    pub fn calldata(&self) -> Result<Bytes, ChainError> {
        let context = EncodeSnafu {
            contract: self.contract,
            function: &self.function,
        };
        let function = self.abi.function(&self.function).context(context)?;
        Ok(function.encode_input(&self.args).context(context)?.into())
    }

    pub fn decode_output(&self, output: &[u8]) -> Result<Vec<Token>, ChainError> {
        let context = DecodeSnafu {
            contract: self.contract,
            function: &self.function,
        };
        let function = self.abi.function(&self.function).context(context)?;
        function.decode_output(output).context(context)
    }
}

/// A mined contract creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub address: Address,
    pub block_number: u64,
    pub transaction_hash: H256,
}

#[async_trait]
pub trait LotteryChain: Send + Sync {
    fn address_of(&self, wallet: WalletName) -> Result<Address, ChainError>;

    /// Deploy `contract` from `from` and wait for the creation receipt.
    async fn deploy(
        &self,
        from: WalletName,
        contract: ContractName,
        abi: Arc<Abi>,
        bytecode: Bytes,
        args: Vec<Token>,
    ) -> Result<Deployment, ChainError>;

    /// Send a transaction and wait until it is mined.
    async fn send(&self, from: WalletName, call: &ContractCall) -> Result<H256, ChainError>;

    /// Evaluate a call without sending a transaction.
    async fn read(&self, from: WalletName, call: &ContractCall) -> Result<Vec<Token>, ChainError>;
}

/// [`LotteryChain`] over JSON-RPC.
#[derive(Clone, Debug)]
pub struct RpcChain<P = Http> {
    provider: Provider<P>,
    wallets: Wallets<P>,
    timeout: Duration,
}

impl RpcChain<Http> {
    /// Connect to the network's RPC, or to `url` if given.
    pub fn connect(
        network: &NetworkConfig,
        url: Option<&url::Url>,
        keys: &PrivateConfig,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, NetworkConfigError> {
        let url = url.unwrap_or(&network.url);
        let provider = Provider::<Http>::try_from(url.as_str())
            .context(InvalidUrlSnafu { url: url.as_str() })?
            .interval(interval);
        tracing::info!("Connected to {url} (chain {})", network.chain_id);
        let wallets = Wallets::connect(&provider, network.chain_id, keys)?;
        Ok(Self::new(provider, wallets, timeout))
    }
}

impl<P: JsonRpcClient + Clone + 'static> RpcChain<P> {
    pub fn new(provider: Provider<P>, wallets: Wallets<P>, timeout: Duration) -> Self {
        Self {
            provider,
            wallets,
            timeout,
        }
    }

    async fn with_timeout<T>(
        &self,
        contract: ContractName,
        fut: impl Future<Output = Result<T, ChainError>>,
    ) -> Result<T, ChainError> {
        timeout(self.timeout, fut).await.map_err(|_| {
            TimeoutSnafu {
                contract,
                seconds: self.timeout.as_secs(),
            }
            .build()
        })?
    }

    /// Sign and send `tx`, then wait for a successful receipt.
    async fn submit(
        &self,
        from: WalletName,
        contract: ContractName,
        abi: &Abi,
        mut tx: TypedTransaction,
    ) -> Result<TransactionReceipt, ChainError> {
        let client = self.wallets.get(from)?;
        let sender = client.inner().address();
        let start_block = self
            .with_timeout(contract, async {
                self.provider
                    .get_block_number()
                    .await
                    .map_err(|err| rpc_error(contract, abi, &err))
            })
            .await?;
        // Filling reserves a nonce and estimates gas, which is where most
        // reverts show up.
        self.with_timeout(contract, async {
            client
                .fill_transaction(&mut tx, None)
                .await
                .map_err(|err| rpc_error(contract, abi, &err))
        })
        .await?;
        let nonce = tx.nonce().copied().unwrap_or_default();

        let hash = self
            .with_timeout(contract, async {
                client
                    .send_transaction(tx.clone(), None)
                    .await
                    .map(|pending| pending.tx_hash())
                    .map_err(|err| rpc_error(contract, abi, &err))
            })
            .await?;
        tracing::info!("Sent {contract} transaction {hash:?} from {from} with nonce {nonce}");

        let receipt = self
            .with_timeout(
                contract,
                self.wait_for_receipt(contract, abi, sender, nonce, &tx, hash, start_block),
            )
            .await?;
        if receipt.status == Some(U64::zero()) {
            let revert = self.replay(abi, &tx, receipt.block_number).await;
            return RevertedSnafu {
                contract,
                hash: receipt.transaction_hash,
                revert,
            }
            .fail();
        }
        Ok(receipt)
    }

    /// Poll for the receipt of `hash`.
    ///
    /// If the sender's nonce moves past the transaction's nonce while `hash`
    /// is still unknown, the transaction was replaced. A replacement with the
    /// same destination and calldata (a fee bump) is waited for instead,
    /// anything else is an error.
    #[allow(clippy::too_many_arguments)]
    async fn wait_for_receipt(
        &self,
        contract: ContractName,
        abi: &Abi,
        sender: Address,
        nonce: U256,
        tx: &TypedTransaction,
        hash: H256,
        start_block: U64,
    ) -> Result<TransactionReceipt, ChainError> {
        let mut hash = hash;
        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|err| rpc_error(contract, abi, &err))?
            {
                return Ok(receipt);
            }

            let mined = self
                .provider
                .get_transaction_count(sender, None)
                .await
                .map_err(|err| rpc_error(contract, abi, &err))?;
            if mined > nonce {
                // Mined in between the two requests.
                if let Some(receipt) = self
                    .provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(|err| rpc_error(contract, abi, &err))?
                {
                    return Ok(receipt);
                }
                let replacement = self
                    .find_replacement(sender, nonce, start_block)
                    .await
                    .map_err(|err| rpc_error(contract, abi, &err))?
                    .context(MissingReceiptSnafu { contract, hash })?;
                let repriced = replacement.to.as_ref() == tx.to_addr()
                    && Some(&replacement.input) == tx.data();
                if !repriced {
                    return ReplacedSnafu {
                        contract,
                        hash,
                        replacement: replacement.hash,
                    }
                    .fail();
                }
                tracing::warn!(
                    "{contract} transaction {hash:?} was repriced as {:?}",
                    replacement.hash
                );
                hash = replacement.hash;
                continue;
            }

            sleep(self.provider.get_interval()).await;
        }
    }

    /// The mined transaction of `sender` with `nonce`, searching from
    /// `start_block` to the chain head.
    async fn find_replacement(
        &self,
        sender: Address,
        nonce: U256,
        start_block: U64,
    ) -> Result<Option<Transaction>, ProviderError> {
        let head = self.provider.get_block_number().await?;
        for number in start_block.as_u64()..=head.as_u64() {
            if let Some(block) = self.provider.get_block_with_txs(number).await? {
                if let Some(tx) = block
                    .transactions
                    .into_iter()
                    .find(|tx| tx.from == sender && tx.nonce == nonce)
                {
                    return Ok(Some(tx));
                }
            }
        }
        Ok(None)
    }

    /// Re-run a reverted transaction as a call to recover the revert data.
    async fn replay(
        &self,
        abi: &Abi,
        tx: &TypedTransaction,
        block: Option<U64>,
    ) -> Option<DecodedRevert> {
        let block = block.map(|number| BlockId::Number(BlockNumber::Number(number)));
        match self.provider.call(tx, block).await {
            Ok(_) => None,
            Err(err) => revert_data(&err).map(|data| decode_revert(abi, &data)),
        }
    }
}

#[async_trait]
impl<P: JsonRpcClient + Clone + 'static> LotteryChain for RpcChain<P> {
    fn address_of(&self, wallet: WalletName) -> Result<Address, ChainError> {
        self.wallets.address(wallet)
    }

    async fn deploy(
        &self,
        from: WalletName,
        contract: ContractName,
        abi: Arc<Abi>,
        bytecode: Bytes,
        args: Vec<Token>,
    ) -> Result<Deployment, ChainError> {
        let factory = ContractFactory::new((*abi).clone(), bytecode, self.wallets.get(from)?);
        let deployer = factory.deploy_tokens(args).map_err(|err| {
            DeployTxSnafu {
                contract,
                message: err.to_string(),
            }
            .build()
        })?;

        let receipt = self.submit(from, contract, &abi, deployer.tx).await?;
        let hash = receipt.transaction_hash;
        let address = receipt
            .contract_address
            .context(MissingContractAddressSnafu { contract, hash })?;
        let block_number = receipt
            .block_number
            .context(MissingReceiptSnafu { contract, hash })?
            .as_u64();
        Ok(Deployment {
            address,
            block_number,
            transaction_hash: hash,
        })
    }

    async fn send(&self, from: WalletName, call: &ContractCall) -> Result<H256, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(call.address)
            .data(call.calldata()?)
            .into();
        let receipt = self.submit(from, call.contract, &call.abi, tx).await?;
        tracing::info!(
            "{}.{} mined in block {:?}",
            call.contract,
            call.function,
            receipt.block_number.unwrap_or_default()
        );
        Ok(receipt.transaction_hash)
    }

    async fn read(&self, from: WalletName, call: &ContractCall) -> Result<Vec<Token>, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallets.address(from)?)
            .to(call.address)
            .data(call.calldata()?)
            .into();
        let output = self
            .with_timeout(call.contract, async {
                self.provider
                    .call(&tx, None)
                    .await
                    .map_err(|err| rpc_error(call.contract, &call.abi, &err))
            })
            .await?;
        call.decode_output(&output)
    }
}

fn revert_data<E: MiddlewareError>(err: &E) -> Option<Bytes> {
    err.as_error_response()
        .and_then(|response| response.as_revert_data())
}

fn rpc_error<E: MiddlewareError>(contract: ContractName, abi: &Abi, err: &E) -> ChainError {
    let revert = revert_data(err).map(|data| decode_revert(abi, &data));
    RpcSnafu {
        contract,
        message: err.to_string(),
        revert,
    }
    .build()
}
