// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use crate::{
    config::PrivateConfig,
    error::{ChainError, InvalidKeySnafu, MissingWalletSnafu, NetworkConfigError},
};
use ethers::{
    prelude::{NonceManagerMiddleware, SignerMiddleware},
    providers::{Http, JsonRpcClient, Middleware as _, Provider},
    signers::{LocalWallet, Signer},
    types::Address,
};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    sync::Arc,
};

/// Accounts taking part in a lottery deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletName {
    Owner,
    Operator,
    Injector,
    Querier,
    Server,
    Bob,
    Carol,
}

impl Display for WalletName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WalletName::Owner => "owner",
            WalletName::Operator => "operator",
            WalletName::Injector => "injector",
            WalletName::Querier => "querier",
            WalletName::Server => "server",
            WalletName::Bob => "bob",
            WalletName::Carol => "carol",
        })
    }
}

pub type Signing<P = Http> = SignerMiddleware<Provider<P>, LocalWallet>;

/// A signing client. The nonce manager lets several transactions from the
/// same account be in flight at once.
pub type Client<P = Http> = NonceManagerMiddleware<Signing<P>>;

#[derive(Clone, Debug)]
pub struct Wallets<P = Http> {
    clients: BTreeMap<WalletName, Arc<Client<P>>>,
}

impl<P: JsonRpcClient + Clone> Wallets<P> {
    pub fn connect(
        provider: &Provider<P>,
        chain_id: u64,
        keys: &PrivateConfig,
    ) -> Result<Self, NetworkConfigError> {
        let mut clients = BTreeMap::new();
        for (&name, key) in &keys.wallets {
            let wallet = key
                .parse::<LocalWallet>()
                .context(InvalidKeySnafu { wallet: name })?
                .with_chain_id(chain_id);
            let address = wallet.address();
            let signer = SignerMiddleware::new(provider.clone(), wallet);
            tracing::info!("Using {name} account {address:?}");
            clients.insert(name, Arc::new(NonceManagerMiddleware::new(signer, address)));
        }
        Ok(Self { clients })
    }

    pub fn get(&self, name: WalletName) -> Result<Arc<Client<P>>, ChainError> {
        self.clients
            .get(&name)
            .cloned()
            .context(MissingWalletSnafu { wallet: name })
    }

    pub fn address(&self, name: WalletName) -> Result<Address, ChainError> {
        Ok(self.get(name)?.inner().address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect() {
        let provider = Provider::<Http>::try_from("http://localhost:8551").unwrap();
        let keys = PrivateConfig {
            wallets: [(
                WalletName::Owner,
                // Well known development key.
                "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
            )]
            .into(),
        };
        let wallets = Wallets::connect(&provider, 1001, &keys).unwrap();
        assert_eq!(
            wallets.address(WalletName::Owner).unwrap(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
        assert!(matches!(
            wallets.address(WalletName::Bob),
            Err(ChainError::MissingWallet { .. })
        ));

        let keys = PrivateConfig {
            wallets: [(WalletName::Bob, "not a key".to_string())].into(),
        };
        assert!(Wallets::connect(&provider, 1001, &keys).is_err());
    }
}
