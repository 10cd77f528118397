// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Public network configuration and private wallet keys.

use crate::{
    error::{NetworkConfigError, ParseNetworkConfigSnafu, ReadNetworkConfigSnafu},
    wallets::WalletName,
};
use clap::ValueEnum;
use ethers::types::H256;
use lottery_sync::{ContractName, HexAddress};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use snafu::ResultExt;
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Klaytn Baobab.
    Testnet,
    /// Klaytn Cypress.
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// `<config_dir>/<network>.toml`
    pub fn config_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(format!("{self}.toml"))
    }

    /// `<deployments_dir>/<network>.toml`
    pub fn deployments_path(&self, deployments_dir: &Path) -> PathBuf {
        deployments_dir.join(format!("{self}.toml"))
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub url: Url,
    pub chain_id: u64,
    pub vrf_consumer: VrfConsumerArgs,
    pub data_feed_consumer: DataFeedConsumerArgs,
    /// Contracts operated by third parties, e.g. Treasury and Prepayment.
    #[serde(default)]
    pub external: BTreeMap<ContractName, HexAddress>,
}

/// Constructor arguments of `VRFConsumer` besides the control contracts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VrfConsumerArgs {
    pub coordinator_address: HexAddress,
    pub key_hash: H256,
    pub callback_gas_limit: u32,
}

/// Constructor arguments of `DataFeedConsumer` besides the control contracts.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataFeedConsumerArgs {
    pub aggregator_proxy_address: HexAddress,
}

impl NetworkConfig {
    pub fn load(path: &Path) -> Result<Self, NetworkConfigError> {
        load_toml(path)
    }
}

/// Private keys of the named wallets. Lives outside version control.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrivateConfig {
    pub wallets: BTreeMap<WalletName, String>,
}

impl PrivateConfig {
    pub fn load(path: &Path) -> Result<Self, NetworkConfigError> {
        load_toml(path)
    }
}

impl fmt::Debug for PrivateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateConfig")
            .field("wallets", &self.wallets.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, NetworkConfigError> {
    let text = std::fs::read_to_string(path).context(ReadNetworkConfigSnafu { path })?;
    toml::from_str(&text).context(ParseNetworkConfigSnafu { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_configs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");

        let testnet = NetworkConfig::load(&Network::Testnet.config_path(&dir)).unwrap();
        assert_eq!(testnet.chain_id, 1001);
        assert_eq!(testnet.url.as_str(), "https://public-en-baobab.klaytn.net/");
        assert_eq!(testnet.vrf_consumer.callback_gas_limit, 500_000);
        assert_eq!(
            testnet.data_feed_consumer.aggregator_proxy_address.as_str(),
            "0xC874f389A3F49C5331490145f77c4eFE202d72E1"
        );
        assert!(testnet.external.contains_key(&ContractName::Prepayment));

        let mainnet = NetworkConfig::load(&Network::Mainnet.config_path(&dir)).unwrap();
        assert_eq!(mainnet.chain_id, 8217);
        assert_ne!(mainnet.vrf_consumer.key_hash, testnet.vrf_consumer.key_hash);

        let private = PrivateConfig::load(&dir.join("example.private.toml")).unwrap();
        assert_eq!(private.wallets.len(), 7);
        assert!(!format!("{private:?}").contains("0x"));
    }

    #[test]
    fn test_unknown_external_contract() {
        let res = toml::from_str::<NetworkConfig>(
            r#"
            url = "http://localhost:8551"
            chain_id = 1001

            [vrf_consumer]
            coordinator_address = "0xDA8c0A00A372503aa6EC80f9b29Cc97C454bE499"
            key_hash = "0xd9af33106d664a53cb9946df5cd81a30695f5b72224ee64e798b278af812779c"
            callback_gas_limit = 500000

            [data_feed_consumer]
            aggregator_proxy_address = "0xC874f389A3F49C5331490145f77c4eFE202d72E1"

            [external]
            Vault = "0x3123Ca333026e4AbafBF47C5a3cE16401767d4CE"
            "#,
        );
        assert!(res.is_err());
    }
}
