// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Identities and deployment state of the lottery contracts.

use crate::{
    error::{
        ConfigError, InvalidAddressSnafu, ParseConfigSnafu, ReadConfigSnafu,
        SerializeRecordsSnafu, UnknownContractSnafu, WriteRecordsSnafu,
    },
    rewriter::write_atomic,
};
use ethers::{types::Address, utils::to_checksum};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use snafu::{ensure, ResultExt};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    io::ErrorKind,
    path::Path,
    str::FromStr,
};

/// The closed set of contracts known to the lottery deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContractName {
    RoleControl,
    ContractControl,
    Treasury,
    VrfConsumer,
    DataFeedConsumer,
    SsLottery,
    Prepayment,
}

impl ContractName {
    pub const ALL: [ContractName; 7] = [
        ContractName::RoleControl,
        ContractName::ContractControl,
        ContractName::Treasury,
        ContractName::VrfConsumer,
        ContractName::DataFeedConsumer,
        ContractName::SsLottery,
        ContractName::Prepayment,
    ];

    /// The name as it appears in artifacts, config files and generated code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractName::RoleControl => "RoleControl",
            ContractName::ContractControl => "ContractControl",
            ContractName::Treasury => "Treasury",
            ContractName::VrfConsumer => "VRFConsumer",
            ContractName::DataFeedConsumer => "DataFeedConsumer",
            ContractName::SsLottery => "SSLottery",
            ContractName::Prepayment => "Prepayment",
        }
    }
}

impl Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The lottery contract was called KlayLottery before the rename.
        if s == "KlayLottery" {
            return Ok(ContractName::SsLottery);
        }
        ContractName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| UnknownContractSnafu { name: s }.build())
    }
}

impl Serialize for ContractName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContractName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}

/// A contract address in its textual form: `0x` followed by 40 hex digits.
///
/// The text is kept verbatim (including its casing) because it is inserted
/// literally into downstream files.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HexAddress {
    text: String,
    address: Address,
}

impl HexAddress {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

impl FromStr for HexAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or_default();
        ensure!(
            digits.len() == 40 && digits.bytes().all(|b| b.is_ascii_hexdigit()),
            InvalidAddressSnafu { value: s }
        );
        let address = digits
            .parse::<Address>()
            .map_err(|_| InvalidAddressSnafu { value: s }.build())?;
        Ok(Self {
            text: s.to_string(),
            address,
        })
    }
}

impl From<Address> for HexAddress {
    fn from(address: Address) -> Self {
        Self {
            text: to_checksum(&address, None),
            address,
        }
    }
}

impl Display for HexAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for HexAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for HexAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// Placeholders like `""` or `"0x"` mean "not deployed yet".
fn optional_address<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<HexAddress>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) if text.is_empty() || text == "0x" => Ok(None),
        Some(text) => text.parse().map(Some).map_err(de::Error::custom),
    }
}

/// Where a contract lives on chain and whether it should be deployed again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeploymentRecord {
    #[serde(
        default,
        deserialize_with = "optional_address",
        skip_serializing_if = "Option::is_none"
    )]
    pub address: Option<HexAddress>,
    /// Block number of the creation receipt.
    #[serde(default, alias = "startBlock")]
    pub start_block: u64,
    #[serde(default)]
    pub redeploy: bool,
}

impl DeploymentRecord {
    pub fn deployed(address: HexAddress, start_block: u64) -> Self {
        Self {
            address: Some(address),
            start_block,
            redeploy: false,
        }
    }

    /// The recorded address, unless a redeploy was requested.
    pub fn reusable_address(&self) -> Option<&HexAddress> {
        if self.redeploy {
            None
        } else {
            self.address.as_ref()
        }
    }
}

/// Deployment records of all private contracts for one network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployments(BTreeMap<ContractName, DeploymentRecord>);

impl Deployments {
    /// Load records from a TOML file. A missing file means nothing has been
    /// deployed yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!("No deployment records at {}", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err).context(ReadConfigSnafu { path }),
        };
        toml::from_str(&text).context(ParseConfigSnafu { path })
    }

    /// Replace the record file as a whole, a crash never leaves it half
    /// written.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).context(SerializeRecordsSnafu)?;
        let text = format!(
            "# This file is updated by the deploy binary, set `redeploy = true` to replace a contract.\n\n{text}"
        );
        write_atomic(path, &text).await.context(WriteRecordsSnafu)
    }

    pub fn get(&self, name: ContractName) -> Option<&DeploymentRecord> {
        self.0.get(&name)
    }

    pub fn insert(&mut self, name: ContractName, record: DeploymentRecord) {
        self.0.insert(name, record);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContractName, &DeploymentRecord)> {
        self.0.iter().map(|(name, record)| (*name, record))
    }
}

impl FromIterator<(ContractName, DeploymentRecord)> for Deployments {
    fn from_iter<T: IntoIterator<Item = (ContractName, DeploymentRecord)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_names() {
        for name in ContractName::ALL {
            assert_eq!(name.as_str().parse::<ContractName>().unwrap(), name);
        }
        assert_eq!(
            "KlayLottery".parse::<ContractName>().unwrap(),
            ContractName::SsLottery
        );
        assert!("Lottery".parse::<ContractName>().is_err());
    }

    #[test]
    fn test_address_validation() {
        let text = "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01";
        let address: HexAddress = text.parse().unwrap();
        assert_eq!(address.as_str(), text);
        assert_eq!(
            address.address(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
                .parse::<Address>()
                .unwrap()
        );

        for bad in [
            "",
            "0x",
            "AbCdEf0123456789aBcDeF0123456789ABCDEF0101",
            "0xAbCdEf0123456789aBcDeF0123456789ABCDEF0",
            "0xAbCdEf0123456789aBcDeF0123456789ABCDEF012",
            "0xZbCdEf0123456789aBcDeF0123456789ABCDEF01",
            "0XAbCdEf0123456789aBcDeF0123456789ABCDEF01",
        ] {
            assert!(bad.parse::<HexAddress>().is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_checksum_from_address() {
        let address: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
            .parse()
            .unwrap();
        assert_eq!(
            HexAddress::from(address).as_str(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_records_toml() {
        let records: Deployments = toml::from_str(
            r#"
            [RoleControl]
            address = "0x0000000000000000000000000000000000000001"
            start_block = 10

            [SSLottery]
            address = "0x"
            redeploy = true

            [KlayLottery]
            address = ""
            "#,
        )
        .unwrap();
        let role_control = records.get(ContractName::RoleControl).unwrap();
        assert_eq!(role_control.start_block, 10);
        assert!(role_control.reusable_address().is_some());
        let lottery = records.get(ContractName::SsLottery).unwrap();
        assert_eq!(lottery.address, None);
        assert!(records.get(ContractName::VrfConsumer).is_none());
    }

    #[test]
    fn test_malformed_record_rejected() {
        let res = toml::from_str::<Deployments>(
            r#"
            [SSLottery]
            address = "0x1234"
            "#,
        );
        assert!(res.is_err());

        let res = toml::from_str::<Deployments>(
            r#"
            [Lottery]
            start_block = 1
            "#,
        );
        assert!(res.is_err());
    }

    #[async_std::test]
    async fn test_records_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testnet.toml");
        assert_eq!(Deployments::load(&path).unwrap(), Deployments::default());

        let records: Deployments = [(
            ContractName::SsLottery,
            DeploymentRecord::deployed(
                "0xAbCdEf0123456789aBcDeF0123456789ABCDEF01".parse().unwrap(),
                12345,
            ),
        )]
        .into_iter()
        .collect();
        records.save(&path).await.unwrap();
        assert_eq!(Deployments::load(&path).unwrap(), records);

        // Saving again replaces the file without leaving a temporary behind.
        let mut records = records;
        records.insert(
            ContractName::RoleControl,
            DeploymentRecord::deployed(Address::repeat_byte(1).into(), 7),
        );
        records.save(&path).await.unwrap();
        assert_eq!(Deployments::load(&path).unwrap(), records);
        let files: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("testnet.toml")]);

        // A missing parent directory is reported, not panicked on.
        assert!(records
            .save(&dir.path().join("missing/testnet.toml"))
            .await
            .is_err());
    }
}
