// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! TypeScript modules exporting a contract ABI as a `const` value.
//!
//! The frontend and server consume ABIs as
//!
//! ```text
//! const SSLotteryABI = [ ... ] as const;
//!
//! export default SSLotteryABI;
//! ```
//!
//! so that the TypeScript compiler can infer precise types from them. The
//! module is entirely derived from the ABI and is overwritten on every sync.

use crate::{
    contract::ContractName,
    error::{AbiModuleError, MalformedSnafu, ModuleContractSnafu, ModuleJsonSnafu},
};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use std::fmt::{self, Display};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbiModule {
    pub contract: ContractName,
    pub abi: Value,
}

impl AbiModule {
    pub fn new(contract: ContractName, abi: Value) -> Self {
        Self { contract, abi }
    }

    /// Name of the exported constant, e.g. `SSLotteryABI`.
    pub fn export_name(&self) -> String {
        format!("{}ABI", self.contract)
    }

    /// Read back a module rendered through `Display`.
    pub fn parse(source: &str) -> Result<Self, AbiModuleError> {
        let rest = source.strip_prefix("const ").context(MalformedSnafu)?;
        let (export_name, rest) = rest.split_once(" = ").context(MalformedSnafu)?;
        let contract = export_name
            .strip_suffix("ABI")
            .context(MalformedSnafu)?
            .parse::<ContractName>()
            .context(ModuleContractSnafu)?;
        let module = Self::new(contract, Value::Null);

        let footer = format!(" as const;\n\nexport default {export_name};\n");
        if module.export_name() != export_name {
            return MalformedSnafu.fail();
        }
        let json = rest.strip_suffix(footer.as_str()).context(MalformedSnafu)?;
        let abi = serde_json::from_str(json).context(ModuleJsonSnafu)?;
        Ok(Self { abi, ..module })
    }
}

impl Display for AbiModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.export_name();
        let abi = pretty_json(&self.abi).map_err(|_| fmt::Error)?;
        write!(f, "const {name} = {abi} as const;\n\nexport default {name};\n")
    }
}

/// The ABI as written to `.json` dependents: two-space indented, no trailing
/// newline.
pub fn pretty_json(abi: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(abi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn abi() -> Value {
        json!([
            {
                "inputs": [
                    { "internalType": "address", "name": "_roleControlAddress", "type": "address" },
                    { "internalType": "uint256", "name": "_minTicketPriceInUsd", "type": "uint256" }
                ],
                "stateMutability": "nonpayable",
                "type": "constructor"
            },
            {
                "inputs": [{ "internalType": "uint256", "name": "lotteryId", "type": "uint256" }],
                "name": "LotteryNotOpen",
                "type": "error"
            },
            {
                "inputs": [],
                "name": "reset",
                "outputs": [],
                "stateMutability": "nonpayable",
                "type": "function"
            }
        ])
    }

    #[test]
    fn test_render() {
        let module = AbiModule::new(ContractName::DataFeedConsumer, json!([]));
        assert_eq!(
            module.to_string(),
            "const DataFeedConsumerABI = [] as const;\n\nexport default DataFeedConsumerABI;\n"
        );

        let module = AbiModule::new(ContractName::SsLottery, json!([{ "type": "fallback" }]));
        assert_eq!(
            module.to_string(),
            "const SSLotteryABI = [\n  {\n    \"type\": \"fallback\"\n  }\n] as const;\n\nexport default SSLotteryABI;\n"
        );
    }

    #[test]
    fn test_round_trip() {
        let module = AbiModule::new(ContractName::SsLottery, abi());
        let parsed = AbiModule::parse(&module.to_string()).unwrap();
        assert_eq!(parsed, module);

        // Key order survives, so a second render is byte-identical.
        assert_eq!(parsed.to_string(), module.to_string());
    }

    #[test]
    fn test_parse_rejects_foreign_modules() {
        assert!(AbiModule::parse("export default {};\n").is_err());
        assert!(AbiModule::parse(
            "const LotteryABI = [] as const;\n\nexport default LotteryABI;\n"
        )
        .is_err());
        assert!(AbiModule::parse(
            "const SSLotteryABI = [] as const;\n\nexport default OtherABI;\n"
        )
        .is_err());
        assert!(AbiModule::parse(
            "const SSLotteryABI = [} as const;\n\nexport default SSLotteryABI;\n"
        )
        .is_err());
    }
}
