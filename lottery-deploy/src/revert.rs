// Copyright (c) 2023 Espresso Systems (espressosys.com)
// This file is part of the lottery contracts deployment and sync toolkit.
//
// This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License as published by the Free Software Foundation, either version 3 of the License, or any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Decoding of revert data into the custom errors declared by a contract.

use ethers::{
    abi::{decode, Abi, ParamType, Token},
    types::Bytes,
};
use std::fmt::{self, Display};

/// `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Clone, Debug, PartialEq)]
pub enum DecodedRevert {
    Revert { name: String, args: Vec<Token> },
    Unknown { raw: Bytes },
}

impl Display for DecodedRevert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedRevert::Revert { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{name}({args})")
            }
            DecodedRevert::Unknown { raw } => write!(f, "unknown revert {raw}"),
        }
    }
}

pub fn decode_revert(abi: &Abi, data: &[u8]) -> DecodedRevert {
    let unknown = || DecodedRevert::Unknown {
        raw: data.to_vec().into(),
    };
    if data.len() < 4 {
        return unknown();
    }
    let (selector, payload) = data.split_at(4);

    let builtin = if selector == ERROR_SELECTOR {
        Some(("Error", ParamType::String))
    } else if selector == PANIC_SELECTOR {
        Some(("Panic", ParamType::Uint(256)))
    } else {
        None
    };
    if let Some((name, param)) = builtin {
        return match decode(&[param], payload) {
            Ok(args) => DecodedRevert::Revert {
                name: name.into(),
                args,
            },
            Err(_) => unknown(),
        };
    }

    for error in abi.errors() {
        if error.signature().as_bytes()[..4] != *selector {
            continue;
        }
        if let Ok(args) = error.decode(payload) {
            return DecodedRevert::Revert {
                name: error.name.clone(),
                args,
            };
        }
    }
    unknown()
}
