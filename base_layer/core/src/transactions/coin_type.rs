// Copyright 2024. The Pebble Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::transactions::{TX_VERSION_CONTRACT, TX_VERSION_CURRENCY, TX_VERSION_VANILLA};

/// The currency id of the base coin.
pub const CURRENCY_XPB: u64 = 77;
/// An invalid/unsupplied currency id.
pub const CURRENCY_INVALID: u64 = 252;
/// An invalid/unsupplied backing currency id.
pub const BACKED_BY_INVALID: u64 = 253;
/// Sentinel: the currency field does not apply to this input/output.
pub const CURRENCY_N_A: u64 = 254;
/// Sentinel: the backing-currency field does not apply to this input/output.
pub const BACKED_BY_N_A: u64 = 255;
/// The lowest id a user-minted currency or contract may use.
pub const MIN_USER_CURRENCY_ID: u64 = 256;

/// Which side of a contract a coin belongs to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoinContractType {
    NotContract = 0,
    BackingCoin = 1,
    ContractCoin = 2,
    /// N/A for the given input/output kind (e.g. a CreateContract input).
    ContractTypeNA = 255,
}

impl CoinContractType {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(CoinContractType::NotContract),
            1 => Some(CoinContractType::BackingCoin),
            2 => Some(CoinContractType::ContractCoin),
            255 => Some(CoinContractType::ContractTypeNA),
            _ => None,
        }
    }

    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

/// The ledger key for a kind of coin: `(currency, contract role, backing currency)`.
///
/// Ordering is lexicographic over the triple, which makes `CurrencyMap` iteration deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoinType {
    pub currency: u64,
    pub contract_type: CoinContractType,
    pub backed_by_currency: u64,
}

/// The base coin.
pub const CP_XPB: CoinType = CoinType {
    currency: CURRENCY_XPB,
    contract_type: CoinContractType::NotContract,
    backed_by_currency: BACKED_BY_N_A,
};

/// The "not applicable" coin type carried by inputs that move no coins of their own.
pub const CP_N_A: CoinType = CoinType {
    currency: CURRENCY_N_A,
    contract_type: CoinContractType::ContractTypeNA,
    backed_by_currency: BACKED_BY_N_A,
};

impl CoinType {
    pub fn new(currency: u64, contract_type: CoinContractType, backed_by_currency: u64) -> Self {
        CoinType {
            currency,
            contract_type,
            backed_by_currency,
        }
    }

    /// A plain (non-contract) coin of the given currency.
    pub fn currency(currency: u64) -> Self {
        CoinType::new(currency, CoinContractType::NotContract, BACKED_BY_N_A)
    }

    /// The lowest transaction format version able to carry this coin type.
    pub fn minimum_tx_version(&self) -> u64 {
        if self.contract_type != CoinContractType::NotContract || self.backed_by_currency != BACKED_BY_N_A {
            return TX_VERSION_CONTRACT;
        }
        if self.currency != CURRENCY_XPB {
            return TX_VERSION_CURRENCY;
        }
        TX_VERSION_VANILLA
    }

    pub fn is_valid_tx_version(&self, version: u64) -> bool {
        version >= self.minimum_tx_version()
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}/{}/{}>",
            self.currency,
            self.contract_type.as_u64(),
            self.backed_by_currency
        )
    }
}

/// Amounts grouped by coin type. BTree so iteration order is deterministic.
pub type CurrencyMap = BTreeMap<CoinType, u64>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let a = CoinType::new(5, CoinContractType::NotContract, BACKED_BY_N_A);
        let b = CoinType::new(5, CoinContractType::BackingCoin, 77);
        let c = CoinType::new(6, CoinContractType::NotContract, BACKED_BY_N_A);
        assert!(a < b);
        assert!(b < c);
        let d = CoinType::new(5, CoinContractType::BackingCoin, 78);
        assert!(b < d);
    }

    #[test]
    fn minimum_versions() {
        assert_eq!(CP_XPB.minimum_tx_version(), TX_VERSION_VANILLA);
        assert_eq!(CoinType::currency(256).minimum_tx_version(), TX_VERSION_CURRENCY);
        assert_eq!(
            CoinType::new(256, CoinContractType::BackingCoin, CURRENCY_XPB).minimum_tx_version(),
            TX_VERSION_CONTRACT
        );
        assert_eq!(CP_N_A.minimum_tx_version(), TX_VERSION_CONTRACT);
        assert!(CP_XPB.is_valid_tx_version(TX_VERSION_VANILLA));
        assert!(!CoinType::currency(256).is_valid_tx_version(TX_VERSION_VANILLA));
    }

    #[test]
    fn contract_type_round_trip() {
        for ct in [
            CoinContractType::NotContract,
            CoinContractType::BackingCoin,
            CoinContractType::ContractCoin,
            CoinContractType::ContractTypeNA,
        ] {
            assert_eq!(CoinContractType::from_u64(ct.as_u64()), Some(ct));
        }
        assert_eq!(CoinContractType::from_u64(3), None);
    }
}
