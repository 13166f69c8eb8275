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

//! The registries the ledger keeps besides the coins themselves: sub-currencies, contracts and
//! delegates, plus the per-key-image vote history records.
//!
//! Anything that rotates (remint keys, vote instances) is a stack pushed forward and popped on
//! undo, never a field overwritten in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xpb_common_types::{Address, DelegateId};
use xpb_crypto::PublicKey;

/// A registered sub-currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    pub currency: u64,
    pub description: String,
    pub decimals: u64,
    pub total_amount_minted: u64,
    /// Every remint key this currency has had, oldest first. The mint's key sits at the bottom;
    /// each remint pushes its successor.
    pub remint_key_history: Vec<PublicKey>,
}

impl CurrencyInfo {
    /// The currently-active remint key. Null means the supply is frozen.
    pub fn remint_key(&self) -> PublicKey {
        self.remint_key_history.last().copied().unwrap_or_else(PublicKey::null)
    }
}

/// A registered contract and its grading state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub contract: u64,
    pub description: String,
    pub grading_key: PublicKey,
    pub fee_scale: u32,
    pub expiry_block: u64,
    pub default_grade: u32,
    /// Coins minted against this contract, per backing currency.
    pub total_amount_minted: BTreeMap<u64, u64>,
    pub is_graded: bool,
    pub grade: u32,
}

impl ContractInfo {
    /// True while the contract has never been minted against, graded or fused. Undoing the
    /// creating input asserts this.
    pub fn is_in_initial_state(&self) -> bool {
        !self.is_graded && self.grade == 0 && self.total_amount_minted.values().all(|v| *v == 0)
    }
}

/// A registered delegate and its running tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateInfo {
    pub delegate_id: DelegateId,
    pub public_address: Address,
    /// Cached base58 rendering; the deterministic tie-break key for rankings.
    pub address_as_string: String,
    pub total_votes: u64,
    pub processed_blocks: u64,
    pub missed_blocks: u64,
    pub fees_received: u64,
    pub cached_vote_rank: u64,
    pub cached_autoselect_rank: u64,
}

impl DelegateInfo {
    pub fn new(delegate_id: DelegateId, public_address: Address) -> Self {
        DelegateInfo {
            delegate_id,
            address_as_string: public_address.to_base58(),
            public_address,
            total_votes: 0,
            processed_blocks: 0,
            missed_blocks: 0,
            fees_received: 0,
            cached_vote_rank: 0,
            cached_autoselect_rank: 0,
        }
    }
}

/// One vote cast by one key image: the claimed weight and the per-delegate amounts that actually
/// landed after clamping. Keeping the effective map makes undo exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInstance {
    /// The height this vote was expected to first count for.
    pub voting_for_height: u64,
    /// The claimed (full) vote weight.
    pub expected_vote: u64,
    /// Effective amount credited to each voted delegate.
    pub votes: BTreeMap<DelegateId, u64>,
}
