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

//! The single mutable ledger: blocks, indexes, registries and vote histories.
//!
//! Everything in here mutates only under the one writer lock held by
//! [`BlockchainDatabase`](crate::chain_storage::BlockchainDatabase), and every mutation has an
//! exact inverse so blocks can be popped from the tip.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};
use xpb_common_types::{BlockHash, DelegateId, TxHash};
use xpb_crypto::KeyImage;

use crate::{
    chain_storage::{
        entries::{AltBlockInfo, BlockExtendedInfo, TransactionChainEntry},
        error::ChainStorageError,
        registries::{ContractInfo, CurrencyInfo, DelegateInfo, VoteInstance},
    },
    consensus::ConsensusConstants,
    dpos::autoselect_score,
    transactions::{amount::add_would_overflow, get_tx_fee, CoinType, Transaction},
};

const LOG_TARGET: &str = "c::cs::ledger_state";

/// Key of the append-only output index: one list of `(tx hash, output index)` per coin type and
/// denomination.
pub type OutputIndexKey = (CoinType, u64);

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub(super) blocks: Vec<BlockExtendedInfo>,
    pub(super) blocks_index: HashMap<BlockHash, u64>,
    pub(super) transactions: HashMap<TxHash, TransactionChainEntry>,
    pub(super) spent_key_images: HashSet<KeyImage>,
    pub(super) outputs: HashMap<OutputIndexKey, Vec<(TxHash, usize)>>,
    pub(super) currencies: BTreeMap<u64, CurrencyInfo>,
    pub(super) contracts: BTreeMap<u64, ContractInfo>,
    pub(super) used_descriptions: HashSet<String>,
    pub(super) delegates: BTreeMap<DelegateId, DelegateInfo>,
    pub(super) top_delegates: BTreeSet<DelegateId>,
    pub(super) autovote_delegates: BTreeSet<DelegateId>,
    pub(super) vote_histories: HashMap<KeyImage, Vec<VoteInstance>>,
    pub(super) alternative_chains: HashMap<BlockHash, AltBlockInfo>,
    pub(super) invalid_blocks: HashMap<BlockHash, AltBlockInfo>,
    pub(super) current_block_cumul_sz_limit: u64,
    #[serde(skip)]
    pub(super) popping_block: bool,
}

impl LedgerState {
    pub fn new() -> Self {
        LedgerState::default()
    }

    /// The chain height = number of blocks (the genesis block is height 0).
    pub fn height(&self) -> u64 {
        self.blocks.len() as u64
    }

    pub fn tail_id(&self) -> BlockHash {
        self.blocks.last().map(|bei| bei.block.hash()).unwrap_or_default()
    }

    pub fn block_id_by_height(&self, height: u64) -> Option<BlockHash> {
        self.blocks.get(height as usize).map(|bei| bei.block.hash())
    }

    pub fn have_block(&self, id: &BlockHash) -> bool {
        self.blocks_index.contains_key(id) ||
            self.alternative_chains.contains_key(id) ||
            self.invalid_blocks.contains_key(id)
    }

    pub fn have_tx(&self, id: &TxHash) -> bool {
        self.transactions.contains_key(id)
    }

    pub fn is_key_image_spent(&self, key_image: &KeyImage) -> bool {
        self.spent_key_images.contains(key_image)
    }

    /// The sequence number the next vote from this key image must carry.
    pub fn next_vote_seq(&self, key_image: &KeyImage) -> u64 {
        self.vote_histories.get(key_image).map(|h| h.len() as u64).unwrap_or(0)
    }

    /// Whether an output with this unlock time may be spent now. Values below
    /// `max_block_number` are block heights, anything above is a unix timestamp.
    pub fn is_tx_spendtime_unlocked(&self, rules: &ConsensusConstants, unlock_time: u64, now: u64) -> bool {
        if unlock_time < rules.max_block_number {
            self.height().saturating_sub(1) + rules.locked_tx_allowed_delta_blocks >= unlock_time
        } else {
            now.saturating_add(rules.locked_tx_allowed_delta_seconds) >= unlock_time
        }
    }

    // -- output index ---------------------------------------------------------------------------

    /// Appends every output of `tx` to its per-(coin type, amount) index; returns the assigned
    /// global indexes.
    pub(super) fn push_transaction_to_global_outs_index(&mut self, tx: &Transaction, tx_id: TxHash) -> Vec<u64> {
        let mut global_indexes = Vec::with_capacity(tx.prefix.outputs().len());
        for (i, out) in tx.prefix.outputs().iter().enumerate() {
            let index = self.outputs.entry((tx.prefix.out_cp(i), out.amount)).or_default();
            index.push((tx_id, i));
            global_indexes.push(index.len() as u64 - 1);
        }
        global_indexes
    }

    /// Pops `tx`'s outputs off their indexes, newest first, asserting they are the tail entries.
    pub(super) fn pop_transaction_from_global_index(
        &mut self,
        tx: &Transaction,
        tx_id: TxHash,
    ) -> Result<(), ChainStorageError> {
        for (i, out) in tx.prefix.outputs().iter().enumerate().rev() {
            let key = (tx.prefix.out_cp(i), out.amount);
            let index = self
                .outputs
                .get_mut(&key)
                .ok_or_else(|| ChainStorageError::CorruptedState("output index missing for popped tx".into()))?;
            match index.last() {
                Some((last_tx, last_i)) if *last_tx == tx_id && *last_i == i => {
                    index.pop();
                },
                _ => {
                    return Err(ChainStorageError::CorruptedState(
                        "output index tail does not match popped tx".into(),
                    ))
                },
            }
            if index.is_empty() {
                self.outputs.remove(&key);
            }
        }
        Ok(())
    }

    /// Number of committed outputs for a coin type and denomination.
    pub fn output_count(&self, coin_type: CoinType, amount: u64) -> u64 {
        self.outputs.get(&(coin_type, amount)).map(|v| v.len() as u64).unwrap_or(0)
    }

    // -- fees -----------------------------------------------------------------------------------

    /// The average total fee of the blocks in the day before `for_block_height`. The DPoS fee
    /// reward and the delegate registration floor both derive from this.
    pub fn average_past_block_fees(&self, for_block_height: u64) -> Result<u64, ChainStorageError> {
        if for_block_height == 0 {
            return Ok(0);
        }
        let last = for_block_height - 1;
        if last >= self.height() {
            return Err(ChainStorageError::HeightOutOfRange {
                requested: for_block_height,
                tip: self.height(),
            });
        }

        let end_timestamp = self.blocks[last as usize].block.header.timestamp;
        let mut used_blocks = 0u64;
        let mut fee_summaries = 0u64;
        for height in (0..=last).rev() {
            let bei = &self.blocks[height as usize];
            if bei.block.header.timestamp < end_timestamp.saturating_sub(86_400) {
                break;
            }
            for tx_id in &bei.block.tx_hashes {
                let entry = self.transactions.get(tx_id).ok_or_else(|| {
                    ChainStorageError::CorruptedState(format!("block at height {height} lists unknown tx {tx_id}"))
                })?;
                fee_summaries = fee_summaries.saturating_add(get_tx_fee(&entry.tx));
            }
            used_blocks += 1;
        }
        if used_blocks == 0 {
            return Ok(0);
        }
        Ok(fee_summaries / used_blocks)
    }

    // -- votes ----------------------------------------------------------------------------------

    /// Credits `vote_amount` to each voted delegate, clamping at the vote cap, and records the
    /// effective amounts.
    pub(super) fn apply_votes(
        &mut self,
        rules: &ConsensusConstants,
        vote_amount: u64,
        for_delegates: &BTreeSet<DelegateId>,
    ) -> Result<VoteInstance, ChainStorageError> {
        if self.popping_block {
            return Err(ChainStorageError::CorruptedState(
                "applying votes while popping a block".into(),
            ));
        }

        // voting is assumed to land on the next block
        let mut instance = VoteInstance {
            voting_for_height: self.height(),
            expected_vote: vote_amount,
            votes: BTreeMap::new(),
        };
        let max_vote = rules.vote_cap();

        for delegate_id in for_delegates {
            let info = self
                .delegates
                .get_mut(delegate_id)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("vote for unknown delegate {delegate_id}")))?;
            if add_would_overflow(info.total_votes, vote_amount) {
                return Err(ChainStorageError::CorruptedState("applying vote would overflow".into()));
            }
            let effective = if info.total_votes + vote_amount > max_vote {
                max_vote - info.total_votes
            } else {
                vote_amount
            };
            info.total_votes += effective;
            instance.votes.insert(*delegate_id, effective);
        }
        Ok(instance)
    }

    /// Subtracts a vote instance's effective amounts. With `enforce_effective_amount` (undo), the
    /// recorded amounts must be consistent with the claimed weight and the cap.
    pub(super) fn unapply_votes(
        &mut self,
        rules: &ConsensusConstants,
        instance: &VoteInstance,
        enforce_effective_amount: bool,
    ) -> Result<(), ChainStorageError> {
        let max_vote = rules.vote_cap();
        for (delegate_id, vote_amount) in instance.votes.iter().rev() {
            let info = self.delegates.get_mut(delegate_id).ok_or_else(|| {
                ChainStorageError::CorruptedState(format!("unapplying vote for unknown delegate {delegate_id}"))
            })?;
            if enforce_effective_amount &&
                instance.expected_vote != 0 &&
                (*vote_amount > instance.expected_vote ||
                    (*vote_amount < instance.expected_vote && info.total_votes != max_vote))
            {
                return Err(ChainStorageError::CorruptedState(
                    "recorded effective vote does not match the claimed amount".into(),
                ));
            }
            info.total_votes = info
                .total_votes
                .checked_sub(*vote_amount)
                .ok_or_else(|| ChainStorageError::CorruptedState("underflow undoing a vote".into()))?;
        }
        Ok(())
    }

    /// Re-applies a recorded vote instance exactly (used when a spend that shadowed a vote is
    /// undone, or when a revote is popped).
    pub(super) fn reapply_votes(
        &mut self,
        rules: &ConsensusConstants,
        instance: &VoteInstance,
    ) -> Result<(), ChainStorageError> {
        let max_vote = rules.vote_cap();
        for (delegate_id, vote_amount) in &instance.votes {
            let info = self.delegates.get_mut(delegate_id).ok_or_else(|| {
                ChainStorageError::CorruptedState(format!("reapplying vote for unknown delegate {delegate_id}"))
            })?;
            if add_would_overflow(info.total_votes, *vote_amount) || info.total_votes + *vote_amount > max_vote {
                return Err(ChainStorageError::CorruptedState(
                    "reapplying votes would exceed the vote cap".into(),
                ));
            }
            info.total_votes += *vote_amount;
        }
        Ok(())
    }

    /// A canonical digest over the replayable ledger content, independent of hash-map iteration
    /// order. Derived caches (the cumulative size limit) are excluded. Two states that differ in
    /// this digest have observably different ledgers.
    pub fn canonical_digest(&self) -> [u8; 32] {
        use xpb_crypto::cn_fast_hash;

        fn put_u64(buf: &mut Vec<u8>, v: u64) {
            buf.extend_from_slice(&v.to_le_bytes());
        }

        let mut buf: Vec<u8> = Vec::new();
        put_u64(&mut buf, self.blocks.len() as u64);
        for bei in &self.blocks {
            buf.extend_from_slice(bei.block.hash().as_slice());
            put_u64(&mut buf, bei.height);
            put_u64(&mut buf, bei.block_cumulative_size);
            put_u64(&mut buf, bei.cumulative_difficulty);
            put_u64(&mut buf, bei.already_generated_coins);
        }

        let mut tx_ids: Vec<&TxHash> = self.transactions.keys().collect();
        tx_ids.sort();
        for id in tx_ids {
            let entry = &self.transactions[id];
            buf.extend_from_slice(id.as_slice());
            put_u64(&mut buf, entry.keeper_block_height);
            for gindex in &entry.global_output_indexes {
                put_u64(&mut buf, *gindex);
            }
        }

        let mut images: Vec<&KeyImage> = self.spent_key_images.iter().collect();
        images.sort();
        for image in images {
            buf.extend_from_slice(image.as_bytes());
        }

        let mut out_keys: Vec<&OutputIndexKey> = self.outputs.keys().collect();
        out_keys.sort();
        for key in out_keys {
            put_u64(&mut buf, key.0.currency);
            put_u64(&mut buf, key.0.contract_type.as_u64());
            put_u64(&mut buf, key.0.backed_by_currency);
            put_u64(&mut buf, key.1);
            for (tx_id, out_i) in &self.outputs[key] {
                buf.extend_from_slice(tx_id.as_slice());
                put_u64(&mut buf, *out_i as u64);
            }
        }

        for (id, info) in &self.currencies {
            put_u64(&mut buf, *id);
            buf.extend_from_slice(info.description.as_bytes());
            put_u64(&mut buf, info.decimals);
            put_u64(&mut buf, info.total_amount_minted);
            for key in &info.remint_key_history {
                buf.extend_from_slice(key.as_bytes());
            }
        }
        for (id, info) in &self.contracts {
            put_u64(&mut buf, *id);
            buf.extend_from_slice(info.description.as_bytes());
            buf.extend_from_slice(info.grading_key.as_bytes());
            put_u64(&mut buf, u64::from(info.fee_scale));
            put_u64(&mut buf, info.expiry_block);
            put_u64(&mut buf, u64::from(info.default_grade));
            put_u64(&mut buf, u64::from(info.is_graded));
            put_u64(&mut buf, u64::from(info.grade));
            // an absent per-backing total and a zero one are the same ledger
            for (backing, minted) in info.total_amount_minted.iter().filter(|(_, minted)| **minted > 0) {
                put_u64(&mut buf, *backing);
                put_u64(&mut buf, *minted);
            }
        }
        for (id, info) in &self.delegates {
            put_u64(&mut buf, u64::from(*id));
            buf.extend_from_slice(info.address_as_string.as_bytes());
            put_u64(&mut buf, info.total_votes);
            put_u64(&mut buf, info.processed_blocks);
            put_u64(&mut buf, info.missed_blocks);
            put_u64(&mut buf, info.fees_received);
        }
        for id in &self.top_delegates {
            put_u64(&mut buf, u64::from(*id));
        }
        for id in &self.autovote_delegates {
            put_u64(&mut buf, u64::from(*id));
        }

        let mut voted_images: Vec<&KeyImage> = self.vote_histories.keys().collect();
        voted_images.sort();
        for image in voted_images {
            buf.extend_from_slice(image.as_bytes());
            for instance in &self.vote_histories[image] {
                put_u64(&mut buf, instance.voting_for_height);
                put_u64(&mut buf, instance.expected_vote);
                for (delegate_id, amount) in &instance.votes {
                    put_u64(&mut buf, u64::from(*delegate_id));
                    put_u64(&mut buf, *amount);
                }
            }
        }

        let mut alt_ids: Vec<&BlockHash> = self.alternative_chains.keys().collect();
        alt_ids.sort();
        for id in alt_ids {
            buf.extend_from_slice(id.as_slice());
            put_u64(&mut buf, self.alternative_chains[id].height);
        }
        let mut invalid_ids: Vec<&BlockHash> = self.invalid_blocks.keys().collect();
        invalid_ids.sort();
        for id in invalid_ids {
            buf.extend_from_slice(id.as_slice());
        }

        cn_fast_hash(&buf)
    }

    // -- delegate rankings ----------------------------------------------------------------------

    /// Rebuilds `top_delegates` and `autovote_delegates` and refreshes every delegate's cached
    /// ranks. Runs after every block apply and pop; a failure rejects the enclosing block.
    pub(super) fn recalculate_top_delegates(&mut self, rules: &ConsensusConstants) -> Result<(), ChainStorageError> {
        let max_vote = rules.vote_cap();
        for (id, info) in &self.delegates {
            if info.total_votes > max_vote {
                return Err(ChainStorageError::CorruptedState(format!(
                    "delegate {id} exceeds the vote cap"
                )));
            }
        }

        self.top_delegates.clear();
        self.autovote_delegates.clear();
        if self.delegates.is_empty() {
            return Ok(());
        }

        let mut ids: Vec<DelegateId> = self.delegates.keys().copied().collect();

        // by votes, address string and id ascending as tie-breaks
        ids.sort_by(|a, b| {
            let a_info = &self.delegates[a];
            let b_info = &self.delegates[b];
            b_info
                .total_votes
                .cmp(&a_info.total_votes)
                .then_with(|| a_info.address_as_string.cmp(&b_info.address_as_string))
                .then_with(|| a_info.delegate_id.cmp(&b_info.delegate_id))
        });
        for (rank, id) in ids.iter().enumerate() {
            if let Some(info) = self.delegates.get_mut(id) {
                info.cached_vote_rank = rank as u64;
            }
        }
        for id in ids.iter().take(rules.dpos_num_delegates) {
            self.top_delegates.insert(*id);
            debug!(
                target: LOG_TARGET,
                "Top delegate: {} with {} votes", id, self.delegates[id].total_votes
            );
        }

        // by uptime-weighted score for the autovote set
        ids.sort_by(|a, b| {
            let a_info = &self.delegates[a];
            let b_info = &self.delegates[b];
            let a_score = autoselect_score(a_info.total_votes, a_info.processed_blocks, a_info.missed_blocks);
            let b_score = autoselect_score(b_info.total_votes, b_info.processed_blocks, b_info.missed_blocks);
            b_score
                .cmp(&a_score)
                .then_with(|| a_info.address_as_string.cmp(&b_info.address_as_string))
                .then_with(|| a_info.delegate_id.cmp(&b_info.delegate_id))
        });
        for (rank, id) in ids.iter().enumerate() {
            if let Some(info) = self.delegates.get_mut(id) {
                info.cached_autoselect_rank = rank as u64;
            }
        }
        for id in ids.iter().take(rules.dpos_num_delegates) {
            self.autovote_delegates.insert(*id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::{ConsensusConstantsBuilder, Network};
    use xpb_common_types::Address;
    use xpb_crypto::PublicKey;

    fn rules() -> ConsensusConstants {
        ConsensusConstantsBuilder::new(Network::LocalNet)
            .with_dpos_num_delegates(2)
            .build()
    }

    fn delegate(id: DelegateId, votes: u64, processed: u64, missed: u64) -> DelegateInfo {
        let mut info = DelegateInfo::new(id, Address::new(PublicKey([id as u8; 32]), PublicKey([0u8; 32])));
        info.total_votes = votes;
        info.processed_blocks = processed;
        info.missed_blocks = missed;
        info
    }

    #[test]
    fn top_delegates_are_ranked_by_votes() {
        let rules = rules();
        let mut state = LedgerState::new();
        for info in [delegate(1, 50, 0, 0), delegate(2, 100, 0, 0), delegate(3, 75, 0, 0)] {
            state.delegates.insert(info.delegate_id, info);
        }
        state.recalculate_top_delegates(&rules).unwrap();
        assert_eq!(state.top_delegates, [2u16, 3].into_iter().collect());
        assert_eq!(state.delegates[&2].cached_vote_rank, 0);
        assert_eq!(state.delegates[&3].cached_vote_rank, 1);
        assert_eq!(state.delegates[&1].cached_vote_rank, 2);
    }

    #[test]
    fn autovote_prefers_reliable_delegates() {
        let rules = rules();
        let mut state = LedgerState::new();
        // delegate 2 has more votes but misses most blocks
        for info in [delegate(1, 80, 100, 0), delegate(2, 100, 5, 95), delegate(3, 10, 0, 0)] {
            state.delegates.insert(info.delegate_id, info);
        }
        state.recalculate_top_delegates(&rules).unwrap();
        assert!(state.autovote_delegates.contains(&1));
        assert_eq!(state.top_delegates, [1u16, 2].into_iter().collect());
    }

    #[test]
    fn vote_apply_and_unapply_round_trip() {
        let rules = rules();
        let mut state = LedgerState::new();
        state.delegates.insert(4, delegate(4, 0, 0, 0));
        state.delegates.insert(9, delegate(9, 10, 0, 0));

        let voted: BTreeSet<DelegateId> = [4u16, 9].into_iter().collect();
        let instance = state.apply_votes(&rules, 500, &voted).unwrap();
        assert_eq!(instance.expected_vote, 500);
        assert_eq!(state.delegates[&4].total_votes, 500);
        assert_eq!(state.delegates[&9].total_votes, 510);

        state.unapply_votes(&rules, &instance, true).unwrap();
        assert_eq!(state.delegates[&4].total_votes, 0);
        assert_eq!(state.delegates[&9].total_votes, 10);

        state.reapply_votes(&rules, &instance).unwrap();
        assert_eq!(state.delegates[&4].total_votes, 500);
    }

    #[test]
    fn ties_break_on_address_then_id() {
        let rules = rules();
        let mut state = LedgerState::new();
        for info in [delegate(5, 100, 0, 0), delegate(2, 100, 0, 0), delegate(9, 100, 0, 0)] {
            state.delegates.insert(info.delegate_id, info);
        }
        state.recalculate_top_delegates(&rules).unwrap();
        // equal votes: the two smallest address strings win deterministically
        let expected: BTreeSet<DelegateId> = {
            let mut ids: Vec<DelegateId> = vec![2, 5, 9];
            ids.sort_by(|a, b| {
                state.delegates[a]
                    .address_as_string
                    .cmp(&state.delegates[b].address_as_string)
                    .then_with(|| a.cmp(b))
            });
            ids.into_iter().take(2).collect()
        };
        assert_eq!(state.top_delegates, expected);
    }
}
