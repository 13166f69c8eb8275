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

//! The blockchain database: one writer, many readers, every mutation reversible.
//!
//! Blocks extending the tip are applied directly; blocks forking below it grow alternative
//! chains, and an alternative chain takes over when it carries a checkpoint the main chain lacks
//! or strictly more cumulative work. Switching pops to the fork point and replays, rolling back
//! completely if any alternative block fails.

use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, error, info, warn};
use rand::Rng;
use xpb_common_types::{Address, BlockHash, DelegateId, TxHash};
use xpb_crypto::KeyImage;

use crate::{
    blocks::{generate_genesis_block, Block, DPOS_BLOCK_MAJOR_VERSION, DPOS_BLOCK_MINOR_VERSION, POW_BLOCK_MAJOR_VERSION, POW_BLOCK_MINOR_VERSION},
    chain_storage::{
        apply::add_transaction_from_block,
        checkpoints::Checkpoints,
        entries::{AltBlockInfo, BlockAddResult, BlockExtendedInfo},
        error::ChainStorageError,
        ledger_state::LedgerState,
        registries::{ContractInfo, CurrencyInfo, DelegateInfo, VoteInstance},
        store,
        undo::purge_block_data_from_blockchain,
        validation::ValidationError,
    },
    consensus::{ConsensusConstants, ConsensusManager},
    mempool::Mempool,
    proof_of_work::{next_difficulty, Difficulty},
    transactions::{construct_miner_tx, get_tx_fee, Transaction},
};

const LOG_TARGET: &str = "c::cs::database";

fn current_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default)]
pub struct BlockchainDatabaseConfig {
    /// Directory for the persisted ledger snapshot. `None` keeps everything in memory.
    pub data_dir: Option<std::path::PathBuf>,
}

/// Thread-safe handle to the ledger. Clones share the same state.
#[derive(Clone)]
pub struct BlockchainDatabase {
    state: Arc<RwLock<LedgerState>>,
    checkpoints: Arc<RwLock<Checkpoints>>,
    consensus: ConsensusManager,
    config: BlockchainDatabaseConfig,
}

impl BlockchainDatabase {
    /// Opens (or creates) the blockchain. A fresh database generates and applies the genesis
    /// block through the ordinary validation path.
    pub fn new(config: BlockchainDatabaseConfig, consensus: ConsensusManager) -> Result<Self, ChainStorageError> {
        let loaded = match &config.data_dir {
            Some(dir) => store::load_ledger(dir)?,
            None => None,
        };
        let db = BlockchainDatabase {
            state: Arc::new(RwLock::new(loaded.unwrap_or_default())),
            checkpoints: Arc::new(RwLock::new(Checkpoints::new())),
            consensus,
            config,
        };

        if db.read()?.height() == 0 {
            info!(target: LOG_TARGET, "No stored blockchain found, generating the genesis block");
            let genesis = generate_genesis_block(db.rules())?;
            let result = db.add_block(genesis, Vec::new())?;
            if !result.is_added() {
                return Err(ChainStorageError::CorruptedState(
                    "failed to add the genesis block".into(),
                ));
            }
        }
        {
            let mut state = db.write()?;
            let rules = db.rules();
            state.recalculate_top_delegates(rules)?;
        }
        info!(
            target: LOG_TARGET,
            "Blockchain initialized, height {}, tip {}",
            db.read()?.height(),
            db.read()?.tail_id()
        );
        Ok(db)
    }

    pub fn rules(&self) -> &ConsensusConstants {
        self.consensus.consensus_constants()
    }

    pub fn consensus_manager(&self) -> &ConsensusManager {
        &self.consensus
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, ChainStorageError> {
        self.state.read().map_err(|_| ChainStorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, LedgerState>, ChainStorageError> {
        self.state.write().map_err(|_| ChainStorageError::LockPoisoned)
    }

    /// Registers a checkpoint. Alternative chains containing it will force a reorganization.
    pub fn add_checkpoint(&self, height: u64, id: BlockHash) -> Result<(), ChainStorageError> {
        self.checkpoints
            .write()
            .map_err(|_| ChainStorageError::LockPoisoned)?
            .add_checkpoint(height, id);
        Ok(())
    }

    // -- submission -----------------------------------------------------------------------------

    /// Submits a block together with the bodies of its listed transactions, in list order.
    pub fn add_block(&self, block: Block, transactions: Vec<Transaction>) -> Result<BlockAddResult, ChainStorageError> {
        let id = block.hash();
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|_| ChainStorageError::LockPoisoned)?
            .clone();
        let mut state = self.write()?;

        if state.have_block(&id) {
            debug!(target: LOG_TARGET, "Block {} already exists", id);
            return Ok(BlockAddResult::AlreadyExists);
        }

        if block.header.prev_id != state.tail_id() {
            return handle_alternative_block(&mut state, self.rules(), &checkpoints, block, transactions, id);
        }

        let height =
            handle_block_to_main_chain(&mut state, self.rules(), &checkpoints, &block, &transactions, current_time())?;
        Ok(BlockAddResult::Ok(height))
    }

    /// Validates a free transaction against the current chain tip. Returns the newest block
    /// height any of its ring members reference.
    pub fn validate_tx(&self, tx: &Transaction) -> Result<u64, ChainStorageError> {
        let state = self.read()?;
        let checkpoints = self
            .checkpoints
            .read()
            .map_err(|_| ChainStorageError::LockPoisoned)?;
        let in_zone = checkpoints.is_in_checkpoint_zone(state.height());
        Ok(state.validate_tx(self.rules(), tx, false, current_time(), in_zone)?)
    }

    // -- templates ------------------------------------------------------------------------------

    /// Builds a block template over the mempool's best transactions. For a DPoS template the
    /// signing delegate is filled in from the schedule; the caller signs the block.
    pub fn create_block_template(
        &self,
        mempool: &Mempool,
        miner_address: &Address,
        dpos_block: bool,
        extra_nonce: &[u8],
    ) -> Result<(Block, Difficulty, u64), ChainStorageError> {
        let rules = self.rules();
        let mut block = Block::default();
        let (height, median_size, already_generated_coins, prev_timestamp, difficulty) = {
            let state = self.read()?;
            if state.popping_block() {
                return Err(ChainStorageError::CorruptedState(
                    "cannot build a template while popping a block".into(),
                ));
            }
            let height = state.height();
            if rules.in_dpos_era(height) != dpos_block {
                return Err(ChainStorageError::Validation(ValidationError::WrongBlockType));
            }
            block.header.prev_id = state.tail_id();
            (
                height,
                state.cumulative_size_limit() / 2,
                state.already_generated_coins(),
                state.tip_timestamp(),
                state.get_difficulty_for_next_block(rules),
            )
        };
        block.header.major_version = if dpos_block { DPOS_BLOCK_MAJOR_VERSION } else { POW_BLOCK_MAJOR_VERSION };
        block.header.minor_version = if dpos_block { DPOS_BLOCK_MINOR_VERSION } else { POW_BLOCK_MINOR_VERSION };
        block.header.timestamp = current_time();

        if dpos_block && block.header.timestamp < prev_timestamp + rules.dpos_min_block_spacing {
            return Err(ChainStorageError::Validation(ValidationError::TimestampTooClose));
        }

        // fills tx_hashes; the pool lock is taken before any chain access, never the reverse
        let (txs_size, pow_fee) = mempool
            .fill_block_template(&mut block, median_size, already_generated_coins)
            .map_err(|e| ChainStorageError::MempoolError(e.to_string()))?;

        let fee = if dpos_block {
            self.read()?.average_past_block_fees(height)?
        } else {
            pow_fee
        };

        if dpos_block {
            let state = self.read()?;
            let prev = state
                .get_block_by_hash(&block.header.prev_id)
                .ok_or(ChainStorageError::Validation(ValidationError::PrevBlockNotFound))?;
            block.signing_delegate_id = state.get_signing_delegate(rules, &prev, block.header.timestamp)?;
        }

        // two-phase sizing: build with an estimate, rebuild until the coinbase fits exactly
        block.miner_tx = construct_miner_tx(
            rules,
            height,
            median_size,
            already_generated_coins,
            txs_size,
            fee,
            miner_address,
            extra_nonce,
            11,
        )
        .map_err(|e| ChainStorageError::CorruptedState(e.to_string()))?;
        let mut cumulative_size = txs_size + block.miner_tx.blob_size();
        for _ in 0..10 {
            block.miner_tx = construct_miner_tx(
                rules,
                height,
                median_size,
                already_generated_coins,
                cumulative_size,
                fee,
                miner_address,
                extra_nonce,
                11,
            )
            .map_err(|e| ChainStorageError::CorruptedState(e.to_string()))?;
            let coinbase_size = block.miner_tx.blob_size();
            if txs_size + coinbase_size > cumulative_size {
                cumulative_size = txs_size + coinbase_size;
                continue;
            }
            if coinbase_size < cumulative_size - txs_size {
                let padding = cumulative_size - txs_size - coinbase_size;
                block
                    .miner_tx
                    .prefix
                    .extra
                    .extend(std::iter::repeat(0u8).take(padding as usize));
            }
            return Ok((block, difficulty, height));
        }
        Err(ChainStorageError::CorruptedState(
            "failed to size the miner transaction".into(),
        ))
    }

    // -- accessors ------------------------------------------------------------------------------

    pub fn height(&self) -> Result<u64, ChainStorageError> {
        Ok(self.read()?.height())
    }

    pub fn tail_id(&self) -> Result<BlockHash, ChainStorageError> {
        Ok(self.read()?.tail_id())
    }

    pub fn block_id_by_height(&self, height: u64) -> Result<Option<BlockHash>, ChainStorageError> {
        Ok(self.read()?.block_id_by_height(height))
    }

    pub fn get_block_by_hash(&self, id: &BlockHash) -> Result<Option<Block>, ChainStorageError> {
        Ok(self.read()?.get_block_by_hash(id))
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, ChainStorageError> {
        Ok(self.read()?.block_by_height(height))
    }

    pub fn get_block_extended_info(&self, height: u64) -> Result<Option<BlockExtendedInfo>, ChainStorageError> {
        Ok(self.read()?.block_extended_info(height))
    }

    pub fn have_block(&self, id: &BlockHash) -> Result<bool, ChainStorageError> {
        Ok(self.read()?.have_block(id))
    }

    pub fn have_tx(&self, id: &TxHash) -> Result<bool, ChainStorageError> {
        Ok(self.read()?.have_tx(id))
    }

    pub fn get_tx(&self, id: &TxHash) -> Result<Option<Transaction>, ChainStorageError> {
        Ok(self.read()?.get_tx(id))
    }

    pub fn get_tx_outputs_gindexs(&self, id: &TxHash) -> Result<Option<Vec<u64>>, ChainStorageError> {
        Ok(self.read()?.tx_output_gindexs(id))
    }

    pub fn is_key_image_spent(&self, key_image: &KeyImage) -> Result<bool, ChainStorageError> {
        Ok(self.read()?.is_key_image_spent(key_image))
    }

    /// The wallet-finalization hook: the sequence number the next vote from this image must use.
    pub fn next_vote_seq(&self, key_image: &KeyImage) -> Result<u64, ChainStorageError> {
        Ok(self.read()?.next_vote_seq(key_image))
    }

    pub fn vote_history(&self, key_image: &KeyImage) -> Result<Vec<VoteInstance>, ChainStorageError> {
        Ok(self.read()?.vote_history(key_image))
    }

    pub fn currency_info(&self, currency: u64) -> Result<Option<CurrencyInfo>, ChainStorageError> {
        Ok(self.read()?.currency_info(currency))
    }

    pub fn contract_info(&self, contract: u64) -> Result<Option<ContractInfo>, ChainStorageError> {
        Ok(self.read()?.contract_info(contract))
    }

    pub fn delegate_info(&self, delegate_id: DelegateId) -> Result<Option<DelegateInfo>, ChainStorageError> {
        Ok(self.read()?.delegate_info(delegate_id))
    }

    pub fn delegate_infos(&self) -> Result<Vec<DelegateInfo>, ChainStorageError> {
        Ok(self.read()?.delegate_infos())
    }

    pub fn top_delegates(&self) -> Result<BTreeSet<DelegateId>, ChainStorageError> {
        Ok(self.read()?.top_delegates_set())
    }

    pub fn autovote_delegates(&self) -> Result<BTreeSet<DelegateId>, ChainStorageError> {
        Ok(self.read()?.autovote_delegates_set())
    }

    pub fn output_count(&self, coin_type: crate::transactions::CoinType, amount: u64) -> Result<u64, ChainStorageError> {
        Ok(self.read()?.output_count(coin_type, amount))
    }

    pub fn alternative_blocks_count(&self) -> Result<usize, ChainStorageError> {
        Ok(self.read()?.alternative_chains_len())
    }

    pub fn alternative_blocks(&self) -> Result<Vec<Block>, ChainStorageError> {
        Ok(self.read()?.alternative_blocks_list())
    }

    pub fn invalid_blocks_count(&self) -> Result<usize, ChainStorageError> {
        Ok(self.read()?.invalid_blocks_len())
    }

    pub fn get_difficulty_for_next_block(&self) -> Result<Difficulty, ChainStorageError> {
        Ok(self.read()?.get_difficulty_for_next_block(self.rules()))
    }

    pub fn average_past_block_fees(&self, for_block_height: u64) -> Result<u64, ChainStorageError> {
        self.read()?.average_past_block_fees(for_block_height)
    }

    /// A random unused delegate id and the current registration fee floor.
    pub fn get_dpos_register_info(&self) -> Result<(DelegateId, u64), ChainStorageError> {
        let state = self.read()?;
        let mut rng = rand::thread_rng();
        let start: u32 = rng.gen_range(1..=u32::from(u16::MAX));
        let mut candidate = start as u16;
        let unused = loop {
            if !state.has_delegate(candidate) && candidate != 0 {
                break candidate;
            }
            candidate = candidate.wrapping_add(1);
            if u32::from(candidate) == start {
                return Err(ChainStorageError::CorruptedState("no unused delegate ids left".into()));
            }
        };
        let average = state.average_past_block_fees(state.height())?;
        let rules = self.rules();
        let fee = (average.saturating_mul(rules.dpos_registration_fee_multiple)).max(rules.dpos_min_registration_fee);
        Ok((unused, fee))
    }

    pub fn already_generated_coins(&self) -> Result<u64, ChainStorageError> {
        Ok(self.read()?.already_generated_coins())
    }

    /// The base reward of the next block at the given cumulative size, and the rolling-average
    /// fee reward a DPoS block would pay. Mining front-ends need both.
    pub fn block_reward_info(&self, cumulative_block_size: u64) -> Result<(u64, u64), ChainStorageError> {
        let state = self.read()?;
        let rules = self.rules();
        let sizes = state.get_last_n_blocks_sizes(rules.reward_blocks_window);
        let base = crate::consensus::get_block_reward(
            rules,
            crate::consensus::median(sizes),
            cumulative_block_size,
            state.already_generated_coins(),
            state.height(),
        )
        .ok_or(ChainStorageError::Validation(ValidationError::BlockTooBig))?;
        let average_fee = state.average_past_block_fees(state.height())?;
        Ok((base, average_fee))
    }

    /// The delegate scheduled to sign a block with `timestamp` on top of `prev_block`.
    pub fn signing_delegate(&self, prev_block: &Block, timestamp: u64) -> Result<DelegateId, ChainStorageError> {
        Ok(self.read()?.get_signing_delegate(self.rules(), prev_block, timestamp)?)
    }

    /// Removes the tip block, undoing its effects exactly. The returned transactions can be
    /// offered back to the mempool.
    pub fn pop_block(&self) -> Result<(Block, Vec<Transaction>), ChainStorageError> {
        let mut state = self.write()?;
        pop_block_from_blockchain(&mut state, self.rules())
    }

    /// A canonical digest of the whole ledger, for consistency audits.
    pub fn state_digest(&self) -> Result<[u8; 32], ChainStorageError> {
        Ok(self.read()?.canonical_digest())
    }

    // -- persistence ----------------------------------------------------------------------------

    /// Serializes the whole ledger and atomically replaces the data file.
    pub fn store_blockchain(&self) -> Result<(), ChainStorageError> {
        let dir = match &self.config.data_dir {
            Some(dir) => dir.clone(),
            None => return Ok(()),
        };
        let state = self.read()?;
        store::store_ledger(&state, &dir)?;
        info!(target: LOG_TARGET, "Blockchain stored at height {}", state.height());
        Ok(())
    }
}

// -- small LedgerState helpers used by the database layer ---------------------------------------

impl LedgerState {
    pub(super) fn popping_block(&self) -> bool {
        self.popping_block
    }

    pub(super) fn cumulative_size_limit(&self) -> u64 {
        self.current_block_cumul_sz_limit
    }

    pub(super) fn already_generated_coins(&self) -> u64 {
        self.blocks.last().map(|bei| bei.already_generated_coins).unwrap_or(0)
    }

    pub(super) fn tip_timestamp(&self) -> u64 {
        self.blocks.last().map(|bei| bei.block.header.timestamp).unwrap_or(0)
    }

    fn block_by_height(&self, height: u64) -> Option<Block> {
        self.blocks.get(height as usize).map(|bei| bei.block.clone())
    }

    fn block_extended_info(&self, height: u64) -> Option<BlockExtendedInfo> {
        self.blocks.get(height as usize).cloned()
    }

    fn get_tx(&self, id: &TxHash) -> Option<Transaction> {
        self.transactions.get(id).map(|entry| entry.tx.clone())
    }

    fn tx_output_gindexs(&self, id: &TxHash) -> Option<Vec<u64>> {
        self.transactions.get(id).map(|entry| entry.global_output_indexes.clone())
    }

    fn vote_history(&self, key_image: &KeyImage) -> Vec<VoteInstance> {
        self.vote_histories.get(key_image).cloned().unwrap_or_default()
    }

    fn currency_info(&self, currency: u64) -> Option<CurrencyInfo> {
        self.currencies.get(&currency).cloned()
    }

    fn contract_info(&self, contract: u64) -> Option<ContractInfo> {
        self.contracts.get(&contract).cloned()
    }

    fn delegate_info(&self, delegate_id: DelegateId) -> Option<DelegateInfo> {
        self.delegates.get(&delegate_id).cloned()
    }

    fn delegate_infos(&self) -> Vec<DelegateInfo> {
        self.delegates.values().cloned().collect()
    }

    fn has_delegate(&self, delegate_id: DelegateId) -> bool {
        self.delegates.contains_key(&delegate_id)
    }

    fn top_delegates_set(&self) -> BTreeSet<DelegateId> {
        self.top_delegates.clone()
    }

    fn autovote_delegates_set(&self) -> BTreeSet<DelegateId> {
        self.autovote_delegates.clone()
    }

    fn alternative_chains_len(&self) -> usize {
        self.alternative_chains.len()
    }

    fn alternative_blocks_list(&self) -> Vec<Block> {
        self.alternative_chains.values().map(|alt| alt.block.clone()).collect()
    }

    fn blocks_from(&self, height: u64) -> Vec<Block> {
        self.blocks[(height as usize).min(self.blocks.len())..]
            .iter()
            .map(|bei| bei.block.clone())
            .collect()
    }

    fn invalid_blocks_len(&self) -> usize {
        self.invalid_blocks.len()
    }

    /// Difficulty the next main-chain block must meet.
    pub(super) fn get_difficulty_for_next_block(&self, rules: &ConsensusConstants) -> Difficulty {
        if rules.in_dpos_era(self.height()) {
            return rules.dpos_block_difficulty;
        }
        let mut offset = self
            .blocks
            .len()
            .saturating_sub(rules.difficulty_blocks_count);
        if offset == 0 && !self.blocks.is_empty() {
            offset = 1; // skip the genesis block
        }
        let mut timestamps = Vec::new();
        let mut cumulative_difficulties = Vec::new();
        for bei in &self.blocks[offset.min(self.blocks.len())..] {
            timestamps.push(bei.block.header.timestamp);
            cumulative_difficulties.push(bei.cumulative_difficulty);
        }
        next_difficulty(rules, timestamps, cumulative_difficulties, self.height())
    }

    /// Difficulty for the next block of an alternative chain, mixing main-chain samples below the
    /// fork point with the alternative blocks themselves.
    fn get_next_difficulty_for_alternative_chain(
        &self,
        rules: &ConsensusConstants,
        alt_chain: &[BlockHash],
        height: u64,
    ) -> Difficulty {
        if rules.in_dpos_era(height) {
            return rules.dpos_block_difficulty;
        }
        let mut timestamps = Vec::new();
        let mut cumulative_difficulties = Vec::new();
        if alt_chain.len() < rules.difficulty_blocks_count {
            let stop = alt_chain
                .first()
                .and_then(|id| self.alternative_chains.get(id))
                .map(|alt| alt.height)
                .unwrap_or(height);
            let count = (rules.difficulty_blocks_count - alt_chain.len()).min(stop as usize);
            let mut start = stop - count as u64;
            if start == 0 {
                start = 1; // skip the genesis block
            }
            for h in start..stop {
                timestamps.push(self.blocks[h as usize].block.header.timestamp);
                cumulative_difficulties.push(self.blocks[h as usize].cumulative_difficulty);
            }
        }
        for id in alt_chain.iter().rev().take(rules.difficulty_blocks_count).rev() {
            if let Some(alt) = self.alternative_chains.get(id) {
                timestamps.push(alt.block.header.timestamp);
                cumulative_difficulties.push(alt.cumulative_difficulty);
            }
        }
        let len = timestamps.len();
        if len > rules.difficulty_blocks_count {
            timestamps.drain(..len - rules.difficulty_blocks_count);
            cumulative_difficulties.drain(..len - rules.difficulty_blocks_count);
        }
        next_difficulty(rules, timestamps, cumulative_difficulties, height)
    }
}

// -- block application --------------------------------------------------------------------------

/// Applies a block on top of the current tip. On any failure every partial mutation is unwound
/// and the state is exactly as before the call.
pub(super) fn handle_block_to_main_chain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    checkpoints: &Checkpoints,
    block: &Block,
    transactions: &[Transaction],
    now: u64,
) -> Result<u64, ChainStorageError> {
    let id = block.hash();
    let height = state.height();

    state.check_block_timestamp_main(rules, block, height, now)?;
    state.check_block_type(rules, block, height)?;

    let current_difficulty = state.get_difficulty_for_next_block(rules);
    let mut proof_of_work = None;
    if !checkpoints.is_in_checkpoint_zone(height) {
        proof_of_work = state.check_pow_pos(rules, block, current_difficulty)?;
    } else {
        let (passes, _) = checkpoints.check_block(height, &id);
        if !passes {
            return Err(ValidationError::CheckpointMismatch.into());
        }
    }

    state.prevalidate_miner_transaction(rules, block, height)?;

    let miner_tx_id = block.miner_tx.hash();
    let coinbase_blob_size = block.miner_tx.blob_size();
    let mut cumulative_block_size = coinbase_blob_size;

    state.validate_tx(rules, &block.miner_tx, true, now, checkpoints.is_in_checkpoint_zone(height))?;
    add_transaction_from_block(state, rules, &block.miner_tx, miner_tx_id, &id, height)?;

    if transactions.len() != block.tx_hashes.len() {
        purge_block_data_from_blockchain(state, rules, block, 0)?;
        return Err(ChainStorageError::TransactionMismatch(id));
    }

    let mut fee_summary = 0u64;
    let mut tx_processed_count = 0usize;
    for (tx_id, tx) in block.tx_hashes.iter().zip(transactions) {
        if tx.hash() != *tx_id {
            purge_block_data_from_blockchain(state, rules, block, tx_processed_count)?;
            return Err(ChainStorageError::TransactionMismatch(*tx_id));
        }
        if let Err(e) = state.validate_tx(rules, tx, false, now, checkpoints.is_in_checkpoint_zone(height)) {
            warn!(
                target: LOG_TARGET,
                "Block {} contains invalid transaction {}: {}", id, tx_id, e
            );
            purge_block_data_from_blockchain(state, rules, block, tx_processed_count)?;
            // the seal was already verified, so remembering this block as bad is DoS-safe
            state.invalid_blocks.insert(id, AltBlockInfo {
                block: block.clone(),
                transactions: transactions.to_vec(),
                height,
                cumulative_difficulty: current_difficulty,
            });
            return Err(e.into());
        }
        if let Err(e) = add_transaction_from_block(state, rules, tx, *tx_id, &id, height) {
            purge_block_data_from_blockchain(state, rules, block, tx_processed_count)?;
            return Err(e);
        }
        fee_summary += get_tx_fee(tx);
        cumulative_block_size += tx.blob_size();
        tx_processed_count += 1;
    }

    // in the DPoS era the sealing delegate is paid the rolling average instead of this block's
    // own fees
    let fee_reward = if block.is_pow_block() {
        fee_summary
    } else {
        state.average_past_block_fees(height)?
    };
    let already_generated_coins = state.already_generated_coins();
    let base_reward = match state.validate_miner_transaction(rules, block, cumulative_block_size, fee_reward, already_generated_coins) {
        Ok(base_reward) => base_reward,
        Err(e) => {
            purge_block_data_from_blockchain(state, rules, block, tx_processed_count)?;
            return Err(e.into());
        },
    };

    let cumulative_difficulty = state
        .blocks
        .last()
        .map(|bei| bei.cumulative_difficulty)
        .unwrap_or(0) +
        current_difficulty;
    state.blocks_index.insert(id, height);
    state.blocks.push(BlockExtendedInfo {
        block: block.clone(),
        height,
        block_cumulative_size: cumulative_block_size,
        cumulative_difficulty,
        already_generated_coins: already_generated_coins + base_reward,
    });

    // missed/processed slot accounting; skipped for non-DPoS and the first DPoS block
    if state.blocks.len() > 2 {
        let block_prev = state.blocks[state.blocks.len() - 2].block.clone();
        if block.is_dpos_block() && block_prev.is_dpos_block() {
            let slots = crate::dpos::elapsed_slots(
                block_prev.header.timestamp,
                block.header.timestamp,
                rules.dpos_delegate_slot_time,
            );
            let prev_delegate = block_prev.signing_delegate_id;
            for i in 0..slots {
                let missed = crate::dpos::nth_sorted_item_after(&state.top_delegates, prev_delegate.wrapping_add(1), i);
                if let Some(info) = state.delegates.get_mut(&missed) {
                    info.missed_blocks += 1;
                    debug!(target: LOG_TARGET, "Delegate {} missed a block", missed);
                }
            }
            if let Some(info) = state.delegates.get_mut(&block.signing_delegate_id) {
                info.processed_blocks += 1;
                info.fees_received = info.fees_received.saturating_add(fee_reward);
            }
        }
    }

    if let Err(e) = state.recalculate_top_delegates(rules) {
        error!(target: LOG_TARGET, "Block {} resulted in an invalid delegate tally: {}", id, e);
        undo_delegate_block_stats(state, rules, block, fee_reward);
        state.blocks.pop();
        state.blocks_index.remove(&id);
        purge_block_data_from_blockchain(state, rules, block, tx_processed_count)?;
        return Err(e);
    }

    state.update_next_cumulative_size_limit(rules);
    info!(
        target: LOG_TARGET,
        "+++++ BLOCK ADDED: height {}, id {}, difficulty {}, reward {} (+{} fees), {} tx(s){}",
        height,
        id,
        current_difficulty,
        base_reward,
        fee_reward,
        block.tx_hashes.len(),
        proof_of_work.map(|h| format!(", PoW {h}")).unwrap_or_default()
    );
    Ok(height)
}

fn undo_delegate_block_stats(state: &mut LedgerState, rules: &ConsensusConstants, block: &Block, fee_reward: u64) {
    if state.blocks.len() <= 2 {
        return;
    }
    let block_prev = state.blocks[state.blocks.len() - 2].block.clone();
    if !(block.is_dpos_block() && block_prev.is_dpos_block()) {
        return;
    }
    let slots = crate::dpos::elapsed_slots(
        block_prev.header.timestamp,
        block.header.timestamp,
        rules.dpos_delegate_slot_time,
    );
    let prev_delegate = block_prev.signing_delegate_id;
    if let Some(info) = state.delegates.get_mut(&block.signing_delegate_id) {
        info.processed_blocks = info.processed_blocks.saturating_sub(1);
        info.fees_received = info.fees_received.saturating_sub(fee_reward);
    }
    for i in 0..slots {
        let missed = crate::dpos::nth_sorted_item_after(&state.top_delegates, prev_delegate.wrapping_add(1), i);
        if let Some(info) = state.delegates.get_mut(&missed) {
            info.missed_blocks = info.missed_blocks.saturating_sub(1);
        }
    }
}

/// Removes the tip block, undoing all its effects. Returns the block and its purged non-coinbase
/// transactions.
pub(super) fn pop_block_from_blockchain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
) -> Result<(Block, Vec<Transaction>), ChainStorageError> {
    if state.blocks.len() <= 1 {
        return Err(ChainStorageError::CannotPopGenesis);
    }
    let block = state.blocks.last().map(|bei| bei.block.clone()).expect("len checked above");
    let id = block.hash();

    state.popping_block = true;
    let result = (|| {
        // the fee reward credited on apply, recomputed before the block's own data is touched
        let fee_reward = if block.is_dpos_block() {
            state.average_past_block_fees(state.height() - 1)?
        } else {
            0
        };

        let purged = purge_block_data_from_blockchain(state, rules, &block, block.tx_hashes.len())?;
        // first recalculation restores the signer set the block's slot accounting ran against;
        // the second refreshes the uptime-weighted ordering once that accounting is undone
        state.recalculate_top_delegates(rules)?;
        undo_delegate_block_stats(state, rules, &block, fee_reward);
        state.recalculate_top_delegates(rules)?;

        if state.blocks_index.remove(&id).is_none() {
            return Err(ChainStorageError::CorruptedState(
                "popped block id missing from the index".into(),
            ));
        }
        state.blocks.pop();
        Ok(purged)
    })();
    state.popping_block = false;

    let purged = result?;
    debug!(target: LOG_TARGET, "Popped block {} from the blockchain", id);
    Ok((block, purged))
}

// -- alternative chains and reorganization ------------------------------------------------------

fn handle_alternative_block(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    checkpoints: &Checkpoints,
    block: Block,
    transactions: Vec<Transaction>,
    id: BlockHash,
) -> Result<BlockAddResult, ChainStorageError> {
    let block_height = match block.height() {
        Some(h) if h > 0 => h,
        _ => return Err(ValidationError::MinerTxWrongInputs.into()),
    };
    if !checkpoints.is_alternative_block_allowed(state.height(), block_height) {
        return Err(ValidationError::AltBlockBelowCheckpoint.into());
    }

    let known_prev =
        state.blocks_index.contains_key(&block.header.prev_id) || state.alternative_chains.contains_key(&block.header.prev_id);
    if !known_prev {
        warn!(
            target: LOG_TARGET,
            "Block {} is orphaned (unknown parent {}), rejected", id, block.header.prev_id
        );
        return Ok(BlockAddResult::OrphanBlock);
    }

    // walk back to the main chain, oldest alternative first
    let mut alt_chain: Vec<BlockHash> = Vec::new();
    let mut timestamps: Vec<u64> = Vec::new();
    let mut cursor = block.header.prev_id;
    while let Some(alt) = state.alternative_chains.get(&cursor) {
        alt_chain.insert(0, cursor);
        timestamps.push(alt.block.header.timestamp);
        cursor = alt.block.header.prev_id;
    }

    let (height, prev_cumulative_difficulty) = if let Some(front) = alt_chain.first() {
        let front_info = &state.alternative_chains[front];
        let connect = state
            .block_id_by_height(front_info.height - 1)
            .ok_or_else(|| ChainStorageError::CorruptedState("alternative chain lost its connection".into()))?;
        if connect != state.alternative_chains[front].block.header.prev_id {
            return Err(ChainStorageError::CorruptedState(
                "alternative chain has the wrong connection to the main chain".into(),
            ));
        }
        state.complete_timestamps_vector(rules, front_info.height - 1, &mut timestamps);
        let head = &state.alternative_chains[&block.header.prev_id];
        (head.height + 1, head.cumulative_difficulty)
    } else {
        let prev_height = state.blocks_index[&block.header.prev_id];
        state.complete_timestamps_vector(rules, prev_height, &mut timestamps);
        (
            prev_height + 1,
            state.blocks[prev_height as usize].cumulative_difficulty,
        )
    };
    if height != block_height {
        return Err(ValidationError::MinerTxWrongHeight {
            expected: height,
            actual: block_height,
        }
        .into());
    }

    state.check_block_timestamp(rules, timestamps, &block, height)?;

    let (passes, is_a_checkpoint) = checkpoints.check_block(height, &id);
    if !passes {
        error!(target: LOG_TARGET, "Checkpoint validation failed for alternative block {}", id);
        return Err(ValidationError::CheckpointMismatch.into());
    }

    state.check_block_type(rules, &block, height)?;

    // always verify proof of work; delegate signatures on alternative chains are taken on trust
    // until a reorganization actually applies them
    let current_difficulty = state.get_next_difficulty_for_alternative_chain(rules, &alt_chain, height);
    if block.is_pow_block() {
        let proof_of_work =
            crate::proof_of_work::get_block_longhash(&block).map_err(|_| ValidationError::MissingLongHash)?;
        if !crate::proof_of_work::check_hash(&proof_of_work, current_difficulty) {
            return Err(ValidationError::DifficultyNotMet(current_difficulty).into());
        }
    }

    state.prevalidate_miner_transaction(rules, &block, height)?;

    if transactions.len() != block.tx_hashes.len() ||
        block.tx_hashes.iter().zip(&transactions).any(|(h, tx)| tx.hash() != *h)
    {
        return Err(ChainStorageError::TransactionMismatch(id));
    }

    let cumulative_difficulty = prev_cumulative_difficulty + current_difficulty;
    state.alternative_chains.insert(id, AltBlockInfo {
        block,
        transactions,
        height,
        cumulative_difficulty,
    });
    alt_chain.push(id);

    let main_cumulative_difficulty = state
        .blocks
        .last()
        .map(|bei| bei.cumulative_difficulty)
        .unwrap_or(0);

    if is_a_checkpoint {
        info!(
            target: LOG_TARGET,
            "###### REORGANIZE forced by checkpoint at height {}, alt chain of {} block(s)",
            height,
            alt_chain.len()
        );
        let split_height = state.alternative_chains[&alt_chain[0]].height;
        let removed = switch_to_alternative_blockchain(state, rules, checkpoints, &alt_chain, true)?;
        let added = state.blocks_from(split_height);
        let new_height = state.height();
        Ok(BlockAddResult::ChainReorg {
            removed,
            added,
            new_height,
        })
    } else if cumulative_difficulty > main_cumulative_difficulty {
        info!(
            target: LOG_TARGET,
            "###### REORGANIZE: alt chain cumulative difficulty {} beats main {} at height {}",
            cumulative_difficulty,
            main_cumulative_difficulty,
            height
        );
        let split_height = state.alternative_chains[&alt_chain[0]].height;
        let removed = switch_to_alternative_blockchain(state, rules, checkpoints, &alt_chain, false)?;
        let added = state.blocks_from(split_height);
        let new_height = state.height();
        Ok(BlockAddResult::ChainReorg {
            removed,
            added,
            new_height,
        })
    } else {
        info!(
            target: LOG_TARGET,
            "----- BLOCK ADDED AS ALTERNATIVE at height {}, id {}, difficulty {}", height, id, current_difficulty
        );
        Ok(BlockAddResult::Alternative)
    }
}

/// Pops to the fork point and replays the alternative chain. On failure the original chain is
/// restored and the failing alternative block (and its descendants) are marked invalid.
fn switch_to_alternative_blockchain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    checkpoints: &Checkpoints,
    alt_chain: &[BlockHash],
    discard_disconnected_chain: bool,
) -> Result<Vec<(Block, Vec<Transaction>)>, ChainStorageError> {
    let first = alt_chain
        .first()
        .ok_or_else(|| ChainStorageError::CorruptedState("empty alternative chain in switch".into()))?;
    let split_height = state.alternative_chains[first].height;
    if state.height() <= split_height {
        return Err(ChainStorageError::CorruptedState(
            "main chain is shorter than the fork point".into(),
        ));
    }

    // disconnect the old tip down to the fork point
    let mut disconnected: Vec<(Block, Vec<Transaction>)> = Vec::new();
    while state.height() > split_height {
        let (block, txs) = pop_block_from_blockchain(state, rules)?;
        disconnected.insert(0, (block, txs));
    }

    // connect the alternative blocks in order
    for (applied, alt_id) in alt_chain.iter().enumerate() {
        let alt = state.alternative_chains[alt_id].clone();
        if let Err(e) = handle_block_to_main_chain(state, rules, checkpoints, &alt.block, &alt.transactions, current_time()) {
            error!(target: LOG_TARGET, "Failed to switch to alternative blockchain: {}", e);
            rollback_blockchain_switching(state, rules, checkpoints, &disconnected, split_height)?;
            for bad_id in &alt_chain[applied..] {
                if let Some(bad) = state.alternative_chains.remove(bad_id) {
                    warn!(target: LOG_TARGET, "Alternative block {} marked invalid", bad_id);
                    state.invalid_blocks.insert(*bad_id, bad);
                }
            }
            return Err(ChainStorageError::ReorgFailed);
        }
    }

    // the ex-main blocks become an alternative chain themselves, unless a checkpoint made them
    // permanently unusable
    if !discard_disconnected_chain {
        for (block, txs) in &disconnected {
            let old_id = block.hash();
            match handle_alternative_block(state, rules, checkpoints, block.clone(), txs.clone(), old_id) {
                Ok(_) => {},
                Err(e) => {
                    error!(
                        target: LOG_TARGET,
                        "Failed to park ex-main block {} as alternative: {}", old_id, e
                    );
                    rollback_blockchain_switching(state, rules, checkpoints, &disconnected, split_height)?;
                    return Err(ChainStorageError::ReorgFailed);
                },
            }
        }
    }

    for alt_id in alt_chain {
        state.alternative_chains.remove(alt_id);
    }

    info!(
        target: LOG_TARGET,
        "REORGANIZE SUCCESS! on height {}, new blockchain size {}",
        split_height,
        state.height()
    );
    Ok(disconnected)
}

/// Restores the original chain after a failed switch: pops whatever was applied and replays the
/// disconnected blocks.
fn rollback_blockchain_switching(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    checkpoints: &Checkpoints,
    original_chain: &[(Block, Vec<Transaction>)],
    rollback_height: u64,
) -> Result<(), ChainStorageError> {
    while state.height() > rollback_height {
        pop_block_from_blockchain(state, rules)?;
    }
    for (block, txs) in original_chain {
        handle_block_to_main_chain(state, rules, checkpoints, block, txs, current_time()).map_err(|e| {
            error!(
                target: LOG_TARGET,
                "PANIC! failed to re-add block while rolling back a chain switch: {}", e
            );
            ChainStorageError::CorruptedState("rollback after a failed reorganization failed".into())
        })?;
    }
    info!(target: LOG_TARGET, "Rollback success");
    Ok(())
}
