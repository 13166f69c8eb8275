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

//! The transaction pool: fee-gated, conflict-checked, and consulted for block templates.
//!
//! Entries cache the newest block their ring members referenced (`max_used_*`) and the tip at
//! which they last failed (`last_failed_*`), so readiness re-checks after a height change are
//! cheap unless a reorganization invalidated the cached reference.
//!
//! Lock order: the pool lock is always taken before any blockchain access, never the reverse.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::{debug, info, warn};
use xpb_common_types::{BlockHash, TxHash};

use crate::{
    blocks::Block,
    chain_storage::BlockchainDatabase,
    consensus::DEFAULT_FEE,
    mempool::{input_compat::InputCompatChecker, MempoolError},
    transactions::{
        check_inputs_outputs,
        check_inputs_types_supported,
        check_outputs_types_supported,
        Transaction,
        TxIn,
    },
};

const LOG_TARGET: &str = "c::mp::mempool";

#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Transactions below this fee are accepted only when re-injected by a popped block.
    pub min_relay_fee: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            min_relay_fee: DEFAULT_FEE,
        }
    }
}

/// The pool's verdict on a submitted transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxVerificationContext {
    pub added_to_pool: bool,
    pub should_be_relayed: bool,
    pub verification_failed: bool,
    /// Set for block-injected transactions that cannot be validated against the current chain.
    pub verification_impossible: bool,
}

#[derive(Debug, Clone)]
struct TxDetails {
    tx: Transaction,
    blob_size: u64,
    fee: u64,
    max_used_block_height: u64,
    max_used_block_id: Option<BlockHash>,
    last_failed_height: u64,
    last_failed_id: Option<BlockHash>,
    kept_by_block: bool,
}

#[derive(Default)]
struct MempoolInner {
    transactions: HashMap<TxHash, TxDetails>,
    /// Insertion order; template filling iterates it.
    order: Vec<TxHash>,
    /// In-flight conflicts across all pooled transactions.
    compat: InputCompatChecker,
}

#[derive(Clone)]
pub struct Mempool {
    inner: Arc<RwLock<MempoolInner>>,
    blockchain: BlockchainDatabase,
    config: MempoolConfig,
}

fn has_grade_input(tx: &Transaction) -> bool {
    tx.prefix.inputs().iter().any(|inp| matches!(inp, TxIn::GradeContract(_)))
}

impl Mempool {
    pub fn new(blockchain: BlockchainDatabase, config: MempoolConfig) -> Self {
        Mempool {
            inner: Arc::new(RwLock::new(MempoolInner::default())),
            blockchain,
            config,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MempoolInner>, MempoolError> {
        self.inner.read().map_err(|_| MempoolError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MempoolInner>, MempoolError> {
        self.inner.write().map_err(|_| MempoolError::LockPoisoned)
    }

    /// Submits a relayed transaction.
    pub fn insert(&self, tx: Transaction) -> Result<TxVerificationContext, MempoolError> {
        self.insert_internal(tx, false)
    }

    /// Re-injects a transaction purged from a popped block. The fee floor does not apply and a
    /// failed chain validation parks it instead of rejecting it.
    pub fn insert_kept_by_block(&self, tx: Transaction) -> Result<TxVerificationContext, MempoolError> {
        self.insert_internal(tx, true)
    }

    fn insert_internal(&self, tx: Transaction, kept_by_block: bool) -> Result<TxVerificationContext, MempoolError> {
        let mut tvc = TxVerificationContext::default();
        let id = tx.hash();
        let blob_size = tx.blob_size();

        if !check_inputs_types_supported(&tx) || !check_outputs_types_supported(&tx) {
            tvc.verification_failed = true;
            return Ok(tvc);
        }
        let fee = match check_inputs_outputs(&tx) {
            Ok((_, _, fee)) => fee,
            Err(e) => {
                debug!(target: LOG_TARGET, "Rejecting tx {}: {}", id, e);
                tvc.verification_failed = true;
                return Ok(tvc);
            },
        };
        if !kept_by_block && fee < self.config.min_relay_fee {
            info!(target: LOG_TARGET, "Not relaying tx {} with fee {}", id, fee);
            return Ok(tvc);
        }

        // pool lock first, chain access second
        let mut inner = self.write()?;
        if inner.transactions.contains_key(&id) {
            return Err(MempoolError::TransactionAlreadyInPool);
        }
        if !inner.compat.can_add_tx(&tx) {
            if kept_by_block {
                // the conflicting claim is already pooled; this copy would never be ready anyway
                warn!(
                    target: LOG_TARGET,
                    "Dropping re-injected tx {} that conflicts with the pool", id
                );
                return Ok(tvc);
            }
            debug!(target: LOG_TARGET, "Tx {} conflicts with pooled transactions", id);
            tvc.verification_failed = true;
            return Ok(tvc);
        }

        let chain_check = self.blockchain.validate_tx(&tx);
        let details = match chain_check {
            Ok(max_used_block_height) => {
                let max_used_block_id = self
                    .blockchain
                    .block_id_by_height(max_used_block_height)?;
                tvc.added_to_pool = true;
                tvc.should_be_relayed = fee >= self.config.min_relay_fee;
                TxDetails {
                    tx: tx.clone(),
                    blob_size,
                    fee,
                    max_used_block_height,
                    max_used_block_id,
                    last_failed_height: 0,
                    last_failed_id: None,
                    kept_by_block,
                }
            },
            Err(e) if kept_by_block => {
                // it referenced state that no longer exists; keep it, it may become valid again
                debug!(target: LOG_TARGET, "Parking block-injected tx {}: {}", id, e);
                tvc.added_to_pool = true;
                tvc.verification_impossible = true;
                TxDetails {
                    tx: tx.clone(),
                    blob_size,
                    fee,
                    max_used_block_height: 0,
                    max_used_block_id: None,
                    last_failed_height: 0,
                    last_failed_id: None,
                    kept_by_block,
                }
            },
            Err(e) => {
                debug!(target: LOG_TARGET, "Tx {} used wrong inputs, rejected: {}", id, e);
                tvc.verification_failed = true;
                return Ok(tvc);
            },
        };

        if !inner.compat.add_tx(&tx) {
            return Err(MempoolError::Internal(format!(
                "compat checker rejected tx {id} it had accepted"
            )));
        }
        inner.transactions.insert(id, details);
        inner.order.push(id);
        debug!(target: LOG_TARGET, "Added tx {} to the pool ({} pooled)", id, inner.transactions.len());
        Ok(tvc)
    }

    pub fn has_tx(&self, id: &TxHash) -> Result<bool, MempoolError> {
        Ok(self.read()?.transactions.contains_key(id))
    }

    pub fn len(&self) -> Result<usize, MempoolError> {
        Ok(self.read()?.transactions.len())
    }

    pub fn is_empty(&self) -> Result<bool, MempoolError> {
        Ok(self.read()?.transactions.is_empty())
    }

    pub fn get_tx(&self, id: &TxHash) -> Result<Option<Transaction>, MempoolError> {
        Ok(self.read()?.transactions.get(id).map(|d| d.tx.clone()))
    }

    /// The bodies for a block's hash list, in order. Fails if any is missing from the pool.
    pub fn retrieve_transactions(&self, hashes: &[TxHash]) -> Result<Vec<Transaction>, MempoolError> {
        let inner = self.read()?;
        hashes
            .iter()
            .map(|id| {
                inner
                    .transactions
                    .get(id)
                    .map(|d| d.tx.clone())
                    .ok_or_else(|| MempoolError::Internal(format!("tx {id} not in the pool")))
            })
            .collect()
    }

    /// Removes a transaction and releases its conflict claims.
    fn take_tx(inner: &mut MempoolInner, id: &TxHash) -> Option<TxDetails> {
        let details = inner.transactions.remove(id)?;
        if !inner.compat.remove_tx(&details.tx) {
            warn!(target: LOG_TARGET, "Could not fully release conflict claims of tx {}", id);
        }
        inner.order.retain(|h| h != id);
        Some(details)
    }

    /// Height-increase callback: drops the transactions the new block confirmed.
    pub fn process_published_block(&self, block: &Block) -> Result<(), MempoolError> {
        let mut inner = self.write()?;
        for tx_id in &block.tx_hashes {
            if Self::take_tx(&mut inner, tx_id).is_some() {
                debug!(target: LOG_TARGET, "Removed published tx {} from the pool", tx_id);
            }
        }
        Ok(())
    }

    /// Reorganization callback: offers every transaction of the disconnected blocks back to the
    /// pool, then drops whatever the new chain confirmed.
    pub fn process_reorg(
        &self,
        removed_blocks: &[(Block, Vec<Transaction>)],
        added_blocks: &[Block],
    ) -> Result<(), MempoolError> {
        for (_, txs) in removed_blocks {
            for tx in txs {
                match self.insert_kept_by_block(tx.clone()) {
                    Ok(_) => {},
                    Err(MempoolError::TransactionAlreadyInPool) => {},
                    Err(e) => return Err(e),
                }
            }
        }
        let mut inner = self.write()?;
        for block in added_blocks {
            for tx_id in &block.tx_hashes {
                Self::take_tx(&mut inner, tx_id);
            }
        }
        Ok(())
    }

    /// Re-checks whether a pooled transaction is still valid to include, using the cached
    /// `max_used`/`last_failed` references to skip full input validation when possible.
    fn is_transaction_ready_to_go(&self, txd: &mut TxDetails) -> Result<bool, MempoolError> {
        let chain_height = self.blockchain.height()?;
        match txd.max_used_block_id {
            None => {
                if let Some(last_failed_id) = txd.last_failed_id {
                    if chain_height > txd.last_failed_height &&
                        self.blockchain.block_id_by_height(txd.last_failed_height)? == Some(last_failed_id)
                    {
                        // still known-broken at this chain
                        return Ok(false);
                    }
                }
            },
            Some(max_used_block_id) => {
                if txd.max_used_block_height >= chain_height {
                    return Ok(false);
                }
                if self.blockchain.block_id_by_height(txd.max_used_block_height)? != Some(max_used_block_id) {
                    // a reorg invalidated the cached reference; skip if the failure is cached too
                    if txd.last_failed_id.is_some() &&
                        self.blockchain.block_id_by_height(txd.last_failed_height)? == txd.last_failed_id
                    {
                        return Ok(false);
                    }
                }
            },
        }

        // there may be conflicts only visible on full validation (e.g. kept-by-block state)
        match self.blockchain.validate_tx(&txd.tx) {
            Ok(max_used_block_height) => {
                txd.max_used_block_height = max_used_block_height;
                txd.max_used_block_id = self.blockchain.block_id_by_height(max_used_block_height)?;
                Ok(true)
            },
            Err(_) => {
                let last_failed_height = chain_height.saturating_sub(1);
                txd.last_failed_height = last_failed_height;
                txd.last_failed_id = self.blockchain.block_id_by_height(last_failed_height)?;
                Ok(false)
            },
        }
    }

    /// Fills a block template from the pool in two passes over insertion order: grading
    /// transactions first so mint/fuse spam cannot squeeze a grading out of the block, then
    /// everything else. Intra-template conflicts are prevented incrementally.
    pub fn fill_block_template(
        &self,
        block: &mut Block,
        median_size: u64,
        _already_generated_coins: u64,
    ) -> Result<(u64, u64), MempoolError> {
        let rules = self.blockchain.rules();
        let max_total_size = (2 * median_size).saturating_sub(rules.coinbase_blob_reserved_size);

        let mut inner = self.write()?;
        let mut total_size = 0u64;
        let mut fee = 0u64;
        let mut template_compat = InputCompatChecker::new();
        let mut added: HashSet<TxHash> = HashSet::new();

        let order = inner.order.clone();
        for pass in 0..2 {
            let only_grading = pass == 0;
            for tx_id in &order {
                if added.contains(tx_id) {
                    continue;
                }
                let Some(txd) = inner.transactions.get_mut(tx_id) else {
                    continue;
                };
                if max_total_size < total_size + txd.blob_size {
                    continue;
                }
                if only_grading && !has_grade_input(&txd.tx) {
                    continue;
                }
                if !self.is_transaction_ready_to_go(txd)? || !template_compat.can_add_tx(&txd.tx) {
                    continue;
                }
                block.tx_hashes.push(*tx_id);
                added.insert(*tx_id);
                total_size += txd.blob_size;
                fee += txd.fee;
                template_compat.add_tx(&txd.tx);
            }
        }
        Ok((total_size, fee))
    }

    /// Debug rendering of the pool, one entry per line.
    pub fn print_pool(&self) -> Result<String, MempoolError> {
        let inner = self.read()?;
        let mut out = String::new();
        for id in &inner.order {
            if let Some(txd) = inner.transactions.get(id) {
                out.push_str(&format!(
                    "id: {}, blob_size: {}, fee: {}, kept_by_block: {}, max_used: {}/{:?}, last_failed: {}/{:?}\n",
                    id,
                    txd.blob_size,
                    txd.fee,
                    txd.kept_by_block,
                    txd.max_used_block_height,
                    txd.max_used_block_id,
                    txd.last_failed_height,
                    txd.last_failed_id,
                ));
            }
        }
        Ok(out)
    }
}
