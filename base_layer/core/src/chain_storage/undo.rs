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

//! Reverse state mutation: purging a committed transaction's effects, input by input, in exactly
//! the opposite order they were applied.
//!
//! Undo is strict: any mismatch between the recorded state and the input being undone means the
//! ledger is corrupt, and the error propagates up to abort the enclosing pop or rollback.

use log::debug;
use xpb_common_types::TxHash;

use crate::{
    chain_storage::{error::ChainStorageError, ledger_state::LedgerState},
    consensus::ConsensusConstants,
    transactions::{
        amount::{add_amount, sub_amount},
        Transaction,
        TxIn,
    },
};

const LOG_TARGET: &str = "c::cs::undo";

pub(super) fn undo_input(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    tx: &Transaction,
    index: usize,
) -> Result<(), ChainStorageError> {
    match &tx.prefix.inputs()[index] {
        TxIn::Coinbase(_) => Ok(()),
        TxIn::Key(inp) => {
            if !state.spent_key_images.remove(&inp.key_image) {
                return Err(ChainStorageError::CorruptedState(format!(
                    "undoing a spend of key image {} that is not marked spent",
                    inp.key_image
                )));
            }
            // restore the vote this image had cast before it was spent
            if let Some(instance) = state.vote_histories.get(&inp.key_image).and_then(|h| h.last()).cloned() {
                state.reapply_votes(rules, &instance)?;
            }
            Ok(())
        },
        TxIn::Mint(inp) => {
            let info = state
                .currencies
                .get(&inp.currency)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing mint of unknown currency {}", inp.currency)))?;
            if info.description != inp.description ||
                info.decimals != inp.decimals ||
                info.total_amount_minted != inp.amount ||
                info.remint_key() != inp.remint_key ||
                info.remint_key_history.len() != 1
            {
                return Err(ChainStorageError::CorruptedState(format!(
                    "currency {} does not match the mint being undone",
                    inp.currency
                )));
            }
            if !inp.description.is_empty() && !state.used_descriptions.remove(&inp.description) {
                return Err(ChainStorageError::CorruptedState(
                    "currency description was not registered".into(),
                ));
            }
            state.currencies.remove(&inp.currency);
            Ok(())
        },
        TxIn::Remint(inp) => {
            let info = state
                .currencies
                .get_mut(&inp.currency)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing remint of unknown currency {}", inp.currency)))?;
            if info.remint_key() != inp.new_remint_key {
                return Err(ChainStorageError::CorruptedState(
                    "currency's active remint key does not match the remint being undone".into(),
                ));
            }
            info.remint_key_history.pop();
            if !sub_amount(&mut info.total_amount_minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(
                    "underflow subtracting reminted amount".into(),
                ));
            }
            Ok(())
        },
        TxIn::CreateContract(inp) => {
            let info = state
                .contracts
                .get(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing creation of unknown contract {}", inp.contract)))?;
            if info.description != inp.description ||
                info.grading_key != inp.grading_key ||
                info.fee_scale != inp.fee_scale ||
                info.expiry_block != inp.expiry_block ||
                info.default_grade != inp.default_grade
            {
                return Err(ChainStorageError::CorruptedState(format!(
                    "contract {} does not match the creation being undone",
                    inp.contract
                )));
            }
            if !info.is_in_initial_state() {
                return Err(ChainStorageError::CorruptedState(format!(
                    "contract {} is not in its initial state while undoing its creation",
                    inp.contract
                )));
            }
            if !inp.description.is_empty() && !state.used_descriptions.remove(&inp.description) {
                return Err(ChainStorageError::CorruptedState(
                    "contract description was not registered".into(),
                ));
            }
            state.contracts.remove(&inp.contract);
            Ok(())
        },
        TxIn::MintContract(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing mint of unknown contract {}", inp.contract)))?;
            let minted = info
                .total_amount_minted
                .get_mut(&inp.backing_currency)
                .ok_or_else(|| ChainStorageError::CorruptedState("undoing a contract mint with no minted total".into()))?;
            if !sub_amount(minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(
                    "underflow subtracting minted contract coins".into(),
                ));
            }
            Ok(())
        },
        TxIn::GradeContract(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing grade of unknown contract {}", inp.contract)))?;
            if !info.is_graded {
                return Err(ChainStorageError::CorruptedState(format!(
                    "contract {} is not graded while undoing its grading",
                    inp.contract
                )));
            }
            info.is_graded = false;
            info.grade = 0;
            Ok(())
        },
        TxIn::ResolveBcCoins(_) => Ok(()),
        TxIn::FuseBcCoins(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("undoing fuse of unknown contract {}", inp.contract)))?;
            let minted = info.total_amount_minted.entry(inp.backing_currency).or_insert(0);
            if !add_amount(minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(
                    "overflow restoring fused contract coins".into(),
                ));
            }
            Ok(())
        },
        TxIn::RegisterDelegate(inp) => {
            if state.delegates.remove(&inp.delegate_id).is_none() {
                return Err(ChainStorageError::CorruptedState(format!(
                    "undoing registration of unknown delegate {}",
                    inp.delegate_id
                )));
            }
            Ok(())
        },
        TxIn::Vote(inp) => {
            let history_len = state
                .vote_histories
                .get(&inp.ink.key_image)
                .map(|h| h.len())
                .unwrap_or(0);
            if history_len == 0 {
                return Err(ChainStorageError::CorruptedState(format!(
                    "no vote history for image {} while undoing a vote",
                    inp.ink.key_image
                )));
            }
            if u64::from(inp.seq) != history_len as u64 - 1 {
                return Err(ChainStorageError::CorruptedState(
                    "vote sequence does not match the history being undone".into(),
                ));
            }
            let latest = state.vote_histories[&inp.ink.key_image]
                .last()
                .cloned()
                .expect("history checked non-empty");
            if latest.expected_vote != inp.ink.amount {
                return Err(ChainStorageError::CorruptedState(
                    "recorded vote amount does not match the vote being undone".into(),
                ));
            }
            // the recorded and claimed delegate sets must be identical
            if latest.votes.len() != inp.votes.len() ||
                !inp.votes.iter().all(|id| latest.votes.contains_key(id))
            {
                return Err(ChainStorageError::CorruptedState(
                    "recorded vote delegates do not match the vote being undone".into(),
                ));
            }

            state.unapply_votes(rules, &latest, true)?;
            state
                .vote_histories
                .get_mut(&inp.ink.key_image)
                .expect("history checked non-empty")
                .pop();
            if state.vote_histories[&inp.ink.key_image].is_empty() {
                state.vote_histories.remove(&inp.ink.key_image);
            } else {
                let previous = state.vote_histories[&inp.ink.key_image]
                    .last()
                    .cloned()
                    .expect("non-empty after pop");
                state.reapply_votes(rules, &previous)?;
            }
            Ok(())
        },
    }
}

/// Undoes every input of a committed transaction, newest input first.
pub(super) fn purge_transaction_data_from_blockchain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    tx: &Transaction,
) -> Result<(), ChainStorageError> {
    for index in (0..tx.prefix.inputs().len()).rev() {
        undo_input(state, rules, tx, index)?;
    }
    Ok(())
}

/// Removes a committed transaction entirely: inputs undone, outputs popped from the index, entry
/// erased. Returns the transaction so the caller can offer it back to the mempool.
pub(super) fn purge_transaction_from_blockchain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    tx_id: &TxHash,
) -> Result<Transaction, ChainStorageError> {
    let tx = state
        .transactions
        .get(tx_id)
        .map(|entry| entry.tx.clone())
        .ok_or(ChainStorageError::TransactionNotFound(*tx_id))?;

    purge_transaction_data_from_blockchain(state, rules, &tx)?;
    state.pop_transaction_from_global_index(&tx, *tx_id)?;
    state.transactions.remove(tx_id);

    debug!(target: LOG_TARGET, "Removed transaction {} from the chain", tx_id);
    Ok(tx)
}

/// Purges the first `processed_tx_count` listed transactions of a block (newest first) and then
/// its miner transaction. Returns the purged non-coinbase transactions.
pub(super) fn purge_block_data_from_blockchain(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    block: &crate::blocks::Block,
    processed_tx_count: usize,
) -> Result<Vec<Transaction>, ChainStorageError> {
    debug_assert!(processed_tx_count <= block.tx_hashes.len());
    let mut purged = Vec::with_capacity(processed_tx_count);
    for tx_id in block.tx_hashes.iter().take(processed_tx_count).rev() {
        purged.push(purge_transaction_from_blockchain(state, rules, tx_id)?);
    }
    purge_transaction_from_blockchain(state, rules, &block.miner_tx.hash())?;
    purged.reverse();
    Ok(purged)
}
