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

//! Forward state mutation: applying a validated transaction's inputs to the ledger.
//!
//! Inputs are applied in the order they appear; every mutation here has an exact inverse in
//! [`undo`](crate::chain_storage::undo). Inputs were already validated, so any failure in here is
//! an internal inconsistency and unwinds the partially-applied transaction.

use log::{debug, error};
use xpb_common_types::{BlockHash, TxHash};

use crate::{
    chain_storage::{
        entries::TransactionChainEntry,
        error::ChainStorageError,
        ledger_state::LedgerState,
        registries::{ContractInfo, CurrencyInfo, DelegateInfo},
        undo::undo_input,
    },
    consensus::ConsensusConstants,
    transactions::{
        amount::{add_amount, sub_amount},
        Transaction,
        TxIn,
    },
};

const LOG_TARGET: &str = "c::cs::apply";

pub(super) fn apply_input(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    tx: &Transaction,
    index: usize,
    tx_id: &TxHash,
    block_id: &BlockHash,
) -> Result<(), ChainStorageError> {
    match &tx.prefix.inputs()[index] {
        TxIn::Coinbase(_) => Ok(()),
        TxIn::Key(inp) => {
            // a spent image can no longer vote; its current vote instance is lifted but kept in
            // the history so undoing the spend restores it
            if let Some(instance) = state.vote_histories.get(&inp.key_image).and_then(|h| h.last()).cloned() {
                state.unapply_votes(rules, &instance, false)?;
            }
            if !state.spent_key_images.insert(inp.key_image) {
                return Err(ChainStorageError::CorruptedState(format!(
                    "tx {tx_id} in block {block_id} spends key image {} twice",
                    inp.key_image
                )));
            }
            Ok(())
        },
        TxIn::Mint(inp) => {
            state.currencies.insert(inp.currency, CurrencyInfo {
                currency: inp.currency,
                description: inp.description.clone(),
                decimals: inp.decimals,
                total_amount_minted: inp.amount,
                remint_key_history: vec![inp.remint_key],
            });
            if !inp.description.is_empty() {
                state.used_descriptions.insert(inp.description.clone());
            }
            Ok(())
        },
        TxIn::Remint(inp) => {
            let info = state
                .currencies
                .get_mut(&inp.currency)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("remint of unknown currency {}", inp.currency)))?;
            info.remint_key_history.push(inp.new_remint_key);
            if !add_amount(&mut info.total_amount_minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(format!(
                    "overflow tracking reminted amount for currency {}",
                    inp.currency
                )));
            }
            Ok(())
        },
        TxIn::CreateContract(inp) => {
            state.contracts.insert(inp.contract, ContractInfo {
                contract: inp.contract,
                description: inp.description.clone(),
                grading_key: inp.grading_key,
                fee_scale: inp.fee_scale,
                expiry_block: inp.expiry_block,
                default_grade: inp.default_grade,
                total_amount_minted: Default::default(),
                is_graded: false,
                grade: 0,
            });
            if !inp.description.is_empty() {
                state.used_descriptions.insert(inp.description.clone());
            }
            Ok(())
        },
        TxIn::MintContract(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("mint of unknown contract {}", inp.contract)))?;
            let minted = info.total_amount_minted.entry(inp.backing_currency).or_insert(0);
            if !add_amount(minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(format!(
                    "overflow tracking minted amount for contract {} backed by {}",
                    inp.contract, inp.backing_currency
                )));
            }
            Ok(())
        },
        TxIn::GradeContract(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("grade of unknown contract {}", inp.contract)))?;
            info.is_graded = true;
            info.grade = inp.grade;
            Ok(())
        },
        TxIn::ResolveBcCoins(_) => Ok(()),
        TxIn::FuseBcCoins(inp) => {
            let info = state
                .contracts
                .get_mut(&inp.contract)
                .ok_or_else(|| ChainStorageError::CorruptedState(format!("fuse of unknown contract {}", inp.contract)))?;
            let minted = info
                .total_amount_minted
                .get_mut(&inp.backing_currency)
                .ok_or_else(|| ChainStorageError::CorruptedState("fusing against an unminted backing currency".into()))?;
            if !sub_amount(minted, inp.amount) {
                return Err(ChainStorageError::CorruptedState(
                    "underflow subtracting fused coins from the contract's minted total".into(),
                ));
            }
            Ok(())
        },
        TxIn::RegisterDelegate(inp) => {
            if state.delegates.contains_key(&inp.delegate_id) {
                return Err(ChainStorageError::CorruptedState(format!(
                    "registering already-used delegate id {}",
                    inp.delegate_id
                )));
            }
            state
                .delegates
                .insert(inp.delegate_id, DelegateInfo::new(inp.delegate_id, inp.delegate_address));
            Ok(())
        },
        TxIn::Vote(inp) => {
            if state.spent_key_images.contains(&inp.ink.key_image) {
                return Err(ChainStorageError::CorruptedState(
                    "voting with a spent key image".into(),
                ));
            }
            // a revote first lifts the previous vote instance
            if let Some(instance) = state
                .vote_histories
                .get(&inp.ink.key_image)
                .and_then(|h| h.last())
                .cloned()
            {
                state.unapply_votes(rules, &instance, false)?;
            }
            let instance = state.apply_votes(rules, inp.ink.amount, &inp.votes)?;
            state.vote_histories.entry(inp.ink.key_image).or_default().push(instance);
            Ok(())
        },
    }
}

/// Applies every input of a validated transaction and records it in the chain indexes. On any
/// failure the partially-applied inputs are undone before returning.
pub(super) fn add_transaction_from_block(
    state: &mut LedgerState,
    rules: &ConsensusConstants,
    tx: &Transaction,
    tx_id: TxHash,
    block_id: &BlockHash,
    block_height: u64,
) -> Result<(), ChainStorageError> {
    if state.transactions.contains_key(&tx_id) {
        return Err(ChainStorageError::CorruptedState(format!(
            "tx {tx_id} in block {block_id} is already in the chain"
        )));
    }

    for index in 0..tx.prefix.inputs().len() {
        if let Err(e) = apply_input(state, rules, tx, index, &tx_id, block_id) {
            error!(
                target: LOG_TARGET,
                "Failed to apply input {} of tx {}: {}; unwinding", index, tx_id, e
            );
            for undo_index in (0..index).rev() {
                undo_input(state, rules, tx, undo_index)?;
            }
            return Err(e);
        }
    }

    let global_output_indexes = state.push_transaction_to_global_outs_index(tx, tx_id);
    state.transactions.insert(tx_id, TransactionChainEntry {
        tx: tx.clone(),
        keeper_block_height: block_height,
        global_output_indexes,
    });

    debug!(
        target: LOG_TARGET,
        "Added transaction {} ({} in, {} out) at height {}",
        tx_id,
        tx.prefix.inputs().len(),
        tx.prefix.outputs().len(),
        block_height
    );
    Ok(())
}
