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

use serde::{Deserialize, Serialize};

use crate::{blocks::Block, proof_of_work::Difficulty, transactions::Transaction};

/// A main-chain block with the accumulated values the fork-choice rule needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExtendedInfo {
    pub block: Block,
    pub height: u64,
    pub block_cumulative_size: u64,
    pub cumulative_difficulty: Difficulty,
    pub already_generated_coins: u64,
}

/// A block parked on an alternative chain (or recorded as invalid), with its transaction bodies
/// kept so a reorganization can replay it without any other source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AltBlockInfo {
    pub block: Block,
    pub transactions: Vec<Transaction>,
    pub height: u64,
    pub cumulative_difficulty: Difficulty,
}

/// A committed transaction and its index bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionChainEntry {
    pub tx: Transaction,
    /// Height of the block that included it.
    pub keeper_block_height: u64,
    /// Position of each output in its per-(coin type, amount) index.
    pub global_output_indexes: Vec<u64>,
}

/// What happened to a submitted block.
#[derive(Debug)]
pub enum BlockAddResult {
    /// Extended the main chain; the new tip height is given.
    Ok(u64),
    /// The block id is already known (main, alternative or invalid).
    AlreadyExists,
    /// The parent is unknown; the block was not retained.
    OrphanBlock,
    /// Parked on an alternative chain that is not (yet) heavier than the main chain.
    Alternative,
    /// An alternative chain took over. The removed ex-main blocks carry their non-coinbase
    /// transactions so the mempool can take them back; the added blocks let it drop what the new
    /// chain confirmed.
    ChainReorg {
        removed: Vec<(Block, Vec<Transaction>)>,
        added: Vec<Block>,
        new_height: u64,
    },
}

impl BlockAddResult {
    pub fn assert_added(&self) -> u64 {
        match self {
            BlockAddResult::Ok(height) => *height,
            BlockAddResult::ChainReorg { new_height, .. } => *new_height,
            other => panic!("expected the block to be added to the main chain, got {:?}", other),
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, BlockAddResult::Ok(_) | BlockAddResult::ChainReorg { .. })
    }
}
