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

use thiserror::Error;
use xpb_common_types::{BlockHash, TxHash};

use crate::{blocks::BlockError, chain_storage::validation::ValidationError};

#[derive(Debug, Error)]
pub enum ChainStorageError {
    /// A block or transaction failed a consensus rule. Never mutates committed state.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Block error: {0}")]
    Block(#[from] BlockError),
    #[error("Block {0} not found")]
    BlockNotFound(BlockHash),
    #[error("Height {requested} is beyond the chain tip {tip}")]
    HeightOutOfRange { requested: u64, tip: u64 },
    #[error("Transaction {0} not found")]
    TransactionNotFound(TxHash),
    #[error("Transaction {0} supplied with the block does not match the block's hash list")]
    TransactionMismatch(TxHash),
    #[error("Cannot pop the genesis block")]
    CannotPopGenesis,
    /// An undo or internal bookkeeping step found state that should be impossible. Treated as
    /// corruption; the enclosing block operation rolls back.
    #[error("Corrupted chain state: {0}")]
    CorruptedState(String),
    #[error("Reorganization failed and the original chain was restored")]
    ReorgFailed,
    #[error("Mempool error while building a block template: {0}")]
    MempoolError(String),
    #[error("The blockchain lock is poisoned")]
    LockPoisoned,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Chain data serialization failed: {0}")]
    Codec(String),
}
