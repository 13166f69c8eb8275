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

mod block;
mod genesis_block;

use thiserror::Error;

pub use block::{
    check_dpos_block_sig,
    sign_dpos_block,
    tree_hash,
    Block,
    BlockHeader,
    BLOCK_BLOB_TAG,
    CURRENT_BLOCK_MAJOR_VERSION,
    DPOS_BLOCK_MAJOR_VERSION,
    DPOS_BLOCK_MINOR_VERSION,
    POW_BLOCK_MAJOR_VERSION,
    POW_BLOCK_MINOR_VERSION,
};
pub use genesis_block::generate_genesis_block;

#[derive(Debug, Error)]
pub enum BlockError {
    #[error("Could not construct the genesis block")]
    GenesisConstruction,
    #[error("Generated genesis block id {actual} does not match the expected id {expected}")]
    GenesisIdMismatch { expected: String, actual: String },
    #[error("DPoS blocks have no proof-of-work long hash")]
    NoLongHashForDposBlock,
    #[error("The miner transaction does not carry a single coinbase input")]
    InvalidMinerTransaction,
}
