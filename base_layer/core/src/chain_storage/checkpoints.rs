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

//! Hard-coded (or operator-supplied) height → block-id pins.
//!
//! Inside the checkpointed zone blocks are accepted by id alone (no PoW verification), and an
//! alternative chain containing a checkpoint the main chain lacks forces a reorganization no
//! matter the difficulty.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xpb_common_types::BlockHash;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoints {
    points: BTreeMap<u64, BlockHash>,
}

impl Checkpoints {
    pub fn new() -> Self {
        Checkpoints::default()
    }

    pub fn add_checkpoint(&mut self, height: u64, id: BlockHash) {
        self.points.insert(height, id);
    }

    pub fn is_in_checkpoint_zone(&self, height: u64) -> bool {
        self.points.keys().next_back().is_some_and(|max| height <= *max)
    }

    /// Returns `(passes, is_a_checkpoint)`: whether a block at `height` with this id is
    /// admissible, and whether that height is a checkpoint at all.
    pub fn check_block(&self, height: u64, id: &BlockHash) -> (bool, bool) {
        match self.points.get(&height) {
            Some(expected) => (expected == id, true),
            None => (true, false),
        }
    }

    /// An alternative block strictly below the last checkpoint that is already behind the main
    /// chain tip can never win and is refused outright. A block at the checkpoint height itself
    /// is allowed: it is how a checkpoint forces the main chain onto the pinned branch.
    pub fn is_alternative_block_allowed(&self, blockchain_height: u64, block_height: u64) -> bool {
        if block_height == 0 {
            return false;
        }
        match self.points.range(..blockchain_height).next_back() {
            Some((checkpoint_height, _)) => block_height >= *checkpoint_height,
            None => true,
        }
    }
}
