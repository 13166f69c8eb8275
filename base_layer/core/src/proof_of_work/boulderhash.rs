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

//! The boulderhash proof-of-work long hash.
//!
//! A memory-touching iterated Keccak: a scratchpad is filled from a seed hash, walked in a
//! data-dependent order, and digested. Only PoW block headers are ever long-hashed; DPoS blocks
//! are sealed by signature.

use sha3::{Digest, Sha3_256};
use xpb_common_types::FixedHash;

use crate::blocks::{Block, BlockError};

const SCRATCHPAD_WORDS: usize = 2048;
const MIX_PASSES: usize = 4;

/// The long hash over an arbitrary blob.
pub fn boulderhash(data: &[u8]) -> FixedHash {
    let seed: [u8; 32] = Sha3_256::digest(data).into();

    // fill the scratchpad from a hash chain over the seed
    let mut pad = vec![0u64; SCRATCHPAD_WORDS];
    let mut chain = seed;
    for slot in pad.chunks_mut(4) {
        chain = Sha3_256::digest(chain).into();
        for (i, word) in slot.iter_mut().enumerate() {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&chain[i * 8..i * 8 + 8]);
            *word = u64::from_le_bytes(bytes);
        }
    }

    // data-dependent walk
    let mut acc = u64::from_le_bytes(seed[..8].try_into().expect("seed is 32 bytes"));
    for _ in 0..MIX_PASSES {
        for _ in 0..SCRATCHPAD_WORDS {
            let index = (acc as usize) % SCRATCHPAD_WORDS;
            acc = acc
                .rotate_left(17)
                .wrapping_mul(0x9e37_79b9_7f4a_7c15)
                .wrapping_add(pad[index]);
            pad[index] ^= acc;
        }
    }

    let mut hasher = Sha3_256::new();
    hasher.update(seed);
    for word in &pad {
        hasher.update(word.to_le_bytes());
    }
    let out: [u8; 32] = hasher.finalize().into();
    FixedHash::from(out)
}

/// The proof-of-work hash of a PoW block.
pub fn get_block_longhash(block: &Block) -> Result<FixedHash, BlockError> {
    if block.is_dpos_block() {
        return Err(BlockError::NoLongHashForDposBlock);
    }
    Ok(boulderhash(&block.pow_blob()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn longhash_is_stable_and_nonce_sensitive() {
        let a = boulderhash(b"block blob");
        let b = boulderhash(b"block blob");
        let c = boulderhash(b"block blob!");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn longhash_differs_from_fast_hash() {
        let data = b"block blob";
        assert_ne!(
            boulderhash(data).as_slice(),
            xpb_crypto::cn_fast_hash(data).as_slice()
        );
    }
}
