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

//! Deterministic genesis block construction.
//!
//! Everything is derived from compile-time constants so every node computes the identical block:
//! the nonce is the first four bytes of the hashed nonce string, and the coinbase keys are
//! nothing-up-my-sleeve points derived by hashing fixed labels (nobody holds their secret keys).

use std::cell::RefCell;

use xpb_common_types::BlockHash;
use xpb_crypto::{cn_fast_hash, hash_to_public_key, PublicKey, Signature};

use crate::{
    blocks::{Block, BlockError, BlockHeader, POW_BLOCK_MAJOR_VERSION, POW_BLOCK_MINOR_VERSION},
    consensus::{get_block_reward, ConsensusConstants, DEFAULT_FEE},
    transactions::{
        decompose_amount_into_digits,
        tx_extra::add_tx_pub_key_to_extra,
        CoinbaseInput,
        Transaction,
        TransactionPrefix,
        TxIn,
        TxOut,
        CP_XPB,
        TX_VERSION_VANILLA,
    },
};

fn nothing_up_my_sleeve_key(label: &[u8]) -> PublicKey {
    hash_to_public_key(label)
}

fn genesis_miner_tx(rules: &ConsensusConstants) -> Result<Transaction, BlockError> {
    let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
    add_tx_pub_key_to_extra(&mut prefix.extra, &nothing_up_my_sleeve_key(b"xpb genesis tx key"));

    let reward = get_block_reward(rules, 0, 0, 0, 0).ok_or(BlockError::GenesisConstruction)?;
    let amounts = RefCell::new(Vec::new());
    decompose_amount_into_digits(
        reward,
        DEFAULT_FEE,
        |c| amounts.borrow_mut().push(c),
        |d| amounts.borrow_mut().push(d),
    );
    let amounts = amounts.into_inner();

    for (index, amount) in amounts.iter().enumerate() {
        let mut label = b"xpb genesis output ".to_vec();
        label.extend_from_slice(&(index as u64).to_le_bytes());
        prefix
            .add_output(TxOut::to_key(*amount, nothing_up_my_sleeve_key(&label)), CP_XPB)
            .map_err(|_| BlockError::GenesisConstruction)?;
    }

    prefix.unlock_time = rules.mined_money_unlock_window;
    prefix
        .add_input(TxIn::Coinbase(CoinbaseInput { height: 0 }), CP_XPB)
        .map_err(|_| BlockError::GenesisConstruction)?;

    Ok(Transaction {
        signatures: vec![vec![]],
        prefix,
    })
}

/// Builds the genesis block from the network's compile-time constants.
pub fn generate_genesis_block(rules: &ConsensusConstants) -> Result<Block, BlockError> {
    let nonce_hash = cn_fast_hash(rules.genesis_nonce_string.as_bytes());
    let nonce = u32::from_le_bytes([nonce_hash[0], nonce_hash[1], nonce_hash[2], nonce_hash[3]]);

    let block = Block {
        header: BlockHeader {
            major_version: POW_BLOCK_MAJOR_VERSION,
            minor_version: POW_BLOCK_MINOR_VERSION,
            timestamp: rules.genesis_timestamp,
            prev_id: BlockHash::zero(),
            nonce,
        },
        miner_tx: genesis_miner_tx(rules)?,
        tx_hashes: vec![],
        signing_delegate_id: 0,
        dpos_sig: Signature::null(),
    };

    if let Some(expected_hex) = rules.genesis_block_id {
        let actual = block.hash().to_hex();
        if actual != expected_hex {
            return Err(BlockError::GenesisIdMismatch {
                expected: expected_hex.to_string(),
                actual,
            });
        }
    }
    Ok(block)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::{ConsensusConstantsBuilder, Network};

    #[test]
    fn genesis_is_deterministic() {
        let rules = ConsensusConstantsBuilder::new(Network::LocalNet).build();
        let a = generate_genesis_block(&rules).unwrap();
        let b = generate_genesis_block(&rules).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.height(), Some(0));
        assert!(a.is_pow_block());
    }

    #[test]
    fn genesis_coinbase_pays_full_emission() {
        let rules = ConsensusConstantsBuilder::new(Network::LocalNet).build();
        let block = generate_genesis_block(&rules).unwrap();
        let reward = get_block_reward(&rules, 0, 0, 0, 0).unwrap();
        let total: u64 = block.miner_tx.prefix.outputs().iter().map(|o| o.amount).sum();
        assert_eq!(total, reward);
    }

    #[test]
    fn wrong_expected_id_is_rejected() {
        let mut rules = ConsensusConstantsBuilder::new(Network::LocalNet).build();
        rules.genesis_block_id = Some("00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff");
        assert!(matches!(
            generate_genesis_block(&rules),
            Err(BlockError::GenesisIdMismatch { .. })
        ));
    }
}
