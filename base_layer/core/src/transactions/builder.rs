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

//! Miner (coinbase) transaction construction.

use std::cell::RefCell;

use thiserror::Error;
use xpb_common_types::Address;
use xpb_crypto::{derive_public_key, generate_key_derivation, KeyPair};

use crate::{
    consensus::{get_block_reward, ConsensusConstants, DEFAULT_FEE},
    transactions::{
        tx_extra::{add_extra_nonce_to_extra, add_tx_pub_key_to_extra},
        CoinbaseInput,
        Transaction,
        TransactionError,
        TransactionPrefix,
        TxIn,
        TxOut,
        CP_XPB,
        TX_VERSION_VANILLA,
    },
};

#[derive(Debug, Error)]
pub enum MinerTxError {
    #[error("Block size is too big for any reward")]
    BlockTooBig,
    #[error("Could not derive one-time output keys: {0}")]
    KeyDerivation(#[from] xpb_crypto::CryptoError),
    #[error("Transaction assembly failed: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Extra nonce is too large")]
    ExtraNonceTooBig,
}

/// Splits an amount into its decimal digits, largest last. Chunks below `dust_threshold` are
/// reported through `dust_handler` instead.
pub fn decompose_amount_into_digits<F, D>(mut amount: u64, dust_threshold: u64, mut chunk_handler: F, mut dust_handler: D)
where
    F: FnMut(u64),
    D: FnMut(u64),
{
    let mut order = 1u64;
    while amount > 0 {
        let chunk = (amount % 10) * order;
        amount /= 10;
        order = order.saturating_mul(10);
        if chunk == 0 {
            continue;
        }
        if chunk < dust_threshold {
            dust_handler(chunk);
        } else {
            chunk_handler(chunk);
        }
    }
}

/// Builds the miner transaction paying `block_reward(…) + fee` to `miner_address` in denominated
/// one-time outputs. Called twice per template: once with an estimated block size and again with
/// the true cumulative size (the extra field is padded to keep the size stable).
pub fn construct_miner_tx(
    rules: &ConsensusConstants,
    height: u64,
    median_size: u64,
    already_generated_coins: u64,
    current_block_size: u64,
    fee: u64,
    miner_address: &Address,
    extra_nonce: &[u8],
    max_outs: usize,
) -> Result<Transaction, MinerTxError> {
    let tx_key = KeyPair::generate();

    let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
    add_tx_pub_key_to_extra(&mut prefix.extra, &tx_key.public_key);
    if !extra_nonce.is_empty() && !add_extra_nonce_to_extra(&mut prefix.extra, extra_nonce) {
        return Err(MinerTxError::ExtraNonceTooBig);
    }

    let mut block_reward = get_block_reward(rules, median_size, current_block_size, already_generated_coins, height)
        .ok_or(MinerTxError::BlockTooBig)?;
    block_reward += fee;

    let out_amounts = RefCell::new(Vec::new());
    decompose_amount_into_digits(
        block_reward,
        DEFAULT_FEE,
        |chunk| out_amounts.borrow_mut().push(chunk),
        |dust| out_amounts.borrow_mut().push(dust),
    );
    let mut out_amounts = out_amounts.into_inner();
    debug_assert!(max_outs >= 1);
    while out_amounts.len() > max_outs {
        // merge the two smallest denominations
        let last = out_amounts.remove(0);
        out_amounts[0] += last;
    }

    let derivation = generate_key_derivation(&miner_address.public_view_key, &tx_key.secret_key)?;
    let mut summary = 0u64;
    for (index, amount) in out_amounts.iter().enumerate() {
        let one_time_key = derive_public_key(&derivation, index as u64, &miner_address.public_spend_key)?;
        prefix.add_output(TxOut::to_key(*amount, one_time_key), CP_XPB)?;
        summary += amount;
    }
    debug_assert_eq!(summary, block_reward);

    prefix.unlock_time = height + rules.mined_money_unlock_window;
    prefix.add_input(TxIn::Coinbase(CoinbaseInput { height }), CP_XPB)?;

    Ok(Transaction {
        signatures: vec![vec![]],
        prefix,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::{ConsensusConstantsBuilder, Network};
    use xpb_crypto::generate_keys;

    #[test]
    fn digits_cover_the_amount() {
        let mut chunks = Vec::new();
        let mut dust = Vec::new();
        decompose_amount_into_digits(123_456, 100, |c| chunks.push(c), |d| dust.push(d));
        let total: u64 = chunks.iter().chain(dust.iter()).sum();
        assert_eq!(total, 123_456);
        assert!(dust.iter().all(|d| *d < 100));
        assert!(chunks.iter().all(|c| *c >= 100));
    }

    #[test]
    fn miner_tx_pays_reward_plus_fee() {
        let rules = ConsensusConstantsBuilder::new(Network::LocalNet).build();
        let (spend, _) = generate_keys();
        let (view, _) = generate_keys();
        let addr = Address::new(spend, view);
        let tx = construct_miner_tx(&rules, 5, 0, 0, 1000, 250, &addr, b"nonce", 11).unwrap();
        assert!(tx.is_coinbase());
        assert_eq!(tx.prefix.unlock_time, 5 + rules.mined_money_unlock_window);
        let expected = get_block_reward(&rules, 0, 1000, 0, 5).unwrap() + 250;
        let total: u64 = tx.prefix.outputs().iter().map(|o| o.amount).sum();
        assert_eq!(total, expected);
        assert!(tx.prefix.outputs().len() <= 11);
    }
}
