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

#[allow(dead_code)]
mod helpers;

use helpers::builders::{confirm_outputs, TestChain, TestTxBuilder};
use xpb_crypto::{generate_signature, KeyPair, Signature};
use xpb_core::{
    chain_storage::{BlockchainDatabase, BlockchainDatabaseConfig},
    consensus::{ConsensusConstantsBuilder, ConsensusManager, Network, DEFAULT_FEE},
    transactions::{CoinType, MintInput, RemintInput, TxIn, CP_XPB, TX_VERSION_CURRENCY},
};

fn new_chain() -> TestChain {
    TestChain::new(ConsensusConstantsBuilder::new(Network::LocalNet).build())
}

#[test]
fn mint_and_spend_a_sub_currency() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(60);

    // mint currency 256 "silver" with 2 decimals, 10000 units to Alice
    let remint_keys = KeyPair::generate();
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&funding);
    builder.add_input(
        TxIn::Mint(MintInput {
            currency: 256,
            description: "silver".to_string(),
            decimals: 2,
            amount: 10_000,
            remint_key: remint_keys.public_key,
        }),
        CoinType::currency(256),
    );
    builder.add_output(10_000, CoinType::currency(256));
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (tx, planned) = builder.build();
    let tx_hash = tx.hash();

    let block = chain.submit_and_mine(tx.clone());
    assert!(block.tx_hashes.contains(&tx_hash));

    let info = chain.db.currency_info(256).unwrap().expect("currency not registered");
    assert_eq!(info.description, "silver");
    assert_eq!(info.decimals, 2);
    assert_eq!(info.total_amount_minted, 10_000);
    assert_eq!(info.remint_key_history.len(), 1);
    assert_eq!(info.remint_key(), remint_keys.public_key);
    assert_eq!(chain.db.output_count(CoinType::currency(256), 10_000).unwrap(), 1);

    // Alice spends her silver, splitting it; the miner fee comes from an XPB input
    let mut outs = confirm_outputs(&chain.db, &tx, &planned);
    let change = outs.pop().unwrap();
    let silver = outs.pop().unwrap();
    assert_eq!(silver.coin_type, CoinType::currency(256));

    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&silver);
    builder.add_spend(&change);
    builder.add_output(4_000, CoinType::currency(256));
    builder.add_output(6_000, CoinType::currency(256));
    builder.add_output(change.amount - DEFAULT_FEE, CP_XPB);
    let (spend_tx, _) = builder.build();
    let block = chain.submit_and_mine(spend_tx.clone());
    assert!(block.tx_hashes.contains(&spend_tx.hash()));

    assert!(chain.db.is_key_image_spent(&silver.key_image).unwrap());
    assert_eq!(chain.db.output_count(CoinType::currency(256), 4_000).unwrap(), 1);
    assert_eq!(chain.db.output_count(CoinType::currency(256), 6_000).unwrap(), 1);
    // supply is unchanged by the spend
    assert_eq!(chain.db.currency_info(256).unwrap().unwrap().total_amount_minted, 10_000);
}

#[test]
fn remint_rotates_the_key() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(10);

    let original_keys = KeyPair::generate();
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&funding);
    builder.add_input(
        TxIn::Mint(MintInput {
            currency: 256,
            description: "copper".to_string(),
            decimals: 0,
            amount: 10_000,
            remint_key: original_keys.public_key,
        }),
        CoinType::currency(256),
    );
    builder.add_output(10_000, CoinType::currency(256));
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (mint_tx, _) = builder.build();
    chain.submit_and_mine(mint_tx);

    // remint 5000, rotating to a fresh key, signed with the original key
    let new_keys = KeyPair::generate();
    let mut remint = RemintInput {
        currency: 256,
        amount: 5_000,
        new_remint_key: new_keys.public_key,
        signature: Signature::null(),
    };
    remint.signature = generate_signature(&remint.signing_hash(), &original_keys.public_key, &original_keys.secret_key);

    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&funding);
    builder.add_input(TxIn::Remint(remint), CoinType::currency(256));
    builder.add_output(5_000, CoinType::currency(256));
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (remint_tx, _) = builder.build();
    chain.submit_and_mine(remint_tx);

    let info = chain.db.currency_info(256).unwrap().unwrap();
    assert_eq!(info.total_amount_minted, 15_000);
    assert_eq!(info.remint_key_history.len(), 2);
    assert_eq!(info.remint_key(), new_keys.public_key);

    // a second remint still signed by the retired key must fail
    let mut stale = RemintInput {
        currency: 256,
        amount: 1_000,
        new_remint_key: original_keys.public_key,
        signature: Signature::null(),
    };
    stale.signature = generate_signature(&stale.signing_hash(), &original_keys.public_key, &original_keys.secret_key);
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&funding);
    builder.add_input(TxIn::Remint(stale), CoinType::currency(256));
    builder.add_output(1_000, CoinType::currency(256));
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (stale_tx, _) = builder.build();
    assert!(chain.db.validate_tx(&stale_tx).is_err());
}

#[test]
fn popping_a_block_undoes_it_exactly() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(10);

    let digest_before = chain.db.state_digest().unwrap();
    let height_before = chain.height();

    // a block carrying a mint and a spend
    let remint_keys = KeyPair::generate();
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CURRENCY);
    builder.add_spend(&funding);
    builder.add_input(
        TxIn::Mint(MintInput {
            currency: 900,
            description: "tin".to_string(),
            decimals: 0,
            amount: 42,
            remint_key: remint_keys.public_key,
        }),
        CoinType::currency(900),
    );
    builder.add_output(42, CoinType::currency(900));
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (tx, _) = builder.build();
    chain.submit_and_mine(tx);

    assert_ne!(chain.db.state_digest().unwrap(), digest_before);

    let (popped, txs) = chain.db.pop_block().unwrap();
    assert_eq!(chain.height(), height_before);
    assert_eq!(chain.db.state_digest().unwrap(), digest_before);
    assert!(chain.db.currency_info(900).unwrap().is_none());

    // the popped block re-applies cleanly
    let result = chain.db.add_block(popped, txs).unwrap();
    assert!(result.is_added());
    assert_eq!(chain.db.currency_info(900).unwrap().unwrap().total_amount_minted, 42);
}

#[test]
fn blockchain_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let constants = ConsensusConstantsBuilder::new(Network::LocalNet).build();

    let (digest, height, tail) = {
        let mut chain = TestChain::new_on_disk(constants.clone(), dir.path().to_path_buf());
        chain.mine_pow_blocks(5);
        chain.db.store_blockchain().unwrap();
        (
            chain.db.state_digest().unwrap(),
            chain.height(),
            chain.db.tail_id().unwrap(),
        )
    };

    let consensus = ConsensusManager::builder(Network::LocalNet)
        .with_consensus_constants(constants)
        .build();
    let reopened = BlockchainDatabase::new(
        BlockchainDatabaseConfig {
            data_dir: Some(dir.path().to_path_buf()),
        },
        consensus,
    )
    .unwrap();
    assert_eq!(reopened.height().unwrap(), height);
    assert_eq!(reopened.tail_id().unwrap(), tail);
    assert_eq!(reopened.state_digest().unwrap(), digest);
}
