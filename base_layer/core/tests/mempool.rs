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

use helpers::builders::{TestChain, TestTxBuilder};
use xpb_crypto::{generate_signature, KeyPair, Signature};
use xpb_core::{
    blocks::Block,
    consensus::{ConsensusConstantsBuilder, Network, DEFAULT_FEE},
    transactions::{
        CoinContractType,
        CoinType,
        CreateContractInput,
        GradeContractInput,
        MintContractInput,
        Transaction,
        TxIn,
        CP_N_A,
        CP_XPB,
        CURRENCY_XPB,
        TX_VERSION_CONTRACT,
        TX_VERSION_VANILLA,
    },
};

fn new_chain() -> TestChain {
    TestChain::new(ConsensusConstantsBuilder::new(Network::LocalNet).build())
}

fn create_contract_tx(chain: &mut TestChain, contract: u64) -> KeyPair {
    let grading_keys = KeyPair::generate();
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CONTRACT);
    builder.add_spend(&funding);
    builder.add_input(
        TxIn::CreateContract(CreateContractInput {
            contract,
            description: String::new(),
            grading_key: grading_keys.public_key,
            fee_scale: 0,
            expiry_block: 100_000,
            default_grade: 0,
        }),
        CP_N_A,
    );
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (tx, _) = builder.build();
    chain.submit_and_mine(tx);
    grading_keys
}

fn padded_mint_tx(chain: &mut TestChain, contract: u64, pad: usize) -> Transaction {
    let funding = chain.take_spendable_output(100 + DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CONTRACT);
    builder.add_spend(&funding);
    builder.add_input(
        TxIn::MintContract(MintContractInput {
            contract,
            backing_currency: CURRENCY_XPB,
            amount: 100,
        }),
        CP_N_A,
    );
    builder.add_output(100, CoinType::new(contract, CoinContractType::BackingCoin, CURRENCY_XPB));
    builder.add_output(100, CoinType::new(contract, CoinContractType::ContractCoin, CURRENCY_XPB));
    builder.add_output(funding.amount - 100 - DEFAULT_FEE, CP_XPB);
    builder.pad_extra(pad);
    let (tx, _) = builder.build();
    tx
}

/// With a budget that fits the grading transaction plus three mints, the grading transaction
/// must be included even though ten mints were pooled before and after it — mint spam cannot
/// squeeze a grading out of a block.
#[test]
fn grading_cannot_be_squeezed_out_of_a_template() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(16);

    // contract 300 will be graded; the mint spam targets contract 301
    let grading_keys = create_contract_tx(&mut chain, 300);
    create_contract_tx(&mut chain, 301);

    // the grading transaction, padded to roughly five times a mint's size
    let mut grade_inp = GradeContractInput {
        contract: 300,
        grade: 500_000_000,
        fee_amounts: Default::default(),
        signature: Signature::null(),
    };
    grade_inp.signature =
        generate_signature(&grade_inp.signing_hash(), &grading_keys.public_key, &grading_keys.secret_key);
    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_CONTRACT);
    builder.add_spend(&funding);
    builder.add_input(TxIn::GradeContract(grade_inp), CP_N_A);
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    builder.pad_extra(6000);
    let (grade_tx, _) = builder.build();

    // five mints pooled before the grade, five after
    let mut mint_txs = Vec::new();
    for _ in 0..5 {
        mint_txs.push(padded_mint_tx(&mut chain, 301, 1000));
    }
    for tx in &mint_txs {
        assert!(chain.mempool.insert(tx.clone()).unwrap().added_to_pool);
    }
    assert!(chain.mempool.insert(grade_tx.clone()).unwrap().added_to_pool);
    for _ in 0..5 {
        let tx = padded_mint_tx(&mut chain, 301, 1000);
        assert!(chain.mempool.insert(tx.clone()).unwrap().added_to_pool);
        mint_txs.push(tx);
    }
    assert_eq!(chain.mempool.len().unwrap(), 11);

    let grade_size = grade_tx.blob_size();
    let mint_size = mint_txs[0].blob_size();
    assert!(grade_size > 4 * mint_size);

    // a budget that fits the grade plus three and a half mints
    let max_total = grade_size + 3 * mint_size + mint_size / 2;
    let median_size = (max_total + chain.rules().coinbase_blob_reserved_size) / 2 + 1;

    let mut block = Block::default();
    let (total_size, _fee) = chain.mempool.fill_block_template(&mut block, median_size, 0).unwrap();

    assert!(
        block.tx_hashes.contains(&grade_tx.hash()),
        "the grading transaction must be selected first"
    );
    let mints_included = block
        .tx_hashes
        .iter()
        .filter(|h| mint_txs.iter().any(|tx| tx.hash() == **h))
        .count();
    assert_eq!(mints_included, 3, "only three mints fit beside the grading transaction");
    assert!(total_size <= 2 * median_size - chain.rules().coinbase_blob_reserved_size);
}

#[test]
fn fee_floor_gates_relayed_transactions() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(6);

    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_VANILLA);
    builder.add_spend(&funding);
    // pays the whole input out: zero fee
    builder.add_output(funding.amount, CP_XPB);
    let (tx, _) = builder.build();

    let tvc = chain.mempool.insert(tx.clone()).unwrap();
    assert!(!tvc.added_to_pool);
    assert!(!tvc.should_be_relayed);
    assert!(!tvc.verification_failed, "a cheap transaction is not a broken one");

    // the same transaction injected from a popped block bypasses the floor
    let tvc = chain.mempool.insert_kept_by_block(tx).unwrap();
    assert!(tvc.added_to_pool);
}

#[test]
fn conflicting_spends_cannot_share_the_pool() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(6);

    let funding = chain.take_spendable_output(2 * DEFAULT_FEE + 1);

    let mut builder = TestTxBuilder::new(TX_VERSION_VANILLA);
    builder.add_spend(&funding);
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (first, _) = builder.build();

    let mut builder = TestTxBuilder::new(TX_VERSION_VANILLA);
    builder.add_spend(&funding);
    builder.add_output(funding.amount - 2 * DEFAULT_FEE, CP_XPB);
    let (second, _) = builder.build();

    assert!(chain.mempool.insert(first).unwrap().added_to_pool);
    let tvc = chain.mempool.insert(second).unwrap();
    assert!(!tvc.added_to_pool);
    assert!(tvc.verification_failed);
    assert_eq!(chain.mempool.len().unwrap(), 1);
}

#[test]
fn published_blocks_drain_the_pool() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(6);

    let funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let mut builder = TestTxBuilder::new(TX_VERSION_VANILLA);
    builder.add_spend(&funding);
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (tx, _) = builder.build();

    assert!(chain.mempool.insert(tx.clone()).unwrap().added_to_pool);
    assert_eq!(chain.mempool.len().unwrap(), 1);
    let block = chain.mine_pow_block();
    assert!(block.tx_hashes.contains(&tx.hash()));
    assert!(chain.mempool.is_empty().unwrap());

    // a double-spend of the now-confirmed output is rejected outright
    let mut builder = TestTxBuilder::new(TX_VERSION_VANILLA);
    builder.add_spend(&funding);
    builder.add_output(funding.amount - DEFAULT_FEE, CP_XPB);
    let (double_spend, _) = builder.build();
    let tvc = chain.mempool.insert(double_spend).unwrap();
    assert!(tvc.verification_failed);
}
