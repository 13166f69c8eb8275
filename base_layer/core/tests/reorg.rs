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

use std::collections::BTreeSet;

use helpers::builders::{TestChain, TestTxBuilder};
use xpb_core::{
    chain_storage::BlockAddResult,
    consensus::{ConsensusConstantsBuilder, Network, DEFAULT_FEE},
    transactions::TX_VERSION_DPOS,
};

fn new_chain() -> TestChain {
    TestChain::new(ConsensusConstantsBuilder::new(Network::LocalNet).build())
}

/// Two branches of length three fork from a common parent. The main branch has more cumulative
/// work, but the other branch's first block matches a checkpoint: the checkpoint forces the
/// switch and discards the heavier branch.
#[test]
fn checkpoint_forces_a_reorg_over_a_heavier_chain() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(8);

    let fork_height = chain.height(); // the next block's height
    let parent = chain.db.get_block_by_height(fork_height - 1).unwrap().unwrap();
    let parent_info = chain.db.get_block_extended_info(fork_height - 1).unwrap().unwrap();

    // branch A: three blocks straight onto the main chain
    chain.mine_pow_blocks(3);
    assert_eq!(chain.height(), fork_height + 3);
    let a_tip = chain.db.tail_id().unwrap();
    let a_cumulative = chain
        .db
        .get_block_extended_info(fork_height + 2)
        .unwrap()
        .unwrap()
        .cumulative_difficulty;

    // branch B: three blocks built on the common parent
    let rules = chain.rules().clone();
    let ts = |height: u64| rules.genesis_timestamp + height * rules.difficulty_target + 1;
    let emission = |generated: u64| (rules.money_supply - generated) >> rules.emission_speed_factor;

    let b1 = chain.build_pow_block_on(&parent, fork_height - 1, parent_info.already_generated_coins, ts(fork_height), &[]);
    let b1_generated = parent_info.already_generated_coins + emission(parent_info.already_generated_coins);
    let b2 = chain.build_pow_block_on(&b1, fork_height, b1_generated, ts(fork_height + 1), &[]);
    let b2_generated = b1_generated + emission(b1_generated);
    let b3 = chain.build_pow_block_on(&b2, fork_height + 1, b2_generated, ts(fork_height + 2), &[]);

    // pin the divergence height to branch B
    chain.db.add_checkpoint(fork_height, b1.hash()).unwrap();

    // B1 alone is lighter than A's three blocks, but it carries the checkpoint
    let result = chain.db.add_block(b1.clone(), vec![]).unwrap();
    match result {
        BlockAddResult::ChainReorg { removed, new_height, .. } => {
            assert_eq!(removed.len(), 3, "all three A blocks must be popped");
            assert_eq!(new_height, fork_height + 1);
        },
        other => panic!("expected a checkpoint-forced reorg, got {:?}", other),
    }
    assert_eq!(chain.db.tail_id().unwrap(), b1.hash());
    let b1_cumulative = chain
        .db
        .get_block_extended_info(fork_height)
        .unwrap()
        .unwrap()
        .cumulative_difficulty;
    assert!(b1_cumulative < a_cumulative, "the checkpoint must win despite less work");
    // the ex-main branch was discarded, not parked as an alternative
    assert_eq!(chain.db.alternative_blocks_count().unwrap(), 0);
    assert!(chain.db.get_block_by_hash(&a_tip).unwrap().is_none());

    // the rest of branch B extends the new main chain normally
    chain.db.add_block(b2.clone(), vec![]).unwrap().assert_added();
    chain.db.add_block(b3.clone(), vec![]).unwrap().assert_added();
    assert_eq!(chain.height(), fork_height + 3);
    assert_eq!(chain.db.tail_id().unwrap(), b3.hash());
}

/// An XPB output votes for two delegates, the vote block is reorganized away, and the tallies
/// and the image's vote history return to their pre-vote values.
#[test]
fn votes_are_undone_by_a_reorg() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(8);
    chain.register_delegate(1);
    chain.register_delegate(2);
    chain.mine_pow_blocks(2);

    let pre_vote_d1 = chain.db.delegate_info(1).unwrap().unwrap().total_votes;
    let pre_vote_d2 = chain.db.delegate_info(2).unwrap().unwrap().total_votes;

    let fork_height = chain.height();
    let parent = chain.db.get_block_by_height(fork_height - 1).unwrap().unwrap();
    let parent_info = chain.db.get_block_extended_info(fork_height - 1).unwrap().unwrap();

    // cast the vote: a fee-paying spend plus the vote input itself
    let voting_output = chain.take_spendable_output(10 * DEFAULT_FEE);
    let fee_funding = chain.take_spendable_output(DEFAULT_FEE + 1);
    let votes: BTreeSet<u16> = [1u16, 2].into_iter().collect();
    let mut builder = TestTxBuilder::new(TX_VERSION_DPOS);
    builder.add_spend(&fee_funding);
    builder.add_vote(&voting_output, 0, votes);
    builder.add_output(fee_funding.amount - DEFAULT_FEE, xpb_core::transactions::CP_XPB);
    let (vote_tx, _) = builder.build();
    let vote_block = chain.submit_and_mine(vote_tx.clone());
    assert!(vote_block.tx_hashes.contains(&vote_tx.hash()));

    assert_eq!(
        chain.db.delegate_info(1).unwrap().unwrap().total_votes,
        pre_vote_d1 + voting_output.amount
    );
    assert_eq!(
        chain.db.delegate_info(2).unwrap().unwrap().total_votes,
        pre_vote_d2 + voting_output.amount
    );
    assert_eq!(chain.db.vote_history(&voting_output.key_image).unwrap().len(), 1);
    assert_eq!(chain.db.next_vote_seq(&voting_output.key_image).unwrap(), 1);

    // a heavier branch without the vote takes over
    let rules = chain.rules().clone();
    let ts = |height: u64| rules.genesis_timestamp + height * rules.difficulty_target + 1;
    let emission = |generated: u64| (rules.money_supply - generated) >> rules.emission_speed_factor;

    let b1 = chain.build_pow_block_on(&parent, fork_height - 1, parent_info.already_generated_coins, ts(fork_height), &[]);
    let b1_generated = parent_info.already_generated_coins + emission(parent_info.already_generated_coins);
    let b2 = chain.build_pow_block_on(&b1, fork_height, b1_generated, ts(fork_height + 1), &[]);

    match chain.db.add_block(b1, vec![]).unwrap() {
        BlockAddResult::Alternative => {},
        other => panic!("first fork block should park as an alternative, got {:?}", other),
    }
    let (removed, added) = match chain.db.add_block(b2, vec![]).unwrap() {
        BlockAddResult::ChainReorg { removed, added, .. } => (removed, added),
        other => panic!("second fork block should trigger a reorg, got {:?}", other),
    };
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].1.len(), 1, "the vote transaction is purged");
    chain.mempool.process_reorg(&removed, &added).unwrap();

    // the tallies and the vote history are back to their pre-vote state
    assert_eq!(chain.db.delegate_info(1).unwrap().unwrap().total_votes, pre_vote_d1);
    assert_eq!(chain.db.delegate_info(2).unwrap().unwrap().total_votes, pre_vote_d2);
    assert!(chain.db.vote_history(&voting_output.key_image).unwrap().is_empty());
    assert_eq!(chain.db.next_vote_seq(&voting_output.key_image).unwrap(), 0);
    // the purged vote went back to the pool
    assert!(chain.mempool.has_tx(&vote_tx.hash()).unwrap());
}

/// A lighter alternative chain parks; growing it past the main chain's work switches over, and
/// the ex-main blocks become the alternative.
#[test]
fn heavier_alternative_chain_takes_over() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(6);

    let fork_height = chain.height();
    let parent = chain.db.get_block_by_height(fork_height - 1).unwrap().unwrap();
    let parent_info = chain.db.get_block_extended_info(fork_height - 1).unwrap().unwrap();

    // one block on main
    chain.mine_pow_blocks(1);
    let main_tip = chain.db.tail_id().unwrap();

    let rules = chain.rules().clone();
    let ts = |height: u64| rules.genesis_timestamp + height * rules.difficulty_target + 1;
    let emission = |generated: u64| (rules.money_supply - generated) >> rules.emission_speed_factor;

    let b1 = chain.build_pow_block_on(&parent, fork_height - 1, parent_info.already_generated_coins, ts(fork_height), &[]);
    let b1_generated = parent_info.already_generated_coins + emission(parent_info.already_generated_coins);
    let b2 = chain.build_pow_block_on(&b1, fork_height, b1_generated, ts(fork_height + 1), &[]);

    assert!(matches!(
        chain.db.add_block(b1.clone(), vec![]).unwrap(),
        BlockAddResult::Alternative
    ));
    assert_eq!(chain.db.alternative_blocks_count().unwrap(), 1);

    let result = chain.db.add_block(b2.clone(), vec![]).unwrap();
    assert!(matches!(result, BlockAddResult::ChainReorg { .. }));
    assert_eq!(chain.db.tail_id().unwrap(), b2.hash());
    assert_eq!(chain.height(), fork_height + 2);

    // the old main block is now parked as an alternative
    assert!(chain.db.get_block_by_hash(&main_tip).unwrap().is_some());
    assert_eq!(chain.db.alternative_blocks_count().unwrap(), 1);
}

/// Blocks with an unknown parent are flagged orphaned and never retained.
#[test]
fn orphan_blocks_are_rejected() {
    let mut chain = new_chain();
    chain.mine_pow_blocks(3);

    let parent = chain.db.get_block_by_height(1).unwrap().unwrap();
    let parent_info = chain.db.get_block_extended_info(1).unwrap().unwrap();
    let rules = chain.rules().clone();
    let mut stray = chain.build_pow_block_on(
        &parent,
        1,
        parent_info.already_generated_coins,
        rules.genesis_timestamp + 2 * rules.difficulty_target + 1,
        &[],
    );
    // point it at a parent nobody has
    stray.header.prev_id = xpb_common_types::BlockHash::from([0xee; 32]);

    assert!(matches!(
        chain.db.add_block(stray.clone(), vec![]).unwrap(),
        BlockAddResult::OrphanBlock
    ));
    assert!(chain.db.get_block_by_hash(&stray.hash()).unwrap().is_none());
    assert_eq!(chain.db.alternative_blocks_count().unwrap(), 0);
}
