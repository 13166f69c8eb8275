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

//! Test scaffolding: a wallet that can scan and spend outputs, a transaction builder that signs
//! spend and vote inputs, and a chain harness that mines real blocks through the template path.

use std::collections::{BTreeSet, HashMap};

use xpb_common_types::{Address, DelegateId};
use xpb_crypto::{
    derive_public_key,
    derive_secret_key,
    generate_key_derivation,
    generate_key_image,
    generate_keys,
    generate_ring_signature,
    KeyImage,
    KeyPair,
    PublicKey,
    SecretKey,
};
use xpb_core::{
    blocks::{sign_dpos_block, Block, BlockHeader, DPOS_BLOCK_MAJOR_VERSION, DPOS_BLOCK_MINOR_VERSION},
    chain_storage::{BlockAddResult, BlockchainDatabase, BlockchainDatabaseConfig},
    consensus::{ConsensusConstants, ConsensusManager, Network},
    mempool::{Mempool, MempoolConfig},
    proof_of_work::{check_hash, get_block_longhash, Difficulty},
    transactions::{
        construct_miner_tx,
        tx_extra::get_tx_pub_key_from_extra,
        CoinType,
        KeyInput,
        Transaction,
        TransactionPrefix,
        TxIn,
        TxOut,
        VoteInput,
    },
};

/// An output the test can spend: the one-time key pair, its key image and its position in the
/// per-(coin type, amount) index.
#[derive(Clone)]
pub struct OwnedOutput {
    pub amount: u64,
    pub coin_type: CoinType,
    pub global_index: u64,
    pub public: PublicKey,
    pub secret: SecretKey,
    pub key_image: KeyImage,
    /// First height at which this output may be spent (0 for unlocked outputs).
    pub spendable_at: u64,
}

pub struct TestWallet {
    pub spend: KeyPair,
    pub view: KeyPair,
}

impl TestWallet {
    pub fn new() -> Self {
        TestWallet {
            spend: KeyPair::generate(),
            view: KeyPair::generate(),
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.spend.public_key, self.view.public_key)
    }

    /// Finds and claims the outputs of `tx` that pay this wallet through the stealth derivation.
    pub fn scan_transaction(&self, db: &BlockchainDatabase, tx: &Transaction) -> Vec<OwnedOutput> {
        let Some(tx_pub) = get_tx_pub_key_from_extra(&tx.prefix.extra) else {
            return Vec::new();
        };
        let Ok(derivation) = generate_key_derivation(&tx_pub, &self.view.secret_key) else {
            return Vec::new();
        };
        let tx_hash = tx.hash();
        let Some(gindexes) = db.get_tx_outputs_gindexs(&tx_hash).unwrap() else {
            return Vec::new();
        };
        let spendable_at = if tx.is_coinbase() { tx.prefix.unlock_time } else { 0 };

        let mut owned = Vec::new();
        for (i, out) in tx.prefix.outputs().iter().enumerate() {
            let expected = derive_public_key(&derivation, i as u64, &self.spend.public_key).unwrap();
            if expected != *out.key() {
                continue;
            }
            let secret = derive_secret_key(&derivation, i as u64, &self.spend.secret_key);
            let key_image = generate_key_image(out.key(), &secret);
            owned.push(OwnedOutput {
                amount: out.amount,
                coin_type: tx.prefix.out_cp(i),
                global_index: gindexes[i],
                public: *out.key(),
                secret,
                key_image,
                spendable_at,
            });
        }
        owned
    }
}

/// An output the builder is about to create; becomes an [`OwnedOutput`] once the transaction is
/// confirmed and its global indexes are known.
#[derive(Clone)]
pub struct PlannedOutput {
    pub out_index: usize,
    pub amount: u64,
    pub coin_type: CoinType,
    pub public: PublicKey,
    pub secret: SecretKey,
}

pub fn confirm_outputs(db: &BlockchainDatabase, tx: &Transaction, planned: &[PlannedOutput]) -> Vec<OwnedOutput> {
    let gindexes = db
        .get_tx_outputs_gindexs(&tx.hash())
        .unwrap()
        .expect("transaction not confirmed");
    planned
        .iter()
        .map(|p| OwnedOutput {
            amount: p.amount,
            coin_type: p.coin_type,
            global_index: gindexes[p.out_index],
            public: p.public,
            secret: p.secret.clone(),
            key_image: generate_key_image(&p.public, &p.secret),
            spendable_at: 0,
        })
        .collect()
}

/// Builds signed transactions from owned outputs. Spends and votes use rings of size one.
pub struct TestTxBuilder {
    prefix: TransactionPrefix,
    signers: Vec<(usize, OwnedOutput)>,
    planned: Vec<PlannedOutput>,
}

impl TestTxBuilder {
    pub fn new(version: u64) -> Self {
        TestTxBuilder {
            prefix: TransactionPrefix::new(version),
            signers: Vec::new(),
            planned: Vec::new(),
        }
    }

    pub fn with_unlock_time(mut self, unlock_time: u64) -> Self {
        self.prefix.unlock_time = unlock_time;
        self
    }

    pub fn add_spend(&mut self, output: &OwnedOutput) -> &mut Self {
        let index = self.prefix.inputs().len();
        self.prefix
            .add_input(
                TxIn::Key(KeyInput {
                    amount: output.amount,
                    key_offsets: vec![output.global_index],
                    key_image: output.key_image,
                }),
                output.coin_type,
            )
            .unwrap();
        self.signers.push((index, output.clone()));
        self
    }

    pub fn add_vote(&mut self, output: &OwnedOutput, seq: u16, votes: BTreeSet<DelegateId>) -> &mut Self {
        let index = self.prefix.inputs().len();
        self.prefix
            .add_input(
                TxIn::Vote(VoteInput {
                    ink: KeyInput {
                        amount: output.amount,
                        key_offsets: vec![output.global_index],
                        key_image: output.key_image,
                    },
                    seq,
                    votes,
                }),
                output.coin_type,
            )
            .unwrap();
        self.signers.push((index, output.clone()));
        self
    }

    /// Adds a non-spend input (mint, contract operation, delegate registration, …).
    pub fn add_input(&mut self, input: TxIn, coin_type: CoinType) -> &mut Self {
        self.prefix.add_input(input, coin_type).unwrap();
        self
    }

    /// Adds an output to a fresh key pair owned by the test.
    pub fn add_output(&mut self, amount: u64, coin_type: CoinType) -> &mut Self {
        let (public, secret) = generate_keys();
        let out_index = self.prefix.outputs().len();
        self.prefix.add_output(TxOut::to_key(amount, public), coin_type).unwrap();
        self.planned.push(PlannedOutput {
            out_index,
            amount,
            coin_type,
            public,
            secret,
        });
        self
    }

    pub fn pad_extra(&mut self, bytes: usize) -> &mut Self {
        self.prefix.extra.extend(std::iter::repeat(0u8).take(bytes));
        self
    }

    /// Signs every spend/vote input over the prefix hash and returns the transaction together
    /// with the outputs it will create.
    pub fn build(self) -> (Transaction, Vec<PlannedOutput>) {
        let prefix_hash = self.prefix.prefix_hash();
        let mut signatures = vec![Vec::new(); self.prefix.inputs().len()];
        for (index, output) in &self.signers {
            let ring = vec![output.public];
            let sigs = generate_ring_signature(&prefix_hash, &output.key_image, &ring, &output.secret, 0).unwrap();
            signatures[*index] = sigs;
        }
        (
            Transaction {
                prefix: self.prefix,
                signatures,
            },
            self.planned,
        )
    }
}

/// Grinds the nonce until the block satisfies `difficulty`.
pub fn mine_block(block: &mut Block, difficulty: Difficulty) {
    loop {
        let hash = get_block_longhash(block).unwrap();
        if check_hash(&hash, difficulty) {
            return;
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
}

/// A whole test network in one struct: the database, its mempool, the mining wallet and the
/// spendable outputs it has accumulated.
pub struct TestChain {
    pub db: BlockchainDatabase,
    pub mempool: Mempool,
    pub wallet: TestWallet,
    pub outputs: Vec<OwnedOutput>,
    pub delegate_wallets: HashMap<DelegateId, TestWallet>,
}

impl TestChain {
    pub fn new(constants: ConsensusConstants) -> Self {
        Self::with_config(constants, BlockchainDatabaseConfig::default())
    }

    pub fn new_on_disk(constants: ConsensusConstants, data_dir: std::path::PathBuf) -> Self {
        Self::with_config(constants, BlockchainDatabaseConfig {
            data_dir: Some(data_dir),
        })
    }

    fn with_config(constants: ConsensusConstants, config: BlockchainDatabaseConfig) -> Self {
        let consensus = ConsensusManager::builder(Network::LocalNet)
            .with_consensus_constants(constants)
            .build();
        let db = BlockchainDatabase::new(config, consensus).unwrap();
        let mempool = Mempool::new(db.clone(), MempoolConfig::default());
        TestChain {
            db,
            mempool,
            wallet: TestWallet::new(),
            outputs: Vec::new(),
            delegate_wallets: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &ConsensusConstants {
        self.db.rules()
    }

    pub fn height(&self) -> u64 {
        self.db.height().unwrap()
    }

    /// The deterministic timestamp this harness gives the block at `height`: one difficulty
    /// target after its parent, so retargeting stays flat.
    pub fn timestamp_for_height(&self, height: u64) -> u64 {
        self.rules().genesis_timestamp + height * self.rules().difficulty_target
    }

    /// Mines one PoW block through the template path, including whatever is ready in the pool.
    pub fn mine_pow_block(&mut self) -> Block {
        let (mut block, difficulty, height) = self
            .db
            .create_block_template(&self.mempool, &self.wallet.address(), false, b"")
            .unwrap();
        block.header.timestamp = self.timestamp_for_height(height);
        mine_block(&mut block, difficulty);

        let bodies = self.mempool.retrieve_transactions(&block.tx_hashes).unwrap();
        let result = self.db.add_block(block.clone(), bodies).unwrap();
        assert!(result.is_added(), "mined block was not added");
        self.mempool.process_published_block(&block).unwrap();
        self.collect_coinbase(&block);
        block
    }

    pub fn mine_pow_blocks(&mut self, count: u64) {
        for _ in 0..count {
            self.mine_pow_block();
        }
    }

    fn collect_coinbase(&mut self, block: &Block) {
        let owned = self.wallet.scan_transaction(&self.db, &block.miner_tx);
        self.outputs.extend(owned);
    }

    /// Takes a spendable XPB output worth at least `min_amount`.
    pub fn take_spendable_output(&mut self, min_amount: u64) -> OwnedOutput {
        let height = self.height();
        let pos = self
            .outputs
            .iter()
            .position(|o| o.amount >= min_amount && height >= o.spendable_at)
            .expect("no spendable output large enough");
        self.outputs.remove(pos)
    }

    /// Inserts a transaction into the pool (asserting acceptance) and mines it into a block.
    pub fn submit_and_mine(&mut self, tx: Transaction) -> Block {
        let tvc = self.mempool.insert(tx).unwrap();
        assert!(tvc.added_to_pool, "transaction was rejected by the mempool");
        self.mine_pow_block()
    }

    /// Hand-builds a PoW block on an arbitrary parent (for growing alternative chains). The
    /// caller supplies the parent's accumulated coin count.
    pub fn build_pow_block_on(
        &self,
        parent: &Block,
        parent_height: u64,
        parent_generated_coins: u64,
        timestamp: u64,
        txs: &[Transaction],
    ) -> Block {
        let rules = self.rules();
        let height = parent_height + 1;
        let fee_summary: u64 = txs.iter().map(xpb_core::transactions::get_tx_fee).sum();
        let miner_tx = construct_miner_tx(
            rules,
            height,
            0,
            parent_generated_coins,
            0,
            fee_summary,
            &self.wallet.address(),
            b"",
            11,
        )
        .unwrap();
        let mut block = Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp,
                prev_id: parent.hash(),
                nonce: 0,
            },
            miner_tx,
            tx_hashes: txs.iter().map(|tx| tx.hash()).collect(),
            signing_delegate_id: 0,
            dpos_sig: Default::default(),
        };
        // generously above anything the localnet window retargets to
        mine_block(&mut block, 512);
        block
    }

    /// Registers a delegate with a fresh wallet, paying the current fee floor, and mines it in.
    pub fn register_delegate(&mut self, delegate_id: DelegateId) -> Address {
        let delegate_wallet = TestWallet::new();
        let address = delegate_wallet.address();
        let (_, required_fee) = self.db.get_dpos_register_info().unwrap();
        let miner_fee = xpb_core::consensus::DEFAULT_FEE;
        let funding = self.take_spendable_output(required_fee + miner_fee + 1);

        let mut builder = TestTxBuilder::new(xpb_core::transactions::TX_VERSION_DPOS);
        builder.add_spend(&funding);
        builder.add_input(
            TxIn::RegisterDelegate(xpb_core::transactions::RegisterDelegateInput {
                delegate_id,
                registration_fee: required_fee,
                delegate_address: address,
            }),
            xpb_core::transactions::CP_XPB,
        );
        builder.add_output(
            funding.amount - required_fee - miner_fee,
            xpb_core::transactions::CP_XPB,
        );
        let (tx, planned) = builder.build();
        let block = self.submit_and_mine(tx.clone());
        assert!(block.tx_hashes.contains(&tx.hash()));
        self.outputs.extend(confirm_outputs(&self.db, &tx, &planned));
        self.delegate_wallets.insert(delegate_id, delegate_wallet);
        address
    }

    /// Hand-builds and submits a DPoS block at `timestamp`, signed by whichever delegate the
    /// schedule selects. The transactions must already be validated pool entries.
    pub fn add_dpos_block(&mut self, timestamp: u64, txs: &[Transaction]) -> BlockAddResult {
        let rules = self.rules();
        let height = self.height();
        let prev = self.db.get_block_by_height(height - 1).unwrap().unwrap();
        let (_, average_fee) = self.db.block_reward_info(0).unwrap();
        let generated = self.db.already_generated_coins().unwrap();

        let miner_tx = construct_miner_tx(
            rules,
            height,
            0,
            generated,
            0,
            average_fee,
            &self.wallet.address(),
            b"",
            11,
        )
        .unwrap();
        let mut block = Block {
            header: BlockHeader {
                major_version: DPOS_BLOCK_MAJOR_VERSION,
                minor_version: DPOS_BLOCK_MINOR_VERSION,
                timestamp,
                prev_id: prev.hash(),
                nonce: 0,
            },
            miner_tx,
            tx_hashes: txs.iter().map(|tx| tx.hash()).collect(),
            signing_delegate_id: 0,
            dpos_sig: Default::default(),
        };
        let signer = self.db.signing_delegate(&prev, timestamp).unwrap();
        block.signing_delegate_id = signer;
        let delegate_wallet = self
            .delegate_wallets
            .get(&signer)
            .expect("scheduled delegate has no known wallet");
        sign_dpos_block(
            &mut block,
            &delegate_wallet.spend.public_key,
            &delegate_wallet.spend.secret_key,
        );

        let result = self.db.add_block(block.clone(), txs.to_vec()).unwrap();
        if result.is_added() {
            self.mempool.process_published_block(&block).unwrap();
            self.collect_coinbase(&block);
        }
        result
    }
}
