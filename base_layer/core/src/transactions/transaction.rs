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

//! The transaction model: eleven input kinds, one output kind, version-gated serialization.
//!
//! Each input and output carries its coin type out of band. Versions 1 and 2 predate
//! sub-currencies and serialize no coin types at all (readers synthesize all-XPB), version 3
//! serializes bare currency ids, version 4 the full triples. Dispatch is always on the explicit
//! version number.

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Read, Write},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xpb_common_types::{Address, DelegateId, TxHash};
use xpb_crypto::{cn_fast_hash, KeyImage, PublicKey, Signature};

use crate::{
    consensus::encoding::{
        invalid_data,
        read_byte_vec,
        read_fixed_bytes,
        read_varint,
        read_vec_len,
        write_byte_vec,
        write_varint,
        ConsensusDecoding,
        ConsensusEncoding,
    },
    transactions::{
        amount::{add_amount, sub_amount},
        coin_type::{CoinContractType, CoinType, CurrencyMap, BACKED_BY_N_A, CP_XPB},
    },
};

pub const TX_VERSION_VANILLA: u64 = 1;
pub const TX_VERSION_DPOS: u64 = 2;
pub const TX_VERSION_CURRENCY: u64 = 3;
pub const TX_VERSION_CONTRACT: u64 = 4;
pub const MAX_TX_VERSION: u64 = TX_VERSION_CONTRACT;

/// Tag byte identifying a transaction blob inside a tagged relay container.
pub const TX_BLOB_TAG: u8 = 0xcc;

const TAG_TXIN_COINBASE: u8 = 0xff;
const TAG_TXIN_KEY: u8 = 0x02;
const TAG_TXIN_MINT: u8 = 0x03;
const TAG_TXIN_REMINT: u8 = 0x04;
const TAG_TXIN_CREATE_CONTRACT: u8 = 0x05;
const TAG_TXIN_MINT_CONTRACT: u8 = 0x06;
const TAG_TXIN_GRADE_CONTRACT: u8 = 0x07;
const TAG_TXIN_RESOLVE_BC_COINS: u8 = 0x08;
const TAG_TXIN_FUSE_BC_COINS: u8 = 0x09;
const TAG_TXIN_REGISTER_DELEGATE: u8 = 0x0a;
const TAG_TXIN_VOTE: u8 = 0x0b;
const TAG_TXOUT_KEY: u8 = 0x02;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction version {0} is higher than the maximum supported version")]
    VersionTooHigh(u64),
    #[error("Coin type {coin_type} may not be carried by a version {version} transaction")]
    InvalidCoinTypeForVersion { coin_type: CoinType, version: u64 },
    #[error("Input kind requires at least transaction version {required}, transaction is version {version}")]
    InputRequiresNewerVersion { required: u64, version: u64 },
    #[error("Amount overflow")]
    AmountOverflow,
    #[error("Not enough inputs of coin type {coin_type} to cover a burning input")]
    InsufficientInputsToBurn { coin_type: CoinType },
    #[error("For coin type {coin_type} the input sum {input} is less than the output sum {output}")]
    UnbalancedAmounts { coin_type: CoinType, input: u64, output: u64 },
    #[error("A coinbase input may only appear in a miner transaction")]
    UnexpectedCoinbaseInput,
    #[error("Coin type vector length does not match the input/output count")]
    CoinTypeCountMismatch,
    #[error("Signature count does not match the transaction's inputs")]
    SignatureLayoutMismatch,
}

// -- inputs --------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseInput {
    pub height: u64,
}

/// Spends an output by key image, hiding which ring member is being spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInput {
    pub amount: u64,
    /// Relative offsets into the per-(coin type, amount) output index.
    pub key_offsets: Vec<u64>,
    pub key_image: KeyImage,
}

/// Creates a new sub-currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintInput {
    pub currency: u64,
    pub description: String,
    pub decimals: u64,
    pub amount: u64,
    /// Null for a fixed-supply currency.
    pub remint_key: PublicKey,
}

/// Adds to a sub-currency's supply, rotating the remint key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemintInput {
    pub currency: u64,
    pub amount: u64,
    pub new_remint_key: PublicKey,
    /// Signature under the currency's current remint key.
    pub signature: Signature,
}

impl RemintInput {
    /// The hash the current remint key must sign.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(b"txin_remint sig");
        write_varint(&mut buf, self.currency).expect("writing to Vec<u8> is infallible");
        write_varint(&mut buf, self.amount).expect("writing to Vec<u8> is infallible");
        buf.extend_from_slice(self.new_remint_key.as_bytes());
        cn_fast_hash(&buf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContractInput {
    pub contract: u64,
    pub description: String,
    /// Key that may grade the contract. Must be a valid, non-null key.
    pub grading_key: PublicKey,
    /// Fraction of the graded pool paid to the grader, scaled to [0, GRADE_SCALE_MAX].
    pub fee_scale: u32,
    /// Block at which the contract expires if not graded by then.
    pub expiry_block: u64,
    /// Grade applied on expiry; no fee is taken in that case.
    pub default_grade: u32,
}

/// Burns `amount` of the backing currency, emitting that many backing and contract coins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintContractInput {
    pub contract: u64,
    pub backing_currency: u64,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeContractInput {
    pub contract: u64,
    pub grade: u32,
    /// Per-currency fees the grader claims. Unclaimed fees are destroyed.
    pub fee_amounts: BTreeMap<u64, u64>,
    /// Signature under the contract's grading key.
    pub signature: Signature,
}

impl GradeContractInput {
    /// The hash the grading key must sign.
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(b"txin_grade_contract sig");
        write_varint(&mut buf, self.contract).expect("writing to Vec<u8> is infallible");
        write_varint(&mut buf, u64::from(self.grade)).expect("writing to Vec<u8> is infallible");
        for (currency, amount) in &self.fee_amounts {
            write_varint(&mut buf, *currency).expect("writing to Vec<u8> is infallible");
            write_varint(&mut buf, *amount).expect("writing to Vec<u8> is infallible");
        }
        cn_fast_hash(&buf)
    }
}

/// Converts graded backing or contract coins back to the backing currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveBcCoinsInput {
    pub contract: u64,
    /// 1 to resolve backing coins, 0 to resolve contract coins.
    pub is_backing_coins: u8,
    pub backing_currency: u64,
    /// Amount of backing/contract coins consumed by this input.
    pub source_amount: u64,
    /// Amount of the backing currency this input makes spendable. Must equal the grading function
    /// applied to `source_amount` exactly.
    pub graded_amount: u64,
}

/// Destroys one backing plus one contract coin to reclaim one backing-currency coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuseBcCoinsInput {
    pub contract: u64,
    pub backing_currency: u64,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDelegateInput {
    pub delegate_id: DelegateId,
    /// Burned, not paid to anyone.
    pub registration_fee: u64,
    pub delegate_address: Address,
}

/// Votes an XPB output's weight for up to N delegates. The embedded key input proves ownership
/// without marking the image spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteInput {
    pub ink: KeyInput,
    /// 0 for the first vote from this image, 1 for the first revote, and so on.
    pub seq: u16,
    pub votes: BTreeSet<DelegateId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxIn {
    Coinbase(CoinbaseInput),
    Key(KeyInput),
    Mint(MintInput),
    Remint(RemintInput),
    CreateContract(CreateContractInput),
    MintContract(MintContractInput),
    GradeContract(GradeContractInput),
    ResolveBcCoins(ResolveBcCoinsInput),
    FuseBcCoins(FuseBcCoinsInput),
    RegisterDelegate(RegisterDelegateInput),
    Vote(VoteInput),
}

impl TxIn {
    /// The number of signatures this input carries in the signature vector.
    pub fn signature_size(&self) -> usize {
        match self {
            TxIn::Key(inp) => inp.key_offsets.len(),
            TxIn::Vote(inp) => inp.ink.key_offsets.len(),
            _ => 0,
        }
    }

    /// The lowest transaction format version that may carry this input kind.
    pub fn minimum_tx_version(&self) -> u64 {
        match self {
            TxIn::Coinbase(_) | TxIn::Key(_) => TX_VERSION_VANILLA,
            TxIn::RegisterDelegate(_) | TxIn::Vote(_) => TX_VERSION_DPOS,
            TxIn::Mint(_) | TxIn::Remint(_) => TX_VERSION_CURRENCY,
            TxIn::CreateContract(_) |
            TxIn::MintContract(_) |
            TxIn::GradeContract(_) |
            TxIn::ResolveBcCoins(_) |
            TxIn::FuseBcCoins(_) => TX_VERSION_CONTRACT,
        }
    }

    /// One-word name for logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TxIn::Coinbase(_) => "coinbase",
            TxIn::Key(_) => "key",
            TxIn::Mint(_) => "mint",
            TxIn::Remint(_) => "remint",
            TxIn::CreateContract(_) => "create_contract",
            TxIn::MintContract(_) => "mint_contract",
            TxIn::GradeContract(_) => "grade_contract",
            TxIn::ResolveBcCoins(_) => "resolve_bc_coins",
            TxIn::FuseBcCoins(_) => "fuse_bc_coins",
            TxIn::RegisterDelegate(_) => "register_delegate",
            TxIn::Vote(_) => "vote",
        }
    }
}

// -- outputs -------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxOutTarget {
    /// Payment to a one-time (stealth) output key.
    Key { key: PublicKey },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub amount: u64,
    pub target: TxOutTarget,
}

impl TxOut {
    pub fn to_key(amount: u64, key: PublicKey) -> Self {
        TxOut {
            amount,
            target: TxOutTarget::Key { key },
        }
    }

    pub fn key(&self) -> &PublicKey {
        match &self.target {
            TxOutTarget::Key { key } => key,
        }
    }
}

// -- prefix & transaction ------------------------------------------------------------------------

/// Everything covered by the prefix hash: version, unlock time, inputs, outputs, extra and the
/// version-gated coin-type vectors. Signatures live on [`Transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPrefix {
    pub version: u64,
    /// Block height (or unix time, above `max_block_number`) before which outputs are locked.
    pub unlock_time: u64,
    vin: Vec<TxIn>,
    vout: Vec<TxOut>,
    pub extra: Vec<u8>,
    vin_coin_types: Vec<CoinType>,
    vout_coin_types: Vec<CoinType>,
}

impl TransactionPrefix {
    pub fn new(version: u64) -> Self {
        TransactionPrefix {
            version,
            ..Default::default()
        }
    }

    pub fn inputs(&self) -> &[TxIn] {
        &self.vin
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.vout
    }

    /// The coin type carried alongside input `index`. Parallel-vector lengths are enforced by
    /// every constructor and decoder.
    pub fn in_cp(&self, index: usize) -> CoinType {
        self.vin_coin_types[index]
    }

    pub fn out_cp(&self, index: usize) -> CoinType {
        self.vout_coin_types[index]
    }

    pub fn add_input(&mut self, input: TxIn, coin_type: CoinType) -> Result<(), TransactionError> {
        self.vin.push(input);
        self.vin_coin_types.push(coin_type);
        self.validate_coin_types()
    }

    pub fn add_output(&mut self, output: TxOut, coin_type: CoinType) -> Result<(), TransactionError> {
        self.vout.push(output);
        self.vout_coin_types.push(coin_type);
        self.validate_coin_types()
    }

    /// Checks that every coin type and input kind is representable and allowed at this version.
    pub fn validate_coin_types(&self) -> Result<(), TransactionError> {
        if self.version > MAX_TX_VERSION {
            return Err(TransactionError::VersionTooHigh(self.version));
        }
        if self.vin.len() != self.vin_coin_types.len() || self.vout.len() != self.vout_coin_types.len() {
            return Err(TransactionError::CoinTypeCountMismatch);
        }
        for ct in self.vin_coin_types.iter().chain(self.vout_coin_types.iter()) {
            if !ct.is_valid_tx_version(self.version) {
                return Err(TransactionError::InvalidCoinTypeForVersion {
                    coin_type: *ct,
                    version: self.version,
                });
            }
            // the on-wire representation must be able to carry the triple
            match self.version {
                TX_VERSION_VANILLA | TX_VERSION_DPOS => {
                    if *ct != CP_XPB {
                        return Err(TransactionError::InvalidCoinTypeForVersion {
                            coin_type: *ct,
                            version: self.version,
                        });
                    }
                },
                TX_VERSION_CURRENCY => {
                    if ct.contract_type != CoinContractType::NotContract || ct.backed_by_currency != BACKED_BY_N_A {
                        return Err(TransactionError::InvalidCoinTypeForVersion {
                            coin_type: *ct,
                            version: self.version,
                        });
                    }
                },
                _ => {},
            }
        }
        for input in &self.vin {
            let required = input.minimum_tx_version();
            if self.version < required {
                return Err(TransactionError::InputRequiresNewerVersion {
                    required,
                    version: self.version,
                });
            }
        }
        Ok(())
    }

    /// The hash signed by spend inputs: everything except the signatures.
    pub fn prefix_hash(&self) -> [u8; 32] {
        cn_fast_hash(&self.to_consensus_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub prefix: TransactionPrefix,
    /// One signature vector per input; each sized by [`TxIn::signature_size`].
    pub signatures: Vec<Vec<Signature>>,
}

impl Transaction {
    pub fn hash(&self) -> TxHash {
        TxHash::from(cn_fast_hash(&self.to_consensus_bytes()))
    }

    pub fn blob_size(&self) -> u64 {
        self.to_consensus_bytes().len() as u64
    }

    pub fn is_coinbase(&self) -> bool {
        self.prefix.inputs().len() == 1 && matches!(self.prefix.inputs()[0], TxIn::Coinbase(_))
    }

    /// Wraps the consensus bytes in the relay container tag.
    pub fn to_tagged_bytes(&self) -> Vec<u8> {
        let mut buf = vec![TX_BLOB_TAG];
        self.consensus_encode(&mut buf).expect("writing to Vec<u8> is infallible");
        buf
    }

    pub fn from_tagged_bytes(bytes: &[u8]) -> Result<Self, io::Error> {
        match bytes.split_first() {
            Some((&TX_BLOB_TAG, rest)) => Transaction::from_consensus_bytes(rest),
            _ => Err(invalid_data("unknown transaction blob tag")),
        }
    }

    fn validate_signature_layout(&self) -> Result<(), TransactionError> {
        if self.signatures.len() != self.prefix.inputs().len() {
            return Err(TransactionError::SignatureLayoutMismatch);
        }
        for (input, sigs) in self.prefix.inputs().iter().zip(&self.signatures) {
            if input.signature_size() != sigs.len() {
                return Err(TransactionError::SignatureLayoutMismatch);
            }
        }
        Ok(())
    }
}

// -- balance -------------------------------------------------------------------------------------

fn map_entry(map: &mut CurrencyMap, coin_type: CoinType) -> &mut u64 {
    map.entry(coin_type).or_insert(0)
}

/// Accumulates the spendable amounts each input contributes, processed in input order.
///
/// The contract kinds both consume and produce: MintContract burns the backing currency and emits
/// the two coin streams, ResolveBC swaps graded coins for the backing currency, FuseBC swaps a
/// matched pair back. Consumption underflows (and therefore fails) unless the covering inputs
/// appear earlier in the list.
fn process_txin_amounts(tx: &Transaction, index: usize, amounts: &mut CurrencyMap) -> Result<(), TransactionError> {
    let cp = tx.prefix.in_cp(index);
    match &tx.prefix.inputs()[index] {
        TxIn::Coinbase(_) => return Err(TransactionError::UnexpectedCoinbaseInput),
        TxIn::Key(inp) => {
            if !add_amount(map_entry(amounts, cp), inp.amount) {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::Mint(inp) => {
            if !add_amount(map_entry(amounts, cp), inp.amount) {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::Remint(inp) => {
            if !add_amount(map_entry(amounts, cp), inp.amount) {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::CreateContract(_) => {
            map_entry(amounts, cp);
        },
        TxIn::MintContract(inp) => {
            let backing_cp = CoinType::currency(inp.backing_currency);
            if !sub_amount(map_entry(amounts, backing_cp), inp.amount) {
                return Err(TransactionError::InsufficientInputsToBurn { coin_type: backing_cp });
            }
            let backing_coin = CoinType::new(inp.contract, CoinContractType::BackingCoin, inp.backing_currency);
            let contract_coin = CoinType::new(inp.contract, CoinContractType::ContractCoin, inp.backing_currency);
            if !add_amount(map_entry(amounts, backing_coin), inp.amount) ||
                !add_amount(map_entry(amounts, contract_coin), inp.amount)
            {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::GradeContract(inp) => {
            map_entry(amounts, cp);
            for (currency, amount) in &inp.fee_amounts {
                if !add_amount(map_entry(amounts, CoinType::currency(*currency)), *amount) {
                    return Err(TransactionError::AmountOverflow);
                }
            }
        },
        TxIn::ResolveBcCoins(inp) => {
            let contract_type = if inp.is_backing_coins != 0 {
                CoinContractType::BackingCoin
            } else {
                CoinContractType::ContractCoin
            };
            let source_cp = CoinType::new(inp.contract, contract_type, inp.backing_currency);
            if !sub_amount(map_entry(amounts, source_cp), inp.source_amount) {
                return Err(TransactionError::InsufficientInputsToBurn { coin_type: source_cp });
            }
            if !add_amount(map_entry(amounts, CoinType::currency(inp.backing_currency)), inp.graded_amount) {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::FuseBcCoins(inp) => {
            let backing_coin = CoinType::new(inp.contract, CoinContractType::BackingCoin, inp.backing_currency);
            let contract_coin = CoinType::new(inp.contract, CoinContractType::ContractCoin, inp.backing_currency);
            if !sub_amount(map_entry(amounts, backing_coin), inp.amount) {
                return Err(TransactionError::InsufficientInputsToBurn { coin_type: backing_coin });
            }
            if !sub_amount(map_entry(amounts, contract_coin), inp.amount) {
                return Err(TransactionError::InsufficientInputsToBurn { coin_type: contract_coin });
            }
            if !add_amount(map_entry(amounts, CoinType::currency(inp.backing_currency)), inp.amount) {
                return Err(TransactionError::AmountOverflow);
            }
        },
        TxIn::RegisterDelegate(inp) => {
            // the registration fee is burned
            if !sub_amount(map_entry(amounts, CP_XPB), inp.registration_fee) {
                return Err(TransactionError::InsufficientInputsToBurn { coin_type: CP_XPB });
            }
        },
        TxIn::Vote(_) => {
            // voting weight is not spendable value
        },
    }
    Ok(())
}

/// Sums input-side value per coin type, in input order.
pub fn check_inputs(tx: &Transaction) -> Result<CurrencyMap, TransactionError> {
    let mut amounts = CurrencyMap::new();
    for index in 0..tx.prefix.inputs().len() {
        process_txin_amounts(tx, index, &mut amounts)?;
    }
    Ok(amounts)
}

/// Sums output value per coin type.
pub fn check_outputs(tx: &Transaction) -> Result<CurrencyMap, TransactionError> {
    let mut amounts = CurrencyMap::new();
    for (index, out) in tx.prefix.outputs().iter().enumerate() {
        if !add_amount(map_entry(&mut amounts, tx.prefix.out_cp(index)), out.amount) {
            return Err(TransactionError::AmountOverflow);
        }
    }
    Ok(amounts)
}

/// Conservation of value: for every coin type the inputs must cover the outputs; the XPB surplus
/// is the fee.
pub fn check_inputs_outputs(tx: &Transaction) -> Result<(CurrencyMap, CurrencyMap, u64), TransactionError> {
    let ins = check_inputs(tx)?;
    let outs = check_outputs(tx)?;
    for (coin_type, out_amount) in &outs {
        let in_amount = ins.get(coin_type).copied().unwrap_or(0);
        if in_amount < *out_amount {
            return Err(TransactionError::UnbalancedAmounts {
                coin_type: *coin_type,
                input: in_amount,
                output: *out_amount,
            });
        }
    }
    let fee = ins.get(&CP_XPB).copied().unwrap_or(0) - outs.get(&CP_XPB).copied().unwrap_or(0);
    Ok((ins, outs, fee))
}

/// The fee of a (non-coinbase) transaction, or 0 if it does not balance.
pub fn get_tx_fee(tx: &Transaction) -> u64 {
    check_inputs_outputs(tx).map(|(_, _, fee)| fee).unwrap_or(0)
}

/// Total output value per coin type.
pub fn get_outs_money_amount(tx: &Transaction) -> CurrencyMap {
    let mut result = CurrencyMap::new();
    for (index, out) in tx.prefix.outputs().iter().enumerate() {
        *result.entry(tx.prefix.out_cp(index)).or_insert(0) += out.amount;
    }
    result
}

/// True when every input kind may enter the mempool (everything except coinbase).
pub fn check_inputs_types_supported(tx: &Transaction) -> bool {
    !tx.prefix.inputs().iter().any(|inp| matches!(inp, TxIn::Coinbase(_)))
}

/// All output targets are understood by this node.
pub fn check_outputs_types_supported(tx: &Transaction) -> bool {
    tx.prefix
        .outputs()
        .iter()
        .all(|out| matches!(out.target, TxOutTarget::Key { .. }))
}

/// Non-zero amounts paying valid keys.
pub fn check_outs_valid(tx: &Transaction) -> bool {
    tx.prefix
        .outputs()
        .iter()
        .all(|out| out.amount > 0 && xpb_crypto::check_key(out.key()))
}

// -- consensus encoding --------------------------------------------------------------------------

impl ConsensusEncoding for CoinType {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        write_varint(writer, self.currency)?;
        write_varint(writer, self.contract_type.as_u64())?;
        write_varint(writer, self.backed_by_currency)
    }
}

impl ConsensusDecoding for CoinType {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let currency = read_varint(reader)?;
        let contract_type = CoinContractType::from_u64(read_varint(reader)?)
            .ok_or_else(|| invalid_data("unknown coin contract type"))?;
        let backed_by_currency = read_varint(reader)?;
        Ok(CoinType::new(currency, contract_type, backed_by_currency))
    }
}

fn write_signature<W: Write>(writer: &mut W, signature: &Signature) -> Result<(), io::Error> {
    writer.write_all(&signature.to_bytes())
}

fn read_signature<R: Read>(reader: &mut R) -> Result<Signature, io::Error> {
    let bytes: [u8; 64] = read_fixed_bytes(reader)?;
    Ok(Signature::from_bytes(&bytes))
}

fn write_key_input<W: Write>(writer: &mut W, inp: &KeyInput) -> Result<(), io::Error> {
    write_varint(writer, inp.amount)?;
    write_varint(writer, inp.key_offsets.len() as u64)?;
    for offset in &inp.key_offsets {
        write_varint(writer, *offset)?;
    }
    writer.write_all(inp.key_image.as_bytes())
}

fn read_key_input<R: Read>(reader: &mut R) -> Result<KeyInput, io::Error> {
    let amount = read_varint(reader)?;
    let count = read_vec_len(reader)?;
    let mut key_offsets = Vec::with_capacity(count);
    for _ in 0..count {
        key_offsets.push(read_varint(reader)?);
    }
    let key_image = KeyImage(read_fixed_bytes(reader)?);
    Ok(KeyInput {
        amount,
        key_offsets,
        key_image,
    })
}

impl ConsensusEncoding for TxIn {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        match self {
            TxIn::Coinbase(inp) => {
                writer.write_all(&[TAG_TXIN_COINBASE])?;
                write_varint(writer, inp.height)
            },
            TxIn::Key(inp) => {
                writer.write_all(&[TAG_TXIN_KEY])?;
                write_key_input(writer, inp)
            },
            TxIn::Mint(inp) => {
                writer.write_all(&[TAG_TXIN_MINT])?;
                write_varint(writer, inp.currency)?;
                write_byte_vec(writer, inp.description.as_bytes())?;
                write_varint(writer, inp.decimals)?;
                write_varint(writer, inp.amount)?;
                writer.write_all(inp.remint_key.as_bytes())
            },
            TxIn::Remint(inp) => {
                writer.write_all(&[TAG_TXIN_REMINT])?;
                write_varint(writer, inp.currency)?;
                write_varint(writer, inp.amount)?;
                writer.write_all(inp.new_remint_key.as_bytes())?;
                write_signature(writer, &inp.signature)
            },
            TxIn::CreateContract(inp) => {
                writer.write_all(&[TAG_TXIN_CREATE_CONTRACT])?;
                write_varint(writer, inp.contract)?;
                write_byte_vec(writer, inp.description.as_bytes())?;
                writer.write_all(inp.grading_key.as_bytes())?;
                write_varint(writer, u64::from(inp.fee_scale))?;
                write_varint(writer, inp.expiry_block)?;
                write_varint(writer, u64::from(inp.default_grade))
            },
            TxIn::MintContract(inp) => {
                writer.write_all(&[TAG_TXIN_MINT_CONTRACT])?;
                write_varint(writer, inp.contract)?;
                write_varint(writer, inp.backing_currency)?;
                write_varint(writer, inp.amount)
            },
            TxIn::GradeContract(inp) => {
                writer.write_all(&[TAG_TXIN_GRADE_CONTRACT])?;
                write_varint(writer, inp.contract)?;
                write_varint(writer, u64::from(inp.grade))?;
                write_varint(writer, inp.fee_amounts.len() as u64)?;
                for (currency, amount) in &inp.fee_amounts {
                    write_varint(writer, *currency)?;
                    write_varint(writer, *amount)?;
                }
                write_signature(writer, &inp.signature)
            },
            TxIn::ResolveBcCoins(inp) => {
                writer.write_all(&[TAG_TXIN_RESOLVE_BC_COINS])?;
                write_varint(writer, inp.contract)?;
                write_varint(writer, u64::from(inp.is_backing_coins))?;
                write_varint(writer, inp.backing_currency)?;
                write_varint(writer, inp.source_amount)?;
                write_varint(writer, inp.graded_amount)
            },
            TxIn::FuseBcCoins(inp) => {
                writer.write_all(&[TAG_TXIN_FUSE_BC_COINS])?;
                write_varint(writer, inp.contract)?;
                write_varint(writer, inp.backing_currency)?;
                write_varint(writer, inp.amount)
            },
            TxIn::RegisterDelegate(inp) => {
                writer.write_all(&[TAG_TXIN_REGISTER_DELEGATE])?;
                write_varint(writer, u64::from(inp.delegate_id))?;
                write_varint(writer, inp.registration_fee)?;
                writer.write_all(inp.delegate_address.public_spend_key.as_bytes())?;
                writer.write_all(inp.delegate_address.public_view_key.as_bytes())
            },
            TxIn::Vote(inp) => {
                writer.write_all(&[TAG_TXIN_VOTE])?;
                write_key_input(writer, &inp.ink)?;
                write_varint(writer, u64::from(inp.seq))?;
                write_varint(writer, inp.votes.len() as u64)?;
                for delegate_id in &inp.votes {
                    write_varint(writer, u64::from(*delegate_id))?;
                }
                Ok(())
            },
        }
    }
}

impl ConsensusDecoding for TxIn {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let tag: [u8; 1] = read_fixed_bytes(reader)?;
        match tag[0] {
            TAG_TXIN_COINBASE => Ok(TxIn::Coinbase(CoinbaseInput {
                height: read_varint(reader)?,
            })),
            TAG_TXIN_KEY => Ok(TxIn::Key(read_key_input(reader)?)),
            TAG_TXIN_MINT => {
                let currency = read_varint(reader)?;
                let description = String::from_utf8(read_byte_vec(reader)?)
                    .map_err(|_| invalid_data("mint description is not valid utf-8"))?;
                let decimals = read_varint(reader)?;
                let amount = read_varint(reader)?;
                let remint_key = PublicKey(read_fixed_bytes(reader)?);
                Ok(TxIn::Mint(MintInput {
                    currency,
                    description,
                    decimals,
                    amount,
                    remint_key,
                }))
            },
            TAG_TXIN_REMINT => Ok(TxIn::Remint(RemintInput {
                currency: read_varint(reader)?,
                amount: read_varint(reader)?,
                new_remint_key: PublicKey(read_fixed_bytes(reader)?),
                signature: read_signature(reader)?,
            })),
            TAG_TXIN_CREATE_CONTRACT => {
                let contract = read_varint(reader)?;
                let description = String::from_utf8(read_byte_vec(reader)?)
                    .map_err(|_| invalid_data("contract description is not valid utf-8"))?;
                let grading_key = PublicKey(read_fixed_bytes(reader)?);
                let fee_scale = u32::try_from(read_varint(reader)?)
                    .map_err(|_| invalid_data("fee scale out of range"))?;
                let expiry_block = read_varint(reader)?;
                let default_grade = u32::try_from(read_varint(reader)?)
                    .map_err(|_| invalid_data("default grade out of range"))?;
                Ok(TxIn::CreateContract(CreateContractInput {
                    contract,
                    description,
                    grading_key,
                    fee_scale,
                    expiry_block,
                    default_grade,
                }))
            },
            TAG_TXIN_MINT_CONTRACT => Ok(TxIn::MintContract(MintContractInput {
                contract: read_varint(reader)?,
                backing_currency: read_varint(reader)?,
                amount: read_varint(reader)?,
            })),
            TAG_TXIN_GRADE_CONTRACT => {
                let contract = read_varint(reader)?;
                let grade =
                    u32::try_from(read_varint(reader)?).map_err(|_| invalid_data("grade out of range"))?;
                let count = read_vec_len(reader)?;
                let mut fee_amounts = BTreeMap::new();
                for _ in 0..count {
                    let currency = read_varint(reader)?;
                    let amount = read_varint(reader)?;
                    if fee_amounts.insert(currency, amount).is_some() {
                        return Err(invalid_data("duplicate currency in grade fee amounts"));
                    }
                }
                let signature = read_signature(reader)?;
                Ok(TxIn::GradeContract(GradeContractInput {
                    contract,
                    grade,
                    fee_amounts,
                    signature,
                }))
            },
            TAG_TXIN_RESOLVE_BC_COINS => Ok(TxIn::ResolveBcCoins(ResolveBcCoinsInput {
                contract: read_varint(reader)?,
                is_backing_coins: u8::try_from(read_varint(reader)?)
                    .map_err(|_| invalid_data("is_backing_coins out of range"))?,
                backing_currency: read_varint(reader)?,
                source_amount: read_varint(reader)?,
                graded_amount: read_varint(reader)?,
            })),
            TAG_TXIN_FUSE_BC_COINS => Ok(TxIn::FuseBcCoins(FuseBcCoinsInput {
                contract: read_varint(reader)?,
                backing_currency: read_varint(reader)?,
                amount: read_varint(reader)?,
            })),
            TAG_TXIN_REGISTER_DELEGATE => {
                let delegate_id = u16::try_from(read_varint(reader)?)
                    .map_err(|_| invalid_data("delegate id out of range"))?;
                let registration_fee = read_varint(reader)?;
                let public_spend_key = PublicKey(read_fixed_bytes(reader)?);
                let public_view_key = PublicKey(read_fixed_bytes(reader)?);
                Ok(TxIn::RegisterDelegate(RegisterDelegateInput {
                    delegate_id,
                    registration_fee,
                    delegate_address: Address::new(public_spend_key, public_view_key),
                }))
            },
            TAG_TXIN_VOTE => {
                let ink = read_key_input(reader)?;
                let seq =
                    u16::try_from(read_varint(reader)?).map_err(|_| invalid_data("vote seq out of range"))?;
                let count = read_vec_len(reader)?;
                let mut votes = BTreeSet::new();
                for _ in 0..count {
                    let delegate_id = u16::try_from(read_varint(reader)?)
                        .map_err(|_| invalid_data("delegate id out of range"))?;
                    if !votes.insert(delegate_id) {
                        return Err(invalid_data("duplicate delegate in vote set"));
                    }
                }
                Ok(TxIn::Vote(VoteInput { ink, seq, votes }))
            },
            _ => Err(invalid_data("unknown transaction input tag")),
        }
    }
}

impl ConsensusEncoding for TxOut {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        write_varint(writer, self.amount)?;
        match &self.target {
            TxOutTarget::Key { key } => {
                writer.write_all(&[TAG_TXOUT_KEY])?;
                writer.write_all(key.as_bytes())
            },
        }
    }
}

impl ConsensusDecoding for TxOut {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let amount = read_varint(reader)?;
        let tag: [u8; 1] = read_fixed_bytes(reader)?;
        match tag[0] {
            TAG_TXOUT_KEY => Ok(TxOut {
                amount,
                target: TxOutTarget::Key {
                    key: PublicKey(read_fixed_bytes(reader)?),
                },
            }),
            _ => Err(invalid_data("unknown transaction output tag")),
        }
    }
}

impl ConsensusEncoding for TransactionPrefix {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        if self.validate_coin_types().is_err() {
            return Err(invalid_data("transaction has invalid coin types for its version"));
        }
        write_varint(writer, self.version)?;
        write_varint(writer, self.unlock_time)?;
        write_varint(writer, self.vin.len() as u64)?;
        for input in &self.vin {
            input.consensus_encode(writer)?;
        }
        write_varint(writer, self.vout.len() as u64)?;
        for output in &self.vout {
            output.consensus_encode(writer)?;
        }
        write_byte_vec(writer, &self.extra)?;
        match self.version {
            TX_VERSION_VANILLA | TX_VERSION_DPOS => {},
            TX_VERSION_CURRENCY => {
                write_varint(writer, self.vin_coin_types.len() as u64)?;
                for ct in &self.vin_coin_types {
                    write_varint(writer, ct.currency)?;
                }
                write_varint(writer, self.vout_coin_types.len() as u64)?;
                for ct in &self.vout_coin_types {
                    write_varint(writer, ct.currency)?;
                }
            },
            TX_VERSION_CONTRACT => {
                write_varint(writer, self.vin_coin_types.len() as u64)?;
                for ct in &self.vin_coin_types {
                    ct.consensus_encode(writer)?;
                }
                write_varint(writer, self.vout_coin_types.len() as u64)?;
                for ct in &self.vout_coin_types {
                    ct.consensus_encode(writer)?;
                }
            },
            _ => return Err(invalid_data("unknown transaction version")),
        }
        Ok(())
    }
}

impl ConsensusDecoding for TransactionPrefix {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let version = read_varint(reader)?;
        if version > MAX_TX_VERSION {
            return Err(invalid_data("transaction version too new"));
        }
        let unlock_time = read_varint(reader)?;
        let vin_len = read_vec_len(reader)?;
        let mut vin = Vec::with_capacity(vin_len);
        for _ in 0..vin_len {
            vin.push(TxIn::consensus_decode(reader)?);
        }
        let vout_len = read_vec_len(reader)?;
        let mut vout = Vec::with_capacity(vout_len);
        for _ in 0..vout_len {
            vout.push(TxOut::consensus_decode(reader)?);
        }
        let extra = read_byte_vec(reader)?;

        let (vin_coin_types, vout_coin_types) = match version {
            TX_VERSION_VANILLA | TX_VERSION_DPOS => (vec![CP_XPB; vin.len()], vec![CP_XPB; vout.len()]),
            TX_VERSION_CURRENCY => {
                let in_len = read_vec_len(reader)?;
                let mut ins = Vec::with_capacity(in_len);
                for _ in 0..in_len {
                    ins.push(CoinType::currency(read_varint(reader)?));
                }
                let out_len = read_vec_len(reader)?;
                let mut outs = Vec::with_capacity(out_len);
                for _ in 0..out_len {
                    outs.push(CoinType::currency(read_varint(reader)?));
                }
                (ins, outs)
            },
            TX_VERSION_CONTRACT => {
                let in_len = read_vec_len(reader)?;
                let mut ins = Vec::with_capacity(in_len);
                for _ in 0..in_len {
                    ins.push(CoinType::consensus_decode(reader)?);
                }
                let out_len = read_vec_len(reader)?;
                let mut outs = Vec::with_capacity(out_len);
                for _ in 0..out_len {
                    outs.push(CoinType::consensus_decode(reader)?);
                }
                (ins, outs)
            },
            _ => return Err(invalid_data("unknown transaction version")),
        };

        let prefix = TransactionPrefix {
            version,
            unlock_time,
            vin,
            vout,
            extra,
            vin_coin_types,
            vout_coin_types,
        };
        prefix
            .validate_coin_types()
            .map_err(|_| invalid_data("transaction has invalid coin types for its version"))?;
        Ok(prefix)
    }
}

impl ConsensusEncoding for Transaction {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        if self.validate_signature_layout().is_err() {
            return Err(invalid_data("signature layout does not match inputs"));
        }
        self.prefix.consensus_encode(writer)?;
        for sigs in &self.signatures {
            for signature in sigs {
                write_signature(writer, signature)?;
            }
        }
        Ok(())
    }
}

impl ConsensusDecoding for Transaction {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let prefix = TransactionPrefix::consensus_decode(reader)?;
        let mut signatures = Vec::with_capacity(prefix.inputs().len());
        for input in prefix.inputs() {
            let mut sigs = Vec::with_capacity(input.signature_size());
            for _ in 0..input.signature_size() {
                sigs.push(read_signature(reader)?);
            }
            signatures.push(sigs);
        }
        Ok(Transaction { prefix, signatures })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transactions::coin_type::{CP_N_A, CURRENCY_XPB};
    use xpb_crypto::generate_keys;

    fn round_trip(tx: &Transaction) -> Transaction {
        let bytes = tx.to_consensus_bytes();
        let decoded = Transaction::from_consensus_bytes(&bytes).unwrap();
        assert_eq!(&decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
        decoded
    }

    fn key_input(amount: u64, ring_size: usize) -> KeyInput {
        KeyInput {
            amount,
            key_offsets: vec![1; ring_size],
            key_image: KeyImage([7u8; 32]),
        }
    }

    #[test]
    fn v1_spend_round_trip() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        prefix.add_input(TxIn::Key(key_input(100, 3)), CP_XPB).unwrap();
        prefix.add_output(TxOut::to_key(90, key), CP_XPB).unwrap();
        let tx = Transaction {
            prefix,
            signatures: vec![vec![Signature::null(); 3]],
        };
        round_trip(&tx);
    }

    #[test]
    fn v2_vote_and_register_round_trip() {
        let (spend, _) = generate_keys();
        let (view, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_DPOS);
        prefix.add_input(TxIn::Key(key_input(1000, 1)), CP_XPB).unwrap();
        prefix
            .add_input(
                TxIn::RegisterDelegate(RegisterDelegateInput {
                    delegate_id: 12,
                    registration_fee: 500,
                    delegate_address: Address::new(spend, view),
                }),
                CP_XPB,
            )
            .unwrap();
        prefix
            .add_input(
                TxIn::Vote(VoteInput {
                    ink: key_input(250, 2),
                    seq: 1,
                    votes: [3u16, 9, 12].into_iter().collect(),
                }),
                CP_XPB,
            )
            .unwrap();
        prefix.add_output(TxOut::to_key(400, spend), CP_XPB).unwrap();
        let tx = Transaction {
            signatures: vec![vec![Signature::null(); 1], vec![], vec![Signature::null(); 2]],
            prefix,
        };
        round_trip(&tx);
    }

    #[test]
    fn v3_mint_round_trip() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_CURRENCY);
        prefix
            .add_input(
                TxIn::Mint(MintInput {
                    currency: 256,
                    description: "silver".to_string(),
                    decimals: 2,
                    amount: 10_000,
                    remint_key: key,
                }),
                CoinType::currency(256),
            )
            .unwrap();
        prefix.add_output(TxOut::to_key(10_000, key), CoinType::currency(256)).unwrap();
        let tx = Transaction {
            signatures: vec![vec![]],
            prefix,
        };
        round_trip(&tx);
    }

    #[test]
    fn v4_contract_kinds_round_trip() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_CONTRACT);
        prefix
            .add_input(
                TxIn::CreateContract(CreateContractInput {
                    contract: 300,
                    description: "rain on friday".to_string(),
                    grading_key: key,
                    fee_scale: 50_000_000,
                    expiry_block: 10_000,
                    default_grade: 0,
                }),
                CP_N_A,
            )
            .unwrap();
        prefix
            .add_input(
                TxIn::GradeContract(GradeContractInput {
                    contract: 301,
                    grade: 300_000_000,
                    fee_amounts: [(CURRENCY_XPB, 41u64), (256u64, 7u64)].into_iter().collect(),
                    signature: Signature::null(),
                }),
                CP_N_A,
            )
            .unwrap();
        prefix
            .add_input(
                TxIn::ResolveBcCoins(ResolveBcCoinsInput {
                    contract: 301,
                    is_backing_coins: 1,
                    backing_currency: CURRENCY_XPB,
                    source_amount: 1000,
                    graded_amount: 700,
                }),
                CoinType::currency(CURRENCY_XPB),
            )
            .unwrap();
        prefix
            .add_input(
                TxIn::FuseBcCoins(FuseBcCoinsInput {
                    contract: 300,
                    backing_currency: CURRENCY_XPB,
                    amount: 5,
                }),
                CoinType::currency(CURRENCY_XPB),
            )
            .unwrap();
        let tx = Transaction {
            signatures: vec![vec![]; 4],
            prefix,
        };
        round_trip(&tx);
    }

    #[test]
    fn version_gating_rejects_low_versions() {
        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        let err = prefix.add_input(
            TxIn::Mint(MintInput {
                currency: 256,
                description: String::new(),
                decimals: 0,
                amount: 1,
                remint_key: PublicKey::null(),
            }),
            CoinType::currency(256),
        );
        assert!(err.is_err());

        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        let err = prefix.add_input(
            TxIn::Vote(VoteInput {
                ink: key_input(1, 1),
                seq: 0,
                votes: BTreeSet::new(),
            }),
            CP_XPB,
        );
        assert!(err.is_err());
    }

    #[test]
    fn v3_cannot_carry_contract_roles() {
        let mut prefix = TransactionPrefix::new(TX_VERSION_CURRENCY);
        let err = prefix.add_input(
            TxIn::Key(key_input(1, 1)),
            CoinType::new(300, CoinContractType::BackingCoin, CURRENCY_XPB),
        );
        assert!(err.is_err());
    }

    #[test]
    fn mint_contract_balance_flows() {
        // spend 1000 XPB, mint 1000 backing + 1000 contract coins of contract 300
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_CONTRACT);
        prefix.add_input(TxIn::Key(key_input(1100, 1)), CP_XPB).unwrap();
        prefix
            .add_input(
                TxIn::MintContract(MintContractInput {
                    contract: 300,
                    backing_currency: CURRENCY_XPB,
                    amount: 1000,
                }),
                CP_N_A,
            )
            .unwrap();
        let backing = CoinType::new(300, CoinContractType::BackingCoin, CURRENCY_XPB);
        let contract = CoinType::new(300, CoinContractType::ContractCoin, CURRENCY_XPB);
        prefix.add_output(TxOut::to_key(1000, key), backing).unwrap();
        prefix.add_output(TxOut::to_key(1000, key), contract).unwrap();
        let tx = Transaction {
            signatures: vec![vec![Signature::null()], vec![]],
            prefix,
        };
        let (_, _, fee) = check_inputs_outputs(&tx).unwrap();
        assert_eq!(fee, 100);
    }

    #[test]
    fn burning_input_before_covering_spend_fails() {
        let mut prefix = TransactionPrefix::new(TX_VERSION_CONTRACT);
        prefix
            .add_input(
                TxIn::MintContract(MintContractInput {
                    contract: 300,
                    backing_currency: CURRENCY_XPB,
                    amount: 1000,
                }),
                CP_N_A,
            )
            .unwrap();
        prefix.add_input(TxIn::Key(key_input(1000, 1)), CP_XPB).unwrap();
        let tx = Transaction {
            signatures: vec![vec![], vec![Signature::null()]],
            prefix,
        };
        assert!(matches!(
            check_inputs_outputs(&tx),
            Err(TransactionError::InsufficientInputsToBurn { .. })
        ));
    }

    #[test]
    fn outputs_exceeding_inputs_fail() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        prefix.add_input(TxIn::Key(key_input(100, 1)), CP_XPB).unwrap();
        prefix.add_output(TxOut::to_key(101, key), CP_XPB).unwrap();
        let tx = Transaction {
            signatures: vec![vec![Signature::null()]],
            prefix,
        };
        assert!(matches!(
            check_inputs_outputs(&tx),
            Err(TransactionError::UnbalancedAmounts { .. })
        ));
    }

    #[test]
    fn tagged_blob_round_trip() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        prefix.add_input(TxIn::Key(key_input(10, 1)), CP_XPB).unwrap();
        prefix.add_output(TxOut::to_key(10, key), CP_XPB).unwrap();
        let tx = Transaction {
            signatures: vec![vec![Signature::null()]],
            prefix,
        };
        let blob = tx.to_tagged_bytes();
        assert_eq!(blob[0], TX_BLOB_TAG);
        assert_eq!(Transaction::from_tagged_bytes(&blob).unwrap(), tx);
        assert!(Transaction::from_tagged_bytes(&[0xbb]).is_err());
    }

    #[test]
    fn prefix_hash_ignores_signatures() {
        let (key, _) = generate_keys();
        let mut prefix = TransactionPrefix::new(TX_VERSION_VANILLA);
        prefix.add_input(TxIn::Key(key_input(10, 1)), CP_XPB).unwrap();
        prefix.add_output(TxOut::to_key(10, key), CP_XPB).unwrap();
        let unsigned = Transaction {
            prefix: prefix.clone(),
            signatures: vec![vec![Signature::null()]],
        };
        let signed = Transaction {
            prefix,
            signatures: vec![vec![Signature {
                c: [1u8; 32],
                r: [2u8; 32],
            }]],
        };
        assert_eq!(unsigned.prefix.prefix_hash(), signed.prefix.prefix_hash());
        assert_ne!(unsigned.hash(), signed.hash());
    }
}
