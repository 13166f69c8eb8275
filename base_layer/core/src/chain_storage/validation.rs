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

//! Transaction and block validation against the current ledger.
//!
//! A single pass runs the per-kind check for every input in order, then the conservation-of-value
//! check groups amounts by coin type. All checks are read-only; state only changes once the whole
//! block is known to apply.

use log::debug;
use thiserror::Error;
use xpb_common_types::DelegateId;
use xpb_crypto::{check_key, check_ring_signature, check_signature, PublicKey};

use crate::{
    blocks::{check_dpos_block_sig, Block},
    chain_storage::ledger_state::LedgerState,
    consensus::{median, ConsensusConstants},
    dpos::{elapsed_slots, nth_sorted_item_after},
    transactions::{
        amount::{add_would_overflow, sub_would_underflow},
        check_inputs_outputs,
        check_outputs,
        check_outs_valid,
        contract_grading::{calculate_total_fee, grade_backing_amount, grade_contract_amount, GRADE_SCALE_MAX},
        CoinType,
        CreateContractInput,
        FuseBcCoinsInput,
        GradeContractInput,
        KeyInput,
        MintContractInput,
        MintInput,
        RegisterDelegateInput,
        RemintInput,
        ResolveBcCoinsInput,
        Transaction,
        TxIn,
        VoteInput,
        CP_N_A,
        CP_XPB,
        CURRENCY_XPB,
        MIN_USER_CURRENCY_ID,
    },
};

const LOG_TARGET: &str = "c::cs::validation";

#[derive(Debug, Error)]
pub enum ValidationError {
    // spend inputs
    #[error("Spend input has no key offsets")]
    EmptyKeyOffsets,
    #[error("Key image has already been spent")]
    KeyImageSpent,
    #[error("Ring references an output that does not exist for {coin_type} amount {amount}")]
    RingMemberNotFound { coin_type: CoinType, amount: u64 },
    #[error("Ring references an output that is still locked")]
    RingMemberLocked,
    #[error("Ring size does not match the signature count")]
    RingSizeMismatch,
    #[error("Ring signature verification failed")]
    RingSignature,
    // mint/remint
    #[error("Currency id {0} is reserved")]
    ReservedCurrencyId(u64),
    #[error("Input coin type does not match the input kind")]
    CoinTypeMismatch,
    #[error("Invalid remint key")]
    InvalidRemintKey,
    #[error("Currency or contract id {0} already exists")]
    IdAlreadyExists(u64),
    #[error("Unknown currency {0}")]
    UnknownCurrency(u64),
    #[error("Description exceeds the maximum size")]
    DescriptionTooLong,
    #[error("Description is already in use")]
    DescriptionAlreadyUsed,
    #[error("Currency {0} is not remintable")]
    CurrencyNotRemintable(u64),
    #[error("Amount must be non-zero")]
    ZeroAmount,
    #[error("Amount arithmetic would overflow")]
    AmountOverflow,
    #[error("Signature does not verify")]
    BadSignature,
    // contracts
    #[error("Unknown contract {0}")]
    UnknownContract(u64),
    #[error("Invalid grading key")]
    InvalidGradingKey,
    #[error("Contract expiry block {expiry} is not beyond the current height {height}")]
    ExpiryNotInFuture { expiry: u64, height: u64 },
    #[error("Contract expiry block is beyond the maximum block number")]
    ExpiryTooLarge,
    #[error("Scale value exceeds GRADE_SCALE_MAX")]
    ScaleTooLarge,
    #[error("Contract {0} has already been graded")]
    ContractAlreadyGraded(u64),
    #[error("Contract {0} has expired")]
    ContractExpired(u64),
    #[error("A contract cannot be backed by another contract")]
    BackedByContract(u64),
    #[error("Grade fee entry claims {claimed} but exactly {allowed} is allowed")]
    WrongGradeFee { claimed: u64, allowed: u64 },
    #[error("Grade fee entry of zero should not be present")]
    ZeroGradeFee,
    #[error("Resolve claims {claimed} graded coins, the grading functions give {correct}")]
    WrongResolveAmount { claimed: u64, correct: u64 },
    #[error("Resolving to zero coins is not allowed")]
    ResolveToZero,
    #[error("Contract {0} is neither graded nor expired")]
    ContractNotResolved(u64),
    #[error("Not enough coins were minted against the contract to fuse this amount")]
    FuseUnderflow,
    #[error("Flag field must be 0 or 1")]
    InvalidFlag,
    // delegates and votes
    #[error("Delegate operations open at height {start}, current height is {height}")]
    DelegateRegistrationNotOpen { height: u64, start: u64 },
    #[error("Delegate id 0 is reserved")]
    ReservedDelegateId,
    #[error("Delegate id {0} is already registered")]
    DelegateIdAlreadyUsed(DelegateId),
    #[error("Delegate address is already registered")]
    DelegateAddressAlreadyUsed,
    #[error("Registration fee {provided} is below the required {required}")]
    RegistrationFeeTooLow { provided: u64, required: u64 },
    #[error("Delegate address keys are invalid")]
    InvalidDelegateAddress,
    #[error("Votes must be cast with the base coin")]
    VoteNotXpb,
    #[error("Voting for {count} delegates exceeds the maximum of {max}")]
    TooManyVotes { count: usize, max: usize },
    #[error("Vote sequence number {actual} does not match the expected {expected}")]
    WrongVoteSeq { expected: u64, actual: u64 },
    #[error("Vote for unregistered delegate {0}")]
    VoteForUnknownDelegate(DelegateId),
    // structure & balance
    #[error("Unsupported input or output kind")]
    UnsupportedKind,
    #[error("Transaction balance check failed: {0}")]
    Balance(#[from] crate::transactions::TransactionError),
    #[error("Transaction outputs are malformed")]
    InvalidOutputs,
    // block level
    #[error("Block timestamp is too far in the future")]
    TimestampTooFarInFuture,
    #[error("Block timestamp is below the median of recent blocks")]
    TimestampBelowMedian,
    #[error("DPoS block timestamp is less than the minimum spacing after its parent")]
    TimestampTooClose,
    #[error("Block has the wrong sealing type for its height")]
    WrongBlockType,
    #[error("Proof of work does not meet difficulty {0}")]
    DifficultyNotMet(u64),
    #[error("Could not compute the block's long hash")]
    MissingLongHash,
    #[error("Block names signing delegate {actual}, the schedule requires {expected}")]
    WrongSigningDelegate { expected: DelegateId, actual: DelegateId },
    #[error("DPoS block signature is invalid")]
    InvalidDposSignature,
    #[error("Previous block not found")]
    PrevBlockNotFound,
    #[error("No delegates are registered to sign DPoS blocks")]
    NoDelegates,
    #[error("Checkpoint validation failed")]
    CheckpointMismatch,
    #[error("Alternative block is below the last checkpoint")]
    AltBlockBelowCheckpoint,
    // miner transaction
    #[error("Miner transaction must have exactly one coinbase input")]
    MinerTxWrongInputs,
    #[error("Miner transaction height {actual} does not match the block height {expected}")]
    MinerTxWrongHeight { expected: u64, actual: u64 },
    #[error("Miner transaction unlock time {actual} must be {expected}")]
    MinerTxWrongUnlockTime { expected: u64, actual: u64 },
    #[error("Block is too big for any reward")]
    BlockTooBig,
    #[error("Miner transaction spends {spent}, the reward is {reward}")]
    MinerTxWrongAmount { spent: u64, reward: u64 },
    // lookups that should not fail on healthy state
    #[error("Chain lookup failed: {0}")]
    ChainLookup(String),
}

fn relative_output_offsets_to_absolute(offsets: &[u64]) -> Option<Vec<u64>> {
    let mut absolute = Vec::with_capacity(offsets.len());
    let mut total = 0u64;
    for offset in offsets {
        total = total.checked_add(*offset)?;
        absolute.push(total);
    }
    Some(absolute)
}

impl LedgerState {
    /// Finds a block by id on the main chain or any alternative chain.
    pub fn get_block_by_hash(&self, id: &xpb_common_types::BlockHash) -> Option<Block> {
        if let Some(height) = self.blocks_index.get(id) {
            return self.blocks.get(*height as usize).map(|bei| bei.block.clone());
        }
        self.alternative_chains.get(id).map(|alt| alt.block.clone())
    }

    /// Resolves a spend input's ring to the referenced output keys, checking existence, coin
    /// type and maturity, and raising `max_used_height` to the newest referenced block.
    fn scan_output_keys(
        &self,
        rules: &ConsensusConstants,
        coin_type: CoinType,
        inp: &KeyInput,
        now: u64,
        max_used_height: &mut u64,
    ) -> Result<Vec<PublicKey>, ValidationError> {
        let absolute = relative_output_offsets_to_absolute(&inp.key_offsets)
            .ok_or(ValidationError::AmountOverflow)?;
        let index = self
            .outputs
            .get(&(coin_type, inp.amount))
            .ok_or(ValidationError::RingMemberNotFound {
                coin_type,
                amount: inp.amount,
            })?;

        let mut keys = Vec::with_capacity(absolute.len());
        for global_index in absolute {
            let (tx_id, out_i) =
                index
                    .get(global_index as usize)
                    .ok_or(ValidationError::RingMemberNotFound {
                        coin_type,
                        amount: inp.amount,
                    })?;
            let entry = self
                .transactions
                .get(tx_id)
                .ok_or_else(|| ValidationError::ChainLookup(format!("output index references unknown tx {tx_id}")))?;
            if entry.tx.prefix.out_cp(*out_i) != coin_type {
                return Err(ValidationError::ChainLookup(
                    "output index entry has inconsistent coin type".into(),
                ));
            }
            if !self.is_tx_spendtime_unlocked(rules, entry.tx.prefix.unlock_time, now) {
                return Err(ValidationError::RingMemberLocked);
            }
            keys.push(*entry.tx.prefix.outputs()[*out_i].key());
            *max_used_height = (*max_used_height).max(entry.keeper_block_height);
        }
        Ok(keys)
    }

    fn check_tx_in_to_key(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        index: usize,
        inp: &KeyInput,
        tx_prefix_hash: &[u8; 32],
        now: u64,
        in_checkpoint_zone: bool,
        max_used_height: &mut u64,
    ) -> Result<(), ValidationError> {
        if inp.key_offsets.is_empty() {
            return Err(ValidationError::EmptyKeyOffsets);
        }
        if self.is_key_image_spent(&inp.key_image) {
            debug!(target: LOG_TARGET, "Key image already spent: {}", inp.key_image);
            return Err(ValidationError::KeyImageSpent);
        }

        let coin_type = tx.prefix.in_cp(index);
        let output_keys = self.scan_output_keys(rules, coin_type, inp, now, max_used_height)?;
        let signatures = tx
            .signatures
            .get(index)
            .ok_or(ValidationError::RingSizeMismatch)?;
        if signatures.len() != output_keys.len() {
            return Err(ValidationError::RingSizeMismatch);
        }

        // inside the checkpointed zone the signatures are vouched for by the checkpoint
        if in_checkpoint_zone {
            return Ok(());
        }
        if !check_ring_signature(tx_prefix_hash, &inp.key_image, &output_keys, signatures) {
            return Err(ValidationError::RingSignature);
        }
        Ok(())
    }

    fn check_tx_in_mint(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        index: usize,
        inp: &MintInput,
    ) -> Result<(), ValidationError> {
        if inp.currency < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.currency));
        }
        if tx.prefix.in_cp(index) != CoinType::currency(inp.currency) {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if !inp.remint_key.is_null() && !check_key(&inp.remint_key) {
            return Err(ValidationError::InvalidRemintKey);
        }
        if inp.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        if self.currencies.contains_key(&inp.currency) || self.contracts.contains_key(&inp.currency) {
            return Err(ValidationError::IdAlreadyExists(inp.currency));
        }
        if !inp.description.is_empty() {
            if inp.description.len() > rules.currency_description_max_size {
                return Err(ValidationError::DescriptionTooLong);
            }
            if self.used_descriptions.contains(&inp.description) {
                return Err(ValidationError::DescriptionAlreadyUsed);
            }
        }
        Ok(())
    }

    fn check_tx_in_remint(
        &self,
        tx: &Transaction,
        index: usize,
        inp: &RemintInput,
    ) -> Result<(), ValidationError> {
        if inp.currency < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.currency));
        }
        if tx.prefix.in_cp(index) != CoinType::currency(inp.currency) {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if !inp.new_remint_key.is_null() && !check_key(&inp.new_remint_key) {
            return Err(ValidationError::InvalidRemintKey);
        }
        if inp.amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        let info = self
            .currencies
            .get(&inp.currency)
            .ok_or(ValidationError::UnknownCurrency(inp.currency))?;
        if info.remint_key().is_null() {
            return Err(ValidationError::CurrencyNotRemintable(inp.currency));
        }
        if add_would_overflow(info.total_amount_minted, inp.amount) {
            return Err(ValidationError::AmountOverflow);
        }
        if !check_signature(&inp.signing_hash(), &info.remint_key(), &inp.signature) {
            return Err(ValidationError::BadSignature);
        }
        Ok(())
    }

    fn check_tx_in_create_contract(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        index: usize,
        inp: &CreateContractInput,
    ) -> Result<(), ValidationError> {
        if inp.contract < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.contract));
        }
        if tx.prefix.in_cp(index) != CP_N_A {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if inp.grading_key.is_null() || !check_key(&inp.grading_key) {
            return Err(ValidationError::InvalidGradingKey);
        }
        if inp.expiry_block <= self.height() {
            return Err(ValidationError::ExpiryNotInFuture {
                expiry: inp.expiry_block,
                height: self.height(),
            });
        }
        if inp.expiry_block >= rules.max_block_number {
            return Err(ValidationError::ExpiryTooLarge);
        }
        if inp.fee_scale > GRADE_SCALE_MAX || inp.default_grade > GRADE_SCALE_MAX {
            return Err(ValidationError::ScaleTooLarge);
        }
        if self.currencies.contains_key(&inp.contract) || self.contracts.contains_key(&inp.contract) {
            return Err(ValidationError::IdAlreadyExists(inp.contract));
        }
        if !inp.description.is_empty() {
            if inp.description.len() > rules.contract_description_max_size {
                return Err(ValidationError::DescriptionTooLong);
            }
            if self.used_descriptions.contains(&inp.description) {
                return Err(ValidationError::DescriptionAlreadyUsed);
            }
        }
        Ok(())
    }

    fn check_tx_in_mint_contract(
        &self,
        tx: &Transaction,
        index: usize,
        inp: &MintContractInput,
    ) -> Result<(), ValidationError> {
        if tx.prefix.in_cp(index) != CP_N_A {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if inp.contract < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.contract));
        }
        let info = self
            .contracts
            .get(&inp.contract)
            .ok_or(ValidationError::UnknownContract(inp.contract))?;
        if info.is_graded {
            return Err(ValidationError::ContractAlreadyGraded(inp.contract));
        }
        if self.height() >= info.expiry_block {
            return Err(ValidationError::ContractExpired(inp.contract));
        }
        let minted = info.total_amount_minted.get(&inp.backing_currency).copied().unwrap_or(0);
        if add_would_overflow(minted, inp.amount) {
            return Err(ValidationError::AmountOverflow);
        }
        if inp.backing_currency != CURRENCY_XPB {
            if self.contracts.contains_key(&inp.backing_currency) {
                return Err(ValidationError::BackedByContract(inp.backing_currency));
            }
            if !self.currencies.contains_key(&inp.backing_currency) {
                return Err(ValidationError::UnknownCurrency(inp.backing_currency));
            }
        }
        // the conservation check ensures there are enough coins to burn
        Ok(())
    }

    fn check_tx_in_grade_contract(
        &self,
        tx: &Transaction,
        index: usize,
        inp: &GradeContractInput,
    ) -> Result<(), ValidationError> {
        if tx.prefix.in_cp(index) != CP_N_A {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if inp.contract < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.contract));
        }
        if inp.grade > GRADE_SCALE_MAX {
            return Err(ValidationError::ScaleTooLarge);
        }
        let info = self
            .contracts
            .get(&inp.contract)
            .ok_or(ValidationError::UnknownContract(inp.contract))?;
        for currency in inp.fee_amounts.keys() {
            if *currency != CURRENCY_XPB && !self.currencies.contains_key(currency) {
                return Err(ValidationError::UnknownCurrency(*currency));
            }
        }
        if info.is_graded {
            return Err(ValidationError::ContractAlreadyGraded(inp.contract));
        }
        if self.height() >= info.expiry_block {
            return Err(ValidationError::ContractExpired(inp.contract));
        }
        for (currency, amount) in &inp.fee_amounts {
            if *amount == 0 {
                return Err(ValidationError::ZeroGradeFee);
            }
            let minted = info.total_amount_minted.get(currency).copied().unwrap_or(0);
            let allowed = calculate_total_fee(minted, info.fee_scale);
            if *amount != allowed {
                return Err(ValidationError::WrongGradeFee {
                    claimed: *amount,
                    allowed,
                });
            }
        }
        if !check_signature(&inp.signing_hash(), &info.grading_key, &inp.signature) {
            return Err(ValidationError::BadSignature);
        }
        Ok(())
    }

    fn check_tx_in_resolve_bc_coins(
        &self,
        tx: &Transaction,
        index: usize,
        inp: &ResolveBcCoinsInput,
    ) -> Result<(), ValidationError> {
        if tx.prefix.in_cp(index) != CoinType::currency(inp.backing_currency) {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if inp.contract < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.contract));
        }
        let info = self
            .contracts
            .get(&inp.contract)
            .ok_or(ValidationError::UnknownContract(inp.contract))?;
        if inp.is_backing_coins > 1 {
            return Err(ValidationError::InvalidFlag);
        }

        // graded: use the recorded grade and fee; expired unresolved: the default grade, no fee
        let (grade, fee_scale) = if info.is_graded {
            (info.grade, info.fee_scale)
        } else if self.height() >= info.expiry_block {
            (info.default_grade, 0)
        } else {
            return Err(ValidationError::ContractNotResolved(inp.contract));
        };

        let correct = if inp.is_backing_coins == 1 {
            grade_backing_amount(inp.source_amount, grade, fee_scale)
        } else {
            grade_contract_amount(inp.source_amount, grade, fee_scale)
        };
        if inp.graded_amount != correct {
            return Err(ValidationError::WrongResolveAmount {
                claimed: inp.graded_amount,
                correct,
            });
        }
        if correct == 0 {
            return Err(ValidationError::ResolveToZero);
        }
        // the conservation check ensures enough backing/contract coins are present
        Ok(())
    }

    fn check_tx_in_fuse_bc_coins(
        &self,
        tx: &Transaction,
        index: usize,
        inp: &FuseBcCoinsInput,
    ) -> Result<(), ValidationError> {
        if tx.prefix.in_cp(index) != CoinType::currency(inp.backing_currency) {
            return Err(ValidationError::CoinTypeMismatch);
        }
        if inp.contract < MIN_USER_CURRENCY_ID {
            return Err(ValidationError::ReservedCurrencyId(inp.contract));
        }
        let info = self
            .contracts
            .get(&inp.contract)
            .ok_or(ValidationError::UnknownContract(inp.contract))?;
        if info.is_graded {
            return Err(ValidationError::ContractAlreadyGraded(inp.contract));
        }
        if self.height() >= info.expiry_block {
            return Err(ValidationError::ContractExpired(inp.contract));
        }
        let minted = info.total_amount_minted.get(&inp.backing_currency).copied().unwrap_or(0);
        if sub_would_underflow(minted, inp.amount) {
            return Err(ValidationError::FuseUnderflow);
        }
        Ok(())
    }

    fn check_tx_in_register_delegate(
        &self,
        rules: &ConsensusConstants,
        inp: &RegisterDelegateInput,
    ) -> Result<(), ValidationError> {
        if self.height() < rules.dpos_registration_start_block {
            return Err(ValidationError::DelegateRegistrationNotOpen {
                height: self.height(),
                start: rules.dpos_registration_start_block,
            });
        }
        if inp.delegate_id == 0 {
            return Err(ValidationError::ReservedDelegateId);
        }
        if self.delegates.contains_key(&inp.delegate_id) {
            return Err(ValidationError::DelegateIdAlreadyUsed(inp.delegate_id));
        }
        if self.delegates.values().any(|d| d.public_address == inp.delegate_address) {
            return Err(ValidationError::DelegateAddressAlreadyUsed);
        }

        let mut for_height = self.height();
        if self.popping_block {
            for_height -= 1;
        }
        let average = self
            .average_past_block_fees(for_height)
            .map_err(|e| ValidationError::ChainLookup(e.to_string()))?;
        let required = (average.saturating_mul(rules.dpos_registration_fee_multiple))
            .max(rules.dpos_min_registration_fee);
        if inp.registration_fee < required {
            return Err(ValidationError::RegistrationFeeTooLow {
                provided: inp.registration_fee,
                required,
            });
        }
        if !check_key(&inp.delegate_address.public_spend_key) ||
            !check_key(&inp.delegate_address.public_view_key) ||
            inp.delegate_address.public_spend_key.is_null() ||
            inp.delegate_address.public_view_key.is_null()
        {
            return Err(ValidationError::InvalidDelegateAddress);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_tx_in_vote(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        index: usize,
        inp: &VoteInput,
        tx_prefix_hash: &[u8; 32],
        now: u64,
        in_checkpoint_zone: bool,
        max_used_height: &mut u64,
    ) -> Result<(), ValidationError> {
        if self.height() < rules.dpos_registration_start_block {
            return Err(ValidationError::DelegateRegistrationNotOpen {
                height: self.height(),
                start: rules.dpos_registration_start_block,
            });
        }
        if tx.prefix.in_cp(index) != CP_XPB {
            return Err(ValidationError::VoteNotXpb);
        }
        if inp.votes.len() > rules.dpos_num_delegates {
            return Err(ValidationError::TooManyVotes {
                count: inp.votes.len(),
                max: rules.dpos_num_delegates,
            });
        }
        if self.is_key_image_spent(&inp.ink.key_image) {
            return Err(ValidationError::KeyImageSpent);
        }
        let expected_seq = self.next_vote_seq(&inp.ink.key_image);
        if u64::from(inp.seq) != expected_seq {
            return Err(ValidationError::WrongVoteSeq {
                expected: expected_seq,
                actual: u64::from(inp.seq),
            });
        }
        for delegate_id in &inp.votes {
            let info = self
                .delegates
                .get(delegate_id)
                .ok_or(ValidationError::VoteForUnknownDelegate(*delegate_id))?;
            if add_would_overflow(info.total_votes, inp.ink.amount) {
                return Err(ValidationError::AmountOverflow);
            }
        }
        self.check_tx_in_to_key(
            rules,
            tx,
            index,
            &inp.ink,
            tx_prefix_hash,
            now,
            in_checkpoint_zone,
            max_used_height,
        )
    }

    /// Runs the per-kind check for every input, in order. Returns the newest referenced block
    /// height so the mempool can cache validity against it.
    pub fn check_tx_inputs(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        now: u64,
        in_checkpoint_zone: bool,
    ) -> Result<u64, ValidationError> {
        let mut max_used_height = 0u64;
        let tx_prefix_hash = tx.prefix.prefix_hash();
        for (index, input) in tx.prefix.inputs().iter().enumerate() {
            match input {
                TxIn::Coinbase(_) => {},
                TxIn::Key(inp) => self.check_tx_in_to_key(
                    rules,
                    tx,
                    index,
                    inp,
                    &tx_prefix_hash,
                    now,
                    in_checkpoint_zone,
                    &mut max_used_height,
                )?,
                TxIn::Mint(inp) => self.check_tx_in_mint(rules, tx, index, inp)?,
                TxIn::Remint(inp) => self.check_tx_in_remint(tx, index, inp)?,
                TxIn::CreateContract(inp) => self.check_tx_in_create_contract(rules, tx, index, inp)?,
                TxIn::MintContract(inp) => self.check_tx_in_mint_contract(tx, index, inp)?,
                TxIn::GradeContract(inp) => self.check_tx_in_grade_contract(tx, index, inp)?,
                TxIn::ResolveBcCoins(inp) => self.check_tx_in_resolve_bc_coins(tx, index, inp)?,
                TxIn::FuseBcCoins(inp) => self.check_tx_in_fuse_bc_coins(tx, index, inp)?,
                TxIn::RegisterDelegate(inp) => self.check_tx_in_register_delegate(rules, inp)?,
                TxIn::Vote(inp) => self.check_tx_in_vote(
                    rules,
                    tx,
                    index,
                    inp,
                    &tx_prefix_hash,
                    now,
                    in_checkpoint_zone,
                    &mut max_used_height,
                )?,
            }
        }
        Ok(max_used_height)
    }

    /// Full transaction validation: conservation of value (non-miner only), then every input and
    /// output. Read-only.
    pub fn validate_tx(
        &self,
        rules: &ConsensusConstants,
        tx: &Transaction,
        is_miner_tx: bool,
        now: u64,
        in_checkpoint_zone: bool,
    ) -> Result<u64, ValidationError> {
        if !is_miner_tx {
            check_inputs_outputs(tx)?;
        }
        let max_used_height = self.check_tx_inputs(rules, tx, now, in_checkpoint_zone)?;
        if !check_outs_valid(tx) {
            return Err(ValidationError::InvalidOutputs);
        }
        Ok(max_used_height)
    }

    // -- miner transaction ----------------------------------------------------------------------

    pub(super) fn prevalidate_miner_transaction(
        &self,
        rules: &ConsensusConstants,
        block: &Block,
        height: u64,
    ) -> Result<(), ValidationError> {
        let miner_height = match block.miner_tx.prefix.inputs() {
            [TxIn::Coinbase(inp)] => inp.height,
            _ => return Err(ValidationError::MinerTxWrongInputs),
        };
        if miner_height != height {
            return Err(ValidationError::MinerTxWrongHeight {
                expected: height,
                actual: miner_height,
            });
        }
        let expected_unlock = height + rules.mined_money_unlock_window;
        if block.miner_tx.prefix.unlock_time != expected_unlock {
            return Err(ValidationError::MinerTxWrongUnlockTime {
                expected: expected_unlock,
                actual: block.miner_tx.prefix.unlock_time,
            });
        }
        // output amounts must not overflow
        check_outputs(&block.miner_tx)?;
        Ok(())
    }

    /// Checks the coinbase pays exactly `block_reward + fee` and returns the base reward.
    pub(super) fn validate_miner_transaction(
        &self,
        rules: &ConsensusConstants,
        block: &Block,
        cumulative_block_size: u64,
        fee: u64,
        already_generated_coins: u64,
    ) -> Result<u64, ValidationError> {
        let money_in_use: u64 = block.miner_tx.prefix.outputs().iter().map(|o| o.amount).sum();
        let last_sizes = self.get_last_n_blocks_sizes(rules.reward_blocks_window);
        let base_reward = crate::consensus::get_block_reward(
            rules,
            median(last_sizes),
            cumulative_block_size,
            already_generated_coins,
            block.height().unwrap_or(0),
        )
        .ok_or(ValidationError::BlockTooBig)?;
        if money_in_use != base_reward + fee {
            return Err(ValidationError::MinerTxWrongAmount {
                spent: money_in_use,
                reward: base_reward + fee,
            });
        }
        Ok(base_reward)
    }

    pub(super) fn get_backward_blocks_sizes(&self, from_height: u64, count: usize) -> Vec<u64> {
        let end = (from_height + 1).min(self.height());
        let start = end.saturating_sub(count as u64);
        (start..end)
            .map(|h| self.blocks[h as usize].block_cumulative_size)
            .collect()
    }

    pub(super) fn get_last_n_blocks_sizes(&self, count: usize) -> Vec<u64> {
        if self.blocks.is_empty() {
            return Vec::new();
        }
        self.get_backward_blocks_sizes(self.height() - 1, count)
    }

    pub(super) fn update_next_cumulative_size_limit(&mut self, rules: &ConsensusConstants) {
        let sizes = self.get_last_n_blocks_sizes(rules.reward_blocks_window);
        let med = median(sizes).max(rules.block_granted_full_reward_zone);
        self.current_block_cumul_sz_limit = med * 2;
    }

    // -- block header checks --------------------------------------------------------------------

    pub(super) fn check_block_type(&self, rules: &ConsensusConstants, block: &Block, height: u64) -> Result<(), ValidationError> {
        let should_be_pow = !rules.in_dpos_era(height);
        if should_be_pow != block.is_pow_block() {
            return Err(ValidationError::WrongBlockType);
        }
        Ok(())
    }

    pub(super) fn complete_timestamps_vector(&self, rules: &ConsensusConstants, start_top_height: u64, timestamps: &mut Vec<u64>) {
        if timestamps.len() >= rules.timestamp_check_window {
            return;
        }
        let need = rules.timestamp_check_window - timestamps.len();
        let mut height = start_top_height.min(self.height().saturating_sub(1));
        for _ in 0..need {
            timestamps.push(self.blocks[height as usize].block.header.timestamp);
            if height == 0 {
                break;
            }
            height -= 1;
        }
    }

    /// The timestamp rules shared by main-chain and alternative blocks: DPoS spacing against the
    /// parent and the median-of-window lower bound.
    pub(super) fn check_block_timestamp(
        &self,
        rules: &ConsensusConstants,
        timestamps: Vec<u64>,
        block: &Block,
        height: u64,
    ) -> Result<(), ValidationError> {
        if rules.in_dpos_era(height) {
            let prev = self
                .get_block_by_hash(&block.header.prev_id)
                .ok_or(ValidationError::PrevBlockNotFound)?;
            if block.header.timestamp < prev.header.timestamp + rules.dpos_min_block_spacing {
                return Err(ValidationError::TimestampTooClose);
            }
        }
        if timestamps.len() < rules.timestamp_check_window {
            return Ok(());
        }
        if block.header.timestamp < median(timestamps) {
            return Err(ValidationError::TimestampBelowMedian);
        }
        Ok(())
    }

    pub(super) fn check_block_timestamp_main(
        &self,
        rules: &ConsensusConstants,
        block: &Block,
        height: u64,
        now: u64,
    ) -> Result<(), ValidationError> {
        let limit = if rules.in_dpos_era(height) {
            rules.dpos_block_future_time_limit
        } else {
            rules.block_future_time_limit
        };
        if block.header.timestamp > now.saturating_add(limit) {
            return Err(ValidationError::TimestampTooFarInFuture);
        }
        let start = self.height().saturating_sub(rules.timestamp_check_window as u64);
        let timestamps: Vec<u64> = (start..self.height())
            .map(|h| self.blocks[h as usize].block.header.timestamp)
            .collect();
        self.check_block_timestamp(rules, timestamps, block, height)
    }

    // -- DPoS schedule --------------------------------------------------------------------------

    /// The delegate whose slot covers `for_timestamp`, given the previous block.
    pub fn get_signing_delegate(
        &self,
        rules: &ConsensusConstants,
        block_prev: &Block,
        for_timestamp: u64,
    ) -> Result<DelegateId, ValidationError> {
        if self.delegates.is_empty() || self.top_delegates.is_empty() {
            return Err(ValidationError::NoDelegates);
        }
        if for_timestamp < block_prev.header.timestamp + rules.dpos_min_block_spacing {
            return Err(ValidationError::TimestampTooClose);
        }
        let prev_height = block_prev.height().ok_or(ValidationError::PrevBlockNotFound)?;

        // at the switchover boundary the schedule starts from delegate 0
        let prev_delegate = if prev_height == rules.dpos_switch_block.saturating_sub(1) {
            if !block_prev.is_pow_block() {
                return Err(ValidationError::WrongBlockType);
            }
            0
        } else {
            if !block_prev.is_dpos_block() {
                return Err(ValidationError::WrongBlockType);
            }
            block_prev.signing_delegate_id
        };

        let slots = elapsed_slots(block_prev.header.timestamp, for_timestamp, rules.dpos_delegate_slot_time);
        let result = nth_sorted_item_after(&self.top_delegates, prev_delegate.wrapping_add(1), slots);
        debug!(
            target: LOG_TARGET,
            "Previous delegate was #{}, {} slot(s) elapsed, next delegate is #{}",
            prev_delegate,
            slots,
            result
        );
        Ok(result)
    }

    /// Verifies the seal: PoW difficulty for PoW blocks, the scheduled delegate's signature for
    /// DPoS blocks. Returns the PoW hash when one was computed.
    pub(super) fn check_pow_pos(
        &self,
        rules: &ConsensusConstants,
        block: &Block,
        current_difficulty: u64,
    ) -> Result<Option<xpb_common_types::FixedHash>, ValidationError> {
        if block.is_pow_block() {
            let proof_of_work =
                crate::proof_of_work::get_block_longhash(block).map_err(|_| ValidationError::MissingLongHash)?;
            if !crate::proof_of_work::check_hash(&proof_of_work, current_difficulty) {
                return Err(ValidationError::DifficultyNotMet(current_difficulty));
            }
            return Ok(Some(proof_of_work));
        }

        let prev_block = self
            .get_block_by_hash(&block.header.prev_id)
            .ok_or(ValidationError::PrevBlockNotFound)?;
        let signing_delegate = self.get_signing_delegate(rules, &prev_block, block.header.timestamp)?;
        if signing_delegate != block.signing_delegate_id {
            return Err(ValidationError::WrongSigningDelegate {
                expected: signing_delegate,
                actual: block.signing_delegate_id,
            });
        }
        let delegate = self
            .delegates
            .get(&signing_delegate)
            .ok_or(ValidationError::VoteForUnknownDelegate(signing_delegate))?;
        if !check_dpos_block_sig(block, &delegate.public_address) {
            return Err(ValidationError::InvalidDposSignature);
        }
        Ok(None)
    }
}
