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

pub mod amount;
mod builder;
mod coin_type;
pub mod contract_grading;
mod transaction;
pub mod tx_extra;

pub use builder::{construct_miner_tx, decompose_amount_into_digits, MinerTxError};
pub use coin_type::{
    CoinContractType,
    CoinType,
    CurrencyMap,
    BACKED_BY_INVALID,
    BACKED_BY_N_A,
    CP_N_A,
    CP_XPB,
    CURRENCY_INVALID,
    CURRENCY_N_A,
    CURRENCY_XPB,
    MIN_USER_CURRENCY_ID,
};
pub use transaction::{
    check_inputs,
    check_inputs_outputs,
    check_inputs_types_supported,
    check_outputs,
    check_outputs_types_supported,
    check_outs_valid,
    get_outs_money_amount,
    get_tx_fee,
    CoinbaseInput,
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
    TransactionError,
    TransactionPrefix,
    TxIn,
    TxOut,
    TxOutTarget,
    VoteInput,
    MAX_TX_VERSION,
    TX_BLOB_TAG,
    TX_VERSION_CONTRACT,
    TX_VERSION_CURRENCY,
    TX_VERSION_DPOS,
    TX_VERSION_VANILLA,
};
