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

//! Incremental compatibility checking across in-flight transaction inputs.
//!
//! Whether the inputs live in one transaction, across the pool, or in a half-filled block
//! template, the same rules apply: no key image twice, ids and descriptions minted once, one
//! remint per currency, and a grading input excludes concurrent mints and fuses of the same
//! contract (mints and fuses may coexist with each other).

use std::collections::{HashMap, HashSet};

use xpb_common_types::{Address, DelegateId};
use xpb_crypto::KeyImage;

use crate::transactions::{Transaction, TxIn};

#[derive(Debug, Clone, Default)]
pub struct InputCompatChecker {
    key_images: HashSet<KeyImage>,
    minted_currencies: HashSet<u64>,
    used_descriptions: HashSet<String>,
    reminted_currencies: HashSet<u64>,
    graded_contracts: HashSet<u64>,
    minted_contracts: HashMap<u64, usize>,
    fused_contracts: HashMap<u64, usize>,
    registered_delegate_ids: HashSet<DelegateId>,
    registered_addresses: HashSet<Address>,
}

fn gt_0(map: &HashMap<u64, usize>, key: u64) -> bool {
    map.get(&key).is_some_and(|count| *count > 0)
}

impl InputCompatChecker {
    pub fn new() -> Self {
        InputCompatChecker::default()
    }

    pub fn can_add_input(&self, input: &TxIn) -> bool {
        match input {
            TxIn::Coinbase(_) => false,
            TxIn::Key(inp) => !self.key_images.contains(&inp.key_image),
            TxIn::Mint(inp) => {
                !self.minted_currencies.contains(&inp.currency) &&
                    (inp.description.is_empty() || !self.used_descriptions.contains(&inp.description))
            },
            TxIn::Remint(inp) => !self.reminted_currencies.contains(&inp.currency),
            TxIn::CreateContract(inp) => {
                !self.minted_currencies.contains(&inp.contract) &&
                    (inp.description.is_empty() || !self.used_descriptions.contains(&inp.description))
            },
            // minting twice is fine, minting a contract being graded is not
            TxIn::MintContract(inp) => !self.graded_contracts.contains(&inp.contract),
            TxIn::GradeContract(inp) => {
                !self.graded_contracts.contains(&inp.contract) &&
                    !gt_0(&self.minted_contracts, inp.contract) &&
                    !gt_0(&self.fused_contracts, inp.contract)
            },
            TxIn::ResolveBcCoins(_) => true,
            TxIn::FuseBcCoins(inp) => !self.graded_contracts.contains(&inp.contract),
            TxIn::RegisterDelegate(inp) => {
                !self.registered_delegate_ids.contains(&inp.delegate_id) &&
                    !self.registered_addresses.contains(&inp.delegate_address)
            },
            TxIn::Vote(inp) => !self.key_images.contains(&inp.ink.key_image),
        }
    }

    /// Records an input's claims. Call only after `can_add_input` accepted it.
    pub fn add_input(&mut self, input: &TxIn) -> bool {
        match input {
            TxIn::Coinbase(_) => false,
            TxIn::Key(inp) => self.key_images.insert(inp.key_image),
            TxIn::Mint(inp) => {
                if !self.minted_currencies.insert(inp.currency) {
                    return false;
                }
                if !inp.description.is_empty() && !self.used_descriptions.insert(inp.description.clone()) {
                    return false;
                }
                true
            },
            TxIn::Remint(inp) => self.reminted_currencies.insert(inp.currency),
            TxIn::CreateContract(inp) => {
                if !self.minted_currencies.insert(inp.contract) {
                    return false;
                }
                if !inp.description.is_empty() && !self.used_descriptions.insert(inp.description.clone()) {
                    return false;
                }
                true
            },
            TxIn::MintContract(inp) => {
                *self.minted_contracts.entry(inp.contract).or_insert(0) += 1;
                true
            },
            TxIn::GradeContract(inp) => self.graded_contracts.insert(inp.contract),
            TxIn::ResolveBcCoins(_) => true,
            TxIn::FuseBcCoins(inp) => {
                *self.fused_contracts.entry(inp.contract).or_insert(0) += 1;
                true
            },
            TxIn::RegisterDelegate(inp) => {
                self.registered_delegate_ids.insert(inp.delegate_id) &&
                    self.registered_addresses.insert(inp.delegate_address)
            },
            TxIn::Vote(inp) => self.key_images.insert(inp.ink.key_image),
        }
    }

    /// Releases an input's claims. Exact inverse of `add_input`.
    pub fn remove_input(&mut self, input: &TxIn) -> bool {
        match input {
            TxIn::Coinbase(_) => false,
            TxIn::Key(inp) => self.key_images.remove(&inp.key_image),
            TxIn::Mint(inp) => {
                let removed = self.minted_currencies.remove(&inp.currency);
                if !inp.description.is_empty() {
                    return self.used_descriptions.remove(&inp.description) && removed;
                }
                removed
            },
            TxIn::Remint(inp) => self.reminted_currencies.remove(&inp.currency),
            TxIn::CreateContract(inp) => {
                let removed = self.minted_currencies.remove(&inp.contract);
                if !inp.description.is_empty() {
                    return self.used_descriptions.remove(&inp.description) && removed;
                }
                removed
            },
            TxIn::MintContract(inp) => match self.minted_contracts.get_mut(&inp.contract) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    true
                },
                _ => false,
            },
            TxIn::GradeContract(inp) => self.graded_contracts.remove(&inp.contract),
            TxIn::ResolveBcCoins(_) => true,
            TxIn::FuseBcCoins(inp) => match self.fused_contracts.get_mut(&inp.contract) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    true
                },
                _ => false,
            },
            TxIn::RegisterDelegate(inp) => {
                self.registered_delegate_ids.remove(&inp.delegate_id) &&
                    self.registered_addresses.remove(&inp.delegate_address)
            },
            TxIn::Vote(inp) => self.key_images.remove(&inp.ink.key_image),
        }
    }

    /// True when every input of `tx` can be added against the current in-flight set and against
    /// the transaction's own earlier inputs.
    pub fn can_add_tx(&self, tx: &Transaction) -> bool {
        let mut scratch = self.clone();
        for input in tx.prefix.inputs() {
            if !scratch.can_add_input(input) || !scratch.add_input(input) {
                return false;
            }
        }
        true
    }

    pub fn add_tx(&mut self, tx: &Transaction) -> bool {
        for input in tx.prefix.inputs() {
            if !self.can_add_input(input) || !self.add_input(input) {
                return false;
            }
        }
        true
    }

    pub fn remove_tx(&mut self, tx: &Transaction) -> bool {
        let mut ok = true;
        for input in tx.prefix.inputs() {
            ok &= self.remove_input(input);
        }
        ok
    }

    /// The intra-transaction compatibility rule: a transaction is self-consistent iff its inputs
    /// can all be added to an empty set.
    pub fn is_tx_valid(tx: &Transaction) -> bool {
        InputCompatChecker::new().can_add_tx(tx)
    }
}
