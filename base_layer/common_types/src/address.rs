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

use std::fmt;

use blake2::{
    digest::{consts::U32, Digest},
    Blake2b,
};
use serde::{Deserialize, Serialize};
use xpb_crypto::PublicKey;

const ADDRESS_VERSION: u8 = 0x50;
const CHECKSUM_BYTES: usize = 4;

/// A stealth address: the recipient's public view and spend keys.
///
/// The string form is base58 over `version ‖ spend ‖ view ‖ checksum`; it is also the
/// deterministic tie-break key when ranking delegates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Address {
    pub public_spend_key: PublicKey,
    pub public_view_key: PublicKey,
}

impl Address {
    pub fn new(public_spend_key: PublicKey, public_view_key: PublicKey) -> Self {
        Address {
            public_spend_key,
            public_view_key,
        }
    }

    pub fn to_base58(&self) -> String {
        let mut data = Vec::with_capacity(1 + 64 + CHECKSUM_BYTES);
        data.push(ADDRESS_VERSION);
        data.extend_from_slice(self.public_spend_key.as_bytes());
        data.extend_from_slice(self.public_view_key.as_bytes());
        let mut hasher = Blake2b::<U32>::new();
        hasher.update(&data);
        let checksum: [u8; 32] = hasher.finalize().into();
        data.extend_from_slice(&checksum[..CHECKSUM_BYTES]);
        bs58::encode(data).into_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use xpb_crypto::generate_keys;

    #[test]
    fn base58_is_deterministic_and_distinct() {
        let (spend, _) = generate_keys();
        let (view, _) = generate_keys();
        let addr = Address::new(spend, view);
        assert_eq!(addr.to_base58(), addr.to_base58());

        let (other_spend, _) = generate_keys();
        let other = Address::new(other_spend, view);
        assert_ne!(addr.to_base58(), other.to_base58());
    }

    #[test]
    fn ordering_is_stable() {
        let a = Address::new(PublicKey([1u8; 32]), PublicKey([2u8; 32]));
        let b = Address::new(PublicKey([2u8; 32]), PublicKey([1u8; 32]));
        assert!(a < b);
    }
}
