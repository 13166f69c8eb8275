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

//! The free-form `extra` field of a transaction.
//!
//! A byte string of tagged records. The only record consensus cares about is the transaction
//! public key, which recipients need to recognise and spend their one-time outputs. Padding is
//! used by the miner-transaction size fitting.

use xpb_crypto::PublicKey;

pub const TX_EXTRA_TAG_PADDING: u8 = 0x00;
pub const TX_EXTRA_TAG_PUBKEY: u8 = 0x01;
pub const TX_EXTRA_TAG_NONCE: u8 = 0x02;

pub const TX_EXTRA_NONCE_MAX_SIZE: usize = 255;

/// Appends the transaction public key record.
pub fn add_tx_pub_key_to_extra(extra: &mut Vec<u8>, tx_pub_key: &PublicKey) {
    extra.push(TX_EXTRA_TAG_PUBKEY);
    extra.extend_from_slice(tx_pub_key.as_bytes());
}

/// Appends an opaque nonce record (e.g. an extra mining nonce or a payment id).
pub fn add_extra_nonce_to_extra(extra: &mut Vec<u8>, nonce: &[u8]) -> bool {
    if nonce.len() > TX_EXTRA_NONCE_MAX_SIZE {
        return false;
    }
    extra.push(TX_EXTRA_TAG_NONCE);
    extra.push(nonce.len() as u8);
    extra.extend_from_slice(nonce);
    true
}

/// Scans the extra field for the first transaction public key record.
pub fn get_tx_pub_key_from_extra(extra: &[u8]) -> Option<PublicKey> {
    let mut pos = 0usize;
    while pos < extra.len() {
        match extra[pos] {
            TX_EXTRA_TAG_PADDING => {
                // padding runs to the end of the field
                return None;
            },
            TX_EXTRA_TAG_PUBKEY => {
                let bytes = extra.get(pos + 1..pos + 33)?;
                let mut key = [0u8; 32];
                key.copy_from_slice(bytes);
                return Some(PublicKey(key));
            },
            TX_EXTRA_TAG_NONCE => {
                let len = *extra.get(pos + 1)? as usize;
                pos += 2 + len;
            },
            _ => return None,
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use xpb_crypto::generate_keys;

    #[test]
    fn pub_key_round_trip() {
        let (key, _) = generate_keys();
        let mut extra = Vec::new();
        add_tx_pub_key_to_extra(&mut extra, &key);
        assert_eq!(get_tx_pub_key_from_extra(&extra), Some(key));
    }

    #[test]
    fn pub_key_after_nonce() {
        let (key, _) = generate_keys();
        let mut extra = Vec::new();
        assert!(add_extra_nonce_to_extra(&mut extra, b"mining nonce"));
        add_tx_pub_key_to_extra(&mut extra, &key);
        assert_eq!(get_tx_pub_key_from_extra(&extra), Some(key));
    }

    #[test]
    fn missing_key_is_none() {
        assert_eq!(get_tx_pub_key_from_extra(&[]), None);
        assert_eq!(get_tx_pub_key_from_extra(&[TX_EXTRA_TAG_PADDING, 0, 0]), None);
    }

    #[test]
    fn oversized_nonce_is_rejected() {
        let mut extra = Vec::new();
        assert!(!add_extra_nonce_to_extra(&mut extra, &[0u8; 256]));
        assert!(extra.is_empty());
    }
}
