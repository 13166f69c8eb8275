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

use blake2::{
    digest::{consts::U32, Digest},
    Blake2b,
    Blake2b512,
};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};

use crate::PublicKey;

/// Size in bytes of every object hash in the protocol.
pub const HASH_SIZE: usize = 32;

type Blake2b256 = Blake2b<U32>;

/// The object hash used for transaction and block identities.
pub fn cn_fast_hash(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Blake2b256::new();
    hasher.update(b"xpb.hash");
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes arbitrary bytes to a scalar via wide reduction.
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let mut hasher = Blake2b512::new();
    hasher.update(b"xpb.scalar");
    hasher.update(data);
    let wide: [u8; 64] = hasher.finalize().into();
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Hashes arbitrary bytes to a curve point. Used for key images, where the point must have no
/// known discrete log relation to the basepoint.
pub fn hash_to_point(data: &[u8]) -> RistrettoPoint {
    let mut hasher = Blake2b512::new();
    hasher.update(b"xpb.point");
    hasher.update(data);
    let wide: [u8; 64] = hasher.finalize().into();
    RistrettoPoint::from_uniform_bytes(&wide)
}

/// Hashes arbitrary bytes to a compressed public key with no known secret key
/// (a nothing-up-my-sleeve point).
pub fn hash_to_public_key(data: &[u8]) -> PublicKey {
    PublicKey(hash_to_point(data).compress().to_bytes())
}

/// LEB128 varint used when mixing integers into hash inputs.
pub(crate) fn append_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fast_hash_is_stable_and_distinct() {
        let a = cn_fast_hash(b"pebble");
        let b = cn_fast_hash(b"pebble");
        let c = cn_fast_hash(b"pebbles");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn varint_matches_leb128() {
        let mut buf = Vec::new();
        append_varint(&mut buf, 0);
        append_varint(&mut buf, 127);
        append_varint(&mut buf, 128);
        append_varint(&mut buf, 300);
        assert_eq!(buf, vec![0x00, 0x7f, 0x80, 0x01, 0xac, 0x02]);
    }
}
