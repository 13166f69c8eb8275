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

//! CryptoNote-style linkable ring signatures.
//!
//! A spend input proves ownership of exactly one output key in a ring without revealing which.
//! The key image `I = x·Hp(P)` is deterministic per output, so spending the same output twice
//! produces the same image and is caught by the spent-image set.

use std::fmt;

use curve25519_dalek::{ristretto::CompressedRistretto, ristretto::RistrettoPoint, scalar::Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{hash_to_point, hash_to_scalar, CryptoError, PublicKey, SecretKey, Signature, HASH_SIZE};

/// The linkability tag of a spent output.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyImage(pub [u8; 32]);

impl KeyImage {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn decompress(&self) -> Result<RistrettoPoint, CryptoError> {
        CompressedRistretto(self.0).decompress().ok_or(CryptoError::InvalidKeyImage)
    }
}

impl fmt::Display for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyImage({})", self)
    }
}

/// Derives the key image for an output key pair.
pub fn generate_key_image(public_key: &PublicKey, secret_key: &SecretKey) -> KeyImage {
    let hp = hash_to_point(public_key.as_bytes());
    KeyImage((secret_key.scalar() * hp).compress().to_bytes())
}

fn ring_challenge(prefix_hash: &[u8; HASH_SIZE], commitments: &[(RistrettoPoint, RistrettoPoint)]) -> Scalar {
    let mut buf = Vec::with_capacity(HASH_SIZE + commitments.len() * 64);
    buf.extend_from_slice(prefix_hash);
    for (l, r) in commitments {
        buf.extend_from_slice(&l.compress().to_bytes());
        buf.extend_from_slice(&r.compress().to_bytes());
    }
    hash_to_scalar(&buf)
}

/// Produces one signature per ring member proving that `secret_key` opens `ring[real_index]` and
/// that `key_image` was correctly derived from it.
pub fn generate_ring_signature(
    prefix_hash: &[u8; HASH_SIZE],
    key_image: &KeyImage,
    ring: &[PublicKey],
    secret_key: &SecretKey,
    real_index: usize,
) -> Result<Vec<Signature>, CryptoError> {
    if real_index >= ring.len() {
        return Err(CryptoError::RingIndexOutOfBounds {
            index: real_index,
            ring_size: ring.len(),
        });
    }
    let image_point = key_image.decompress()?;

    let mut signatures = vec![Signature::null(); ring.len()];
    let mut commitments = Vec::with_capacity(ring.len());
    let mut challenge_sum = Scalar::ZERO;
    let mut nonce = Scalar::ZERO;

    for (i, member) in ring.iter().enumerate() {
        if i == real_index {
            nonce = Scalar::random(&mut OsRng);
            let l = RistrettoPoint::mul_base(&nonce);
            let r = nonce * hash_to_point(member.as_bytes());
            commitments.push((l, r));
        } else {
            let c = Scalar::random(&mut OsRng);
            let r = Scalar::random(&mut OsRng);
            let point = member.decompress()?;
            let l = RistrettoPoint::mul_base(&r) + c * point;
            let ri = r * hash_to_point(member.as_bytes()) + c * image_point;
            signatures[i] = Signature {
                c: c.to_bytes(),
                r: r.to_bytes(),
            };
            challenge_sum += c;
            commitments.push((l, ri));
        }
    }

    let total = ring_challenge(prefix_hash, &commitments);
    let c_real = total - challenge_sum;
    let r_real = nonce - c_real * secret_key.scalar();
    signatures[real_index] = Signature {
        c: c_real.to_bytes(),
        r: r_real.to_bytes(),
    };
    Ok(signatures)
}

/// Verifies a ring signature against the claimed key image and ring of output keys.
pub fn check_ring_signature(
    prefix_hash: &[u8; HASH_SIZE],
    key_image: &KeyImage,
    ring: &[PublicKey],
    signatures: &[Signature],
) -> bool {
    if ring.is_empty() || ring.len() != signatures.len() {
        return false;
    }
    let image_point = match key_image.decompress() {
        Ok(point) => point,
        Err(_) => return false,
    };

    let mut commitments = Vec::with_capacity(ring.len());
    let mut challenge_sum = Scalar::ZERO;
    for (member, signature) in ring.iter().zip(signatures) {
        let (c, r) = match signature.scalars() {
            Ok(scalars) => scalars,
            Err(_) => return false,
        };
        let point = match member.decompress() {
            Ok(point) => point,
            Err(_) => return false,
        };
        let l = RistrettoPoint::mul_base(&r) + c * point;
        let ri = r * hash_to_point(member.as_bytes()) + c * image_point;
        commitments.push((l, ri));
        challenge_sum += c;
    }

    ring_challenge(prefix_hash, &commitments) == challenge_sum
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::generate_keys;

    fn random_ring(size: usize, real_index: usize) -> (Vec<PublicKey>, SecretKey, KeyImage) {
        let mut ring = Vec::with_capacity(size);
        let mut real_secret = None;
        for i in 0..size {
            let (public, secret) = generate_keys();
            ring.push(public);
            if i == real_index {
                real_secret = Some(secret);
            }
        }
        let secret = real_secret.unwrap();
        let image = generate_key_image(&ring[real_index], &secret);
        (ring, secret, image)
    }

    #[test]
    fn ring_of_one() {
        let (ring, secret, image) = random_ring(1, 0);
        let hash = crate::cn_fast_hash(b"prefix");
        let sigs = generate_ring_signature(&hash, &image, &ring, &secret, 0).unwrap();
        assert!(check_ring_signature(&hash, &image, &ring, &sigs));
    }

    #[test]
    fn ring_of_five_every_position() {
        let hash = crate::cn_fast_hash(b"prefix");
        for real_index in 0..5 {
            let (ring, secret, image) = random_ring(5, real_index);
            let sigs = generate_ring_signature(&hash, &image, &ring, &secret, real_index).unwrap();
            assert!(check_ring_signature(&hash, &image, &ring, &sigs));
        }
    }

    #[test]
    fn wrong_image_fails() {
        let (ring, secret, image) = random_ring(3, 1);
        let hash = crate::cn_fast_hash(b"prefix");
        let sigs = generate_ring_signature(&hash, &image, &ring, &secret, 1).unwrap();
        let (other_public, other_secret) = generate_keys();
        let other_image = generate_key_image(&other_public, &other_secret);
        assert!(!check_ring_signature(&hash, &other_image, &ring, &sigs));
    }

    #[test]
    fn tampered_prefix_fails() {
        let (ring, secret, image) = random_ring(3, 2);
        let hash = crate::cn_fast_hash(b"prefix");
        let sigs = generate_ring_signature(&hash, &image, &ring, &secret, 2).unwrap();
        let other_hash = crate::cn_fast_hash(b"other prefix");
        assert!(!check_ring_signature(&other_hash, &image, &ring, &sigs));
    }

    #[test]
    fn index_out_of_bounds_is_rejected() {
        let (ring, secret, image) = random_ring(3, 0);
        let hash = crate::cn_fast_hash(b"prefix");
        let err = generate_ring_signature(&hash, &image, &ring, &secret, 3).unwrap_err();
        assert_eq!(err, CryptoError::RingIndexOutOfBounds { index: 3, ring_size: 3 });
    }
}
