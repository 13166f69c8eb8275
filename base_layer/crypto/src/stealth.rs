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

//! One-time (stealth) output keys.
//!
//! A sender derives `D = r·A` from the recipient's view key and their transaction key, then the
//! one-time output key is `P = Hs(D ‖ n)·G + B`. The recipient recovers `D = a·R` from the
//! transaction public key in the extra field and can both detect and spend the output.

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use serde::{Deserialize, Serialize};

use crate::{hash_to_scalar, hashing::append_varint, CryptoError, PublicKey, SecretKey};

/// A shared Diffie-Hellman secret between a transaction key and a view key.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct KeyDerivation([u8; 32]);

impl KeyDerivation {
    fn to_scalar(self, output_index: u64) -> Scalar {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.0);
        append_varint(&mut buf, output_index);
        hash_to_scalar(&buf)
    }
}

/// Computes the shared secret `sec·pub`.
pub fn generate_key_derivation(public_key: &PublicKey, secret_key: &SecretKey) -> Result<KeyDerivation, CryptoError> {
    let point = public_key.decompress()?;
    Ok(KeyDerivation((secret_key.scalar() * point).compress().to_bytes()))
}

/// Derives the one-time output key for output `output_index` paying `base` (a spend public key).
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: u64,
    base: &PublicKey,
) -> Result<PublicKey, CryptoError> {
    let base_point = base.decompress()?;
    let scalar = derivation.to_scalar(output_index);
    Ok(PublicKey::from_point(&(RistrettoPoint::mul_base(&scalar) + base_point)))
}

/// Derives the matching one-time secret key from the recipient's spend secret key.
pub fn derive_secret_key(derivation: &KeyDerivation, output_index: u64, base: &SecretKey) -> SecretKey {
    SecretKey(derivation.to_scalar(output_index) + base.scalar())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{generate_key_image, generate_keys};

    #[test]
    fn sender_and_receiver_agree() {
        // Recipient view/spend keys, sender transaction key.
        let (view_pub, view_sec) = generate_keys();
        let (spend_pub, spend_sec) = generate_keys();
        let (tx_pub, tx_sec) = generate_keys();

        let sender_derivation = generate_key_derivation(&view_pub, &tx_sec).unwrap();
        let receiver_derivation = generate_key_derivation(&tx_pub, &view_sec).unwrap();
        assert_eq!(sender_derivation, receiver_derivation);

        let one_time_pub = derive_public_key(&sender_derivation, 3, &spend_pub).unwrap();
        let one_time_sec = derive_secret_key(&receiver_derivation, 3, &spend_sec);
        assert_eq!(one_time_sec.public_key(), one_time_pub);

        // The derived pair must be usable for key images (i.e. a real key pair).
        let _ = generate_key_image(&one_time_pub, &one_time_sec);
    }

    #[test]
    fn different_indexes_give_different_keys() {
        let (view_pub, _) = generate_keys();
        let (spend_pub, _) = generate_keys();
        let (_, tx_sec) = generate_keys();
        let derivation = generate_key_derivation(&view_pub, &tx_sec).unwrap();
        let a = derive_public_key(&derivation, 0, &spend_pub).unwrap();
        let b = derive_public_key(&derivation, 1, &spend_pub).unwrap();
        assert_ne!(a, b);
    }
}
