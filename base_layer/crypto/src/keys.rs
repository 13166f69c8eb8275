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

use curve25519_dalek::{ristretto::CompressedRistretto, ristretto::RistrettoPoint, scalar::Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::CryptoError;

/// A compressed ristretto public key.
///
/// The all-zero encoding doubles as the protocol's "no key" sentinel (a currency with no remint
/// key stores it), so [`PublicKey::is_null`] must be checked wherever a real key is required.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub const fn null() -> Self {
        PublicKey([0u8; 32])
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn decompress(&self) -> Result<RistrettoPoint, CryptoError> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(CryptoError::InvalidPublicKey)
    }

    pub(crate) fn from_point(point: &RistrettoPoint) -> Self {
        PublicKey(point.compress().to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

/// A ristretto secret scalar. Zeroed on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKey(pub(crate) Scalar);

impl SecretKey {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let scalar: Option<Scalar> = Scalar::from_canonical_bytes(bytes).into();
        scalar.map(SecretKey).ok_or(CryptoError::InvalidSignatureEncoding)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&RistrettoPoint::mul_base(&self.0))
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// A public/secret key pair.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub secret_key: SecretKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (public_key, secret_key) = generate_keys();
        KeyPair { public_key, secret_key }
    }
}

/// Generates a fresh random key pair.
pub fn generate_keys() -> (PublicKey, SecretKey) {
    let secret = SecretKey(Scalar::random(&mut OsRng));
    (secret.public_key(), secret)
}

/// Returns true if the key is a valid (decompressible) point. The null key decompresses to the
/// identity and is considered valid here; callers that forbid it check `is_null` separately.
pub fn check_key(key: &PublicKey) -> bool {
    key.decompress().is_ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_keys_round_trip() {
        let (public, secret) = generate_keys();
        assert_eq!(secret.public_key(), public);
        assert!(check_key(&public));
        assert!(!public.is_null());
    }

    #[test]
    fn null_key_is_null() {
        assert!(PublicKey::null().is_null());
        assert!(check_key(&PublicKey::null()));
    }

    #[test]
    fn garbage_key_fails_check() {
        let garbage = PublicKey([0xff; 32]);
        assert!(!check_key(&garbage));
    }
}
