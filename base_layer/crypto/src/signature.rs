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

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::{hash_to_scalar, CryptoError, PublicKey, SecretKey, HASH_SIZE};

/// A Schnorr signature in the CryptoNote `(c, r)` shape. 64 bytes on the wire.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub c: [u8; 32],
    pub r: [u8; 32],
}

impl Signature {
    pub const fn null() -> Self {
        Signature { c: [0u8; 32], r: [0u8; 32] }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.c);
        out[32..].copy_from_slice(&self.r);
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut c = [0u8; 32];
        let mut r = [0u8; 32];
        c.copy_from_slice(&bytes[..32]);
        r.copy_from_slice(&bytes[32..]);
        Signature { c, r }
    }

    pub(crate) fn scalars(&self) -> Result<(Scalar, Scalar), CryptoError> {
        let c: Option<Scalar> = Scalar::from_canonical_bytes(self.c).into();
        let r: Option<Scalar> = Scalar::from_canonical_bytes(self.r).into();
        match (c, r) {
            (Some(c), Some(r)) => Ok((c, r)),
            _ => Err(CryptoError::InvalidSignatureEncoding),
        }
    }
}

fn challenge(prefix_hash: &[u8; HASH_SIZE], public_key: &PublicKey, commitment: &RistrettoPoint) -> Scalar {
    let mut buf = Vec::with_capacity(HASH_SIZE + 64);
    buf.extend_from_slice(prefix_hash);
    buf.extend_from_slice(public_key.as_bytes());
    buf.extend_from_slice(&commitment.compress().to_bytes());
    hash_to_scalar(&buf)
}

/// Signs `prefix_hash` with `secret_key`. The matching public key is bound into the challenge.
pub fn generate_signature(prefix_hash: &[u8; HASH_SIZE], public_key: &PublicKey, secret_key: &SecretKey) -> Signature {
    let k = Scalar::random(&mut OsRng);
    let commitment = RistrettoPoint::mul_base(&k);
    let c = challenge(prefix_hash, public_key, &commitment);
    let r = k - c * secret_key.scalar();
    Signature {
        c: c.to_bytes(),
        r: r.to_bytes(),
    }
}

/// Verifies a signature over `prefix_hash` under `public_key`.
pub fn check_signature(prefix_hash: &[u8; HASH_SIZE], public_key: &PublicKey, signature: &Signature) -> bool {
    let (c, r) = match signature.scalars() {
        Ok(scalars) => scalars,
        Err(_) => return false,
    };
    let point = match public_key.decompress() {
        Ok(point) => point,
        Err(_) => return false,
    };
    let commitment = RistrettoPoint::mul_base(&r) + c * point;
    challenge(prefix_hash, public_key, &commitment) == c
}
