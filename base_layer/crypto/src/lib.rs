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

//! Cryptographic primitives for the Pebble base layer.
//!
//! Everything here is a pure function over ristretto: key pairs, CryptoNote-style Schnorr and ring
//! signatures, key images for double-spend detection, and the one-time (stealth) output key
//! derivation used by transaction outputs. The consensus code treats these as black boxes.

mod error;
mod hashing;
mod keys;
mod ring_signature;
mod signature;
mod stealth;

pub use error::CryptoError;
pub use hashing::{cn_fast_hash, hash_to_point, hash_to_public_key, hash_to_scalar, HASH_SIZE};
pub use keys::{check_key, generate_keys, KeyPair, PublicKey, SecretKey};
pub use ring_signature::{check_ring_signature, generate_key_image, generate_ring_signature, KeyImage};
pub use signature::{check_signature, generate_signature, Signature};
pub use stealth::{derive_public_key, derive_secret_key, generate_key_derivation, KeyDerivation};
