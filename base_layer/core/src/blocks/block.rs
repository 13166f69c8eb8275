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

//! Blocks: a header, the miner transaction, the hashes of the included transactions, and (for
//! DPoS blocks) the signing delegate's id and signature.
//!
//! The block id hashes a blob of the header, the transaction tree hash and the count; for DPoS
//! blocks the delegate tail is included but the nonce is not serialized at all, so the id is
//! naturally nonce-free.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use xpb_common_types::{Address, BlockHash, DelegateId, TxHash};
use xpb_crypto::{check_signature, cn_fast_hash, generate_signature, PublicKey, SecretKey, Signature};

use crate::{
    consensus::encoding::{
        invalid_data,
        read_fixed_bytes,
        read_varint,
        read_vec_len,
        write_varint,
        ConsensusDecoding,
        ConsensusEncoding,
    },
    transactions::{Transaction, TxIn},
};

/// Blocks with this major version or below are sealed by proof of work.
pub const POW_BLOCK_MAJOR_VERSION: u8 = 1;
/// Blocks with this major version or above are sealed by a delegate signature.
pub const DPOS_BLOCK_MAJOR_VERSION: u8 = 2;
pub const CURRENT_BLOCK_MAJOR_VERSION: u8 = 2;
pub const POW_BLOCK_MINOR_VERSION: u8 = 0;
pub const DPOS_BLOCK_MINOR_VERSION: u8 = 0;

/// Tag byte identifying a block blob inside a tagged relay container.
pub const BLOCK_BLOB_TAG: u8 = 0xbb;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_id: BlockHash,
    /// Only meaningful (and only serialized) for PoW blocks.
    pub nonce: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<TxHash>,
    /// Zero unless this is a DPoS block.
    pub signing_delegate_id: DelegateId,
    pub dpos_sig: Signature,
}

impl Block {
    pub fn is_pow_block(&self) -> bool {
        self.header.major_version <= POW_BLOCK_MAJOR_VERSION
    }

    pub fn is_dpos_block(&self) -> bool {
        !self.is_pow_block()
    }

    /// The height encoded in the miner transaction's coinbase input.
    pub fn height(&self) -> Option<u64> {
        match self.miner_tx.prefix.inputs() {
            [TxIn::Coinbase(inp)] => Some(inp.height),
            _ => None,
        }
    }

    /// The merkle root over the miner transaction and the listed transactions.
    pub fn tx_tree_hash(&self) -> TxHash {
        let mut hashes = Vec::with_capacity(self.tx_hashes.len() + 1);
        hashes.push(self.miner_tx.hash());
        hashes.extend_from_slice(&self.tx_hashes);
        tree_hash(&hashes)
    }

    /// The blob hashed for the block id, and (without the trailing signature) for the DPoS
    /// delegate signature.
    fn hashing_blob(&self, for_dpos_sig: bool) -> Vec<u8> {
        let mut blob = Vec::with_capacity(128);
        self.header
            .consensus_encode(&mut blob)
            .expect("writing to Vec<u8> is infallible");
        blob.extend_from_slice(self.tx_tree_hash().as_slice());
        write_varint(&mut blob, self.tx_hashes.len() as u64 + 1).expect("writing to Vec<u8> is infallible");
        if self.is_dpos_block() {
            write_varint(&mut blob, u64::from(self.signing_delegate_id)).expect("writing to Vec<u8> is infallible");
            if !for_dpos_sig {
                blob.extend_from_slice(&self.dpos_sig.to_bytes());
            }
        }
        blob
    }

    /// The block id.
    pub fn hash(&self) -> BlockHash {
        BlockHash::from(cn_fast_hash(&self.hashing_blob(false)))
    }

    /// The hash a DPoS delegate signs.
    pub fn dpos_signing_hash(&self) -> [u8; 32] {
        cn_fast_hash(&self.hashing_blob(true))
    }

    /// The PoW input blob. Also valid for the long hash of PoW blocks.
    pub fn pow_blob(&self) -> Vec<u8> {
        self.hashing_blob(false)
    }

    pub fn blob_size(&self) -> u64 {
        self.to_consensus_bytes().len() as u64
    }

    /// Wraps the consensus bytes in the relay container tag.
    pub fn to_tagged_bytes(&self) -> Vec<u8> {
        let mut buf = vec![BLOCK_BLOB_TAG];
        self.consensus_encode(&mut buf).expect("writing to Vec<u8> is infallible");
        buf
    }

    pub fn from_tagged_bytes(bytes: &[u8]) -> Result<Self, io::Error> {
        match bytes.split_first() {
            Some((&BLOCK_BLOB_TAG, rest)) => Block::from_consensus_bytes(rest),
            _ => Err(invalid_data("unknown block blob tag")),
        }
    }
}

/// Signs a DPoS block in place with the delegate's spend key.
pub fn sign_dpos_block(block: &mut Block, public_key: &PublicKey, secret_key: &SecretKey) {
    let hash = block.dpos_signing_hash();
    block.dpos_sig = generate_signature(&hash, public_key, secret_key);
}

/// Verifies a DPoS block signature against the delegate's address.
pub fn check_dpos_block_sig(block: &Block, delegate_address: &Address) -> bool {
    let hash = block.dpos_signing_hash();
    check_signature(&hash, &delegate_address.public_spend_key, &block.dpos_sig)
}

/// The CryptoNote-shaped balanced-binary tree hash over transaction hashes.
pub fn tree_hash(hashes: &[TxHash]) -> TxHash {
    fn hash_pair(a: &TxHash, b: &TxHash) -> TxHash {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(a.as_slice());
        buf[32..].copy_from_slice(b.as_slice());
        TxHash::from(cn_fast_hash(&buf))
    }

    assert!(!hashes.is_empty(), "tree_hash of empty list");
    match hashes.len() {
        1 => hashes[0],
        2 => hash_pair(&hashes[0], &hashes[1]),
        n => {
            // cnt = the largest power of two with cnt < n; the tail pairs fold into a full tree
            let mut cnt = 1usize;
            while cnt * 2 < n {
                cnt *= 2;
            }
            let mut ints: Vec<TxHash> = hashes[..2 * cnt - n].to_vec();
            let mut i = 2 * cnt - n;
            while i < n {
                ints.push(hash_pair(&hashes[i], &hashes[i + 1]));
                i += 2;
            }
            debug_assert_eq!(ints.len(), cnt);
            while cnt > 2 {
                cnt /= 2;
                for j in 0..cnt {
                    ints[j] = hash_pair(&ints[2 * j], &ints[2 * j + 1]);
                }
                ints.truncate(cnt);
            }
            hash_pair(&ints[0], &ints[1])
        },
    }
}

impl ConsensusEncoding for BlockHeader {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        if self.major_version > CURRENT_BLOCK_MAJOR_VERSION {
            return Err(invalid_data("block major version too new"));
        }
        write_varint(writer, u64::from(self.major_version))?;
        write_varint(writer, u64::from(self.minor_version))?;
        write_varint(writer, self.timestamp)?;
        writer.write_all(self.prev_id.as_slice())?;
        if self.major_version <= POW_BLOCK_MAJOR_VERSION {
            writer.write_all(&self.nonce.to_le_bytes())?;
        }
        Ok(())
    }
}

impl ConsensusDecoding for BlockHeader {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let major_version =
            u8::try_from(read_varint(reader)?).map_err(|_| invalid_data("block major version out of range"))?;
        if major_version > CURRENT_BLOCK_MAJOR_VERSION {
            return Err(invalid_data("block major version too new"));
        }
        let minor_version =
            u8::try_from(read_varint(reader)?).map_err(|_| invalid_data("block minor version out of range"))?;
        let timestamp = read_varint(reader)?;
        let prev_id = BlockHash::from(read_fixed_bytes::<_, 32>(reader)?);
        let nonce = if major_version <= POW_BLOCK_MAJOR_VERSION {
            u32::from_le_bytes(read_fixed_bytes(reader)?)
        } else {
            0
        };
        Ok(BlockHeader {
            major_version,
            minor_version,
            timestamp,
            prev_id,
            nonce,
        })
    }
}

impl ConsensusEncoding for Block {
    fn consensus_encode<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
        self.header.consensus_encode(writer)?;
        self.miner_tx.consensus_encode(writer)?;
        write_varint(writer, self.tx_hashes.len() as u64)?;
        for hash in &self.tx_hashes {
            writer.write_all(hash.as_slice())?;
        }
        if self.header.major_version >= DPOS_BLOCK_MAJOR_VERSION {
            write_varint(writer, u64::from(self.signing_delegate_id))?;
            writer.write_all(&self.dpos_sig.to_bytes())?;
        }
        Ok(())
    }
}

impl ConsensusDecoding for Block {
    fn consensus_decode<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
        let header = BlockHeader::consensus_decode(reader)?;
        let miner_tx = Transaction::consensus_decode(reader)?;
        let count = read_vec_len(reader)?;
        let mut tx_hashes = Vec::with_capacity(count);
        for _ in 0..count {
            tx_hashes.push(TxHash::from(read_fixed_bytes::<_, 32>(reader)?));
        }
        let (signing_delegate_id, dpos_sig) = if header.major_version >= DPOS_BLOCK_MAJOR_VERSION {
            let id = u16::try_from(read_varint(reader)?).map_err(|_| invalid_data("delegate id out of range"))?;
            let sig_bytes: [u8; 64] = read_fixed_bytes(reader)?;
            (id, Signature::from_bytes(&sig_bytes))
        } else {
            (0, Signature::null())
        };
        Ok(Block {
            header,
            miner_tx,
            tx_hashes,
            signing_delegate_id,
            dpos_sig,
        })
    }
}
