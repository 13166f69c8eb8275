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

//! The signed long-hash cache and its background catch-up worker.
//!
//! A node configured with a hash-signing key publishes `(block id, long hash, signature)` entries
//! so that light peers can skip recomputing boulderhash during sync. The catch-up worker walks
//! every known PoW block, computes missing long hashes outside the chain lock, and flushes the
//! cache to disk every hundred entries. It is cooperatively cancellable.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
        Mutex,
    },
    thread,
};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use xpb_common_types::{BlockHash, FixedHash};
use xpb_crypto::{generate_signature, KeyPair, Signature};

use crate::{
    chain_storage::{BlockchainDatabase, ChainStorageError},
    proof_of_work::get_block_longhash,
};

const LOG_TARGET: &str = "c::cs::hash_cache";

const HASH_CACHE_FILENAME: &str = "signed_hashes.bin";
const HASH_CACHE_TEMP_FILENAME: &str = "signed_hashes.bin.tmp";
const STORE_EVERY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHashEntry {
    pub block_id: BlockHash,
    pub longhash: FixedHash,
    pub signature: Signature,
}

#[derive(Debug)]
pub struct SignedHashCache {
    dir: Option<PathBuf>,
    signing_keys: Option<KeyPair>,
    entries: HashMap<BlockHash, SignedHashEntry>,
}

impl SignedHashCache {
    pub fn new(dir: Option<PathBuf>, signing_keys: Option<KeyPair>) -> Self {
        let mut cache = SignedHashCache {
            dir,
            signing_keys,
            entries: HashMap::new(),
        };
        cache.load();
        cache
    }

    pub fn is_hash_signing_key_set(&self) -> bool {
        self.signing_keys.is_some()
    }

    pub fn have_signed_longhash_for(&self, block_id: &BlockHash) -> bool {
        self.entries.contains_key(block_id)
    }

    pub fn get_signed_longhash_entry(&self, block_id: &BlockHash) -> Option<SignedHashEntry> {
        self.entries.get(block_id).cloned()
    }

    /// Signs and records the long hash of a block. No-op without a signing key.
    pub fn create_signed_hash(&mut self, block_id: BlockHash, longhash: FixedHash) -> Option<Signature> {
        let keys = self.signing_keys.as_ref()?;
        let signature = generate_signature(&longhash.into_array(), &keys.public_key, &keys.secret_key);
        self.entries.insert(block_id, SignedHashEntry {
            block_id,
            longhash,
            signature,
        });
        Some(signature)
    }

    fn load(&mut self) {
        let Some(dir) = &self.dir else { return };
        let path = dir.join(HASH_CACHE_FILENAME);
        if !path.exists() {
            return;
        }
        match std::fs::File::open(&path).map_err(|e| e.to_string()).and_then(|f| {
            bincode::deserialize_from::<_, HashMap<BlockHash, SignedHashEntry>>(std::io::BufReader::new(f))
                .map_err(|e| e.to_string())
        }) {
            Ok(entries) => {
                info!(target: LOG_TARGET, "Loaded {} signed hashes", entries.len());
                self.entries = entries;
            },
            Err(e) => warn!(target: LOG_TARGET, "Could not load the signed hash cache: {}", e),
        }
    }

    pub fn store(&self) -> Result<(), ChainStorageError> {
        let Some(dir) = &self.dir else { return Ok(()) };
        std::fs::create_dir_all(dir)?;
        let temp = dir.join(HASH_CACHE_TEMP_FILENAME);
        {
            let file = std::fs::File::create(&temp)?;
            let mut writer = std::io::BufWriter::new(file);
            bincode::serialize_into(&mut writer, &self.entries).map_err(|e| ChainStorageError::Codec(e.to_string()))?;
        }
        std::fs::rename(&temp, dir.join(HASH_CACHE_FILENAME))?;
        Ok(())
    }
}

impl BlockchainDatabase {
    /// Walks every known PoW block (main and alternative) and fills in missing signed long
    /// hashes. The chain lock is held only to enumerate ids and fetch headers, never while
    /// hashing. Checks `stop` on every iteration.
    pub fn catchup_signed_hashes(
        &self,
        cache: &Arc<Mutex<SignedHashCache>>,
        stop: &AtomicBool,
    ) -> Result<(), ChainStorageError> {
        {
            let cache = cache.lock().map_err(|_| ChainStorageError::LockPoisoned)?;
            if !cache.is_hash_signing_key_set() {
                return Ok(());
            }
        }

        let to_process: Vec<BlockHash> = {
            let mut ids = Vec::new();
            let height = self.height()?;
            for h in 0..height {
                if let Some(id) = self.block_id_by_height(h)? {
                    ids.push(id);
                }
            }
            ids.extend(self.alternative_block_ids()?);
            let cache = cache.lock().map_err(|_| ChainStorageError::LockPoisoned)?;
            ids.retain(|id| !cache.have_signed_longhash_for(id));
            ids
        };

        if to_process.is_empty() {
            info!(target: LOG_TARGET, "Fully caught up to signed hashes");
            return Ok(());
        }
        info!(target: LOG_TARGET, "Catching up to {} signed hashes", to_process.len());

        let mut caught_up = 0usize;
        for id in to_process {
            if stop.load(Ordering::Relaxed) {
                info!(target: LOG_TARGET, "Signed hash catch-up interrupted");
                break;
            }
            let Some(block) = self.get_block_by_hash(&id)? else {
                continue;
            };
            if block.is_dpos_block() {
                continue;
            }
            // the expensive part runs without any lock held
            let longhash = match get_block_longhash(&block) {
                Ok(hash) => hash,
                Err(e) => {
                    warn!(target: LOG_TARGET, "Could not long-hash block {}: {}", id, e);
                    continue;
                },
            };
            let mut cache = cache.lock().map_err(|_| ChainStorageError::LockPoisoned)?;
            cache.create_signed_hash(id, longhash);
            caught_up += 1;
            if caught_up % STORE_EVERY == 0 {
                cache.store()?;
            }
        }

        cache.lock().map_err(|_| ChainStorageError::LockPoisoned)?.store()?;
        info!(target: LOG_TARGET, "Done catching up signed hashes ({} new)", caught_up);
        Ok(())
    }

    /// Spawns the catch-up worker on a background thread if a signing key is configured.
    pub fn spawn_signed_hash_catchup(
        &self,
        cache: Arc<Mutex<SignedHashCache>>,
        stop: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let db = self.clone();
        thread::spawn(move || {
            if let Err(e) = db.catchup_signed_hashes(&cache, &stop) {
                warn!(target: LOG_TARGET, "Signed hash catch-up failed: {}", e);
            }
        })
    }

    fn alternative_block_ids(&self) -> Result<Vec<BlockHash>, ChainStorageError> {
        Ok(self.alternative_blocks()?.iter().map(|b| b.hash()).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_without_key_signs_nothing() {
        let mut cache = SignedHashCache::new(None, None);
        assert!(!cache.is_hash_signing_key_set());
        assert!(cache.create_signed_hash(BlockHash::zero(), FixedHash::zero()).is_none());
    }

    #[test]
    fn cache_signs_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyPair::generate();
        let id = BlockHash::from([3u8; 32]);
        let hash = FixedHash::from([9u8; 32]);
        {
            let mut cache = SignedHashCache::new(Some(dir.path().to_path_buf()), Some(keys.clone()));
            let sig = cache.create_signed_hash(id, hash).unwrap();
            assert!(xpb_crypto::check_signature(&hash.into_array(), &keys.public_key, &sig));
            cache.store().unwrap();
        }
        let reloaded = SignedHashCache::new(Some(dir.path().to_path_buf()), Some(keys));
        assert!(reloaded.have_signed_longhash_for(&id));
        assert_eq!(reloaded.get_signed_longhash_entry(&id).unwrap().longhash, hash);
    }
}
