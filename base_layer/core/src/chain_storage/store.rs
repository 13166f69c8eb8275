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

//! Ledger persistence: a single-file snapshot replaced atomically (write temp, fsync, rename).

use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

use log::{info, warn};

use crate::chain_storage::{error::ChainStorageError, ledger_state::LedgerState};

const LOG_TARGET: &str = "c::cs::store";

const BLOCKCHAIN_DATA_FILENAME: &str = "blockchain.bin";
const BLOCKCHAIN_DATA_TEMP_FILENAME: &str = "blockchain.bin.tmp";

pub(super) fn store_ledger(state: &LedgerState, dir: &Path) -> Result<(), ChainStorageError> {
    fs::create_dir_all(dir)?;
    let temp_path = dir.join(BLOCKCHAIN_DATA_TEMP_FILENAME);
    let final_path = dir.join(BLOCKCHAIN_DATA_FILENAME);

    // the temp file may be a leftover hardlink of the data file
    let _ = fs::remove_file(&temp_path);
    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, state).map_err(|e| ChainStorageError::Codec(e.to_string()))?;
        writer
            .into_inner()
            .map_err(|e| ChainStorageError::Codec(e.to_string()))?
            .sync_all()?;
    }
    fs::rename(&temp_path, &final_path)?;
    Ok(())
}

pub(super) fn load_ledger(dir: &Path) -> Result<Option<LedgerState>, ChainStorageError> {
    let path = dir.join(BLOCKCHAIN_DATA_FILENAME);
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(&path)?;
    match bincode::deserialize_from(std::io::BufReader::new(file)) {
        Ok(state) => {
            info!(target: LOG_TARGET, "Loaded blockchain from {}", path.display());
            Ok(Some(state))
        },
        Err(e) => {
            warn!(
                target: LOG_TARGET,
                "Could not load blockchain from {}: {}; starting from genesis",
                path.display(),
                e
            );
            Ok(None)
        },
    }
}
