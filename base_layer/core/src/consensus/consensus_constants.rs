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

/// One whole XPB in atomic units.
pub const COIN: u64 = 100_000_000;

/// The default minimum relay/inclusion fee, in atomic units.
pub const DEFAULT_FEE: u64 = 1_000_000;

/// Display decimals for the base coin.
pub const DISPLAY_DECIMAL_POINT: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    MainNet,
    LocalNet,
}

/// All the protocol parameters that every node must agree on.
#[derive(Debug, Clone)]
pub struct ConsensusConstants {
    /// Target seconds between PoW blocks.
    pub difficulty_target: u64,
    /// Number of (timestamp, cumulative difficulty) samples fed to the retarget algorithm.
    pub difficulty_blocks_count: usize,
    /// Outliers trimmed from each end of the sorted timestamp window.
    pub difficulty_cut: usize,
    /// Number of timestamps used for the median timestamp rule.
    pub timestamp_check_window: usize,
    /// Maximum seconds a PoW block timestamp may be ahead of local time.
    pub block_future_time_limit: u64,
    /// Maximum seconds a DPoS block timestamp may be ahead of local time.
    pub dpos_block_future_time_limit: u64,
    /// Window of block sizes used for the median size and reward penalty.
    pub reward_blocks_window: usize,
    /// Blocks up to this size never incur a reward penalty.
    pub block_granted_full_reward_zone: u64,
    /// Bytes reserved in a block template for the final coinbase transaction.
    pub coinbase_blob_reserved_size: u64,
    /// Coinbase outputs unlock this many blocks after their height.
    pub mined_money_unlock_window: u64,
    /// Unlock times below this value are block heights, above it unix timestamps.
    pub max_block_number: u64,
    /// Grace in blocks when deciding whether a height-locked output is spendable.
    pub locked_tx_allowed_delta_blocks: u64,
    /// Grace in seconds when deciding whether a time-locked output is spendable.
    pub locked_tx_allowed_delta_seconds: u64,
    /// Total atomic units that will ever exist.
    pub money_supply: u64,
    /// Emission curve divisor: each block mints `(supply - generated) >> factor`.
    pub emission_speed_factor: u32,
    /// Height at which PoW sealing ends and delegate signing begins.
    pub dpos_switch_block: u64,
    /// Height from which RegisterDelegate and Vote inputs are accepted.
    pub dpos_registration_start_block: u64,
    /// Size of the elected signer set.
    pub dpos_num_delegates: usize,
    /// Seconds each delegate has to produce their block before the slot passes on.
    pub dpos_delegate_slot_time: u64,
    /// Minimum seconds between consecutive DPoS blocks.
    pub dpos_min_block_spacing: u64,
    /// Fixed difficulty credited to DPoS blocks (they are not mined).
    pub dpos_block_difficulty: u64,
    /// Delegate registration must pay at least `multiple × average past fees`.
    pub dpos_registration_fee_multiple: u64,
    /// Absolute floor on the delegate registration fee.
    pub dpos_min_registration_fee: u64,
    /// Maximum length of a sub-currency description.
    pub currency_description_max_size: usize,
    /// Maximum length of a contract description.
    pub contract_description_max_size: usize,
    /// Genesis nonce string, hashed into the 32-bit genesis nonce.
    pub genesis_nonce_string: &'static str,
    /// Genesis block timestamp.
    pub genesis_timestamp: u64,
    /// Expected genesis block id. When set, start-up verifies the generated genesis against it.
    // TODO: pin the mainnet genesis block id before release
    pub genesis_block_id: Option<&'static str>,
}

impl ConsensusConstants {
    pub fn mainnet() -> Self {
        ConsensusConstants {
            difficulty_target: 120,
            difficulty_blocks_count: 720,
            difficulty_cut: 60,
            timestamp_check_window: 60,
            block_future_time_limit: 7200,
            dpos_block_future_time_limit: 300,
            reward_blocks_window: 100,
            block_granted_full_reward_zone: 20_000,
            coinbase_blob_reserved_size: 600,
            mined_money_unlock_window: 10,
            max_block_number: 500_000_000,
            locked_tx_allowed_delta_blocks: 1,
            locked_tx_allowed_delta_seconds: 120,
            money_supply: u64::MAX,
            emission_speed_factor: 18,
            dpos_switch_block: 85_000,
            dpos_registration_start_block: 75_000,
            dpos_num_delegates: 101,
            dpos_delegate_slot_time: 20,
            dpos_min_block_spacing: 10,
            dpos_block_difficulty: 1,
            dpos_registration_fee_multiple: 5,
            dpos_min_registration_fee: 50 * COIN,
            currency_description_max_size: 256,
            contract_description_max_size: 1024,
            genesis_nonce_string: "Like a pebble thrown into a still pond",
            genesis_timestamp: 1_700_000_000,
            genesis_block_id: None,
        }
    }

    pub fn localnet() -> Self {
        ConsensusConstants {
            difficulty_target: 120,
            difficulty_blocks_count: 60,
            difficulty_cut: 6,
            timestamp_check_window: 10,
            block_future_time_limit: 7200,
            dpos_block_future_time_limit: 7200,
            reward_blocks_window: 20,
            block_granted_full_reward_zone: 20_000,
            coinbase_blob_reserved_size: 600,
            mined_money_unlock_window: 4,
            max_block_number: 500_000_000,
            locked_tx_allowed_delta_blocks: 1,
            locked_tx_allowed_delta_seconds: 120,
            money_supply: u64::MAX,
            emission_speed_factor: 18,
            dpos_switch_block: u64::MAX,
            dpos_registration_start_block: 0,
            dpos_num_delegates: 5,
            dpos_delegate_slot_time: 20,
            dpos_min_block_spacing: 10,
            dpos_block_difficulty: 1,
            dpos_registration_fee_multiple: 5,
            dpos_min_registration_fee: 50 * COIN,
            currency_description_max_size: 256,
            contract_description_max_size: 1024,
            genesis_nonce_string: "Like a pebble thrown into a still pond",
            genesis_timestamp: 1_700_000_000,
            genesis_block_id: None,
        }
    }

    /// True when `height` is sealed by delegate signature rather than proof of work.
    pub fn in_dpos_era(&self, height: u64) -> bool {
        height >= self.dpos_switch_block
    }

    /// The per-delegate vote ceiling. Uncapped: the clamping machinery stays in place so a finite
    /// cap can be introduced without changing the vote-instance format.
    pub fn vote_cap(&self) -> u64 {
        u64::MAX
    }
}

#[derive(Debug, Clone)]
pub struct ConsensusConstantsBuilder {
    constants: ConsensusConstants,
}

impl ConsensusConstantsBuilder {
    pub fn new(network: Network) -> Self {
        let constants = match network {
            Network::MainNet => ConsensusConstants::mainnet(),
            Network::LocalNet => ConsensusConstants::localnet(),
        };
        ConsensusConstantsBuilder { constants }
    }

    pub fn with_dpos_switch_block(mut self, height: u64) -> Self {
        self.constants.dpos_switch_block = height;
        self
    }

    pub fn with_dpos_registration_start_block(mut self, height: u64) -> Self {
        self.constants.dpos_registration_start_block = height;
        self
    }

    pub fn with_dpos_num_delegates(mut self, count: usize) -> Self {
        self.constants.dpos_num_delegates = count;
        self
    }

    pub fn with_mined_money_unlock_window(mut self, blocks: u64) -> Self {
        self.constants.mined_money_unlock_window = blocks;
        self
    }

    pub fn with_dpos_min_registration_fee(mut self, fee: u64) -> Self {
        self.constants.dpos_min_registration_fee = fee;
        self
    }

    pub fn with_genesis_timestamp(mut self, timestamp: u64) -> Self {
        self.constants.genesis_timestamp = timestamp;
        self
    }

    pub fn build(self) -> ConsensusConstants {
        self.constants
    }
}
