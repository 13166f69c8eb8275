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

//! Block reward emission and the big-block penalty.

use crate::consensus::ConsensusConstants;

/// Median of a sample set; 0 for an empty set, average of the middle pair for an even count.
pub fn median(mut samples: Vec<u64>) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        (samples[mid - 1] + samples[mid]) / 2
    } else {
        samples[mid]
    }
}

/// The base reward for a block of `current_block_size` bytes against the median of recent sizes.
///
/// Blocks up to the full-reward zone (or the median, whichever is larger) earn the full emission;
/// beyond that the reward shrinks quadratically and `None` is returned past twice the median.
pub fn get_block_reward(
    rules: &ConsensusConstants,
    median_size: u64,
    current_block_size: u64,
    already_generated_coins: u64,
    _height: u64,
) -> Option<u64> {
    let base_reward = (rules.money_supply - already_generated_coins) >> rules.emission_speed_factor;

    let median_size = median_size.max(rules.block_granted_full_reward_zone);
    if current_block_size <= median_size {
        return Some(base_reward);
    }
    if current_block_size > 2 * median_size {
        return None;
    }

    // reward × size × (2·median − size) ∕ median²  — full at the median, zero at twice it
    let size = u128::from(current_block_size);
    let med = u128::from(median_size);
    let reward = u128::from(base_reward) * size * (2 * med - size) / (med * med);
    Some(reward as u64)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::{ConsensusConstantsBuilder, Network};

    fn rules() -> ConsensusConstants {
        ConsensusConstantsBuilder::new(Network::LocalNet).build()
    }

    #[test]
    fn median_of_samples() {
        assert_eq!(median(vec![]), 0);
        assert_eq!(median(vec![7]), 7);
        assert_eq!(median(vec![3, 9]), 6);
        assert_eq!(median(vec![9, 1, 5]), 5);
        assert_eq!(median(vec![4, 1, 3, 2]), 2);
    }

    #[test]
    fn full_reward_in_zone() {
        let rules = rules();
        let expected = rules.money_supply >> rules.emission_speed_factor;
        assert_eq!(get_block_reward(&rules, 0, 100, 0, 0), Some(expected));
        assert_eq!(
            get_block_reward(&rules, 0, rules.block_granted_full_reward_zone, 0, 0),
            Some(expected)
        );
    }

    #[test]
    fn reward_shrinks_as_supply_is_mined() {
        let rules = rules();
        let early = get_block_reward(&rules, 0, 100, 0, 0).unwrap();
        let late = get_block_reward(&rules, 0, 100, rules.money_supply / 2, 0).unwrap();
        assert!(late < early);
    }

    #[test]
    fn oversize_blocks_are_penalized_then_rejected() {
        let rules = rules();
        let zone = rules.block_granted_full_reward_zone;
        let full = get_block_reward(&rules, 0, zone, 0, 0).unwrap();
        let penalized = get_block_reward(&rules, 0, zone + zone / 2, 0, 0).unwrap();
        assert!(penalized < full);
        assert!(penalized > 0);
        assert_eq!(get_block_reward(&rules, 0, 2 * zone + 1, 0, 0), None);
    }
}
