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

//! Difficulty retargeting and the proof-of-work target check.

use xpb_common_types::FixedHash;

use crate::consensus::ConsensusConstants;

/// Accumulated and per-block work. PoW difficulty is retargeted; DPoS blocks carry a fixed
/// protocol constant.
pub type Difficulty = u64;

/// The sliding-window retarget over `(timestamp, cumulative difficulty)` samples.
///
/// Timestamps are sorted and the outliers cut from both ends before taking the spanned work over
/// the spanned time. Callers pass at most `difficulty_blocks_count` samples, oldest first,
/// genesis excluded.
pub fn next_difficulty(
    rules: &ConsensusConstants,
    mut timestamps: Vec<u64>,
    cumulative_difficulties: Vec<Difficulty>,
    _height: u64,
) -> Difficulty {
    debug_assert_eq!(timestamps.len(), cumulative_difficulties.len());
    debug_assert!(timestamps.len() <= rules.difficulty_blocks_count);
    let length = timestamps.len();
    if length <= 1 {
        return 1;
    }

    timestamps.sort_unstable();

    let full_window = rules.difficulty_blocks_count;
    let cut = rules.difficulty_cut;
    let (cut_begin, cut_end) = if length <= full_window.saturating_sub(2 * cut) {
        (0, length)
    } else {
        let kept = full_window - 2 * cut;
        let begin = (length - kept + 1) / 2;
        (begin, begin + kept)
    };
    debug_assert!(cut_begin + 2 <= cut_end && cut_end <= length);

    let time_span = timestamps[cut_end - 1].saturating_sub(timestamps[cut_begin]).max(1);
    let total_work = cumulative_difficulties[cut_end - 1] - cumulative_difficulties[cut_begin];
    debug_assert!(total_work > 0);

    let result =
        (u128::from(total_work) * u128::from(rules.difficulty_target) + u128::from(time_span) - 1) / u128::from(time_span);
    if result > u128::from(u64::MAX) {
        return u64::MAX;
    }
    result.max(1) as u64
}

/// True when `hash`, read as a little-endian 256-bit integer, satisfies
/// `hash × difficulty < 2²⁵⁶`.
pub fn check_hash(hash: &FixedHash, difficulty: Difficulty) -> bool {
    let bytes = hash.as_slice();
    let mut carry: u128 = 0;
    for limb in 0..4 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&bytes[limb * 8..limb * 8 + 8]);
        let product = u128::from(u64::from_le_bytes(word)) * u128::from(difficulty) + carry;
        carry = product >> 64;
    }
    carry == 0
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consensus::{ConsensusConstantsBuilder, Network};

    fn rules() -> ConsensusConstants {
        ConsensusConstantsBuilder::new(Network::LocalNet).build()
    }

    #[test]
    fn degenerate_windows_give_unit_difficulty() {
        let rules = rules();
        assert_eq!(next_difficulty(&rules, vec![], vec![], 1), 1);
        assert_eq!(next_difficulty(&rules, vec![100], vec![1], 1), 1);
    }

    #[test]
    fn steady_hashrate_keeps_difficulty() {
        let rules = rules();
        // one block per target interval at difficulty 1000 each
        let n = 30u64;
        let timestamps: Vec<u64> = (0..n).map(|i| i * rules.difficulty_target).collect();
        let cumulative: Vec<u64> = (0..n).map(|i| (i + 1) * 1000).collect();
        let next = next_difficulty(&rules, timestamps, cumulative, n);
        assert!((900..=1100).contains(&next), "next difficulty was {}", next);
    }

    #[test]
    fn faster_blocks_raise_difficulty() {
        let rules = rules();
        let n = 30u64;
        let slow: Vec<u64> = (0..n).map(|i| i * rules.difficulty_target).collect();
        let fast: Vec<u64> = (0..n).map(|i| i * (rules.difficulty_target / 4)).collect();
        let cumulative: Vec<u64> = (0..n).map(|i| (i + 1) * 1000).collect();
        let at_target = next_difficulty(&rules, slow, cumulative.clone(), n);
        let at_quarter = next_difficulty(&rules, fast, cumulative, n);
        assert!(at_quarter > at_target * 3);
    }

    #[test]
    fn check_hash_boundaries() {
        // an all-zero hash passes any difficulty
        assert!(check_hash(&FixedHash::zero(), u64::MAX));
        // an all-ones hash only passes difficulty 1
        let ones = FixedHash::from([0xff; 32]);
        assert!(check_hash(&ones, 1));
        assert!(!check_hash(&ones, 2));
    }

    #[test]
    fn check_hash_near_limit() {
        // hash = 2^255 exactly: passes difficulty 1, fails difficulty 2
        let mut bytes = [0u8; 32];
        bytes[31] = 0x80;
        let hash = FixedHash::from(bytes);
        assert!(check_hash(&hash, 1));
        assert!(!check_hash(&hash, 2));
    }
}
