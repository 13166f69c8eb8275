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

//! The DPoS signer schedule.
//!
//! The elected top-N set rotates by delegate id: each delegate gets one slot of
//! `dpos_delegate_slot_time` seconds after the previous block, and missing a slot passes the turn
//! to the next id with wrap-around.

use std::collections::BTreeSet;

use xpb_common_types::DelegateId;

/// Steps `n` positions forward from the lowest member ≥ `start`, wrapping around the sorted set.
///
/// Panics on an empty set; callers guarantee the signer set is non-empty in the DPoS era.
pub fn nth_sorted_item_after(set: &BTreeSet<DelegateId>, start: DelegateId, n: u64) -> DelegateId {
    assert!(!set.is_empty(), "nth_sorted_item_after on an empty set");
    let n = (n % set.len() as u64) as usize;
    *set.range(start..)
        .chain(set.range(..start))
        .nth(n)
        .expect("set is non-empty and n < len")
}

/// The number of whole slots that elapsed between the previous block and `timestamp`.
pub fn elapsed_slots(prev_timestamp: u64, timestamp: u64, slot_time: u64) -> u64 {
    timestamp.saturating_sub(prev_timestamp) / slot_time
}

/// A delegate's uptime scaled to parts-per-million, smoothed so new delegates start at full
/// uptime rather than zero.
pub fn uptime_ppm(processed_blocks: u64, missed_blocks: u64) -> u64 {
    (processed_blocks + 1) * 1_000_000 / (processed_blocks + missed_blocks + 1)
}

/// The autovote ranking score: votes weighted by uptime. Deterministic integer arithmetic so
/// every node computes the identical ordering.
pub fn autoselect_score(total_votes: u64, processed_blocks: u64, missed_blocks: u64) -> u128 {
    u128::from(total_votes) * u128::from(uptime_ppm(processed_blocks, missed_blocks))
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(ids: &[u16]) -> BTreeSet<DelegateId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn nth_after_steps_and_wraps() {
        let delegates = set(&[2, 5, 9]);
        assert_eq!(nth_sorted_item_after(&delegates, 2, 0), 2);
        assert_eq!(nth_sorted_item_after(&delegates, 3, 0), 5);
        assert_eq!(nth_sorted_item_after(&delegates, 3, 1), 9);
        // wrap-around past the end
        assert_eq!(nth_sorted_item_after(&delegates, 3, 2), 2);
        assert_eq!(nth_sorted_item_after(&delegates, 10, 0), 2);
        // n wraps modulo the set size
        assert_eq!(nth_sorted_item_after(&delegates, 2, 3), 2);
        assert_eq!(nth_sorted_item_after(&delegates, 2, 4), 5);
    }

    #[test]
    fn singleton_set_always_wins() {
        let delegates = set(&[7]);
        for start in [0u16, 7, 65_535] {
            for n in 0..5 {
                assert_eq!(nth_sorted_item_after(&delegates, start, n), 7);
            }
        }
    }

    #[test]
    fn slot_arithmetic() {
        assert_eq!(elapsed_slots(100, 100, 20), 0);
        assert_eq!(elapsed_slots(100, 119, 20), 0);
        assert_eq!(elapsed_slots(100, 120, 20), 1);
        assert_eq!(elapsed_slots(100, 180, 20), 4);
        // clock going backwards never underflows
        assert_eq!(elapsed_slots(200, 100, 20), 0);
    }

    #[test]
    fn uptime_and_score() {
        assert_eq!(uptime_ppm(0, 0), 1_000_000);
        assert_eq!(uptime_ppm(99, 0), 1_000_000);
        assert!(uptime_ppm(50, 50) < 1_000_000);
        // flawless low-vote delegate can outrank a flaky high-vote one
        let flawless = autoselect_score(90, 100, 0);
        let flaky = autoselect_score(100, 10, 90);
        assert!(flawless > flaky);
    }
}
