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

//! Checked amount arithmetic.
//!
//! Every amount in the protocol is an unsigned 64-bit atomic-unit count. Overflow or underflow is
//! never silent: validators use the predicates to reject before mutating, mutation sites use the
//! in-place helpers and treat `false` as a hard error.

/// Checked addition. `None` on overflow.
pub fn checked_add(a: u64, b: u64) -> Option<u64> {
    a.checked_add(b)
}

/// Checked subtraction. `None` on underflow.
pub fn checked_sub(a: u64, b: u64) -> Option<u64> {
    a.checked_sub(b)
}

pub fn add_would_overflow(a: u64, b: u64) -> bool {
    a.checked_add(b).is_none()
}

pub fn sub_would_underflow(a: u64, b: u64) -> bool {
    a.checked_sub(b).is_none()
}

/// Adds `rhs` into `amount`, returning false (and leaving `amount` untouched) on overflow.
pub fn add_amount(amount: &mut u64, rhs: u64) -> bool {
    match amount.checked_add(rhs) {
        Some(sum) => {
            *amount = sum;
            true
        },
        None => false,
    }
}

/// Subtracts `rhs` from `amount`, returning false (and leaving `amount` untouched) on underflow.
pub fn sub_amount(amount: &mut u64, rhs: u64) -> bool {
    match amount.checked_sub(rhs) {
        Some(diff) => {
            *amount = diff;
            true
        },
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_sub_round_trip() {
        let mut amount = 100u64;
        assert!(add_amount(&mut amount, 50));
        assert_eq!(amount, 150);
        assert!(sub_amount(&mut amount, 150));
        assert_eq!(amount, 0);
    }

    #[test]
    fn overflow_is_rejected_and_leaves_value() {
        let mut amount = u64::MAX - 1;
        assert!(!add_amount(&mut amount, 2));
        assert_eq!(amount, u64::MAX - 1);
        assert!(add_would_overflow(u64::MAX, 1));
        assert_eq!(checked_add(u64::MAX, 1), None);
    }

    #[test]
    fn underflow_is_rejected_and_leaves_value() {
        let mut amount = 1u64;
        assert!(!sub_amount(&mut amount, 2));
        assert_eq!(amount, 1);
        assert!(sub_would_underflow(0, 1));
        assert_eq!(checked_sub(0, 1), None);
    }
}
