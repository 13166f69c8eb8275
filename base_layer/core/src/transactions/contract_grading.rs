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

//! Contract grading arithmetic.
//!
//! The grade splits every coin of the minted pool between the two sides of a contract; the fee
//! scale pays the grader out of the graded portion. Rounding directions are fixed so that for any
//! split of the pool, payouts plus fee never exceed the pool: the graded amount rounds down and
//! the fee taken rounds up.

/// The scale denominator: this value is 100% for grades and fee scales.
pub const GRADE_SCALE_MAX: u32 = 1_000_000_000;

fn grade_amount(full_amount: u64, grade: u32, fee_scale: u32) -> u64 {
    debug_assert!(grade <= GRADE_SCALE_MAX);
    debug_assert!(fee_scale <= GRADE_SCALE_MAX);

    let graded = u128::from(full_amount) * u128::from(grade) / u128::from(GRADE_SCALE_MAX);

    let mut fee = graded * u128::from(fee_scale) / u128::from(GRADE_SCALE_MAX);
    // round the fee up so no coin can be created via fee rounding
    while fee_scale > 0 && fee * u128::from(GRADE_SCALE_MAX) / u128::from(fee_scale) < graded {
        fee += 1;
    }
    debug_assert!(fee <= graded);

    (graded - fee) as u64
}

/// Coins a contract-coin holder receives per `contract_amount` held, at the given grade.
pub fn grade_contract_amount(contract_amount: u64, grade: u32, fee_scale: u32) -> u64 {
    grade_amount(contract_amount, grade, fee_scale)
}

/// Coins a backing-coin holder reclaims per `locked_amount` held; the other side of the grade.
pub fn grade_backing_amount(locked_amount: u64, grade: u32, fee_scale: u32) -> u64 {
    debug_assert!(grade <= GRADE_SCALE_MAX);
    grade_amount(locked_amount, GRADE_SCALE_MAX - grade, fee_scale)
}

/// The exact fee the grader may claim from a pool of `total_contract_coins`. Rounds down.
pub fn calculate_total_fee(total_contract_coins: u64, fee_scale: u32) -> u64 {
    debug_assert!(fee_scale <= GRADE_SCALE_MAX);
    (u128::from(total_contract_coins) * u128::from(fee_scale) / u128::from(GRADE_SCALE_MAX)) as u64
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::transactions::amount::add_amount;

    fn split_amount(amount: u64, pieces: usize) -> Vec<u64> {
        assert!(amount / pieces as u64 > 0);
        let mut result = vec![amount / pieces as u64; pieces];
        let assigned: u64 = result.iter().sum();
        if assigned < amount {
            result.push(amount - assigned);
        }
        assert_eq!(result.iter().sum::<u64>(), amount);
        result
    }

    // For any split of a pool, payouts plus fee stay at or below the pool and the shortfall is
    // bounded by two atomic units per participating output.
    fn check_conservation(
        backing_amounts: &[u64],
        contract_amounts: &[u64],
        grade: u32,
        fee_scale: u32,
    ) -> (u64, u64, u64) {
        let total_backing: u64 = backing_amounts.iter().sum();
        let total_contract: u64 = contract_amounts.iter().sum();
        assert_eq!(total_backing, total_contract);

        let mut from_backing = 0u64;
        for &amount in backing_amounts {
            let payout = grade_backing_amount(amount, grade, fee_scale);
            assert!(payout <= amount, "unbacking more than was given");
            assert!(add_amount(&mut from_backing, payout));
        }
        let mut from_contract = 0u64;
        for &amount in contract_amounts {
            let payout = grade_contract_amount(amount, grade, fee_scale);
            assert!(payout <= amount, "resolving more than was given");
            assert!(add_amount(&mut from_contract, payout));
        }

        let fee = calculate_total_fee(total_backing, fee_scale);
        let mut total = from_backing;
        assert!(add_amount(&mut total, from_contract));
        assert!(add_amount(&mut total, fee));
        assert!(total <= total_backing, "created {} coins", total - total_backing);

        let destroyed = total_backing - total;
        assert!(
            destroyed <= 2 * (backing_amounts.len() as u64 + contract_amounts.len() as u64),
            "destroyed too many coins: {}",
            destroyed
        );
        (from_backing, from_contract, fee)
    }

    #[test]
    fn conservation_over_grades_fees_and_splits() {
        let grades = [
            0,
            1,
            3,
            GRADE_SCALE_MAX / 4,
            GRADE_SCALE_MAX / 3,
            GRADE_SCALE_MAX / 2,
            GRADE_SCALE_MAX / 4 * 3,
            GRADE_SCALE_MAX - 3,
            GRADE_SCALE_MAX - 1,
            GRADE_SCALE_MAX,
        ];
        let totals = [1000u64, 76_513, u64::MAX - 50, u64::MAX - 1, u64::MAX];
        let splits = [1usize, 2, 3, 10, 23];
        for &total in &totals {
            for &split_left in &splits {
                let left = split_amount(total, split_left);
                for &split_right in &splits {
                    let right = split_amount(total, split_right);
                    for &grade in &grades {
                        for &fee in &grades {
                            check_conservation(&left, &right, grade, fee);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn known_amounts() {
        // (total, grade, fee_scale, expect_backing, expect_contract, expect_fee)
        let cases: &[(u64, u32, u32, u64, u64, u64)] = &[
            (1000, 0, 0, 1000, 0, 0),
            (1000, GRADE_SCALE_MAX / 2, 0, 500, 500, 0),
            (1000, GRADE_SCALE_MAX, 0, 0, 1000, 0),
            (1000, 0, GRADE_SCALE_MAX / 2, 500, 0, 500),
            (1000, GRADE_SCALE_MAX / 2, GRADE_SCALE_MAX / 2, 250, 250, 500),
            (1000, GRADE_SCALE_MAX, GRADE_SCALE_MAX / 2, 0, 500, 500),
            (1000, 0, GRADE_SCALE_MAX / 10, 900, 0, 100),
            (1000, GRADE_SCALE_MAX / 2, GRADE_SCALE_MAX / 10, 450, 450, 100),
            (1000, GRADE_SCALE_MAX, GRADE_SCALE_MAX / 10, 0, 900, 100),
            // grade rounds down, fee rounds up
            (1000, GRADE_SCALE_MAX / 3, 0, 666, 333, 0),
            (1000, GRADE_SCALE_MAX / 3, GRADE_SCALE_MAX / 10, 599, 299, 100),
            (1000, GRADE_SCALE_MAX / 3, GRADE_SCALE_MAX / 2, 333, 166, 500),
        ];
        for &(total, grade, fee_scale, expect_backing, expect_contract, expect_fee) in cases {
            let (backing, contract, fee) = check_conservation(&[total], &[total], grade, fee_scale);
            assert_eq!(backing, expect_backing, "backing for grade={grade} fee={fee_scale}");
            assert_eq!(contract, expect_contract, "contract for grade={grade} fee={fee_scale}");
            assert_eq!(fee, expect_fee, "fee for grade={grade} fee={fee_scale}");
        }
    }
}
