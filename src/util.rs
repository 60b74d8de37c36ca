// Copyright (c) 2026 the Kerf developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.


/// Tolerance within which a scanned number matches a registered code
/// number (the RS274/NGC "close enough" rule).
pub const EPSILON: f64 = 0.0001;

/// Approximate equality: 92.00005 matches a registered 92, 92.001 does not.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Format a code identity like "G1" or "G92.1" from letter and number.
pub fn fmt_code(letter: char, number: f64) -> String {
    if approx_eq(number, number.round()) {
        format!("{}{}", letter, number.round() as i64)
    } else {
        format!("{}{}", letter, number)
    }
}

/// Bit index of an uppercase ASCII letter in a 26-bit letter set.
pub(crate) fn letter_bit(ch: char) -> usize {
    debug_assert!(ch.is_ascii_uppercase());
    (ch as u8 - b'A') as usize
}
