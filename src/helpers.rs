/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::jpeg_error::{ExitCode, JpegError};

/// Helper function to catch panics and convert them into the appropriate JpegError
pub fn catch_unwind_result<R>(f: impl FnOnce() -> Result<R, JpegError>) -> Result<R, JpegError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(err) => {
            if let Some(message) = err.downcast_ref::<&str>() {
                Err(JpegError::new(ExitCode::AssertionFailure, *message))
            } else if let Some(message) = err.downcast_ref::<String>() {
                Err(JpegError::new(ExitCode::AssertionFailure, message))
            } else {
                Err(JpegError::new(ExitCode::AssertionFailure, "unknown panic"))
            }
        }
    }
}

/// returns true if the 64 bit value contains an 0xff byte.
/// Uses fancy bit manipulation to avoid branches.
#[inline(always)]
pub fn has_ff(v: u64) -> bool {
    (v & 0x8080808080808080 & !v.wrapping_add(0x0101010101010101)) != 0
}

/// Sign extends the `s` extra bits that follow a Huffman code into the coefficient value.
/// Values with the top bit clear are negative: `value - (2^s - 1)`.
#[inline(always)]
pub const fn devli(s: u8, value: u16) -> i16 {
    let shifted = 1 << s;

    if value & (shifted >> 1) != 0 {
        value as i16
    } else {
        value.wrapping_add(2).wrapping_add(!shifted) as i16
    }
}

/// check to make sure the behavior hasn't changed even with the optimization
#[test]
fn devli_test() {
    for s in 0u8..15 {
        for value in 0..(1 << s) {
            assert_eq!(
                devli(s, value),
                if s == 0 {
                    value as i16
                } else if value < (1 << (s as u16 - 1)) {
                    value as i16 + (-1 << s as i16) + 1
                } else {
                    value as i16
                }
            );
        }
    }
}

#[inline(always)]
pub const fn b_short(v1: u8, v2: u8) -> u16 {
    ((v1 as u16) << 8) + v2 as u16
}

#[inline(always)]
pub const fn rbits(c: u8, n: usize) -> u8 {
    return c & (0xFF >> (8 - n));
}

#[inline(always)]
pub const fn lbits(c: u8, n: usize) -> u8 {
    return c >> (8 - n);
}

/// divides rounding up, used for all the MCU and scaled geometry math
#[inline(always)]
pub const fn div_ceil(v: u32, d: u32) -> u32 {
    (v + d - 1) / d
}

#[cfg(test)]
pub fn get_rand_from_seed(seed: [u8; 32]) -> rand_chacha::ChaCha12Rng {
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    ChaCha12Rng::from_seed(seed)
}

#[test]
fn catch_unwind_translates_panics() {
    let r: Result<(), JpegError> = catch_unwind_result(|| panic!("boom"));
    let e = r.unwrap_err();
    assert_eq!(e.exit_code(), ExitCode::AssertionFailure);
    assert_eq!(e.message(), "boom");
}
