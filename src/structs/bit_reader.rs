/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::{ErrorKind, Read};

use crate::helpers::has_ff;
use crate::jpeg_code;
use crate::jpeg_error::Result;

/// Strips the byte stuffing from a chunk of entropy coded data and appends the result to `output`.
///
/// `FF 00` becomes `FF`, restart markers `FF D0`..`FF D7` are removed and any other `FF xx`
/// pair is passed through unchanged. Runs of `FF` fill bytes collapse into the last one.
///
/// When the chunk ends with an `FF` whose successor hasn't been seen yet, `pending_ff` is set
/// and the pair is resolved by the next call. The output is never longer than the input plus
/// one byte for a pending `FF` carried in from the previous chunk.
pub fn filter_entropy_data(input: &[u8], pending_ff: &mut bool, output: &mut Vec<u8>) {
    let mut pos = 0;

    if *pending_ff {
        let Some(&next) = input.first() else {
            return;
        };

        *pending_ff = false;
        if next != 0xff {
            resolve_ff_pair(next, output);
            pos = 1;
        }
    }

    while pos < input.len() {
        // fast path, copy 8 bytes at once if none of them are 0xff
        if pos + 8 <= input.len() {
            let v = u64::from_le_bytes(
                <[u8; 8]>::try_from(&input[pos..pos + 8]).unwrap_or_default(),
            );
            if !has_ff(v) {
                output.extend_from_slice(&input[pos..pos + 8]);
                pos += 8;
                continue;
            }
        }

        let b = input[pos];
        pos += 1;

        if b != 0xff {
            output.push(b);
            continue;
        }

        if pos == input.len() {
            *pending_ff = true;
            break;
        }

        let next = input[pos];
        if next == 0xff {
            // fill byte, the next 0xff starts the actual marker
            continue;
        }

        pos += 1;
        resolve_ff_pair(next, output);
    }
}

/// Called once the source is exhausted. A dangling `FF` is kept as data.
pub fn flush_pending_ff(pending_ff: &mut bool, output: &mut Vec<u8>) {
    if *pending_ff {
        *pending_ff = false;
        output.push(0xff);
    }
}

#[inline(always)]
fn resolve_ff_pair(next: u8, output: &mut Vec<u8>) {
    match next {
        0x00 => output.push(0xff),
        jpeg_code::RST0..=jpeg_code::RST7 => {}
        _ => {
            output.push(0xff);
            output.push(next);
        }
    }
}

/// Bit reader over the entropy coded segment of a JPEG stream. Raw bytes are pulled from
/// the source a chunk at a time and run through `filter_entropy_data` before they get loaded
/// into a 64 bit register.
///
/// Once the source runs dry the register is padded with zero bits so that decoding can
/// continue to the end of the current block. `is_overrun` reports whether any of that padding
/// has been consumed.
pub struct BitReader<R> {
    inner: R,
    chunk: Vec<u8>,
    data: Vec<u8>,
    data_pos: usize,
    bits: u64,
    bits_left: u32,
    pending_ff: bool,
    eof: bool,
    padding_bits: u32,
    bytes_loaded: u64,
    source_bytes_read: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R, chunk_size: usize) -> Self {
        BitReader {
            inner,
            chunk: vec![0; chunk_size.max(1)],
            data: Vec::new(),
            data_pos: 0,
            bits: 0,
            bits_left: 0,
            pending_ff: false,
            eof: false,
            padding_bits: 0,
            bytes_loaded: 0,
            source_bytes_read: 0,
        }
    }

    /// Makes sure at least `bits` (at most 57) bits are available in the register.
    #[inline(always)]
    pub fn ensure_bits(&mut self, bits: u32) -> Result<()> {
        if self.bits_left < bits {
            self.fill_register()?;
        }
        Ok(())
    }

    /// Returns the next `n` bits (1..=32) without consuming them. The caller must have
    /// called `ensure_bits` for at least `n` bits.
    #[inline(always)]
    pub fn peek(&self, n: u32) -> u32 {
        debug_assert!(n > 0 && n <= 32 && n <= self.bits_left);
        ((self.bits >> (self.bits_left - n)) & ((1u64 << n) - 1)) as u32
    }

    #[inline(always)]
    pub fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.bits_left);
        self.bits_left -= n;
    }

    #[inline(always)]
    pub fn read(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }

        self.ensure_bits(n)?;
        let v = self.peek(n);
        self.consume(n);
        Ok(v)
    }

    /// Discards the rest of the current byte. Used at restart boundaries where the
    /// encoder padded the interval to a whole byte.
    pub fn align_to_byte(&mut self) {
        self.bits_left -= self.bits_left % 8;
    }

    /// true once bits past the end of the source have been consumed
    #[inline(always)]
    pub fn is_overrun(&self) -> bool {
        self.bits_left < self.padding_bits
    }

    /// number of filtered bits consumed so far, including any zero padding
    pub fn bit_position(&self) -> u64 {
        self.bytes_loaded * 8 - u64::from(self.bits_left)
    }

    /// number of raw bytes pulled from the source so far
    pub fn source_bytes_read(&self) -> u64 {
        self.source_bytes_read
    }

    #[cold]
    fn fill_register(&mut self) -> Result<()> {
        while self.bits_left <= 56 {
            if self.data_pos == self.data.len() && !self.refill_data()? {
                // past the end of the data, pad with zeros
                self.bits <<= 8;
                self.bits_left += 8;
                self.padding_bits += 8;
                self.bytes_loaded += 1;
                continue;
            }

            self.bits = (self.bits << 8) | u64::from(self.data[self.data_pos]);
            self.data_pos += 1;
            self.bits_left += 8;
            self.bytes_loaded += 1;
        }

        Ok(())
    }

    /// Reads the next chunk from the source into the filtered data buffer. Returns
    /// false if there is nothing left.
    fn refill_data(&mut self) -> Result<bool> {
        self.data.clear();
        self.data_pos = 0;

        while self.data.is_empty() {
            if self.eof {
                return Ok(false);
            }

            let n = match self.inner.read(&mut self.chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if n == 0 {
                self.eof = true;
                flush_pending_ff(&mut self.pending_ff, &mut self.data);
            } else {
                self.source_bytes_read += n as u64;
                filter_entropy_data(&self.chunk[..n], &mut self.pending_ff, &mut self.data);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
fn filter_all(chunks: &[&[u8]]) -> Vec<u8> {
    let mut pending = false;
    let mut out = Vec::new();
    for c in chunks {
        filter_entropy_data(c, &mut pending, &mut out);
    }
    flush_pending_ff(&mut pending, &mut out);
    out
}

#[test]
fn filter_removes_stuffing_and_restarts() {
    assert_eq!(
        filter_all(&[&[0x12, 0xff, 0x00, 0x34, 0xff, 0xd3, 0x56]]),
        [0x12, 0xff, 0x34, 0x56]
    );

    // other markers pass through untouched
    assert_eq!(filter_all(&[&[0xff, 0xd9, 0x01]]), [0xff, 0xd9, 0x01]);

    // fill bytes in front of a restart marker
    assert_eq!(filter_all(&[&[0xaa, 0xff, 0xff, 0xd0, 0xbb]]), [0xaa, 0xbb]);

    // long runs without any escape take the fast path
    let plain: Vec<u8> = (0..40).collect();
    assert_eq!(filter_all(&[&plain]), plain);
}

#[test]
fn filter_carries_ff_across_chunks() {
    // FF at the end of one chunk, 00 at the start of the next
    assert_eq!(filter_all(&[&[0x01, 0xff], &[0x00, 0x02]]), [0x01, 0xff, 0x02]);

    // restart marker split between chunks
    assert_eq!(filter_all(&[&[0x01, 0xff], &[0xd7, 0x02]]), [0x01, 0x02]);

    // split fill bytes
    assert_eq!(filter_all(&[&[0xff], &[0xff], &[0xd1, 0x03]]), [0x03]);

    // empty chunk in between keeps the carry
    assert_eq!(filter_all(&[&[0xff], &[], &[0x00]]), [0xff]);

    // dangling FF at the very end is kept
    assert_eq!(filter_all(&[&[0x05, 0xff]]), [0x05, 0xff]);
}

#[test]
fn filter_matches_bytewise_for_random_input() {
    use rand::Rng;

    let mut rng = crate::helpers::get_rand_from_seed([3; 32]);
    for _ in 0..200 {
        let len = rng.gen_range(0..100);
        let input: Vec<u8> = (0..len)
            .map(|_| {
                if rng.gen_bool(0.2) {
                    0xff
                } else {
                    rng.gen_range(0..4) + if rng.gen_bool(0.5) { 0 } else { 0xd0 }
                }
            })
            .collect();

        let whole = filter_all(&[&input]);

        let split = rng.gen_range(0..=input.len());
        let pieces = filter_all(&[&input[..split], &input[split..]]);

        let mut single = Vec::new();
        let mut pending = false;
        for b in input.iter() {
            filter_entropy_data(std::slice::from_ref(b), &mut pending, &mut single);
        }
        flush_pending_ff(&mut pending, &mut single);

        assert_eq!(whole, pieces);
        assert_eq!(whole, single);
        assert!(whole.len() <= input.len());
    }
}

#[test]
fn read_simple() {
    let data: [u8; 5] = [0x12, 0xff, 0x00, 0x34, 0xf0];

    // use a tiny chunk to exercise refilling
    let mut b = BitReader::new(&data[..], 1);

    assert_eq!(b.read(4).unwrap(), 0x1);
    assert_eq!(b.read(4).unwrap(), 0x2);
    assert_eq!(b.read(8).unwrap(), 0xff);
    assert_eq!(b.read(12).unwrap(), 0x34f);
    assert!(!b.is_overrun());
    assert_eq!(b.read(4).unwrap(), 0x0);
    assert!(!b.is_overrun());
    assert_eq!(b.bit_position(), 32);

    // past the end we get zeros and the overrun is reported
    assert_eq!(b.read(3).unwrap(), 0);
    assert!(b.is_overrun());
    assert_eq!(b.source_bytes_read(), 5);
}

#[test]
fn read_across_restart() {
    // restart interval padded with 1 bits, then marker, then the next interval
    let data: [u8; 4] = [0b1011_1111, 0xff, 0xd0, 0b0110_0000];
    let mut b = BitReader::new(&data[..], 2048);

    assert_eq!(b.read(3).unwrap(), 0b101);
    b.align_to_byte();
    assert_eq!(b.bit_position() % 8, 0);
    assert_eq!(b.read(3).unwrap(), 0b011);
    assert!(!b.is_overrun());
}

#[test]
fn read_truncate_ff() {
    let data: [u8; 2] = [0x12, 0xff];

    let mut b = BitReader::new(&data[..], 2048);

    assert_eq!(b.read(4).unwrap(), 0x1);
    assert_eq!(b.read(4).unwrap(), 0x2);

    // dangling FF is treated as data
    assert_eq!(b.read(8).unwrap(), 0xff);
    assert!(!b.is_overrun());
    assert_eq!(b.read(1).unwrap(), 0);
    assert!(b.is_overrun());
}
