/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Writes varying sized bit fields the way a JPEG encoder does, escaping 0xff -> [0xff,0].
/// Only used to produce entropy coded test data.
pub struct BitWriter {
    data_buffer: Vec<u8>,
    fill_register: u64,
    current_bit: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        return BitWriter {
            current_bit: 64,
            fill_register: 0,
            data_buffer: Vec::with_capacity(1024),
        };
    }

    fn flush_whole_bytes(&mut self) {
        while self.current_bit <= 56 {
            let b = (self.fill_register >> 56) as u8;
            if b != 0xff {
                self.data_buffer.push(b);
            } else {
                self.data_buffer.extend_from_slice(&[0xff, 0]);
            }

            self.fill_register <<= 8;
            self.current_bit += 8;
        }
    }

    pub fn write(&mut self, val: u32, new_bits: u32) {
        debug_assert!(new_bits <= 32, "new_bits {0} should be <= 32", new_bits);
        debug_assert!(
            u64::from(val) < (1u64 << new_bits),
            "value {0} should fit into the number of {1} bits provided",
            val,
            new_bits
        );

        if new_bits == 0 {
            return;
        }

        self.flush_whole_bytes();
        self.fill_register |= u64::from(val) << (self.current_bit - new_bits);
        self.current_bit -= new_bits;
    }

    /// pads the current byte with 1 bits
    pub fn pad(&mut self) {
        while (self.current_bit & 7) != 0 {
            self.write(1, 1);
        }
        self.flush_whole_bytes();
    }

    /// writes a raw marker, the writer must be byte aligned
    pub fn write_marker(&mut self, code: u8) {
        self.pad();
        self.data_buffer.extend_from_slice(&[0xff, code]);
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.pad();
        self.data_buffer
    }
}

#[cfg(test)]
use super::bit_reader::BitReader;

// write a test pattern with an escape and see if it matches
#[test]
fn write_simple() {
    let arr = [0x12 as u8, 0x34, 0x45, 0x67, 0x89, 0xff, 00, 0xef];

    let mut b = BitWriter::new();

    b.write(1, 4);
    b.write(2, 4);
    b.write(3, 4);
    b.write(4, 4);
    b.write(4, 4);
    b.write(0x56, 8);
    b.write(0x78, 8);
    b.write(0x9f, 8);
    b.write(0xfe, 8);

    // the last nibble is padded with ones
    b.write(0x7, 3);

    assert_eq!(b.finish()[..], arr);
}

// verify the the bits roundtrip correctly with random bits and restart markers in between
#[test]
fn roundtrip_randombits() {
    use rand::Rng;

    const ITERATIONS: usize = 10000;

    let mut rng = crate::helpers::get_rand_from_seed([0u8; 32]);
    let mut test_data = Vec::with_capacity(ITERATIONS);

    for _ in 0..ITERATIONS {
        let bits = rng.gen_range(0..=16);
        let v = rng.gen_range(0..=65535) & ((1 << bits) - 1);
        test_data.push((v as u32, bits as u32, rng.gen_range(0..100) == 0));
    }

    let mut b = BitWriter::new();
    for (i, &(v, bits, restart)) in test_data.iter().enumerate() {
        b.write(v, bits);
        if restart {
            b.write_marker(crate::jpeg_code::RST0 + (i % 8) as u8);
        }
    }
    let buf = b.finish();

    let mut r = BitReader::new(&buf[..], 64);
    for &(v, bits, restart) in test_data.iter() {
        assert_eq!(v, r.read(bits).unwrap());
        if restart {
            r.align_to_byte();
        }
    }
    assert!(!r.is_overrun());
}
