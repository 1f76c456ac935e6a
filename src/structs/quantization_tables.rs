/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::*;

use super::jpeg_header::JpegHeader;

/// Quantization table of a component, ready for the inverse DCT
pub struct QuantizationTables {
    /// natural order
    quantization_table: [u16; 64],

    /// natural order, premultiplied by the AAN scale factors with 2 fractional bits
    idct_table: [i32; 64],
}

impl QuantizationTables {
    pub fn new(jpeg_header: &JpegHeader, component: usize) -> Self {
        Self::new_from_table(
            &jpeg_header.q_tables[usize::from(jpeg_header.cmp_info[component].q_table_index)],
        )
    }

    /// `quantization_table` is in zigzag order, as stored in the file
    pub fn new_from_table(quantization_table: &[u16; 64]) -> Self {
        let mut retval = QuantizationTables {
            quantization_table: [0; 64],
            idct_table: [0; 64],
        };

        for coord in 0..64 {
            let q = quantization_table[usize::from(RASTER_TO_ZIGZAG[coord])];

            retval.quantization_table[coord] = q;
            retval.idct_table[coord] =
                ((u32::from(q) * u32::from(AAN_SCALES[coord])) >> 12) as i32;
        }

        return retval;
    }

    pub fn get_quantization_table(&self) -> &[u16; 64] {
        &self.quantization_table
    }

    pub fn get_idct_table(&self) -> &[i32; 64] {
        &self.idct_table
    }
}

#[test]
fn tables_are_in_natural_order() {
    let mut zigzag = [0u16; 64];
    for (i, q) in zigzag.iter_mut().enumerate() {
        *q = i as u16 + 1;
    }

    let t = QuantizationTables::new_from_table(&zigzag);

    // second zigzag entry is (0,1), third is (1,0)
    assert_eq!(t.get_quantization_table()[1], 2);
    assert_eq!(t.get_quantization_table()[8], 3);
    assert_eq!(t.get_quantization_table()[63], 64);

    // DC scale is 1.0, so only the 2 fractional bits are added
    assert_eq!(t.get_idct_table()[0], 4);
    assert_eq!(t.get_idct_table()[63], (64 * 1247) >> 12);
}
