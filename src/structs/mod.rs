/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

mod bit_reader;
#[cfg(test)]
mod bit_writer;
mod component_info;
pub mod exif;
mod huffman_table;
mod idct;
pub mod jpeg_decoder;
pub mod jpeg_header;
mod jpeg_read;
mod mcu_compositor;
mod quantization_tables;
