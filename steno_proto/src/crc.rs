// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The image checksum shared by the bootloader and the host.
//!
//! This is the algorithm implemented by the STM32F1 CRC peripheral:
//!
//! poly: 0x04c11db7
//! initial: 0xffffffff
//! final xor: 0x00000000
//! input: 32-bit little-endian words, shifted in most significant bit first
//!
//! Fed one byte at a time this is CRC-32/MPEG-2 over each word's bytes in
//! big-endian order. It is *not* the common "CRC-32" check value, which
//! reflects and complements the result. Both sides must compute exactly
//! this value; do not add a final XOR on one side only.

use byteorder::{ByteOrder, LittleEndian};

/// Register value before any word has been processed.
pub const CRC_INIT: u32 = 0xffff_ffff;

// Nibble lookup table for the 0x04C11DB7 polynomial.
#[rustfmt::skip]
const CRC_TABLE: [u32; 16] = [
    0x0000_0000, 0x04c1_1db7, 0x0982_3b6e, 0x0d43_26d9,
    0x1304_76dc, 0x17c5_6b6b, 0x1a86_4db2, 0x1e47_5005,
    0x2608_edb8, 0x22c9_f00f, 0x2f8a_d6d6, 0x2b4b_cb61,
    0x350c_9b64, 0x31cd_86d3, 0x3c8e_a00a, 0x384f_bdbd,
];

/// Streaming form of [`crc32`], for callers that produce words one at a
/// time (e.g. reading them back out of flash).
#[derive(Copy, Clone, Debug)]
pub struct Crc32 {
    register: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    pub const fn new() -> Self {
        Crc32 { register: CRC_INIT }
    }

    pub fn update_word(&mut self, word: u32) {
        let mut r = self.register ^ word;

        // 32 bits, four at a time
        for _ in 0..8 {
            r = (r << 4) ^ CRC_TABLE[(r >> 28) as usize];
        }

        self.register = r;
    }

    /// Feeds whole little-endian words from `bytes`. Any trailing bytes
    /// past the last full word are ignored.
    pub fn update(&mut self, bytes: &[u8]) {
        for w in bytes.chunks_exact(4) {
            self.update_word(LittleEndian::read_u32(w));
        }
    }

    pub fn finish(&self) -> u32 {
        self.register
    }
}

/// Checksums `buffer` as a sequence of little-endian words.
///
/// The caller is responsible for padding `buffer` to a multiple of 4 bytes;
/// only the leading `buffer.len() / 4` words are processed.
pub fn crc32(buffer: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(buffer);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crc_any::CRCu32;

    // Reference implementation: MPEG-2 over every word byte-swapped.
    fn mpeg2_words(buffer: &[u8]) -> u32 {
        let mut crc = CRCu32::crc32mpeg2();
        for w in buffer.chunks_exact(4) {
            crc.digest(&[w[3], w[2], w[1], w[0]]);
        }
        crc.get_crc()
    }

    #[test]
    fn zero_word_vector() {
        assert_eq!(crc32(&[0, 0, 0, 0]), 0xc704_dd7b);
    }

    #[test]
    fn erased_word_clears_register() {
        // 0xffffffff ^ 0xffffffff leaves nothing to shift out
        assert_eq!(crc32(&[0xff; 4]), 0);
    }

    #[test]
    fn empty_buffer_is_initial_value() {
        assert_eq!(crc32(&[]), CRC_INIT);
    }

    #[test]
    fn no_final_xor() {
        // The textbook CRC-32 check value for "123456789" is 0xcbf43926; we
        // must not produce it (nor its complement) for the padded input.
        let data = b"123456789\0\0\0";
        let crc = crc32(data);
        assert_ne!(crc, 0xcbf4_3926);
        assert_eq!(crc, mpeg2_words(data));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        assert_eq!(crc32(&data), crc32(&data[..8]));
    }

    #[test]
    fn matches_mpeg2_reference() {
        let data: Vec<u8> = (0..1024u32).map(|i| (i * 7 + 3) as u8).collect();
        assert_eq!(crc32(&data), mpeg2_words(&data));
        assert_eq!(crc32(&data), crc32(&data));
    }

    #[test]
    fn streaming_matches_oneshot() {
        let data: Vec<u8> = (0..256u32).map(|i| i as u8).collect();
        let mut crc = Crc32::new();
        for w in data.chunks_exact(4) {
            crc.update_word(u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        }
        assert_eq!(crc.finish(), crc32(&data));
    }
}
