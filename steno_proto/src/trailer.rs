// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The metadata sealed onto the end of an application image.
//!
//! A programmed region looks like this, in words:
//!
//! ```text
//! | program data ... padding | length | crc | 0 | 0xffffffff ... |
//! ```
//!
//! `length` counts the program words (padding included, trailer excluded)
//! and `crc` is [`crate::crc32`] over them. Because the image length varies
//! the trailer has no fixed offset: it is found by scanning backward from
//! the end of the region for the first zero word, which can only be the
//! sentinel since everything after it is erased flash.

use crate::crc::Crc32;
use byteorder::{ByteOrder, LittleEndian};

/// Three words: length, crc, sentinel.
pub const TRAILER_WORDS: u32 = 3;
pub const TRAILER_SIZE: usize = 12;

pub const SENTINEL: u32 = 0;

/// The value of a word of freshly erased flash.
pub const ERASED_WORD: u32 = 0xffff_ffff;
pub const ERASED_BYTE: u8 = 0xff;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Trailer {
    /// Program length in words.
    pub length: u32,
    pub crc: u32,
}

impl Trailer {
    pub fn to_bytes(&self) -> [u8; TRAILER_SIZE] {
        let mut b = [0; TRAILER_SIZE];
        LittleEndian::write_u32_into(&[self.length, self.crc, SENTINEL], &mut b);
        b
    }
}

/// Why an installed image was rejected.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum InvalidImage {
    #[cfg_attr(feature = "std", error("no trailer sentinel in the image region"))]
    NoSentinel,

    #[cfg_attr(
        feature = "std",
        error("trailer length of {length} words does not fit before the trailer")
    )]
    LengthOutOfRange { length: u32 },

    #[cfg_attr(
        feature = "std",
        error("image CRC {actual:#010x} does not match trailer CRC {expected:#010x}")
    )]
    CrcMismatch { expected: u32, actual: u32 },
}

/// Finds the trailer in a region of `word_count` words, where `read_word`
/// returns the word at a given index. Returns the sentinel's index along
/// with the trailer.
pub fn locate<R>(word_count: u32, mut read_word: R) -> Result<(u32, Trailer), InvalidImage>
where
    R: FnMut(u32) -> u32,
{
    // The sentinel needs the length and crc words in front of it
    let sentinel = (TRAILER_WORDS - 1..word_count)
        .rev()
        .find(|&i| read_word(i) == SENTINEL)
        .ok_or(InvalidImage::NoSentinel)?;

    let trailer = Trailer {
        length: read_word(sentinel - 2),
        crc: read_word(sentinel - 1),
    };

    if trailer.length > sentinel - 2 {
        return Err(InvalidImage::LengthOutOfRange {
            length: trailer.length,
        });
    }

    Ok((sentinel, trailer))
}

/// Locates the trailer and checks the image CRC against it.
pub fn validate<R>(word_count: u32, mut read_word: R) -> Result<Trailer, InvalidImage>
where
    R: FnMut(u32) -> u32,
{
    let (_, trailer) = locate(word_count, &mut read_word)?;

    let mut crc = Crc32::new();
    for i in 0..trailer.length {
        crc.update_word(read_word(i));
    }

    let actual = crc.finish();
    if actual != trailer.crc {
        return Err(InvalidImage::CrcMismatch {
            expected: trailer.crc,
            actual,
        });
    }

    Ok(trailer)
}
