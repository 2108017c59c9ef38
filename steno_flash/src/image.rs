// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Preparing a raw application binary for the image region.
//!
//! The image is laid out exactly as it will sit in flash once programmed:
//! the program bytes, zero padding up to a word boundary, the trailer, and
//! erased flash (`0xff`) for the rest of the region. Checksums computed
//! over this buffer are therefore directly comparable with what the
//! bootloader reports.

use crate::FlashError;
use byteorder::{ByteOrder, LittleEndian};
use std::path::Path;
use steno_proto::trailer::ERASED_BYTE;
use steno_proto::{
    crc32, FlashChunk, FlashRegion, Trailer, MAX_FLASH_WORDS, TRAILER_SIZE, WORD_SIZE,
};

/// Bytes carried by a full FLASH packet.
const PACKET_DATA_SIZE: usize = MAX_FLASH_WORDS * WORD_SIZE;

#[derive(Clone, Debug)]
pub struct FirmwareImage {
    region: FlashRegion,
    /// Region-sized, as it will read back from flash.
    buffer: Vec<u8>,
    program_len: usize,
    trailer: Trailer,
}

impl FirmwareImage {
    /// The largest program that still leaves room for the trailer.
    pub fn max_size(region: &FlashRegion) -> usize {
        (region.size() as usize).saturating_sub(TRAILER_SIZE)
    }

    pub fn from_bytes(program: &[u8], region: FlashRegion) -> Result<Self, FlashError> {
        if !region.is_usable() {
            return Err(FlashError::UnusableRegion {
                base: region.base,
                end: region.end,
                page_size: region.page_size,
            });
        }

        let max = Self::max_size(&region);
        if program.len() > max {
            return Err(FlashError::ImageTooLarge {
                size: program.len(),
                max,
            });
        }

        let mut buffer = vec![ERASED_BYTE; region.size() as usize];
        let padded = program.len().next_multiple_of(WORD_SIZE);
        buffer[..program.len()].copy_from_slice(program);
        buffer[program.len()..padded].fill(0);

        let trailer = Trailer {
            length: (padded / WORD_SIZE) as u32,
            crc: crc32(&buffer[..padded]),
        };
        buffer[padded..padded + TRAILER_SIZE].copy_from_slice(&trailer.to_bytes());

        Ok(FirmwareImage {
            region,
            buffer,
            program_len: program.len(),
            trailer,
        })
    }

    pub fn read(path: &Path, region: FlashRegion) -> Result<Self, FlashError> {
        let program = std::fs::read(path).map_err(|source| FlashError::ReadImage {
            path: path.to_owned(),
            source,
        })?;
        Self::from_bytes(&program, region)
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }

    /// Size of the original binary.
    pub fn program_len(&self) -> usize {
        self.program_len
    }

    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    /// Program words, padding included.
    pub fn data_words(&self) -> u32 {
        self.trailer.length
    }

    /// CRC of the program words; what the trailer carries.
    pub fn crc(&self) -> u32 {
        self.trailer.crc
    }

    /// CRC of the entire region after programming; what VERIFY over the
    /// whole region must return.
    pub fn region_crc(&self) -> u32 {
        crc32(&self.buffer)
    }

    /// Program, padding and trailer, without the erased tail.
    pub fn sealed(&self) -> &[u8] {
        &self.buffer[..self.trailer.length as usize * WORD_SIZE + TRAILER_SIZE]
    }

    /// The whole region as it should read back.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Bytes that get sent: the sealed image rounded up to whole packets,
    /// but never past the end of the region.
    pub fn programmed_len(&self) -> usize {
        self.sealed()
            .len()
            .next_multiple_of(PACKET_DATA_SIZE)
            .min(self.buffer.len())
    }

    /// The FLASH payloads that program this image, in order.
    pub fn chunks(&self) -> impl Iterator<Item = FlashChunk> + '_ {
        self.buffer[..self.programmed_len()]
            .chunks(PACKET_DATA_SIZE)
            .enumerate()
            .filter_map(|(i, bytes)| {
                let mut words = [0; MAX_FLASH_WORDS];
                let n = bytes.len() / WORD_SIZE;
                LittleEndian::read_u32_into(&bytes[..n * WORD_SIZE], &mut words[..n]);
                FlashChunk::new((i * PACKET_DATA_SIZE) as u32, &words[..n])
            })
    }
}
