// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Definitions shared by the Stenosaurus bootloader and the host-side
//! update tool: the 64-byte packet protocol, the image checksum, the flash
//! layout, and the trailer that seals an application image.
//!
//! Anything here that touches the wire has to stay bit-exact between the
//! two sides; changing it means reflashing every bootloader in the field.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod crc;
pub mod packet;
pub mod region;
pub mod trailer;

pub use crc::{crc32, Crc32};
pub use packet::{
    DecodeError, FlashChunk, InfoText, Opcode, Packet, Request, Response, Status,
    MAX_FLASH_WORDS, PACKET_SIZE,
};
pub use region::{FlashRegion, PROGRAM_AREA};
pub use trailer::{InvalidImage, Trailer, TRAILER_SIZE};

pub const WORD_SIZE: usize = 4;
