// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed-size request/response framing.
//!
//! Every exchange is one 64-byte packet from the host followed by one
//! 64-byte packet from the device. Requests carry the opcode in byte 0 and
//! their arguments from byte 1. Responses carry the status in byte 0, an
//! echo of the request opcode in byte 1 and their payload from byte 2. All
//! numeric fields are little-endian `u32`s; unused bytes are zero.

use crate::WORD_SIZE;
use byteorder::{ByteOrder, LittleEndian};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

pub const PACKET_SIZE: usize = 64;

pub type Packet = [u8; PACKET_SIZE];

// opcode + word count + offset
const FLASH_HEADER_SIZE: usize = 6;

/// Words that fit in a single FLASH request.
pub const MAX_FLASH_WORDS: usize = (PACKET_SIZE - FLASH_HEADER_SIZE) / WORD_SIZE;

/// Bytes available for the identification string in an INFO response.
pub const INFO_CAPACITY: usize = PACKET_SIZE - 2;

/// Bytes available to a DEBUG request.
pub const DEBUG_PAYLOAD_SIZE: usize = PACKET_SIZE - 1;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum Opcode {
    Info = 1,
    Erase = 2,
    Flash = 3,
    Verify = 4,
    EnterBootloader = 5,
    Reset = 6,
    Debug = 9,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum Status {
    Ok = 1,
    Error = 2,
}

/// A run of words to program, `offset` bytes past the start of the image
/// region.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlashChunk {
    offset: u32,
    len: u8,
    words: [u32; MAX_FLASH_WORDS],
}

impl FlashChunk {
    /// Returns `None` if `words` won't fit in one packet.
    pub fn new(offset: u32, words: &[u32]) -> Option<FlashChunk> {
        if words.len() > MAX_FLASH_WORDS {
            return None;
        }

        let mut chunk = FlashChunk {
            offset,
            len: words.len() as u8,
            words: [0; MAX_FLASH_WORDS],
        };
        chunk.words[..words.len()].copy_from_slice(words);

        Some(chunk)
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..usize::from(self.len)]
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request {
    Info,
    Erase,
    Flash(FlashChunk),
    Verify { word_count: u32 },
    EnterBootloader,
    Reset { into_bootloader: bool },
    Debug { payload: [u8; DEBUG_PAYLOAD_SIZE] },
}

impl Request {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Info => Opcode::Info,
            Request::Erase => Opcode::Erase,
            Request::Flash(_) => Opcode::Flash,
            Request::Verify { .. } => Opcode::Verify,
            Request::EnterBootloader => Opcode::EnterBootloader,
            Request::Reset { .. } => Opcode::Reset,
            Request::Debug { .. } => Opcode::Debug,
        }
    }

    pub fn encode(&self) -> Packet {
        let mut p = [0; PACKET_SIZE];
        p[0] = self.opcode() as u8;

        match self {
            Request::Info | Request::Erase | Request::EnterBootloader => {}
            Request::Flash(chunk) => {
                let words = chunk.words();
                p[1] = words.len() as u8;
                LittleEndian::write_u32(&mut p[2..6], chunk.offset);
                LittleEndian::write_u32_into(
                    words,
                    &mut p[FLASH_HEADER_SIZE..FLASH_HEADER_SIZE + words.len() * WORD_SIZE],
                );
            }
            Request::Verify { word_count } => {
                LittleEndian::write_u32(&mut p[1..5], *word_count);
            }
            Request::Reset { into_bootloader } => {
                p[1] = u8::from(*into_bootloader);
            }
            Request::Debug { payload } => {
                p[1..].copy_from_slice(payload);
            }
        }

        p
    }

    pub fn decode(p: &Packet) -> Result<Request, DecodeError> {
        let opcode = Opcode::from_u8(p[0]).ok_or(DecodeError::UnknownOpcode(p[0]))?;

        let request = match opcode {
            Opcode::Info => Request::Info,
            Opcode::Erase => Request::Erase,
            Opcode::Flash => {
                let count = usize::from(p[1]);
                if count > MAX_FLASH_WORDS {
                    return Err(DecodeError::TooManyWords(p[1]));
                }
                let mut words = [0; MAX_FLASH_WORDS];
                LittleEndian::read_u32_into(
                    &p[FLASH_HEADER_SIZE..FLASH_HEADER_SIZE + count * WORD_SIZE],
                    &mut words[..count],
                );
                Request::Flash(FlashChunk {
                    offset: LittleEndian::read_u32(&p[2..6]),
                    len: p[1],
                    words,
                })
            }
            Opcode::Verify => Request::Verify {
                word_count: LittleEndian::read_u32(&p[1..5]),
            },
            Opcode::EnterBootloader => Request::EnterBootloader,
            // Only an explicit 1 asks for the bootloader
            Opcode::Reset => Request::Reset {
                into_bootloader: p[1] == 1,
            },
            Opcode::Debug => {
                let mut payload = [0; DEBUG_PAYLOAD_SIZE];
                payload.copy_from_slice(&p[1..]);
                Request::Debug { payload }
            }
        };

        Ok(request)
    }
}

/// The identification string carried by an INFO response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InfoText {
    len: u8,
    bytes: [u8; INFO_CAPACITY],
}

impl InfoText {
    /// Anything past [`INFO_CAPACITY`] bytes is dropped.
    pub fn new(text: &str) -> InfoText {
        Self::from_bytes(text.as_bytes())
    }

    /// Takes bytes up to the first NUL, or [`INFO_CAPACITY`].
    pub fn from_bytes(raw: &[u8]) -> InfoText {
        let raw = &raw[..raw.len().min(INFO_CAPACITY)];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());

        let mut bytes = [0; INFO_CAPACITY];
        bytes[..len].copy_from_slice(&raw[..len]);

        InfoText {
            len: len as u8,
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }

    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// OK to INFO
    Info(InfoText),
    /// OK with no payload (ERASE, FLASH, RESET, DEBUG)
    Ack(Opcode),
    /// OK to VERIFY
    Checksum(u32),
    /// OK to ENTER_BOOTLOADER; `bootloader` is set only by the bootloader
    Mode { bootloader: bool },
    /// ERROR, echoing whatever byte 0 of the request held
    Error { opcode: u8 },
}

impl Response {
    pub fn status(&self) -> Status {
        match self {
            Response::Error { .. } => Status::Error,
            _ => Status::Ok,
        }
    }

    /// The request byte this response answers.
    pub fn echo(&self) -> u8 {
        match self {
            Response::Info(_) => Opcode::Info as u8,
            Response::Ack(opcode) => *opcode as u8,
            Response::Checksum(_) => Opcode::Verify as u8,
            Response::Mode { .. } => Opcode::EnterBootloader as u8,
            Response::Error { opcode } => *opcode,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Status::Ok
    }

    pub fn encode(&self) -> Packet {
        let mut p = [0; PACKET_SIZE];
        p[0] = self.status() as u8;
        p[1] = self.echo();

        match self {
            Response::Info(text) => {
                let bytes = text.as_bytes();
                p[2..2 + bytes.len()].copy_from_slice(bytes);
            }
            Response::Checksum(crc) => {
                LittleEndian::write_u32(&mut p[2..6], *crc);
            }
            Response::Mode { bootloader } => {
                p[2] = u8::from(*bootloader);
            }
            Response::Ack(_) | Response::Error { .. } => {}
        }

        p
    }

    /// Interprets `p` as the answer to a request with opcode `request`.
    pub fn decode(request: Opcode, p: &Packet) -> Result<Response, DecodeError> {
        let status = Status::from_u8(p[0]).ok_or(DecodeError::BadStatus(p[0]))?;

        if p[1] != request as u8 {
            return Err(DecodeError::WrongEcho {
                expected: request,
                got: p[1],
            });
        }

        if status == Status::Error {
            return Ok(Response::Error { opcode: p[1] });
        }

        let response = match request {
            Opcode::Info => Response::Info(InfoText::from_bytes(&p[2..])),
            Opcode::Verify => Response::Checksum(LittleEndian::read_u32(&p[2..6])),
            Opcode::EnterBootloader => Response::Mode {
                bootloader: p[2] != 0,
            },
            Opcode::Erase | Opcode::Flash | Opcode::Reset | Opcode::Debug => {
                Response::Ack(request)
            }
        };

        Ok(response)
    }
}

/// Ways a packet can fail to parse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
pub enum DecodeError {
    #[cfg_attr(feature = "std", error("unknown opcode {0:#04x}"))]
    UnknownOpcode(u8),

    /// A FLASH request claimed more words than a packet can carry.
    #[cfg_attr(
        feature = "std",
        error("FLASH request claims {0} words, more than fit in a packet")
    )]
    TooManyWords(u8),

    #[cfg_attr(feature = "std", error("unknown response status {0:#04x}"))]
    BadStatus(u8),

    /// The response answers some other request than the one we sent.
    #[cfg_attr(
        feature = "std",
        error("expected a response to {expected:?}, got one echoing {got:#04x}")
    )]
    WrongEcho { expected: Opcode, got: u8 },
}
