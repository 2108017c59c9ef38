// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The resident updater.
//!
//! Every request is handled on its own: there is no session state between
//! packets, so a host can abandon an update at any point and start over
//! with a fresh ERASE. All failures are reported to the host as ERROR and
//! never retried here.

use crate::backup::{BackupRegister, ModeFlag};
use crate::flash::FlashProgram;
use crate::handler::{acknowledge_reset, Disposition, PacketHandler};
use log::{debug, trace, warn};
use steno_proto::packet::DEBUG_PAYLOAD_SIZE;
use steno_proto::trailer::ERASED_WORD;
use steno_proto::{Crc32, FlashChunk, FlashRegion, InfoText, Opcode, Request, Response};

/// Returned by INFO while the bootloader is resident.
pub const BOOTLOADER_INFO: &str = "Stenosaurus bootloader";

/// Board-specific handling of DEBUG requests, e.g. toggling LEDs.
pub type DebugHook = fn(&[u8; DEBUG_PAYLOAD_SIZE]);

pub struct Bootloader<F, B> {
    flash: F,
    mode: ModeFlag<B>,
    region: FlashRegion,
    debug_hook: Option<DebugHook>,
}

impl<F: FlashProgram, B: BackupRegister> Bootloader<F, B> {
    pub fn new(flash: F, backup: B, region: FlashRegion) -> Self {
        Bootloader {
            flash,
            mode: ModeFlag::new(backup),
            region,
            debug_hook: None,
        }
    }

    pub fn with_debug_hook(mut self, hook: DebugHook) -> Self {
        self.debug_hook = Some(hook);
        self
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn mode_flag(&self) -> &ModeFlag<B> {
        &self.mode
    }

    pub fn into_parts(self) -> (F, B) {
        (self.flash, self.mode.into_inner())
    }

    /// Erases the whole region and checks that it reads back blank.
    fn erase(&mut self) -> bool {
        self.flash.unlock();

        for page in self.region.pages() {
            if let Err(e) = self.flash.erase_page(page) {
                warn!("erasing page {:#010x} failed: {:?}", page, e);
                return false;
            }
        }

        let region = self.region;
        let flash = &self.flash;
        match (region.base..region.end)
            .step_by(4)
            .find(|&a| flash.read_word(a) != ERASED_WORD)
        {
            Some(address) => {
                warn!("word at {:#010x} not blank after erase", address);
                false
            }
            None => true,
        }
    }

    /// Programs and reads back each word of `chunk`. Every address is
    /// checked against the region before it is handed to the flash.
    fn program(&mut self, chunk: &FlashChunk) -> bool {
        let mut offset = chunk.offset();

        for &word in chunk.words() {
            let address = match self.region.word_address(offset) {
                Some(a) => a,
                None => {
                    warn!("offset {:#x} is outside the image region", offset);
                    return false;
                }
            };

            if let Err(e) = self.flash.program_word(address, word) {
                warn!("programming {:#010x} failed: {:?}", address, e);
                return false;
            }

            let readback = self.flash.read_word(address);
            if readback != word {
                warn!(
                    "readback mismatch at {:#010x}: wrote {:#010x}, read {:#010x}",
                    address, word, readback
                );
                return false;
            }

            offset = match offset.checked_add(4) {
                Some(o) => o,
                None => return false,
            };
        }

        trace!(
            "programmed {} words at offset {:#x}",
            chunk.words().len(),
            chunk.offset()
        );
        true
    }

    /// CRC of the first `word_count` words of the region, if they are all
    /// inside it.
    fn checksum(&self, word_count: u32) -> Option<u32> {
        if !self.region.contains_words(word_count) {
            warn!("verify of {} words overruns the image region", word_count);
            return None;
        }

        let mut crc = Crc32::new();
        for i in 0..word_count {
            crc.update_word(self.flash.read_word(self.region.base + i * 4));
        }

        Some(crc.finish())
    }
}

impl<F: FlashProgram, B: BackupRegister> PacketHandler for Bootloader<F, B> {
    fn handle(&mut self, request: &Request) -> (Response, Disposition) {
        let opcode = request.opcode();
        let error = Response::Error {
            opcode: opcode as u8,
        };

        let response = match request {
            Request::Info => Response::Info(InfoText::new(BOOTLOADER_INFO)),
            Request::Erase => {
                debug!("erasing image region");
                if self.erase() {
                    Response::Ack(opcode)
                } else {
                    error
                }
            }
            Request::Flash(chunk) => {
                if self.program(chunk) {
                    Response::Ack(opcode)
                } else {
                    error
                }
            }
            Request::Verify { word_count } => match self.checksum(*word_count) {
                Some(crc) => {
                    debug!("verify {} words: crc {:#010x}", word_count, crc);
                    Response::Checksum(crc)
                }
                None => error,
            },
            Request::EnterBootloader => Response::Mode { bootloader: true },
            Request::Reset { into_bootloader } => {
                return acknowledge_reset(&mut self.mode, *into_bootloader);
            }
            Request::Debug { payload } => {
                if let Some(hook) = self.debug_hook {
                    hook(payload);
                }
                Response::Ack(Opcode::Debug)
            }
        };

        (response, Disposition::Continue)
    }
}
