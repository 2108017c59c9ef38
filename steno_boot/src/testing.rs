// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory stand-ins for the board's flash and backup register.

use crate::backup::BackupRegister;
use crate::flash::{FlashProgram, FlashRead};
use steno_proto::FlashRegion;

/// 1 KiB region in four pages.
pub const TEST_REGION: FlashRegion = FlashRegion::new(0x0800_2000, 0x0800_2400, 0x100);

#[derive(Debug)]
pub struct FakeBackup(pub u16);

impl BackupRegister for FakeBackup {
    fn read(&self) -> u16 {
        self.0
    }

    fn write(&mut self, value: u16) {
        self.0 = value;
    }
}

/// NOR-like flash: erase sets every bit, programming can only clear bits.
/// Any access outside the region panics, so a test fails if an unchecked
/// address ever gets this far.
pub struct FakeFlash {
    region: FlashRegion,
    words: Vec<u32>,
    unlocked: bool,
    pub erases: usize,
    pub programs: usize,
    /// (address, bits that always read as zero)
    pub stuck: Option<(u32, u32)>,
}

impl FakeFlash {
    /// Starts out full of non-erased garbage.
    pub fn new(region: FlashRegion) -> Self {
        FakeFlash {
            region,
            words: vec![0x5555_aaaa; region.word_count() as usize],
            unlocked: false,
            erases: 0,
            programs: 0,
            stuck: None,
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn words_mut(&mut self) -> &mut [u32] {
        &mut self.words
    }

    fn index(&self, address: u32) -> usize {
        assert!(
            self.region.contains_word(address),
            "flash access at {address:#010x} outside {:x?}",
            self.region
        );
        assert_eq!(address % 4, 0, "unaligned flash access at {address:#010x}");
        ((address - self.region.base) / 4) as usize
    }
}

impl FlashRead for FakeFlash {
    fn read_word(&self, address: u32) -> u32 {
        let value = self.words[self.index(address)];
        match self.stuck {
            Some((a, mask)) if a == address => value & !mask,
            _ => value,
        }
    }
}

impl FlashProgram for FakeFlash {
    type Error = ();

    fn unlock(&mut self) {
        self.unlocked = true;
    }

    fn erase_page(&mut self, address: u32) -> Result<(), ()> {
        assert!(self.unlocked, "erase while locked");
        assert_eq!((address - self.region.base) % self.region.page_size, 0);

        let start = self.index(address);
        let end = (start + self.region.page_size as usize / 4).min(self.words.len());
        self.words[start..end].fill(u32::MAX);
        self.erases += 1;
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), ()> {
        assert!(self.unlocked, "program while locked");

        let i = self.index(address);
        self.words[i] &= word;
        self.programs += 1;
        Ok(())
    }
}
