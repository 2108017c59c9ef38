// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::trailer::TRAILER_SIZE;
use crate::WORD_SIZE;

/// A contiguous, erasable range of flash that holds the application image.
///
/// `end` is exclusive: it is not valid to read or write at `end`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlashRegion {
    pub base: u32,
    pub end: u32,
    pub page_size: u32,
}

/// The Stenosaurus (STM32F103, 256 KiB) layout. The first 8 KiB of flash
/// belong to the bootloader.
pub const PROGRAM_AREA: FlashRegion = FlashRegion {
    base: 0x0800_0000 + 1024 * 8,
    end: 0x0800_0000 + 1024 * 256,
    page_size: 1024 * 2,
};

impl FlashRegion {
    pub const fn new(base: u32, end: u32, page_size: u32) -> Self {
        FlashRegion {
            base,
            end,
            page_size,
        }
    }

    /// Size of the region in bytes.
    pub const fn size(&self) -> u32 {
        self.end - self.base
    }

    /// True if the region is page-aligned, has word-sized pages and can hold
    /// at least a trailer plus one word.
    pub fn is_usable(&self) -> bool {
        let page = self.page_size;
        page != 0
            && page % WORD_SIZE as u32 == 0
            && self.base % page == 0
            && self.end % page == 0
            && self.end > self.base
            && self.size() as usize > TRAILER_SIZE
    }

    /// Number of whole words in the region.
    pub const fn word_count(&self) -> u32 {
        self.size() / WORD_SIZE as u32
    }

    /// Translates a byte offset from the start of the region into an
    /// absolute address, provided the offset is word-aligned and a whole
    /// word at that address lies inside `[base, end)`.
    pub fn word_address(&self, offset: u32) -> Option<u32> {
        if offset % WORD_SIZE as u32 != 0 {
            return None;
        }
        let address = self.base.checked_add(offset)?;
        if self.contains_word(address) {
            Some(address)
        } else {
            None
        }
    }

    /// True if all four bytes at `address` are inside the region.
    pub fn contains_word(&self, address: u32) -> bool {
        address >= self.base
            && address
                .checked_add(WORD_SIZE as u32)
                .map_or(false, |last| last <= self.end)
    }

    /// True if `count` words starting at `base` stay inside the region.
    pub fn contains_words(&self, count: u32) -> bool {
        count
            .checked_mul(WORD_SIZE as u32)
            .and_then(|bytes| self.base.checked_add(bytes))
            .map_or(false, |last| last <= self.end)
    }

    /// Start addresses of every erase page covering the region.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        let page_size = self.page_size as usize;
        (self.base..self.end).step_by(page_size)
    }
}
