// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The flash primitives the bootloader is built on. A board supplies these
//! on top of its flash controller; nothing in this crate touches flash any
//! other way.

/// Word reads from memory-mapped flash.
pub trait FlashRead {
    /// Reads the word at an absolute, word-aligned `address`.
    fn read_word(&self, address: u32) -> u32;
}

impl<T: FlashRead + ?Sized> FlashRead for &T {
    fn read_word(&self, address: u32) -> u32 {
        (**self).read_word(address)
    }
}

/// Erase and word programming.
///
/// Callers guarantee that every address passed in lies inside the image
/// region; implementations are not expected to range-check.
pub trait FlashProgram: FlashRead {
    type Error: core::fmt::Debug;

    /// Enables erase/program operations on the flash controller.
    fn unlock(&mut self);

    /// Erases the page starting at `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), Self::Error>;

    /// Programs one word. Only meaningful on erased flash.
    fn program_word(&mut self, address: u32, word: u32) -> Result<(), Self::Error>;
}
