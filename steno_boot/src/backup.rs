// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The "stay in the bootloader next boot" request.
//!
//! This is the only state that survives a reset. It lives in bit 0 of
//! backup data register 1 (`BKP_DR1`), which keeps its contents across a
//! system reset but is cleared along with the rest of the backup domain.
//!
//! Lifecycle:
//!
//! - clear from the factory;
//! - set by a RESET request asking for the bootloader (either from the
//!   application or from the bootloader itself);
//! - read and cleared exactly once, by the boot decision on the next boot.

use bitfield::bitfield;

/// A 16-bit backup-domain register.
///
/// On the STM32F1 the board must enable the BKP and PWR clocks and lift
/// backup domain write protection before `write` has any effect.
pub trait BackupRegister {
    fn read(&self) -> u16;
    fn write(&mut self, value: u16);
}

bitfield! {
    /// Layout of `BKP_DR1`.
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct BootFlags(u16);
    impl Debug;
    pub bootloader_requested, set_bootloader_requested: 0;
}

/// Typed access to the persisted mode flag. Other bits of the register are
/// preserved.
pub struct ModeFlag<R> {
    register: R,
}

impl<R: BackupRegister> ModeFlag<R> {
    pub fn new(register: R) -> Self {
        ModeFlag { register }
    }

    fn flags(&self) -> BootFlags {
        BootFlags(self.register.read())
    }

    pub fn is_set(&self) -> bool {
        self.flags().bootloader_requested()
    }

    /// Records whether the next boot should stay in the bootloader.
    pub fn set(&mut self, into_bootloader: bool) {
        let mut flags = self.flags();
        flags.set_bootloader_requested(into_bootloader);
        self.register.write(flags.0);
    }

    /// Consumes the request: returns whether it was set and leaves it clear.
    pub fn take(&mut self) -> bool {
        let requested = self.is_set();
        if requested {
            self.set(false);
        }
        requested
    }

    pub fn register(&self) -> &R {
        &self.register
    }

    pub fn into_inner(self) -> R {
        self.register
    }
}
