// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device side of the Stenosaurus updater.
//!
//! A board crate provides the flash controller ([`flash::FlashProgram`]),
//! the backup register ([`backup::BackupRegister`]) and the USB endpoint
//! ([`service::PacketPort`]); everything else is here. On reset the board
//! calls [`boot::decide`] and either starts the application or runs a
//! [`Bootloader`] behind [`service::service_packet`].

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod backup;
pub mod boot;
pub mod bootloader;
pub mod flash;
pub mod handler;
pub mod service;

#[cfg(test)]
mod testing;

pub use app::{Application, APPLICATION_INFO};
pub use backup::{BackupRegister, ModeFlag};
pub use boot::{decide, validate_image, AppEntry, BootDecision, ImageStatus, StayReason};
pub use bootloader::{Bootloader, BOOTLOADER_INFO};
pub use flash::{FlashProgram, FlashRead};
pub use handler::{Disposition, PacketHandler};
pub use service::{service_packet, PacketPort, ResetControl};
