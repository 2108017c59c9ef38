// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host side of the Stenosaurus firmware updater.
//!
//! [`flasher::Flasher`] drives a complete update: it switches the device
//! into its bootloader, erases and programs the image region, checks the
//! result with a device-side CRC and only then reboots into the new
//! application. The pieces it is built from ([`cmd`], [`image`],
//! [`transport`]) are usable on their own.

use std::path::PathBuf;
use strum_macros::Display;
use thiserror::Error;

pub mod cmd;
pub mod config;
pub mod flasher;
pub mod image;
pub mod transport;

pub use flasher::{FlashConfig, Flasher};
pub use image::FirmwareImage;
pub use transport::{Connector, SerialConnector, Transport, TransportError};

/// The exchange with the device that a [`FlashError::Rejected`] refers to.
#[derive(Copy, Clone, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Info,
    EnterBootloader,
    Erase,
    Flash,
    Verify,
    Reset,
    Debug,
}

/// Errors encountered while talking to or updating a device.
#[derive(Debug, Error)]
pub enum FlashError {
    /// The request or response never made it across intact.
    #[error("device communication failed: {0}")]
    Transport(#[from] TransportError),

    /// The device answered with an ERROR status.
    #[error("device rejected {step}")]
    Rejected { step: Step },

    /// A FLASH packet was refused; everything before `address` was
    /// programmed and read back successfully.
    #[error("device rejected FLASH at {address:#010x}")]
    FlashRejected { address: u32 },

    /// The CRC the device computed over its flash does not match the CRC of
    /// the image we sent. The device is left in the bootloader.
    #[error("flash CRC {actual:#010x} does not match image CRC {expected:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// The image region cannot hold a sealed image: it is empty, not
    /// page-aligned, or too small for the trailer.
    #[error(
        "unusable image region {base:#010x}..{end:#010x} with {page_size:#x} byte pages"
    )]
    UnusableRegion { base: u32, end: u32, page_size: u32 },

    #[error("image is {size} bytes but at most {max} fit in the image region")]
    ImageTooLarge { size: usize, max: usize },

    #[error("failed to read image {}", .path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt to reach the bootloader failed, or the device kept
    /// answering from the application.
    #[error("bootloader not reachable after {attempts} attempts")]
    BootloaderUnreachable { attempts: u32 },
}
