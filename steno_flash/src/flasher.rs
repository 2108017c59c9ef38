// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::cmd::{do_erase, do_flash, do_mode, do_reset, do_verify};
use crate::image::FirmwareImage;
use crate::transport::Connector;
use crate::FlashError;
use log::{debug, info, warn};
use std::path::Path;
use std::thread;
use std::time::Duration;
use steno_proto::{FlashRegion, PROGRAM_AREA};

/// How hard to try reaching the bootloader, and how long to wait for it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FlashConfig {
    /// Connection attempts before giving up on the bootloader.
    pub attempts: u32,
    /// Pause between attempts; covers the device resetting and
    /// re-enumerating.
    pub backoff: Duration,
    /// Bound on every single request/response exchange.
    pub timeout: Duration,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            attempts: 10,
            backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct Flasher<C> {
    connector: C,
    region: FlashRegion,
    config: FlashConfig,
}

impl<C: Connector> Flasher<C> {
    pub fn new(connector: C, config: FlashConfig) -> Self {
        Flasher {
            connector,
            region: PROGRAM_AREA,
            config,
        }
    }

    pub fn with_region(mut self, region: FlashRegion) -> Self {
        self.region = region;
        self
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }

    pub fn config(&self) -> &FlashConfig {
        &self.config
    }

    pub fn connector(&mut self) -> &mut C {
        &mut self.connector
    }

    pub fn into_connector(self) -> C {
        self.connector
    }

    /// Returns a connection to the bootloader, rebooting the device into it
    /// if the application is running.
    pub fn enter_bootloader(&mut self) -> Result<C::Transport, FlashError> {
        let attempts = self.config.attempts;

        for attempt in 1..=attempts {
            match self.connector.open() {
                Ok(mut transport) => match do_mode(&mut transport) {
                    Ok(true) => {
                        debug!("bootloader answered on attempt {}", attempt);
                        return Ok(transport);
                    }
                    Ok(false) => {
                        info!("application is running, rebooting into the bootloader");
                        if let Err(e) = do_reset(&mut transport, true) {
                            warn!("reset into bootloader failed: {}", e);
                        }
                    }
                    Err(e) => warn!("attempt {}/{}: mode query failed: {}", attempt, attempts, e),
                },
                Err(e) => warn!("attempt {}/{}: cannot open device: {}", attempt, attempts, e),
            }

            if attempt < attempts {
                thread::sleep(self.config.backoff);
            }
        }

        Err(FlashError::BootloaderUnreachable { attempts })
    }

    /// Reads the binary at `path` and installs it.
    pub fn flash(&mut self, path: &Path) -> Result<(), FlashError> {
        let image = FirmwareImage::read(path, self.region)?;
        self.flash_image(&image)
    }

    /// Installs `image` and reboots into it. The device is only told to
    /// leave the bootloader once its own CRC over the region matches.
    pub fn flash_image(&mut self, image: &FirmwareImage) -> Result<(), FlashError> {
        info!(
            "image: {} bytes, {} words, crc {:#010x}",
            image.program_len(),
            image.data_words(),
            image.crc()
        );

        let mut transport = self.enter_bootloader()?;

        info!("erasing {:#010x}..{:#010x}", self.region.base, self.region.end);
        do_erase(&mut transport)?;

        let mut packets = 0;
        for chunk in image.chunks() {
            do_flash(&mut transport, &self.region, &chunk)?;
            packets += 1;
        }
        info!(
            "programmed {} bytes in {} packets",
            image.programmed_len(),
            packets
        );

        let expected = image.region_crc();
        let actual = do_verify(&mut transport, self.region.word_count())?;
        if actual != expected {
            return Err(FlashError::ChecksumMismatch { expected, actual });
        }
        info!("verified, crc {:#010x}", actual);

        // The image is in place either way; a lost acknowledgment here just
        // means the device reset before we heard back.
        if let Err(e) = do_reset(&mut transport, false) {
            warn!("reset into application failed: {}", e);
        }

        Ok(())
    }
}
