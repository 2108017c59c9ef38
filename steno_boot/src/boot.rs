// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What to run after a reset.
//!
//! The application is only started when nothing asks to stay in the
//! bootloader and the image in flash carries a trailer whose CRC matches.
//! A half-written or corrupted image therefore always leaves the device in
//! the bootloader, where it can be reflashed.

use crate::backup::{BackupRegister, ModeFlag};
use crate::flash::FlashRead;
use log::{info, warn};
use steno_proto::trailer;
use steno_proto::{FlashRegion, InvalidImage, Trailer};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageStatus {
    Valid(Trailer),
    Invalid(InvalidImage),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StayReason {
    /// The force-recovery input was asserted at boot.
    ForcedRecovery,
    /// The persisted mode flag was set by a RESET request.
    Requested,
    Invalid(InvalidImage),
}

/// Where the application starts, taken from its vector table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AppEntry {
    pub vector_table: u32,
    pub stack_pointer: u32,
    pub reset_vector: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BootDecision {
    StayInBootloader(StayReason),
    StartApplication(AppEntry),
}

/// Checks the image installed in `region` against its trailer.
pub fn validate_image<F: FlashRead>(flash: &F, region: &FlashRegion) -> ImageStatus {
    let base = region.base;
    match trailer::validate(region.word_count(), |i| flash.read_word(base + i * 4)) {
        Ok(t) => ImageStatus::Valid(t),
        Err(e) => ImageStatus::Invalid(e),
    }
}

/// Decides whether to stay in the bootloader or start the application.
///
/// The mode flag is consumed on every boot, even when recovery is forced,
/// so a request to stay never outlives the boot that honored it.
pub fn decide<B, F>(
    force_recovery: bool,
    mode: &mut ModeFlag<B>,
    flash: &F,
    region: &FlashRegion,
) -> BootDecision
where
    B: BackupRegister,
    F: FlashRead,
{
    let requested = mode.take();

    if force_recovery {
        info!("recovery input asserted");
        return BootDecision::StayInBootloader(StayReason::ForcedRecovery);
    }

    if requested {
        info!("bootloader requested before reset");
        return BootDecision::StayInBootloader(StayReason::Requested);
    }

    match validate_image(flash, region) {
        ImageStatus::Valid(t) => {
            info!("image valid: {} words, crc {:#010x}", t.length, t.crc);
            BootDecision::StartApplication(AppEntry {
                vector_table: region.base,
                stack_pointer: flash.read_word(region.base),
                reset_vector: flash.read_word(region.base + 4),
            })
        }
        ImageStatus::Invalid(e) => {
            warn!("not starting application: {:?}", e);
            BootDecision::StayInBootloader(StayReason::Invalid(e))
        }
    }
}

/// Relocates the vector table and jumps into the application.
///
/// # Safety
///
/// `entry` must describe a validated image, and the caller must have put
/// every peripheral the bootloader touched back into its reset state.
#[cfg(feature = "cortex-m")]
pub unsafe fn start_application(entry: &AppEntry) -> ! {
    (*cortex_m::peripheral::SCB::PTR)
        .vtor
        .write(entry.vector_table);
    cortex_m::asm::bootload(entry.vector_table as *const u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackup, FakeFlash, TEST_REGION};
    use steno_proto::crc32;
    use steno_proto::trailer::{ERASED_WORD, SENTINEL};

    const PROGRAM: [u32; 5] = [0x2000_5000, 0x0800_2101, 0, 0xdead_beef, 0x4770_4770];

    fn installed(program: &[u32]) -> FakeFlash {
        let mut flash = FakeFlash::new(TEST_REGION);
        let words = flash.words_mut();
        words.fill(ERASED_WORD);

        let mut bytes = Vec::new();
        for (i, &w) in program.iter().enumerate() {
            words[i] = w;
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let n = program.len();
        words[n] = n as u32;
        words[n + 1] = crc32(&bytes);
        words[n + 2] = SENTINEL;
        flash
    }

    fn decide_with(force: bool, backup: u16, flash: &FakeFlash) -> (BootDecision, u16) {
        let mut mode = ModeFlag::new(FakeBackup(backup));
        let d = decide(force, &mut mode, flash, &TEST_REGION);
        (d, mode.into_inner().0)
    }

    #[test]
    fn starts_valid_image() {
        let flash = installed(&PROGRAM);
        assert_eq!(
            decide_with(false, 0, &flash).0,
            BootDecision::StartApplication(AppEntry {
                vector_table: TEST_REGION.base,
                stack_pointer: 0x2000_5000,
                reset_vector: 0x0800_2101,
            })
        );
    }

    #[test]
    fn forced_recovery_wins() {
        let flash = installed(&PROGRAM);
        assert_eq!(
            decide_with(true, 0, &flash).0,
            BootDecision::StayInBootloader(StayReason::ForcedRecovery)
        );
    }

    #[test]
    fn request_is_one_shot() {
        let flash = installed(&PROGRAM);

        let (d, backup) = decide_with(false, 1, &flash);
        assert_eq!(d, BootDecision::StayInBootloader(StayReason::Requested));
        assert_eq!(backup, 0);

        assert!(matches!(
            decide_with(false, backup, &flash).0,
            BootDecision::StartApplication(_)
        ));
    }

    #[test]
    fn forced_recovery_still_consumes_request() {
        let flash = installed(&PROGRAM);
        let (d, backup) = decide_with(true, 1, &flash);
        assert_eq!(d, BootDecision::StayInBootloader(StayReason::ForcedRecovery));
        assert_eq!(backup, 0);
    }

    #[test]
    fn erased_flash_stays() {
        let mut flash = FakeFlash::new(TEST_REGION);
        flash.words_mut().fill(ERASED_WORD);
        assert_eq!(
            decide_with(false, 0, &flash).0,
            BootDecision::StayInBootloader(StayReason::Invalid(InvalidImage::NoSentinel))
        );
    }

    #[test]
    fn corrupted_image_stays() {
        let mut flash = installed(&PROGRAM);
        flash.words_mut()[3] ^= 0x100;

        match validate_image(&flash, &TEST_REGION) {
            ImageStatus::Invalid(InvalidImage::CrcMismatch { expected, .. }) => {
                assert_eq!(expected, flash.words()[6])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            decide_with(false, 0, &flash).0,
            BootDecision::StayInBootloader(StayReason::Invalid(_))
        ));
    }

    #[test]
    fn interrupted_update_stays() {
        // Erased, then only part of the program written: no trailer yet
        let mut flash = FakeFlash::new(TEST_REGION);
        let words = flash.words_mut();
        words.fill(ERASED_WORD);
        words[..2].copy_from_slice(&PROGRAM[..2]);

        assert_eq!(
            validate_image(&flash, &TEST_REGION),
            ImageStatus::Invalid(InvalidImage::NoSentinel)
        );
    }
}
