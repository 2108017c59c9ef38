// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The slice of the protocol the running application answers.
//!
//! The application only has to tell the host that it is *not* the
//! bootloader and honor a RESET into the bootloader. Erase, program and
//! verify are refused: the application is executing out of the very flash
//! they would touch.

use crate::backup::{BackupRegister, ModeFlag};
use crate::handler::{acknowledge_reset, Disposition, PacketHandler};
use log::warn;
use steno_proto::{InfoText, Opcode, Request, Response};

/// Returned by INFO while the application is running.
pub const APPLICATION_INFO: &str = "Stenosaurus has no info yet.";

pub struct Application<B> {
    mode: ModeFlag<B>,
    info: &'static str,
}

impl<B: BackupRegister> Application<B> {
    pub fn new(backup: B) -> Self {
        Application {
            mode: ModeFlag::new(backup),
            info: APPLICATION_INFO,
        }
    }

    /// Replaces the INFO string; anything past 62 bytes is cut off.
    pub fn with_info(mut self, info: &'static str) -> Self {
        self.info = info;
        self
    }

    pub fn mode_flag(&self) -> &ModeFlag<B> {
        &self.mode
    }

    pub fn into_inner(self) -> B {
        self.mode.into_inner()
    }
}

impl<B: BackupRegister> PacketHandler for Application<B> {
    fn handle(&mut self, request: &Request) -> (Response, Disposition) {
        let response = match request {
            Request::Info => Response::Info(InfoText::new(self.info)),
            Request::EnterBootloader => Response::Mode { bootloader: false },
            Request::Reset { into_bootloader } => {
                return acknowledge_reset(&mut self.mode, *into_bootloader);
            }
            Request::Debug { .. } => Response::Ack(Opcode::Debug),
            Request::Erase | Request::Flash(_) | Request::Verify { .. } => {
                warn!("{:?} is only available in the bootloader", request.opcode());
                Response::Error {
                    opcode: request.opcode() as u8,
                }
            }
        };

        (response, Disposition::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackup;

    #[test]
    fn not_the_bootloader() {
        let mut app = Application::new(FakeBackup(0));
        let (response, _) = app.handle(&Request::EnterBootloader);
        assert_eq!(response, Response::Mode { bootloader: false });

        match app.handle(&Request::Info).0 {
            Response::Info(text) => assert_eq!(text.as_str(), Some(APPLICATION_INFO)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reset_into_bootloader() {
        let mut app = Application::new(FakeBackup(0));
        let (response, disposition) = app.handle(&Request::Reset {
            into_bootloader: true,
        });

        assert_eq!(response, Response::Ack(Opcode::Reset));
        assert_eq!(disposition, Disposition::Reset);
        assert_eq!(app.into_inner().0, 1);
    }

    #[test]
    fn refuses_flash_operations() {
        let mut app = Application::new(FakeBackup(0));
        for request in [Request::Erase, Request::Verify { word_count: 1 }] {
            let (response, disposition) = app.handle(&request);
            assert_eq!(
                response,
                Response::Error {
                    opcode: request.opcode() as u8
                }
            );
            assert_eq!(disposition, Disposition::Continue);
        }
    }
}
