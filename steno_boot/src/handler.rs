// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::backup::{BackupRegister, ModeFlag};
use log::{info, warn};
use steno_proto::{Opcode, Packet, Request, Response};

/// What the transport must do once the response has been sent.
#[must_use]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Disposition {
    Continue,
    /// Reset the device, after the response is physically on the wire.
    Reset,
}

/// Something on the device that answers host requests.
pub trait PacketHandler {
    fn handle(&mut self, request: &Request) -> (Response, Disposition);

    /// Decodes `packet`, handles it and replaces the whole buffer with the
    /// encoded response.
    fn handle_packet(&mut self, packet: &mut Packet) -> Disposition {
        let (response, disposition) = match Request::decode(packet) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                warn!("rejecting packet: {:?}", e);
                (
                    Response::Error { opcode: packet[0] },
                    Disposition::Continue,
                )
            }
        };

        *packet = response.encode();
        disposition
    }
}

/// RESET handling shared by the bootloader and the application.
pub(crate) fn acknowledge_reset<B: BackupRegister>(
    mode: &mut ModeFlag<B>,
    into_bootloader: bool,
) -> (Response, Disposition) {
    info!("reset requested, into bootloader: {}", into_bootloader);
    mode.set(into_bootloader);

    (Response::Ack(Opcode::Reset), Disposition::Reset)
}
