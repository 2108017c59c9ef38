// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Glue between the USB endpoint and a [`PacketHandler`].
//!
//! A RESET is two-phase: the acknowledgment goes out first, then the
//! device waits long enough for the host to collect it, then resets. The
//! host therefore always sees the RESET confirmed before the device drops
//! off the bus.

use crate::handler::{Disposition, PacketHandler};
use steno_proto::{Packet, PACKET_SIZE};

/// Busy-wait cycles between queueing a RESET acknowledgment and resetting;
/// about 45 ms at 72 MHz.
pub const DRAIN_CYCLES: u32 = 3_200_000;

/// The device end of the 64-byte packet endpoint pair.
pub trait PacketPort {
    /// Reads the pending packet, if any, into `packet`.
    fn receive(&mut self, packet: &mut Packet) -> bool;

    /// Queues a full 64-byte packet for the host. The host side only picks
    /// up complete reports, so this is never called with less.
    fn send(&mut self, packet: &Packet);
}

pub trait ResetControl {
    /// Waits for queued responses to leave the device.
    fn drain(&mut self);

    fn reset(&mut self) -> !;
}

/// Handles one packet from `port`; meant to be called from the endpoint's
/// receive callback.
pub fn service_packet<H, P, R>(handler: &mut H, port: &mut P, reset: &mut R)
where
    H: PacketHandler,
    P: PacketPort,
    R: ResetControl,
{
    let mut packet = [0; PACKET_SIZE];
    if !port.receive(&mut packet) {
        return;
    }

    let disposition = handler.handle_packet(&mut packet);
    port.send(&packet);

    if disposition == Disposition::Reset {
        reset.drain();
        reset.reset();
    }
}

#[cfg(feature = "cortex-m")]
pub use self::cortex::CortexReset;

#[cfg(feature = "cortex-m")]
mod cortex {
    use super::{ResetControl, DRAIN_CYCLES};

    pub struct CortexReset {
        pub drain_cycles: u32,
    }

    impl Default for CortexReset {
        fn default() -> Self {
            CortexReset {
                drain_cycles: DRAIN_CYCLES,
            }
        }
    }

    impl ResetControl for CortexReset {
        fn drain(&mut self) {
            cortex_m::asm::delay(self.drain_cycles);
        }

        fn reset(&mut self) -> ! {
            cortex_m::peripheral::SCB::sys_reset()
        }
    }
}
