// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One function per device request. Each sends a single packet and turns
//! the response into a typed result; none of them retry.

use crate::transport::{Transport, TransportError};
use crate::{FlashError, Step};
use log::debug;
use steno_proto::packet::DEBUG_PAYLOAD_SIZE;
use steno_proto::{FlashChunk, FlashRegion, InfoText, Request, Response};

fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    request: &Request,
) -> Result<Response, TransportError> {
    let mut packet = request.encode();
    transport.send_and_receive(&mut packet)?;

    let response = Response::decode(request.opcode(), &packet)?;
    debug!("{:?} -> {:?}", request.opcode(), response);
    Ok(response)
}

/// Sends `request` and fails with [`FlashError::Rejected`] unless the device
/// answered OK.
fn accepted<T: Transport + ?Sized>(
    transport: &mut T,
    request: &Request,
    step: Step,
) -> Result<Response, FlashError> {
    let response = exchange(transport, request)?;
    if !response.is_ok() {
        return Err(FlashError::Rejected { step });
    }
    Ok(response)
}

pub fn do_info<T: Transport + ?Sized>(transport: &mut T) -> Result<InfoText, FlashError> {
    match accepted(transport, &Request::Info, Step::Info)? {
        Response::Info(text) => Ok(text),
        _ => Err(FlashError::Rejected { step: Step::Info }),
    }
}

/// Returns true if the bootloader answered, false for the application.
pub fn do_mode<T: Transport + ?Sized>(transport: &mut T) -> Result<bool, FlashError> {
    let step = Step::EnterBootloader;
    match accepted(transport, &Request::EnterBootloader, step)? {
        Response::Mode { bootloader } => Ok(bootloader),
        _ => Err(FlashError::Rejected { step }),
    }
}

pub fn do_erase<T: Transport + ?Sized>(transport: &mut T) -> Result<(), FlashError> {
    accepted(transport, &Request::Erase, Step::Erase)?;
    Ok(())
}

/// Programs `chunk`. A refusal is reported with the absolute address of the
/// chunk's first word.
pub fn do_flash<T: Transport + ?Sized>(
    transport: &mut T,
    region: &FlashRegion,
    chunk: &FlashChunk,
) -> Result<(), FlashError> {
    let response = exchange(transport, &Request::Flash(*chunk))?;
    if !response.is_ok() {
        return Err(FlashError::FlashRejected {
            address: region.base.wrapping_add(chunk.offset()),
        });
    }
    Ok(())
}

/// Asks the device for the CRC of the first `word_count` words of the
/// image region.
pub fn do_verify<T: Transport + ?Sized>(
    transport: &mut T,
    word_count: u32,
) -> Result<u32, FlashError> {
    match accepted(transport, &Request::Verify { word_count }, Step::Verify)? {
        Response::Checksum(crc) => Ok(crc),
        _ => Err(FlashError::Rejected { step: Step::Verify }),
    }
}

/// The device resets right after acknowledging, so `transport` is dead once
/// this returns.
pub fn do_reset<T: Transport + ?Sized>(
    transport: &mut T,
    into_bootloader: bool,
) -> Result<(), FlashError> {
    accepted(transport, &Request::Reset { into_bootloader }, Step::Reset)?;
    Ok(())
}

/// Sends `bytes` as a DEBUG payload, zero-filled to the packet size; extra
/// bytes are dropped.
pub fn do_debug<T: Transport + ?Sized>(
    transport: &mut T,
    bytes: &[u8],
) -> Result<(), FlashError> {
    let mut payload = [0; DEBUG_PAYLOAD_SIZE];
    let n = bytes.len().min(DEBUG_PAYLOAD_SIZE);
    payload[..n].copy_from_slice(&bytes[..n]);

    accepted(transport, &Request::Debug { payload }, Step::Debug)?;
    Ok(())
}
