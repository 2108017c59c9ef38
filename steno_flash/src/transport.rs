// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Getting 64-byte packets to the device and back.
//!
//! The device shows up as a USB CDC serial port, so the stock transport is a
//! [`serialport`] port. Anything that can exchange whole packets works; the
//! tests swap in a simulated device.

use log::{debug, trace};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use steno_proto::{DecodeError, Packet, PACKET_SIZE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Nothing came back within the configured timeout.
    #[error("timed out waiting for a response")]
    Timeout,

    /// Only part of a packet came back before the timeout.
    #[error("short read: got {got} of {} bytes", PACKET_SIZE)]
    ShortRead { got: usize },

    /// A full packet came back but it is not a valid response.
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),
}

/// An open connection to a device.
pub trait Transport {
    /// Sends `packet` and overwrites it with the device's response.
    fn send_and_receive(&mut self, packet: &mut Packet) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_and_receive(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        (**self).send_and_receive(packet)
    }
}

/// Opens connections to a device. The device drops off the bus whenever it
/// resets, so a session may need several.
pub trait Connector {
    type Transport: Transport;

    fn open(&mut self) -> Result<Self::Transport, TransportError>;
}

pub const DEFAULT_BAUD: u32 = 115_200;

/// Timeout used while draining stale input from a freshly opened port.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct SerialConnector {
    path: String,
    baud: u32,
    timeout: Duration,
}

impl SerialConnector {
    pub fn new(path: impl Into<String>, baud: u32, timeout: Duration) -> Self {
        SerialConnector {
            path: path.into(),
            baud,
            timeout,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Connector for SerialConnector {
    type Transport = SerialTransport;

    fn open(&mut self) -> Result<SerialTransport, TransportError> {
        debug!("opening {} at {} baud", self.path, self.baud);

        // Start with a short timeout so leftover input can be drained, then
        // raise it for real traffic.
        let mut port = serialport::new(&self.path, self.baud)
            .timeout(DRAIN_TIMEOUT)
            .data_bits(DataBits::Eight)
            .flow_control(FlowControl::None)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open()?;

        loop {
            let mut throwaway = [0; PACKET_SIZE];
            match port.read(&mut throwaway) {
                // Only expected from nonblocking reads, but either way the
                // buffer is empty.
                Ok(0) => break,
                Ok(n) => trace!("discarding {} stale bytes", n),
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        port.set_timeout(self.timeout)?;

        Ok(SerialTransport { port })
    }
}

pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Reads exactly one packet, telling a silent device apart from one
    /// that stopped mid-packet.
    fn read_packet(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        let mut got = 0;
        while got < PACKET_SIZE {
            match self.port.read(&mut packet[got..]) {
                Ok(0) => return Err(TransportError::ShortRead { got }),
                Ok(n) => got += n,
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    return Err(if got == 0 {
                        TransportError::Timeout
                    } else {
                        TransportError::ShortRead { got }
                    });
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn send_and_receive(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        trace!("-> {}", hex::encode(&packet[..]));
        self.port.write_all(&packet[..])?;
        self.port.flush()?;

        self.read_packet(packet)?;
        trace!("<- {}", hex::encode(&packet[..]));
        Ok(())
    }
}
