// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A Stenosaurus in RAM: the real bootloader, application responder and
//! boot decision from `steno_boot`, wired to a fake flash and backup
//! register, behind a [`Connector`] the flasher can drive.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::ErrorKind;
use std::rc::Rc;
use steno_boot::{
    decide, Application, BackupRegister, BootDecision, Bootloader, Disposition, FlashProgram,
    FlashRead, ModeFlag, PacketHandler,
};
use steno_flash::{Connector, Transport, TransportError};
use steno_proto::trailer::ERASED_WORD;
use steno_proto::{FlashRegion, Opcode, Packet, Response};

pub const REGION: FlashRegion = FlashRegion::new(0x0800_2000, 0x0800_4000, 0x400);

pub struct SimFlash {
    region: FlashRegion,
    pub words: Vec<u32>,
}

impl SimFlash {
    pub fn erased(region: FlashRegion) -> Self {
        SimFlash {
            region,
            words: vec![ERASED_WORD; region.word_count() as usize],
        }
    }

    /// Flash holding `image` from the start of the region.
    pub fn with_contents(region: FlashRegion, image: &[u8]) -> Self {
        let mut flash = Self::erased(region);
        for (w, bytes) in flash.words.iter_mut().zip(image.chunks_exact(4)) {
            *w = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        flash
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn index(&self, address: u32) -> usize {
        assert!(
            self.region.contains_word(address),
            "flash access at {address:#010x} outside the region"
        );
        ((address - self.region.base) / 4) as usize
    }
}

impl FlashRead for SimFlash {
    fn read_word(&self, address: u32) -> u32 {
        self.words[self.index(address)]
    }
}

impl FlashProgram for SimFlash {
    type Error = ();

    fn unlock(&mut self) {}

    fn erase_page(&mut self, address: u32) -> Result<(), ()> {
        let start = self.index(address);
        let end = start + self.region.page_size as usize / 4;
        self.words[start..end].fill(ERASED_WORD);
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), ()> {
        let i = self.index(address);
        self.words[i] &= word;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SimBackup(pub u16);

impl BackupRegister for SimBackup {
    fn read(&self) -> u16 {
        self.0
    }

    fn write(&mut self, value: u16) {
        self.0 = value;
    }
}

enum Firmware {
    Bootloader(Bootloader<SimFlash, SimBackup>),
    Application(Application<SimBackup>, SimFlash),
}

pub struct Device {
    firmware: Option<Firmware>,
    /// Bumped on every reset; connections opened before it are dead.
    generation: u32,
    /// Every boot decision taken, in order.
    pub boots: Vec<BootDecision>,
    /// Opcode byte of every request received, in order.
    pub requests: Vec<u8>,
}

impl Device {
    pub fn power_on(flash: SimFlash) -> Rc<RefCell<Device>> {
        let mut device = Device {
            firmware: None,
            generation: 0,
            boots: Vec::new(),
            requests: Vec::new(),
        };
        device.boot(flash, SimBackup::default());
        Rc::new(RefCell::new(device))
    }

    fn boot(&mut self, flash: SimFlash, backup: SimBackup) {
        let mut mode = ModeFlag::new(backup);
        let decision = decide(false, &mut mode, &flash, &REGION);
        self.boots.push(decision);

        let backup = mode.into_inner();
        self.firmware = Some(match decision {
            BootDecision::StartApplication(_) => {
                Firmware::Application(Application::new(backup), flash)
            }
            BootDecision::StayInBootloader(_) => {
                Firmware::Bootloader(Bootloader::new(flash, backup, REGION))
            }
        });
    }

    fn reset(&mut self) {
        let (flash, backup) = match self.firmware.take() {
            Some(Firmware::Bootloader(b)) => b.into_parts(),
            Some(Firmware::Application(a, flash)) => (flash, a.into_inner()),
            None => return,
        };
        self.generation += 1;
        self.boot(flash, backup);
    }

    fn handle(&mut self, packet: &mut Packet) {
        self.requests.push(packet[0]);

        let disposition = match &mut self.firmware {
            Some(Firmware::Bootloader(b)) => b.handle_packet(packet),
            Some(Firmware::Application(a, _)) => a.handle_packet(packet),
            None => return,
        };

        if disposition == Disposition::Reset {
            self.reset();
        }
    }

    /// Logs the request like any other but answers ERROR without letting
    /// the firmware see it.
    fn refuse(&mut self, packet: &mut Packet) {
        self.requests.push(packet[0]);
        *packet = Response::Error { opcode: packet[0] }.encode();
    }

    pub fn in_bootloader(&self) -> bool {
        matches!(self.firmware, Some(Firmware::Bootloader(_)))
    }

    pub fn flash(&self) -> &SimFlash {
        match &self.firmware {
            Some(Firmware::Bootloader(b)) => b.flash(),
            Some(Firmware::Application(_, flash)) => flash,
            None => panic!("device is off"),
        }
    }

    pub fn saw(&self, opcode: Opcode) -> bool {
        self.requests.contains(&(opcode as u8))
    }
}

pub struct SimConnector {
    pub device: Rc<RefCell<Device>>,
    pub opens: usize,
    /// Flip bits in VERIFY responses, as a marginal cable might.
    pub corrupt_verify: bool,
    /// Lose the acknowledgment of a RESET into the application; the device
    /// still resets.
    pub fail_final_reset: bool,
    /// Answer ERASE with ERROR.
    pub reject_erase: bool,
    /// Answer ERROR to the FLASH packet at this offset.
    pub reject_flash_at: Option<u32>,
}

impl SimConnector {
    pub fn new(device: Rc<RefCell<Device>>) -> Self {
        SimConnector {
            device,
            opens: 0,
            corrupt_verify: false,
            fail_final_reset: false,
            reject_erase: false,
            reject_flash_at: None,
        }
    }
}

impl Connector for SimConnector {
    type Transport = SimTransport;

    fn open(&mut self) -> Result<SimTransport, TransportError> {
        self.opens += 1;
        Ok(SimTransport {
            device: self.device.clone(),
            generation: self.device.borrow().generation,
            corrupt_verify: self.corrupt_verify,
            fail_final_reset: self.fail_final_reset,
            reject_erase: self.reject_erase,
            reject_flash_at: self.reject_flash_at,
        })
    }
}

pub struct SimTransport {
    device: Rc<RefCell<Device>>,
    generation: u32,
    corrupt_verify: bool,
    fail_final_reset: bool,
    reject_erase: bool,
    reject_flash_at: Option<u32>,
}

impl Transport for SimTransport {
    fn send_and_receive(&mut self, packet: &mut Packet) -> Result<(), TransportError> {
        let mut device = self.device.borrow_mut();
        if device.generation != self.generation {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe).into());
        }

        let opcode = packet[0];
        let offset = u32::from_le_bytes([packet[2], packet[3], packet[4], packet[5]]);

        if opcode == Opcode::Erase as u8 && self.reject_erase {
            device.refuse(packet);
            return Ok(());
        }
        if opcode == Opcode::Flash as u8 && self.reject_flash_at == Some(offset) {
            device.refuse(packet);
            return Ok(());
        }

        let final_reset = opcode == Opcode::Reset as u8 && packet[1] != 1;
        device.handle(packet);

        if final_reset && self.fail_final_reset {
            return Err(std::io::Error::from(ErrorKind::TimedOut).into());
        }
        if opcode == Opcode::Verify as u8 && self.corrupt_verify {
            packet[2] ^= 0x01;
        }
        Ok(())
    }
}
