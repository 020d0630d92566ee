//! Slot Manager: slot ROM at `$Cn00-$CnFF`, a shared 2 KB expansion-ROM
//! window at `$C800-$CFFF` selected by whichever slot last touched its own
//! ROM page, and I/O handlers at `$C0n0-$C0nF` (registered through the
//! ordinary [`Device`] soft-switch mechanism, nibble `8 + slot`).
//!
//! `$C100-$CFFF` sits inside what would otherwise be a single 4 KB page
//! under the bus's default page size, finer than `map_region` can address;
//! this is exactly the "composite target" case the bus targets design
//! anticipates, so slot ROM fan-out is done here at the byte level rather
//! than through the page table.

use super::{Device, DeviceKind};
use crate::error::ConfigurationError;

pub const SLOT_ROM_BASE: u32 = 0xc100;
pub const SLOT_ROM_SIZE: u32 = 0x0700;
pub const EXPANSION_ROM_BASE: u32 = 0xc800;
pub const EXPANSION_ROM_SIZE: u32 = 0x0800;

/// A slot card is a [`Device`] that additionally exposes slot ROM and an
/// optional page of the shared `$C800-$CFFF` expansion window.
pub trait SlotCard: Device {
    fn rom(&self) -> &[u8] {
        &[]
    }

    fn expansion_rom(&self) -> Option<&[u8]> {
        None
    }
}

/// A minimal slot card carrying a fixed boot ROM image and no device logic
/// of its own — stands in for peripherals (disk controllers, etc.) whose
/// mechanics are out of scope here but whose boot-ROM presence on the slot
/// bus still needs to be modeled.
pub struct StubCard {
    type_id: &'static str,
    name: String,
    rom: Vec<u8>,
}

impl StubCard {
    pub fn new(type_id: &'static str, name: impl Into<String>, rom: Vec<u8>) -> Self {
        let mut bytes = vec![0u8; 0x100];
        let len = rom.len().min(bytes.len());
        bytes[..len].copy_from_slice(&rom[..len]);
        Self { type_id, name: name.into(), rom: bytes }
    }
}

impl Device for StubCard {
    fn type_id(&self) -> &'static str {
        self.type_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::SlotCard
    }
}

impl SlotCard for StubCard {
    fn rom(&self) -> &[u8] {
        &self.rom
    }
}

pub fn make_slot_card(type_id: &str) -> Result<Box<dyn SlotCard>, ConfigurationError> {
    match type_id {
        "diskii" => Ok(Box::new(StubCard::new("diskii", "Disk II Controller", vec![0; 0x100]))),
        other => Err(ConfigurationError::UnknownDeviceType(other.to_string())),
    }
}

struct InstalledCard {
    device_id: u32,
    slot: u8,
}

#[derive(Default)]
pub struct SlotManager {
    cards: Vec<InstalledCard>,
    selected_expansion_slot: Option<u8>,
}

impl SlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, slot: u8, device_id: u32) -> Result<(), ConfigurationError> {
        if !(1..=7).contains(&slot) {
            return Err(ConfigurationError::InvalidSlot(slot as usize));
        }
        if self.cards.iter().any(|c| c.slot == slot) {
            return Err(ConfigurationError::DuplicateName(format!("slot {slot}")));
        }
        self.cards.push(InstalledCard { device_id, slot });
        Ok(())
    }

    pub fn device_id_for_slot(&self, slot: u8) -> Option<u32> {
        self.cards.iter().find(|c| c.slot == slot).map(|c| c.device_id)
    }

    pub fn read_rom(&mut self, addr: u32, cards: &super::DeviceRegistry) -> u8 {
        if (SLOT_ROM_BASE..SLOT_ROM_BASE + SLOT_ROM_SIZE).contains(&addr) {
            let slot = ((addr - SLOT_ROM_BASE) / 0x100) as u8 + 1;
            self.selected_expansion_slot = Some(slot);
            let offset = (addr & 0xff) as usize;
            return self
                .device_id_for_slot(slot)
                .and_then(|id| cards.get_slot_card(id))
                .map(|c| c.rom().get(offset).copied().unwrap_or(0xff))
                .unwrap_or(0xff);
        }
        if (EXPANSION_ROM_BASE..EXPANSION_ROM_BASE + EXPANSION_ROM_SIZE).contains(&addr) {
            if addr == EXPANSION_ROM_BASE + EXPANSION_ROM_SIZE - 1 {
                self.selected_expansion_slot = None;
            }
            let offset = (addr - EXPANSION_ROM_BASE) as usize;
            return self
                .selected_expansion_slot
                .and_then(|slot| self.device_id_for_slot(slot))
                .and_then(|id| cards.get_slot_card(id))
                .and_then(|c| c.expansion_rom())
                .and_then(|rom| rom.get(offset).copied())
                .unwrap_or(0xff);
        }
        0xff
    }
}
