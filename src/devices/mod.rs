//! The `Device` trait, the registry that owns device instances, and the
//! soft-switch snapshot types used by the debug console.

pub mod auxmem;
pub mod character;
pub mod gameio;
pub mod keyboard;
pub mod language_card;
pub mod slots;
pub mod speaker;

use crate::bus::Bus;
use crate::error::{ConfigurationError, DeviceError};
use crate::memory::AccessContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Motherboard,
    SlotCard,
}

/// One soft switch's current state, for `switches`/`pages` debug introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftSwitchState {
    pub name: String,
    pub address: u16,
    pub active: bool,
    pub description: String,
}

/// A motherboard or slot-card peripheral. Lifecycle hooks are called in the
/// order `configure_memory` (build time) → `initialize` (after the base
/// mapping is saved) → `reset` (power-on and every debug `reset`) → `tick`
/// (scheduler/CPU-driven). A device never stores its own reference to the
/// bus; every mutation of the page table happens inside these hooks, where
/// the caller lends `&mut Bus` for the duration of the call.
pub trait Device {
    fn type_id(&self) -> &'static str;
    fn name(&self) -> &str;
    fn kind(&self) -> DeviceKind;

    fn configure_memory(&mut self, _device_id: u32, _bus: &mut Bus) -> Result<(), DeviceError> {
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn reset(&mut self, _bus: &mut Bus) {}

    fn tick(&mut self, _cycles: u64, _bus: &mut Bus) {}

    /// Called by the I/O page dispatcher for a read at this device's slot
    /// offset. Returning `None` lets the dispatcher supply the bus-default
    /// floating value; a device that produces no meaningful data (most
    /// soft switches) should return `None` after applying its side effect.
    fn handle_io_read(&mut self, _offset: u8, _ctx: AccessContext, _bus: &mut Bus) -> Option<u8> {
        None
    }

    fn handle_io_write(&mut self, _offset: u8, _value: u8, _ctx: AccessContext, _bus: &mut Bus) {}

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        Vec::new()
    }

    /// The `$C0xx` low-byte addresses this device wants routed to it by the
    /// I/O page dispatcher (e.g. `0x83` for `$C083`). Devices with no
    /// addressable soft switches (character ROM, slot cards without I/O)
    /// leave this empty.
    fn soft_switch_addresses(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// A registry entry is either a plain motherboard device or a slot card.
/// Slot cards are still reachable as `&dyn Device` (trait upcasting, since
/// `SlotCard: Device`), so every registry operation that only needs the
/// `Device` view works uniformly across both kinds.
enum Entry {
    Device(Box<dyn Device>),
    Card(Box<dyn slots::SlotCard>),
}

impl Entry {
    fn as_device(&self) -> &dyn Device {
        match self {
            Entry::Device(d) => d.as_ref(),
            Entry::Card(c) => c.as_ref(),
        }
    }

    fn as_device_mut(&mut self) -> &mut dyn Device {
        match self {
            Entry::Device(d) => d.as_mut(),
            Entry::Card(c) => c.as_mut(),
        }
    }
}

/// Allocates small integer device ids and owns every device instance.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Entry>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device, returning the id it will be known by on the bus
    /// (page table entries, layers, and swap groups all tag their owner
    /// with this id).
    pub fn register(&mut self, device: Box<dyn Device>) -> u32 {
        self.devices.push(Entry::Device(device));
        (self.devices.len() - 1) as u32
    }

    pub fn register_slot_card(&mut self, card: Box<dyn slots::SlotCard>) -> u32 {
        self.devices.push(Entry::Card(card));
        (self.devices.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Option<&dyn Device> {
        self.devices.get(id as usize).map(|e| e.as_device())
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut (dyn Device + '_)> {
        self.devices.get_mut(id as usize).map(|e| e.as_device_mut())
    }

    pub fn get_slot_card(&self, id: u32) -> Option<&dyn slots::SlotCard> {
        match self.devices.get(id as usize) {
            Some(Entry::Card(c)) => Some(c.as_ref()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|e| e.as_device())
    }

    pub fn reset_all(&mut self, bus: &mut Bus) {
        for device in self.devices.iter_mut() {
            device.as_device_mut().reset(bus);
        }
    }

    pub fn tick_all(&mut self, cycles: u64, bus: &mut Bus) {
        for device in self.devices.iter_mut() {
            device.as_device_mut().tick(cycles, bus);
        }
    }

    pub fn all_soft_switches(&self) -> Vec<SoftSwitchState> {
        self.devices.iter().flat_map(|e| e.as_device().soft_switches()).collect()
    }
}

/// Known device type ids, registered by [`register_default_devices`].
pub fn known_device_types() -> &'static [&'static str] {
    &["languagecard", "auxmem", "character", "keyboard", "speaker", "gameio"]
}

/// Instantiates a motherboard device by its profile type id. Slot cards are
/// resolved separately by [`slots::SlotManager`], since their construction
/// also needs a slot number.
pub fn make_motherboard_device(type_id: &str) -> Result<Box<dyn Device>, ConfigurationError> {
    match type_id {
        "languagecard" => Ok(Box::new(language_card::LanguageCard::new())),
        "auxmem" => Ok(Box::new(auxmem::AuxiliaryMemory::new())),
        "character" => Ok(Box::new(character::CharacterDevice::new())),
        "keyboard" => Ok(Box::new(keyboard::Keyboard::new())),
        "speaker" => Ok(Box::new(speaker::Speaker::new())),
        "gameio" => Ok(Box::new(gameio::GameIo::new())),
        other => Err(ConfigurationError::UnknownDeviceType(other.to_string())),
    }
}
