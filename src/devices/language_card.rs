//! Language Card: 16 KB of bank-switched RAM shadowing `$D000-$FFFF`,
//! gated by the R×2 write-enable protocol at slot-0 offsets `$80-$8F`.

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::page_table::{Perms, RegionTag};
use crate::bus::Bus;
use crate::memory::{AccessContext, RamTarget};

const D000_BASE: u32 = 0xD000;
const D000_SIZE: u32 = 0x1000;
const E000_BASE: u32 = 0xE000;
const E000_SIZE: u32 = 0x2000;
const LAYER_PRIORITY: i32 = 100;

pub struct LanguageCard {
    device_id: u32,
    ram_target: Option<usize>,
    d_layer: Option<usize>,
    e_layer: Option<usize>,
    d_swap_group: Option<usize>,

    read_ram: bool,
    write_enabled: bool,
    bank2_selected: bool,
    pre_write: bool,
    last_read_offset: Option<u8>,
}

impl LanguageCard {
    pub fn new() -> Self {
        Self {
            device_id: 0,
            ram_target: None,
            d_layer: None,
            e_layer: None,
            d_swap_group: None,
            read_ram: false,
            write_enabled: false,
            bank2_selected: true,
            pre_write: false,
            last_read_offset: None,
        }
    }

    fn decode(&mut self, offset: u8) {
        let s = offset & 0x0f;
        if s % 2 == 1 {
            if self.pre_write && self.last_read_offset == Some(s) {
                self.write_enabled = true;
                self.pre_write = false;
            } else if !self.write_enabled {
                self.pre_write = true;
                self.last_read_offset = Some(s);
            } else {
                self.pre_write = false;
            }
        } else {
            self.pre_write = false;
            self.write_enabled = false;
        }
        let bit0 = s & 0x01;
        let bit1 = (s >> 1) & 0x01;
        self.read_ram = bit0 == bit1;
        self.bank2_selected = (s >> 3) & 0x01 == 0;
    }

    fn apply(&mut self, bus: &mut Bus) {
        let (d_layer, e_layer, group) = match (self.d_layer, self.e_layer, self.d_swap_group) {
            (Some(d), Some(e), Some(g)) => (d, e, g),
            _ => return, // not yet configured
        };
        if self.read_ram || self.write_enabled {
            let perms = if self.write_enabled { Perms::R.union(Perms::W) } else { Perms::R };
            let variant = if self.bank2_selected { "bank2" } else { "bank1" };
            bus.select_variant(group, variant).expect("language card bank variants are always present");
            bus.activate(d_layer);
            bus.activate(e_layer);
            bus.set_layer_permissions(d_layer, perms);
            bus.set_layer_permissions(e_layer, perms);
        } else {
            bus.deactivate(d_layer);
            bus.deactivate(e_layer);
        }
    }
}

impl Default for LanguageCard {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for LanguageCard {
    fn type_id(&self) -> &'static str {
        "languagecard"
    }

    fn name(&self) -> &str {
        "Language Card"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn initialize(&mut self) -> Result<(), crate::error::DeviceError> {
        if self.d_layer.is_none() || self.e_layer.is_none() || self.d_swap_group.is_none() {
            return Err(crate::error::DeviceError::MissingSwapGroup {
                device: self.name().to_string(),
                group: "language-card-banks".to_string(),
            });
        }
        Ok(())
    }

    fn configure_memory(&mut self, device_id: u32, bus: &mut Bus) -> Result<(), crate::error::DeviceError> {
        self.device_id = device_id;
        let target = bus.add_target(Box::new(RamTarget::new(0x4000)));
        self.ram_target = Some(target);

        let d_layer = bus.create_layer("language-card-d000", LAYER_PRIORITY, device_id);
        let e_layer = bus.create_layer("language-card-e000", LAYER_PRIORITY, device_id);
        bus.add_layer_mapping(e_layer, E000_BASE, E000_SIZE, target, 0x2000, Perms::R, RegionTag::Ram);

        let group = bus.create_swap_group("language-card-banks", device_id, D000_BASE, D000_SIZE);
        bus.add_variant(group, "bank1", target, 0x0000, Perms::R, RegionTag::Ram, None);
        bus.add_variant(group, "bank2", target, 0x1000, Perms::R, RegionTag::Ram, None);
        bus.scope_swap_group_to_layer(group, d_layer);

        self.d_layer = Some(d_layer);
        self.e_layer = Some(e_layer);
        self.d_swap_group = Some(group);
        Ok(())
    }

    fn reset(&mut self, bus: &mut Bus) {
        self.read_ram = false;
        self.write_enabled = false;
        self.bank2_selected = true;
        self.pre_write = false;
        self.last_read_offset = None;
        self.apply(bus);
    }

    fn handle_io_read(&mut self, offset: u8, ctx: AccessContext, bus: &mut Bus) -> Option<u8> {
        if !ctx.is_side_effect_free {
            self.decode(offset);
            self.apply(bus);
        }
        None
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        (0x80..=0x8f).collect()
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        vec![
            SoftSwitchState {
                name: "LC_READ_RAM".into(),
                address: 0xc080,
                active: self.read_ram,
                description: "Language Card RAM readable at $D000-$FFFF".into(),
            },
            SoftSwitchState {
                name: "LC_WRITE_ENABLED".into(),
                address: 0xc081,
                active: self.write_enabled,
                description: "Language Card RAM writable at $D000-$FFFF".into(),
            },
            SoftSwitchState {
                name: "LC_BANK2".into(),
                address: 0xc088,
                active: self.bank2_selected,
                description: "Bank 2 selected at $D000-$DFFF (else Bank 1)".into(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::page_table::RegionTag as Tag;
    use crate::devices::DeviceRegistry;
    use crate::memory::Width;

    fn rom_backed_bus() -> (Bus, DeviceRegistry, u32) {
        let mut bus = Bus::new(16).unwrap();
        let rom = bus.add_target(Box::new(crate::memory::RomTarget::new(vec![0xea; 0x4000])));
        bus.map_region("rom", 0xC000, 0x4000, 0, Tag::Rom, Perms::R, rom, 0).unwrap();
        bus.save_base_mapping_range((0xC000 / bus.page_size()) as usize, (0x4000 / bus.page_size()) as usize);

        let mut registry = DeviceRegistry::new();
        let id = registry.register(Box::new(LanguageCard::new()));
        registry.get_mut(id).unwrap().configure_memory(id, &mut bus).unwrap();
        registry.get_mut(id).unwrap().reset(&mut bus);
        (bus, registry, id)
    }

    fn read_switch(bus: &mut Bus, registry: &mut DeviceRegistry, id: u32, offset: u8, side_effect_free: bool) {
        let mut ctx = AccessContext::read(Width::Byte);
        ctx.is_side_effect_free = side_effect_free;
        registry.get_mut(id).unwrap().handle_io_read(offset, ctx, bus);
    }

    #[test]
    fn rx2_protocol_requires_two_reads_to_enable_writes() {
        let (mut bus, mut registry, id) = rom_backed_bus();

        read_switch(&mut bus, &mut registry, id, 0x83, false);
        bus.write(0xD000, Width::Byte, 0xaa, AccessContext::write(Width::Byte));
        assert_ne!(bus.read(0xD000, Width::Byte, AccessContext::read(Width::Byte)), 0xaa);

        read_switch(&mut bus, &mut registry, id, 0x83, false);
        bus.write(0xD000, Width::Byte, 0xaa, AccessContext::write(Width::Byte));
        assert_eq!(bus.read(0xD000, Width::Byte, AccessContext::read(Width::Byte)), 0xaa);
    }

    #[test]
    fn bank_switch_preserves_each_banks_contents() {
        let (mut bus, mut registry, id) = rom_backed_bus();
        read_switch(&mut bus, &mut registry, id, 0x83, false);
        read_switch(&mut bus, &mut registry, id, 0x83, false);
        bus.write(0xD000, Width::Byte, 0x11, AccessContext::write(Width::Byte));

        read_switch(&mut bus, &mut registry, id, 0x8b, false);
        read_switch(&mut bus, &mut registry, id, 0x8b, false);
        bus.write(0xD000, Width::Byte, 0x22, AccessContext::write(Width::Byte));

        read_switch(&mut bus, &mut registry, id, 0x83, false);
        assert_eq!(bus.read(0xD000, Width::Byte, AccessContext::read(Width::Byte)), 0x11);

        read_switch(&mut bus, &mut registry, id, 0x8b, false);
        assert_eq!(bus.read(0xD000, Width::Byte, AccessContext::read(Width::Byte)), 0x22);
    }

    #[test]
    fn layer_deactivated_at_reset_shows_base_rom() {
        let (mut bus, _registry, _id) = rom_backed_bus();
        assert_eq!(bus.read(0xFFFC, Width::Byte, AccessContext::read(Width::Byte)), 0xea);
    }

    #[test]
    fn initialize_before_configure_memory_reports_missing_swap_group() {
        let mut card = LanguageCard::new();
        let err = card.initialize().unwrap_err();
        assert!(matches!(err, crate::error::DeviceError::MissingSwapGroup { .. }));
    }

    #[test]
    fn side_effect_free_read_does_not_mutate_write_enabled() {
        let (mut bus, mut registry, id) = rom_backed_bus();
        read_switch(&mut bus, &mut registry, id, 0x83, false);
        read_switch(&mut bus, &mut registry, id, 0x83, false);
        let before = registry.get(id).unwrap().soft_switches();
        read_switch(&mut bus, &mut registry, id, 0x83, true);
        let after = registry.get(id).unwrap().soft_switches();
        assert_eq!(before[1].active, after[1].active);
        assert!(after[1].active);
    }
}
