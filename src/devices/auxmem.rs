//! Auxiliary Memory Controller: steers `$0000-$BFFF` between main and
//! auxiliary 64 KB banks via `80STORE`/`RAMRD`/`RAMWRT`/`ALTZP`/`PAGE2`/
//! `HIRES`.
//!
//! Known simplification: real hardware allows `RAMRD` and `RAMWRT` to
//! select *different* banks for the same page (reads from main, writes to
//! aux, or vice versa). This core's page table holds one target per page,
//! so both directions share a single selection; when the two switches
//! disagree we follow `RAMWRT`. `80STORE`/`PAGE2`/`HIRES` video-page
//! special-casing is likewise not split out, since bit-exact video page
//! selection is outside this core's scope — the switches are tracked and
//! exposed for introspection but `PAGE2`/`HIRES` do not yet steer memory.

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::page_table::{Perms, RegionTag};
use crate::bus::Bus;
use crate::memory::{AccessContext, RamTarget};

const ZP_STACK_TOP: u32 = 0x0200;
const AUX_TOP: u32 = 0xc000;

pub struct AuxiliaryMemory {
    device_id: u32,
    zp_group: Option<usize>,
    main_group: Option<usize>,

    store80: bool,
    ramrd: bool,
    ramwrt: bool,
    altzp: bool,
    page2: bool,
    hires: bool,
}

impl AuxiliaryMemory {
    pub fn new() -> Self {
        Self {
            device_id: 0,
            zp_group: None,
            main_group: None,
            store80: false,
            ramrd: false,
            ramwrt: false,
            altzp: false,
            page2: false,
            hires: false,
        }
    }

    fn apply(&self, bus: &mut Bus) {
        let Some(zp_group) = self.zp_group else { return };
        let Some(main_group) = self.main_group else { return };
        let zp_variant = if self.altzp { "aux" } else { "main" };
        let main_variant = if self.ramwrt || self.ramrd { "aux" } else { "main" };
        bus.select_variant(zp_group, zp_variant).expect("aux memory zero-page variants are always present");
        bus.select_variant(main_group, main_variant).expect("aux memory main-bank variants are always present");
    }

    fn decode(&mut self, low_byte: u8) {
        match low_byte {
            0x00 => self.store80 = false,
            0x01 => self.store80 = true,
            0x02 => self.ramrd = false,
            0x03 => self.ramrd = true,
            0x04 => self.ramwrt = false,
            0x05 => self.ramwrt = true,
            0x08 => self.altzp = false,
            0x09 => self.altzp = true,
            0x54 => self.page2 = false,
            0x55 => self.page2 = true,
            0x56 => self.hires = false,
            0x57 => self.hires = true,
            _ => {}
        }
    }
}

impl Default for AuxiliaryMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for AuxiliaryMemory {
    fn type_id(&self) -> &'static str {
        "auxmem"
    }

    fn name(&self) -> &str {
        "Auxiliary Memory Controller"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn configure_memory(&mut self, device_id: u32, bus: &mut Bus) -> Result<(), crate::error::DeviceError> {
        self.device_id = device_id;
        let page_size = bus.page_size();
        let pages_needed = ZP_STACK_TOP.div_ceil(page_size).max(1);
        let zp_size = (pages_needed * page_size).min(AUX_TOP);
        let main_size = AUX_TOP - zp_size;

        let zp_main = bus.add_target(Box::new(RamTarget::new(zp_size as usize)));
        let zp_aux = bus.add_target(Box::new(RamTarget::new(zp_size as usize)));
        let main_main = bus.add_target(Box::new(RamTarget::new(main_size as usize)));
        let main_aux = bus.add_target(Box::new(RamTarget::new(main_size as usize)));

        let zp_group = bus.create_swap_group("auxmem-zp", device_id, 0, zp_size);
        bus.add_variant(zp_group, "main", zp_main, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);
        bus.add_variant(zp_group, "aux", zp_aux, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);

        let main_group = bus.create_swap_group("auxmem-main", device_id, zp_size, main_size);
        bus.add_variant(main_group, "main", main_main, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);
        bus.add_variant(main_group, "aux", main_aux, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);

        self.zp_group = Some(zp_group);
        self.main_group = Some(main_group);
        Ok(())
    }

    fn reset(&mut self, bus: &mut Bus) {
        self.store80 = false;
        self.ramrd = false;
        self.ramwrt = false;
        self.altzp = false;
        self.page2 = false;
        self.hires = false;
        self.apply(bus);
    }

    fn handle_io_read(&mut self, offset: u8, ctx: AccessContext, bus: &mut Bus) -> Option<u8> {
        if !ctx.is_side_effect_free {
            self.decode(offset);
            self.apply(bus);
        }
        None
    }

    fn handle_io_write(&mut self, offset: u8, _value: u8, ctx: AccessContext, bus: &mut Bus) {
        if !ctx.is_side_effect_free {
            self.decode(offset);
            self.apply(bus);
        }
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x08, 0x09, 0x54, 0x55, 0x56, 0x57]
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        vec![
            SoftSwitchState { name: "80STORE".into(), address: 0xc000, active: self.store80, description: "Page-2 aware aux video addressing".into() },
            SoftSwitchState { name: "RAMRD".into(), address: 0xc002, active: self.ramrd, description: "Reads from $0200-$BFFF come from aux bank".into() },
            SoftSwitchState { name: "RAMWRT".into(), address: 0xc004, active: self.ramwrt, description: "Writes to $0200-$BFFF go to aux bank".into() },
            SoftSwitchState { name: "ALTZP".into(), address: 0xc008, active: self.altzp, description: "Zero page and stack use aux bank".into() },
            SoftSwitchState { name: "PAGE2".into(), address: 0xc054, active: self.page2, description: "Video page 2 selected".into() },
            SoftSwitchState { name: "HIRES".into(), address: 0xc056, active: self.hires, description: "Hi-res graphics mode selected".into() },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Width;

    fn wired() -> (Bus, AuxiliaryMemory) {
        let mut bus = Bus::new(16).unwrap();
        let mut dev = AuxiliaryMemory::new();
        dev.configure_memory(0, &mut bus).unwrap();
        dev.reset(&mut bus);
        (bus, dev)
    }

    #[test]
    fn main_and_aux_banks_hold_independent_data() {
        let (mut bus, mut dev) = wired();
        bus.write(0x1000, Width::Byte, 0x11, AccessContext::write(Width::Byte));

        dev.handle_io_write(0x03, 0, AccessContext::write(Width::Byte), &mut bus); // RAMRD on
        dev.handle_io_write(0x05, 0, AccessContext::write(Width::Byte), &mut bus); // RAMWRT on
        bus.write(0x1000, Width::Byte, 0x22, AccessContext::write(Width::Byte));

        dev.handle_io_write(0x02, 0, AccessContext::write(Width::Byte), &mut bus); // RAMRD off
        dev.handle_io_write(0x04, 0, AccessContext::write(Width::Byte), &mut bus); // RAMWRT off
        assert_eq!(bus.read(0x1000, Width::Byte, AccessContext::read(Width::Byte)), 0x11);
    }

    #[test]
    fn altzp_swaps_zero_page_independently_of_main_bank() {
        let (mut bus, mut dev) = wired();
        bus.write(0x0080, Width::Byte, 0xaa, AccessContext::write(Width::Byte));
        dev.handle_io_write(0x09, 0, AccessContext::write(Width::Byte), &mut bus); // ALTZP on
        assert_ne!(bus.read(0x0080, Width::Byte, AccessContext::read(Width::Byte)), 0xaa);
        dev.handle_io_write(0x08, 0, AccessContext::write(Width::Byte), &mut bus); // ALTZP off
        assert_eq!(bus.read(0x0080, Width::Byte, AccessContext::read(Width::Byte)), 0xaa);
    }
}
