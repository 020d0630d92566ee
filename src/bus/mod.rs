//! The main address bus: a flat page table over a configurable address
//! space, plus the layered-mapping and swap-group machinery that mutates it
//! at runtime.
//!
//! Reads and writes always resolve in two steps: look up the page's current
//! entry, then delegate to whichever target backs it. Everything else in
//! this module exists to keep that lookup cheap while letting layers and
//! swap groups rewrite what a page resolves to.

pub mod layer;
pub mod page_table;
pub mod swap;

use crate::error::{BusFault, ConfigurationError, FaultRecord};
use crate::memory::{AccessContext, BusTarget, Caps, Width};
use layer::{pick_top, CoverEntry, LayerRange, LayerRecord};
use page_table::{PageTableEntry, Perms, RegionTag};
use std::collections::VecDeque;
use swap::{SwapGroupRecord, Variant};

pub const DEFAULT_PAGE_SIZE: u32 = 4096;
const FAULT_LOG_CAPACITY: usize = 256;

pub struct Bus {
    page_size: u32,
    page_bits: u32,
    page_mask: u32,
    address_bits: u32,
    page_count: usize,
    pages: Vec<PageTableEntry>,
    base_pages: Vec<PageTableEntry>,
    region_names: Vec<Option<String>>,
    covering: Vec<Vec<CoverEntry>>,
    targets: Vec<Box<dyn BusTarget>>,
    layers: Vec<LayerRecord>,
    swap_groups: Vec<SwapGroupRecord>,
    faults: VecDeque<FaultRecord>,
    fault_counts: Vec<u32>,
    next_seq: u64,
    cycle: u64,
}

impl Bus {
    pub fn new(address_bits: u32) -> Result<Self, ConfigurationError> {
        Self::with_page_size(address_bits, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(address_bits: u32, page_size: u32) -> Result<Self, ConfigurationError> {
        if !(1..=32).contains(&address_bits) {
            return Err(ConfigurationError::InvalidAddressSpace(address_bits));
        }
        if !page_size.is_power_of_two() {
            return Err(ConfigurationError::Misaligned {
                name: "<page size>".into(),
                start: 0,
                size: page_size,
                page_size,
            });
        }
        let address_space = 1u64 << address_bits;
        let page_count = (address_space / page_size as u64) as usize;
        Ok(Self {
            page_size,
            page_bits: page_size.trailing_zeros(),
            page_mask: page_size - 1,
            address_bits,
            page_count,
            pages: vec![PageTableEntry::UNMAPPED; page_count],
            base_pages: vec![PageTableEntry::UNMAPPED; page_count],
            region_names: vec![None; page_count],
            covering: (0..page_count).map(|_| Vec::new()).collect(),
            targets: Vec::new(),
            layers: Vec::new(),
            swap_groups: Vec::new(),
            faults: VecDeque::with_capacity(FAULT_LOG_CAPACITY),
            fault_counts: vec![0; page_count],
            next_seq: 0,
            cycle: 0,
        })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    pub fn set_cycle(&mut self, cycle: u64) {
        self.cycle = cycle;
    }

    /// Registers a target and returns the id used to refer to it from
    /// `map_region`/layers/swap-group variants.
    pub fn add_target(&mut self, target: Box<dyn BusTarget>) -> usize {
        self.targets.push(target);
        self.targets.len() - 1
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn page_of(&self, addr: u32) -> usize {
        (addr >> self.page_bits) as usize
    }

    fn check_alignment(&self, name: &str, virtual_base: u32, size: u32) -> Result<(), ConfigurationError> {
        if virtual_base % self.page_size != 0 || size % self.page_size != 0 || size == 0 {
            return Err(ConfigurationError::Misaligned {
                name: name.to_string(),
                start: virtual_base,
                size,
                page_size: self.page_size,
            });
        }
        Ok(())
    }

    // ---- base (layer-0) mappings ----------------------------------------

    /// Maps `[virtual_base, virtual_base + size)` directly into the base
    /// (layer 0) page table. Rejects misaligned ranges and overlaps with an
    /// existing layer-0 mapping.
    pub fn map_region(
        &mut self,
        name: &str,
        virtual_base: u32,
        size: u32,
        device_id: u32,
        tag: RegionTag,
        perms: Perms,
        target_id: usize,
        phys_base: u32,
    ) -> Result<(), ConfigurationError> {
        self.check_alignment(name, virtual_base, size)?;
        let start_page = self.page_of(virtual_base);
        let count = (size / self.page_size) as usize;
        for page in start_page..start_page + count {
            if self.pages[page].tag != RegionTag::Unmapped {
                let existing = self.region_names[page].clone().unwrap_or_else(|| "<unnamed>".into());
                return Err(ConfigurationError::OverlappingMapping { new: name.to_string(), existing });
            }
        }
        for (i, page) in (start_page..start_page + count).enumerate() {
            let entry = PageTableEntry {
                target_id: Some(target_id),
                device_id,
                tag,
                perms,
                phys_base: phys_base + (i as u32) * self.page_size,
                layer_id: 0,
            };
            self.pages[page] = entry;
            self.region_names[page] = Some(name.to_string());
        }
        Ok(())
    }

    /// Snapshots the current (layer-0) page table entries for later restore
    /// on layer deactivation.
    pub fn save_base_mapping_range(&mut self, first_page: usize, count: usize) {
        for page in first_page..first_page + count {
            self.base_pages[page] = self.pages[page];
        }
    }

    // ---- read/write --------------------------------------------------

    pub fn read(&mut self, addr: u32, width: Width, ctx: AccessContext) -> u32 {
        let page = self.page_of(addr);
        if page >= self.page_count {
            self.record_fault(BusFault::Unmapped { address: addr });
            return default_for(width);
        }
        let entry = self.pages[page];
        if entry.tag == RegionTag::Unmapped {
            self.record_fault(BusFault::Unmapped { address: addr });
            return default_for(width);
        }
        let offset = (addr & self.page_mask) as usize;
        let Some(target_id) = entry.target_id else {
            self.record_fault(BusFault::Unmapped { address: addr });
            return default_for(width);
        };
        if width != Width::Byte && self.targets[target_id].caps().contains(Caps::BYTE_ONLY) {
            self.record_fault(BusFault::UnsupportedWidth { address: addr, width });
            return default_for(width);
        }
        let phys = entry.phys_base as usize + offset;
        self.targets[target_id].read(phys, width, ctx)
    }

    pub fn write(&mut self, addr: u32, width: Width, value: u32, ctx: AccessContext) {
        let page = self.page_of(addr);
        if page >= self.page_count {
            self.record_fault(BusFault::Unmapped { address: addr });
            return;
        }
        let entry = self.pages[page];
        if entry.tag == RegionTag::Unmapped {
            self.record_fault(BusFault::Unmapped { address: addr });
            return;
        }
        if !entry.perms.contains(Perms::W) {
            self.record_fault(BusFault::WriteProtected { address: addr });
            return;
        }
        let offset = (addr & self.page_mask) as usize;
        let Some(target_id) = entry.target_id else {
            self.record_fault(BusFault::Unmapped { address: addr });
            return;
        };
        if width != Width::Byte && self.targets[target_id].caps().contains(Caps::BYTE_ONLY) {
            self.record_fault(BusFault::UnsupportedWidth { address: addr, width });
            return;
        }
        let phys = entry.phys_base as usize + offset;
        self.targets[target_id].write(phys, width, value, ctx);
    }

    fn record_fault(&mut self, fault: BusFault) {
        let address = match fault {
            BusFault::Unmapped { address } | BusFault::WriteProtected { address } | BusFault::UnsupportedWidth { address, .. } => address,
        };
        let page = self.page_of(address);
        if page < self.fault_counts.len() {
            self.fault_counts[page] += 1;
        }
        if self.faults.len() == FAULT_LOG_CAPACITY {
            self.faults.pop_front();
        }
        self.faults.push_back(FaultRecord { fault, cycle: self.cycle });
    }

    pub fn faults(&self) -> impl Iterator<Item = &FaultRecord> {
        self.faults.iter()
    }

    pub fn fault_count(&self, page: usize) -> u32 {
        self.fault_counts.get(page).copied().unwrap_or(0)
    }

    pub fn page_entry(&self, page: usize) -> PageTableEntry {
        self.pages[page]
    }

    pub fn region_name(&self, page: usize) -> Option<&str> {
        self.region_names[page].as_deref()
    }

    // ---- layered mappings ----------------------------------------------

    pub fn create_layer(&mut self, name: &str, priority: i32, device_id: u32) -> usize {
        self.layers.push(LayerRecord {
            name: name.to_string(),
            priority,
            active: false,
            device_id,
            ranges: Vec::new(),
        });
        self.layers.len() - 1
    }

    pub fn add_layer_mapping(
        &mut self,
        layer_id: usize,
        virtual_base: u32,
        size: u32,
        target_id: usize,
        phys_base: u32,
        perms: Perms,
        tag: RegionTag,
    ) {
        self.layers[layer_id].ranges.push(LayerRange { virtual_base, size, target_id, phys_base, perms, tag });
    }

    pub fn layer_is_active(&self, layer_id: usize) -> bool {
        self.layers[layer_id].active
    }

    pub fn layer_priority(&self, layer_id: usize) -> i32 {
        self.layers[layer_id].priority
    }

    pub fn layer_name(&self, layer_id: usize) -> &str {
        &self.layers[layer_id].name
    }

    fn pages_for_range(&self, virtual_base: u32, size: u32) -> std::ops::Range<usize> {
        let start = self.page_of(virtual_base);
        let count = (size / self.page_size) as usize;
        start..start + count
    }

    pub fn activate(&mut self, layer_id: usize) {
        if self.layers[layer_id].active {
            return; // idempotent
        }
        self.layers[layer_id].active = true;
        let priority = self.layers[layer_id].priority;
        let device_id = self.layers[layer_id].device_id;
        let ranges = self.layers[layer_id].ranges.clone();
        for range in &ranges {
            for (i, page) in self.pages_for_range(range.virtual_base, range.size).enumerate() {
                let entry = PageTableEntry {
                    target_id: Some(range.target_id),
                    device_id,
                    tag: range.tag,
                    perms: range.perms,
                    phys_base: range.phys_base + (i as u32) * self.page_size,
                    layer_id: layer_id as u32 + 1,
                };
                let seq = self.next_seq();
                self.covering[page].push(CoverEntry { layer_id, priority, seq, entry });
                self.recompute_page(page);
            }
        }
    }

    pub fn deactivate(&mut self, layer_id: usize) {
        if !self.layers[layer_id].active {
            return; // idempotent
        }
        self.layers[layer_id].active = false;
        let ranges = self.layers[layer_id].ranges.clone();
        for range in &ranges {
            for page in self.pages_for_range(range.virtual_base, range.size) {
                self.covering[page].retain(|c| c.layer_id != layer_id);
                self.recompute_page(page);
            }
        }
    }

    pub fn set_layer_permissions(&mut self, layer_id: usize, perms: Perms) {
        for range in self.layers[layer_id].ranges.iter_mut() {
            range.perms = perms;
        }
        if self.layers[layer_id].active {
            self.refresh_layer_pages(layer_id);
        }
    }

    /// Re-derives this layer's covering entries from its current range
    /// records (used after `set_layer_permissions` or a swap-group variant
    /// change scoped to this layer) without touching activation order.
    fn refresh_layer_pages(&mut self, layer_id: usize) {
        let priority = self.layers[layer_id].priority;
        let device_id = self.layers[layer_id].device_id;
        let ranges = self.layers[layer_id].ranges.clone();
        for range in &ranges {
            for (i, page) in self.pages_for_range(range.virtual_base, range.size).enumerate() {
                let entry = PageTableEntry {
                    target_id: Some(range.target_id),
                    device_id,
                    tag: range.tag,
                    perms: range.perms,
                    phys_base: range.phys_base + (i as u32) * self.page_size,
                    layer_id: layer_id as u32 + 1,
                };
                if let Some(cover) = self.covering[page].iter_mut().find(|c| c.layer_id == layer_id) {
                    cover.entry = entry;
                }
                self.recompute_page(page);
            }
        }
    }

    fn recompute_page(&mut self, page: usize) {
        self.pages[page] = pick_top(&self.covering[page]).unwrap_or(self.base_pages[page]);
    }

    // ---- swap groups ------------------------------------------------

    pub fn create_swap_group(&mut self, name: &str, controller_device_id: u32, virtual_base: u32, size: u32) -> usize {
        self.swap_groups.push(SwapGroupRecord {
            name: name.to_string(),
            controller_device_id,
            virtual_base,
            size,
            variants: Vec::new(),
            active_variant: None,
            scoped_layer: None,
        });
        self.swap_groups.len() - 1
    }

    pub fn scope_swap_group_to_layer(&mut self, group_id: usize, layer_id: usize) {
        self.swap_groups[group_id].scoped_layer = Some(layer_id);
    }

    pub fn add_variant(
        &mut self,
        group_id: usize,
        name: &str,
        target_id: usize,
        phys_base: u32,
        perms: Perms,
        tag: RegionTag,
        size: Option<u32>,
    ) {
        let group_size = self.swap_groups[group_id].size;
        self.swap_groups[group_id].variants.push(Variant {
            name: name.to_string(),
            target_id,
            phys_base,
            perms,
            tag,
            size: size.unwrap_or(group_size),
        });
    }

    pub fn swap_group_id(&self, name: &str) -> Option<usize> {
        self.swap_groups.iter().position(|g| g.name == name)
    }

    pub fn active_variant(&self, group_id: usize) -> Option<&str> {
        let group = &self.swap_groups[group_id];
        group.active_variant.map(|i| group.variants[i].name.as_str())
    }

    pub fn select_variant(&mut self, group_id: usize, variant_name: &str) -> Result<(), ConfigurationError> {
        let group = &self.swap_groups[group_id];
        if group.active_variant.map(|i| group.variants[i].name.as_str()) == Some(variant_name) {
            return Ok(()); // re-entrant selection is a no-op
        }
        let variant_idx = group
            .variant_index(variant_name)
            .ok_or_else(|| ConfigurationError::UnknownSwapGroup(variant_name.to_string()))?;
        self.swap_groups[group_id].active_variant = Some(variant_idx);

        let group = &self.swap_groups[group_id];
        let virtual_base = group.virtual_base;
        let variant = group.variants[variant_idx].clone();
        let scoped_layer = group.scoped_layer;

        if let Some(layer_id) = scoped_layer {
            if let Some(range) = self.layers[layer_id]
                .ranges
                .iter_mut()
                .find(|r| r.virtual_base == virtual_base)
            {
                range.target_id = variant.target_id;
                range.phys_base = variant.phys_base;
                range.perms = variant.perms;
                range.tag = variant.tag;
            } else {
                self.layers[layer_id].ranges.push(LayerRange {
                    virtual_base,
                    size: variant.size,
                    target_id: variant.target_id,
                    phys_base: variant.phys_base,
                    perms: variant.perms,
                    tag: variant.tag,
                });
            }
            if self.layers[layer_id].active {
                self.refresh_layer_pages(layer_id);
            }
        } else {
            for (i, page) in self.pages_for_range(virtual_base, variant.size).enumerate() {
                let entry = PageTableEntry {
                    target_id: Some(variant.target_id),
                    device_id: self.swap_groups[group_id].controller_device_id,
                    tag: variant.tag,
                    perms: variant.perms,
                    phys_base: variant.phys_base + (i as u32) * self.page_size,
                    layer_id: 0,
                };
                self.base_pages[page] = entry;
                if self.covering[page].is_empty() {
                    self.pages[page] = entry;
                }
            }
        }
        log::debug!("swap group '{}' selected variant '{}'", self.swap_groups[group_id].name, variant_name);
        Ok(())
    }
}

fn default_for(width: Width) -> u32 {
    match width {
        Width::Byte => 0xff,
        Width::Word => 0xffff,
        Width::Dword => 0xffff_ffff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RamTarget;

    fn bus_with_ram(size: u32) -> (Bus, usize) {
        let mut bus = Bus::new(16).unwrap();
        let target = bus.add_target(Box::new(RamTarget::new(size as usize)));
        (bus, target)
    }

    #[test]
    fn map_region_round_trips() {
        let (mut bus, ram) = bus_with_ram(0x10000);
        bus.map_region("ram", 0, 0x10000, 1, RegionTag::Ram, Perms::R.union(Perms::W), ram, 0).unwrap();
        bus.write(0x1234, Width::Byte, 0xab, AccessContext::write(Width::Byte));
        assert_eq!(bus.read(0x1234, Width::Byte, AccessContext::read(Width::Byte)), 0xab);
    }

    #[test]
    fn overlapping_regions_rejected() {
        let (mut bus, ram) = bus_with_ram(0x10000);
        bus.map_region("a", 0, 0x1000, 1, RegionTag::Ram, Perms::R, ram, 0).unwrap();
        let err = bus.map_region("b", 0, 0x1000, 1, RegionTag::Ram, Perms::R, ram, 0).unwrap_err();
        assert!(matches!(err, ConfigurationError::OverlappingMapping { .. }));
    }

    #[test]
    fn unmapped_read_returns_floating_bus_default_and_faults() {
        let (mut bus, _ram) = bus_with_ram(0x1000);
        let value = bus.read(0x8000, Width::Byte, AccessContext::read(Width::Byte));
        assert_eq!(value, 0xff);
        assert_eq!(bus.faults().count(), 1);
    }

    #[test]
    fn write_protected_page_ignores_write() {
        let (mut bus, ram) = bus_with_ram(0x1000);
        bus.map_region("rom", 0, 0x1000, 1, RegionTag::Rom, Perms::R, ram, 0).unwrap();
        bus.write(0, Width::Byte, 0x42, AccessContext::write(Width::Byte));
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0);
        assert!(matches!(bus.faults().last().unwrap().fault, BusFault::WriteProtected { .. }));
    }

    #[test]
    fn layer_activation_overrides_base_and_deactivation_restores_it() {
        let (mut bus, rom) = bus_with_ram(0x1000);
        bus.map_region("rom", 0, 0x1000, 1, RegionTag::Rom, Perms::R, rom, 0).unwrap();
        bus.save_base_mapping_range(0, 1);
        let ram = bus.add_target(Box::new(RamTarget::new(0x1000)));
        let layer = bus.create_layer("overlay", 10, 2);
        bus.add_layer_mapping(layer, 0, 0x1000, ram, 0, Perms::R.union(Perms::W), RegionTag::Ram);

        bus.activate(layer);
        bus.write(0, Width::Byte, 0x99, AccessContext::write(Width::Byte));
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0x99);

        bus.deactivate(layer);
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0);
    }

    #[test]
    fn equal_priority_layers_break_ties_by_most_recent_activation() {
        let (mut bus, t1) = bus_with_ram(0x1000);
        let t2 = bus.add_target(Box::new(RamTarget::new(0x1000)));
        let a = bus.create_layer("a", 5, 1);
        let b = bus.create_layer("b", 5, 1);
        bus.add_layer_mapping(a, 0, 0x1000, t1, 0, Perms::R.union(Perms::W), RegionTag::Ram);
        bus.add_layer_mapping(b, 0, 0x1000, t2, 0, Perms::R.union(Perms::W), RegionTag::Ram);
        bus.write(0, Width::Byte, 1, AccessContext::write(Width::Byte));

        bus.activate(a);
        bus.activate(b);
        // "b" activated after "a" at equal priority, so "b" (t2) wins.
        bus.write(0, Width::Byte, 7, AccessContext::write(Width::Byte));
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 7);

        bus.deactivate(b);
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0);
    }

    #[test]
    fn swap_group_switches_visible_at_next_access() {
        let (mut bus, v1) = bus_with_ram(0x1000);
        let v2 = bus.add_target(Box::new(RamTarget::new(0x1000)));
        let group = bus.create_swap_group("bank", 1, 0, 0x1000);
        bus.add_variant(group, "one", v1, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);
        bus.add_variant(group, "two", v2, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);

        bus.select_variant(group, "one").unwrap();
        bus.write(0, Width::Byte, 0x11, AccessContext::write(Width::Byte));
        bus.select_variant(group, "two").unwrap();
        bus.write(0, Width::Byte, 0x22, AccessContext::write(Width::Byte));

        bus.select_variant(group, "one").unwrap();
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0x11);
        bus.select_variant(group, "two").unwrap();
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 0x22);
    }

    #[test]
    fn reselecting_active_variant_is_a_no_op() {
        let (mut bus, v1) = bus_with_ram(0x1000);
        let group = bus.create_swap_group("bank", 1, 0, 0x1000);
        bus.add_variant(group, "one", v1, 0, Perms::R.union(Perms::W), RegionTag::Ram, None);
        bus.select_variant(group, "one").unwrap();
        bus.write(0, Width::Byte, 5, AccessContext::write(Width::Byte));
        bus.select_variant(group, "one").unwrap();
        assert_eq!(bus.read(0, Width::Byte, AccessContext::read(Width::Byte)), 5);
    }

    #[test]
    fn word_access_to_a_byte_only_target_raises_unsupported_width() {
        use crate::memory::IoTarget;

        let mut bus = Bus::new(16).unwrap();
        let io = bus.add_target(Box::new(IoTarget::new(|_offset, _ctx| 0x42, |_offset, _value, _ctx| {})));
        bus.map_region("io", 0x2000, 0x1000, 0, RegionTag::Io, Perms::R.union(Perms::W), io, 0).unwrap();

        assert_eq!(bus.read(0x2000, Width::Byte, AccessContext::read(Width::Byte)), 0x42);

        let value = bus.read(0x2000, Width::Word, AccessContext::read(Width::Word));
        assert_eq!(value, default_for(Width::Word));
        assert_eq!(bus.faults().count(), 1);
        assert!(matches!(bus.faults().next().unwrap().fault, BusFault::UnsupportedWidth { width: Width::Word, .. }));

        bus.write(0x2000, Width::Word, 0x1234, AccessContext::write(Width::Word));
        assert_eq!(bus.faults().count(), 2);
    }
}
