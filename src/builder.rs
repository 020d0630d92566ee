//! Assembles a [`Machine`] from a parsed [`Profile`], in the fixed order the
//! page table and its devices need: bus, physical memories and ROM images,
//! region mappings (RAM before ROM), swap groups, motherboard devices,
//! soft-switch registration, slot cards, and finally the base-mapping
//! snapshot that every later layer/swap-group operation restores to. Device
//! `initialize` only runs once that snapshot exists.

use std::collections::HashMap;

use crate::bus::page_table::{Perms, RegionTag};
use crate::bus::Bus;
use crate::devices::slots::{make_slot_card, SlotManager};
use crate::devices::{make_motherboard_device, DeviceRegistry};
use crate::error::{BuildError, ConfigurationError, ResourceError};
use crate::io_dispatcher::IoDispatcher;
use crate::machine::Machine;
use crate::memory::RamTarget;
use crate::profile::{
    EmbeddedResources, Profile, RegionSpec, RegionType, ResourceContext, VerificationFailPolicy,
};

/// Builds a fully wired, not-yet-reset [`Machine`] from `profile`. Call
/// [`Machine::reset`] afterward to bring the CPU and devices to their
/// power-on state.
pub fn build_machine(
    profile: &Profile,
    resources: &ResourceContext,
    embedded: &dyn EmbeddedResources,
) -> Result<Machine, BuildError> {
    let mut bus = Bus::new(profile.address_space).map_err(BuildError::Configuration)?;

    let rom_bytes = load_rom_images(profile, resources, embedded)?;

    map_regions(&mut bus, profile, &rom_bytes)?;
    configure_swap_groups(&mut bus, profile, &rom_bytes)?;

    let mut devices = DeviceRegistry::new();
    let mut io = IoDispatcher::new();
    let mut slots = SlotManager::new();
    let mut components: Vec<(String, u32)> = Vec::new();

    for entry in &profile.devices.motherboard {
        if !entry.enabled {
            continue;
        }
        let device = make_motherboard_device(&entry.type_id)?;
        let id = devices.register(device);
        devices
            .get_mut(id)
            .expect("just registered")
            .configure_memory(id, &mut bus)
            .map_err(BuildError::Device)?;
        let addresses = devices.get(id).expect("just registered").soft_switch_addresses();
        io.register_device(id, &addresses);
        components.push((entry.name.clone().unwrap_or_else(|| entry.type_id.clone()), id));
    }

    for (slot_key, spec) in &profile.devices.slots {
        let slot: u8 = slot_key.parse().map_err(|_| ConfigurationError::InvalidSlot(0))?;
        let card = make_slot_card(&spec.type_id)?;
        let id = devices.register_slot_card(card);
        slots.install(slot, id).map_err(BuildError::Configuration)?;
        let addresses = devices.get(id).expect("just registered").soft_switch_addresses();
        io.register_device(id, &addresses);
        components.push((format!("slot{slot}"), id));
    }

    bus.save_base_mapping_range(0, bus.page_count());

    for id in 0..devices.len() as u32 {
        if let Some(device) = devices.get_mut(id) {
            device.initialize().map_err(BuildError::Device)?;
        }
    }

    let mut machine = Machine::new(profile.name.clone(), bus);
    machine.devices = devices;
    machine.io = io;
    machine.slots = slots;
    for (name, id) in components {
        machine.register_component(name, id);
    }
    Ok(machine)
}

fn load_rom_images(
    profile: &Profile,
    resources: &ResourceContext,
    embedded: &dyn EmbeddedResources,
) -> Result<HashMap<String, Vec<u8>>, BuildError> {
    let mut rom_bytes = HashMap::new();
    for image in &profile.memory.rom_images {
        let declared_size = image.size.get() as usize;
        let resolved = resources.resolve(&image.source).map_err(BuildError::Configuration)?;
        let loaded = crate::profile::load_bytes(&resolved, embedded);
        let mut bytes = match loaded {
            Ok(bytes) => bytes,
            Err(err) => {
                if image.required {
                    return Err(BuildError::Resource(ResourceError::RequiredRomMissing(image.name.clone())));
                }
                log::warn!("ROM image '{}' unavailable ({err}), using a zero-filled image", image.name);
                vec![0u8; declared_size]
            }
        };
        bytes.resize(declared_size, 0);

        if let Some(hash) = &image.hash {
            if let Err(err) = crate::profile::verify_rom_hash(&image.name, &bytes, hash) {
                match image.on_verification_fail {
                    VerificationFailPolicy::Stop => return Err(BuildError::Resource(err)),
                    VerificationFailPolicy::Fallback => {
                        log::warn!("ROM '{}' failed hash verification, substituting a zero-filled image: {err}", image.name);
                        bytes = vec![0u8; declared_size];
                    }
                }
            }
        }
        rom_bytes.insert(image.name.clone(), bytes);
    }
    Ok(rom_bytes)
}

fn resolve_region_source(
    region: &RegionSpec,
    rom_bytes: &HashMap<String, Vec<u8>>,
) -> Result<Option<Vec<u8>>, ConfigurationError> {
    let Some(name) = &region.source else { return Ok(None) };
    let source = rom_bytes.get(name).ok_or_else(|| ConfigurationError::UnknownRomImage(name.clone()))?;
    let offset = region.source_offset.map(|o| o.get() as usize).unwrap_or(0);
    let size = region.size.get() as usize;
    let mut out = vec![0u8; size];
    let available = source.len().saturating_sub(offset).min(size);
    out[..available].copy_from_slice(&source[offset..offset + available]);
    Ok(Some(out))
}

fn map_regions(bus: &mut Bus, profile: &Profile, rom_bytes: &HashMap<String, Vec<u8>>) -> Result<(), BuildError> {
    let (ram_regions, rest): (Vec<_>, Vec<_>) =
        profile.memory.regions.iter().partition(|r| r.region_type == RegionType::Ram);
    let (rom_regions, io_regions): (Vec<_>, Vec<_>) =
        rest.into_iter().partition(|r| r.region_type == RegionType::Rom);

    for region in io_regions {
        log::debug!("region '{}' declares type io; handled by the I/O dispatcher, not the page table", region.name);
    }

    for region in ram_regions.into_iter().chain(rom_regions) {
        let size = region.size.get() as usize;
        let bytes = resolve_region_source(region, rom_bytes).map_err(BuildError::Configuration)?;
        let target_id = match region.region_type {
            RegionType::Ram => {
                let mut ram = RamTarget::new(size);
                if let Some(bytes) = bytes {
                    ram = RamTarget::from_bytes(bytes);
                } else if let Some(fill) = region.fill {
                    ram.fill(fill.get() as u8);
                }
                bus.add_target(Box::new(ram))
            }
            RegionType::Rom => {
                let bytes = bytes.unwrap_or_else(|| vec![0u8; size]);
                bus.add_target(Box::new(crate::memory::RomTarget::new(bytes)))
            }
            RegionType::Io => unreachable!("io regions are filtered out above"),
        };
        let perms = Perms::parse(&region.permissions);
        let tag = match region.region_type {
            RegionType::Ram => RegionTag::Ram,
            RegionType::Rom => RegionTag::Rom,
            RegionType::Io => RegionTag::Io,
        };
        bus.map_region(&region.name, region.start.get(), region.size.get(), 0, tag, perms, target_id, 0)
            .map_err(BuildError::Configuration)?;
    }
    Ok(())
}

fn configure_swap_groups(bus: &mut Bus, profile: &Profile, rom_bytes: &HashMap<String, Vec<u8>>) -> Result<(), BuildError> {
    for spec in &profile.memory.swap_groups {
        let group_id = bus.create_swap_group(&spec.name, 0, spec.start.get(), spec.size.get());
        for variant in &spec.variants {
            let size = spec.size.get() as usize;
            let bytes = match &variant.source {
                Some(name) => {
                    let source = rom_bytes.get(name).ok_or_else(|| ConfigurationError::UnknownRomImage(name.clone()))?;
                    let offset = variant.offset.map(|o| o.get() as usize).unwrap_or(0);
                    let mut out = vec![0u8; size];
                    let available = source.len().saturating_sub(offset).min(size);
                    out[..available].copy_from_slice(&source[offset..offset + available]);
                    out
                }
                None => vec![0u8; size],
            };
            let target_id = bus.add_target(Box::new(RamTarget::from_bytes(bytes)));
            let perms = Perms::parse(&variant.permissions);
            let tag = if perms.contains(Perms::W) { RegionTag::Ram } else { RegionTag::Rom };
            bus.add_variant(group_id, &variant.name, target_id, 0, perms, tag, None);
        }
        if let Some(first) = spec.variants.first() {
            bus.select_variant(group_id, &first.name).map_err(BuildError::Configuration)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{NoEmbeddedResources, Profile};

    const MINIMAL: &str = r#"{
        "name": "test-machine",
        "addressSpace": 16,
        "cpu": { "type": "65C02", "clockHz": 1022727 },
        "memory": {
            "regions": [
                { "name": "ram", "type": "ram", "start": "0x0000", "size": "0xC000", "permissions": "rw" },
                { "name": "rom", "type": "rom", "start": "0xC000", "size": "0x4000", "permissions": "rx", "source": "monitor" }
            ],
            "rom-images": [
                { "name": "monitor", "source": "embedded://fixtures/monitor.rom", "size": "0x4000", "required": true }
            ]
        },
        "devices": {
            "motherboard": [ { "type": "languagecard" } ],
            "slots": { "6": { "type": "diskii" } }
        },
        "boot": { "autoStart": false }
    }"#;

    fn embedded_with_monitor() -> crate::profile::MemoryEmbeddedResources {
        let mut resources = crate::profile::MemoryEmbeddedResources::new();
        let mut rom = vec![0xea; 0x4000];
        rom[0x3ffc] = 0x00;
        rom[0x3ffd] = 0xc0;
        resources.insert("fixtures/monitor.rom", rom);
        resources
    }

    #[test]
    fn builds_a_machine_with_ram_rom_languagecard_and_a_slot_card() {
        let profile = Profile::from_json(MINIMAL).unwrap();
        let ctx = ResourceContext::default();
        let embedded = embedded_with_monitor();
        let mut machine = build_machine(&profile, &ctx, &embedded).unwrap();

        machine.reset();
        assert_eq!(machine.cpu.pc, 0xc000);
        assert!(machine.slots.device_id_for_slot(6).is_some());
        assert!(machine.component("languagecard").is_some());
        assert!(machine.component("slot6").is_some());
    }

    #[test]
    fn missing_required_rom_aborts_the_build() {
        let profile_json = MINIMAL.replace("embedded://fixtures/monitor.rom", "embedded://fixtures/missing.rom");
        let profile = Profile::from_json(&profile_json).unwrap();
        let ctx = ResourceContext::default();
        let embedded = NoEmbeddedResources;
        let err = build_machine(&profile, &ctx, &embedded).unwrap_err();
        assert!(matches!(err, BuildError::Resource(ResourceError::RequiredRomMissing(_))));
    }

    #[test]
    fn hash_mismatch_with_stop_policy_aborts_the_build() {
        let profile_json = MINIMAL.replacen(
            "\"required\": true",
            "\"required\": true, \"on_verification_fail\": \"stop\", \"hash\": { \"sha256\": \"00\" }",
            1,
        );
        let profile = Profile::from_json(&profile_json).unwrap();
        let ctx = ResourceContext::default();
        let embedded = embedded_with_monitor();
        let err = build_machine(&profile, &ctx, &embedded).unwrap_err();
        assert!(matches!(err, BuildError::Resource(ResourceError::HashMismatch { .. })));
    }

    #[test]
    fn hash_mismatch_with_fallback_policy_substitutes_a_zero_filled_rom() {
        let profile_json = MINIMAL.replacen(
            "\"required\": true",
            "\"required\": true, \"on_verification_fail\": \"fallback\", \"hash\": { \"sha256\": \"00\" }",
            1,
        );
        let profile = Profile::from_json(&profile_json).unwrap();
        let ctx = ResourceContext::default();
        let embedded = embedded_with_monitor();
        let mut machine = build_machine(&profile, &ctx, &embedded).unwrap();
        assert_eq!(machine.peek(0xc000), 0x00);
    }
}
