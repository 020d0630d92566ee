//! End-to-end scenarios driven entirely through [`pocket2e::machine::Machine`],
//! the same surface a debug console or a host application uses: no test here
//! reaches into the bus or a device directly.

use pocket2e::builder::build_machine;
use pocket2e::bus::page_table::{Perms, RegionTag};
use pocket2e::bus::Bus;
use pocket2e::debug::{DebugCommand, DebugResponse};
use pocket2e::devices::language_card::LanguageCard;
use pocket2e::devices::Device;
use pocket2e::machine::{Machine, MachineState};
use pocket2e::memory::RomTarget;
use pocket2e::profile::{MemoryEmbeddedResources, Profile, ResourceContext};

const MINIMAL_PROFILE: &str = r#"{
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

fn machine_with_rom_and_language_card(rom: Vec<u8>) -> Machine {
    let mut bus = Bus::new(16).unwrap();
    let target = bus.add_target(Box::new(RomTarget::new(rom)));
    bus.map_region("rom", 0xC000, 0x4000, 0, RegionTag::Rom, Perms::R, target, 0).unwrap();

    let mut machine = Machine::new("scenario-machine", bus);
    let id = machine.devices.register(Box::new(LanguageCard::new()));
    machine.devices.get_mut(id).unwrap().configure_memory(id, &mut machine.bus).unwrap();
    let addresses = machine.devices.get(id).unwrap().soft_switch_addresses();
    machine.io.register_device(id, &addresses);

    machine.bus.save_base_mapping_range(0, machine.bus.page_count());
    machine.reset();
    machine
}

#[test]
fn language_card_rx2_enables_writes_only_after_two_reads() {
    let mut machine = machine_with_rom_and_language_card(vec![0xea; 0x4000]);

    machine.peek(0xc083);
    machine.poke(0xd000, 0xaa);
    assert_ne!(machine.peek(0xd000), 0xaa);

    machine.peek(0xc083);
    machine.poke(0xd000, 0xaa);
    assert_eq!(machine.peek(0xd000), 0xaa);
}

#[test]
fn language_card_bank_switch_keeps_each_banks_contents_independent() {
    let mut machine = machine_with_rom_and_language_card(vec![0xea; 0x4000]);

    machine.peek(0xc083);
    machine.peek(0xc083);
    machine.poke(0xd000, 0x11);

    machine.peek(0xc08b);
    machine.peek(0xc08b);
    machine.poke(0xd000, 0x22);

    machine.peek(0xc083);
    assert_eq!(machine.peek(0xd000), 0x11);

    machine.peek(0xc08b);
    assert_eq!(machine.peek(0xd000), 0x22);
}

#[test]
fn language_card_layer_deactivated_at_reset_exposes_the_rom_reset_vector() {
    let mut rom = vec![0xea; 0x4000];
    rom[0x3ffc] = 0x34;
    rom[0x3ffd] = 0x12;
    let mut machine = machine_with_rom_and_language_card(rom);

    assert_eq!(machine.peek(0xfffc), 0x34);
    assert_eq!(machine.peek(0xfffd), 0x12);

    machine.peek(0xc080);
    machine.peek(0xc080);
    assert_eq!(machine.peek(0xfffc), 0x00);
}

#[test]
fn debug_peek_of_the_bank_switch_offset_does_not_alter_write_enable() {
    let mut machine = machine_with_rom_and_language_card(vec![0xea; 0x4000]);
    machine.peek(0xc083);
    machine.peek(0xc083);

    let before = machine.execute_debug_command(DebugCommand::Switches);

    machine.execute_debug_command(DebugCommand::Peek(0xc083));

    let after = machine.execute_debug_command(DebugCommand::Switches);
    let DebugResponse::Switches(before) = before else { panic!("expected switches") };
    let DebugResponse::Switches(after) = after else { panic!("expected switches") };
    assert_eq!(before, after);
    assert!(before.iter().find(|s| s.name == "LC_WRITE_ENABLED").unwrap().active);
}

#[test]
fn rom_hash_mismatch_with_fallback_policy_boots_a_zero_filled_rom() {
    let profile_json = MINIMAL_PROFILE.replacen(
        "\"required\": true",
        "\"required\": true, \"on_verification_fail\": \"fallback\", \"hash\": { \"sha256\": \"00\" }",
        1,
    );
    let profile = Profile::from_json(&profile_json).unwrap();
    let ctx = ResourceContext::default();
    let mut embedded = MemoryEmbeddedResources::new();
    let mut rom = vec![0xea; 0x4000];
    rom[0x3ffc] = 0x00;
    rom[0x3ffd] = 0xc0;
    embedded.insert("fixtures/monitor.rom", rom);

    let mut machine = build_machine(&profile, &ctx, &embedded).unwrap();
    assert_eq!(machine.peek(0xc000), 0x00);
}

#[test]
fn reset_from_halted_restores_stopped_state_and_the_reset_vector() {
    let mut rom = vec![0xea; 0x4000];
    rom[0x3ffc] = 0x00;
    rom[0x3ffd] = 0xc0;
    let mut machine = machine_with_rom_and_language_card(rom);

    machine.halt();
    assert_eq!(machine.state, MachineState::Halted);

    machine.reset();
    assert_eq!(machine.state, MachineState::Stopped);
    assert_eq!(machine.cpu.pc, 0xc000);
}
