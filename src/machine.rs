//! `Machine` owns every live component — bus, device registry, CPU,
//! scheduler, I/O dispatcher, and slot manager — and is the only thing the
//! CPU talks to. A transient [`MachineBus`] view implements [`SystemBus`],
//! special-casing the I/O page and slot ROM window before falling through
//! to the ordinary bus.

use std::collections::HashMap;

use crate::bus::Bus;
use crate::cpu::{Cpu, SystemBus};
use crate::devices::slots::SlotManager;
use crate::devices::DeviceRegistry;
use crate::io_dispatcher::IoDispatcher;
use crate::memory::{AccessContext, Width};
use crate::scheduler::Scheduler;

const IO_PAGE_START: u32 = 0xc000;
const IO_PAGE_END: u32 = 0xc100;
const SLOT_WINDOW_END: u32 = 0xd000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Stopped,
    Running,
    Paused,
    Halted,
}

/// Borrows every field `Cpu::step` needs to reach through the bus, without
/// borrowing `cpu` itself — the split that lets `Machine::step` hold both
/// `&mut Cpu` and `&mut dyn SystemBus` at once.
struct MachineBus<'a> {
    bus: &'a mut Bus,
    devices: &'a mut DeviceRegistry,
    io: &'a mut IoDispatcher,
    slots: &'a mut SlotManager,
}

impl MachineBus<'_> {
    /// The shared dispatch behind both `cpu_read` and the debug console's
    /// side-effect-free peek; only `ctx` differs between the two callers.
    fn read_with(&mut self, addr: u16, ctx: AccessContext) -> u8 {
        let addr = addr as u32;
        if (IO_PAGE_START..IO_PAGE_END).contains(&addr) {
            self.io.read(addr, ctx, self.bus, self.devices)
        } else if (IO_PAGE_END..SLOT_WINDOW_END).contains(&addr) {
            self.slots.read_rom(addr, self.devices)
        } else {
            self.bus.read(addr, Width::Byte, ctx) as u8
        }
    }
}

impl SystemBus for MachineBus<'_> {
    fn cpu_read(&mut self, addr: u16) -> u8 {
        self.read_with(addr, AccessContext::read(Width::Byte))
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        let addr = addr as u32;
        if (IO_PAGE_START..IO_PAGE_END).contains(&addr) {
            self.io.write(addr, value, AccessContext::write(Width::Byte), self.bus, self.devices);
        } else if (IO_PAGE_END..SLOT_WINDOW_END).contains(&addr) {
            // The $C100-$CFFF window is slot/expansion ROM: read-only from
            // the CPU's perspective, so ordinary writes land nowhere.
        } else {
            self.bus.write(addr, Width::Byte, value as u32, AccessContext::write(Width::Byte));
        }
    }
}

/// The component bag keyed by name, used to look up a device id when wiring
/// two subsystems together (e.g. the debug console resolving "keyboard" to
/// feed a keypress) without every caller needing to remember raw ids.
pub struct Machine {
    pub name: String,
    pub bus: Bus,
    pub devices: DeviceRegistry,
    pub cpu: Cpu,
    pub scheduler: Scheduler,
    pub io: IoDispatcher,
    pub slots: SlotManager,
    pub state: MachineState,
    components: HashMap<String, u32>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("name", &self.name)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Machine {
    pub fn new(name: impl Into<String>, bus: Bus) -> Self {
        Self {
            name: name.into(),
            bus,
            devices: DeviceRegistry::new(),
            cpu: Cpu::new(),
            scheduler: Scheduler::new(),
            io: IoDispatcher::default(),
            slots: SlotManager::new(),
            state: MachineState::Stopped,
            components: HashMap::new(),
        }
    }

    pub fn register_component(&mut self, name: impl Into<String>, device_id: u32) {
        self.components.insert(name.into(), device_id);
    }

    pub fn component(&self, name: &str) -> Option<u32> {
        self.components.get(name).copied()
    }

    fn with_system_bus<R>(&mut self, f: impl FnOnce(&mut Cpu, &mut MachineBus) -> R) -> R {
        let Machine { cpu, bus, devices, io, slots, .. } = self;
        let mut sys = MachineBus { bus, devices, io, slots };
        f(cpu, &mut sys)
    }

    /// Forces `cpu.reset()`, resets every device, and restores the
    /// power-on soft-switch configuration. Valid from any state, including
    /// `Halted`.
    pub fn reset(&mut self) {
        self.with_system_bus(|cpu, sys| cpu.reset(sys));
        self.devices.reset_all(&mut self.bus);
        self.state = MachineState::Stopped;
    }

    pub fn start(&mut self) {
        if self.state != MachineState::Halted {
            self.state = MachineState::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.state == MachineState::Running {
            self.state = MachineState::Paused;
        }
    }

    pub fn halt(&mut self) {
        self.state = MachineState::Halted;
    }

    /// Executes exactly one instruction regardless of `state`, draining the
    /// scheduler up to the CPU's new cycle count, then ticking devices.
    /// Used by both the `Running` loop and the debug console's `step`.
    pub fn step_one(&mut self) -> u64 {
        let cycles = self.with_system_bus(|cpu, sys| cpu.step(sys));
        self.scheduler.advance_to(self.cpu.cycles);
        self.devices.tick_all(cycles, &mut self.bus);
        cycles
    }

    /// Runs instructions while `state == Running`, returning the total
    /// cycle count executed. A real host calls this from its own loop in
    /// small slices (e.g. once per video frame); it does not block forever.
    pub fn run_for(&mut self, cycles: u64) -> u64 {
        let target = self.cpu.cycles.saturating_add(cycles);
        let mut executed = 0;
        while self.state == MachineState::Running && self.cpu.cycles < target {
            executed += self.step_one();
        }
        executed
    }

    pub fn peek(&mut self, addr: u32) -> u8 {
        self.with_system_bus(|_, sys| sys.cpu_read(addr as u16))
    }

    pub fn poke(&mut self, addr: u32, value: u8) {
        self.with_system_bus(|_, sys| sys.cpu_write(addr as u16, value));
    }

    /// Reads `addr` the way a debugger should: soft switches see
    /// `is_side_effect_free`, so a register dump or a disassembly listing
    /// never flips write-enable latches or strobes a keyboard read.
    pub fn debug_peek(&mut self, addr: u32) -> u8 {
        self.with_system_bus(|_, sys| sys.read_with(addr as u16, AccessContext::read(Width::Byte).side_effect_free()))
    }
}
