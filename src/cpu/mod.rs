//! Cycle-accurate 65C02 core: registers, the opcode table, and the
//! fetch/decode/execute loop. The CPU never touches a [`crate::bus::Bus`]
//! directly — it talks to whatever implements [`SystemBus`], which for this
//! machine is `Machine` itself, routing `$C000-$C0FF` and `$C100-$CFFF`
//! to the I/O dispatcher and slot manager before falling through to the bus.

pub mod addressing;
pub mod opcodes;

use addressing::{AddressingMode, Operand};
use opcodes::{bit_index, decode, is_zero_page_relative};

const RESET_VECTOR: u16 = 0xfffc;
const NMI_VECTOR: u16 = 0xfffa;
const IRQ_VECTOR: u16 = 0xfffe;
const STACK_PAGE: u16 = 0x0100;

/// The seam between the CPU and everything else on the address bus. `Machine`
/// implements this by special-casing the I/O page and slot ROM window and
/// delegating everything else to [`crate::bus::Bus::read`]/`write`.
pub trait SystemBus {
    fn cpu_read(&mut self, addr: u16) -> u8;
    fn cpu_write(&mut self, addr: u16, value: u8);
}

/// The 65C02 status register: N V 1 B D I Z C, bit 5 always reads as 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flags {
    pub n: bool,
    pub v: bool,
    pub b: bool,
    pub d: bool,
    pub i: bool,
    pub z: bool,
    pub c: bool,
}

impl Flags {
    pub fn to_byte(self) -> u8 {
        (self.n as u8) << 7
            | (self.v as u8) << 6
            | 1 << 5
            | (self.b as u8) << 4
            | (self.d as u8) << 3
            | (self.i as u8) << 2
            | (self.z as u8) << 1
            | (self.c as u8)
    }

    pub fn from_byte(byte: u8) -> Self {
        Self {
            n: byte & 0x80 != 0,
            v: byte & 0x40 != 0,
            b: byte & 0x10 != 0,
            d: byte & 0x08 != 0,
            i: byte & 0x04 != 0,
            z: byte & 0x02 != 0,
            c: byte & 0x01 != 0,
        }
    }

    fn set_nz(&mut self, value: u8) {
        self.n = value & 0x80 != 0;
        self.z = value == 0;
    }
}

pub struct Cpu {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: Flags,
    pub cycles: u64,
    waiting_for_interrupt: bool,
    stopped: bool,
    irq_pending: bool,
    nmi_pending: bool,
    on_opcode_fetch: Option<Box<dyn FnMut(u16, u8)>>,
    on_memory_access: Option<Box<dyn FnMut(u16, u8, bool)>>,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xfd,
            pc: 0,
            p: Flags { i: true, ..Flags::default() },
            cycles: 0,
            waiting_for_interrupt: false,
            stopped: false,
            irq_pending: false,
            nmi_pending: false,
            on_opcode_fetch: None,
            on_memory_access: None,
        }
    }

    pub fn set_opcode_fetch_hook(&mut self, hook: impl FnMut(u16, u8) + 'static) {
        self.on_opcode_fetch = Some(Box::new(hook));
    }

    pub fn set_memory_access_hook(&mut self, hook: impl FnMut(u16, u8, bool) + 'static) {
        self.on_memory_access = Some(Box::new(hook));
    }

    pub fn is_waiting_for_interrupt(&self) -> bool {
        self.waiting_for_interrupt
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Loads `PC` from the reset vector, sets `I`, clears `D`. Does not
    /// touch `A`/`X`/`Y`; real hardware leaves them undefined, we leave them
    /// whatever they were (`Machine::reset` always constructs a fresh `Cpu`
    /// at power-on, so this only matters for a debug-console `reset`).
    pub fn reset(&mut self, bus: &mut dyn SystemBus) {
        self.p.i = true;
        self.p.d = false;
        self.waiting_for_interrupt = false;
        self.stopped = false;
        self.irq_pending = false;
        self.nmi_pending = false;
        self.pc = self.read_word(bus, RESET_VECTOR);
    }

    /// Marks an interrupt request pending. Honoured at the next instruction
    /// boundary if `I` is clear; the caller is responsible for clearing the
    /// request once the device's condition is no longer asserted (level
    /// triggered, unlike `nmi`).
    pub fn irq(&mut self) {
        self.irq_pending = true;
    }

    pub fn clear_irq(&mut self) {
        self.irq_pending = false;
    }

    /// Edge-triggered: always honoured at the next instruction boundary,
    /// regardless of `I`.
    pub fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Executes one instruction (or one cycle of WAI/STP idling) and
    /// returns the number of cycles it took.
    pub fn step(&mut self, bus: &mut dyn SystemBus) -> u64 {
        if self.stopped {
            return 1;
        }
        if self.nmi_pending {
            self.nmi_pending = false;
            self.waiting_for_interrupt = false;
            let cycles = self.service_interrupt(bus, NMI_VECTOR, false);
            self.cycles += cycles;
            return cycles;
        }
        if self.waiting_for_interrupt {
            if self.irq_pending && !self.p.i {
                self.waiting_for_interrupt = false;
                let cycles = self.service_interrupt(bus, IRQ_VECTOR, false);
                self.cycles += cycles;
                return cycles;
            }
            return 1;
        }
        if self.irq_pending && !self.p.i {
            let cycles = self.service_interrupt(bus, IRQ_VECTOR, false);
            self.cycles += cycles;
            return cycles;
        }

        let pc_at_fetch = self.pc;
        let opcode = self.fetch_byte(bus);
        if let Some(hook) = self.on_opcode_fetch.as_mut() {
            hook(pc_at_fetch, opcode);
        }
        let cycles = self.execute(opcode, bus);
        self.cycles += cycles;
        cycles
    }

    /// Repeatedly steps until the CPU's own cycle counter reaches `target`.
    /// The final instruction may overshoot `target`; callers that need the
    /// scheduler drained precisely at `target` should call
    /// `Scheduler::advance_to(self.cycles)` after each `step`, not after
    /// `run_until` returns.
    pub fn run_until(&mut self, target: u64, bus: &mut dyn SystemBus) {
        while self.cycles < target && !self.stopped {
            self.step(bus);
        }
    }

    fn service_interrupt(&mut self, bus: &mut dyn SystemBus, vector: u16, from_brk: bool) -> u64 {
        self.push_word(bus, self.pc);
        let mut flags = self.p;
        flags.b = from_brk;
        self.push(bus, flags.to_byte());
        self.p.i = true;
        self.p.d = false;
        self.pc = self.read_word(bus, vector);
        7
    }

    fn read(&mut self, bus: &mut dyn SystemBus, addr: u16) -> u8 {
        let value = bus.cpu_read(addr);
        if let Some(hook) = self.on_memory_access.as_mut() {
            hook(addr, value, false);
        }
        value
    }

    fn write(&mut self, bus: &mut dyn SystemBus, addr: u16, value: u8) {
        bus.cpu_write(addr, value);
        if let Some(hook) = self.on_memory_access.as_mut() {
            hook(addr, value, true);
        }
    }

    fn fetch_byte(&mut self, bus: &mut dyn SystemBus) -> u8 {
        let value = self.read(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &mut dyn SystemBus) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn read_word(&mut self, bus: &mut dyn SystemBus, addr: u16) -> u16 {
        let lo = self.read(bus, addr) as u16;
        let hi = self.read(bus, addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut dyn SystemBus, value: u8) {
        self.write(bus, STACK_PAGE + self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut dyn SystemBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        self.read(bus, STACK_PAGE + self.sp as u16)
    }

    fn push_word(&mut self, bus: &mut dyn SystemBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_word(&mut self, bus: &mut dyn SystemBus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    /// Reads an operand resolved to an address or the accumulator; panics
    /// on `Implied`, which no operand-consuming handler ever resolves to.
    fn load(&mut self, bus: &mut dyn SystemBus, operand: &Operand) -> u8 {
        match *operand {
            Operand::Accumulator => self.a,
            Operand::Address(addr) => self.read(bus, addr),
            Operand::Implied => unreachable!("implied operand has no value"),
        }
    }

    fn store(&mut self, bus: &mut dyn SystemBus, operand: &Operand, value: u8) {
        match *operand {
            Operand::Accumulator => self.a = value,
            Operand::Address(addr) => self.write(bus, addr, value),
            Operand::Implied => unreachable!("implied operand is not writable"),
        }
    }

    fn branch_if(&mut self, target: u16, taken: bool) -> u64 {
        if !taken {
            return 0;
        }
        let page_crossed = (self.pc & 0xff00) != (target & 0xff00);
        self.pc = target;
        if page_crossed {
            2
        } else {
            1
        }
    }

    fn adc(&mut self, value: u8) {
        let carry_in = self.p.c as u16;
        if self.p.d {
            let mut lo = (self.a & 0x0f) as i16 + (value & 0x0f) as i16 + carry_in as i16;
            let mut hi = (self.a >> 4) as i16 + (value >> 4) as i16;
            if lo > 9 {
                lo -= 10;
                hi += 1;
            }
            let binary = self.a as u16 + value as u16 + carry_in;
            self.p.v = (!(self.a ^ value) & (self.a ^ binary as u8)) & 0x80 != 0;
            if hi > 9 {
                hi -= 10;
                self.p.c = true;
            } else {
                self.p.c = false;
            }
            self.a = (((hi as u8) << 4) | lo as u8) & 0xff;
            self.p.z = self.a == 0;
            self.p.n = self.a & 0x80 != 0;
        } else {
            let sum = self.a as u16 + value as u16 + carry_in;
            self.p.v = (!(self.a ^ value) & (self.a ^ sum as u8)) & 0x80 != 0;
            self.p.c = sum > 0xff;
            self.a = sum as u8;
            self.p.set_nz(self.a);
        }
    }

    fn sbc(&mut self, value: u8) {
        let carry_in = self.p.c as i16;
        let diff = self.a as i16 - value as i16 - (1 - carry_in);
        self.p.v = ((self.a ^ value) & (self.a ^ diff as u8) & 0x80) != 0;
        self.p.c = diff >= 0;
        if self.p.d {
            let mut lo = (self.a & 0x0f) as i16 - (value & 0x0f) as i16 - (1 - carry_in);
            let mut hi = (self.a >> 4) as i16 - (value >> 4) as i16;
            if lo < 0 {
                lo += 10;
                hi -= 1;
            }
            if hi < 0 {
                hi += 10;
            }
            self.a = (((hi as u8) << 4) | (lo as u8 & 0x0f)) & 0xff;
        } else {
            self.a = diff as u8;
        }
        self.p.set_nz(self.a);
    }

    fn compare(&mut self, reg: u8, value: u8) {
        let result = reg.wrapping_sub(value);
        self.p.c = reg >= value;
        self.p.set_nz(result);
    }

    fn shift_left(&mut self, value: u8, fill_carry: bool) -> u8 {
        let carry_in = self.p.c as u8;
        self.p.c = value & 0x80 != 0;
        let result = (value << 1) | if fill_carry { carry_in } else { 0 };
        self.p.set_nz(result);
        result
    }

    fn shift_right(&mut self, value: u8, fill_carry: bool) -> u8 {
        let carry_in = self.p.c as u8;
        self.p.c = value & 0x01 != 0;
        let result = (value >> 1) | if fill_carry { carry_in << 7 } else { 0 };
        self.p.set_nz(result);
        result
    }

    /// Decodes, resolves the operand, and executes one instruction,
    /// returning its cycle count including page-crossing/branch extras.
    fn execute(&mut self, opcode: u8, bus: &mut dyn SystemBus) -> u64 {
        let info = decode(opcode);

        if is_zero_page_relative(info.mnemonic) {
            return self.execute_zero_page_relative(opcode, info.mnemonic, bus);
        }

        let (operand, crossed) = self.resolve_operand(info.mode, bus);
        let mut cycles = info.cycles as u64;
        let crosses_matter =
            matches!(info.mode, AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::IndirectY);
        if crossed && crosses_matter && reads_memory(info.mnemonic) {
            cycles += 1;
        }

        match info.mnemonic {
            "BRK" => {
                self.pc = self.pc.wrapping_add(1);
                self.service_interrupt(bus, IRQ_VECTOR, true);
            }
            "NOP" => {}
            "WAI" => self.waiting_for_interrupt = true,
            "STP" => self.stopped = true,

            "LDA" => {
                self.a = self.load(bus, &operand);
                self.p.set_nz(self.a);
            }
            "LDX" => {
                self.x = self.load(bus, &operand);
                self.p.set_nz(self.x);
            }
            "LDY" => {
                self.y = self.load(bus, &operand);
                self.p.set_nz(self.y);
            }
            "STA" => self.store(bus, &operand, self.a),
            "STX" => self.store(bus, &operand, self.x),
            "STY" => self.store(bus, &operand, self.y),
            "STZ" => self.store(bus, &operand, 0),

            "TAX" => {
                self.x = self.a;
                self.p.set_nz(self.x);
            }
            "TAY" => {
                self.y = self.a;
                self.p.set_nz(self.y);
            }
            "TXA" => {
                self.a = self.x;
                self.p.set_nz(self.a);
            }
            "TYA" => {
                self.a = self.y;
                self.p.set_nz(self.a);
            }
            "TSX" => {
                self.x = self.sp;
                self.p.set_nz(self.x);
            }
            "TXS" => self.sp = self.x,

            "PHA" => self.push(bus, self.a),
            "PHX" => self.push(bus, self.x),
            "PHY" => self.push(bus, self.y),
            "PHP" => {
                let mut flags = self.p;
                flags.b = true;
                self.push(bus, flags.to_byte());
            }
            "PLA" => {
                self.a = self.pop(bus);
                self.p.set_nz(self.a);
            }
            "PLX" => {
                self.x = self.pop(bus);
                self.p.set_nz(self.x);
            }
            "PLY" => {
                self.y = self.pop(bus);
                self.p.set_nz(self.y);
            }
            "PLP" => {
                let byte = self.pop(bus);
                self.p = Flags::from_byte(byte);
            }

            "AND" => {
                self.a &= self.load(bus, &operand);
                self.p.set_nz(self.a);
            }
            "ORA" => {
                self.a |= self.load(bus, &operand);
                self.p.set_nz(self.a);
            }
            "EOR" => {
                self.a ^= self.load(bus, &operand);
                self.p.set_nz(self.a);
            }
            "ADC" => {
                let value = self.load(bus, &operand);
                self.adc(value);
            }
            "SBC" => {
                let value = self.load(bus, &operand);
                self.sbc(value);
            }
            "CMP" => {
                let value = self.load(bus, &operand);
                self.compare(self.a, value);
            }
            "CPX" => {
                let value = self.load(bus, &operand);
                self.compare(self.x, value);
            }
            "CPY" => {
                let value = self.load(bus, &operand);
                self.compare(self.y, value);
            }
            "BIT" => {
                let value = self.load(bus, &operand);
                self.p.z = (self.a & value) == 0;
                if !matches!(info.mode, AddressingMode::Immediate) {
                    self.p.n = value & 0x80 != 0;
                    self.p.v = value & 0x40 != 0;
                }
            }
            "TSB" => {
                let value = self.load(bus, &operand);
                self.p.z = (self.a & value) == 0;
                self.store(bus, &operand, value | self.a);
            }
            "TRB" => {
                let value = self.load(bus, &operand);
                self.p.z = (self.a & value) == 0;
                self.store(bus, &operand, value & !self.a);
            }

            "INC" => {
                let value = self.load(bus, &operand).wrapping_add(1);
                self.p.set_nz(value);
                self.store(bus, &operand, value);
            }
            "DEC" => {
                let value = self.load(bus, &operand).wrapping_sub(1);
                self.p.set_nz(value);
                self.store(bus, &operand, value);
            }
            "INX" => {
                self.x = self.x.wrapping_add(1);
                self.p.set_nz(self.x);
            }
            "INY" => {
                self.y = self.y.wrapping_add(1);
                self.p.set_nz(self.y);
            }
            "DEX" => {
                self.x = self.x.wrapping_sub(1);
                self.p.set_nz(self.x);
            }
            "DEY" => {
                self.y = self.y.wrapping_sub(1);
                self.p.set_nz(self.y);
            }

            "ASL" => {
                let value = self.load(bus, &operand);
                let result = self.shift_left(value, false);
                self.store(bus, &operand, result);
            }
            "LSR" => {
                let value = self.load(bus, &operand);
                let result = self.shift_right(value, false);
                self.store(bus, &operand, result);
            }
            "ROL" => {
                let value = self.load(bus, &operand);
                let result = self.shift_left(value, true);
                self.store(bus, &operand, result);
            }
            "ROR" => {
                let value = self.load(bus, &operand);
                let result = self.shift_right(value, true);
                self.store(bus, &operand, result);
            }

            "JMP" => {
                if let Operand::Address(addr) = operand {
                    self.pc = addr;
                }
            }
            "JSR" => {
                if let Operand::Address(addr) = operand {
                    let return_addr = self.pc.wrapping_sub(1);
                    self.push_word(bus, return_addr);
                    self.pc = addr;
                }
            }
            "RTS" => {
                let addr = self.pop_word(bus);
                self.pc = addr.wrapping_add(1);
            }
            "RTI" => {
                let byte = self.pop(bus);
                self.p = Flags::from_byte(byte);
                self.pc = self.pop_word(bus);
            }

            "CLC" => self.p.c = false,
            "SEC" => self.p.c = true,
            "CLI" => self.p.i = false,
            "SEI" => self.p.i = true,
            "CLD" => self.p.d = false,
            "SED" => self.p.d = true,
            "CLV" => self.p.v = false,

            "BPL" => cycles += self.branch(&operand, !self.p.n),
            "BMI" => cycles += self.branch(&operand, self.p.n),
            "BVC" => cycles += self.branch(&operand, !self.p.v),
            "BVS" => cycles += self.branch(&operand, self.p.v),
            "BCC" => cycles += self.branch(&operand, !self.p.c),
            "BCS" => cycles += self.branch(&operand, self.p.c),
            "BNE" => cycles += self.branch(&operand, !self.p.z),
            "BEQ" => cycles += self.branch(&operand, self.p.z),
            "BRA" => cycles += self.branch(&operand, true),

            m if m.starts_with("RMB") => {
                let value = self.load(bus, &operand);
                let bit = bit_index(opcode);
                self.store(bus, &operand, value & !(1 << bit));
            }
            m if m.starts_with("SMB") => {
                let value = self.load(bus, &operand);
                let bit = bit_index(opcode);
                self.store(bus, &operand, value | (1 << bit));
            }

            other => unreachable!("unhandled mnemonic {other}"),
        }

        cycles
    }

    fn branch(&mut self, operand: &Operand, taken: bool) -> u64 {
        match *operand {
            Operand::Address(target) => self.branch_if(target, taken),
            _ => unreachable!("branch operand must resolve to an address"),
        }
    }

    /// `BBRn`/`BBSn`: zero page address, then a signed branch displacement,
    /// then branch if bit `n` of that zero page byte is clear/set.
    fn execute_zero_page_relative(&mut self, opcode: u8, mnemonic: &str, bus: &mut dyn SystemBus) -> u64 {
        let zp = self.fetch_byte(bus);
        let offset = self.fetch_byte(bus) as i8;
        let value = self.read(bus, zp as u16);
        let bit = bit_index(opcode);
        let set = value & (1 << bit) != 0;
        let taken = if mnemonic.starts_with("BBR") { !set } else { set };
        let target = (self.pc as i32 + offset as i32) as u16;
        let mut cycles = 5u64;
        if taken {
            self.pc = target;
            cycles += 1;
        }
        cycles
    }
}

fn reads_memory(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "LDA" | "LDX" | "LDY" | "ADC" | "SBC" | "CMP" | "AND" | "ORA" | "EOR" | "BIT"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct FlatBus {
        memory: Rc<RefCell<[u8; 0x10000]>>,
    }

    impl FlatBus {
        fn new() -> Self {
            Self { memory: Rc::new(RefCell::new([0; 0x10000])) }
        }

        fn load(&self, addr: u16, bytes: &[u8]) {
            let mut mem = self.memory.borrow_mut();
            for (i, &b) in bytes.iter().enumerate() {
                mem[addr as usize + i] = b;
            }
        }
    }

    impl SystemBus for FlatBus {
        fn cpu_read(&mut self, addr: u16) -> u8 {
            self.memory.borrow()[addr as usize]
        }

        fn cpu_write(&mut self, addr: u16, value: u8) {
            self.memory.borrow_mut()[addr as usize] = value;
        }
    }

    fn cpu_at(pc: u16) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.pc = pc;
        cpu.p.i = false;
        cpu
    }

    #[test]
    fn lda_immediate_sets_zero_and_negative_flags() {
        let mut bus = FlatBus::new();
        bus.load(0x0200, &[0xa9, 0x00]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0);
        assert!(cpu.p.z);
        assert!(!cpu.p.n);
    }

    #[test]
    fn adc_sets_carry_and_overflow_on_signed_wraparound() {
        let mut bus = FlatBus::new();
        bus.load(0x0200, &[0xa9, 0x7f, 0x69, 0x01]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x80);
        assert!(cpu.p.v);
        assert!(!cpu.p.c);
    }

    #[test]
    fn branch_not_taken_consumes_no_extra_cycle() {
        let mut bus = FlatBus::new();
        bus.load(0x0200, &[0xd0, 0x10]);
        let mut cpu = cpu_at(0x0200);
        cpu.p.z = true;
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 2);
        assert_eq!(cpu.pc, 0x0202);
    }

    #[test]
    fn branch_taken_across_a_page_boundary_costs_two_extra_cycles() {
        let mut bus = FlatBus::new();
        bus.load(0x01fd, &[0xd0, 0x01]);
        let mut cpu = cpu_at(0x01fd);
        cpu.p.z = false;
        let cycles = cpu.step(&mut bus);
        assert_eq!(cycles, 4);
        assert_eq!(cpu.pc, 0x0200);
    }

    #[test]
    fn jsr_then_rts_round_trips_the_return_address() {
        let mut bus = FlatBus::new();
        bus.load(0x0200, &[0x20, 0x00, 0x03]);
        bus.load(0x0300, &[0x60]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x0300);
        cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x0203);
    }

    #[test]
    fn reset_loads_pc_from_the_reset_vector_and_sets_interrupt_disable() {
        let mut bus = FlatBus::new();
        bus.load(0xfffc, &[0x00, 0x80]);
        let mut cpu = Cpu::new();
        cpu.p.i = false;
        cpu.reset(&mut bus);
        assert_eq!(cpu.pc, 0x8000);
        assert!(cpu.p.i);
        assert!(!cpu.p.d);
    }

    #[test]
    fn wai_idles_until_an_irq_arrives_with_interrupts_enabled() {
        let mut bus = FlatBus::new();
        bus.load(0xfffe, &[0x00, 0x90]);
        bus.load(0x0200, &[0xcb]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        assert!(cpu.is_waiting_for_interrupt());
        cpu.step(&mut bus);
        assert!(cpu.is_waiting_for_interrupt());
        cpu.irq();
        cpu.step(&mut bus);
        assert!(!cpu.is_waiting_for_interrupt());
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.p.i);
    }

    #[test]
    fn stp_halts_the_cpu_until_externally_reset() {
        let mut bus = FlatBus::new();
        bus.load(0x0200, &[0xdb, 0xea]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        assert!(cpu.is_stopped());
        let pc_before = cpu.pc;
        cpu.step(&mut bus);
        assert_eq!(cpu.pc, pc_before);
    }

    #[test]
    fn bbr_branches_when_the_tested_bit_is_clear() {
        let mut bus = FlatBus::new();
        bus.load(0x0010, &[0x00]);
        bus.load(0x0200, &[0x0f, 0x10, 0x05]);
        let mut cpu = cpu_at(0x0200);
        let cycles = cpu.step(&mut bus);
        assert_eq!(cpu.pc, 0x0208);
        assert_eq!(cycles, 6);
    }

    #[test]
    fn smb_sets_the_targeted_bit_in_place() {
        let mut bus = FlatBus::new();
        bus.load(0x0010, &[0x00]);
        bus.load(0x0200, &[0x97, 0x10]);
        let mut cpu = cpu_at(0x0200);
        cpu.step(&mut bus);
        assert_eq!(bus.cpu_read(0x0010), 0b0000_0010);
    }
}
