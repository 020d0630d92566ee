//! The in-process debug command surface: parsing, structured responses, and
//! the `Machine` methods that execute them. Every command here reads
//! through [`Machine::debug_peek`] rather than [`Machine::peek`] so that
//! inspecting a soft switch never flips it, matching the side-effect-free
//! guarantee snapshot APIs make to a UI thread.

use crate::bus::page_table::{Perms, RegionTag};
use crate::cpu::addressing::AddressingMode;
use crate::cpu::opcodes::{decode, is_zero_page_relative};
use crate::devices::SoftSwitchState;
use crate::error::FaultRecord;
use crate::machine::{Machine, MachineState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugCommand {
    Regs,
    Step,
    Run,
    Pause,
    Reset,
    Peek(u32),
    Poke(u32, u8),
    Read(u32, usize),
    Write(u32, Vec<u8>),
    Pages,
    Regions,
    Switches,
    Fault,
    Load(String, u32),
    Dasm(u32, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub pc: u16,
    pub p: u8,
    pub cycles: u64,
    pub waiting_for_interrupt: bool,
    pub stopped: bool,
    pub state: MachineState,
}

#[derive(Debug, Clone)]
pub struct PageSummary {
    pub page: usize,
    pub region: Option<String>,
    pub tag: RegionTag,
    pub perms: Perms,
    pub fault_count: u32,
}

#[derive(Debug, Clone)]
pub struct DisasmLine {
    pub addr: u16,
    pub bytes: Vec<u8>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum DebugResponse {
    Ok,
    Registers(RegisterSnapshot),
    Byte(u8),
    Bytes(Vec<u8>),
    Pages(Vec<PageSummary>),
    Switches(Vec<SoftSwitchState>),
    Faults(Vec<FaultRecord>),
    Disassembly(Vec<DisasmLine>),
}

/// Parses one line of console input into a [`DebugCommand`]. Addresses and
/// byte values accept `$`/`0x`-prefixed hex or plain decimal, matching the
/// profile's own hex convention.
pub fn parse(line: &str) -> Result<DebugCommand, String> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or_else(|| "empty command".to_string())?;
    match verb {
        "regs" => Ok(DebugCommand::Regs),
        "step" => Ok(DebugCommand::Step),
        "run" => Ok(DebugCommand::Run),
        "pause" => Ok(DebugCommand::Pause),
        "reset" => Ok(DebugCommand::Reset),
        "pages" => Ok(DebugCommand::Pages),
        "regions" => Ok(DebugCommand::Pages),
        "switches" => Ok(DebugCommand::Switches),
        "fault" | "faults" => Ok(DebugCommand::Fault),
        "peek" => Ok(DebugCommand::Peek(parse_number(next(&mut tokens, "addr")?)?)),
        "poke" => {
            let addr = parse_number(next(&mut tokens, "addr")?)?;
            let value = parse_number(next(&mut tokens, "value")?)? as u8;
            Ok(DebugCommand::Poke(addr, value))
        }
        "read" => {
            let addr = parse_number(next(&mut tokens, "addr")?)?;
            let count = match tokens.next() {
                Some(n) => parse_number(n)? as usize,
                None => 1,
            };
            Ok(DebugCommand::Read(addr, count))
        }
        "write" => {
            let addr = parse_number(next(&mut tokens, "addr")?)?;
            let rest: String = tokens.collect();
            Ok(DebugCommand::Write(addr, parse_byte_string(&rest)?))
        }
        "load" => {
            let path = next(&mut tokens, "path")?.to_string();
            let addr = parse_number(next(&mut tokens, "addr")?)?;
            Ok(DebugCommand::Load(path, addr))
        }
        "dasm" => {
            let addr = parse_number(next(&mut tokens, "addr")?)?;
            let count = match tokens.next() {
                Some(n) => parse_number(n)? as usize,
                None => 1,
            };
            Ok(DebugCommand::Dasm(addr, count))
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

fn next<'a>(tokens: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str, String> {
    tokens.next().ok_or_else(|| format!("missing {what}"))
}

fn parse_number(token: &str) -> Result<u32, String> {
    let trimmed = token.trim();
    let digits = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")).or_else(|| trimmed.strip_prefix('$'));
    match digits {
        Some(hex) => u32::from_str_radix(hex, 16).map_err(|_| format!("invalid number '{token}'")),
        None => trimmed.parse::<u32>().map_err(|_| format!("invalid number '{token}'")),
    }
}

fn parse_byte_string(token: &str) -> Result<Vec<u8>, String> {
    let digits = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")).unwrap_or(token);
    if digits.len() % 2 != 0 {
        return Err(format!("'{token}' has an odd number of hex digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| format!("invalid byte in '{token}'")))
        .collect()
}

impl Machine {
    /// Executes a single parsed debug command against this machine.
    pub fn execute_debug_command(&mut self, command: DebugCommand) -> DebugResponse {
        match command {
            DebugCommand::Regs => DebugResponse::Registers(self.register_snapshot()),
            DebugCommand::Step => {
                self.step_one();
                DebugResponse::Registers(self.register_snapshot())
            }
            DebugCommand::Run => {
                self.start();
                DebugResponse::Ok
            }
            DebugCommand::Pause => {
                self.pause();
                DebugResponse::Ok
            }
            DebugCommand::Reset => {
                self.reset();
                DebugResponse::Ok
            }
            DebugCommand::Peek(addr) => DebugResponse::Byte(self.debug_peek(addr)),
            DebugCommand::Poke(addr, value) => {
                self.poke(addr, value);
                DebugResponse::Ok
            }
            DebugCommand::Read(addr, count) => {
                let bytes = (0..count as u32).map(|i| self.debug_peek(addr.wrapping_add(i))).collect();
                DebugResponse::Bytes(bytes)
            }
            DebugCommand::Write(addr, bytes) => {
                for (i, byte) in bytes.into_iter().enumerate() {
                    self.poke(addr.wrapping_add(i as u32), byte);
                }
                DebugResponse::Ok
            }
            DebugCommand::Pages | DebugCommand::Regions => DebugResponse::Pages(self.page_summary()),
            DebugCommand::Switches => DebugResponse::Switches(self.devices.all_soft_switches()),
            DebugCommand::Fault => DebugResponse::Faults(self.bus.faults().copied().collect()),
            DebugCommand::Load(path, addr) => {
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        for (i, byte) in bytes.into_iter().enumerate() {
                            self.poke(addr.wrapping_add(i as u32), byte);
                        }
                        DebugResponse::Ok
                    }
                    Err(_) => DebugResponse::Bytes(Vec::new()),
                }
            }
            DebugCommand::Dasm(addr, count) => DebugResponse::Disassembly(self.disassemble(addr as u16, count)),
        }
    }

    fn register_snapshot(&self) -> RegisterSnapshot {
        RegisterSnapshot {
            a: self.cpu.a,
            x: self.cpu.x,
            y: self.cpu.y,
            sp: self.cpu.sp,
            pc: self.cpu.pc,
            p: self.cpu.p.to_byte(),
            cycles: self.cpu.cycles,
            waiting_for_interrupt: self.cpu.is_waiting_for_interrupt(),
            stopped: self.cpu.is_stopped(),
            state: self.state,
        }
    }

    fn page_summary(&self) -> Vec<PageSummary> {
        (0..self.bus.page_count())
            .map(|page| {
                let entry = self.bus.page_entry(page);
                PageSummary {
                    page,
                    region: self.bus.region_name(page).map(str::to_string),
                    tag: entry.tag,
                    perms: entry.perms,
                    fault_count: self.bus.fault_count(page),
                }
            })
            .collect()
    }

    /// Disassembles `count` instructions starting at `addr`, using
    /// side-effect-free reads so listing code never perturbs a soft switch
    /// or a keyboard strobe sitting in the same page.
    fn disassemble(&mut self, mut addr: u16, count: usize) -> Vec<DisasmLine> {
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let start = addr;
            let opcode = self.debug_peek(addr as u32);
            let info = decode(opcode);
            let operand_len = if is_zero_page_relative(info.mnemonic) { 2 } else { operand_length(info.mode) };
            let mut bytes = vec![opcode];
            for i in 0..operand_len {
                bytes.push(self.debug_peek(addr.wrapping_add(1 + i as u16) as u32));
            }
            let text = format_instruction(info.mnemonic, info.mode, &bytes);
            lines.push(DisasmLine { addr: start, bytes, text });
            addr = addr.wrapping_add(1 + operand_len as u16);
        }
        lines
    }
}

fn operand_length(mode: AddressingMode) -> usize {
    match mode {
        AddressingMode::Implied | AddressingMode::Accumulator => 0,
        AddressingMode::Immediate
        | AddressingMode::ZeroPage
        | AddressingMode::ZeroPageX
        | AddressingMode::ZeroPageY
        | AddressingMode::IndirectX
        | AddressingMode::IndirectY
        | AddressingMode::IndirectZp
        | AddressingMode::Relative => 1,
        AddressingMode::Absolute | AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::Indirect => 2,
    }
}

fn format_instruction(mnemonic: &str, mode: AddressingMode, bytes: &[u8]) -> String {
    if is_zero_page_relative(mnemonic) {
        let zp = bytes.get(1).copied().unwrap_or(0);
        let offset = bytes.get(2).copied().unwrap_or(0) as i8;
        return format!("{mnemonic} ${zp:02x},{offset}");
    }
    match mode {
        AddressingMode::Implied => mnemonic.to_string(),
        AddressingMode::Accumulator => format!("{mnemonic} A"),
        AddressingMode::Immediate => format!("{mnemonic} #${:02x}", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::ZeroPage => format!("{mnemonic} ${:02x}", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::ZeroPageX => format!("{mnemonic} ${:02x},X", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::ZeroPageY => format!("{mnemonic} ${:02x},Y", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::IndirectX => format!("{mnemonic} (${:02x},X)", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::IndirectY => format!("{mnemonic} (${:02x}),Y", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::IndirectZp => format!("{mnemonic} (${:02x})", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::Relative => format!("{mnemonic} ${:02x}", bytes.get(1).copied().unwrap_or(0)),
        AddressingMode::Absolute => format!("{mnemonic} ${:04x}", word(bytes)),
        AddressingMode::AbsoluteX => format!("{mnemonic} ${:04x},X", word(bytes)),
        AddressingMode::AbsoluteY => format!("{mnemonic} ${:04x},Y", word(bytes)),
        AddressingMode::Indirect => format!("{mnemonic} (${:04x})", word(bytes)),
    }
}

fn word(bytes: &[u8]) -> u16 {
    let lo = bytes.get(1).copied().unwrap_or(0) as u16;
    let hi = bytes.get(2).copied().unwrap_or(0) as u16;
    (hi << 8) | lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::page_table::{Perms, RegionTag};
    use crate::bus::Bus;
    use crate::memory::RomTarget;

    fn rom_backed_machine(program: &[u8]) -> Machine {
        let mut bus = Bus::new(16).unwrap();
        let mut image = vec![0xea; 0x10000];
        image[..program.len()].copy_from_slice(program);
        let target = bus.add_target(Box::new(RomTarget::new(image)));
        bus.map_region("rom", 0x0000, 0x10000, 0, RegionTag::Rom, Perms::R.union(Perms::X), target, 0).unwrap();
        bus.save_base_mapping_range(0, bus.page_count());
        Machine::new("test", bus)
    }

    #[test]
    fn parses_peek_and_poke_with_dollar_and_hex_prefixes() {
        assert_eq!(parse("peek $C000").unwrap(), DebugCommand::Peek(0xC000));
        assert_eq!(parse("poke 0xC010 0x2a").unwrap(), DebugCommand::Poke(0xC010, 0x2a));
    }

    #[test]
    fn parses_write_with_a_packed_hex_byte_string() {
        assert_eq!(parse("write $0300 aabbcc").unwrap(), DebugCommand::Write(0x0300, vec![0xaa, 0xbb, 0xcc]));
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert!(parse("frobnicate").is_err());
    }

    #[test]
    fn regs_reports_the_current_register_file() {
        let mut machine = rom_backed_machine(&[]);
        machine.reset();
        match machine.execute_debug_command(DebugCommand::Regs) {
            DebugResponse::Registers(snapshot) => assert_eq!(snapshot.pc, 0xeaea),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn dasm_decodes_a_known_sequence() {
        // LDA #$42 ; BRA $+2
        let mut machine = rom_backed_machine(&[0xa9, 0x42, 0x80, 0x00]);
        match machine.execute_debug_command(DebugCommand::Dasm(0x0000, 2)) {
            DebugResponse::Disassembly(lines) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[0].text, "LDA #$42");
                assert_eq!(lines[0].bytes, vec![0xa9, 0x42]);
                assert_eq!(lines[1].addr, 0x0002);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn dasm_of_a_bbr_instruction_shows_both_operand_bytes() {
        let mut machine = rom_backed_machine(&[0x0f, 0x10, 0x05]); // BBR0 $10,+5
        match machine.execute_debug_command(DebugCommand::Dasm(0x0000, 1)) {
            DebugResponse::Disassembly(lines) => assert_eq!(lines[0].text, "BBR0 $10,5"),
            other => panic!("unexpected response {other:?}"),
        }
    }
}
