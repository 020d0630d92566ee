//! The 65C02 opcode table: one `decode` call maps a fetched opcode byte to
//! its mnemonic, addressing mode, and base cycle count. `execute` (in
//! `cpu::mod`) owns the actual semantics; this module only classifies.

use super::addressing::AddressingMode;

#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub mnemonic: &'static str,
    pub mode: AddressingMode,
    pub cycles: u8,
}

const fn op(mnemonic: &'static str, mode: AddressingMode, cycles: u8) -> OpcodeInfo {
    OpcodeInfo { mnemonic, mode, cycles }
}

/// Decodes one opcode byte. Unassigned slots in the 65C02 map are
/// single-byte NOPs on real silicon (the W65C02S reserves them rather than
/// treating them as illegal/undocumented the way NMOS 6502 parts do), so
/// the wildcard arm reproduces that rather than panicking.
pub fn decode(opcode: u8) -> OpcodeInfo {
    use AddressingMode::*;
    match opcode {
        0x00 => op("BRK", Implied, 7),
        0x01 => op("ORA", IndirectX, 6),
        0x04 => op("TSB", ZeroPage, 5),
        0x05 => op("ORA", ZeroPage, 3),
        0x06 => op("ASL", ZeroPage, 5),
        0x07 => op("RMB0", ZeroPage, 5),
        0x08 => op("PHP", Implied, 3),
        0x09 => op("ORA", Immediate, 2),
        0x0a => op("ASL", Accumulator, 2),
        0x0c => op("TSB", Absolute, 6),
        0x0d => op("ORA", Absolute, 4),
        0x0e => op("ASL", Absolute, 6),
        0x0f => op("BBR0", ZeroPage, 5),

        0x10 => op("BPL", Relative, 2),
        0x11 => op("ORA", IndirectY, 5),
        0x12 => op("ORA", IndirectZp, 5),
        0x14 => op("TRB", ZeroPage, 5),
        0x15 => op("ORA", ZeroPageX, 4),
        0x16 => op("ASL", ZeroPageX, 6),
        0x17 => op("RMB1", ZeroPage, 5),
        0x18 => op("CLC", Implied, 2),
        0x19 => op("ORA", AbsoluteY, 4),
        0x1a => op("INC", Accumulator, 2),
        0x1c => op("TRB", Absolute, 6),
        0x1d => op("ORA", AbsoluteX, 4),
        0x1e => op("ASL", AbsoluteX, 6),
        0x1f => op("BBR1", ZeroPage, 5),

        0x20 => op("JSR", Absolute, 6),
        0x21 => op("AND", IndirectX, 6),
        0x24 => op("BIT", ZeroPage, 3),
        0x25 => op("AND", ZeroPage, 3),
        0x26 => op("ROL", ZeroPage, 5),
        0x27 => op("RMB2", ZeroPage, 5),
        0x28 => op("PLP", Implied, 4),
        0x29 => op("AND", Immediate, 2),
        0x2a => op("ROL", Accumulator, 2),
        0x2c => op("BIT", Absolute, 4),
        0x2d => op("AND", Absolute, 4),
        0x2e => op("ROL", Absolute, 6),
        0x2f => op("BBR2", ZeroPage, 5),

        0x30 => op("BMI", Relative, 2),
        0x31 => op("AND", IndirectY, 5),
        0x32 => op("AND", IndirectZp, 5),
        0x34 => op("BIT", ZeroPageX, 4),
        0x35 => op("AND", ZeroPageX, 4),
        0x36 => op("ROL", ZeroPageX, 6),
        0x37 => op("RMB3", ZeroPage, 5),
        0x38 => op("SEC", Implied, 2),
        0x39 => op("AND", AbsoluteY, 4),
        0x3a => op("DEC", Accumulator, 2),
        0x3c => op("BIT", AbsoluteX, 4),
        0x3d => op("AND", AbsoluteX, 4),
        0x3e => op("ROL", AbsoluteX, 6),
        0x3f => op("BBR3", ZeroPage, 5),

        0x40 => op("RTI", Implied, 6),
        0x41 => op("EOR", IndirectX, 6),
        0x45 => op("EOR", ZeroPage, 3),
        0x46 => op("LSR", ZeroPage, 5),
        0x47 => op("RMB4", ZeroPage, 5),
        0x48 => op("PHA", Implied, 3),
        0x49 => op("EOR", Immediate, 2),
        0x4a => op("LSR", Accumulator, 2),
        0x4c => op("JMP", Absolute, 3),
        0x4d => op("EOR", Absolute, 4),
        0x4e => op("LSR", Absolute, 6),
        0x4f => op("BBR4", ZeroPage, 5),

        0x50 => op("BVC", Relative, 2),
        0x51 => op("EOR", IndirectY, 5),
        0x52 => op("EOR", IndirectZp, 5),
        0x55 => op("EOR", ZeroPageX, 4),
        0x56 => op("LSR", ZeroPageX, 6),
        0x57 => op("RMB5", ZeroPage, 5),
        0x58 => op("CLI", Implied, 2),
        0x59 => op("EOR", AbsoluteY, 4),
        0x5a => op("PHY", Implied, 3),
        0x5d => op("EOR", AbsoluteX, 4),
        0x5e => op("LSR", AbsoluteX, 6),
        0x5f => op("BBR5", ZeroPage, 5),

        0x60 => op("RTS", Implied, 6),
        0x61 => op("ADC", IndirectX, 6),
        0x64 => op("STZ", ZeroPage, 3),
        0x65 => op("ADC", ZeroPage, 3),
        0x66 => op("ROR", ZeroPage, 5),
        0x67 => op("RMB6", ZeroPage, 5),
        0x68 => op("PLA", Implied, 4),
        0x69 => op("ADC", Immediate, 2),
        0x6a => op("ROR", Accumulator, 2),
        0x6c => op("JMP", Indirect, 6),
        0x6d => op("ADC", Absolute, 4),
        0x6e => op("ROR", Absolute, 6),
        0x6f => op("BBR6", ZeroPage, 5),

        0x70 => op("BVS", Relative, 2),
        0x71 => op("ADC", IndirectY, 5),
        0x72 => op("ADC", IndirectZp, 5),
        0x74 => op("STZ", ZeroPageX, 4),
        0x75 => op("ADC", ZeroPageX, 4),
        0x76 => op("ROR", ZeroPageX, 6),
        0x77 => op("RMB7", ZeroPage, 5),
        0x78 => op("SEI", Implied, 2),
        0x79 => op("ADC", AbsoluteY, 4),
        0x7a => op("PLY", Implied, 4),
        0x7c => op("JMP", Indirect, 6),
        0x7d => op("ADC", AbsoluteX, 4),
        0x7e => op("ROR", AbsoluteX, 6),
        0x7f => op("BBR7", ZeroPage, 5),

        0x80 => op("BRA", Relative, 3),
        0x81 => op("STA", IndirectX, 6),
        0x84 => op("STY", ZeroPage, 3),
        0x85 => op("STA", ZeroPage, 3),
        0x86 => op("STX", ZeroPage, 3),
        0x87 => op("SMB0", ZeroPage, 5),
        0x88 => op("DEY", Implied, 2),
        0x89 => op("BIT", Immediate, 2),
        0x8a => op("TXA", Implied, 2),
        0x8c => op("STY", Absolute, 4),
        0x8d => op("STA", Absolute, 4),
        0x8e => op("STX", Absolute, 4),
        0x8f => op("BBS0", ZeroPage, 5),

        0x90 => op("BCC", Relative, 2),
        0x91 => op("STA", IndirectY, 6),
        0x92 => op("STA", IndirectZp, 5),
        0x94 => op("STY", ZeroPageX, 4),
        0x95 => op("STA", ZeroPageX, 4),
        0x96 => op("STX", ZeroPageY, 4),
        0x97 => op("SMB1", ZeroPage, 5),
        0x98 => op("TYA", Implied, 2),
        0x99 => op("STA", AbsoluteY, 5),
        0x9a => op("TXS", Implied, 2),
        0x9c => op("STZ", Absolute, 4),
        0x9d => op("STA", AbsoluteX, 5),
        0x9e => op("STZ", AbsoluteX, 5),
        0x9f => op("BBS1", ZeroPage, 5),

        0xa0 => op("LDY", Immediate, 2),
        0xa1 => op("LDA", IndirectX, 6),
        0xa2 => op("LDX", Immediate, 2),
        0xa4 => op("LDY", ZeroPage, 3),
        0xa5 => op("LDA", ZeroPage, 3),
        0xa6 => op("LDX", ZeroPage, 3),
        0xa7 => op("SMB2", ZeroPage, 5),
        0xa8 => op("TAY", Implied, 2),
        0xa9 => op("LDA", Immediate, 2),
        0xaa => op("TAX", Implied, 2),
        0xac => op("LDY", Absolute, 4),
        0xad => op("LDA", Absolute, 4),
        0xae => op("LDX", Absolute, 4),
        0xaf => op("BBS2", ZeroPage, 5),

        0xb0 => op("BCS", Relative, 2),
        0xb1 => op("LDA", IndirectY, 5),
        0xb2 => op("LDA", IndirectZp, 5),
        0xb4 => op("LDY", ZeroPageX, 4),
        0xb5 => op("LDA", ZeroPageX, 4),
        0xb6 => op("LDX", ZeroPageY, 4),
        0xb7 => op("SMB3", ZeroPage, 5),
        0xb8 => op("CLV", Implied, 2),
        0xb9 => op("LDA", AbsoluteY, 4),
        0xba => op("TSX", Implied, 2),
        0xbc => op("LDY", AbsoluteX, 4),
        0xbd => op("LDA", AbsoluteX, 4),
        0xbe => op("LDX", AbsoluteY, 4),
        0xbf => op("BBS3", ZeroPage, 5),

        0xc0 => op("CPY", Immediate, 2),
        0xc1 => op("CMP", IndirectX, 6),
        0xc4 => op("CPY", ZeroPage, 3),
        0xc5 => op("CMP", ZeroPage, 3),
        0xc6 => op("DEC", ZeroPage, 5),
        0xc7 => op("SMB4", ZeroPage, 5),
        0xc8 => op("INY", Implied, 2),
        0xc9 => op("CMP", Immediate, 2),
        0xca => op("DEX", Implied, 2),
        0xcb => op("WAI", Implied, 3),
        0xcc => op("CPY", Absolute, 4),
        0xcd => op("CMP", Absolute, 4),
        0xce => op("DEC", Absolute, 6),
        0xcf => op("BBS4", ZeroPage, 5),

        0xd0 => op("BNE", Relative, 2),
        0xd1 => op("CMP", IndirectY, 5),
        0xd2 => op("CMP", IndirectZp, 5),
        0xd5 => op("CMP", ZeroPageX, 4),
        0xd6 => op("DEC", ZeroPageX, 6),
        0xd7 => op("SMB5", ZeroPage, 5),
        0xd8 => op("CLD", Implied, 2),
        0xd9 => op("CMP", AbsoluteY, 4),
        0xda => op("PHX", Implied, 3),
        0xdb => op("STP", Implied, 3),
        0xdd => op("CMP", AbsoluteX, 4),
        0xde => op("DEC", AbsoluteX, 7),
        0xdf => op("BBS5", ZeroPage, 5),

        0xe0 => op("CPX", Immediate, 2),
        0xe1 => op("SBC", IndirectX, 6),
        0xe4 => op("CPX", ZeroPage, 3),
        0xe5 => op("SBC", ZeroPage, 3),
        0xe6 => op("INC", ZeroPage, 5),
        0xe7 => op("SMB6", ZeroPage, 5),
        0xe8 => op("INX", Implied, 2),
        0xe9 => op("SBC", Immediate, 2),
        0xea => op("NOP", Implied, 2),
        0xec => op("CPX", Absolute, 4),
        0xed => op("SBC", Absolute, 4),
        0xee => op("INC", Absolute, 6),
        0xef => op("BBS6", ZeroPage, 5),

        0xf0 => op("BEQ", Relative, 2),
        0xf1 => op("SBC", IndirectY, 5),
        0xf2 => op("SBC", IndirectZp, 5),
        0xf5 => op("SBC", ZeroPageX, 4),
        0xf6 => op("INC", ZeroPageX, 6),
        0xf7 => op("SMB7", ZeroPage, 5),
        0xf8 => op("SED", Implied, 2),
        0xf9 => op("SBC", AbsoluteY, 4),
        0xfa => op("PLX", Implied, 4),
        0xfd => op("SBC", AbsoluteX, 4),
        0xfe => op("INC", AbsoluteX, 7),
        0xff => op("BBS7", ZeroPage, 5),

        _ => op("NOP", Implied, 2),
    }
}

/// `true` for the sixteen `BBRn`/`BBSn` opcodes, whose operand shape (zero
/// page address, then a branch displacement) doesn't fit the ordinary
/// addressing-mode table and is handled directly in `execute`.
pub fn is_zero_page_relative(mnemonic: &str) -> bool {
    mnemonic.starts_with("BBR") || mnemonic.starts_with("BBS")
}

/// Bit index encoded in a `BBRn`/`BBSn`/`RMBn`/`SMBn` mnemonic's low nibble.
pub fn bit_index(opcode: u8) -> u8 {
    (opcode >> 4) & 0x07
}
