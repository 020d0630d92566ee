//! Character generator: a 4 KB ROM (two 2 KB character sets) plus two 4 KB
//! glyph RAM banks, addressed outside the CPU's memory map and read by the
//! video rasterizer through [`CharacterDevice::get_scanline`].

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::Bus;
use crate::memory::AccessContext;

const CHAR_ROM_SIZE: usize = 0x1000;
const GLYPH_BANK_SIZE: usize = 0x1000;
const SET_SIZE: usize = 0x0800;
const GLYPH_HEIGHT: u8 = 8;

pub struct CharacterDevice {
    rom: Vec<u8>,
    glyph_ram: [Vec<u8>; 2],
    alt_charset: bool,
    glyph_write_enabled: bool,
    flash_suppressed: [bool; 2],
    glyph_bank_overlay: bool,
}

impl CharacterDevice {
    pub fn new() -> Self {
        Self {
            rom: vec![0; CHAR_ROM_SIZE],
            glyph_ram: [vec![0; GLYPH_BANK_SIZE], vec![0; GLYPH_BANK_SIZE]],
            alt_charset: false,
            glyph_write_enabled: false,
            flash_suppressed: [false, false],
            glyph_bank_overlay: false,
        }
    }

    pub fn load_rom(&mut self, data: &[u8]) {
        let len = data.len().min(self.rom.len());
        self.rom[..len].copy_from_slice(&data[..len]);
    }

    /// Returns the 7-pixel scanline (bit 6 = leftmost, bit 7 unused) for
    /// `char_code` at `scanline` (0..8), honoring alternate charset
    /// selection and per-bank flash suppression.
    pub fn get_scanline(&self, char_code: u8, scanline: u8, use_alt: bool, flash_state: bool) -> u8 {
        if scanline >= GLYPH_HEIGHT {
            return 0;
        }
        let bank = if self.glyph_bank_overlay { 1 } else { 0 };
        if self.glyph_write_enabled {
            let offset = bank * GLYPH_BANK_SIZE + char_code as usize * GLYPH_HEIGHT as usize + scanline as usize;
            return self.glyph_ram[bank].get(offset % GLYPH_BANK_SIZE.max(1)).copied().unwrap_or(0) & 0x7f;
        }
        let alt = use_alt || self.alt_charset;
        let suppressed = self.flash_suppressed[bank] && flash_state;
        if suppressed {
            return 0;
        }
        let set_offset = if alt { SET_SIZE } else { 0 };
        let offset = set_offset + char_code as usize * GLYPH_HEIGHT as usize + scanline as usize;
        self.rom.get(offset % self.rom.len().max(1)).copied().unwrap_or(0) & 0x7f
    }
}

impl Default for CharacterDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for CharacterDevice {
    fn type_id(&self) -> &'static str {
        "character"
    }

    fn name(&self) -> &str {
        "Character Generator"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn reset(&mut self, _bus: &mut Bus) {
        self.alt_charset = false;
        self.glyph_write_enabled = false;
        self.flash_suppressed = [false, false];
        self.glyph_bank_overlay = false;
    }

    fn handle_io_read(&mut self, offset: u8, ctx: AccessContext, _bus: &mut Bus) -> Option<u8> {
        if !ctx.is_side_effect_free {
            self.decode(offset);
        }
        None
    }

    fn handle_io_write(&mut self, offset: u8, _value: u8, ctx: AccessContext, _bus: &mut Bus) {
        if !ctx.is_side_effect_free {
            self.decode(offset);
        }
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        vec![0x0e, 0x0f, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29]
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        vec![
            SoftSwitchState { name: "ALTCHAR".into(), address: 0xc00e, active: self.alt_charset, description: "Alternate character set selected".into() },
            SoftSwitchState { name: "GLYPH_WRITE".into(), address: 0xc024, active: self.glyph_write_enabled, description: "Glyph RAM writable in place of character ROM".into() },
            SoftSwitchState { name: "GLYPH_BANK".into(), address: 0xc028, active: self.glyph_bank_overlay, description: "Glyph RAM bank 1 overlay selected".into() },
        ]
    }
}

impl CharacterDevice {
    fn decode(&mut self, offset: u8) {
        match offset {
            0x0e => self.alt_charset = false,
            0x0f => self.alt_charset = true,
            0x24 => self.glyph_write_enabled = false,
            0x25 => self.glyph_write_enabled = true,
            0x26 => self.flash_suppressed[0] = !self.flash_suppressed[0],
            0x27 => self.flash_suppressed[1] = !self.flash_suppressed[1],
            0x28 => self.glyph_bank_overlay = false,
            0x29 => self.glyph_bank_overlay = true,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanline_reads_second_set_when_alt_charset_selected() {
        let mut device = CharacterDevice::new();
        let mut rom = vec![0u8; CHAR_ROM_SIZE];
        rom[8] = 0x7f; // char 1, scanline 0, primary set
        rom[SET_SIZE + 8] = 0x55; // char 1, scanline 0, alt set
        device.load_rom(&rom);

        assert_eq!(device.get_scanline(1, 0, false, false), 0x7f);
        assert_eq!(device.get_scanline(1, 0, true, false), 0x55);
    }

    #[test]
    fn flash_suppression_blanks_the_scanline_during_flash_phase() {
        let mut device = CharacterDevice::new();
        let mut rom = vec![0u8; CHAR_ROM_SIZE];
        rom[0] = 0x2a;
        device.load_rom(&rom);
        device.decode(0x26); // toggle flash suppression on bank 0

        assert_eq!(device.get_scanline(0, 0, false, false), 0x2a);
        assert_eq!(device.get_scanline(0, 0, false, true), 0);
    }
}
