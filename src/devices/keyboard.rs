//! Keyboard: `$C000` latched key data, `$C010` strobe clear.

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::Bus;
use crate::memory::AccessContext;

pub struct Keyboard {
    last_key: u8,
    strobe: bool,
}

impl Keyboard {
    pub fn new() -> Self {
        Self { last_key: 0, strobe: false }
    }

    /// Called by the host input layer when a key is pressed; ASCII with
    /// the high bit set, matching Apple IIe keyboard data format.
    pub fn press(&mut self, ascii: u8) {
        self.last_key = ascii | 0x80;
        self.strobe = true;
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Keyboard {
    fn type_id(&self) -> &'static str {
        "keyboard"
    }

    fn name(&self) -> &str {
        "Keyboard"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn reset(&mut self, _bus: &mut Bus) {
        self.last_key = 0;
        self.strobe = false;
    }

    fn handle_io_read(&mut self, offset: u8, ctx: AccessContext, _bus: &mut Bus) -> Option<u8> {
        match offset {
            0x00 => Some(self.last_key | if self.strobe { 0x80 } else { 0x00 }),
            0x10 => {
                let value = self.last_key;
                if !ctx.is_side_effect_free {
                    self.strobe = false;
                }
                Some(value)
            }
            _ => None,
        }
    }

    fn handle_io_write(&mut self, offset: u8, _value: u8, ctx: AccessContext, _bus: &mut Bus) {
        if offset == 0x10 && !ctx.is_side_effect_free {
            self.strobe = false;
        }
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        vec![0x00, 0x10]
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        vec![SoftSwitchState {
            name: "KBD_STROBE".into(),
            address: 0xc010,
            active: self.strobe,
            description: "A key is waiting to be read".into(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Width;

    #[test]
    fn reading_c010_clears_the_strobe() {
        let mut bus = Bus::new(16).unwrap();
        let mut kbd = Keyboard::new();
        kbd.press(b'A');
        assert!(kbd.handle_io_read(0x00, AccessContext::read(Width::Byte), &mut bus).unwrap() & 0x80 != 0);
        kbd.handle_io_read(0x10, AccessContext::read(Width::Byte), &mut bus);
        assert!(!kbd.soft_switches()[0].active);
    }
}
