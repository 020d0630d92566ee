//! Game I/O: paddle timer reads (`$C064-$C067`) and pushbutton states
//! (`$C061-$C063`). Paddle values are driven by the host input layer via
//! [`GameIo::set_paddle`]; the timer-discharge behavior of real hardware is
//! simplified to an immediate threshold comparison.

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::Bus;
use crate::memory::AccessContext;

pub struct GameIo {
    paddles: [u8; 4],
    buttons: [bool; 3],
}

impl GameIo {
    pub fn new() -> Self {
        Self { paddles: [0; 4], buttons: [false; 3] }
    }

    pub fn set_paddle(&mut self, index: usize, value: u8) {
        if index < self.paddles.len() {
            self.paddles[index] = value;
        }
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if index < self.buttons.len() {
            self.buttons[index] = pressed;
        }
    }
}

impl Default for GameIo {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for GameIo {
    fn type_id(&self) -> &'static str {
        "gameio"
    }

    fn name(&self) -> &str {
        "Game I/O"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn reset(&mut self, _bus: &mut Bus) {
        self.paddles = [0; 4];
        self.buttons = [false; 3];
    }

    fn handle_io_read(&mut self, offset: u8, _ctx: AccessContext, _bus: &mut Bus) -> Option<u8> {
        match offset {
            0x61..=0x63 => Some(if self.buttons[(offset - 0x61) as usize] { 0x80 } else { 0x00 }),
            0x64..=0x67 => {
                let paddle = self.paddles[(offset - 0x64) as usize];
                Some(if paddle > 0x7f { 0x80 } else { 0x00 })
            }
            _ => None,
        }
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        (0x61..=0x67).collect()
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        self.buttons
            .iter()
            .enumerate()
            .map(|(i, &pressed)| SoftSwitchState {
                name: format!("PB{i}"),
                address: 0xc061 + i as u16,
                active: pressed,
                description: format!("Pushbutton {i} state"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Width;

    #[test]
    fn paddle_above_threshold_reads_timer_expired() {
        let mut bus = Bus::new(16).unwrap();
        let mut gameio = GameIo::new();
        gameio.set_paddle(0, 200);
        let value = gameio.handle_io_read(0x64, AccessContext::read(Width::Byte), &mut bus).unwrap();
        assert_eq!(value, 0x80);
    }
}
