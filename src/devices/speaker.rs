//! Speaker: `$C030` access toggles the output line and emits a click event
//! to whatever external sink is watching — audio playback itself is a
//! host concern outside this core.

use super::{Device, DeviceKind, SoftSwitchState};
use crate::bus::Bus;
use crate::memory::AccessContext;

pub struct Speaker {
    level: bool,
    click_count: u64,
}

impl Speaker {
    pub fn new() -> Self {
        Self { level: false, click_count: 0 }
    }

    pub fn click_count(&self) -> u64 {
        self.click_count
    }

    fn toggle(&mut self) {
        self.level = !self.level;
        self.click_count += 1;
    }
}

impl Default for Speaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for Speaker {
    fn type_id(&self) -> &'static str {
        "speaker"
    }

    fn name(&self) -> &str {
        "Speaker"
    }

    fn kind(&self) -> DeviceKind {
        DeviceKind::Motherboard
    }

    fn reset(&mut self, _bus: &mut Bus) {
        self.level = false;
    }

    fn handle_io_read(&mut self, offset: u8, ctx: AccessContext, _bus: &mut Bus) -> Option<u8> {
        if offset == 0x30 && !ctx.is_side_effect_free {
            self.toggle();
        }
        None
    }

    fn handle_io_write(&mut self, offset: u8, _value: u8, ctx: AccessContext, _bus: &mut Bus) {
        if offset == 0x30 && !ctx.is_side_effect_free {
            self.toggle();
        }
    }

    fn soft_switch_addresses(&self) -> Vec<u8> {
        vec![0x30]
    }

    fn soft_switches(&self) -> Vec<SoftSwitchState> {
        vec![SoftSwitchState {
            name: "SPEAKER".into(),
            address: 0xc030,
            active: self.level,
            description: "Speaker output line level".into(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Width;

    #[test]
    fn side_effect_free_access_never_clicks() {
        let mut bus = Bus::new(16).unwrap();
        let mut speaker = Speaker::new();
        let mut ctx = AccessContext::read(Width::Byte);
        ctx.is_side_effect_free = true;
        speaker.handle_io_read(0x30, ctx, &mut bus);
        assert_eq!(speaker.click_count(), 0);
    }

    #[test]
    fn each_access_toggles_the_output_line() {
        let mut bus = Bus::new(16).unwrap();
        let mut speaker = Speaker::new();
        speaker.handle_io_read(0x30, AccessContext::read(Width::Byte), &mut bus);
        assert!(speaker.soft_switches()[0].active);
        speaker.handle_io_read(0x30, AccessContext::read(Width::Byte), &mut bus);
        assert!(!speaker.soft_switches()[0].active);
    }
}
